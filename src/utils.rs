// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::atomic::{AtomicU64, Ordering};

/// Global generator for per-accepted-socket connection identities.
///
/// The acceptor hands one of these to each `ServerConnection` so the
/// server's `conn_id -> weak<Connection>` map has a stable key that
/// outlives any individual TCP 4-tuple (sockets get reused by the OS).
static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_conn_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}
