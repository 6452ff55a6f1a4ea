// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The TCP acceptor and the `init -> started -> stop` lifecycle around it.

use std::{
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, bail};
use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{router::Router, server::connection::ServerConnection, utils::next_conn_id};

const STATE_INIT: u8 = 0;
const STATE_STARTED: u8 = 1;
const STATE_STOP: u8 = 2;

/// Accepts connections on one TCP listener and hands each to its own
/// [`ServerConnection`] task.
///
/// `start`/`async_start` are idempotent: calling either a second time
/// returns the same error both times (`resource_unavailable`) regardless of
/// whether the server is already running or has already stopped, matching
/// the original's terse "start again" / "has stopped" diagnostics — the
/// return code alone never tells the caller which state it was in, and the
/// log line is the only thing that disambiguates, so callers should not
/// infer a distinct error from it.
pub struct Acceptor {
    router: Arc<Router>,
    conn_timeout: Duration,
    state: AtomicU8,
    start_lock: Mutex<()>,
    connections: Arc<DashMap<u64, Weak<ServerConnection>>>,
    stop_signal: CancellationToken,
}

impl Acceptor {
    pub fn new(router: Arc<Router>, conn_timeout: Duration) -> Self {
        Self {
            router,
            conn_timeout,
            state: AtomicU8::new(STATE_INIT),
            start_lock: Mutex::new(()),
            connections: Arc::new(DashMap::new()),
            stop_signal: CancellationToken::new(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Binds `addr` and runs the accept loop until `stop` is called or the
    /// listener errors. Blocks the calling task for the server's lifetime.
    pub async fn start(self: &Arc<Self>, addr: &str) -> Result<()> {
        {
            let _guard = self.start_lock.lock().expect("start_lock poisoned");
            match self.state.load(Ordering::Acquire) {
                STATE_INIT => {}
                STATE_STARTED => {
                    info!("start again");
                    bail!("server already started");
                }
                _ => {
                    info!("has stopped");
                    bail!("server already started");
                }
            }
            self.state.store(STATE_STARTED, Ordering::Release);
        }

        let listener = match TcpListener::bind(addr).await {
            Ok(l) => l,
            Err(e) => {
                self.state.store(STATE_STOP, Ordering::Release);
                return Err(e.into());
            }
        };
        info!(addr, "listening");

        loop {
            if self.state.load(Ordering::Acquire) == STATE_STOP {
                return Ok(());
            }
            let (socket, peer) = tokio::select! {
                _ = self.stop_signal.cancelled() => return Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };
            let _ = socket.set_nodelay(true);

            let conn_id = next_conn_id();
            let router = self.router.clone();
            let conn_timeout = self.conn_timeout;
            let connections = self.connections.clone();
            info!(conn_id, %peer, "accepted connection");

            tokio::spawn(async move {
                ServerConnection::serve(conn_id, socket, router, conn_timeout, Some(connections)).await;
            });
        }
    }

    /// Marks the acceptor stopped, wakes the accept loop out of its blocking
    /// `accept()` call, and closes every connection still tracked in
    /// `connections`. Connections that have already dropped their
    /// registry entry (closed on their own) are silently skipped.
    pub fn stop(&self) {
        self.state.store(STATE_STOP, Ordering::Release);
        self.stop_signal.cancel();
        for entry in self.connections.iter() {
            if let Some(connection) = entry.value().upgrade() {
                connection.close();
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_STARTED
    }
}
