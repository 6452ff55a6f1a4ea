// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The client side: a single [`client::Client`] connection, a [`pool::Pool`]
//! of them per endpoint, a [`channel::Channel`] load-balancing across
//! several endpoints' pools, and a process-wide [`registry::PoolsRegistry`]
//! so repeated calls to the same endpoint share one pool.

#![allow(clippy::module_inception)]
pub mod channel;
pub mod client;
pub mod pool;
pub mod registry;

pub use channel::Channel;
pub use client::Client;
pub use pool::Pool;
pub use registry::PoolsRegistry;
