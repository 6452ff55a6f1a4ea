// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Load-balances calls across a fixed set of endpoints, each backed by its
//! own [`Pool`].
//!
//! A channel never retries a call against a different endpoint: if the
//! endpoint its balancer picked is down, the caller sees that endpoint's
//! error. Retrying across endpoints would silently turn a single logical
//! call into several, which callers that aren't idempotent can't tolerate.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use rand::RngExt;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    cfg::{config::ChannelConfig, enums::LoadBalance},
    client::{pool::Pool, registry::PoolsRegistry},
    protocol::error::RpcError,
};

pub struct Channel {
    pools: Vec<Arc<Pool>>,
    load_balance: LoadBalance,
    next: AtomicU32,
}

impl Channel {
    /// Materializes one pool per endpoint through the process-scoped
    /// [`PoolsRegistry`], so a channel pointed at an endpoint another
    /// channel already talks to reuses that pool's connections instead of
    /// dialing a second set.
    pub async fn new(config: ChannelConfig) -> Self {
        Self::with_registry(config, PoolsRegistry::global()).await
    }

    /// Like [`Channel::new`], but against a caller-supplied registry
    /// instead of the global one.
    pub async fn with_registry(config: ChannelConfig, registry: &PoolsRegistry) -> Self {
        let mut pools = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            let pool = registry.get_or_create(config.pool.for_address(endpoint.clone())).await;
            pools.push(pool);
        }
        Self { pools, load_balance: config.load_balance, next: AtomicU32::new(0) }
    }

    pub fn endpoint_count(&self) -> usize {
        self.pools.len()
    }

    fn pick(&self) -> &Arc<Pool> {
        let index = match self.load_balance {
            LoadBalance::RoundRobin => self.next.fetch_add(1, Ordering::Relaxed) as usize % self.pools.len(),
            LoadBalance::Random => rand::rng().random_range(0..self.pools.len()),
        };
        &self.pools[index]
    }

    pub async fn send_request<Req, Resp>(&self, function_id: u32, req: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        if self.pools.is_empty() {
            return Err(RpcError::NotConnected);
        }
        self.pick().send_request(function_id, req).await
    }

    /// Like [`Channel::send_request`], but `op` also sees the endpoint the
    /// balancer picked — for call builders that need the address itself
    /// (an HTTP `Host` header is the canonical example) and not just a
    /// connection to it.
    pub async fn send_request_with_host<Req, Resp, F>(&self, op: F) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
        F: FnOnce(&str) -> (u32, Req),
    {
        if self.pools.is_empty() {
            return Err(RpcError::NotConnected);
        }
        self.pick().send_request_with_host(op).await
    }
}
