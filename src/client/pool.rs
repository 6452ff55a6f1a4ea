// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A pool of [`Client`] connections to one endpoint.
//!
//! Idle connections live in a [`FreeQueue`], reused exactly the way the
//! queue is designed to be used: `reselect` freezes whatever's currently
//! idle into the "old" bucket, and `clear_old` drains that frozen bucket
//! after another `idle_timeout` has passed. A connection therefore survives
//! somewhere between one and two `idle_timeout` periods before being
//! dropped, which is the same imprecision the two-bucket queue design
//! accepts in exchange for never needing a per-item timestamp.
//!
//! The reaper is not a background timer running for the pool's entire
//! lifetime: it is spawned by [`Pool::collect_free_client`] the moment the
//! free queue transitions from empty to non-empty, and it exits once it has
//! drained the queue back to empty. `collector_running` is the single-bit
//! CAS gate that keeps exactly one reaper alive per pool at a time — the
//! same `collecter_cnt_`/`queue_size_` handshake `client_pool.hpp`'s
//! `collect_free_client`/`collect_idle_timeout_client` pair uses, adapted
//! from a per-item timestamp queue to the two-bucket design above.

use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicUsize, Ordering},
};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::{cfg::config::PoolConfig, client::client::Client, protocol::error::RpcError, queue::FreeQueue};

pub struct Pool {
    config: PoolConfig,
    free: FreeQueue<Arc<Client>>,
    live: AtomicUsize,
    collector_running: AtomicU8,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            free: FreeQueue::new(),
            live: AtomicUsize::new(0),
            collector_running: AtomicU8::new(0),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.client.address
    }

    /// Alias for [`Pool::endpoint`]; some call sites (the channel's
    /// per-endpoint metrics) read more naturally asking for a "host name"
    /// than an "endpoint".
    pub fn get_host_name(&self) -> &str {
        self.endpoint()
    }

    /// Number of connections currently checked out or idle in the free
    /// queue.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Number of connections currently idle in the free queue.
    pub fn free_client_count(&self) -> usize {
        self.free.len()
    }

    /// `true` while a reaper task is alive for this pool. Exposed for tests;
    /// a freshly created or fully-drained pool always reports `false`.
    pub fn reaper_running(&self) -> bool {
        self.collector_running.load(Ordering::Acquire) != 0
    }

    /// Stops this pool's reaper (if any, by draining the queue it's watching)
    /// and drops every idle connection. Checked-out clients already in
    /// flight finish normally; they just won't be returned to a live free
    /// queue.
    pub fn shutdown(&self) {
        // Two reselect+clear passes: the first drains whatever was already
        // the old bucket, the second flips and drains what used to be the
        // selected one, so both buckets end up empty regardless of which
        // was which when shutdown was called. A reaper that's mid-sleep
        // finds the queue empty on its next wakeup and exits on its own.
        let mut drained = self.free.clear_old(usize::MAX);
        self.free.reselect();
        drained += self.free.clear_old(usize::MAX);
        if drained > 0 {
            self.live.fetch_sub(drained, Ordering::AcqRel);
        }
    }

    /// Hands out an idle connection if one is available and hasn't already
    /// timed out; otherwise dials a fresh one, retrying up to
    /// `connect_retry_count` times with `reconnect_wait` between attempts.
    pub async fn get_client(&self) -> Result<Arc<Client>, RpcError> {
        while let Some(client) = self.free.try_dequeue() {
            if !client.is_timed_out() {
                return Ok(client);
            }
            self.live.fetch_sub(1, Ordering::AcqRel);
        }
        self.reconnect().await
    }

    /// Dials a brand new connection, bypassing the free queue entirely.
    pub async fn reconnect(&self) -> Result<Arc<Client>, RpcError> {
        let mut last_err = RpcError::NotConnected;
        for attempt in 1..=self.config.connect_retry_count {
            match Client::connect(&self.config.client).await {
                Ok(client) => {
                    self.live.fetch_add(1, Ordering::AcqRel);
                    return Ok(Arc::new(client));
                }
                Err(e) => {
                    warn!(
                        endpoint = self.endpoint(),
                        attempt,
                        error = %e,
                        "reconnect attempt failed",
                    );
                    last_err = e;
                    if attempt < self.config.connect_retry_count {
                        tokio::time::sleep(self.config.reconnect_wait).await;
                    }
                }
            }
        }
        Err(last_err)
    }

    /// Returns `client` to the free queue, unless it timed out or the pool
    /// is already at `max_connections` worth of idle connections.
    ///
    /// Takes `self: &Arc<Self>` rather than `&self` because the enqueue that
    /// transitions the queue from empty to non-empty is the one responsible
    /// for spawning the reaper task, which needs a `'static` handle on the
    /// pool to outlive this call.
    pub fn collect_free_client(self: &Arc<Self>, client: Arc<Client>) {
        if client.is_timed_out() {
            self.live.fetch_sub(1, Ordering::AcqRel);
            return;
        }
        if self.config.max_connections != 0 && self.free.len() >= self.config.max_connections {
            self.live.fetch_sub(1, Ordering::AcqRel);
            debug!(endpoint = self.endpoint(), "dropping idle connection above max_connections");
            return;
        }
        let size_after = self.free.enqueue(client);
        if size_after != 1 {
            return;
        }
        if self.config.idle_timeout.is_zero() || self.config.reap_interval.is_zero() {
            return;
        }
        if self.collector_running.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire).is_ok() {
            tokio::spawn(run_reaper(self.clone()));
        }
    }

    /// Checks out a connection, makes the call, and returns it to the pool.
    /// A timed-out call leaves the connection discarded rather than
    /// returned, since its byte stream can no longer be trusted.
    pub async fn send_request<Req, Resp>(self: &Arc<Self>, function_id: u32, req: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let client = self.get_client().await?;
        let result = client.call_for(function_id, req).await;
        self.collect_free_client(client);
        result
    }

    /// Like [`Pool::send_request`], but passes this pool's endpoint to `op`
    /// alongside the checked-out connection. Some call builders need the
    /// endpoint itself — an HTTP `Host` header being the canonical example —
    /// not just a connection to it. Used by the channel's per-host call
    /// variant so a load-balanced call can still see which endpoint it
    /// landed on.
    pub async fn send_request_with_host<Req, Resp, F>(self: &Arc<Self>, op: F) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
        F: FnOnce(&str) -> (u32, Req),
    {
        let client = self.get_client().await?;
        let (function_id, req) = op(self.endpoint());
        let result = client.call_for(function_id, &req).await;
        self.collect_free_client(client);
        result
    }
}

/// Drains the free queue one `idle_timeout` period at a time, mirroring
/// `collect_idle_timeout_client`: sleep, freeze the currently-idle bucket,
/// sleep again, drain the frozen one. Exits once the queue is empty;
/// re-arms itself (instead of exiting) if `collect_free_client` raced a
/// fresh item in while this pass was draining.
async fn run_reaper(pool: Arc<Pool>) {
    loop {
        tokio::time::sleep(pool.config.idle_timeout).await;
        pool.free.reselect();
        tokio::time::sleep(pool.config.reap_interval).await;
        let removed = pool.free.clear_old(usize::MAX);
        if removed > 0 {
            pool.live.fetch_sub(removed, Ordering::AcqRel);
            debug!(endpoint = pool.endpoint(), removed, "reaped idle connections");
        }

        pool.collector_running.store(0, Ordering::Release);
        if pool.free.is_empty() {
            return;
        }
        if pool
            .collector_running
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // a concurrent collect_free_client already spawned a fresh
            // reaper for the items that arrived while this pass ran.
            return;
        }
    }
}
