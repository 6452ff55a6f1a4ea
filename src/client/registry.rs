// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A process-wide `endpoint -> Pool` map so independent call sites that
//! happen to target the same address share one pool instead of each
//! maintaining their own connections to it.
//!
//! Insertion is insert-if-absent under a shared lock first, falling back to
//! an exclusive lock only on the (rare) miss, so the common case of
//! repeatedly fetching an already-registered pool never contends on a
//! writer.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

use tokio::sync::RwLock;

use crate::{cfg::config::PoolConfig, client::pool::Pool};

#[derive(Default)]
pub struct PoolsRegistry {
    pools: RwLock<HashMap<String, Arc<Pool>>>,
}

static GLOBAL: OnceLock<PoolsRegistry> = OnceLock::new();

impl PoolsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-scoped registry channels default to. Constructed on
    /// first call; every channel that doesn't ask for its own registry
    /// shares this one, so two channels pointed at the same endpoint reuse
    /// one `Pool` instead of dialing it twice.
    pub fn global() -> &'static PoolsRegistry {
        GLOBAL.get_or_init(PoolsRegistry::default)
    }

    /// Returns the existing pool for `config.client.address`, or builds and
    /// registers one.
    pub async fn get_or_create(&self, config: PoolConfig) -> Arc<Pool> {
        let address = config.client.address.clone();

        if let Some(pool) = self.pools.read().await.get(&address) {
            return pool.clone();
        }

        let mut pools = self.pools.write().await;
        if let Some(pool) = pools.get(&address) {
            return pool.clone();
        }
        let pool = Pool::new(config);
        pools.insert(address, pool.clone());
        pool
    }

    pub async fn remove(&self, address: &str) -> Option<Arc<Pool>> {
        let pool = self.pools.write().await.remove(address);
        if let Some(pool) = &pool {
            pool.shutdown();
        }
        pool
    }

    pub async fn len(&self) -> usize {
        self.pools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cfg::config::ClientConfig;

    fn config(address: &str) -> PoolConfig {
        PoolConfig {
            client: ClientConfig {
                address: address.to_string(),
                call_timeout: Duration::from_secs(2),
                connect_timeout: Duration::from_secs(2),
            },
            max_connections: 0,
            idle_timeout: Duration::from_secs(30),
            reap_interval: Duration::from_secs(10),
            connect_retry_count: 1,
            reconnect_wait: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn get_or_create_returns_the_same_pool_for_the_same_address() {
        let registry = PoolsRegistry::new();
        let a = registry.get_or_create(config("127.0.0.1:9100")).await;
        let b = registry.get_or_create(config("127.0.0.1:9100")).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn distinct_addresses_get_distinct_pools() {
        let registry = PoolsRegistry::new();
        let a = registry.get_or_create(config("127.0.0.1:9101")).await;
        let b = registry.get_or_create(config("127.0.0.1:9102")).await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn remove_drops_the_pool_from_the_map() {
        let registry = PoolsRegistry::new();
        registry.get_or_create(config("127.0.0.1:9103")).await;
        assert!(registry.remove("127.0.0.1:9103").await.is_some());
        assert!(registry.is_empty().await);
    }
}
