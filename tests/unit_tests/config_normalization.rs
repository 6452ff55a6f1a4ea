// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use coro_rpc_rs::cfg::{
    config::{ChannelConfig, ClientConfig, PoolConfigTemplate},
    enums::LoadBalance,
};

fn template() -> PoolConfigTemplate {
    PoolConfigTemplate {
        call_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(3),
        max_connections: 8,
        idle_timeout: Duration::from_secs(30),
        reap_interval: Duration::from_secs(10),
        connect_retry_count: 0,
        reconnect_wait: Duration::from_millis(100),
    }
}

#[test]
fn channel_config_normalizes_zero_retry_count_to_one() {
    let mut cfg = ChannelConfig {
        endpoints: vec!["127.0.0.1:9000".into()],
        load_balance: LoadBalance::Random,
        pool: template(),
    };
    cfg.validate_and_normalize().expect("valid");
    assert_eq!(cfg.pool.connect_retry_count, 1);
}

#[test]
fn pool_config_template_for_address_carries_every_field() {
    let template = template();
    let pool_config = template.for_address("10.0.0.5:7000".to_string());
    assert_eq!(pool_config.client.address, "10.0.0.5:7000");
    assert_eq!(pool_config.client.call_timeout, template.call_timeout);
    assert_eq!(pool_config.max_connections, template.max_connections);
    assert_eq!(pool_config.idle_timeout, template.idle_timeout);
    assert_eq!(pool_config.reap_interval, template.reap_interval);
    assert_eq!(pool_config.reconnect_wait, template.reconnect_wait);
}

#[test]
fn client_config_rejects_empty_address() {
    let mut cfg = ClientConfig {
        address: String::new(),
        call_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(3),
    };
    assert!(cfg.validate_and_normalize().is_err());
}
