// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use coro_rpc_rs::{
    cfg::config::{ClientConfig, PoolConfig},
    client::Pool,
    protocol::error::RpcError,
    router::route_key_for_name,
};

use crate::integration_tests::common::{echo_router, spawn_server};

fn pool_config(address: String, max_connections: usize) -> PoolConfig {
    PoolConfig {
        client: ClientConfig {
            address,
            call_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(3),
        },
        max_connections,
        idle_timeout: Duration::from_millis(150),
        reap_interval: Duration::from_millis(50),
        connect_retry_count: 3,
        reconnect_wait: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn pool_reuse_caps_live_connections_at_max_connections() {
    let addr = spawn_server(echo_router()).await;
    let pool = Pool::new(pool_config(addr, 8));
    let key = route_key_for_name("echo");

    let mut handles = Vec::new();
    for i in 0..64 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let text = format!("msg-{i}");
            let response: String = pool.send_request(key, &text).await.expect("call");
            assert_eq!(response, text);
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    assert!(pool.live_count() <= 8, "live_count={}", pool.live_count());
    assert_eq!(pool.free_client_count(), pool.live_count());
}

#[tokio::test]
async fn idle_connections_are_reaped_after_idle_timeout() {
    let addr = spawn_server(echo_router()).await;
    let pool = Pool::new(pool_config(addr, 8));
    let key = route_key_for_name("echo");

    for _ in 0..4 {
        let _: String = pool.send_request(key, &"warm".to_string()).await.expect("call");
    }
    assert!(pool.free_client_count() > 0);

    tokio::time::sleep(Duration::from_millis(150) + Duration::from_millis(150) + Duration::from_millis(100)).await;
    assert_eq!(pool.free_client_count(), 0);
}

#[tokio::test]
async fn reconnect_succeeds_once_the_server_comes_up() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);

    let mut config = pool_config(addr.clone(), 4);
    config.connect_retry_count = 5;
    config.reconnect_wait = Duration::from_millis(60);
    config.client.connect_timeout = Duration::from_millis(200);
    let pool = Pool::new(config);

    let delayed_addr = addr.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        let router = echo_router();
        let acceptor = Arc::new(coro_rpc_rs::server::Acceptor::new(Arc::new(router), Duration::ZERO));
        let _ = acceptor.start(&delayed_addr).await;
    });

    let key = route_key_for_name("echo");
    let response: Result<String, RpcError> = pool.send_request(key, &"retry".to_string()).await;
    assert_eq!(response.expect("eventually connects"), "retry");
}
