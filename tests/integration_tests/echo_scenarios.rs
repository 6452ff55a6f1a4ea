// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The concrete end-to-end scenarios from the testable-properties list,
//! exercised against the public client/server API over real TCP sockets.

use std::time::{Duration, Instant};

use coro_rpc_rs::{
    client::Client,
    protocol::error::RpcError,
    router::{Router, route_key_for_name},
};
use tokio::{io::AsyncWriteExt, net::TcpStream};

use crate::integration_tests::common::{client_config, echo_router, spawn_server};

#[tokio::test]
async fn echo_success() {
    let addr = spawn_server(echo_router()).await;
    let client = Client::connect(&client_config(addr, Duration::from_secs(5))).await.expect("connect");
    let key = route_key_for_name("echo");
    let response: String = client.call_for(key, &"Hello world!".to_string()).await.expect("call");
    assert_eq!(response, "Hello world!");
}

#[tokio::test]
async fn unknown_function_reports_the_canonical_message() {
    let addr = spawn_server(Router::new()).await;
    let client = Client::connect(&client_config(addr, Duration::from_secs(5))).await.expect("connect");
    let result: Result<String, RpcError> = client.call_for(0xDEAD_BEEF, &"hi".to_string()).await;
    match &result {
        Err(RpcError::FunctionNotSupported(_)) => {}
        other => panic!("expected FunctionNotSupported, got {other:?}"),
    }
    assert_eq!(result.unwrap_err().to_string(), "the rpc function not registered");
}

#[tokio::test]
async fn bad_magic_closes_the_connection_without_a_response() {
    let addr = spawn_server(echo_router()).await;
    let mut socket = TcpStream::connect(&addr).await.expect("connect");
    // A well-formed length header but a corrupted magic byte.
    let garbage = [0x16u8, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    socket.write_all(&garbage).await.expect("write");
    socket.flush().await.expect("flush");

    let mut buf = [0u8; 1];
    let result = tokio::time::timeout(Duration::from_secs(1), tokio::io::AsyncReadExt::read(&mut socket, &mut buf))
        .await
        .expect("no timeout");
    // the peer closes without writing anything back: a clean EOF (n == 0)
    assert_eq!(result.expect("read"), 0);
}

#[tokio::test]
async fn call_times_out_within_the_configured_window() {
    let mut router = Router::new();
    router.register_with_context("slow", |_: (), ctx| async move {
        ctx.set_delay();
        // never responds
        Ok::<(), RpcError>(())
    });
    let addr = spawn_server(router).await;
    let client = Client::connect(&client_config(addr, Duration::from_millis(100))).await.expect("connect");

    let key = route_key_for_name("slow");
    let started = Instant::now();
    let result: Result<(), RpcError> = client.call_for(key, &()).await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(RpcError::TimedOut)));
    assert!(client.is_timed_out());
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(500), "elapsed={elapsed:?}");
}
