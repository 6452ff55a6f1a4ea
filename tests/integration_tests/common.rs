// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use coro_rpc_rs::{cfg::config::ClientConfig, protocol::error::RpcError, router::Router, server::Acceptor};
use tokio::net::TcpListener;

/// Binds an ephemeral port, spawns an acceptor running `router` on it, and
/// returns the bound address. The acceptor keeps running for the lifetime of
/// the test process.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    drop(listener);

    let acceptor = Arc::new(Acceptor::new(Arc::new(router), Duration::ZERO));
    let bind_addr = addr.clone();
    tokio::spawn(async move {
        let _ = acceptor.start(&bind_addr).await;
    });
    // give the acceptor a moment to bind before the caller connects
    tokio::time::sleep(Duration::from_millis(20)).await;
    addr
}

pub fn echo_router() -> Router {
    let mut router = Router::new();
    router.register("echo", |text: String| Ok::<String, RpcError>(text));
    router
}

pub fn client_config(address: String, call_timeout: Duration) -> ClientConfig {
    ClientConfig { address, call_timeout, connect_timeout: Duration::from_secs(3) }
}
