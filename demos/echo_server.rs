// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Toy echo service: registers one plain handler and one deferred handler,
//! then serves them until killed.

use std::sync::Arc;

use anyhow::{Context, Result};
use coro_rpc_rs::{
    cfg::{cli::resolve_config_path, config::ServerConfig},
    protocol::error::RpcError,
    router::{Context as RpcContext, Router},
    server::Acceptor,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/echo_server.yaml".to_string());
    let config = resolve_config_path(&config_path)
        .and_then(ServerConfig::load_from_file)
        .context("failed to resolve or load server config")?;

    let mut router = Router::new();
    router.register("echo", |text: String| Ok::<String, RpcError>(text));
    router.register_with_context("slow_echo", |text: String, ctx: RpcContext| async move {
        ctx.set_delay();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            let _ = ctx.respond(&text);
        });
        Ok::<String, RpcError>(String::new())
    });

    let acceptor = Arc::new(Acceptor::new(Arc::new(router), config.conn_timeout));
    info!(address = %config.address, "starting echo server");
    acceptor.start(&config.address).await
}
