// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Toy echo client: dials the server from `echo_server.rs`, calls `echo`
//! once, and prints what came back.

use anyhow::{Context, Result};
use coro_rpc_rs::{cfg::config::ClientConfig, client::Client, router::route_key_for_name};

#[tokio::main]
async fn main() -> Result<()> {
    let address = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:9000".to_string());
    let message = std::env::args().nth(2).unwrap_or_else(|| "Hello world!".to_string());

    let config = ClientConfig {
        address,
        call_timeout: std::time::Duration::from_secs(5),
        connect_timeout: std::time::Duration::from_secs(3),
    };
    let client = Client::connect(&config).await.context("failed to connect")?;

    let key = route_key_for_name("echo");
    let response: String = client.call_for(key, &message).await.context("call failed")?;
    println!("{response}");
    Ok(())
}
