// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::enums::LoadBalance;

/// Listener and connection-lifetime settings for [`crate::server::Acceptor`].
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(rename = "Address")]
    /// `host:port` to bind the listener to.
    pub address: String,

    #[serde(default = "default_conn_timeout", rename = "ConnTimeout", with = "serde_secs")]
    /// Keep-alive timeout applied to `read_head` when no call is deferred on
    /// the connection. Zero disables the timeout entirely.
    pub conn_timeout: Duration,
}

fn default_conn_timeout() -> Duration {
    Duration::from_secs(0)
}

impl ServerConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: ServerConfig = serde_yaml::from_str(&s).context("failed to parse server config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.address.is_empty(), "Address must not be empty");
        Ok(())
    }
}

/// Per-call behavior for [`crate::client::client::Client`].
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ClientConfig {
    #[serde(rename = "Address")]
    /// `host:port` to connect to.
    pub address: String,

    #[serde(default = "default_call_timeout", rename = "CallTimeout", with = "serde_secs")]
    /// Upper bound on a single `call_for`. Zero disables the timeout.
    pub call_timeout: Duration,

    #[serde(default = "default_connect_timeout", rename = "ConnectTimeout", with = "serde_secs")]
    /// Upper bound on establishing the TCP connection.
    pub connect_timeout: Duration,
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(3)
}

impl ClientConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: ClientConfig = serde_yaml::from_str(&s).context("failed to parse client config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.address.is_empty(), "Address must not be empty");
        Ok(())
    }
}

/// Reuse and reconnect behavior for [`crate::client::pool::Pool`].
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PoolConfig {
    #[serde(flatten)]
    pub client: ClientConfig,

    #[serde(default = "default_max_connections", rename = "MaxConnections")]
    /// Upper bound on pooled connections kept alive at once. `0` means
    /// unbounded.
    pub max_connections: usize,

    #[serde(default = "default_idle_timeout", rename = "IdleTimeout", with = "serde_secs")]
    /// How long an idle connection may sit in the free queue's old bucket
    /// before the reaper clears it.
    pub idle_timeout: Duration,

    #[serde(default = "default_reap_interval", rename = "ReapInterval", with = "serde_secs")]
    /// How often the reaper wakes up to reselect and clear the free queue.
    pub reap_interval: Duration,

    #[serde(default = "default_connect_retry_count", rename = "ConnectRetryCount")]
    /// Attempts made to (re)connect before a `get_client` call gives up.
    /// Normalized to a minimum of 1.
    pub connect_retry_count: u32,

    #[serde(default = "default_reconnect_wait", rename = "ReconnectWait", with = "serde_secs")]
    /// Fixed delay between reconnect attempts.
    pub reconnect_wait: Duration,
}

fn default_max_connections() -> usize {
    0
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reap_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_connect_retry_count() -> u32 {
    3
}

fn default_reconnect_wait() -> Duration {
    Duration::from_millis(100)
}

impl PoolConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: PoolConfig = serde_yaml::from_str(&s).context("failed to parse pool config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and normalizes derived fields.
    ///
    /// A `connect_retry_count` of 0 would mean "never even try once", which
    /// is never useful, so it's silently raised to 1 rather than treated as
    /// an error — mirroring how this runtime's reference normalizes the
    /// analogous setting instead of rejecting the config outright.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        self.client.validate_and_normalize()?;
        if self.connect_retry_count == 0 {
            self.connect_retry_count = 1;
        }
        Ok(())
    }
}

/// Endpoint list and balancing strategy for [`crate::client::channel::Channel`].
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ChannelConfig {
    #[serde(rename = "Endpoints")]
    /// `host:port` endpoints the channel load-balances across.
    pub endpoints: Vec<String>,

    #[serde(default, rename = "LoadBalance")]
    pub load_balance: LoadBalance,

    #[serde(rename = "Pool")]
    pub pool: PoolConfigTemplate,
}

/// A [`PoolConfig`] with `Address` omitted; the channel fills it in per
/// endpoint when it builds each pool.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PoolConfigTemplate {
    #[serde(default = "default_call_timeout", rename = "CallTimeout", with = "serde_secs")]
    pub call_timeout: Duration,
    #[serde(default = "default_connect_timeout", rename = "ConnectTimeout", with = "serde_secs")]
    pub connect_timeout: Duration,
    #[serde(default = "default_max_connections", rename = "MaxConnections")]
    pub max_connections: usize,
    #[serde(default = "default_idle_timeout", rename = "IdleTimeout", with = "serde_secs")]
    pub idle_timeout: Duration,
    #[serde(default = "default_reap_interval", rename = "ReapInterval", with = "serde_secs")]
    pub reap_interval: Duration,
    #[serde(default = "default_connect_retry_count", rename = "ConnectRetryCount")]
    pub connect_retry_count: u32,
    #[serde(default = "default_reconnect_wait", rename = "ReconnectWait", with = "serde_secs")]
    pub reconnect_wait: Duration,
}

impl PoolConfigTemplate {
    pub fn for_address(&self, address: String) -> PoolConfig {
        PoolConfig {
            client: ClientConfig {
                address,
                call_timeout: self.call_timeout,
                connect_timeout: self.connect_timeout,
            },
            max_connections: self.max_connections,
            idle_timeout: self.idle_timeout,
            reap_interval: self.reap_interval,
            connect_retry_count: self.connect_retry_count,
            reconnect_wait: self.reconnect_wait,
        }
    }
}

impl ChannelConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: ChannelConfig = serde_yaml::from_str(&s).context("failed to parse channel config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.endpoints.is_empty(), "Endpoints must not be empty");
        if self.pool.connect_retry_count == 0 {
            self.pool.connect_retry_count = 1;
        }
        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
