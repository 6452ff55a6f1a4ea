// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Body (de)serialization is independent of framing: the `serialize_type`
//! byte in [`crate::protocol::header::RequestHeader`] picks one of these at
//! dispatch time, so a single server can serve bincode and JSON clients on
//! the same listener.

use anyhow::{Result, bail};
use serde::{Serialize, de::DeserializeOwned};

/// Tag carried in the wire header identifying which [`Codec`] encoded the
/// body.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SerializeType {
    #[default]
    Bincode = 0,
    Json = 1,
}

impl SerializeType {
    pub fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            0 => SerializeType::Bincode,
            1 => SerializeType::Json,
            other => bail!("unknown serialize_type: {other}"),
        })
    }
}

/// Encodes/decodes RPC bodies to and from bytes. Picked per-call from the
/// wire's `serialize_type` tag, so router and client share one codepath for
/// both formats.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    #[default]
    Bincode,
    Json,
}

impl Codec {
    pub fn from_serialize_type(ty: SerializeType) -> Self {
        match ty {
            SerializeType::Bincode => Codec::Bincode,
            SerializeType::Json => Codec::Json,
        }
    }

    pub fn serialize_type(&self) -> SerializeType {
        match self {
            Codec::Bincode => SerializeType::Bincode,
            Codec::Json => SerializeType::Json,
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Codec::Bincode => {
                bincode::serialize(value).map_err(|e| anyhow::anyhow!("bincode encode failed: {e}"))
            }
            Codec::Json => {
                serde_json::to_vec(value).map_err(|e| anyhow::anyhow!("json encode failed: {e}"))
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Codec::Bincode => {
                bincode::deserialize(bytes).map_err(|e| anyhow::anyhow!("bincode decode failed: {e}"))
            }
            Codec::Json => {
                serde_json::from_slice(bytes).map_err(|e| anyhow::anyhow!("json decode failed: {e}"))
            }
        }
    }
}
