// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request/response header layouts.
//!
//! ```text
//! request  (20 bytes, little-endian)
//! ┌───────┬─────────┬────────────────┬──────────┬─────────┬─────────────┬────────┬──────────┐
//! │ magic │ version │ serialize_type │ msg_type │ seq_num │ function_id │ length │ reserved │
//! ├───────┼─────────┼────────────────┼──────────┼─────────┼─────────────┼────────┼──────────┤
//! │   1   │    1    │       1        │    1     │    4    │      4      │   4    │    4     │
//! └───────┴─────────┴────────────────┴──────────┴─────────┴─────────────┴────────┴──────────┘
//!
//! response (16 bytes, little-endian)
//! ┌───────┬─────────┬──────────┬──────────┬─────────┬────────┬──────────┐
//! │ magic │ version │ err_code │ msg_type │ seq_num │ length │ reserved │
//! ├───────┼─────────┼──────────┼──────────┼─────────┼────────┼──────────┤
//! │   1   │    1    │    1     │    1     │    4    │   4    │    4     │
//! └───────┴─────────┴──────────┴──────────┴─────────┴────────┴──────────┘
//! ```

use anyhow::{Result, bail};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, U32};

/// Magic byte every frame on the wire must start with.
pub const HEADER_MAGIC: u8 = 0x15;

/// Byte length of [`RequestHeader`] on the wire.
pub const REQ_HEADER_LEN: usize = 20;
/// Byte length of [`ResponseHeader`] on the wire.
pub const RESP_HEADER_LEN: usize = 16;

/// The protocol version this crate speaks.
pub const PROTOCOL_VERSION: u8 = 1;

/// Header sent by the client ahead of every request payload.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RequestHeader {
    pub magic: u8,
    pub version: u8,
    pub serialize_type: u8,
    /// Reserved for future framing variants; writers set 0.
    pub msg_type: u8,
    pub seq_num: U32<LittleEndian>,
    pub function_id: U32<LittleEndian>,
    pub length: U32<LittleEndian>,
    reserved: U32<LittleEndian>,
}

impl RequestHeader {
    pub fn new(seq_num: u32, function_id: u32, length: u32) -> Self {
        Self {
            magic: HEADER_MAGIC,
            version: PROTOCOL_VERSION,
            serialize_type: 0,
            msg_type: 0,
            seq_num: U32::new(seq_num),
            function_id: U32::new(function_id),
            length: U32::new(length),
            reserved: U32::new(0),
        }
    }

    pub fn to_bytes(&self) -> [u8; REQ_HEADER_LEN] {
        let mut buf = [0u8; REQ_HEADER_LEN];
        buf.copy_from_slice(self.as_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != REQ_HEADER_LEN {
            bail!("request header must be {REQ_HEADER_LEN} bytes, got {}", buf.len());
        }
        let hdr = Self::read_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("malformed request header: {e}"))?;
        Ok(hdr)
    }

    #[inline]
    pub fn has_valid_magic(&self) -> bool {
        self.magic == HEADER_MAGIC
    }

    #[inline]
    pub fn seq_num(&self) -> u32 {
        self.seq_num.get()
    }

    #[inline]
    pub fn function_id(&self) -> u32 {
        self.function_id.get()
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.length.get()
    }
}

/// Header sent by the server ahead of every response body.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct ResponseHeader {
    pub magic: u8,
    pub version: u8,
    pub err_code: u8,
    pub msg_type: u8,
    pub seq_num: U32<LittleEndian>,
    pub length: U32<LittleEndian>,
    reserved: U32<LittleEndian>,
}

impl ResponseHeader {
    pub fn new(seq_num: u32, length: u32, err_code: u8) -> Self {
        Self {
            magic: HEADER_MAGIC,
            version: PROTOCOL_VERSION,
            err_code,
            msg_type: 0,
            seq_num: U32::new(seq_num),
            length: U32::new(length),
            reserved: U32::new(0),
        }
    }

    pub fn to_bytes(&self) -> [u8; RESP_HEADER_LEN] {
        let mut buf = [0u8; RESP_HEADER_LEN];
        buf.copy_from_slice(self.as_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() != RESP_HEADER_LEN {
            bail!("response header must be {RESP_HEADER_LEN} bytes, got {}", buf.len());
        }
        let hdr = Self::read_from_bytes(buf)
            .map_err(|e| anyhow::anyhow!("malformed response header: {e}"))?;
        Ok(hdr)
    }

    #[inline]
    pub fn has_valid_magic(&self) -> bool {
        self.magic == HEADER_MAGIC
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.err_code == 0
    }

    #[inline]
    pub fn seq_num(&self) -> u32 {
        self.seq_num.get()
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.length.get()
    }
}
