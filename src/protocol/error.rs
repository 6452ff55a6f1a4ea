// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The typed error taxonomy surfaced to clients and logged on the server.
//!
//! Every variant maps to a single-byte `err_code` carried in
//! [`crate::protocol::header::ResponseHeader`]; `0` always means success and
//! is never constructed as an [`RpcError`].

use thiserror::Error;

/// Errors observed by a client making a call, and raised internally by a
/// server connection while servicing one.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("call timed out")]
    TimedOut,

    #[error("not connected")]
    NotConnected,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("the rpc function not registered")]
    FunctionNotSupported(u32),

    #[error("operation interrupted")]
    Interrupted,

    #[error("malformed frame: {0}")]
    ProtocolError(String),

    #[error("operation canceled")]
    OperationCanceled,

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("failed to deserialize request body: {0}")]
    SerializeError(String),
}

impl RpcError {
    /// The byte written into `ResponseHeader::err_code`.
    ///
    /// Codes below 0x80 are taken from the client-observed taxonomy so a
    /// client can match on them without depending on this crate's enum
    /// layout; codes at/above 0x80 are server-internal and never meant to be
    /// interpreted beyond "the call failed".
    pub fn err_code(&self) -> u8 {
        match self {
            RpcError::Io(_) => 1,
            RpcError::TimedOut => 2,
            RpcError::NotConnected => 3,
            RpcError::InvalidArgument(_) => 4,
            RpcError::FunctionNotSupported(_) => 5,
            RpcError::Interrupted => 6,
            RpcError::ProtocolError(_) => 0x80,
            RpcError::OperationCanceled => 0x81,
            RpcError::HandlerPanicked(_) => 0x82,
            RpcError::SerializeError(_) => 0x83,
        }
    }

    /// Reconstruct an [`RpcError`] from a response's `err_code` and its
    /// (possibly empty) body, which the server treats as a UTF-8 message.
    pub fn from_err_code(code: u8, message: String) -> Self {
        match code {
            1 => RpcError::Io(std::io::Error::other(message)),
            2 => RpcError::TimedOut,
            3 => RpcError::NotConnected,
            4 => RpcError::InvalidArgument(message),
            // the wire carries the literal "the rpc function not registered"
            // message, not the numeric function id, so it can't be
            // recovered here; callers that need it already have it from
            // the request they just made.
            5 => RpcError::FunctionNotSupported(0),
            6 => RpcError::Interrupted,
            0x81 => RpcError::OperationCanceled,
            0x82 => RpcError::HandlerPanicked(message),
            0x83 => RpcError::SerializeError(message),
            _ => RpcError::ProtocolError(message),
        }
    }
}
