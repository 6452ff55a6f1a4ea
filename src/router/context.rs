// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Deferred-response handles passed into handlers.
//!
//! A plain handler's return value is turned into a response by the router
//! automatically. A handler that needs to answer later (after an upstream
//! call, a timer, another task entirely) instead takes a [`Context`], calls
//! [`Context::set_delay`] before returning, and answers whenever it's ready
//! by calling [`Context::respond`] or [`Context::respond_error`] from any
//! task. Exactly one of those two may ever fire for a given context; the
//! second call is a no-op logged at `warn`.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use anyhow::Result;
use serde::Serialize;
use tracing::warn;

use crate::protocol::{codec::Codec, error::RpcError, framing::prepare_response};

const STATUS_INIT: u8 = 0;
const STATUS_RESPONDED: u8 = 1;

/// What a connection exposes to a [`Context`] so it can answer independently
/// of the read loop that dispatched the call.
pub trait ResponseSink: Send + Sync {
    /// Queues `frame` (a full header+body response) for the connection's
    /// writer. Errors if the connection has already gone away.
    fn send_frame(&self, frame: Vec<u8>) -> Result<()>;

    /// `true` once the underlying connection has closed; a context whose
    /// sink reports closed drops any response it's asked to send rather
    /// than erroring the caller.
    fn is_closed(&self) -> bool;

    /// Called when a context is dropped still holding the delayed flag
    /// without ever having responded, so the connection can log the
    /// abandoned call and release any keep-alive suspension tied to it.
    fn on_abandoned(&self, seq_num: u32);

    /// Called the moment a call is marked deferred, so the connection can
    /// suspend its keep-alive timer while it's outstanding.
    fn on_deferred(&self) {}

    /// Called once a previously-deferred call finally resolves (answered or
    /// abandoned), the mirror image of `on_deferred`.
    fn on_resolved(&self) {}
}

struct Inner {
    seq_num: u32,
    codec: Codec,
    sink: Arc<dyn ResponseSink>,
    status: AtomicU8,
    delayed: AtomicU8,
}

/// Handed to a handler so it can produce (or defer) the RPC response.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    pub fn new(seq_num: u32, codec: Codec, sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                seq_num,
                codec,
                sink,
                status: AtomicU8::new(STATUS_INIT),
                delayed: AtomicU8::new(0),
            }),
        }
    }

    pub fn seq_num(&self) -> u32 {
        self.inner.seq_num
    }

    /// Marks this call as deferred: the router won't auto-respond with the
    /// handler's return value, and the connection keeps the call's
    /// keep-alive suspension active until [`Context::respond`] or
    /// [`Context::respond_error`] fires.
    pub fn set_delay(&self) {
        self.inner.delayed.store(1, Ordering::Release);
        self.inner.sink.on_deferred();
    }

    pub fn is_delayed(&self) -> bool {
        self.inner.delayed.load(Ordering::Acquire) == 1
    }

    /// Sends a success response. Only the first call (across `respond` and
    /// `respond_error`) for a given context has any effect.
    pub fn respond<T: Serialize>(&self, value: &T) -> Result<()> {
        if !self.claim_response() {
            return Ok(());
        }
        let body = self.inner.codec.encode(value)?;
        self.send(body, 0)
    }

    pub fn respond_error(&self, err: RpcError) -> Result<()> {
        if !self.claim_response() {
            return Ok(());
        }
        let message = err.to_string();
        self.send(message.into_bytes(), err.err_code())
    }

    /// Sends an already-encoded success body. Used by the router for plain
    /// handlers, which produce bytes with their own codec call and have no
    /// need for [`Context::respond`]'s generic `encode`.
    pub fn respond_raw(&self, body: Vec<u8>) -> Result<()> {
        if !self.claim_response() {
            return Ok(());
        }
        self.send(body, 0)
    }

    fn claim_response(&self) -> bool {
        self.inner
            .status
            .compare_exchange(STATUS_INIT, STATUS_RESPONDED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn send(&self, body: Vec<u8>, err_code: u8) -> Result<()> {
        if self.inner.delayed.load(Ordering::Acquire) == 1 {
            self.inner.sink.on_resolved();
        }
        if self.inner.sink.is_closed() {
            return Ok(());
        }
        let frame = prepare_response(self.inner.seq_num, &body, err_code);
        self.inner.sink.send_frame(frame)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.delayed.load(Ordering::Acquire) == 1 && self.status.load(Ordering::Acquire) == STATUS_INIT {
            warn!(seq_num = self.seq_num, "deferred rpc call dropped without a response");
            self.sink.on_abandoned(self.seq_num);
            self.sink.on_resolved();
        }
    }
}
