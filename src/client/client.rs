// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A single RPC connection: connect, make calls, reconnect.
//!
//! Calls on one [`Client`] are not pipelined — `call_for` takes an
//! exclusive lock on the socket for the duration of the round trip — which
//! matches how a pooled connection is actually used: the pool hands out one
//! `Client` per in-flight call and nothing else touches it concurrently.
//!
//! Timeout handling is deliberately simpler than the state this is modeled
//! on: `tokio::time::timeout` dropping the call future is enough to stop
//! polling it safely, so there's no need to explicitly cancel or close the
//! socket out from under a blocked read the way an asio-based cancellation
//! would. What *does* matter is that a timed-out call may have left the
//! connection's byte stream desynchronized (a partial write, or a response
//! abandoned mid-read), so [`Client::is_timed_out`] permanently disqualifies
//! this connection from being reused once it fires.

use std::{
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::Duration,
};

use serde::{Serialize, de::DeserializeOwned};
use tokio::{net::TcpStream, sync::Mutex, time::timeout};

use crate::{
    cfg::config::ClientConfig,
    protocol::{
        codec::Codec,
        error::RpcError,
        framing::{prepare_request, read_response_head, read_response_payload, write_all},
    },
};

pub struct Client {
    stream: Mutex<TcpStream>,
    address: String,
    call_timeout: Duration,
    next_seq: AtomicU32,
    is_timeout: AtomicBool,
}

impl Client {
    pub async fn connect(config: &ClientConfig) -> Result<Self, RpcError> {
        let stream = if config.connect_timeout.is_zero() {
            TcpStream::connect(&config.address).await.map_err(RpcError::Io)?
        } else {
            timeout(config.connect_timeout, TcpStream::connect(&config.address))
                .await
                .map_err(|_| RpcError::TimedOut)?
                .map_err(RpcError::Io)?
        };
        let _ = stream.set_nodelay(true);
        Ok(Self {
            stream: Mutex::new(stream),
            address: config.address.clone(),
            call_timeout: config.call_timeout,
            next_seq: AtomicU32::new(1),
            is_timeout: AtomicBool::new(false),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// `true` once a call on this client has timed out. A pool must not
    /// return such a client to its free queue.
    pub fn is_timed_out(&self) -> bool {
        self.is_timeout.load(Ordering::Acquire)
    }

    pub async fn call_for<Req, Resp>(&self, function_id: u32, req: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let codec = Codec::Bincode;
        let body = codec.encode(req).map_err(|e| RpcError::SerializeError(e.to_string()))?;
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let frame = prepare_request(seq, function_id, &body, codec.serialize_type());

        let payload = if self.call_timeout.is_zero() {
            self.call_once(&frame).await?
        } else {
            match timeout(self.call_timeout, self.call_once(&frame)).await {
                Ok(result) => result?,
                Err(_) => {
                    self.is_timeout.store(true, Ordering::Release);
                    return Err(RpcError::TimedOut);
                }
            }
        };

        codec.decode(&payload).map_err(|e| RpcError::SerializeError(e.to_string()))
    }

    async fn call_once(&self, frame: &[u8]) -> Result<Vec<u8>, RpcError> {
        let mut stream = self.stream.lock().await;
        write_all(&mut *stream, frame)
            .await
            .map_err(|e| RpcError::Io(std::io::Error::other(e.to_string())))?;

        let head = read_response_head(&mut *stream)
            .await
            .map_err(|e| RpcError::ProtocolError(e.to_string()))?;
        let body = read_response_payload(&mut *stream, &head)
            .await
            .map_err(|e| RpcError::ProtocolError(e.to_string()))?;

        if head.is_ok() {
            Ok(body)
        } else {
            let message = String::from_utf8_lossy(&body).into_owned();
            Err(RpcError::from_err_code(head.err_code, message))
        }
    }
}
