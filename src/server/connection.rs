// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! One accepted TCP connection's read/route/write state machine.
//!
//! The read loop is: read a header, read its payload, hand it to the
//! [`Router`], enqueue whatever response comes back. Writes go through an
//! unbounded FIFO channel into a dedicated writer task so a slow/blocked
//! socket write never stalls the next read, and so a deferred [`Context`]
//! answering from an unrelated task can enqueue a response without taking a
//! lock on the socket itself.
//!
//! The keep-alive timer that bounds the wait for the next request is
//! suspended while any call on this connection is deferred
//! (`delay_count > 0`): a client waiting on a slow deferred call shouldn't be
//! disconnected just because no *new* request has arrived in the meantime.
//! Abandoning a deferred call without ever answering it — the context got
//! dropped instead of resolved — closes the connection outright instead of
//! leaving the peer to wait on a reply that will never come.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use tokio::{
    io::AsyncWriteExt,
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    io::{PeriodTimer, io_with_timeout},
    protocol::{
        codec::Codec,
        error::RpcError,
        framing::{get_route_key, get_serialize_protocol, prepare_response, read_head, read_payload},
        header::RequestHeader,
    },
    router::{Context, ResponseSink, Router},
};

/// The connection's outstanding-response accounting, mirroring the four
/// states a call on this connection can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCallType {
    /// No deferred call in flight for the current request.
    NonCallback,
    /// The handler called `Context::set_delay` and returned.
    CallbackWithDelay,
}

pub struct ServerConnection {
    pub conn_id: u64,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    closed: AtomicBool,
    delay_count: AtomicI64,
    peer: String,
    cancel: CancellationToken,
}

impl ServerConnection {
    /// Splits `socket`, spawns the writer task, and runs the read loop to
    /// completion on the caller's task. Returns once the connection closes.
    ///
    /// `registry`, if given, gets a weak handle to this connection under
    /// `conn_id` for the duration of the call, so an acceptor can enumerate
    /// live connections without keeping them alive itself.
    pub async fn serve(
        conn_id: u64,
        socket: TcpStream,
        router: Arc<Router>,
        keepalive: Duration,
        registry: Option<Arc<dashmap::DashMap<u64, std::sync::Weak<ServerConnection>>>>,
    ) {
        let peer = socket
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let (read_half, write_half) = socket.into_split();
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let connection = Arc::new(Self {
            conn_id,
            write_tx,
            closed: AtomicBool::new(false),
            delay_count: AtomicI64::new(0),
            peer: peer.clone(),
            cancel: CancellationToken::new(),
        });

        if let Some(registry) = &registry {
            registry.insert(conn_id, Arc::downgrade(&connection));
        }

        let writer_task = tokio::spawn(run_writer(write_half, write_rx, connection.cancel.clone()));

        if let Err(e) = connection.read_loop(read_half, router, keepalive).await {
            debug!(conn_id, peer, error = %e, "connection closed");
        }

        connection.close();
        let _ = writer_task.await;

        if let Some(registry) = &registry {
            registry.remove(&conn_id);
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn read_loop(
        self: &Arc<Self>,
        mut socket: OwnedReadHalf,
        router: Arc<Router>,
        keepalive: Duration,
    ) -> Result<()> {
        let mut timer = PeriodTimer::new(if keepalive.is_zero() { Duration::from_secs(1) } else { keepalive });
        if keepalive.is_zero() {
            timer.pause();
        }

        loop {
            if !keepalive.is_zero() {
                if self.delay_count.load(Ordering::Acquire) > 0 {
                    timer.pause();
                } else {
                    // re-arm: the window bounds time since the *last*
                    // completed request, not wall-clock ticks since the
                    // connection was opened.
                    timer.pause();
                    timer.resume();
                }
            }

            let head = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(conn_id = self.conn_id, peer = %self.peer, "connection canceled");
                    return Ok(());
                }
                _ = timer.tick() => {
                    info!(conn_id = self.conn_id, peer = %self.peer, "keep-alive timeout");
                    return Ok(());
                }
                result = read_head(&mut socket) => result?,
            };

            let Some(head) = head else {
                debug!(conn_id = self.conn_id, peer = %self.peer, "peer closed connection");
                return Ok(());
            };

            let Some(serialize_type) = get_serialize_protocol(&head) else {
                warn!(conn_id = self.conn_id, "unsupported serialize_type {}", head.serialize_type);
                let frame = prepare_response(
                    head.seq_num(),
                    RpcError::ProtocolError("unsupported serialize_type".into())
                        .to_string()
                        .into_bytes()
                        .as_slice(),
                    RpcError::ProtocolError(String::new()).err_code(),
                );
                let _ = self.write_tx.send(frame);
                continue;
            };

            let body = if keepalive.is_zero() {
                read_payload(&mut socket, &head).await?
            } else {
                io_with_timeout("read_payload", read_payload_io(&mut socket, &head), keepalive, &self.cancel)
                    .await
                    .map_err(|e| anyhow::anyhow!("{e}"))?
            };
            let codec = Codec::from_serialize_type(serialize_type);
            let function_id = get_route_key(&head);
            let ctx = Context::new(head.seq_num(), codec, self.clone());
            let watch = ctx.clone();

            router.route(function_id, body, codec, ctx).await;

            let call_type = if watch.is_delayed() {
                RpcCallType::CallbackWithDelay
            } else {
                RpcCallType::NonCallback
            };
            debug!(conn_id = self.conn_id, function_id, ?call_type, "dispatched");
        }
    }
}

async fn read_payload_io(socket: &mut OwnedReadHalf, head: &RequestHeader) -> std::io::Result<Vec<u8>> {
    read_payload(socket, head)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))
}

/// Drains queued frames to `socket` until the channel closes or `cancel`
/// fires. `rx` is polled first on each iteration (`biased`) so a frame
/// enqueued right before the connection closes still goes out instead of
/// being dropped by a simultaneously-ready cancellation.
async fn run_writer(mut socket: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>, cancel: CancellationToken) {
    loop {
        let frame = tokio::select! {
            biased;
            frame = rx.recv() => frame,
            _ = cancel.cancelled() => None,
        };
        let Some(frame) = frame else {
            return;
        };
        if socket.write_all(&frame).await.is_err() {
            return;
        }
        if socket.flush().await.is_err() {
            return;
        }
    }
}

impl ResponseSink for ServerConnection {
    fn send_frame(&self, frame: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.write_tx
            .send(frame)
            .map_err(|_| anyhow::anyhow!("connection {} writer gone", self.conn_id))
    }

    fn is_closed(&self) -> bool {
        self.is_closed()
    }

    fn on_abandoned(&self, seq_num: u32) {
        warn!(conn_id = self.conn_id, seq_num, "abandoned deferred call, closing connection");
        self.close();
    }

    fn on_deferred(&self) {
        self.delay_count.fetch_add(1, Ordering::AcqRel);
    }

    fn on_resolved(&self) {
        self.delay_count.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::AsyncReadExt, net::TcpListener};

    use super::*;
    use crate::protocol::framing::prepare_request;

    #[tokio::test]
    async fn echoes_a_registered_function() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let mut router = Router::new();
        router.register("echo", |text: String| Ok::<String, RpcError>(text));
        let router = Arc::new(router);

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            ServerConnection::serve(1, socket, router, Duration::ZERO, None).await;
        });

        let mut client = TcpStream::connect(addr).await.expect("connect");
        let key = crate::router::route_key_for_name("echo");
        let body = Codec::Bincode.encode(&"hello".to_string()).expect("encode");
        let frame = prepare_request(1, key, &body, crate::protocol::codec::SerializeType::Bincode);
        client.write_all(&frame).await.expect("write");

        let head = crate::protocol::framing::read_response_head(&mut client)
            .await
            .expect("read head");
        assert!(head.is_ok());
        let payload = crate::protocol::framing::read_response_payload(&mut client, &head)
            .await
            .expect("read payload");
        let response: String = Codec::Bincode.decode(&payload).expect("decode");
        assert_eq!(response, "hello");

        drop(client);
        let _ = server.await;
    }

    #[tokio::test]
    async fn abandoning_a_deferred_call_closes_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let mut router = Router::new();
        router.register_with_context("never_answers", |_: String, ctx: Context| async move {
            ctx.set_delay();
            // dropped here without ever calling respond/respond_error
            Ok::<String, RpcError>(String::new())
        });
        let router = Arc::new(router);

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            ServerConnection::serve(1, socket, router, Duration::ZERO, None).await;
        });

        let mut client = TcpStream::connect(addr).await.expect("connect");
        let key = crate::router::route_key_for_name("never_answers");
        let body = Codec::Bincode.encode(&"hi".to_string()).expect("encode");
        let frame = prepare_request(1, key, &body, crate::protocol::codec::SerializeType::Bincode);
        client.write_all(&frame).await.expect("write");

        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .expect("connection should close instead of hanging");
        assert_eq!(read.expect("read"), 0, "server should have closed its write side");

        let _ = server.await;
    }

    #[tokio::test]
    async fn idle_connection_is_closed_once_keepalive_elapses() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let router = Arc::new(Router::new());

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            ServerConnection::serve(1, socket, router, Duration::from_millis(30), None).await;
        });

        let mut client = TcpStream::connect(addr).await.expect("connect");
        let mut buf = [0u8; 1];
        let read = tokio::time::timeout(Duration::from_secs(2), client.read(&mut buf))
            .await
            .expect("connection should close once keep-alive elapses");
        assert_eq!(read.expect("read"), 0);

        let _ = server.await;
    }
}
