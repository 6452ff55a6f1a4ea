// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Function registration and dispatch.
//!
//! Handlers are registered by name and looked up by a route key derived from
//! that name (a truncated MD5 digest, the same scheme the runtime this is
//! modeled on uses so interop doesn't require an IDL). Two independently
//! keyed maps exist — `handlers` for plain request/response functions and
//! `coro_handlers` for functions that take a [`Context`] and may defer their
//! response — matching the split the original router makes between
//! synchronous and coroutine handlers; here "coroutine" just means "async
//! fn", since every handler in this crate already runs on the tokio runtime.

pub mod context;

use std::{collections::HashMap, future::Future, panic::AssertUnwindSafe, sync::Arc};

use futures::{FutureExt, future::BoxFuture};
use md5::{Digest, Md5};
use serde::{Serialize, de::DeserializeOwned};
use tracing::error;

pub use context::{Context, ResponseSink};

use crate::protocol::{codec::Codec, error::RpcError};

type SyncHandler = Box<dyn Fn(&[u8], Codec) -> Result<Vec<u8>, RpcError> + Send + Sync>;
type CoroHandler = Box<dyn Fn(Vec<u8>, Codec, Context) -> BoxFuture<'static, ()> + Send + Sync>;

/// Derives the route key the wire uses for `name`: the first four bytes of
/// its MD5 digest, read as a big-endian `u32`.
pub fn route_key_for_name(name: &str) -> u32 {
    let digest = Md5::digest(name.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

#[derive(Default)]
pub struct Router {
    handlers: HashMap<u32, SyncHandler>,
    coro_handlers: HashMap<u32, CoroHandler>,
    id2name: HashMap<u32, String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes `name`'s route key and records it, refusing to register two
    /// distinct names under the same truncated-MD5 key: a registered
    /// function must be addressable by its own key, not silently shadowed
    /// by whichever of the two colliding names happened to register second.
    ///
    /// # Panics
    ///
    /// Panics if `name` collides with a different, already-registered name.
    /// This is treated as a fatal configuration error rather than a
    /// recoverable one because it can only happen from a fixed set of
    /// function names baked into the binary at startup; there is no runtime
    /// input that can trigger it later.
    fn register_key(&mut self, name: &str) -> u32 {
        let key = route_key_for_name(name);
        if let Some(existing) = self.id2name.get(&key) {
            if existing != name {
                error!(name, existing, "route key collision between distinct function names");
                panic!("route key collision: \"{name}\" and \"{existing}\" both hash to {key:#010x}");
            }
        } else {
            self.id2name.insert(key, name.to_string());
        }
        key
    }

    /// Registers a plain handler: decode the request, call `f`, encode the
    /// response. Cannot defer; any panic inside `f` is caught and turned
    /// into a `handler_panicked` error response rather than taking the
    /// connection down.
    pub fn register<Req, Resp, F>(&mut self, name: &str, f: F)
    where
        Req: DeserializeOwned,
        Resp: Serialize,
        F: Fn(Req) -> Result<Resp, RpcError> + Send + Sync + 'static,
    {
        let key = self.register_key(name);
        let handler: SyncHandler = Box::new(move |body, codec| {
            let req: Req = codec
                .decode(body)
                .map_err(|e| RpcError::SerializeError(e.to_string()))?;
            let resp = f(req)?;
            codec
                .encode(&resp)
                .map_err(|e| RpcError::SerializeError(e.to_string()))
        });
        self.handlers.insert(key, handler);
    }

    /// Registers a handler that receives a [`Context`] and may call
    /// [`Context::set_delay`] to answer asynchronously later, from any task.
    pub fn register_with_context<Req, Resp, F, Fut>(&mut self, name: &str, f: F)
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(Req, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, RpcError>> + Send + 'static,
    {
        let key = self.register_key(name);
        let f = Arc::new(f);
        let handler: CoroHandler = Box::new(move |body, codec, ctx| {
            let f = f.clone();
            async move {
                let req: Req = match codec.decode(&body) {
                    Ok(req) => req,
                    Err(e) => {
                        let _ = ctx.respond_error(RpcError::SerializeError(e.to_string()));
                        return;
                    }
                };
                let result = f(req, ctx.clone()).await;
                if ctx.is_delayed() {
                    return;
                }
                let sent = match result {
                    Ok(resp) => ctx.respond(&resp),
                    Err(e) => ctx.respond_error(e),
                };
                if let Err(e) = sent {
                    error!(error = %e, "failed to send response");
                }
            }
            .boxed()
        });
        self.coro_handlers.insert(key, handler);
    }

    pub fn has_route(&self, function_id: u32) -> bool {
        self.handlers.contains_key(&function_id) || self.coro_handlers.contains_key(&function_id)
    }

    pub fn name_for(&self, function_id: u32) -> Option<&str> {
        self.id2name.get(&function_id).map(String::as_str)
    }

    /// Dispatches one request. Always resolves the context exactly once
    /// (unless the handler defers it), including on panic or unknown
    /// function id.
    pub async fn route(&self, function_id: u32, body: Vec<u8>, codec: Codec, ctx: Context) {
        if let Some(handler) = self.coro_handlers.get(&function_id) {
            handler(body, codec, ctx).await;
            return;
        }
        if let Some(handler) = self.handlers.get(&function_id) {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| handler(&body, codec)));
            match result {
                Ok(Ok(encoded)) => {
                    if let Err(e) = ctx.respond_raw(encoded) {
                        error!(error = %e, "failed to send response");
                    }
                }
                Ok(Err(rpc_err)) => {
                    if let Err(e) = ctx.respond_error(rpc_err) {
                        error!(error = %e, "failed to send response");
                    }
                }
                Err(panic) => {
                    let message = panic_message(&panic);
                    error!(function_id, message, "handler panicked");
                    let _ = ctx.respond_error(RpcError::HandlerPanicked(message));
                }
            }
            return;
        }
        let _ = ctx.respond_error(RpcError::FunctionNotSupported(function_id));
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    };

    use serde::Deserialize;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<Vec<u8>>>,
        closed: AtomicBool,
        abandoned: AtomicBool,
    }

    impl ResponseSink for RecordingSink {
        fn send_frame(&self, frame: Vec<u8>) -> anyhow::Result<()> {
            self.frames.lock().expect("lock").push(frame);
            Ok(())
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::Acquire)
        }

        fn on_abandoned(&self, _seq_num: u32) {
            self.abandoned.store(true, Ordering::Release);
        }
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct EchoArgs {
        text: String,
    }

    fn ctx() -> (Context, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (Context::new(1, Codec::Bincode, sink.clone()), sink)
    }

    #[tokio::test]
    async fn routes_plain_handler_by_name() {
        let mut router = Router::new();
        router.register("echo", |args: EchoArgs| Ok(args.text));
        let key = route_key_for_name("echo");
        let body = Codec::Bincode.encode(&EchoArgs { text: "hi".into() }).expect("encode");
        let (context, sink) = ctx();
        router.route(key, body, Codec::Bincode, context).await;
        assert_eq!(sink.frames.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn unknown_function_id_gets_function_not_supported() {
        let router = Router::new();
        let (context, sink) = ctx();
        router.route(0xDEAD_BEEF, vec![], Codec::Bincode, context).await;
        let frames = sink.frames.lock().expect("lock");
        assert_eq!(frames.len(), 1);
        // err_code sits right after the 4-byte magic/version/err_code/msg_type header prefix
        assert_eq!(frames[0][2], RpcError::FunctionNotSupported(0).err_code());
    }

    #[tokio::test]
    async fn handler_panic_is_caught_and_reported() {
        let mut router = Router::new();
        router.register("boom", |_: EchoArgs| -> Result<String, RpcError> {
            panic!("boom")
        });
        let key = route_key_for_name("boom");
        let body = Codec::Bincode.encode(&EchoArgs { text: "x".into() }).expect("encode");
        let (context, sink) = ctx();
        router.route(key, body, Codec::Bincode, context).await;
        let frames = sink.frames.lock().expect("lock");
        assert_eq!(frames[0][2], RpcError::HandlerPanicked(String::new()).err_code());
    }

    #[tokio::test]
    async fn context_handler_can_defer_its_response() {
        let mut router = Router::new();
        router.register_with_context("slow_echo", |args: EchoArgs, ctx: Context| async move {
            ctx.set_delay();
            let spawned_ctx = ctx.clone();
            tokio::spawn(async move {
                let _ = spawned_ctx.respond(&args.text);
            });
            Ok::<String, RpcError>(String::new())
        });
        let key = route_key_for_name("slow_echo");
        let body = Codec::Bincode.encode(&EchoArgs { text: "later".into() }).expect("encode");
        let (context, sink) = ctx();
        router.route(key, body, Codec::Bincode, context).await;
        // the dispatching task itself shouldn't have sent anything yet
        assert!(sink.frames.lock().expect("lock").is_empty());
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(sink.frames.lock().expect("lock").len(), 1);
    }

    #[test]
    fn route_key_for_name_is_stable() {
        assert_eq!(route_key_for_name("echo"), route_key_for_name("echo"));
        assert_ne!(route_key_for_name("echo"), route_key_for_name("ping"));
    }

    #[test]
    fn reregistering_the_same_name_is_not_a_collision() {
        let mut router = Router::new();
        router.register("echo", |args: EchoArgs| Ok(args.text));
        router.register("echo", |args: EchoArgs| Ok(args.text));
        assert!(router.has_route(route_key_for_name("echo")));
    }

    #[test]
    #[should_panic(expected = "route key collision")]
    fn colliding_route_keys_between_distinct_names_panics() {
        let mut router = Router::new();
        // simulates two distinct names hashing to the same key without
        // needing to find a real MD5 prefix collision to provoke one.
        let key = route_key_for_name("echo");
        router.id2name.insert(key, "not_echo".to_string());
        router.register_key("echo");
    }
}
