use std::{future::Future, sync::Arc};

use crossbeam_channel::Sender;
use jsonrpc_core::{
    Call, FutureOutput, FutureResponse, Metadata, Middleware, Output, Request, Response,
    futures::{FutureExt, future::Either},
};
use jsonrpc_http_server::{
    RequestMiddleware, RequestMiddlewareAction,
    hyper::{self, Body, Method, StatusCode},
};
use jsonrpc_pubsub::{PubSubMetadata, Session};
use solforge_types::{NodeCommand, NodeEvent, RpcConfig};

use crate::{
    error::{SolforgeError, SolforgeResult},
    localnet::{ClockState, LocalnetLocker, LocalnetState, RemoteClient},
};

pub mod accounts_data;
pub mod accounts_scan;
pub mod bank_data;
pub mod full;
pub mod minimal;
pub mod solforge;
pub mod utils;
pub mod ws;

/// Methods whose success moves the clock forward by one slot.
const CLOCK_ADVANCING_METHODS: &[&str] = &["sendTransaction", "requestAirdrop", "solforgeMintTo"];

#[derive(Clone)]
pub struct RunloopContext {
    pub locker: LocalnetLocker,
    pub node_commands_tx: Sender<NodeCommand>,
    pub remote_rpc_url: String,
    pub rpc_config: RpcConfig,
    /// Clock as it was when the request was dispatched.
    pub clock: ClockState,
}

trait State {
    fn get_locker(&self) -> SolforgeResult<LocalnetLocker>;
    fn with_state_reader<T, F>(&self, reader: F) -> SolforgeResult<T>
    where
        F: FnOnce(&LocalnetState) -> T;
    fn clock_snapshot(&self) -> SolforgeResult<ClockState>;
    fn get_remote_client(&self, endpoint: Option<String>) -> SolforgeResult<RemoteClient>;
    fn get_node_commands_tx(&self) -> SolforgeResult<Sender<NodeCommand>>;
}

impl State for Option<RunloopContext> {
    fn get_locker(&self) -> SolforgeResult<LocalnetLocker> {
        let Some(ctx) = self else {
            return Err(SolforgeError::missing_context());
        };
        Ok(ctx.locker.clone())
    }

    fn with_state_reader<T, F>(&self, reader: F) -> SolforgeResult<T>
    where
        F: FnOnce(&LocalnetState) -> T,
    {
        let Some(ctx) = self else {
            return Err(SolforgeError::missing_context());
        };
        Ok(ctx.locker.with_state_reader(reader))
    }

    fn clock_snapshot(&self) -> SolforgeResult<ClockState> {
        let Some(ctx) = self else {
            return Err(SolforgeError::missing_context());
        };
        Ok(ctx.clock)
    }

    fn get_remote_client(&self, endpoint: Option<String>) -> SolforgeResult<RemoteClient> {
        let Some(ctx) = self else {
            return Err(SolforgeError::missing_context());
        };
        Ok(RemoteClient::new(
            endpoint.unwrap_or_else(|| ctx.remote_rpc_url.clone()),
        ))
    }

    fn get_node_commands_tx(&self) -> SolforgeResult<Sender<NodeCommand>> {
        let Some(ctx) = self else {
            return Err(SolforgeError::missing_context());
        };
        Ok(ctx.node_commands_tx.clone())
    }
}

impl Metadata for RunloopContext {}

#[derive(Clone)]
pub struct SolforgeMiddleware {
    pub locker: LocalnetLocker,
    pub node_commands_tx: Sender<NodeCommand>,
    pub config: RpcConfig,
    pub remote_rpc_url: String,
}

impl SolforgeMiddleware {
    pub fn new(
        locker: LocalnetLocker,
        node_commands_tx: &Sender<NodeCommand>,
        config: &RpcConfig,
        remote_rpc_url: &str,
    ) -> Self {
        Self {
            locker,
            node_commands_tx: node_commands_tx.clone(),
            config: config.clone(),
            remote_rpc_url: remote_rpc_url.to_string(),
        }
    }

    pub fn runloop_context(&self) -> RunloopContext {
        RunloopContext {
            locker: self.locker.clone(),
            node_commands_tx: self.node_commands_tx.clone(),
            remote_rpc_url: self.remote_rpc_url.clone(),
            rpc_config: self.config.clone(),
            clock: self.locker.clock_snapshot(),
        }
    }
}

impl Middleware<Option<RunloopContext>> for SolforgeMiddleware {
    type Future = FutureResponse;
    type CallFuture = FutureOutput;

    fn on_request<F, X>(
        &self,
        request: Request,
        _meta: Option<RunloopContext>,
        next: F,
    ) -> Either<Self::Future, X>
    where
        F: FnOnce(Request, Option<RunloopContext>) -> X + Send,
        X: Future<Output = Option<Response>> + Send + 'static,
    {
        let meta = Some(self.runloop_context());
        Either::Left(Box::pin(next(request, meta)))
    }

    fn on_call<F, X>(
        &self,
        call: Call,
        meta: Option<RunloopContext>,
        next: F,
    ) -> Either<Self::CallFuture, X>
    where
        F: FnOnce(Call, Option<RunloopContext>) -> X + Send,
        X: Future<Output = Option<Output>> + Send + 'static,
    {
        let method_name = match &call {
            Call::MethodCall(method_call) => method_call.method.clone(),
            Call::Notification(notification) => notification.method.clone(),
            Call::Invalid { .. } => String::new(),
        };
        debug!("Processing request '{}'", method_name);

        let locker = self.locker.clone();
        Either::Left(Box::pin(next(call, meta).map(move |res| {
            match &res {
                Some(Output::Failure(failure)) => {
                    debug!(
                        "RPC error for method '{}': code={:?}, message={}",
                        method_name, failure.error.code, failure.error.message
                    );
                }
                Some(Output::Success(_))
                    if CLOCK_ADVANCING_METHODS.contains(&method_name.as_str()) =>
                {
                    let slot = locker.confirm_submission();
                    debug!("'{}' accepted, clock at slot {}", method_name, slot);
                }
                _ => {}
            }
            res
        })))
    }
}

#[derive(Clone)]
pub struct SolforgeWebsocketMiddleware {
    pub solforge_middleware: SolforgeMiddleware,
    pub session: Option<Arc<Session>>,
}

impl SolforgeWebsocketMiddleware {
    pub fn new(solforge_middleware: SolforgeMiddleware, session: Option<Arc<Session>>) -> Self {
        Self {
            solforge_middleware,
            session,
        }
    }
}

impl Middleware<Option<SolforgeWebsocketMeta>> for SolforgeWebsocketMiddleware {
    type Future = FutureResponse;
    type CallFuture = FutureOutput;

    fn on_request<F, X>(
        &self,
        request: Request,
        meta: Option<SolforgeWebsocketMeta>,
        next: F,
    ) -> Either<Self::Future, X>
    where
        F: FnOnce(Request, Option<SolforgeWebsocketMeta>) -> X + Send,
        X: Future<Output = Option<Response>> + Send + 'static,
    {
        let runloop_context = self.solforge_middleware.runloop_context();
        let session = meta
            .as_ref()
            .and_then(|m| m.session.clone())
            .or(self.session.clone());
        let meta = Some(SolforgeWebsocketMeta::new(runloop_context, session));
        Either::Left(Box::pin(next(request, meta)))
    }
}

#[derive(Clone)]
pub struct SolforgeWebsocketMeta {
    pub runloop_context: RunloopContext,
    pub session: Option<Arc<Session>>,
}

impl SolforgeWebsocketMeta {
    pub fn new(runloop_context: RunloopContext, session: Option<Arc<Session>>) -> Self {
        Self {
            runloop_context,
            session,
        }
    }

    pub fn log_debug(&self, msg: &str) {
        let _ = self
            .runloop_context
            .locker
            .node_events_tx()
            .send(NodeEvent::debug(msg));
    }
}

impl State for Option<SolforgeWebsocketMeta> {
    fn get_locker(&self) -> SolforgeResult<LocalnetLocker> {
        let Some(ctx) = self else {
            return Err(SolforgeError::missing_context());
        };
        Ok(ctx.runloop_context.locker.clone())
    }

    fn with_state_reader<T, F>(&self, reader: F) -> SolforgeResult<T>
    where
        F: FnOnce(&LocalnetState) -> T,
    {
        let Some(ctx) = self else {
            return Err(SolforgeError::missing_context());
        };
        Ok(ctx.runloop_context.locker.with_state_reader(reader))
    }

    fn clock_snapshot(&self) -> SolforgeResult<ClockState> {
        let Some(ctx) = self else {
            return Err(SolforgeError::missing_context());
        };
        Ok(ctx.runloop_context.clock)
    }

    fn get_remote_client(&self, endpoint: Option<String>) -> SolforgeResult<RemoteClient> {
        let Some(ctx) = self else {
            return Err(SolforgeError::missing_context());
        };
        Ok(RemoteClient::new(
            endpoint.unwrap_or_else(|| ctx.runloop_context.remote_rpc_url.clone()),
        ))
    }

    fn get_node_commands_tx(&self) -> SolforgeResult<Sender<NodeCommand>> {
        let Some(ctx) = self else {
            return Err(SolforgeError::missing_context());
        };
        Ok(ctx.runloop_context.node_commands_tx.clone())
    }
}

impl Metadata for SolforgeWebsocketMeta {}
impl PubSubMetadata for SolforgeWebsocketMeta {
    fn session(&self) -> Option<Arc<jsonrpc_pubsub::Session>> {
        self.session.clone()
    }
}

/// Answers plain `GET /` and `GET /health` checks before JSON-RPC parsing.
pub struct HealthRequestMiddleware;

impl RequestMiddleware for HealthRequestMiddleware {
    fn on_request(&self, request: hyper::Request<Body>) -> RequestMiddlewareAction {
        let is_health_check = request.method() == Method::GET
            && matches!(request.uri().path(), "/" | "/health");
        if !is_health_check {
            return request.into();
        }
        hyper::Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain")
            .body(Body::from("ok"))
            .unwrap_or_default()
            .into()
    }
}
