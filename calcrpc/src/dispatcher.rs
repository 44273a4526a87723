//! Routing of calls to handlers, and the per-pattern call drivers.
//!
//! [`Dispatcher::dispatch`] creates the session and both channels of a call
//! and spawns the handler task. The caller is left with the transport-facing
//! ends ([`ActiveCall`]): it pushes request payloads in, pulls response
//! payloads out and waits for the terminal status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use calcrpc_core::{
    CallSession, Codec, INTERNAL_FAULT_MESSAGE, RpcError, SessionHandle, Status, StreamReceiver,
    StreamSender, channel, compute_effective_timeout,
};
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::handler::{CallContext, Method};

/// Builder for a [`Dispatcher`].
#[derive(Debug, Default)]
pub struct DispatcherBuilder {
    routes: HashMap<String, Method>,
    config: ServerConfig,
}

impl DispatcherBuilder {
    /// Register `method` under `path` (`/package.Service/Method`).
    ///
    /// Registering the same path twice keeps the last handler.
    pub fn route(mut self, path: impl Into<String>, method: Method) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if self.routes.insert(path.clone(), method).is_some() {
            tracing::warn!(procedure = %path, "handler registered twice, keeping the last one");
        }
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Freeze the routing table.
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            routes: Arc::new(self.routes),
            config: self.config,
        }
    }
}

/// Immutable routing table plus server configuration.
///
/// Cheap to clone; clones share the table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: Arc<HashMap<String, Method>>,
    config: ServerConfig,
}

/// The transport-facing ends of a dispatched call.
#[derive(Debug)]
pub struct ActiveCall {
    pub session: SessionHandle,
    /// Request payloads go in here; `close` it when the request body ends.
    pub requests: StreamSender<Bytes>,
    /// Response payloads come out here.
    pub responses: StreamReceiver<Bytes>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn lookup(&self, procedure: &str) -> Option<&Method> {
        self.routes.get(procedure)
    }

    /// Registered procedure paths, sorted.
    pub fn procedures(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    /// Start a call to `procedure`.
    ///
    /// `client_timeout` is the deadline requested by the caller; the server
    /// timeout caps it. Fails with `Unimplemented` for unknown procedures.
    pub fn dispatch(
        &self,
        procedure: &str,
        codec: Codec,
        client_timeout: Option<Duration>,
    ) -> Result<ActiveCall, Status> {
        let method = self.lookup(procedure).cloned().ok_or_else(|| {
            Status::unimplemented(format!("unknown procedure {procedure}"))
        })?;

        let timeout = compute_effective_timeout(self.config.get_timeout(), client_timeout);
        let session = CallSession::with_timeout(method.pattern(), timeout);
        let capacity = self.config.get_channel_capacity();
        let (requests, input) = channel(session.clone(), capacity);
        let (output, responses) = channel(session.clone(), capacity);

        let ctx = CallContext::new(
            Arc::from(procedure),
            session.clone(),
            codec,
            self.config.get_limits(),
        );
        let span = tracing::info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = %method.pattern(),
            rpc.encoding = codec.name(),
            otel.kind = "server",
        );
        tokio::spawn(run(method, ctx, input, output).instrument(span));

        Ok(ActiveCall {
            session,
            requests,
            responses,
        })
    }
}

/// Run the handler isolated in its own task and record the terminal status.
async fn run(
    method: Method,
    ctx: CallContext,
    input: StreamReceiver<Bytes>,
    output: StreamSender<Bytes>,
) {
    let session = ctx.session().clone();
    let mut task = tokio::spawn(drive(method, ctx, input, output).in_current_span());

    let status = tokio::select! {
        joined = &mut task => match joined {
            Ok(Ok(())) => Status::ok(),
            Ok(Err(err)) => {
                match &err {
                    RpcError::Handler(detail) => tracing::error!(error = %detail, "handler fault"),
                    RpcError::Protocol(detail) => tracing::warn!(error = %detail, "protocol error"),
                    other => tracing::debug!(error = %other, "call failed"),
                }
                err.into_status()
            }
            Err(join_err) if join_err.is_panic() => {
                tracing::error!("handler panicked");
                Status::internal(INTERNAL_FAULT_MESSAGE)
            }
            Err(_) => Status::cancelled("handler aborted"),
        },
        status = session.cancelled() => {
            task.abort();
            tracing::debug!(code = %status.code(), "call cancelled, handler aborted");
            status
        }
    };

    session.complete(status);
}

/// Drive one call according to its pattern.
async fn drive(
    method: Method,
    ctx: CallContext,
    mut input: StreamReceiver<Bytes>,
    mut output: StreamSender<Bytes>,
) -> Result<(), RpcError> {
    match method {
        Method::Unary(handler) => {
            let request = read_single(&mut input).await?;
            let response = handler(ctx, request).await?;
            output.send(response).await?;
            output.close();
        }
        Method::ServerStream(handler) => {
            let request = read_single(&mut input).await?;
            handler(ctx, request, output).await?;
        }
        Method::ClientStream(handler) => {
            let response = handler(ctx, input).await?;
            output.send(response).await?;
            output.close();
        }
        Method::BidiStream(handler) => {
            handler(ctx, input, output).await?;
        }
    }
    Ok(())
}

/// Read exactly one request message followed by end-of-stream.
async fn read_single(input: &mut StreamReceiver<Bytes>) -> Result<Bytes, RpcError> {
    let Some(request) = input.receive().await? else {
        return Err(RpcError::Protocol("missing request message".into()));
    };
    match input.receive().await? {
        None => Ok(request),
        Some(_) => Err(RpcError::Protocol(
            "expected exactly one request message".into(),
        )),
    }
}
