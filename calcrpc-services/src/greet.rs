//! `greet.GreetService`: the greeting variants of each call pattern.

use std::time::Duration;

use calcrpc::DispatcherBuilder;
use calcrpc::prelude::*;
use calcrpc_client::{ClientError, ClientStreamCall, RequestSender, RpcClient};
use futures::TryStreamExt;

use crate::proto::greet::*;

pub const SERVICE: &str = "greet.GreetService";

pub const GREET: &str = "/greet.GreetService/Greet";
pub const GREET_MANY_TIMES: &str = "/greet.GreetService/GreetManyTimes";
pub const LONG_GREET: &str = "/greet.GreetService/LongGreet";
pub const GREET_EVERYONE: &str = "/greet.GreetService/GreetEveryone";
pub const GREET_WITH_DEADLINE: &str = "/greet.GreetService/GreetWithDeadline";

/// Greetings sent by `GreetManyTimes`.
pub const GREET_MANY_TIMES_COUNT: usize = 10;

/// Steps of simulated work in `GreetWithDeadline`.
pub const DEADLINE_STEPS: u32 = 3;

/// Timing of the slow greeting handlers.
#[derive(Clone, Copy, Debug)]
pub struct GreetConfig {
    /// Pause between two `GreetManyTimes` replies.
    pub pacing: Duration,
    /// Duration of one `GreetWithDeadline` work step.
    pub work_step: Duration,
}

impl Default for GreetConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(1),
            work_step: Duration::from_secs(1),
        }
    }
}

impl GreetConfig {
    /// No pauses at all.
    pub fn immediate() -> Self {
        Self {
            pacing: Duration::ZERO,
            work_step: Duration::ZERO,
        }
    }
}

/// Register every greet procedure.
pub fn register(builder: DispatcherBuilder, config: GreetConfig) -> DispatcherBuilder {
    builder
        .route(GREET, unary(greet))
        .route(
            GREET_MANY_TIMES,
            server_stream(move |ctx, req, out| greet_many_times(ctx, req, out, config.pacing)),
        )
        .route(LONG_GREET, client_stream(long_greet))
        .route(GREET_EVERYONE, bidi_stream(greet_everyone))
        .route(
            GREET_WITH_DEADLINE,
            unary(move |ctx, req| greet_with_deadline(ctx, req, config.work_step)),
        )
}

async fn greet(_ctx: CallContext, req: GreetRequest) -> Result<GreetResponse, RpcError> {
    Ok(GreetResponse {
        result: format!("Hello {}", req.first_name()),
    })
}

async fn greet_many_times(
    _ctx: CallContext,
    req: GreetManyTimesRequest,
    mut out: ResponseSender<GreetManyTimesResponse>,
    pacing: Duration,
) -> Result<(), RpcError> {
    for i in 0..GREET_MANY_TIMES_COUNT {
        if i > 0 && !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
        out.send(GreetManyTimesResponse {
            result: format!("Hello {} number {}", req.first_name(), i),
        })
        .await?;
    }
    Ok(())
}

async fn long_greet(
    _ctx: CallContext,
    input: Streaming<LongGreetRequest>,
) -> Result<LongGreetResponse, RpcError> {
    let result = input
        .into_stream()
        .try_fold(String::new(), |mut acc, req| async move {
            acc.push_str(&format!("Hello {}! ", req.first_name()));
            Ok(acc)
        })
        .await?;
    Ok(LongGreetResponse { result })
}

async fn greet_everyone(
    _ctx: CallContext,
    mut input: Streaming<GreetEveryoneRequest>,
    mut out: ResponseSender<GreetEveryoneResponse>,
) -> Result<(), RpcError> {
    while let Some(req) = input.message().await? {
        out.send(GreetEveryoneResponse {
            result: format!("Hello {}! ", req.first_name()),
        })
        .await?;
    }
    Ok(())
}

async fn greet_with_deadline(
    ctx: CallContext,
    req: GreetWithDeadlineRequest,
    work_step: Duration,
) -> Result<GreetWithDeadlineResponse, RpcError> {
    for step in 0..DEADLINE_STEPS {
        if let Err(err) = ctx.check_deadline() {
            tracing::info!(step, code = %err.code(), "giving up on slow greeting");
            return Err(err);
        }
        tokio::time::sleep(work_step).await;
    }
    ctx.check_deadline()?;
    Ok(GreetWithDeadlineResponse {
        result: format!("Hello {}", req.first_name()),
    })
}

/// Typed client for the greet service.
#[derive(Clone, Debug)]
pub struct GreetClient {
    inner: RpcClient,
}

impl GreetClient {
    pub fn new(inner: RpcClient) -> Self {
        Self { inner }
    }

    pub async fn greet(&self, req: &GreetRequest) -> Result<GreetResponse, ClientError> {
        self.inner.unary(GREET, req).await
    }

    pub async fn greet_many_times(
        &self,
        req: &GreetManyTimesRequest,
    ) -> Result<calcrpc_client::Streaming<GreetManyTimesResponse>, ClientError> {
        self.inner.server_stream(GREET_MANY_TIMES, req).await
    }

    pub fn long_greet(
        &self,
    ) -> Result<ClientStreamCall<LongGreetRequest, LongGreetResponse>, ClientError> {
        self.inner.client_stream(LONG_GREET)
    }

    pub fn greet_everyone(
        &self,
    ) -> Result<
        (
            RequestSender<GreetEveryoneRequest>,
            calcrpc_client::Streaming<GreetEveryoneResponse>,
        ),
        ClientError,
    > {
        self.inner.bidi_stream(GREET_EVERYONE)
    }

    pub async fn greet_with_deadline(
        &self,
        req: &GreetWithDeadlineRequest,
    ) -> Result<GreetWithDeadlineResponse, ClientError> {
        self.inner.unary(GREET_WITH_DEADLINE, req).await
    }
}
