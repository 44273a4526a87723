//! `calculator.CalculatorService`: one operation per call pattern.

use calcrpc::prelude::*;
use calcrpc::DispatcherBuilder;
use calcrpc_client::{ClientError, ClientStreamCall, RequestSender, RpcClient};

use crate::proto::calculator::*;

pub const SERVICE: &str = "calculator.CalculatorService";

pub const SUM: &str = "/calculator.CalculatorService/Sum";
pub const PRIME_NUMBER_DECOMPOSITION: &str =
    "/calculator.CalculatorService/PrimeNumberDecomposition";
pub const COMPUTE_AVERAGE: &str = "/calculator.CalculatorService/ComputeAverage";
pub const FIND_MAXIMUM: &str = "/calculator.CalculatorService/FindMaximum";
pub const SQUARE_ROOT: &str = "/calculator.CalculatorService/SquareRoot";

/// Register every calculator procedure.
pub fn register(builder: DispatcherBuilder) -> DispatcherBuilder {
    builder
        .route(SUM, unary(sum))
        .route(PRIME_NUMBER_DECOMPOSITION, server_stream(prime_number_decomposition))
        .route(COMPUTE_AVERAGE, client_stream(compute_average))
        .route(FIND_MAXIMUM, bidi_stream(find_maximum))
        .route(SQUARE_ROOT, unary(square_root))
}

async fn sum(_ctx: CallContext, req: SumRequest) -> Result<SumResponse, RpcError> {
    tracing::debug!(a = req.first_number, b = req.second_number, "sum");
    let sum_result = req
        .first_number
        .checked_add(req.second_number)
        .ok_or_else(|| {
            RpcError::invalid_argument(format!(
                "sum of {} and {} overflows int64",
                req.first_number, req.second_number
            ))
        })?;
    Ok(SumResponse { sum_result })
}

async fn prime_number_decomposition(
    _ctx: CallContext,
    req: PrimeNumberDecompositionRequest,
    mut out: ResponseSender<PrimeNumberDecompositionResponse>,
) -> Result<(), RpcError> {
    if req.number <= 0 {
        return Err(RpcError::invalid_argument(format!(
            "number must be positive, got {}",
            req.number
        )));
    }
    for prime_factor in prime_factors(req.number) {
        out.send(PrimeNumberDecompositionResponse { prime_factor })
            .await?;
    }
    Ok(())
}

/// Prime factors of `n` in non-decreasing order. Empty for `n <= 1`.
pub fn prime_factors(mut n: i64) -> Vec<i64> {
    let mut factors = Vec::new();
    let mut divisor = 2i64;
    while n > 1 {
        // No divisor above sqrt(n) can split it further.
        if divisor.checked_mul(divisor).is_none_or(|sq| sq > n) {
            factors.push(n);
            break;
        }
        if n % divisor == 0 {
            factors.push(divisor);
            n /= divisor;
        } else {
            divisor += 1;
        }
    }
    factors
}

async fn compute_average(
    _ctx: CallContext,
    mut input: Streaming<ComputeAverageRequest>,
) -> Result<ComputeAverageResponse, RpcError> {
    let mut total = 0i64;
    let mut count = 0i64;
    while let Some(req) = input.message().await? {
        total += i64::from(req.number);
        count += 1;
    }
    if count == 0 {
        return Err(RpcError::invalid_argument("no numbers received"));
    }
    Ok(ComputeAverageResponse {
        average: total as f64 / count as f64,
    })
}

async fn find_maximum(
    _ctx: CallContext,
    mut input: Streaming<FindMaximumRequest>,
    mut out: ResponseSender<FindMaximumResponse>,
) -> Result<(), RpcError> {
    let mut maximum: Option<i32> = None;
    while let Some(req) = input.message().await? {
        if maximum.is_none_or(|max| req.number > max) {
            maximum = Some(req.number);
            out.send(FindMaximumResponse {
                maximum: f64::from(req.number),
            })
            .await?;
        }
    }
    Ok(())
}

async fn square_root(
    _ctx: CallContext,
    req: SquareRootRequest,
) -> Result<SquareRootResponse, RpcError> {
    if req.number < 0 {
        return Err(RpcError::invalid_argument(format!(
            "Received a negative number: {}",
            req.number
        )));
    }
    Ok(SquareRootResponse {
        number_root: f64::from(req.number).sqrt(),
    })
}

/// Typed client for the calculator service.
#[derive(Clone, Debug)]
pub struct CalculatorClient {
    inner: RpcClient,
}

impl CalculatorClient {
    pub fn new(inner: RpcClient) -> Self {
        Self { inner }
    }

    pub async fn sum(&self, req: &SumRequest) -> Result<SumResponse, ClientError> {
        self.inner.unary(SUM, req).await
    }

    pub async fn prime_number_decomposition(
        &self,
        req: &PrimeNumberDecompositionRequest,
    ) -> Result<calcrpc_client::Streaming<PrimeNumberDecompositionResponse>, ClientError> {
        self.inner.server_stream(PRIME_NUMBER_DECOMPOSITION, req).await
    }

    pub fn compute_average(
        &self,
    ) -> Result<ClientStreamCall<ComputeAverageRequest, ComputeAverageResponse>, ClientError> {
        self.inner.client_stream(COMPUTE_AVERAGE)
    }

    pub fn find_maximum(
        &self,
    ) -> Result<
        (
            RequestSender<FindMaximumRequest>,
            calcrpc_client::Streaming<FindMaximumResponse>,
        ),
        ClientError,
    > {
        self.inner.bidi_stream(FIND_MAXIMUM)
    }

    pub async fn square_root(
        &self,
        req: &SquareRootRequest,
    ) -> Result<SquareRootResponse, ClientError> {
        self.inner.unary(SQUARE_ROOT, req).await
    }
}
