//! Drives the calculator service.
//!
//! Usage: calculator-client [unary|server|client|bidi|error|all]
//!
//! The server URL comes from `CALCRPC_SERVER_URL`; set `CALCRPC_TLS_CA` to
//! verify a TLS server against a private CA.

use std::time::Duration;

use anyhow::bail;
use calcrpc_client::Code;
use calcrpc_services::CalculatorClient;
use calcrpc_services::config::ClientSettings;
use calcrpc_services::proto::calculator::*;

const PAUSE: Duration = Duration::from_millis(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    calcrpc_services::init_tracing();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let settings = ClientSettings::from_env();
    let client = CalculatorClient::new(settings.client_builder().build()?);
    println!("Calculator client ({})", settings.server_url);

    match mode.as_str() {
        "unary" => do_unary(&client).await,
        "server" => do_server_streaming(&client).await,
        "client" => do_client_streaming(&client).await,
        "bidi" => do_bidi_streaming(&client).await,
        "error" => do_error_unary(&client).await,
        "all" => {
            do_unary(&client).await?;
            do_server_streaming(&client).await?;
            do_client_streaming(&client).await?;
            do_bidi_streaming(&client).await?;
            do_error_unary(&client).await
        }
        other => bail!("unknown mode {other:?}, expected unary|server|client|bidi|error|all"),
    }
}

async fn do_unary(client: &CalculatorClient) -> anyhow::Result<()> {
    println!("Sum (unary)");
    let res = client
        .sum(&SumRequest {
            first_number: 3,
            second_number: 4,
        })
        .await?;
    println!("  3 + 4 = {}", res.sum_result);
    Ok(())
}

async fn do_server_streaming(client: &CalculatorClient) -> anyhow::Result<()> {
    let number = 12_390_392_840;
    println!("PrimeNumberDecomposition of {number} (server streaming)");
    let mut stream = client
        .prime_number_decomposition(&PrimeNumberDecompositionRequest { number })
        .await?;
    while let Some(res) = stream.message().await? {
        println!("  factor: {}", res.prime_factor);
    }
    Ok(())
}

async fn do_client_streaming(client: &CalculatorClient) -> anyhow::Result<()> {
    println!("ComputeAverage (client streaming)");
    let mut call = client.compute_average()?;
    for number in [3, 5, 9, 54, 33] {
        println!("  sending {number}");
        call.send(&ComputeAverageRequest { number }).await?;
        tokio::time::sleep(PAUSE).await;
    }
    let res = call.close_and_receive().await?;
    println!("  average: {}", res.average);
    Ok(())
}

async fn do_bidi_streaming(client: &CalculatorClient) -> anyhow::Result<()> {
    println!("FindMaximum (bidi streaming)");
    let (mut requests, mut responses) = client.find_maximum()?;

    let sender = tokio::spawn(async move {
        for number in [4, 1, 34, 5, 68, 44, 45, 70, 23] {
            println!("  sending {number}");
            requests.send(&FindMaximumRequest { number }).await?;
            tokio::time::sleep(PAUSE).await;
        }
        requests.close_send();
        Ok::<_, calcrpc_client::ClientError>(())
    });

    while let Some(res) = responses.message().await? {
        println!("  new maximum: {}", res.maximum);
    }
    sender.await??;
    Ok(())
}

async fn do_error_unary(client: &CalculatorClient) -> anyhow::Result<()> {
    println!("SquareRoot (unary with errors)");
    for number in [10, -10] {
        match client.square_root(&SquareRootRequest { number }).await {
            Ok(res) => println!("  sqrt({number}) = {}", res.number_root),
            Err(err) if err.code() == Code::InvalidArgument => {
                println!("  server rejected {number}: {}", err.message().unwrap_or(""));
                println!("  (negative numbers have no real square root)");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
