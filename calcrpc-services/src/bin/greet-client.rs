//! Drives the greet service.
//!
//! Usage: greet-client [unary|server|client|bidi|deadline|all]

use std::time::Duration;

use anyhow::bail;
use calcrpc_client::Code;
use calcrpc_services::GreetClient;
use calcrpc_services::config::ClientSettings;
use calcrpc_services::proto::greet::*;
use futures::TryStreamExt;

const PAUSE: Duration = Duration::from_millis(300);

fn people() -> Vec<Greeting> {
    vec![
        Greeting::new("Christian", "Gonzalez"),
        Greeting::new("Maria Elena", "Crespo"),
        Greeting::new("Sebastian", "Gonzalez"),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    calcrpc_services::init_tracing();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    let settings = ClientSettings::from_env();
    let client = GreetClient::new(settings.client_builder().build()?);
    println!("Greet client ({})", settings.server_url);

    match mode.as_str() {
        "unary" => do_unary(&client).await,
        "server" => do_server_streaming(&client).await,
        "client" => do_client_streaming(&client).await,
        "bidi" => do_bidi_streaming(&client).await,
        "deadline" => do_deadlines(&settings).await,
        "all" => {
            do_unary(&client).await?;
            do_server_streaming(&client).await?;
            do_client_streaming(&client).await?;
            do_bidi_streaming(&client).await?;
            do_deadlines(&settings).await
        }
        other => bail!("unknown mode {other:?}, expected unary|server|client|bidi|deadline|all"),
    }
}

async fn do_unary(client: &GreetClient) -> anyhow::Result<()> {
    println!("Greet (unary)");
    let res = client
        .greet(&GreetRequest::new(Greeting::new("Christian", "Gonzalez")))
        .await?;
    println!("  {}", res.result);
    Ok(())
}

async fn do_server_streaming(client: &GreetClient) -> anyhow::Result<()> {
    println!("GreetManyTimes (server streaming)");
    let stream = client
        .greet_many_times(&GreetManyTimesRequest::new(Greeting::new(
            "Christian",
            "Gonzalez",
        )))
        .await?
        .into_stream();
    stream
        .try_for_each(|res| async move {
            println!("  {}", res.result);
            Ok(())
        })
        .await?;
    Ok(())
}

async fn do_client_streaming(client: &GreetClient) -> anyhow::Result<()> {
    println!("LongGreet (client streaming)");
    let mut call = client.long_greet()?;
    for greeting in people() {
        println!("  sending {}", greeting.first_name);
        call.send(&LongGreetRequest::new(greeting)).await?;
        tokio::time::sleep(PAUSE).await;
    }
    let res = call.close_and_receive().await?;
    println!("  {}", res.result);
    Ok(())
}

async fn do_bidi_streaming(client: &GreetClient) -> anyhow::Result<()> {
    println!("GreetEveryone (bidi streaming)");
    let (mut requests, mut responses) = client.greet_everyone()?;

    let sender = tokio::spawn(async move {
        for greeting in people() {
            println!("  sending {}", greeting.first_name);
            requests.send(&GreetEveryoneRequest::new(greeting)).await?;
            tokio::time::sleep(PAUSE).await;
        }
        requests.close_send();
        Ok::<_, calcrpc_client::ClientError>(())
    });

    while let Some(res) = responses.message().await? {
        println!("  received: {}", res.result);
    }
    sender.await??;
    Ok(())
}

async fn do_deadlines(settings: &ClientSettings) -> anyhow::Result<()> {
    println!("GreetWithDeadline (unary with deadlines)");
    // The server works for about three seconds.
    for timeout in [Duration::from_secs(5), Duration::from_secs(1)] {
        let client = GreetClient::new(settings.client_builder().timeout(timeout).build()?);
        let req = GreetWithDeadlineRequest::new(Greeting::new("Christian", "Gonzalez"));
        match client.greet_with_deadline(&req).await {
            Ok(res) => println!("  within {timeout:?}: {}", res.result),
            Err(err) if err.code() == Code::DeadlineExceeded => {
                println!("  within {timeout:?}: deadline exceeded");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
