//! Both services behind a real server on an ephemeral port, driven by the
//! real client.

use std::time::Duration;

use calcrpc::ServerConfig;
use calcrpc_client::{Code, RpcClient};
use calcrpc_services::proto::calculator::*;
use calcrpc_services::proto::greet::*;
use calcrpc_services::{CalculatorClient, GreetClient, GreetConfig};

const WORK_STEP: Duration = Duration::from_millis(100);

async fn start_server() -> String {
    let greet = GreetConfig {
        pacing: Duration::ZERO,
        work_step: WORK_STEP,
    };
    let dispatcher = calcrpc_services::dispatcher(ServerConfig::default(), greet);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(calcrpc::serve(
        listener,
        calcrpc::router(dispatcher),
        std::future::pending(),
    ));
    format!("http://{addr}")
}

fn rpc_client(url: &str) -> RpcClient {
    RpcClient::builder(url)
        .http2_prior_knowledge()
        .build()
        .unwrap()
}

async fn calculator() -> CalculatorClient {
    CalculatorClient::new(rpc_client(&start_server().await))
}

async fn greeter() -> GreetClient {
    GreetClient::new(rpc_client(&start_server().await))
}

#[tokio::test]
async fn sum_adds_operands() {
    let client = calculator().await;
    let res = client
        .sum(&SumRequest {
            first_number: 3,
            second_number: 4,
        })
        .await
        .unwrap();
    assert_eq!(res.sum_result, 7);
}

#[tokio::test]
async fn sum_over_json() {
    let url = start_server().await;
    let client = CalculatorClient::new(
        RpcClient::builder(&url)
            .use_json()
            .http2_prior_knowledge()
            .build()
            .unwrap(),
    );
    let res = client
        .sum(&SumRequest {
            first_number: -10,
            second_number: 25,
        })
        .await
        .unwrap();
    assert_eq!(res.sum_result, 15);
}

#[tokio::test]
async fn sum_overflow_is_invalid_argument() {
    let client = calculator().await;
    let err = client
        .sum(&SumRequest {
            first_number: i64::MAX,
            second_number: 1,
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn prime_decomposition_streams_factors() {
    let client = calculator().await;
    let mut stream = client
        .prime_number_decomposition(&PrimeNumberDecompositionRequest { number: 120 })
        .await
        .unwrap();
    let mut factors = Vec::new();
    while let Some(res) = stream.message().await.unwrap() {
        factors.push(res.prime_factor);
    }
    assert_eq!(factors, vec![2, 2, 2, 3, 5]);
}

#[tokio::test]
async fn prime_decomposition_of_one_is_empty() {
    let client = calculator().await;
    let mut stream = client
        .prime_number_decomposition(&PrimeNumberDecompositionRequest { number: 1 })
        .await
        .unwrap();
    assert!(stream.message().await.unwrap().is_none());
}

#[tokio::test]
async fn prime_decomposition_rejects_non_positive() {
    let client = calculator().await;
    let mut stream = client
        .prime_number_decomposition(&PrimeNumberDecompositionRequest { number: 0 })
        .await
        .unwrap();
    let err = stream.message().await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn compute_average_of_stream() {
    let client = calculator().await;
    let mut call = client.compute_average().unwrap();
    for number in [3, 5, 9, 54, 33] {
        call.send(&ComputeAverageRequest { number }).await.unwrap();
    }
    let res = call.close_and_receive().await.unwrap();
    assert!((res.average - 20.8).abs() < 1e-9);
}

#[tokio::test]
async fn compute_average_without_input_is_rejected() {
    let client = calculator().await;
    let call = client.compute_average().unwrap();
    let err = call.close_and_receive().await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(err.message(), Some("no numbers received"));
}

#[tokio::test]
async fn find_maximum_emits_strictly_increasing_values() {
    let client = calculator().await;
    let (mut requests, mut responses) = client.find_maximum().unwrap();

    let sender = tokio::spawn(async move {
        for number in [4, 1, 34, 5, 68, 44, 45, 70, 23] {
            requests.send(&FindMaximumRequest { number }).await.unwrap();
        }
    });

    let mut maxima = Vec::new();
    while let Some(res) = responses.message().await.unwrap() {
        maxima.push(res.maximum);
    }
    sender.await.unwrap();
    assert_eq!(maxima, vec![4.0, 34.0, 68.0, 70.0]);
}

#[tokio::test]
async fn find_maximum_starts_unset() {
    let client = calculator().await;
    let (mut requests, mut responses) = client.find_maximum().unwrap();
    for number in [-5, -9, -2] {
        requests.send(&FindMaximumRequest { number }).await.unwrap();
    }
    requests.close_send();

    let mut maxima = Vec::new();
    while let Some(res) = responses.message().await.unwrap() {
        maxima.push(res.maximum);
    }
    assert_eq!(maxima, vec![-5.0, -2.0]);
}

#[tokio::test]
async fn find_maximum_replies_before_input_ends() {
    let client = calculator().await;
    let (mut requests, mut responses) = client.find_maximum().unwrap();

    // Lockstep: every new maximum arrives while the request stream is open.
    for number in [1, 2, 3] {
        requests.send(&FindMaximumRequest { number }).await.unwrap();
        let res = responses.message().await.unwrap().unwrap();
        assert_eq!(res.maximum, f64::from(number));
    }
    drop(requests);
    assert!(responses.message().await.unwrap().is_none());
}

#[tokio::test]
async fn square_root_of_positive_and_negative() {
    let client = calculator().await;
    let res = client
        .square_root(&SquareRootRequest { number: 10 })
        .await
        .unwrap();
    assert!((res.number_root * res.number_root - 10.0).abs() < 1e-9);

    let err = client
        .square_root(&SquareRootRequest { number: -10 })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(err.message(), Some("Received a negative number: -10"));
}

#[tokio::test]
async fn failing_call_does_not_affect_concurrent_calls() {
    let client = calculator().await;
    let bad = client.square_root(&SquareRootRequest { number: -1 });
    let good = client.sum(&SumRequest {
        first_number: 20,
        second_number: 22,
    });
    let (bad, good) = tokio::join!(bad, good);
    assert_eq!(bad.unwrap_err().code(), Code::InvalidArgument);
    assert_eq!(good.unwrap().sum_result, 42);
}

#[tokio::test]
async fn greet_unary() {
    let client = greeter().await;
    let res = client
        .greet(&GreetRequest::new(Greeting::new("Ada", "Lovelace")))
        .await
        .unwrap();
    assert_eq!(res.result, "Hello Ada");
}

#[tokio::test]
async fn greet_many_times_sends_ten_replies() {
    let client = greeter().await;
    let mut stream = client
        .greet_many_times(&GreetManyTimesRequest::new(Greeting::new("Ada", "Lovelace")))
        .await
        .unwrap();
    let mut replies = Vec::new();
    while let Some(res) = stream.message().await.unwrap() {
        replies.push(res.result);
    }
    assert_eq!(replies.len(), 10);
    assert_eq!(replies[0], "Hello Ada number 0");
    assert_eq!(replies[9], "Hello Ada number 9");
}

#[tokio::test]
async fn long_greet_concatenates() {
    let client = greeter().await;
    let mut call = client.long_greet().unwrap();
    for name in ["Ada", "Grace", "Edsger"] {
        call.send(&LongGreetRequest::new(Greeting::new(name, "")))
            .await
            .unwrap();
    }
    let res = call.close_and_receive().await.unwrap();
    assert_eq!(res.result, "Hello Ada! Hello Grace! Hello Edsger! ");
}

#[tokio::test]
async fn greet_everyone_replies_per_message() {
    let client = greeter().await;
    let (mut requests, mut responses) = client.greet_everyone().unwrap();

    let reader = tokio::spawn(async move {
        let mut replies = Vec::new();
        while let Some(res) = responses.message().await.unwrap() {
            replies.push(res.result);
        }
        replies
    });

    for name in ["Ada", "Grace"] {
        requests
            .send(&GreetEveryoneRequest::new(Greeting::new(name, "")))
            .await
            .unwrap();
    }
    requests.close_send();

    assert_eq!(reader.await.unwrap(), vec!["Hello Ada! ", "Hello Grace! "]);
}

#[tokio::test]
async fn greet_with_deadline_within_time() {
    let url = start_server().await;
    let client = GreetClient::new(
        RpcClient::builder(&url)
            .http2_prior_knowledge()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap(),
    );
    let res = client
        .greet_with_deadline(&GreetWithDeadlineRequest::new(Greeting::new("Ada", "")))
        .await
        .unwrap();
    assert_eq!(res.result, "Hello Ada");
}

#[tokio::test]
async fn greet_with_deadline_too_short() {
    let url = start_server().await;
    let client = GreetClient::new(
        RpcClient::builder(&url)
            .http2_prior_knowledge()
            .timeout(WORK_STEP)
            .build()
            .unwrap(),
    );
    let started = tokio::time::Instant::now();
    let err = client
        .greet_with_deadline(&GreetWithDeadlineRequest::new(Greeting::new("Ada", "")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
    // Abandoned promptly instead of waiting for all work steps.
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn unknown_procedure_is_unimplemented() {
    let url = start_server().await;
    let err = rpc_client(&url)
        .unary::<SumRequest, SumResponse>("calculator.CalculatorService/Multiply", &SumRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);
}
