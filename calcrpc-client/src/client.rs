//! The RPC client and its four call shapes.
//!
//! Every call runs as a session with two channels. The request channel feeds
//! the streaming HTTP request body; a spawned task reads the response body,
//! decodes envelopes into the response channel and completes the session
//! with the status carried by the end-of-stream frame.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use calcrpc_core::{
    CallPattern, CallSession, ChannelError, Codec, Frame, FrameDecoder, MessageLimits,
    SessionHandle, Status, StreamReceiver, StreamSender, TIMEOUT_HEADER, WireMessage, channel,
    duration_to_timeout_header, message_frame,
};
use futures::stream;
use http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use tracing::{Instrument, info_span};

use crate::builder::ClientBuilder;
use crate::streaming::{RequestSender, Streaming};
use crate::transport::{HyperTransport, TransportBody};
use crate::ClientError;

/// Messages buffered per direction unless configured otherwise.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Client for calcrpc services.
///
/// Cheap to clone; clones share the connection pool.
///
/// # Example
///
/// ```no_run
/// # #[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
/// # struct Ping { #[prost(string, tag = "1")] #[serde(default)] text: String }
/// use calcrpc_client::RpcClient;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RpcClient::builder("http://localhost:50051")
///     .http2_prior_knowledge()
///     .build()?;
///
/// let reply: Ping = client
///     .unary("ping.PingService/Ping", &Ping { text: "hi".into() })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct RpcClient {
    base_url: Arc<str>,
    transport: HyperTransport,
    codec: Codec,
    timeout: Option<Duration>,
    limits: MessageLimits,
    channel_capacity: usize,
}

impl RpcClient {
    pub fn builder<S: Into<String>>(base_url: S) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    pub(crate) fn from_parts(
        base_url: String,
        transport: HyperTransport,
        codec: Codec,
        timeout: Option<Duration>,
        limits: MessageLimits,
        channel_capacity: usize,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            transport,
            codec,
            timeout,
            limits,
            channel_capacity,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// One request, one response.
    pub async fn unary<Req, Res>(&self, procedure: &str, request: &Req) -> Result<Res, ClientError>
    where
        Req: WireMessage,
        Res: WireMessage,
    {
        let (mut sender, responses) = self.start::<Req, Res>(procedure, CallPattern::Unary)?;
        sender.send(request).await?;
        drop(sender);
        responses.single().await
    }

    /// One request, a stream of responses.
    pub async fn server_stream<Req, Res>(
        &self,
        procedure: &str,
        request: &Req,
    ) -> Result<Streaming<Res>, ClientError>
    where
        Req: WireMessage,
        Res: WireMessage,
    {
        let (mut sender, responses) =
            self.start::<Req, Res>(procedure, CallPattern::ServerStream)?;
        sender.send(request).await?;
        drop(sender);
        Ok(responses)
    }

    /// A stream of requests, one response after the requests are closed.
    pub fn client_stream<Req, Res>(
        &self,
        procedure: &str,
    ) -> Result<ClientStreamCall<Req, Res>, ClientError>
    where
        Req: WireMessage,
        Res: WireMessage,
    {
        let (sender, responses) = self.start(procedure, CallPattern::ClientStream)?;
        Ok(ClientStreamCall { sender, responses })
    }

    /// Independent request and response streams.
    ///
    /// The two halves can be moved to different tasks. Against a cleartext
    /// server this needs [`http2_prior_knowledge`](ClientBuilder::http2_prior_knowledge).
    pub fn bidi_stream<Req, Res>(
        &self,
        procedure: &str,
    ) -> Result<(RequestSender<Req>, Streaming<Res>), ClientError>
    where
        Req: WireMessage,
        Res: WireMessage,
    {
        self.start(procedure, CallPattern::BidiStream)
    }

    fn start<Req, Res>(
        &self,
        procedure: &str,
        pattern: CallPattern,
    ) -> Result<(RequestSender<Req>, Streaming<Res>), ClientError>
    where
        Req: WireMessage,
        Res: WireMessage,
    {
        let session = CallSession::with_timeout(pattern, self.timeout);
        let (request_tx, request_rx) = channel(session.clone(), self.channel_capacity);
        let (response_tx, response_rx) = channel(session.clone(), self.channel_capacity);

        let request = self.build_request(procedure, &session, request_rx)?;

        let span = info_span!(
            "rpc.call",
            rpc.method = %procedure,
            rpc.type = pattern.as_str(),
            rpc.encoding = self.codec.name(),
            otel.kind = "client",
        );
        tokio::spawn(
            pump_responses(
                self.transport.clone(),
                request,
                response_tx,
                self.codec,
                self.limits.get_receive_max_bytes(),
            )
            .instrument(span),
        );

        Ok((
            RequestSender::new(request_tx, self.codec, self.limits),
            Streaming::new(response_rx, session, self.codec),
        ))
    }

    fn build_request(
        &self,
        procedure: &str,
        session: &SessionHandle,
        requests: StreamReceiver<Bytes>,
    ) -> Result<Request<TransportBody>, ClientError> {
        let procedure = procedure.strip_prefix('/').unwrap_or(procedure);
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/{}", self.base_url, procedure))
            .header(header::CONTENT_TYPE, self.codec.content_type());
        if let Some(timeout) = session.remaining().and_then(duration_to_timeout_header) {
            builder = builder.header(TIMEOUT_HEADER, timeout);
        }
        builder
            .body(request_body(requests))
            .map_err(|e| ClientError::Protocol(format!("invalid request for {procedure}: {e}")))
    }
}

/// Turn the request channel into framed body chunks.
///
/// The end of the channel is the half-close. The body also ends once the call
/// has finished, so later sends fail instead of queueing forever.
fn request_body(requests: StreamReceiver<Bytes>) -> TransportBody {
    TransportBody::streaming(stream::unfold(Some(requests), |state| async move {
        let mut requests = state?;
        let session = requests.session().clone();
        let item = tokio::select! {
            biased;
            item = requests.receive() => item,
            _ = session.done() => return None,
        };
        match item {
            Ok(Some(payload)) => Some((Ok(message_frame(&payload)), Some(requests))),
            Ok(None) => {
                session.half_close();
                None
            }
            Err(ChannelError::Closed) => None,
            // Failing the body resets the HTTP stream.
            Err(ChannelError::Aborted(status)) => Some((Err(ClientError::Status(status)), None)),
        }
    }))
}

/// Drive one call's HTTP exchange and record its terminal status.
async fn pump_responses(
    transport: HyperTransport,
    request: Request<TransportBody>,
    mut responses: StreamSender<Bytes>,
    codec: Codec,
    receive_max_bytes: Option<usize>,
) {
    let session = responses.session().clone();
    let status = tokio::select! {
        biased;
        status = session.cancelled() => status,
        status = read_response(&transport, request, &mut responses, codec, receive_max_bytes) => status,
    };

    if status.is_ok() {
        tracing::debug!("call completed");
    } else {
        tracing::debug!(code = %status.code(), message = ?status.message(), "call failed");
    }
    // No-op when the session was already cancelled.
    session.complete(status);
    responses.close();
}

async fn read_response(
    transport: &HyperTransport,
    request: Request<TransportBody>,
    responses: &mut StreamSender<Bytes>,
    codec: Codec,
    receive_max_bytes: Option<usize>,
) -> Status {
    let response = match transport.request(request).await {
        Ok(response) => response,
        Err(err) => return err.into_status(),
    };
    let (parts, mut body) = response.into_parts();

    if parts.status != StatusCode::OK {
        return status_from_http(parts.status);
    }
    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    if content_type.and_then(Codec::from_content_type) != Some(codec) {
        return Status::internal(format!(
            "unexpected response content type {content_type:?}"
        ));
    }

    let mut decoder = FrameDecoder::new(receive_max_bytes);
    loop {
        match body.frame().await {
            Some(Ok(frame)) => {
                // Trailers carry nothing for this protocol.
                let Ok(data) = frame.into_data() else {
                    continue;
                };
                decoder.push(&data);
                loop {
                    match decoder.next_frame() {
                        Ok(None) => break,
                        Ok(Some(Frame::Message(payload))) => {
                            if let Err(err) = responses.send(payload).await {
                                return err.into_status();
                            }
                        }
                        Ok(Some(Frame::End(status))) => return status,
                        Err(err) => return ClientError::from(err).into_status(),
                    }
                }
            }
            Some(Err(err)) => {
                return Status::unavailable(format!("response stream failed: {err}"));
            }
            None => {
                return match decoder.finish() {
                    Ok(()) => Status::internal("response ended without end-of-stream frame"),
                    Err(err) => ClientError::from(err).into_status(),
                };
            }
        }
    }
}

/// Status for a response that was rejected before a session existed.
fn status_from_http(status: StatusCode) -> Status {
    let code = match status {
        StatusCode::BAD_REQUEST | StatusCode::UNSUPPORTED_MEDIA_TYPE => calcrpc_core::Code::Internal,
        StatusCode::UNAUTHORIZED => calcrpc_core::Code::Unauthenticated,
        StatusCode::FORBIDDEN => calcrpc_core::Code::PermissionDenied,
        StatusCode::NOT_FOUND => calcrpc_core::Code::Unimplemented,
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => calcrpc_core::Code::Unavailable,
        _ => calcrpc_core::Code::Unknown,
    };
    Status::new(code, format!("HTTP {status}"))
}

/// A client-streaming call in progress.
#[derive(Debug)]
pub struct ClientStreamCall<Req, Res> {
    sender: RequestSender<Req>,
    responses: Streaming<Res>,
}

impl<Req: WireMessage, Res: WireMessage> ClientStreamCall<Req, Res> {
    pub async fn send(&mut self, msg: &Req) -> Result<(), ClientError> {
        self.sender.send(msg).await
    }

    /// Close the request stream and wait for the single response.
    pub async fn close_and_receive(self) -> Result<Res, ClientError> {
        let Self {
            mut sender,
            responses,
        } = self;
        sender.close_send();
        responses.single().await
    }

    pub fn session(&self) -> &SessionHandle {
        self.responses.session()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcrpc::prelude::*;
    use calcrpc_core::{Code, SessionState};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
    struct Num {
        #[prost(int64, tag = "1")]
        #[serde(default)]
        value: i64,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn num(value: i64) -> Num {
        Num { value }
    }

    fn dispatcher(dropped: Arc<AtomicBool>) -> Dispatcher {
        Dispatcher::builder()
            .route(
                "/test.Math/Double",
                unary(|_ctx, req: Num| async move { Ok(num(req.value * 2)) }),
            )
            .route(
                "/test.Math/Fail",
                unary(|_ctx, _req: Num| async move {
                    Err::<Num, _>(RpcError::invalid_argument("bad input"))
                }),
            )
            .route(
                "/test.Math/Slow",
                unary(|_ctx, req: Num| async move {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(req)
                }),
            )
            .route(
                "/test.Math/Count",
                server_stream(|_ctx, req: Num, mut out: ResponseSender<Num>| async move {
                    if req.value < 0 {
                        return Err(RpcError::invalid_argument("negative count"));
                    }
                    for i in 1..=req.value {
                        out.send(num(i)).await?;
                    }
                    Ok(())
                }),
            )
            .route(
                "/test.Math/Forever",
                server_stream(move |_ctx, _req: Num, mut out: ResponseSender<Num>| {
                    let dropped = dropped.clone();
                    async move {
                        // Set when the handler returns or its task is aborted.
                        let _guard = SetOnDrop(dropped);
                        let mut i = 0;
                        let result: Result<(), RpcError> = loop {
                            i += 1;
                            if let Err(err) = out.send(num(i)).await {
                                break Err(err);
                            }
                        };
                        result
                    }
                }),
            )
            .route(
                "/test.Math/Total",
                client_stream(|_ctx, mut input: calcrpc::Streaming<Num>| async move {
                    let mut total = 0;
                    while let Some(n) = input.message().await? {
                        total += n.value;
                    }
                    Ok(num(total))
                }),
            )
            .route(
                "/test.Math/Echo",
                bidi_stream(
                    |_ctx, mut input: calcrpc::Streaming<Num>, mut out: ResponseSender<Num>| async move {
                        while let Some(n) = input.message().await? {
                            out.send(n).await?;
                        }
                        Ok(())
                    },
                ),
            )
            .build()
    }

    async fn start_server() -> (String, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = calcrpc::router(dispatcher(dropped.clone()));
        tokio::spawn(calcrpc::serve(listener, router, std::future::pending()));
        (format!("http://{addr}"), dropped)
    }

    fn client(url: &str) -> RpcClient {
        RpcClient::builder(url)
            .http2_prior_knowledge()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_unary_proto() {
        let (url, _) = start_server().await;
        let reply: Num = client(&url).unary("test.Math/Double", &num(21)).await.unwrap();
        assert_eq!(reply.value, 42);
    }

    #[tokio::test]
    async fn test_unary_json_with_leading_slash() {
        let (url, _) = start_server().await;
        let client = RpcClient::builder(&url)
            .use_json()
            .http2_prior_knowledge()
            .build()
            .unwrap();
        let reply: Num = client.unary("/test.Math/Double", &num(4)).await.unwrap();
        assert_eq!(reply.value, 8);
    }

    #[tokio::test]
    async fn test_unary_error_status() {
        let (url, _) = start_server().await;
        let err = client(&url)
            .unary::<Num, Num>("test.Math/Fail", &num(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert_eq!(err.message(), Some("bad input"));
    }

    #[tokio::test]
    async fn test_unknown_procedure() {
        let (url, _) = start_server().await;
        let err = client(&url)
            .unary::<Num, Num>("test.Math/Nope", &num(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_unroutable_path_maps_http_status() {
        let (url, _) = start_server().await;
        let err = client(&url)
            .unary::<Num, Num>("no-service", &num(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unimplemented);
    }

    #[tokio::test]
    async fn test_server_stream() {
        let (url, _) = start_server().await;
        let mut stream = client(&url)
            .server_stream::<Num, Num>("test.Math/Count", &num(3))
            .await
            .unwrap();
        let mut seen = Vec::new();
        while let Some(n) = stream.message().await.unwrap() {
            seen.push(n.value);
        }
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(stream.session().state(), SessionState::Completed);
        // The end is reported once.
        assert!(stream.message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_stream_into_stream() {
        use futures::{StreamExt, TryStreamExt};

        let (url, _) = start_server().await;
        let rpc = client(&url);
        let values: Vec<i64> = rpc
            .server_stream::<Num, Num>("test.Math/Count", &num(4))
            .await
            .unwrap()
            .into_stream()
            .map_ok(|n| n.value)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(values, vec![1, 2, 3, 4]);

        let items: Vec<_> = rpc
            .server_stream::<Num, Num>("test.Math/Count", &num(-1))
            .await
            .unwrap()
            .into_stream()
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(err) if err.code() == Code::InvalidArgument));
    }

    #[tokio::test]
    async fn test_client_stream() {
        let (url, _) = start_server().await;
        let mut call = client(&url)
            .client_stream::<Num, Num>("test.Math/Total")
            .unwrap();
        for i in 1..=4 {
            call.send(&num(i)).await.unwrap();
        }
        let total = call.close_and_receive().await.unwrap();
        assert_eq!(total.value, 10);
    }

    #[tokio::test]
    async fn test_bidi_halves_on_separate_tasks() {
        let (url, _) = start_server().await;
        let (mut tx, mut rx) = client(&url)
            .bidi_stream::<Num, Num>("test.Math/Echo")
            .unwrap();

        let writer = tokio::spawn(async move {
            for i in 0..5 {
                tx.send(&num(i)).await.unwrap();
            }
        });

        let mut seen = Vec::new();
        while let Some(n) = rx.message().await.unwrap() {
            seen.push(n.value);
        }
        writer.await.unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_deadline_against_unresponsive_server() {
        let (url, _) = start_server().await;
        let client = RpcClient::builder(&url)
            .http2_prior_knowledge()
            .timeout(Duration::from_millis(100))
            .build()
            .unwrap();
        let started = tokio::time::Instant::now();
        let err = client
            .unary::<Num, Num>("test.Math/Slow", &num(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_dropping_stream_cancels_server_call() {
        let (url, dropped) = start_server().await;
        let client = RpcClient::builder(&url)
            .http2_prior_knowledge()
            .channel_capacity(1)
            .build()
            .unwrap();
        let mut stream = client
            .server_stream::<Num, Num>("test.Math/Forever", &num(0))
            .await
            .unwrap();
        assert_eq!(stream.message().await.unwrap().map(|n| n.value), Some(1));
        let session = stream.session().clone();
        drop(stream);
        assert_eq!(session.state(), SessionState::Cancelled);

        // The server notices the reset and stops the handler.
        tokio::time::timeout(Duration::from_secs(5), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_send_limit_enforced_locally() {
        let (url, _) = start_server().await;
        let client = RpcClient::builder(&url)
            .http2_prior_knowledge()
            .send_max_bytes(1)
            .build()
            .unwrap();
        let err = client
            .unary::<Num, Num>("test.Math/Double", &num(1_000_000))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::ResourceExhausted);
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .unary::<Num, Num>("test.Math/Double", &num(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unavailable);
    }

    #[test]
    fn test_status_from_http() {
        assert_eq!(status_from_http(StatusCode::NOT_FOUND).code(), Code::Unimplemented);
        assert_eq!(
            status_from_http(StatusCode::SERVICE_UNAVAILABLE).code(),
            Code::Unavailable
        );
        assert_eq!(status_from_http(StatusCode::IM_A_TEAPOT).code(), Code::Unknown);
    }
}
