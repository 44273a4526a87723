//! HTTP binding of the dispatcher.
//!
//! Every call is a `POST /{package.Service}/{Method}`. The request body is
//! decoded into envelopes and fed to the call's request channel by a
//! separate task; the response body is produced from the response channel
//! and always ends with exactly one end-of-stream frame.
//!
//! Once a session exists the HTTP status is 200 and the outcome of the call
//! travels in the end-of-stream frame. Unsupported content types are
//! rejected with 415 before any session is created.

use std::convert::Infallible;

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use calcrpc_core::{
    Codec, Frame, FrameDecoder, RpcError, SessionHandle, Status, StreamReceiver, StreamSender,
    TIMEOUT_HEADER, end_stream_frame, message_frame, parse_timeout_ms,
};
use futures::{Stream, StreamExt};

use crate::dispatcher::{ActiveCall, Dispatcher};

/// Build an axum router serving every procedure registered in `dispatcher`.
///
/// The router can be merged into a larger axum application.
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/{service}/{method}", post(handle_call))
        .with_state(dispatcher)
}

async fn handle_call(State(dispatcher): State<Dispatcher>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let Some(codec) = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(Codec::from_content_type)
    else {
        return (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "unsupported content type",
        )
            .into_response();
    };

    let client_timeout = parts
        .headers
        .get(TIMEOUT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_timeout_ms);

    let procedure = parts.uri.path();
    let ActiveCall {
        session,
        requests,
        responses,
    } = match dispatcher.dispatch(procedure, codec, client_timeout) {
        Ok(call) => call,
        Err(status) => {
            tracing::debug!(procedure, code = %status.code(), "call rejected");
            return envelope_response(codec, Body::from(end_stream_frame(&status)));
        }
    };

    let receive_max_bytes = dispatcher.config().get_limits().get_receive_max_bytes();
    tokio::spawn(pump_requests(body, requests, receive_max_bytes));

    envelope_response(codec, Body::from_stream(pump_responses(responses, session)))
}

fn envelope_response(codec: Codec, body: Body) -> Response {
    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(codec.content_type()),
    );
    response
}

/// Decode request envelopes and feed them to the call.
///
/// The end of the request body is the caller's half-close.
async fn pump_requests(
    body: Body,
    mut requests: StreamSender<Bytes>,
    receive_max_bytes: Option<usize>,
) {
    let session = requests.session().clone();
    let mut chunks = body.into_data_stream();
    let mut decoder = FrameDecoder::new(receive_max_bytes);

    loop {
        let next = tokio::select! {
            biased;
            _ = session.done() => return,
            next = chunks.next() => next,
        };
        let chunk = match next {
            Some(Ok(chunk)) => chunk,
            Some(Err(err)) => {
                tracing::debug!(error = %err, "request body failed");
                session.cancel(Status::cancelled("request stream reset by peer"));
                return;
            }
            None => break,
        };

        decoder.push(&chunk);
        loop {
            match decoder.next_frame() {
                Ok(Some(Frame::Message(payload))) => {
                    if requests.send(payload).await.is_err() {
                        // The handler stopped reading or the call is over.
                        return;
                    }
                }
                Ok(Some(Frame::End(_))) => {
                    let err = RpcError::Protocol("unexpected end-of-stream frame in request".into());
                    requests.abort(err.into_status());
                    return;
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(error = %err, "malformed request envelope");
                    requests.abort(RpcError::from(err).into_status());
                    return;
                }
            }
        }
    }

    match decoder.finish() {
        Ok(()) => {
            requests.close();
            session.half_close();
        }
        Err(err) => requests.abort(RpcError::from(err).into_status()),
    }
}

/// Cancels the session if the response body goes away before the call ends.
struct CancelOnDrop(SessionHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.0.cancel(Status::cancelled("response stream dropped by peer")) {
            tracing::debug!("peer went away, call cancelled");
        }
    }
}

/// Encode response payloads, then the terminal status.
fn pump_responses(
    mut responses: StreamReceiver<Bytes>,
    session: SessionHandle,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let guard = CancelOnDrop(session.clone());
    async_stream::stream! {
        let _guard = guard;
        while let Ok(Some(payload)) = responses.receive().await {
            yield Ok::<Bytes, Infallible>(message_frame(&payload));
        }
        let status = session.done().await;
        tracing::debug!(code = %status.code(), "call finished");
        yield Ok::<Bytes, Infallible>(end_stream_frame(&status));
    }
}
