//! The handler contract.
//!
//! A handler is an async function with one of four shapes, one per call
//! pattern. The constructors in this module turn a typed handler into a
//! [`Method`]: a pattern-tagged, type-erased entry the dispatcher can drive.
//!
//! | constructor | handler signature |
//! |---|---|
//! | [`unary`] | `Fn(CallContext, Req) -> Result<Res, RpcError>` |
//! | [`server_stream`] | `Fn(CallContext, Req, ResponseSender<Res>) -> Result<(), RpcError>` |
//! | [`client_stream`] | `Fn(CallContext, Streaming<Req>) -> Result<Res, RpcError>` |
//! | [`bidi_stream`] | `Fn(CallContext, Streaming<Req>, ResponseSender<Res>) -> Result<(), RpcError>` |

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use calcrpc_core::{
    CallPattern, Codec, MessageLimits, RpcError, SessionHandle, StreamReceiver, StreamSender,
    WireMessage,
};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, Stream};

/// Per-call information handed to every handler.
#[derive(Clone, Debug)]
pub struct CallContext {
    procedure: Arc<str>,
    session: SessionHandle,
    codec: Codec,
    limits: MessageLimits,
}

impl CallContext {
    pub(crate) fn new(
        procedure: Arc<str>,
        session: SessionHandle,
        codec: Codec,
        limits: MessageLimits,
    ) -> Self {
        Self {
            procedure,
            session,
            codec,
            limits,
        }
    }

    /// The procedure path, e.g. `/calculator.CalculatorService/Sum`.
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn limits(&self) -> MessageLimits {
        self.limits
    }

    /// Time left until the call deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.session.remaining()
    }

    /// Fail with the cancellation status if the call is over.
    ///
    /// Long-running handlers call this between steps of work.
    pub fn check_deadline(&self) -> Result<(), RpcError> {
        self.session.check_deadline().map_err(RpcError::Status)
    }

    pub(crate) fn encode<T: WireMessage>(&self, msg: &T) -> Result<Bytes, RpcError> {
        encode_message(self.codec, &self.limits, msg)
    }

    pub(crate) fn decode<T: WireMessage>(&self, payload: &[u8]) -> Result<T, RpcError> {
        self.codec
            .decode(payload)
            .map_err(|e| RpcError::Protocol(e.to_string()))
    }
}

fn encode_message<T: WireMessage>(
    codec: Codec,
    limits: &MessageLimits,
    msg: &T,
) -> Result<Bytes, RpcError> {
    let bytes = codec
        .encode(msg)
        .map_err(|e| RpcError::Handler(e.to_string()))?;
    limits.check_send(bytes.len())?;
    Ok(bytes)
}

/// Typed stream of request messages.
#[derive(Debug)]
pub struct Streaming<T> {
    inner: StreamReceiver<Bytes>,
    codec: Codec,
    _marker: PhantomData<fn() -> T>,
}

impl<T: WireMessage> Streaming<T> {
    pub(crate) fn new(inner: StreamReceiver<Bytes>, codec: Codec) -> Self {
        Self {
            inner,
            codec,
            _marker: PhantomData,
        }
    }

    /// Receive the next request message.
    ///
    /// Returns `Ok(None)` once the caller closed its side.
    pub async fn message(&mut self) -> Result<Option<T>, RpcError> {
        match self.inner.receive().await? {
            Some(payload) => self
                .codec
                .decode(&payload)
                .map(Some)
                .map_err(|e| RpcError::Protocol(e.to_string())),
            None => Ok(None),
        }
    }

    /// Convert into a `futures::Stream` of messages.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, RpcError>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut this = state?;
            match this.message().await {
                Ok(Some(msg)) => Some((Ok(msg), Some(this))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}

/// Typed sender for response messages.
///
/// Dropping the sender ends the response stream; the terminal status is
/// whatever the handler returns.
#[derive(Debug)]
pub struct ResponseSender<T> {
    inner: StreamSender<Bytes>,
    codec: Codec,
    limits: MessageLimits,
    _marker: PhantomData<fn(T)>,
}

impl<T: WireMessage> ResponseSender<T> {
    pub(crate) fn new(inner: StreamSender<Bytes>, codec: Codec, limits: MessageLimits) -> Self {
        Self {
            inner,
            codec,
            limits,
            _marker: PhantomData,
        }
    }

    /// Send one response message, waiting while the peer is slow to read.
    pub async fn send(&mut self, msg: T) -> Result<(), RpcError> {
        let payload = encode_message(self.codec, &self.limits, &msg)?;
        self.inner.send(payload).await?;
        Ok(())
    }
}

impl<T> Drop for ResponseSender<T> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

pub(crate) type UnaryFn = dyn Fn(CallContext, Bytes) -> BoxFuture<'static, Result<Bytes, RpcError>>
    + Send
    + Sync;
pub(crate) type ServerStreamFn = dyn Fn(CallContext, Bytes, StreamSender<Bytes>) -> BoxFuture<'static, Result<(), RpcError>>
    + Send
    + Sync;
pub(crate) type ClientStreamFn = dyn Fn(CallContext, StreamReceiver<Bytes>) -> BoxFuture<'static, Result<Bytes, RpcError>>
    + Send
    + Sync;
pub(crate) type BidiStreamFn = dyn Fn(
        CallContext,
        StreamReceiver<Bytes>,
        StreamSender<Bytes>,
    ) -> BoxFuture<'static, Result<(), RpcError>>
    + Send
    + Sync;

/// A registered handler, tagged with its call pattern.
#[derive(Clone)]
pub enum Method {
    Unary(Arc<UnaryFn>),
    ServerStream(Arc<ServerStreamFn>),
    ClientStream(Arc<ClientStreamFn>),
    BidiStream(Arc<BidiStreamFn>),
}

impl Method {
    pub fn pattern(&self) -> CallPattern {
        match self {
            Method::Unary(_) => CallPattern::Unary,
            Method::ServerStream(_) => CallPattern::ServerStream,
            Method::ClientStream(_) => CallPattern::ClientStream,
            Method::BidiStream(_) => CallPattern::BidiStream,
        }
    }
}

impl std::fmt::Debug for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Method").field(&self.pattern()).finish()
    }
}

/// One request, one response.
pub fn unary<F, Fut, Req, Res>(handler: F) -> Method
where
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Res, RpcError>> + Send + 'static,
    Req: WireMessage,
    Res: WireMessage,
{
    Method::Unary(Arc::new(move |ctx: CallContext, payload: Bytes| {
        let call = ctx
            .decode::<Req>(&payload)
            .map(|req| handler(ctx.clone(), req));
        async move {
            let res = call?.await?;
            ctx.encode(&res)
        }
        .boxed()
    }))
}

/// One request, a stream of responses.
pub fn server_stream<F, Fut, Req, Res>(handler: F) -> Method
where
    F: Fn(CallContext, Req, ResponseSender<Res>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RpcError>> + Send + 'static,
    Req: WireMessage,
    Res: WireMessage,
{
    Method::ServerStream(Arc::new(
        move |ctx: CallContext, payload: Bytes, output: StreamSender<Bytes>| {
            let sender = ResponseSender::new(output, ctx.codec(), ctx.limits());
            let call = ctx
                .decode::<Req>(&payload)
                .map(|req| handler(ctx.clone(), req, sender));
            async move { call?.await }.boxed()
        },
    ))
}

/// A stream of requests, one response.
pub fn client_stream<F, Fut, Req, Res>(handler: F) -> Method
where
    F: Fn(CallContext, Streaming<Req>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Res, RpcError>> + Send + 'static,
    Req: WireMessage,
    Res: WireMessage,
{
    Method::ClientStream(Arc::new(
        move |ctx: CallContext, input: StreamReceiver<Bytes>| {
            let requests = Streaming::new(input, ctx.codec());
            let call = handler(ctx.clone(), requests);
            async move {
                let res = call.await?;
                ctx.encode(&res)
            }
            .boxed()
        },
    ))
}

/// Independent request and response streams.
pub fn bidi_stream<F, Fut, Req, Res>(handler: F) -> Method
where
    F: Fn(CallContext, Streaming<Req>, ResponseSender<Res>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RpcError>> + Send + 'static,
    Req: WireMessage,
    Res: WireMessage,
{
    Method::BidiStream(Arc::new(
        move |ctx: CallContext, input: StreamReceiver<Bytes>, output: StreamSender<Bytes>| {
            let requests = Streaming::new(input, ctx.codec());
            let sender = ResponseSender::new(output, ctx.codec(), ctx.limits());
            handler(ctx, requests, sender).boxed()
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcrpc_core::{CallPattern, CallSession, Code, channel};
    use futures::{StreamExt, TryStreamExt};

    #[derive(Clone, PartialEq, prost::Message, serde::Serialize, serde::Deserialize)]
    struct Number {
        #[prost(int64, tag = "1")]
        #[serde(default)]
        value: i64,
    }

    #[tokio::test]
    async fn test_into_stream_yields_messages_until_close() {
        let session = CallSession::begin(CallPattern::ClientStream, None);
        let (mut tx, rx) = channel(session, 4);
        for value in [1, 2, 3] {
            tx.send(Codec::Proto.encode(&Number { value }).unwrap())
                .await
                .unwrap();
        }
        tx.close();

        let values: Vec<i64> = Streaming::<Number>::new(rx, Codec::Proto)
            .into_stream()
            .map_ok(|n| n.value)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_into_stream_ends_after_error() {
        let session = CallSession::begin(CallPattern::ClientStream, None);
        let (mut tx, rx) = channel(session, 4);
        tx.send(Bytes::from_static(b"\xff\xff")).await.unwrap();
        tx.send(Codec::Proto.encode(&Number { value: 1 }).unwrap())
            .await
            .unwrap();
        tx.close();

        let items: Vec<_> = Streaming::<Number>::new(rx, Codec::Proto)
            .into_stream()
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(err) if err.code() == Code::Internal));
    }
}
