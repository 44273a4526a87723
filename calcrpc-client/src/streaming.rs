//! Typed halves of a client call.
//!
//! [`RequestSender`] writes request messages; [`Streaming`] reads response
//! messages and, at the end, the terminal status. Both are bound to the
//! call's session, so they can be moved to different tasks and a deadline
//! interrupts whichever one is blocked.
//!
//! # Cancellation
//!
//! Dropping a [`Streaming`] before it reported the end of the call cancels
//! the call. The HTTP stream is reset, which signals the server.

use std::marker::PhantomData;

use bytes::Bytes;
use calcrpc_core::{
    ChannelError, Codec, MessageLimits, SessionHandle, Status, StreamReceiver,
    StreamSender, WireMessage,
};
use futures::stream::{self, Stream};

use crate::ClientError;

/// Sending half of a client-streaming or bidi-streaming call.
///
/// Dropping the sender half-closes the request stream, like
/// [`close_send`](Self::close_send).
#[derive(Debug)]
pub struct RequestSender<T> {
    inner: StreamSender<Bytes>,
    codec: Codec,
    limits: MessageLimits,
    _marker: PhantomData<fn(T)>,
}

impl<T: WireMessage> RequestSender<T> {
    pub(crate) fn new(inner: StreamSender<Bytes>, codec: Codec, limits: MessageLimits) -> Self {
        Self {
            inner,
            codec,
            limits,
            _marker: PhantomData,
        }
    }

    /// Send one request message.
    ///
    /// Waits while the server is slow to read. Fails once the call is over.
    pub async fn send(&mut self, msg: &T) -> Result<(), ClientError> {
        let payload = self
            .codec
            .encode(msg)
            .map_err(|e| ClientError::Encode(e.to_string()))?;
        self.limits.check_send(payload.len())?;
        self.inner.send(payload).await.map_err(|err| match err {
            // The request stream went away because the call finished.
            ChannelError::Closed => match self.inner.session().status() {
                Some(status) if !status.is_ok() => ClientError::Status(status),
                _ => ClientError::Status(Status::cancelled("request stream closed")),
            },
            ChannelError::Aborted(status) => ClientError::Status(status),
        })
    }

    /// Signal that no more requests will be sent.
    pub fn close_send(&mut self) {
        self.inner.close();
    }
}

impl<T> Drop for RequestSender<T> {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// Receiving half of a call: response messages, then the terminal status.
#[derive(Debug)]
pub struct Streaming<T> {
    inner: StreamReceiver<Bytes>,
    session: SessionHandle,
    codec: Codec,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: WireMessage> Streaming<T> {
    pub(crate) fn new(inner: StreamReceiver<Bytes>, session: SessionHandle, codec: Codec) -> Self {
        Self {
            inner,
            session,
            codec,
            finished: false,
            _marker: PhantomData,
        }
    }

    /// Receive the next response message.
    ///
    /// Returns `Ok(None)` when the call completed successfully, and the
    /// call's error status when it did not. Either is reported once.
    pub async fn message(&mut self) -> Result<Option<T>, ClientError> {
        if self.finished {
            return Ok(None);
        }
        match self.inner.receive().await {
            Ok(Some(payload)) => self
                .codec
                .decode(&payload)
                .map(Some)
                .map_err(|e| self.fail(ClientError::Decode(e.to_string()))),
            Ok(None) => {
                self.finished = true;
                let status = self.session.done().await;
                if status.is_ok() {
                    Ok(None)
                } else {
                    Err(ClientError::Status(status))
                }
            }
            Err(err) => {
                self.finished = true;
                Err(err.into())
            }
        }
    }

    /// Receive exactly one message followed by the end of the call.
    pub(crate) async fn single(mut self) -> Result<T, ClientError> {
        let Some(msg) = self.message().await? else {
            return Err(ClientError::Protocol("missing response message".into()));
        };
        match self.message().await? {
            None => Ok(msg),
            Some(_) => Err(ClientError::Protocol(
                "expected exactly one response message".into(),
            )),
        }
    }

    /// The call's session.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Convert into a `futures::Stream` of messages.
    pub fn into_stream(self) -> impl Stream<Item = Result<T, ClientError>> + Send {
        stream::unfold(Some(self), |state| async move {
            let mut this = state?;
            match this.message().await {
                Ok(Some(msg)) => Some((Ok(msg), Some(this))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    fn fail(&mut self, err: ClientError) -> ClientError {
        self.finished = true;
        self.session.cancel(Status::cancelled("response could not be decoded"));
        err
    }
}

impl<T> Drop for Streaming<T> {
    fn drop(&mut self) {
        if self.session.cancel(Status::cancelled("call dropped by client")) {
            tracing::debug!("response stream dropped before the end, call cancelled");
        }
    }
}
