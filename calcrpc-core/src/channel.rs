//! Bounded one-direction message channels bound to a call session.
//!
//! Each direction of a call gets its own channel, so back-pressure on one
//! direction never stalls the other. Both ends race every blocking operation
//! against [`CallSession::cancelled`], which makes them return promptly once
//! the call is cancelled or its deadline passes.
//!
//! A reader observes exactly one of two endings: end-of-stream after the
//! writer called [`StreamSender::close`], or an abort carrying a status.
//! After either has been reported, further reads fail with
//! [`ChannelError::Closed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;

use crate::error::{RpcError, Status};
use crate::session::SessionHandle;

/// Errors returned by channel operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The channel is closed on this side, or the peer stopped reading.
    #[error("stream closed")]
    Closed,
    /// The stream was terminated early with a status.
    #[error("stream aborted: {0}")]
    Aborted(Status),
}

impl ChannelError {
    /// Status reported to the remote party for this error.
    pub fn into_status(self) -> Status {
        match self {
            ChannelError::Closed => Status::cancelled("stream closed"),
            ChannelError::Aborted(status) => status,
        }
    }
}

impl From<ChannelError> for RpcError {
    fn from(err: ChannelError) -> Self {
        RpcError::Status(err.into_status())
    }
}

#[derive(Debug, Default)]
struct Shared {
    /// Set by the writer when it finishes cleanly.
    send_closed: AtomicBool,
    /// Set by the writer to terminate the stream with a status.
    send_abort: OnceLock<Status>,
    /// Set by the reader to refuse further messages with a status.
    recv_abort: OnceLock<Status>,
}

/// Create a bounded channel of `capacity` messages bound to `session`.
pub fn channel<T>(session: SessionHandle, capacity: usize) -> (StreamSender<T>, StreamReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let shared = Arc::new(Shared::default());
    (
        StreamSender {
            tx: Some(tx),
            shared: shared.clone(),
            session: session.clone(),
        },
        StreamReceiver {
            rx,
            shared,
            session,
            finished: false,
        },
    )
}

enum Outcome<T> {
    Cancelled(Status),
    Done(T),
}

/// Writing end of a channel.
///
/// There is exactly one writer per channel. Dropping it without calling
/// [`close`](Self::close) is reported to the reader as an internal abort.
#[derive(Debug)]
pub struct StreamSender<T> {
    tx: Option<mpsc::Sender<T>>,
    shared: Arc<Shared>,
    session: SessionHandle,
}

impl<T> StreamSender<T> {
    /// Enqueue a message, waiting while the channel is full.
    pub async fn send(&mut self, msg: T) -> Result<(), ChannelError> {
        self.session.check_deadline().map_err(ChannelError::Aborted)?;
        let Some(tx) = self.tx.as_ref() else {
            return Err(ChannelError::Closed);
        };

        let outcome = tokio::select! {
            biased;
            status = self.session.cancelled() => Outcome::Cancelled(status),
            sent = tx.send(msg) => Outcome::Done(sent),
        };

        match outcome {
            Outcome::Cancelled(status) => Err(ChannelError::Aborted(status)),
            Outcome::Done(Ok(())) => Ok(()),
            Outcome::Done(Err(_)) => {
                self.tx = None;
                Err(match self.shared.recv_abort.get() {
                    Some(status) => ChannelError::Aborted(status.clone()),
                    None => ChannelError::Closed,
                })
            }
        }
    }

    /// Signal end-of-stream. Messages already sent are still delivered.
    pub fn close(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.shared.send_closed.store(true, Ordering::Release);
            drop(tx);
        }
    }

    /// Terminate the stream with `status`. Undelivered messages are discarded.
    pub fn abort(&mut self, status: Status) {
        if let Some(tx) = self.tx.take() {
            let _ = self.shared.send_abort.set(status);
            drop(tx);
        }
    }

    /// Whether this end has been closed or aborted.
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }
}

/// Reading end of a channel.
#[derive(Debug)]
pub struct StreamReceiver<T> {
    rx: mpsc::Receiver<T>,
    shared: Arc<Shared>,
    session: SessionHandle,
    finished: bool,
}

impl<T> StreamReceiver<T> {
    /// Take the next message in FIFO order.
    ///
    /// Returns `Ok(None)` once, at end-of-stream. Waits while the channel is
    /// empty and the writer has not finished.
    pub async fn receive(&mut self) -> Result<Option<T>, ChannelError> {
        if self.finished {
            return Err(ChannelError::Closed);
        }
        if let Err(status) = self.session.check_deadline() {
            return Err(self.fail(status));
        }

        let outcome = tokio::select! {
            biased;
            status = self.session.cancelled() => Outcome::Cancelled(status),
            item = self.rx.recv() => Outcome::Done(item),
        };

        let item = match outcome {
            Outcome::Cancelled(status) => return Err(self.fail(status)),
            Outcome::Done(item) => item,
        };

        if let Some(status) = self.shared.send_abort.get() {
            let status = status.clone();
            return Err(self.fail(status));
        }

        match item {
            Some(msg) => Ok(Some(msg)),
            None if self.shared.send_closed.load(Ordering::Acquire) => {
                self.finished = true;
                Ok(None)
            }
            None => Err(self.fail(Status::internal("stream ended without close"))),
        }
    }

    /// Stop reading. The writer's next send fails with [`ChannelError::Closed`].
    pub fn close(&mut self) {
        self.rx.close();
        self.finished = true;
    }

    /// Stop reading and make the writer's next send fail with `status`.
    pub fn abort(&mut self, status: Status) {
        let _ = self.shared.recv_abort.set(status);
        self.close();
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn fail(&mut self, status: Status) -> ChannelError {
        self.finished = true;
        self.rx.close();
        ChannelError::Aborted(status)
    }
}
