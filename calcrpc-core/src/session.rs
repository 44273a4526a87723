//! Call sessions.
//!
//! A [`CallSession`] tracks one in-flight call: its pattern, its deadline and
//! its lifecycle state. The state and the terminal status are the only data
//! shared between the flows of control that drive a call, and every mutation
//! goes through a single `watch` channel, so exactly one transition into a
//! terminal state can ever win.
//!
//! ```text
//! Active ──half_close──▶ HalfClosed
//!   │                        │
//!   └──────────┬─────────────┘
//!              ▼
//!   Completed | Failed | Cancelled      (terminal, never left again)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::Status;

/// The four interaction patterns a call can follow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallPattern {
    /// One request, one response.
    Unary,
    /// One request, many responses.
    ServerStream,
    /// Many requests, one response.
    ClientStream,
    /// Independent request and response streams.
    BidiStream,
}

impl CallPattern {
    /// Name used in logs and spans.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallPattern::Unary => "unary",
            CallPattern::ServerStream => "server_stream",
            CallPattern::ClientStream => "client_stream",
            CallPattern::BidiStream => "bidi_stream",
        }
    }
}

impl std::fmt::Display for CallPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// The caller will send no further messages.
    HalfClosed,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    /// Whether the session has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }
}

#[derive(Clone, Debug)]
struct Snapshot {
    state: SessionState,
    status: Option<Status>,
}

/// Shared handle to a session.
pub type SessionHandle = Arc<CallSession>;

/// One in-flight RPC invocation.
#[derive(Debug)]
pub struct CallSession {
    pattern: CallPattern,
    deadline: Option<Instant>,
    shared: watch::Sender<Snapshot>,
}

enum Observed {
    Cancelled(Status),
    Finished,
    Live,
}

impl CallSession {
    /// Start a session in state `Active`.
    pub fn begin(pattern: CallPattern, deadline: Option<Instant>) -> SessionHandle {
        let (shared, _) = watch::channel(Snapshot {
            state: SessionState::Active,
            status: None,
        });
        tracing::debug!(pattern = %pattern, has_deadline = deadline.is_some(), "session started");
        Arc::new(Self {
            pattern,
            deadline,
            shared,
        })
    }

    /// Start a session whose deadline is `timeout` from now.
    pub fn with_timeout(pattern: CallPattern, timeout: Option<Duration>) -> SessionHandle {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        Self::begin(pattern, deadline)
    }

    pub fn pattern(&self) -> CallPattern {
        self.pattern
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn state(&self) -> SessionState {
        self.shared.borrow().state
    }

    /// The terminal status, once the session has finished.
    pub fn status(&self) -> Option<Status> {
        self.shared.borrow().status.clone()
    }

    fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fail if the session was cancelled or its deadline has passed.
    ///
    /// Passing the deadline moves a live session to `Cancelled` with
    /// `DeadlineExceeded`; from then on every channel operation fails with it.
    pub fn check_deadline(&self) -> Result<(), Status> {
        if self.is_expired() {
            self.expire();
        }
        match self.observe() {
            Observed::Cancelled(status) => Err(status),
            Observed::Finished | Observed::Live => Ok(()),
        }
    }

    /// Record that the caller closed its sending direction.
    pub fn half_close(&self) -> bool {
        self.shared.send_if_modified(|snap| {
            if snap.state == SessionState::Active {
                snap.state = SessionState::HalfClosed;
                true
            } else {
                false
            }
        })
    }

    /// Finish the session with its final status.
    ///
    /// `Ok` leads to `Completed`, anything else to `Failed`. Returns `false`
    /// and changes nothing if the session had already finished.
    pub fn complete(&self, status: Status) -> bool {
        let to = if status.is_ok() {
            SessionState::Completed
        } else {
            SessionState::Failed
        };
        self.finish(to, status)
    }

    /// Cancel the session. Idempotent in the same way as [`complete`](Self::complete).
    pub fn cancel(&self, status: Status) -> bool {
        self.finish(SessionState::Cancelled, status)
    }

    fn expire(&self) -> bool {
        self.cancel(Status::deadline_exceeded("deadline exceeded"))
    }

    fn finish(&self, to: SessionState, status: Status) -> bool {
        let code = status.code();
        let changed = self.shared.send_if_modified(move |snap| {
            if snap.state.is_terminal() {
                return false;
            }
            snap.state = to;
            snap.status = Some(status);
            true
        });
        if changed {
            tracing::debug!(pattern = %self.pattern, state = ?to, code = %code, "session finished");
        }
        changed
    }

    fn observe(&self) -> Observed {
        observe(&self.shared.borrow())
    }

    /// Resolves when the session is cancelled or its deadline passes.
    ///
    /// Never resolves for a session that completes or fails normally. Racing
    /// this against a blocking operation makes the operation interruptible.
    pub async fn cancelled(&self) -> Status {
        let mut rx = self.shared.subscribe();
        loop {
            let observed = observe(&rx.borrow_and_update());
            match observed {
                Observed::Cancelled(status) => return status,
                Observed::Finished => return std::future::pending().await,
                Observed::Live => {}
            }

            match self.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            self.expire();
                        }
                        changed = rx.changed() => {
                            if changed.is_err() {
                                return std::future::pending().await;
                            }
                        }
                    }
                }
                None => {
                    if rx.changed().await.is_err() {
                        return std::future::pending().await;
                    }
                }
            }
        }
    }

    /// Wait for the session to finish and return its terminal status.
    pub async fn done(&self) -> Status {
        let mut rx = self.shared.subscribe();
        loop {
            let terminal = terminal_status(&rx.borrow_and_update());
            if let Some(status) = terminal {
                return status;
            }
            if rx.changed().await.is_err() {
                return Status::internal("session dropped before completion");
            }
        }
    }
}

fn observe(snap: &Snapshot) -> Observed {
    match snap.state {
        SessionState::Cancelled => Observed::Cancelled(
            snap.status
                .clone()
                .unwrap_or_else(|| Status::cancelled("call cancelled")),
        ),
        state if state.is_terminal() => Observed::Finished,
        _ => Observed::Live,
    }
}

fn terminal_status(snap: &Snapshot) -> Option<Status> {
    if snap.state.is_terminal() {
        snap.status.clone()
    } else {
        None
    }
}
