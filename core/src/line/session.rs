//! Session state and framing, with no I/O.
//!
//! # Design
//! [`Session`] tracks the connection lifecycle and the queue of requests
//! awaiting a reply. The line protocol carries no request ids: the server
//! answers commands in the order it received them, so the oldest pending
//! request owns the next response. Nothing on the wire checks that
//! assumption.
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Ready -> Closing -> Closed
//! ```
//!
//! Any state may jump to `Closing` or `Closed`; every other transition is
//! checked and fails with [`ApiError::InvalidState`].

use std::collections::VecDeque;
use std::fmt;

use crate::error::ApiError;

use super::command::TERMINATOR;
use super::response::{Response, ResponseType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Lifecycle plus FIFO of pending requests of type `P`.
#[derive(Debug)]
pub struct Session<P> {
    state: SessionState,
    pending: VecDeque<P>,
    session_token: Option<String>,
}

impl<P> Default for Session<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Session<P> {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            pending: VecDeque::new(),
            session_token: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Token from a `session` reply to login, if one was requested.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn begin_connect(&mut self) -> Result<(), ApiError> {
        self.transition(SessionState::Disconnected, SessionState::Connecting)
    }

    pub fn connected(&mut self) -> Result<(), ApiError> {
        self.transition(SessionState::Connecting, SessionState::Authenticating)
    }

    /// Handle the reply to `login`. An `error` reply closes the session.
    pub fn on_login_reply(&mut self, response: Response) -> Result<(), ApiError> {
        if self.state != SessionState::Authenticating {
            return Err(self.illegal(SessionState::Ready));
        }
        match response.kind {
            ResponseType::Ok => {}
            ResponseType::Session => {
                self.session_token = response.text().map(str::to_string);
            }
            ResponseType::Error => {
                self.state = SessionState::Closed;
                return response.into_result().map(|_| ());
            }
            other => {
                self.state = SessionState::Closed;
                return Err(ApiError::UnexpectedResponse {
                    expected: ResponseType::Ok.to_string(),
                    found: other.to_string(),
                });
            }
        }
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Register a request that was just written.
    pub fn enqueue(&mut self, pending: P) -> Result<(), ApiError> {
        if self.state != SessionState::Ready {
            return Err(ApiError::TransportUnavailable);
        }
        self.pending.push_back(pending);
        Ok(())
    }

    /// The request owning the response that just arrived.
    pub fn complete(&mut self) -> Option<P> {
        self.pending.pop_front()
    }

    pub fn begin_close(&mut self) {
        if self.state != SessionState::Closed {
            self.state = SessionState::Closing;
        }
    }

    /// Mark the session closed and hand back every unanswered request.
    pub fn closed(&mut self) -> Vec<P> {
        self.state = SessionState::Closed;
        self.pending.drain(..).collect()
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), ApiError> {
        if self.state != from {
            return Err(self.illegal(to));
        }
        self.state = to;
        Ok(())
    }

    fn illegal(&self, to: SessionState) -> ApiError {
        ApiError::InvalidState(format!("{} -> {to}", self.state))
    }
}

/// Splits a byte stream into terminator-delimited frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every completed frame without its terminator.
    /// A partial trailing frame stays buffered.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some(end) = self.buf.iter().position(|&b| b == TERMINATOR) {
            let mut frame: Vec<u8> = self.buf.drain(..=end).collect();
            frame.pop();
            frames.push(frame);
        }
        frames
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
