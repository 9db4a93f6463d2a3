//! The legacy TCP line protocol.
//!
//! # Design
//! Commands and responses are text frames terminated by `0x04`. The pieces
//! are layered so that only [`Connector`] does I/O:
//!
//! - [`command`] encodes commands, including `get` built from a [`Query`](crate::query::Query);
//! - [`response`] decodes response frames into a typed envelope;
//! - [`session`] holds the connection state machine and frame splitting;
//! - [`connector`] runs the socket on a tokio task.

pub mod command;
pub mod connector;
pub mod response;
pub mod session;

pub use command::{Command, Flag, GetOptions, Login, TERMINATOR};
pub use connector::{Connector, ErrorHook, LineSource};
pub use response::{Response, ResponseBody, ResponseType};
pub use session::{FrameDecoder, Session, SessionState};
