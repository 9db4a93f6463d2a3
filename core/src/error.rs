//! Error types for the VNDB client.
//!
//! # Design
//! Errors fall into three groups that callers handle differently:
//!
//! - construction errors ([`ConditionError`], [`QueryError`], missing
//!   credentials) are raised synchronously by builders and never reach the
//!   network;
//! - protocol errors come back from the server, either as a typed
//!   [`CommandError`] on the line protocol or as a mapped HTTP status;
//! - transport errors mean the session itself failed, not one command.
//!
//! `InvalidResponseType` and `CommandError::Unrecognized` get their own
//! identities because they signal a client/server version mismatch.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::condition::Operator;

/// Errors raised while building a filter expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("field '{field}' doesn't support the '{op}' operation")]
    OperationNotSupported { field: String, op: Operator },

    #[error("entity '{entity}' has no filterable field '{field}'")]
    UnknownField { entity: String, field: String },
}

/// Errors raised by the query builder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("query has no route; call `from` before serializing")]
    MissingRoute,

    #[error("unknown route '{0}'")]
    UnknownRoute(String),

    #[error("'fields' cannot be empty")]
    EmptyFields,

    #[error("page must be at least 1")]
    InvalidPage,

    #[error("page size must be positive")]
    InvalidPageSize,

    #[error("line-protocol get commands require a filter")]
    MissingFilter,

    #[error("could not serialize the request body: {0}")]
    Serialization(String),
}

/// A typed error reported by the line-protocol server.
///
/// Decoded from the JSON payload of an `error` response, keyed by its `id`.
#[derive(Debug, Clone, PartialEq, Error, Deserialize)]
#[serde(tag = "id", rename_all = "lowercase")]
pub enum CommandError {
    #[error("syntax error: {msg}")]
    Parse { msg: String },

    #[error("missing field '{field}': {msg}")]
    Missing { msg: String, field: String },

    #[error("bad value for field '{field}': {msg}")]
    #[serde(rename = "badarg")]
    BadArg { msg: String, field: String },

    #[error("login required: {msg}")]
    #[serde(rename = "needlogin")]
    NeedLogin { msg: String },

    #[error("throttled ({kind}): {msg}")]
    Throttled {
        msg: String,
        #[serde(rename = "type", default)]
        kind: String,
        minwait: f64,
        fullwait: f64,
    },

    #[error("authorization failed: {msg}")]
    Auth { msg: String },

    #[error("already logged in: {msg}")]
    #[serde(rename = "loggedin")]
    LoggedIn { msg: String },

    #[error("unknown get type: {msg}")]
    #[serde(rename = "gettype")]
    GetType { msg: String },

    #[error("unknown info flag '{flag}': {msg}")]
    #[serde(rename = "getinfo")]
    GetInfo { msg: String, flag: String },

    #[error("invalid filter ({field} {op} {value}): {msg}")]
    Filter {
        msg: String,
        field: String,
        op: String,
        value: serde_json::Value,
    },

    #[error("unknown set type: {msg}")]
    #[serde(rename = "settype")]
    SetType { msg: String },

    /// The server sent an error id this client does not know.
    #[error("unrecognized error '{code}': {payload}")]
    #[serde(skip)]
    Unrecognized { code: String, payload: serde_json::Value },
}

impl CommandError {
    /// Decode an `error` payload. Unknown or malformed payloads fall back to
    /// `Unrecognized` instead of failing.
    pub fn from_payload(payload: serde_json::Value) -> Self {
        match serde_json::from_value::<CommandError>(payload.clone()) {
            Ok(err) => err,
            Err(_) => {
                let code = payload
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                CommandError::Unrecognized { code, payload }
            }
        }
    }

    /// The server's error id, e.g. `filter` or `throttled`.
    pub fn id(&self) -> &str {
        match self {
            CommandError::Parse { .. } => "parse",
            CommandError::Missing { .. } => "missing",
            CommandError::BadArg { .. } => "badarg",
            CommandError::NeedLogin { .. } => "needlogin",
            CommandError::Throttled { .. } => "throttled",
            CommandError::Auth { .. } => "auth",
            CommandError::LoggedIn { .. } => "loggedin",
            CommandError::GetType { .. } => "gettype",
            CommandError::GetInfo { .. } => "getinfo",
            CommandError::Filter { .. } => "filter",
            CommandError::SetType { .. } => "settype",
            CommandError::Unrecognized { code, .. } => code,
        }
    }

    /// Minimum and full backoff for a throttled command.
    pub fn retry_after(&self) -> Option<(Duration, Duration)> {
        match self {
            CommandError::Throttled { minwait, fullwait, .. } => Some((wait(*minwait), wait(*fullwait))),
            _ => None,
        }
    }
}

/// Server-supplied seconds as a `Duration`; negative or NaN is zero and
/// anything too large saturates.
fn wait(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

/// Every error returned by the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("this endpoint requires an API token")]
    MissingToken,

    #[error("a password or session token is required when a username is set")]
    MissingCredentials,

    #[error("invalid session transition: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Command(#[from] CommandError),

    /// The server replied with a status token outside the closed set.
    #[error("unrecognized response type '{0}'")]
    InvalidResponseType(String),

    /// A known response type, but not the one the command answers with.
    #[error("expected a '{expected}' response, got '{found}'")]
    UnexpectedResponse { expected: String, found: String },

    #[error("invalid request body: {0}")]
    BadRequest(String),

    #[error("invalid auth token: {0}")]
    InvalidAuthToken(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error("server down: {0}")]
    ServerDown(String),

    /// A status code with no dedicated variant.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    #[error("serialization failed: {0}")]
    SerializationError(String),

    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    #[error("connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("transport not available")]
    TransportUnavailable,

    #[error("connection lost")]
    ConnectionLost,

    #[error("transport failed: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// True when the session failed rather than a single command.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ApiError::ConnectTimeout(_)
                | ApiError::TransportUnavailable
                | ApiError::ConnectionLost
                | ApiError::Transport(_)
                | ApiError::Io(_)
        )
    }

    /// True when the server spoke a protocol this client doesn't understand.
    pub fn is_protocol_mismatch(&self) -> bool {
        matches!(
            self,
            ApiError::InvalidResponseType(_)
                | ApiError::UnexpectedResponse { .. }
                | ApiError::Command(CommandError::Unrecognized { .. })
        )
    }

    /// Map a non-success HTTP status to its error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 => ApiError::BadRequest(body),
            401 => ApiError::InvalidAuthToken(body),
            404 => ApiError::NotFound(body),
            429 => ApiError::Throttled(body),
            500 => ApiError::ServerError(body),
            502 => ApiError::ServerDown(body),
            _ => ApiError::HttpError { status, body },
        }
    }
}
