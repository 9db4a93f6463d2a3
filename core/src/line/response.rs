//! Line-protocol responses.
//!
//! A response frame is `<type>` or `<type> <payload>`. The type is one of a
//! closed set; anything else is a client/server mismatch and surfaces as
//! [`ApiError::InvalidResponseType`]. Payloads are JSON, except for
//! `session`, whose payload is the raw token.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{ApiError, CommandError};
use crate::types::Page;

use super::command::TERMINATOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    Ok,
    Results,
    DbStats,
    Session,
    Error,
}

impl ResponseType {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseType::Ok => "ok",
            ResponseType::Results => "results",
            ResponseType::DbStats => "dbstats",
            ResponseType::Session => "session",
            ResponseType::Error => "error",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(ResponseType::Ok),
            "results" => Ok(ResponseType::Results),
            "dbstats" => Ok(ResponseType::DbStats),
            "session" => Ok(ResponseType::Session),
            "error" => Ok(ResponseType::Error),
            other => Err(ApiError::InvalidResponseType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// A JSON object.
    Map(Map<String, Value>),
    /// Any other payload; non-JSON text is kept as a string.
    Scalar(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub kind: ResponseType,
    pub body: Option<ResponseBody>,
}

impl Response {
    /// Decode the envelope of one frame; a trailing terminator is ignored.
    /// `error` responses are returned as data.
    pub fn decode(frame: &[u8]) -> Result<Self, ApiError> {
        let frame = frame.strip_suffix(&[TERMINATOR]).unwrap_or(frame);
        let text = std::str::from_utf8(frame)
            .map_err(|e| ApiError::DeserializationError(e.to_string()))?
            .trim();
        let (token, rest) = match text.split_once(' ') {
            Some((token, rest)) => (token, rest.trim()),
            None => (text, ""),
        };
        let kind: ResponseType = token.parse()?;
        let body = if rest.is_empty() {
            None
        } else if kind == ResponseType::Session {
            Some(ResponseBody::Scalar(Value::String(rest.to_string())))
        } else {
            Some(match serde_json::from_str::<Value>(rest) {
                Ok(Value::Object(map)) => ResponseBody::Map(map),
                Ok(value) => ResponseBody::Scalar(value),
                Err(_) => ResponseBody::Scalar(Value::String(rest.to_string())),
            })
        };
        Ok(Self { kind, body })
    }

    /// Decode a frame and turn an `error` response into a typed error.
    pub fn parse(frame: &[u8]) -> Result<Self, ApiError> {
        Self::decode(frame)?.into_result()
    }

    pub fn into_result(self) -> Result<Self, ApiError> {
        if self.kind != ResponseType::Error {
            return Ok(self);
        }
        let payload = match self.body {
            Some(ResponseBody::Map(map)) => Value::Object(map),
            Some(ResponseBody::Scalar(value)) => value,
            None => Value::Null,
        };
        Err(CommandError::from_payload(payload).into())
    }

    /// Fail unless this is a `kind` response.
    pub fn expect_kind(self, kind: ResponseType) -> Result<Self, ApiError> {
        if self.kind == kind {
            Ok(self)
        } else {
            Err(ApiError::UnexpectedResponse {
                expected: kind.to_string(),
                found: self.kind.to_string(),
            })
        }
    }

    /// Deserialize an object payload.
    pub fn payload<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let value = match self.body {
            Some(ResponseBody::Map(map)) => Value::Object(map),
            Some(ResponseBody::Scalar(value)) => value,
            None => Value::Null,
        };
        serde_json::from_value(value).map_err(|e| ApiError::DeserializationError(e.to_string()))
    }

    /// The payload as text, for `session` responses.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            Some(ResponseBody::Scalar(Value::String(s))) => Some(s),
            _ => None,
        }
    }
}

/// Payload of a `results` response.
#[derive(Debug, Deserialize)]
pub(crate) struct LineResults<M> {
    #[serde(default = "Vec::new")]
    items: Vec<M>,
    #[serde(default)]
    more: bool,
    #[serde(default)]
    num: Option<u64>,
}

impl<M> From<LineResults<M>> for Page<M> {
    fn from(results: LineResults<M>) -> Self {
        Page {
            results: results.items,
            more: results.more,
            count: results.num,
            compact_filters: None,
            normalized_filters: None,
        }
    }
}
