//! Response DTOs.
//!
//! # Design
//! Entity rows are left generic: callers pick `serde_json::Value` or their
//! own `Deserialize` struct for `M`. Only the fixed-shape responses (stats,
//! auth info, user lookup) get concrete types here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<M> {
    pub results: Vec<M>,
    #[serde(default)]
    pub more: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compact_filters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_filters: Option<Value>,
}

impl<M> Page<M> {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Database statistics from `GET /stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub chars: u64,
    pub producers: u64,
    pub releases: u64,
    pub staff: u64,
    pub tags: u64,
    pub traits: u64,
    pub vn: u64,
}

/// Token details from `GET /authinfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Wire shape of one entry in a `GET /user` response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserEntry {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub lengthvotes: Option<u64>,
    #[serde(default)]
    pub lengthvotes_sum: Option<u64>,
}

/// Result of looking up one name in `GET /user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub found: bool,
    pub search_term: String,
    pub id: Option<String>,
    pub username: Option<String>,
    pub lengthvotes: Option<u64>,
    pub lengthvotes_sum: Option<u64>,
}

impl User {
    pub(crate) fn resolve(search_term: &str, entry: Option<UserEntry>) -> Self {
        match entry {
            Some(entry) => User {
                found: true,
                search_term: search_term.to_string(),
                id: Some(entry.id),
                username: Some(entry.username),
                lengthvotes: entry.lengthvotes,
                lengthvotes_sum: entry.lengthvotes_sum,
            },
            None => User {
                found: false,
                search_term: search_term.to_string(),
                id: None,
                username: None,
                lengthvotes: None,
                lengthvotes_sum: None,
            },
        }
    }
}

/// Database statistics from the line-protocol `dbstats` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbStats {
    pub users: u64,
    pub threads: u64,
    pub tags: u64,
    pub releases: u64,
    pub producers: u64,
    pub chars: u64,
    pub posts: u64,
    pub vn: u64,
    pub traits: u64,
}
