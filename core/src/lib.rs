//! Client core for the VNDB API.
//!
//! # Overview
//! Builds filter expressions and queries against a fixed schema, then sends
//! them either over the HTTP API or over the legacy TCP line protocol.
//!
//! ```
//! use vndb_core::{select, Entity};
//!
//! let id = Entity::Vn.field("id").unwrap();
//! let search = Entity::Vn.field("search").unwrap();
//! let query = select(["id", "title"])
//!     .from("vn")
//!     .unwrap()
//!     .filter(id.ge(17).unwrap() & search.matches("ever").unwrap());
//! assert!(query.serialize().unwrap().contains(r#""filters":["and""#));
//! ```
//!
//! # Design
//! - Filters and queries are plain values. Combining expressions or setting
//!   query options never mutates an existing value the caller still holds.
//! - `VndbClient` is stateless and follows the host-does-IO pattern: each
//!   endpoint is a `build_*` method that produces an `HttpRequest` and a
//!   `parse_*` method that consumes an `HttpResponse`.
//! - [`Client`] drives those halves through a host [`Transport`], and
//!   [`Paginator`] walks pages from any [`PageSource`].
//! - The line protocol lives in [`line`]; only its `Connector` owns a socket.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod condition;
pub mod config;
pub mod error;
pub mod http;
pub mod line;
pub mod paginator;
pub mod query;
pub mod schema;
pub mod transport;
pub mod types;

pub use client::VndbClient;
pub use condition::{BoolOp, Expression, Field, Node, Operator, OperatorSet};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ApiError, CommandError, ConditionError, QueryError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use paginator::{PageSource, Paginator};
pub use query::{select, Filter, Query};
pub use schema::Entity;
pub use transport::{Client, Transport};
pub use types::{AuthInfo, DbStats, Page, Stats, User};
