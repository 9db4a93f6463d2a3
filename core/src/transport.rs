//! Async client on top of a host-provided HTTP transport.
//!
//! # Design
//! The library never opens HTTP connections itself. A host implements
//! [`Transport`] with whatever HTTP stack it already uses, and [`Client`]
//! pairs it with the stateless [`VndbClient`] to expose one async method per
//! endpoint. The transport is expected to handle its own connection pooling;
//! concurrent calls on one `Client` share nothing else.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::client::VndbClient;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::paginator::{PageSource, Paginator};
use crate::query::Query;
use crate::types::{AuthInfo, Page, Stats, User};

/// Executes one HTTP round-trip.
///
/// Implementations must return non-2xx responses as `Ok` data so the client
/// can map status codes; only failures to get any response are `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

pub struct Client<T> {
    core: VndbClient,
    transport: T,
    page_size: u32,
}

impl<T: Transport> Client<T> {
    pub fn new(config: &ClientConfig, transport: T) -> Self {
        Self {
            core: VndbClient::new(config),
            transport,
            page_size: config.page_size,
        }
    }

    pub fn core(&self) -> &VndbClient {
        &self.core
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run a query and decode one page of rows.
    pub async fn query<M: DeserializeOwned>(&self, query: &Query) -> Result<Page<M>, ApiError> {
        let request = self.core.build_query(query)?;
        log::debug!("POST {}", request.path);
        let response = self.transport.execute(request).await?;
        self.core.parse_query(response)
    }

    pub async fn schema(&self) -> Result<serde_json::Value, ApiError> {
        let response = self.transport.execute(self.core.build_schema()).await?;
        self.core.parse_schema(response)
    }

    pub async fn stats(&self) -> Result<Stats, ApiError> {
        let response = self.transport.execute(self.core.build_stats()).await?;
        self.core.parse_stats(response)
    }

    pub async fn auth_info(&self) -> Result<AuthInfo, ApiError> {
        let request = self.core.build_auth_info()?;
        let response = self.transport.execute(request).await?;
        self.core.parse_auth_info(response)
    }

    pub async fn users<N, F>(&self, names: &[N], fields: &[F]) -> Result<Vec<User>, ApiError>
    where
        N: AsRef<str> + Sync,
        F: AsRef<str> + Sync,
    {
        let response = self.transport.execute(self.core.build_user(names, fields)).await?;
        self.core.parse_user(names, response)
    }

    /// Paginate `query` using the configured page size.
    pub fn paginate<M>(&self, query: &Query) -> Result<Paginator<'_, Self, M>, ApiError>
    where
        M: DeserializeOwned + Clone + Send,
    {
        Paginator::new(self, query, self.page_size)
    }
}

#[async_trait]
impl<T: Transport> PageSource for Client<T> {
    async fn fetch_page<M>(&self, query: &Query) -> Result<Page<M>, ApiError>
    where
        M: DeserializeOwned + Send,
    {
        self.query(query).await
    }
}
