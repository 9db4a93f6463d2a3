//! Client configuration.
//!
//! Everything a client needs is passed in explicitly through
//! [`ClientConfig`]; nothing is read from the environment.
//!
//! ```rust
//! use std::time::Duration;
//! use vndb_core::ClientConfig;
//!
//! let config = ClientConfig::builder()
//!     .token("my-api-token")
//!     .connect_timeout(Duration::from_secs(2))
//!     .build();
//! assert_eq!(config.base_url, "https://api.vndb.org/kana");
//! ```

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.vndb.org/kana";
pub const DEFAULT_HOST: &str = "api.vndb.org";
/// Plain-text line-protocol port. TLS (19535) is wrapped by the caller.
pub const DEFAULT_PORT: u16 = 19534;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root of the HTTP API, without trailing slash.
    pub base_url: String,
    /// API token sent as `Authorization: token <token>`.
    pub token: Option<String>,
    /// Line-protocol host.
    pub host: String,
    /// Line-protocol port.
    pub port: u16,
    /// Upper bound on establishing the line-protocol connection.
    pub connect_timeout: Duration,
    /// Sent as `client` in the line-protocol login.
    pub client_name: String,
    /// Sent as `clientver` in the line-protocol login.
    pub client_version: String,
    /// Page size applied by paginators when none is given.
    pub page_size: u32,
    /// Log full wire payloads at trace level.
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            page_size: crate::query::DEFAULT_PAGE_SIZE,
            debug: false,
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// `host:port` for the line protocol.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.config.token = Some(token.to_string());
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.config.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn client(mut self, name: &str, version: &str) -> Self {
        self.config.client_name = name.to_string();
        self.config.client_version = version.to_string();
        self
    }

    /// Zero is ignored.
    pub fn page_size(mut self, page_size: u32) -> Self {
        if page_size > 0 {
            self.config.page_size = page_size;
        }
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
