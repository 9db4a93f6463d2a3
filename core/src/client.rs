//! Stateless HTTP request builder and response parser for the VNDB API.
//!
//! # Design
//! `VndbClient` holds only the base URL and the optional API token. Each
//! endpoint is split into a `build_*` method that produces an `HttpRequest`
//! and a `parse_*` method that consumes an `HttpResponse`. The caller
//! executes the actual HTTP round-trip, which keeps this layer
//! deterministic. [`Client`](crate::transport::Client) wires the two halves
//! to a [`Transport`](crate::transport::Transport) for async callers.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::query::Query;
use crate::types::{AuthInfo, Page, Stats, User, UserEntry};

/// Synchronous, stateless client for the VNDB HTTP API.
#[derive(Debug, Clone)]
pub struct VndbClient {
    base_url: String,
    token: Option<String>,
    debug: bool,
}

impl VndbClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            debug: config.debug,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_query(&self, query: &Query) -> Result<HttpRequest, ApiError> {
        let body = query.serialize()?;
        // serialize() has already checked the route.
        let route = query.route().unwrap_or_default();
        if self.debug {
            log::trace!("POST /{route} {body}");
        }
        let mut headers = vec![("content-type".to_string(), "application/json".to_string())];
        headers.extend(self.auth_header());
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: format!("{}/{route}", self.base_url),
            headers,
            body: Some(body),
        })
    }

    pub fn build_schema(&self) -> HttpRequest {
        self.get("schema")
    }

    pub fn build_stats(&self) -> HttpRequest {
        self.get("stats")
    }

    /// Fails before any I/O when no token is configured.
    pub fn build_auth_info(&self) -> Result<HttpRequest, ApiError> {
        if self.token.is_none() {
            return Err(ApiError::MissingToken);
        }
        Ok(self.get("authinfo"))
    }

    /// Look up users by name or id. `fields` adds optional columns such as
    /// `lengthvotes`.
    pub fn build_user<N: AsRef<str>, F: AsRef<str>>(&self, names: &[N], fields: &[F]) -> HttpRequest {
        let mut params: Vec<String> = names
            .iter()
            .map(|name| format!("q={}", urlencoding::encode(name.as_ref())))
            .collect();
        if !fields.is_empty() {
            let joined = fields.iter().map(|f| f.as_ref().trim()).collect::<Vec<_>>().join(",");
            params.push(format!("fields={}", urlencoding::encode(&joined)));
        }
        let mut request = self.get("user");
        if !params.is_empty() {
            request.path = format!("{}?{}", request.path, params.join("&"));
        }
        request
    }

    pub fn parse_query<M: DeserializeOwned>(&self, response: HttpResponse) -> Result<Page<M>, ApiError> {
        decode(&response)
    }

    pub fn parse_schema(&self, response: HttpResponse) -> Result<serde_json::Value, ApiError> {
        decode(&response)
    }

    pub fn parse_stats(&self, response: HttpResponse) -> Result<Stats, ApiError> {
        decode(&response)
    }

    pub fn parse_auth_info(&self, response: HttpResponse) -> Result<AuthInfo, ApiError> {
        decode(&response)
    }

    /// Results come back in the order of `names`; unknown names have
    /// `found == false`.
    pub fn parse_user<S: AsRef<str>>(&self, names: &[S], response: HttpResponse) -> Result<Vec<User>, ApiError> {
        let entries: HashMap<String, Option<UserEntry>> = decode(&response)?;
        Ok(names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                User::resolve(name, entries.get(name).cloned().flatten())
            })
            .collect())
    }

    fn get(&self, endpoint: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: format!("{}/{endpoint}", self.base_url),
            headers: self.auth_header().into_iter().collect(),
            body: None,
        }
    }

    fn auth_header(&self) -> Option<(String, String)> {
        self.token
            .as_ref()
            .map(|token| ("authorization".to_string(), format!("token {token}")))
    }
}

/// Check the status and content type, then decode the JSON body.
fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    check_status(response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

/// Success is a status in `[200, 400)` with a JSON body; everything else is
/// mapped through the status table.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if (200..400).contains(&response.status) {
        if response.is_json() {
            return Ok(());
        }
        return Err(ApiError::HttpError {
            status: response.status,
            body: response.body.clone(),
        });
    }
    log::debug!("request failed with HTTP {}", response.status);
    Err(ApiError::from_status(response.status, response.body.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Node;
    use crate::query::select;
    use serde_json::{json, Value};

    fn client() -> VndbClient {
        VndbClient::new(&ClientConfig::builder().base_url("http://localhost:3000/kana").build())
    }

    fn authed() -> VndbClient {
        VndbClient::new(
            &ClientConfig::builder()
                .base_url("http://localhost:3000/kana")
                .token("abc-123")
                .build(),
        )
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string(),
        }
    }

    #[test]
    fn build_query_produces_correct_request() {
        let query = select(["id", "title"])
            .from("vn")
            .unwrap()
            .filter(Node::new("id").eq("v2002").unwrap());
        let req = client().build_query(&query).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/kana/vn");
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.header("authorization"), None);
        let body: Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["filters"], json!(["id", "=", "v2002"]));
        assert_eq!(body["fields"], "id, title");
    }

    #[test]
    fn build_query_sends_token() {
        let query = select(["id"]).from("ulist").unwrap();
        let req = authed().build_query(&query).unwrap();
        assert_eq!(req.header("authorization"), Some("token abc-123"));
    }

    #[test]
    fn build_query_without_route_fails() {
        let err = client().build_query(&select(["id"])).unwrap_err();
        assert!(matches!(err, ApiError::Query(crate::error::QueryError::MissingRoute)));
    }

    #[test]
    fn build_auth_info_requires_token() {
        assert!(matches!(client().build_auth_info(), Err(ApiError::MissingToken)));
        let req = authed().build_auth_info().unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/kana/authinfo");
        assert_eq!(req.header("authorization"), Some("token abc-123"));
    }

    #[test]
    fn build_user_encodes_query_string() {
        let req = client().build_user(&["Azaka", "u 2"], &["lengthvotes"]);
        assert_eq!(
            req.path,
            "http://localhost:3000/kana/user?q=Azaka&q=u%202&fields=lengthvotes"
        );
        assert!(req.body.is_none());
    }

    #[test]
    fn build_schema_and_stats() {
        assert_eq!(client().build_schema().path, "http://localhost:3000/kana/schema");
        assert_eq!(client().build_stats().path, "http://localhost:3000/kana/stats");
    }

    #[test]
    fn parse_query_success() {
        let page: Page<Value> = client()
            .parse_query(json_response(
                200,
                r#"{"results":[{"id":"v17","title":"Ever17"}],"more":true,"count":3}"#,
            ))
            .unwrap();
        assert!(page.more);
        assert_eq!(page.count, Some(3));
        assert_eq!(page.results[0]["title"], "Ever17");
    }

    #[test]
    fn parse_query_maps_status_codes() {
        let c = client();
        let err = c.parse_query::<Value>(json_response(400, "Invalid filter")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref body) if body == "Invalid filter"));
        let err = c.parse_query::<Value>(json_response(429, "slow down")).unwrap_err();
        assert!(matches!(err, ApiError::Throttled(_)));
        let err = c.parse_query::<Value>(json_response(503, "maintenance")).unwrap_err();
        assert!(matches!(err, ApiError::HttpError { status: 503, .. }));
    }

    #[test]
    fn parse_requires_json_content_type() {
        let response = HttpResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: "<html></html>".to_string(),
        };
        let err = client().parse_stats(response).unwrap_err();
        assert!(matches!(err, ApiError::HttpError { status: 200, .. }));
    }

    #[test]
    fn parse_bad_json() {
        let err = client().parse_stats(json_response(200, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[test]
    fn parse_user_keeps_request_order() {
        let body = r#"{"nobody":null,"Azaka":{"id":"u1","username":"azaka","lengthvotes":4}}"#;
        let users = client()
            .parse_user(&["Azaka", "nobody"], json_response(200, body))
            .unwrap();
        assert_eq!(users.len(), 2);
        assert!(users[0].found);
        assert_eq!(users[0].id.as_deref(), Some("u1"));
        assert_eq!(users[0].lengthvotes, Some(4));
        assert!(!users[1].found);
        assert_eq!(users[1].search_term, "nobody");
    }

    #[test]
    fn parse_user_repeats_duplicate_names() {
        let body = r#"{"Azaka":{"id":"u1","username":"azaka"}}"#;
        let users = client()
            .parse_user(&["Azaka", "Azaka"], json_response(200, body))
            .unwrap();
        assert!(users.iter().all(|user| user.found));
        assert_eq!(users[1].id.as_deref(), Some("u1"));
    }

    #[test]
    fn parse_auth_info_invalid_token() {
        let err = authed()
            .parse_auth_info(json_response(401, "Invalid token"))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidAuthToken(_)));
    }
}
