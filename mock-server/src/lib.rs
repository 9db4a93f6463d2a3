//! In-memory stand-in for the VNDB HTTP API and line protocol.
//!
//! Serves a small fixed catalogue of visual novels under `/kana`, enough to
//! exercise filtering, sorting, paging and the fixed-shape endpoints.

use std::cmp::Ordering;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;

pub mod line;

pub use line::run_line;

/// Token accepted by `/kana/authinfo`.
pub const TEST_TOKEN: &str = "test-token";

const ROUTES: &[&str] = &[
    "vn", "release", "producer", "character", "staff", "tag", "trait", "quote", "ulist",
];
const MAX_RESULTS: usize = 100;

pub struct AppState {
    pub vns: Vec<Value>,
    pub token: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            vns: catalogue(),
            token: TEST_TOKEN.to_string(),
        }
    }
}

pub type Db = Arc<AppState>;

/// The rows served for `POST /kana/vn`.
pub fn catalogue() -> Vec<Value> {
    [
        ("v4", "Clannad", "2004-04-28", 8.4),
        ("v7", "Tsukihime", "2000-12-29", 8.0),
        ("v11", "Fate/stay night", "2004-01-30", 8.3),
        ("v17", "Ever17 -the out of infinity-", "2002-08-29", 8.7),
        ("v2002", "Saya no Uta", "2003-12-26", 8.1),
    ]
    .into_iter()
    .map(|(id, title, released, rating)| {
        json!({"id": id, "title": title, "released": released, "rating": rating})
    })
    .collect()
}

pub fn app() -> Router {
    Router::new()
        .route("/kana/stats", get(stats))
        .route("/kana/schema", get(schema))
        .route("/kana/authinfo", get(auth_info))
        .route("/kana/user", get(user))
        .route("/kana/{route}", post(query))
        .with_state(Arc::new(AppState::default()))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    #[serde(default)]
    pub filters: Value,
    #[serde(default = "default_fields")]
    pub fields: String,
    #[serde(default = "default_sort")]
    pub sort: String,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default = "default_results")]
    pub results: usize,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default)]
    pub count: bool,
    #[serde(default)]
    pub compact_filters: bool,
    #[serde(default)]
    pub normalized_filters: bool,
}

fn default_fields() -> String {
    "id".to_string()
}

fn default_sort() -> String {
    "id".to_string()
}

fn default_results() -> usize {
    10
}

fn default_page() -> usize {
    1
}

fn bad_request(msg: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, msg.into()).into_response()
}

async fn query(State(db): State<Db>, Path(route): Path<String>, body: Bytes) -> Response {
    if !ROUTES.contains(&route.as_str()) {
        return (StatusCode::NOT_FOUND, format!("Unknown endpoint '{route}'")).into_response();
    }
    let body: QueryBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => return bad_request(format!("Invalid request body: {e}")),
    };
    log::debug!("POST /kana/{route} page={} results={}", body.page, body.results);
    if body.page == 0 || body.results == 0 || body.results > MAX_RESULTS {
        return bad_request("Invalid page or results");
    }
    let rows: &[Value] = if route == "vn" { &db.vns } else { &[] };

    let mut hits = Vec::new();
    for row in rows {
        match matches(row, &body.filters) {
            Ok(true) => hits.push(row),
            Ok(false) => {}
            Err(msg) => return bad_request(msg),
        }
    }
    if !["id", "title", "released", "rating"].contains(&body.sort.as_str()) {
        return bad_request(format!("Invalid sort field '{}'", body.sort));
    }
    hits.sort_by(|a, b| compare_by(a, b, &body.sort));
    if body.reverse {
        hits.reverse();
    }

    let total = hits.len();
    let start = (body.page - 1) * body.results;
    let fields: Vec<&str> = body.fields.split(',').map(str::trim).filter(|f| !f.is_empty()).collect();
    let results: Vec<Value> = hits
        .into_iter()
        .skip(start)
        .take(body.results)
        .map(|row| project(row, &fields))
        .collect();

    let mut out = Map::new();
    out.insert("results".into(), Value::Array(results));
    out.insert("more".into(), Value::Bool(total > start + body.results));
    if body.count {
        out.insert("count".into(), json!(total));
    }
    if body.compact_filters {
        out.insert("compact_filters".into(), Value::String(body.filters.to_string()));
    }
    if body.normalized_filters {
        out.insert("normalized_filters".into(), body.filters.clone());
    }
    Json(Value::Object(out)).into_response()
}

/// Evaluate a JSON filter (`[]`, `[field, op, value]` or `["and"|"or", ...]`).
pub fn matches(row: &Value, filter: &Value) -> Result<bool, String> {
    let items = match filter {
        Value::Null => return Ok(true),
        Value::Array(items) if items.is_empty() => return Ok(true),
        Value::Array(items) => items,
        other => return Err(format!("Invalid filter: {other}")),
    };
    match items[0].as_str() {
        Some("and") => {
            for child in &items[1..] {
                if !matches(row, child)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Some("or") => {
            for child in &items[1..] {
                if matches(row, child)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Some(field) if items.len() == 3 => {
            let op = items[1].as_str().ok_or("Invalid operator")?;
            predicate(row, field, op, &items[2])
        }
        _ => Err(format!("Invalid filter: {filter}")),
    }
}

fn predicate(row: &Value, field: &str, op: &str, value: &Value) -> Result<bool, String> {
    if let Value::Array(options) = value {
        if op != "=" {
            return Err(format!("Operator '{op}' does not take a list"));
        }
        for option in options {
            if predicate(row, field, op, option)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }
    match field {
        "id" => {
            let lhs = numeric_id(&row["id"]).ok_or("Row without id")?;
            let rhs = numeric_id(value).ok_or_else(|| format!("Invalid id '{value}'"))?;
            relational(op, lhs.cmp(&rhs))
        }
        "search" | "title" => {
            let title = row["title"].as_str().unwrap_or_default().to_lowercase();
            let needle = value.as_str().ok_or("Expected a string")?.trim_matches('*').to_lowercase();
            match op {
                "=" if field == "title" => Ok(title == needle),
                "=" | "~" => Ok(title.contains(&needle)),
                "!=" => Ok(!title.contains(&needle)),
                _ => Err(format!("Operator '{op}' not supported on {field}")),
            }
        }
        "released" => {
            let lhs = row["released"].as_str().unwrap_or_default();
            let rhs = value.as_str().ok_or("Expected a date")?;
            relational(op, lhs.cmp(rhs))
        }
        _ => Err(format!("Unknown filter field '{field}'")),
    }
}

fn relational(op: &str, ord: Ordering) -> Result<bool, String> {
    Ok(match op {
        "=" => ord == Ordering::Equal,
        "!=" => ord != Ordering::Equal,
        ">" => ord == Ordering::Greater,
        ">=" => ord != Ordering::Less,
        "<" => ord == Ordering::Less,
        "<=" => ord != Ordering::Greater,
        _ => return Err(format!("Invalid operator '{op}'")),
    })
}

/// `"v17"`, `"17"` and `17` all name the same id.
fn numeric_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim_start_matches(|c: char| c.is_ascii_alphabetic()).parse().ok(),
        _ => None,
    }
}

fn compare_by(a: &Value, b: &Value, key: &str) -> Ordering {
    match key {
        "id" => numeric_id(&a["id"]).cmp(&numeric_id(&b["id"])),
        "rating" => a["rating"]
            .as_f64()
            .partial_cmp(&b["rating"].as_f64())
            .unwrap_or(Ordering::Equal),
        _ => a[key].as_str().cmp(&b[key].as_str()),
    }
}

/// Keep `id` plus the requested fields.
fn project(row: &Value, fields: &[&str]) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), row["id"].clone());
    for field in fields {
        if let Some(value) = row.get(*field) {
            out.insert((*field).to_string(), value.clone());
        }
    }
    Value::Object(out)
}

async fn stats() -> Json<Value> {
    Json(json!({
        "chars": 112347,
        "producers": 14823,
        "releases": 91234,
        "staff": 27456,
        "tags": 2712,
        "traits": 3104,
        "vn": 42187
    }))
}

async fn schema() -> Json<Value> {
    Json(json!({
        "enums": {"language": [{"id": "en", "label": "English"}, {"id": "ja", "label": "Japanese"}]},
        "api_fields": {"/vn": {"id": null, "title": null, "released": null, "rating": null}},
        "extlinks": {}
    }))
}

async fn auth_info(State(db): State<Db>, headers: HeaderMap) -> Response {
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("token "));
    if presented != Some(db.token.as_str()) {
        return (StatusCode::UNAUTHORIZED, "Invalid token").into_response();
    }
    Json(json!({"id": "u1", "username": "azaka", "permissions": ["listread"]})).into_response()
}

async fn user(RawQuery(raw): RawQuery) -> Json<Value> {
    let mut names = Vec::new();
    let mut with_votes = false;
    for pair in raw.as_deref().unwrap_or_default().split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(value).map(|v| v.into_owned()).unwrap_or_default();
        match key {
            "q" => names.push(value),
            "fields" => with_votes = value.split(',').any(|f| f.trim() == "lengthvotes"),
            _ => {}
        }
    }
    let mut out = Map::new();
    for name in names {
        let entry = if name.eq_ignore_ascii_case("azaka") || name == "u1" {
            let mut entry = json!({"id": "u1", "username": "azaka"});
            if with_votes {
                entry["lengthvotes"] = json!(4);
            }
            entry
        } else {
            Value::Null
        };
        out.insert(name, entry);
    }
    Json(Value::Object(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, title: &str) -> Value {
        json!({"id": id, "title": title, "released": "2002-08-29", "rating": 8.7})
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(matches(&row("v1", "a"), &json!([])), Ok(true));
        assert_eq!(matches(&row("v1", "a"), &Value::Null), Ok(true));
    }

    #[test]
    fn id_comparisons_ignore_prefix() {
        let r = row("v17", "Ever17");
        assert_eq!(matches(&r, &json!(["id", "=", "v17"])), Ok(true));
        assert_eq!(matches(&r, &json!(["id", ">=", 17])), Ok(true));
        assert_eq!(matches(&r, &json!(["id", "<", 10])), Ok(false));
        assert_eq!(matches(&r, &json!(["id", "=", [1, 17]])), Ok(true));
    }

    #[test]
    fn boolean_nesting() {
        let r = row("v17", "Ever17");
        let filter = json!(["or", ["id", "=", 1], ["and", ["id", ">", 2], ["search", "~", "ever"]]]);
        assert_eq!(matches(&r, &filter), Ok(true));
    }

    #[test]
    fn unknown_field_is_an_error() {
        assert!(matches(&row("v1", "a"), &json!(["colour", "=", "red"])).is_err());
        assert!(matches(&row("v1", "a"), &json!("id")).is_err());
    }

    #[test]
    fn projection_keeps_id() {
        let out = project(&row("v1", "a"), &["title", "missing"]);
        assert_eq!(out, json!({"id": "v1", "title": "a"}));
    }
}
