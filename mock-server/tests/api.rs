use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, TEST_TOKEN};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn query_request(route: &str, body: &Value) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri(format!("/kana/{route}"))
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

fn get_request(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn ids(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect()
}

// --- query ---

#[tokio::test]
async fn query_without_filter_returns_first_page() {
    let resp = app()
        .oneshot(query_request("vn", &json!({"fields": "id, title", "results": 2})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(ids(&body), ["v4", "v7"]);
    assert_eq!(body["more"], true);
    assert_eq!(body["results"][0]["title"], "Clannad");
}

#[tokio::test]
async fn query_applies_filters() {
    let filters = json!(["and", ["id", ">=", 10], ["search", "~", "ever"]]);
    let resp = app()
        .oneshot(query_request("vn", &json!({"filters": filters, "fields": "id"})))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(ids(&body), ["v17"]);
    assert_eq!(body["more"], false);
}

#[tokio::test]
async fn query_sorts_and_reverses() {
    let resp = app()
        .oneshot(query_request(
            "vn",
            &json!({"sort": "rating", "reverse": true, "results": 1, "count": true}),
        ))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(ids(&body), ["v17"]);
    assert_eq!(body["count"], 5);
}

#[tokio::test]
async fn query_last_page_has_no_more() {
    let resp = app()
        .oneshot(query_request("vn", &json!({"page": 3, "results": 2})))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(ids(&body), ["v2002"]);
    assert_eq!(body["more"], false);
}

#[tokio::test]
async fn query_echoes_filter_metadata() {
    let filters = json!(["id", "=", "v11"]);
    let resp = app()
        .oneshot(query_request(
            "vn",
            &json!({"filters": filters, "compact_filters": true, "normalized_filters": true}),
        ))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["normalized_filters"], filters);
    assert!(body["compact_filters"].is_string());
}

#[tokio::test]
async fn known_route_without_data_is_empty() {
    let resp = app()
        .oneshot(query_request("release", &json!({})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(ids(&body).is_empty());
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let resp = app()
        .oneshot(query_request("spaceship", &json!({})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_returns_400() {
    let req = Request::builder()
        .method("POST")
        .uri("/kana/vn")
        .header(http::header::CONTENT_TYPE, "application/json")
        .body("not json".to_string())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let bytes = body_bytes(resp).await;
    assert!(String::from_utf8_lossy(&bytes).starts_with("Invalid request body"));
}

#[tokio::test]
async fn bad_filter_returns_400() {
    let resp = app()
        .oneshot(query_request("vn", &json!({"filters": ["colour", "=", "red"]})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversized_page_returns_400() {
    let resp = app()
        .oneshot(query_request("vn", &json!({"results": 500})))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- fixed endpoints ---

#[tokio::test]
async fn stats_returns_counts() {
    let resp = app().oneshot(get_request("/kana/stats")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["vn"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn schema_lists_fields() {
    let resp = app().oneshot(get_request("/kana/schema")).await.unwrap();

    let body = body_json(resp).await;
    assert!(body["api_fields"]["/vn"].is_object());
}

#[tokio::test]
async fn authinfo_checks_token() {
    let resp = app().oneshot(get_request("/kana/authinfo")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/kana/authinfo")
        .header(http::header::AUTHORIZATION, format!("token {TEST_TOKEN}"))
        .body(String::new())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["username"], "azaka");
}

#[tokio::test]
async fn user_lookup_maps_each_name() {
    let resp = app()
        .oneshot(get_request("/kana/user?q=Azaka&q=no%20one&fields=lengthvotes"))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["Azaka"]["id"], "u1");
    assert_eq!(body["Azaka"]["lengthvotes"], 4);
    assert!(body["no one"].is_null());
}
