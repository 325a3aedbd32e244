use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use loyalty_insights::mock_api::router;
use loyalty_insights::mock_data::MockDataset;
use serde_json::Value;
use tower::ServiceExt;

async fn send(method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
        .unwrap();

    let response = router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn assert_envelope(json: &Value, dataset: MockDataset) {
    let rows = dataset.rows();
    assert_eq!(json["results"], serde_json::to_value(&rows).unwrap());
    assert_eq!(json["count"], rows.len());
    assert!(json["time"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn test_get_query_routes_on_sql_text() {
    let (status, json) = send(
        "GET",
        "/query?query=SELECT%20name%20FROM%20challenges%20WHERE%20client_id%20%3D%205252",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_envelope(&json, MockDataset::Challenges);
}

#[tokio::test]
async fn test_post_query_and_execute_query() {
    let body = r#"{"query": "SELECT * FROM points_transactions WHERE client_id = 5252"}"#;

    let (status, json) = send("POST", "/query", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_envelope(&json, MockDataset::PointsTransactions);

    let (status, json) = send("POST", "/execute-query", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_envelope(&json, MockDataset::PointsTransactions);
}

#[tokio::test]
async fn test_unrecognized_sql_serves_customers() {
    let (status, json) = send("POST", "/execute-query", Some(r#"{"query": "SELECT 1"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_envelope(&json, MockDataset::Customers);
}

#[tokio::test]
async fn test_missing_query_is_bad_request() {
    let cases = [
        ("GET", "/query", None),
        ("GET", "/query?query=%20%20", None),
        ("POST", "/query", Some("{}")),
        ("POST", "/query", None),
        ("POST", "/execute-query", Some("not json")),
        ("POST", "/execute-query", Some(r#"{"query": 42}"#)),
    ];

    for (method, uri, body) in cases {
        let (status, json) = send(method, uri, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} {} {:?}", method, uri, body);
        assert_eq!(json["error"], "query is required");
    }
}
