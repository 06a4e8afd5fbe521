use axum::{
    body::Body,
    extract::Extension,
    http::{Request, StatusCode},
    routing::get,
    Router,
};
use session_backend::middleware::request_id::{request_id, RequestId};
use tower::ServiceExt;
use uuid::Uuid;

fn echo_router() -> Router {
    Router::new()
        .route(
            "/echo",
            get(|Extension(RequestId(id)): Extension<RequestId>| async move { id }),
        )
        .layer(axum::middleware::from_fn(request_id))
}

async fn call(headers: &[(&str, &str)]) -> (StatusCode, String, String) {
    let mut builder = Request::builder().uri("/echo");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = echo_router()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let header = response
        .headers()
        .get("x-request-id")
        .expect("x-request-id header")
        .to_str()
        .unwrap()
        .to_string();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, header, String::from_utf8(bytes.to_vec()).unwrap())
}

#[tokio::test]
async fn mints_uuid_when_absent() {
    let (status, header, body) = call(&[]).await;
    assert_eq!(status, StatusCode::OK);
    assert!(Uuid::parse_str(&header).is_ok());
    assert_eq!(header, body);
}

#[tokio::test]
async fn keeps_client_request_id() {
    let (_, header, body) = call(&[("x-request-id", "client-req-123")]).await;
    assert_eq!(header, "client-req-123");
    assert_eq!(body, "client-req-123");
}

#[tokio::test]
async fn falls_back_to_correlation_id() {
    let (_, header, _) = call(&[("x-correlation-id", "corr-req-456")]).await;
    assert_eq!(header, "corr-req-456");
}

#[tokio::test]
async fn replaces_oversized_ids() {
    let oversized = "r".repeat(200);
    let (_, header, _) = call(&[("x-request-id", oversized.as_str())]).await;
    assert_ne!(header, oversized);
    assert!(Uuid::parse_str(&header).is_ok());
}
