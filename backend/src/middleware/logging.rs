use axum::{
    body::{to_bytes, Body, Bytes, HttpBody},
    http::{header::CONTENT_LENGTH, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use super::request_id::RequestId;

const MAX_BUFFERED_BODY_BYTES: usize = 64 * 1024;
const MAX_LOGGED_BODY_BYTES: usize = 2048;
/// Hex runs this long are treated as session tokens and masked in previews.
const TOKEN_HEX_LEN: usize = 64;

/// Logs every 4xx/5xx response with a bounded, token-free body preview. The
/// body is buffered and handed back to the caller unchanged.
pub async fn log_error_responses(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let latency_ms = start.elapsed().as_millis() as u64;
    let status = status.as_u16();
    let (mut parts, body) = response.into_parts();

    // Bodies that may exceed the buffer go out untouched, without a preview.
    let fits = body
        .size_hint()
        .upper()
        .is_some_and(|len| len <= MAX_BUFFERED_BODY_BYTES as u64);
    if !fits {
        let preview = format!("<body not buffered: {} bytes>", body.size_hint().lower());
        log_failure(status, &method, &path, &request_id, latency_ms, &preview);
        return Response::from_parts(parts, body);
    }

    let (body, preview) = match to_bytes(body, MAX_BUFFERED_BODY_BYTES).await {
        Ok(bytes) => {
            let preview = preview(&bytes);
            (Body::from(bytes), preview)
        }
        Err(err) => {
            parts.headers.remove(CONTENT_LENGTH);
            (Body::empty(), format!("<unreadable body: {}>", err))
        }
    };

    log_failure(status, &method, &path, &request_id, latency_ms, &preview);
    Response::from_parts(parts, body)
}

fn log_failure(
    status: u16,
    method: &str,
    path: &str,
    request_id: &str,
    latency_ms: u64,
    preview: &str,
) {
    if status >= 500 {
        tracing::error!(status, method, path, request_id, latency_ms, body = %preview, "Request failed");
    } else {
        tracing::warn!(status, method, path, request_id, latency_ms, body = %preview, "Request rejected");
    }
}

fn preview(bytes: &Bytes) -> String {
    let text = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_LOGGED_BODY_BYTES)]);
    let mut rendered = redact_tokens(&text);
    if bytes.len() > MAX_LOGGED_BODY_BYTES {
        rendered.push_str(&format!("... (truncated, {} bytes total)", bytes.len()));
    }
    rendered
}

fn redact_tokens(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    let flush = |run: &mut String, out: &mut String| {
        if run.len() >= TOKEN_HEX_LEN {
            out.push_str("[REDACTED]");
        } else {
            out.push_str(run);
        }
        run.clear();
    };
    for c in text.chars() {
        if c.is_ascii_hexdigit() {
            run.push(c);
        } else {
            flush(&mut run, &mut out);
            out.push(c);
        }
    }
    flush(&mut run, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_token_sized_hex_runs() {
        let token = "ab".repeat(32);
        let body = format!(r#"{{"sessionToken":"{}","id":12}}"#, token);
        assert_eq!(
            redact_tokens(&body),
            r#"{"sessionToken":"[REDACTED]","id":12}"#
        );
    }

    async fn call(body: String) -> (u16, usize) {
        use axum::{http::StatusCode, routing::get, Router};
        use tower::ServiceExt;

        let app = Router::new()
            .route(
                "/fail",
                get(move || async move { (StatusCode::BAD_REQUEST, body) }),
            )
            .layer(axum::middleware::from_fn(log_error_responses));
        let response = app
            .oneshot(Request::builder().uri("/fail").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.len())
    }

    #[tokio::test]
    async fn small_error_bodies_are_returned_intact() {
        assert_eq!(call("bad input".to_string()).await, (400, 9));
    }

    #[tokio::test]
    async fn oversized_error_bodies_pass_through() {
        let len = MAX_BUFFERED_BODY_BYTES + 1024;
        assert_eq!(call("e".repeat(len)).await, (400, len));
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let bytes = Bytes::from("x".repeat(MAX_LOGGED_BODY_BYTES + 10));
        let rendered = preview(&bytes);
        assert!(rendered.ends_with(&format!(
            "(truncated, {} bytes total)",
            MAX_LOGGED_BODY_BYTES + 10
        )));
    }
}
