use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, Method, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::{DetectRequest, ErrorResponse, ServiceInfo};
use super::state::ServerState;
use crate::detect::{DetectionMethod, DetectionResult};
use crate::settings::Settings;

/// Multipart field carrying the uploaded page.
const UPLOAD_FIELD: &str = "file";

type HandlerError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(settings: Settings) -> Result<()> {
    let state = Arc::new(ServerState::new(&settings));
    info!(
        "server: listening on {} with {} workers",
        settings.server.addr, state.workers
    );
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&settings.server.addr)
        .await
        .with_context(|| format!("failed to bind server address {}", settings.server.addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    let body_limit = state.max_body_bytes;
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/detect", post(detect))
        .route("/detect/raw", post(detect_raw))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn service_info(State(state): State<Arc<ServerState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        methods: vec![
            DetectionMethod::Contours,
            DetectionMethod::Lines,
            DetectionMethod::Fallback,
        ],
        workers: state.workers,
        note: "detects question regions on photographed exam pages".to_string(),
    })
}

async fn cors_middleware(req: Request, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

/// Accepts a multipart upload (`file` field) or a JSON `data_base64` body,
/// chosen by `Content-Type`.
async fn detect(
    State(state): State<Arc<ServerState>>,
    request: Request,
) -> Result<Json<DetectionResult>, HandlerError> {
    let bytes = if is_multipart(request.headers()) {
        read_upload(request).await?
    } else {
        match read_base64_body(request).await? {
            Some(bytes) => bytes,
            None => return Ok(Json(DetectionResult::failed())),
        }
    };
    run_detection(state, bytes).await.map(Json)
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        })
        .unwrap_or(false)
}

async fn read_upload(request: Request) -> Result<Vec<u8>, HandlerError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| error_response(rejection.status(), rejection.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| error_response(err.status(), err.body_text()))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| error_response(err.status(), err.body_text()))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(bad_request("multipart field `file` is required"))
}

/// `None` when the payload is not valid base64.
async fn read_base64_body(request: Request) -> Result<Option<Vec<u8>>, HandlerError> {
    let Json(payload) = Json::<DetectRequest>::from_request(request, &())
        .await
        .map_err(|rejection| error_response(rejection.status(), rejection.body_text()))?;
    let encoded = payload
        .data_base64
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| bad_request("data_base64 is required"))?;
    match BASE64.decode(strip_data_uri(encoded)) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) => {
            warn!("server: invalid base64 payload: {}", err);
            Ok(None)
        }
    }
}

async fn detect_raw(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<DetectionResult>, HandlerError> {
    if body.is_empty() {
        return Err(bad_request("request body is empty"));
    }
    run_detection(state, body.to_vec()).await.map(Json)
}

async fn run_detection(
    state: Arc<ServerState>,
    bytes: Vec<u8>,
) -> Result<DetectionResult, HandlerError> {
    let _permit = state
        .permits
        .clone()
        .acquire_owned()
        .await
        .map_err(|err| internal_error(format!("worker pool closed: {}", err)))?;
    let detector = state.detector.clone();
    tokio::task::spawn_blocking(move || detector.detect(&bytes))
        .await
        .map_err(|err| internal_error(format!("detection task failed: {}", err)))
}

fn strip_data_uri(value: &str) -> &str {
    if value.starts_with("data:") {
        if let Some((_, payload)) = value.split_once(',') {
            return payload;
        }
    }
    value
}

fn bad_request(message: &str) -> HandlerError {
    error_response(StatusCode::BAD_REQUEST, message.to_string())
}

fn internal_error(message: String) -> HandlerError {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
}

fn error_response(status: StatusCode, message: String) -> HandlerError {
    (status, Json(ErrorResponse { error: message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};
    use std::io::Cursor;

    const BOUNDARY: &str = "question-detector-test-boundary";

    fn state() -> Arc<ServerState> {
        let mut settings = Settings::default();
        settings.server.workers = 2;
        Arc::new(ServerState::new(&settings))
    }

    fn blank_png() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(GrayImage::from_pixel(90, 60, Luma([255])))
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    fn json_request(body: serde_json::Value) -> Request {
        Request::builder()
            .method(Method::POST)
            .uri("/detect")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn multipart_request(field: &str, bytes: &[u8]) -> Request {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"page.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri("/detect")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    #[tokio::test]
    async fn detect_accepts_multipart_upload() {
        let Json(result) = detect(State(state()), multipart_request("file", &blank_png()))
            .await
            .expect("detect response");
        assert!(result.success);
        assert_eq!(result.method, DetectionMethod::Fallback);
        assert_eq!((result.image_width, result.image_height), (90, 60));
        assert_eq!(result.questions.len(), 3);
    }

    #[tokio::test]
    async fn multipart_without_file_field_is_a_bad_request() {
        let err = detect(State(state()), multipart_request("image", &blank_png()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.error.contains("file"));
    }

    #[tokio::test]
    async fn undecodable_upload_returns_error_result() {
        let Json(result) = detect(State(state()), multipart_request("file", b"not an image"))
            .await
            .expect("detect response");
        assert_eq!(result, DetectionResult::failed());
    }

    #[tokio::test]
    async fn detect_accepts_base64_payload() {
        let request = json_request(serde_json::json!({ "data_base64": BASE64.encode(blank_png()) }));
        let Json(result) = detect(State(state()), request)
            .await
            .expect("detect response");
        assert!(result.success);
        assert_eq!(result.method, DetectionMethod::Fallback);
        assert_eq!((result.image_width, result.image_height), (90, 60));
        assert_eq!(result.questions.len(), 3);
    }

    #[tokio::test]
    async fn detect_accepts_data_uri() {
        let encoded = format!("data:image/png;base64,{}", BASE64.encode(blank_png()));
        let request = json_request(serde_json::json!({ "data_base64": encoded }));
        let Json(result) = detect(State(state()), request)
            .await
            .expect("detect response");
        assert!(result.success);
    }

    #[tokio::test]
    async fn missing_payload_is_a_bad_request() {
        let err = detect(State(state()), json_request(serde_json::json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(err.1.error, "data_base64 is required");
    }

    #[tokio::test]
    async fn unsupported_content_type_is_rejected() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/detect")
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .expect("request");
        let err = detect(State(state()), request).await.unwrap_err();
        assert_eq!(err.0, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn undecodable_payloads_return_error_result() {
        let request = json_request(serde_json::json!({ "data_base64": "!!not base64!!" }));
        let Json(result) = detect(State(state()), request)
            .await
            .expect("detect response");
        assert_eq!(result, DetectionResult::failed());

        let Json(result) = detect_raw(State(state()), Bytes::from_static(b"GIF89a broken"))
            .await
            .expect("raw response");
        assert_eq!(result.method, DetectionMethod::Error);
    }

    #[tokio::test]
    async fn raw_body_is_detected() {
        let Json(result) = detect_raw(State(state()), Bytes::from(blank_png()))
            .await
            .expect("raw response");
        assert!(result.success);
        assert_eq!(result.questions.len(), 3);
    }

    #[tokio::test]
    async fn service_info_lists_methods() {
        let Json(info) = service_info(State(state())).await;
        assert_eq!(info.workers, 2);
        assert_eq!(
            info.methods,
            vec![
                DetectionMethod::Contours,
                DetectionMethod::Lines,
                DetectionMethod::Fallback
            ]
        );
        let value = serde_json::to_value(&info).expect("serialize");
        assert_eq!(value["methods"][1], "lines");
    }

    #[test]
    fn recognises_multipart_content_type() {
        let mut headers = HeaderMap::new();
        assert!(!is_multipart(&headers));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Multipart/Form-Data; boundary=x"),
        );
        assert!(is_multipart(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_multipart(&headers));
    }

    #[test]
    fn strips_data_uri_prefix() {
        assert_eq!(strip_data_uri("data:image/jpeg;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_uri("AAAA"), "AAAA");
    }
}
