/// HTTP API module
///
/// This module handles:
/// - Routing and shared handler state (mod.rs)
/// - The response envelope (envelope.rs)
/// - Palette and image conversion endpoints (image.rs)
/// - Image / history / import record endpoints (records.rs)

pub mod envelope;
pub mod image;
pub mod records;

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderValue;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Settings, APP_NAME, APP_VERSION};
use crate::state::library::Library;
use crate::state::records::Records;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub records: Arc<Records<Library>>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(library: Library, settings: Settings) -> Self {
        Self {
            records: Arc::new(Records::new(library)),
            settings: Arc::new(settings),
        }
    }
}

/// Build the full application router
pub fn router(state: AppState) -> Router {
    // Leave headroom over the upload limit so oversized files reach our own
    // size check and get a proper 400
    let body_limit = state.settings.max_image_size.saturating_mul(2);
    let cors = cors_layer(&state.settings);

    let image_routes = Router::new()
        .route("/palette", get(image::get_palette))
        .route("/convert", post(image::convert_image));

    let api_routes = Router::new()
        .route("/images", post(records::create_image).get(records::list_images))
        .route(
            "/images/:id",
            get(records::get_image)
                .put(records::update_image)
                .delete(records::delete_image),
        )
        .route(
            "/histories",
            post(records::create_history).get(records::list_histories),
        )
        .route(
            "/histories/:id",
            get(records::get_history)
                .put(records::update_history)
                .delete(records::delete_history),
        )
        .route("/histories/:id/name", put(records::rename_history))
        .route("/imports", post(records::create_import).get(records::list_imports))
        .route("/imports/:id", get(records::get_import))
        .route("/imports/:id/status", put(records::update_import_status));

    Router::new()
        .route("/", get(root))
        .route("/healthz", get(health_check))
        .nest("/image", image_routes)
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    if settings.cors_allows_any() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "⚠️ ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> Json<Value> {
    Json(json!({
        "app": APP_NAME,
        "version": APP_VERSION,
        "status": "running",
        "endpoints": {
            "image_converter": "/image",
            "database": "/api",
            "health": "/healthz",
        },
    }))
}

/// Liveness probe; also confirms the database answers
async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let records = state.records.clone();
    let database = tokio::task::spawn_blocking(move || {
        use crate::state::library::{Collection, DocumentStore};
        records.store().count(Collection::Images).is_ok()
    })
    .await
    .unwrap_or(false);

    Json(json!({
        "status": "healthy",
        "app": APP_NAME,
        "version": APP_VERSION,
        "database": if database { "ok" } else { "unavailable" },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::quantizer::tests::png_bytes;
    use crate::state::data::tests::sample_level_json;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use ::image::{Rgb, RgbImage};
    use tower::ServiceExt;

    const BOUNDARY: &str = "mirai-test-boundary";

    fn app() -> Router {
        let library = Library::open_in_memory().unwrap();
        router(AppState::new(library, Settings::default()))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn json_req(method: Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    /// multipart/form-data with one file part plus plain text fields
    fn upload_req(uri: &str, content_type: &str, file: &[u8], fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(file);
        body.extend_from_slice(b"\r\n");
        for (name, value) in fields {
            body.extend_from_slice(
                format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                    .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn red_white_png() -> Vec<u8> {
        let mut img = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        png_bytes(&img)
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let app = app();

        let (status, body) = send(&app, get_req("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");

        let (status, body) = send(&app, get_req("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn test_palette_endpoint() {
        let (status, body) = send(&app(), get_req("/image/palette")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["palette"].as_object().unwrap().len(), 12);
        assert_eq!(body["palette"]["12"], "#ffffff");
        assert_eq!(body["colors"][0], json!({"index": 1, "hex": "#ff0000", "rgb": [255, 0, 0], "name": "red"}));
    }

    #[tokio::test]
    async fn test_convert_red_and_white() {
        let request = upload_req(
            "/image/convert",
            "image/png",
            &red_white_png(),
            &[("cols", "2"), ("rows", "2")],
        );
        let (status, body) = send(&app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["matrix"], json!([[1, 12], [12, 12]]));
        assert_eq!(body["meta"]["mode"], "index");
        assert_eq!(body["meta"]["palette"], json!({"1": "#ff0000", "12": "#ffffff"}));
    }

    #[tokio::test]
    async fn test_convert_dimensions_from_query_and_override() {
        let request = upload_req(
            "/image/convert?cols=1&rows=1",
            "image/png",
            &red_white_png(),
            &[("palette_override", "[2,12]")],
        );
        let (status, body) = send(&app(), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["cols"], 1);
        assert_eq!(body["matrix"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_convert_rejections() {
        let app = app();

        let (status, body) =
            send(&app, upload_req("/image/convert", "image/gif", &red_white_png(), &[])).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, upload_req("/image/convert", "image/png", b"", &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send(&app, upload_req("/image/convert", "image/png", b"not a png", &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            upload_req("/image/convert", "image/png", &red_white_png(), &[("cols", "0")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            upload_req(
                "/image/convert",
                "image/png",
                &red_white_png(),
                &[("palette_override", "1,99")],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_image_records_over_http() {
        let app = app();
        let payload = json!({
            "name": "cat",
            "matrix": [[1, 12], [12, 12]],
            "palette": {"1": "#ff0000", "12": "#ffffff"},
            "cols": 2,
            "rows": 2
        });

        let (status, body) = send(&app, json_req(Method::POST, "/api/images", payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Image created successfully");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let (status, body) =
            send(&app, json_req(Method::PUT, &format!("/api/images/{id}"), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "cat");

        let (_, body) = send(&app, get_req("/api/images?sort_by=name&sort_order=1")).await;
        assert_eq!(body["data"]["pagination"]["total"], 1);
        assert_eq!(body["data"]["pagination"]["has_more"], false);

        let delete = Request::delete(format!("/api/images/{id}")).body(Body::empty()).unwrap();
        let (status, body) = send(&app, delete).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("data").is_none());

        let (status, body) = send(&app, get_req(&format!("/api/images/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Image not found");

        let (status, _) = send(&app, get_req("/api/images/not-an-id")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, get_req("/api/images?sort_order=2")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_records_over_http() {
        let app = app();
        let create = json!({ "value": { "name": "41", "level": sample_level_json() } });

        let (status, body) = send(&app, json_req(Method::POST, "/api/histories", create)).await;
        assert_eq!(status, StatusCode::OK);
        let value_id = body["data"]["value"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["key"], "history");

        let wrapped = json!({ "level": sample_level_json() });
        let (status, body) = send(
            &app,
            json_req(Method::PUT, &format!("/api/histories/{value_id}"), wrapped),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "History level updated successfully");

        let (status, _) = send(
            &app,
            json_req(Method::PUT, &format!("/api/histories/{value_id}/name"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            json_req(
                Method::PUT,
                &format!("/api/histories/{value_id}/name"),
                json!({"name": "Level Z"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["value"]["name"], "Level Z");

        let (_, body) = send(&app, get_req("/api/histories?search=level&sort_by=name")).await;
        assert_eq!(body["message"], "Found 1 histories matching 'level'");
        assert_eq!(body["data"]["sort"], json!({"by": "name", "order": "desc"}));
        assert_eq!(body["data"]["items"][0]["value"]["id"], value_id.as_str());

        let (status, body) = send(&app, get_req("/api/histories?sort_by=created")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "sort_by must be 'name' or 'updatedAt'");

        let (status, _) = send(
            &app,
            json_req(Method::PUT, "/api/histories/level_missing", json!({"level": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            json_req(
                Method::PUT,
                "/api/histories/level_missing",
                json!({"level": sample_level_json()}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_import_status_over_http() {
        let app = app();

        let (_, body) = send(
            &app,
            json_req(Method::POST, "/api/imports", json!({"source": "file", "total_items": 3})),
        )
        .await;
        assert_eq!(body["data"]["status"], "pending");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let query_only = Request::put(format!(
            "/api/imports/{id}/status?status=processing&processed_items=2"
        ))
        .body(Body::empty())
        .unwrap();
        let (status, body) = send(&app, query_only).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["processed_items"], 2);
        assert!(body["data"]["completed_at"].is_null());

        let (status, body) = send(
            &app,
            json_req(
                Method::PUT,
                &format!("/api/imports/{id}/status"),
                json!({"status": "completed", "processed_items": 3}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["completed_at"].is_string());

        let missing_status = Request::put(format!("/api/imports/{id}/status"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, missing_status).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, get_req("/api/imports")).await;
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_skip_is_rejected() {
        let app = app();
        send(
            &app,
            json_req(Method::POST, "/api/imports", json!({"source": "file"})),
        )
        .await;

        for uri in [
            "/api/imports?skip=9223372036854775808",
            "/api/imports?skip=18446744073709551615",
            "/api/images?skip=9223372036854775808",
            "/api/histories?skip=18446744073709551615",
        ] {
            let (status, body) = send(&app, get_req(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["success"], false);
        }

        // Largest accepted offset is simply past the end
        let (status, body) = send(&app, get_req("/api/imports?skip=9223372036854775807")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["items"].as_array().unwrap().is_empty());
        assert_eq!(body["data"]["pagination"]["has_more"], false);
    }
}
