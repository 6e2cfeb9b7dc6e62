//! HTTP API integration tests
//!
//! Drives the full router with in-memory state: no external collaborators
//! are wired, so these tests cover routing, hash resolution, error mapping,
//! and asset serving from the volume directory.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use stepforge_ingest::config::ServiceConfig;
use stepforge_ingest::db::steps::{insert_step, NewStep};
use stepforge_ingest::models::ImagePosition;
use stepforge_ingest::{build_router, AppState};

const HASH_A: &str = "aaaa111122223333bbbbbbbbbbbbbbbbccccccccccccccccdddddddddddddddd";
const PREFIX_A: &str = "aaaa111122223333";
const HASH_B: &str = "aaaa999988887777bbbbbbbbbbbbbbbbccccccccccccccccdddddddddddddddd";

/// App state backed by an in-memory database and a temp volume.
/// No API keys configured, so no external clients are wired.
async fn test_state(volume: &TempDir) -> AppState {
    let db = sqlx::SqlitePool::connect(":memory:").await.unwrap();
    stepforge_ingest::db::init_tables(&db).await.unwrap();

    let config = ServiceConfig {
        port: 0,
        volume_dir: volume.path().to_path_buf(),
        gemini_api_key: None,
        gemini_model: None,
        fish_audio_api_key: None,
        tripo_api_key: None,
        default_voice: "voice-1".to_string(),
    };

    AppState::new(db, config).unwrap()
}

async fn seed_step(state: &AppState, pdf_hash: &str, step: i64, position: Option<ImagePosition>) {
    let prefix = &pdf_hash[..16];
    insert_step(
        &state.db,
        &NewStep {
            pdf_hash: pdf_hash.to_string(),
            pdf_filename: "manual.pdf".to_string(),
            step,
            image_filename: format!("{prefix}-{step}.jpg"),
            instruction_filename: format!("{prefix}-{step}.txt"),
            position,
        },
    )
    .await
    .unwrap();
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint_reports_identity() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    let app = build_router(state);

    let (status, json) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "stepforge-ingest");
    assert!(json["version"].is_string());
    assert!(json["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_root_serves_service_identity() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    let app = build_router(state);

    let (status, json) = get(app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["service"], "stepforge-ingest");
}

#[tokio::test]
async fn test_document_listing_uses_hash_prefixes() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    seed_step(&state, HASH_A, 0, None).await;
    seed_step(&state, HASH_A, 1, None).await;
    let app = build_router(state);

    let (status, json) = get(app, "/pdfs").await;
    assert_eq!(status, StatusCode::OK);
    let docs = json.as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["pdf_hash"], PREFIX_A);
    assert_eq!(docs[0]["pdf_filename"], "manual.pdf");
    assert_eq!(docs[0]["step_count"], 2);
}

#[tokio::test]
async fn test_steps_resolve_by_prefix_and_full_hash() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    seed_step(&state, HASH_A, 0, None).await;

    let app = build_router(state.clone());
    let (status, json) = get(app, &format!("/pdfs/{PREFIX_A}/steps")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["step"], 0);

    let app = build_router(state);
    let (status, _) = get(app, &format!("/pdfs/{HASH_A}/steps")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_hash_is_404_with_json_error() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    let app = build_router(state);

    let (status, json) = get(app, "/pdfs/ffffffffffffffff/steps").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert!(json["error"]["message"].is_string());
}

#[tokio::test]
async fn test_ambiguous_prefix_is_rejected() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    // Both hashes share the first four characters
    seed_step(&state, HASH_A, 0, None).await;
    seed_step(&state, HASH_B, 0, None).await;
    let app = build_router(state);

    let (status, json) = get(app, "/pdfs/aaaa/steps").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_instruction_asset_served_from_volume() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    seed_step(&state, HASH_A, 0, None).await;
    std::fs::write(
        volume.path().join(format!("{PREFIX_A}-0.txt")),
        "Attach the bracket\n\nAlign the bracket with the two holes.",
    )
    .unwrap();

    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/pdfs/{PREFIX_A}/steps/0/instruction"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(std::str::from_utf8(&body).unwrap().contains("Attach the bracket"));
}

#[tokio::test]
async fn test_missing_asset_file_is_404() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    seed_step(&state, HASH_A, 0, None).await;
    // Ledger row exists but no image file was written to the volume
    let app = build_router(state);

    let (status, json) = get(app, &format!("/pdfs/{PREFIX_A}/steps/0/image")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_model_unset_is_404() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    seed_step(&state, HASH_A, 0, None).await;
    let app = build_router(state);

    let (status, _) = get(app, &format!("/pdfs/{PREFIX_A}/steps/0/model")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_position_present_and_absent() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    seed_step(
        &state,
        HASH_A,
        0,
        Some(ImagePosition {
            page_number: 3,
            y_percentage: 42.5,
        }),
    )
    .await;
    seed_step(&state, HASH_A, 1, None).await;

    let app = build_router(state.clone());
    let (status, json) = get(app, &format!("/pdfs/{PREFIX_A}/steps/0/position")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["page_number"], 3);
    assert_eq!(json["y_percentage"], 42.5);

    let app = build_router(state);
    let (status, _) = get(app, &format!("/pdfs/{PREFIX_A}/steps/1/position")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_process_rejects_path_traversal() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/process")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"pdf_filename": "../outside.pdf"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_process_missing_file_is_404() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    let app = build_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/process")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"pdf_filename": "nonexistent.pdf"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejects_non_pdf() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    let app = build_router(state);

    let boundary = "test-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"manual.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         not a pdf\r\n\
         --{boundary}--\r\n"
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-and-process")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_audio_accessor_adopts_file_present_on_disk() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    // Ledger mp3 is unset, but the expected file is already in the volume;
    // the self-heal path adopts it without needing a narration client
    seed_step(&state, HASH_A, 0, None).await;
    std::fs::write(volume.path().join(format!("{PREFIX_A}-0.mp3")), b"mp3 bytes").unwrap();

    let app = build_router(state.clone());
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/pdfs/{PREFIX_A}/steps/0/audio"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "audio/mpeg"
    );

    // The adopted filename was persisted back to the ledger
    let record = stepforge_ingest::db::steps::get_step(&state.db, HASH_A, 0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.mp3_filename.as_deref(), Some(&*format!("{PREFIX_A}-0.mp3")));
}

#[tokio::test]
async fn test_pdf_file_served_by_hash() {
    let volume = TempDir::new().unwrap();
    let state = test_state(&volume).await;
    seed_step(&state, HASH_A, 0, None).await;
    std::fs::write(volume.path().join(format!("{PREFIX_A}.pdf")), b"%PDF-1.4").unwrap();

    let app = build_router(state);
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/pdfs/{PREFIX_A}/file"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/pdf"
    );
}
