//! Upload API integration tests.
//!
//! Run with: `cargo test -p sealpost-api --test upload_api_test`

#[path = "helpers/mod.rs"]
mod helpers;

use helpers::{form_with_files, png, setup_test_app};
use sealpost_upload::{ErrorEntry, UploadResult};

#[tokio::test]
async fn test_root_reports_server_id() {
    let app = setup_test_app(&[]).await;

    let response = app.client().get("/").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    assert_eq!(body["id"], "sealpost-test");

    let response = app.client().get("/health").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_upload_stores_files_and_fields() {
    let app = setup_test_app(&[]).await;
    let data = png(2048);

    let form = form_with_files(vec![("photo", "cat.png", data.clone())])
        .add_text("title", "my cat");
    let response = app.client().post("/upload").multipart(form).await;

    assert_eq!(response.status_code(), 200);
    let result: UploadResult = response.json();
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    assert_eq!(result.field("title"), Some("my cat"));
    assert_eq!(result.files.len(), 1);

    let file = &result.files[0];
    assert_eq!(file.filename, "cat.png");
    assert_eq!(file.fieldname, "photo");
    assert_eq!(file.size, data.len() as u64);
    assert_eq!(
        std::fs::read(app.upload_dir().join(&file.fullname)).unwrap(),
        data
    );
}

#[tokio::test]
async fn test_only_failed_files_is_bad_request() {
    let app = setup_test_app(&[("MAX_FILE_SIZE_BYTES", "1000")]).await;

    let form = form_with_files(vec![("a", "big.bin", vec![1u8; 2000])]);
    let response = app.client().post("/upload").multipart(form).await;

    assert_eq!(response.status_code(), 400);
    let result: UploadResult = response.json();
    assert!(result.files.is_empty());
    assert_eq!(
        result.error_messages(),
        vec!["BYTES LIMIT EXCEEDED, limit 1000 bytes"]
    );
    assert!(app.stored_in(&app.upload_dir()).is_empty());
}

#[tokio::test]
async fn test_partial_success_is_too_many_requests() {
    let app = setup_test_app(&[("MAX_FILE_SIZE_BYTES", "1000")]).await;

    let form = form_with_files(vec![
        ("a", "small.bin", vec![1u8; 10]),
        ("b", "big.bin", vec![1u8; 2000]),
    ]);
    let response = app.client().post("/upload").multipart(form).await;

    assert_eq!(response.status_code(), 429);
    let result: UploadResult = response.json();
    assert_eq!(result.files.len(), 1);
    assert!(matches!(&result.errors[0], ErrorEntry::File(f) if f.filename == "big.bin"));
}

#[tokio::test]
async fn test_files_limit_warning_is_too_many_requests() {
    let app = setup_test_app(&[("MAX_FILES", "1")]).await;

    let form = form_with_files(vec![
        ("a", "one.txt", b"one".to_vec()),
        ("b", "two.txt", b"two".to_vec()),
    ]);
    let response = app.client().post("/upload").multipart(form).await;

    assert_eq!(response.status_code(), 429);
    let result: UploadResult = response.json();
    assert_eq!(result.warnings, vec!["MAX FILES REACHED, LIMIT IS 1 FILES"]);
    assert_eq!(result.files.len(), 1);
}

#[tokio::test]
async fn test_non_multipart_request_is_rejected() {
    let app = setup_test_app(&[]).await;

    let response = app.client().post("/upload").json(&serde_json::json!({})).await;

    assert_eq!(response.status_code(), 400);
    let result: UploadResult = response.json();
    assert_eq!(
        result.error_messages(),
        vec!["no multipart/form-data; header found"]
    );
}

#[tokio::test]
async fn test_disallowed_type_is_rejected() {
    let app = setup_test_app(&[("ALLOWED_EXTENSIONS", "jpg,gif")]).await;

    let form = form_with_files(vec![("a", "image.jpg", png(500))]);
    let response = app.client().post("/upload").multipart(form).await;

    assert_eq!(response.status_code(), 400);
    let result: UploadResult = response.json();
    assert_eq!(result.error_messages(), vec!["EXTENSION NOT ALLOWED png"]);
    assert!(app.stored_in(&app.upload_dir()).is_empty());
}

#[tokio::test]
async fn test_encrypted_upload_round_trip() {
    let app = setup_test_app(&[("UPLOAD_KEY", "correct horse battery staple")]).await;
    let data = png(5000);

    let form = form_with_files(vec![("photo", "sealed.png", data.clone())]);
    let response = app.client().post("/upload").multipart(form).await;
    assert_eq!(response.status_code(), 200);

    let result: UploadResult = response.json();
    let file = &result.files[0];
    assert!(file.fullname.ends_with("-ciphered.png"));

    let on_disk = std::fs::read(app.upload_dir().join(&file.fullname)).unwrap();
    assert_ne!(on_disk, data);
    assert!(on_disk.len() > data.len());

    let response = app.client().get(&format!("/file/{}", file.fullname)).await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("content-type"), "image/png");
    assert_eq!(response.as_bytes().to_vec(), data);
}

#[tokio::test]
async fn test_download_plain_file() {
    let app = setup_test_app(&[]).await;
    std::fs::write(app.upload_dir().join("notes.txt"), b"plain text").unwrap();

    let response = app.client().get("/file/notes.txt").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.text(), "plain text");
}

#[tokio::test]
async fn test_download_missing_file_is_not_found() {
    let app = setup_test_app(&[]).await;

    let response = app.client().get("/file/missing.png").await;
    assert_eq!(response.status_code(), 404);
    let body: serde_json::Value = response.json();
    assert!(body.get("code").is_some());
}

#[tokio::test]
async fn test_custom_route_uses_subdirectory() {
    let app = setup_test_app(&[]).await;

    let form = form_with_files(vec![("a", "doc.txt", b"hello".to_vec())]);
    let response = app.client().post("/upload/custom").multipart(form).await;

    assert_eq!(response.status_code(), 200);
    let result: UploadResult = response.json();
    let custom = app.upload_dir().join("custom");
    assert_eq!(result.files[0].folder, custom.display().to_string());
    assert_eq!(app.stored_in(&custom), vec![result.files[0].fullname.clone()]);
    assert!(app.stored_in(&app.upload_dir()).is_empty());
}
