#[path = "helpers/mod.rs"]
mod helpers;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::{stream, StreamExt};
use helpers::fixtures::{jpeg, multipart_body, png, truncated_body, Part};
use helpers::sinks::FlakyDestination;
use helpers::{chunked, content_type, stored_in, TestUploader};
use object_store::memory::InMemory;
use sealpost_core::Limits;
use sealpost_storage::{Destination, ObjectStoreDestination};
use sealpost_upload::{files_limit_warning, ErrorEntry, UploadError, UploadOptions, Uploader};

#[tokio::test]
async fn test_stores_files_and_fields() {
    let app = TestUploader::new(|options| options);
    let first = png(3000);
    let second = b"just some text".to_vec();

    let result = app
        .upload(multipart_body(&[
            Part::field("title", "holiday"),
            Part::file("photo", "beach.png", first.clone()),
            Part::file("notes", "notes.txt", second.clone()),
        ]))
        .await;

    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    assert!(result.warnings.is_empty());
    assert_eq!(result.field("title"), Some("holiday"));
    assert_eq!(result.files.len(), 2);

    let photo = result.files.iter().find(|f| f.fieldname == "photo").unwrap();
    assert_eq!(photo.filename, "beach.png");
    assert_eq!(photo.ext, "png");
    assert_eq!(photo.size, first.len() as u64);
    assert!(photo.finished);
    assert!(!photo.failed);
    assert_eq!(photo.fullname, format!("{}.png", photo.newname));
    assert_eq!(
        std::fs::read(app.dir.path().join(&photo.fullname)).unwrap(),
        first
    );

    let notes = result.files.iter().find(|f| f.fieldname == "notes").unwrap();
    assert_eq!(notes.size, second.len() as u64);
    assert_eq!(
        std::fs::read(app.dir.path().join(&notes.fullname)).unwrap(),
        second
    );
    assert_eq!(app.stored().len(), 2);
}

#[tokio::test]
async fn test_size_limit_boundary() {
    let app = TestUploader::with_limits(Limits {
        file_size: Some(1000),
        ..Default::default()
    });

    let result = app
        .upload(multipart_body(&[
            Part::file("a", "exact.bin", vec![7u8; 1000]),
            Part::file("b", "over.bin", vec![7u8; 1001]),
        ]))
        .await;

    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].filename, "exact.bin");
    assert_eq!(result.files[0].size, 1000);

    assert_eq!(result.errors.len(), 1);
    let ErrorEntry::File(failed) = &result.errors[0] else {
        panic!("expected a failed file, got {:?}", result.errors[0]);
    };
    assert_eq!(failed.filename, "over.bin");
    assert_eq!(
        failed.error.as_deref(),
        Some("BYTES LIMIT EXCEEDED, limit 1000 bytes")
    );
    assert!(failed.failed);
    assert!(!failed.finished);

    assert_eq!(app.stored(), vec![result.files[0].fullname.clone()]);
}

#[tokio::test]
async fn test_allow_list_rejects_other_types() {
    let app = TestUploader::with_limits(Limits {
        allowed: Some(vec!["png".to_string()]),
        ..Default::default()
    });

    let result = app
        .upload(multipart_body(&[
            Part::file("a", "photo.jpg", jpeg(5000)),
            Part::file("b", "icon.png", png(5000)),
        ]))
        .await;

    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].filename, "icon.png");
    assert_eq!(result.error_messages(), vec!["EXTENSION NOT ALLOWED jpeg"]);
    assert_eq!(app.stored(), vec![result.files[0].fullname.clone()]);
}

#[tokio::test]
async fn test_allow_list_aliases_are_normalized() {
    let app = TestUploader::with_limits(Limits {
        allowed: Some(vec!["JPG".to_string()]),
        ..Default::default()
    });

    let data = jpeg(2000);
    let result = app
        .upload(multipart_body(&[Part::file("a", "photo.jpg", data.clone())]))
        .await;

    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    assert_eq!(
        std::fs::read(app.dir.path().join(&result.files[0].fullname)).unwrap(),
        data
    );
}

#[tokio::test]
async fn test_count_limit_skips_extra_files() {
    let app = TestUploader::with_limits(Limits {
        files: Some(2),
        ..Default::default()
    });

    let parts: Vec<Part> = (0..5)
        .map(|i| Part::file("f", format!("{}.bin", i), vec![i as u8; 100]))
        .collect();
    let result = app.upload(multipart_body(&parts)).await;

    assert_eq!(result.files.len(), 2);
    assert!(result.errors.is_empty());
    assert_eq!(result.warnings, vec![files_limit_warning(2)]);
    assert_eq!(result.warnings[0], "MAX FILES REACHED, LIMIT IS 2 FILES");
    assert_eq!(app.stored().len(), 2);
}

#[tokio::test]
async fn test_stalled_body_times_out_and_cleans_up() {
    let app = TestUploader::new(|options| options.timeout(Duration::from_millis(150)));

    let head = truncated_body(&[Part::file("a", "done.bin", vec![1u8; 500])], b"partial bytes");
    let body = chunked(head, 64).chain(stream::pending());

    let err = app
        .uploader
        .upload(Some(&content_type()), body)
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Timeout(_)));
    assert_eq!(err.to_string(), "REQUEST TIMEOUT");
    assert!(app.stored().is_empty(), "left behind: {:?}", app.stored());
}

#[tokio::test]
async fn test_malformed_body_keeps_completed_files() {
    let app = TestUploader::new(|options| options);

    let body = truncated_body(&[Part::file("a", "done.bin", vec![1u8; 500])], b"cut short");
    let result = app.upload(body).await;

    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].filename, "done.bin");
    assert_eq!(result.errors.len(), 2);
    assert!(matches!(result.errors[0], ErrorEntry::Message(_)));
    let ErrorEntry::File(late) = &result.errors[1] else {
        panic!("expected the interrupted file, got {:?}", result.errors[1]);
    };
    assert_eq!(late.filename, "late.bin");
    assert!(late.failed);
    assert_eq!(app.stored(), vec![result.files[0].fullname.clone()]);
}

#[tokio::test]
async fn test_base64_transport_is_decoded() {
    let app = TestUploader::with_limits(Limits {
        allowed: Some(vec!["png".to_string()]),
        ..Default::default()
    });

    let data = png(4000);
    let encoded = STANDARD.encode(&data);
    let result = app
        .upload(multipart_body(&[Part::base64_file("a", "img.png", encoded.clone())]))
        .await;

    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    let file = &result.files[0];
    assert_eq!(file.encoding, "base64");
    // Size is counted on the bytes received, before decoding.
    assert_eq!(file.size, encoded.len() as u64);
    assert_eq!(std::fs::read(app.dir.path().join(&file.fullname)).unwrap(), data);
}

#[tokio::test]
async fn test_empty_file_is_stored() {
    let app = TestUploader::new(|options| options);
    let result = app
        .upload(multipart_body(&[Part::file("a", "empty", Vec::new())]))
        .await;

    assert!(result.errors.is_empty());
    assert_eq!(result.files[0].size, 0);
    assert_eq!(result.files[0].ext, "filext");
    assert!(std::fs::read(app.dir.path().join(&result.files[0].fullname))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_remote_destination() {
    let store = Arc::new(InMemory::new());
    let destination = Destination::remote(Arc::new(ObjectStoreDestination::new(
        store,
        "memory",
        "uploads",
        Some("incoming"),
    )));
    let uploader = Uploader::new(UploadOptions::new(destination.clone())).unwrap();

    let data = png(10_000);
    let body = multipart_body(&[Part::file("a", "remote.png", data.clone())]);
    let result = uploader
        .upload(Some(&content_type()), chunked(body, 1024))
        .await
        .unwrap();

    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    let file = &result.files[0];
    assert_eq!(file.folder, "memory://uploads/incoming");
    assert_eq!(
        file.full_path,
        format!("memory://uploads/incoming/{}", file.fullname)
    );

    let stored: Vec<u8> = destination
        .open(&file.fullname)
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap().to_vec())
        .concat()
        .await;
    assert_eq!(stored, data);
}

#[tokio::test]
async fn test_destination_override_creates_directory() {
    let app = TestUploader::new(|options| options);
    let custom = app.dir.path().join("custom");

    let result = app
        .uploader
        .upload_with(
            Some(&content_type()),
            chunked(multipart_body(&[Part::file("a", "a.txt", b"abc".to_vec())]), 64),
            sealpost_upload::UploadOverrides {
                dest: Some(custom.clone()),
            },
        )
        .await
        .unwrap();

    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].folder, custom.display().to_string());
    assert_eq!(stored_in(&custom), vec![result.files[0].fullname.clone()]);
    assert!(app.stored().is_empty());
}

#[tokio::test]
async fn test_sink_write_failure_fails_only_that_file() {
    let flaky = Arc::new(FlakyDestination::default());
    let uploader = Uploader::new(UploadOptions::new(Destination::remote(flaky.clone()))).unwrap();

    let mut broken = vec![b'x'; 300];
    broken.extend_from_slice(b"poison");
    broken.extend(vec![b'y'; 300]);
    let body = multipart_body(&[
        Part::file("a", "broken.bin", broken),
        Part::file("b", "healthy.txt", b"all good".to_vec()),
    ]);

    let result = uploader
        .upload(Some(&content_type()), chunked(body, 64))
        .await
        .unwrap();

    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].filename, "healthy.txt");
    assert_eq!(result.errors.len(), 1);
    let ErrorEntry::File(failed) = &result.errors[0] else {
        panic!("expected the broken file, got {:?}", result.errors[0]);
    };
    assert_eq!(failed.filename, "broken.bin");
    assert!(failed.failed);
    assert_eq!(
        failed.error.as_deref(),
        Some("SINK ERROR Upload failed: connection reset")
    );
    assert_eq!(flaky.deleted_names(), vec![failed.fullname.clone()]);
    assert_eq!(flaky.stored_names(), vec![result.files[0].fullname.clone()]);
}

#[tokio::test]
async fn test_sink_open_failure_rejects_upload() {
    let flaky = Arc::new(FlakyDestination::refusing());
    let uploader = Uploader::new(UploadOptions::new(Destination::remote(flaky.clone()))).unwrap();

    let body = multipart_body(&[Part::file("a", "photo.png", png(2000))]);
    let err = uploader
        .upload(Some(&content_type()), chunked(body, 64))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Io(_)), "unexpected error: {:?}", err);
    assert!(flaky.stored_names().is_empty());
    assert_eq!(flaky.deleted_names().len(), 1);
}
