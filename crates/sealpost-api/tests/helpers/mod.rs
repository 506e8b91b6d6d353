//! Test helpers: build AppState and router for integration tests.
//!
//! Run with: `cargo test -p sealpost-api --test upload_api_test`

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use sealpost_api::setup::routes;
use sealpost_api::state::AppState;
use sealpost_core::{Config, ServerConfig};
use sealpost_upload::Uploader;
use tempfile::TempDir;

pub const PNG_HEADER: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R',
];

/// Test application: server plus the directory it stores into.
pub struct TestApp {
    pub server: TestServer,
    pub config: Config,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.config.upload_dest().clone()
    }

    /// Names of the files stored directly in `dir`
    pub fn stored_in(&self, dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().is_file())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Setup a test app storing into a fresh temporary directory.
///
/// `vars` are extra configuration variables, as they would appear in the environment.
pub async fn setup_test_app(vars: &[(&str, &str)]) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");

    let mut map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.insert(
        "UPLOAD_DEST".to_string(),
        temp_dir.path().join("uploads").display().to_string(),
    );
    map.entry("SEALPOST_SERVER_ID".to_string())
        .or_insert_with(|| "sealpost-test".to_string());

    let server_config =
        ServerConfig::from_vars(|name| map.get(name).cloned()).expect("Invalid test config");
    server_config.validate().expect("Test config should validate");
    let config = Config(Box::new(server_config));

    let uploader = Uploader::from_config(&config)
        .await
        .expect("Failed to build uploader");
    let state = Arc::new(AppState::new(config.clone(), uploader));
    let app = routes::setup_routes(state);
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        config,
        _temp_dir: temp_dir,
    }
}

/// A payload with a PNG signature, padded to `size` bytes
pub fn png(size: usize) -> Vec<u8> {
    let mut data = PNG_HEADER.to_vec();
    data.extend((0..size.saturating_sub(PNG_HEADER.len())).map(|i| (i % 251) as u8));
    data
}

pub fn file_part(data: Vec<u8>, file_name: &str) -> Part {
    Part::bytes(bytes::Bytes::from(data)).file_name(file_name.to_string())
}

/// A form with one file per `(field, file name, data)`.
pub fn form_with_files(files: Vec<(&str, &str, Vec<u8>)>) -> MultipartForm {
    files
        .into_iter()
        .fold(MultipartForm::new(), |form, (field, name, data)| {
            form.add_part(field.to_string(), file_part(data, name))
        })
}
