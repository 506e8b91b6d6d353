//! Configuration module
//!
//! Per-request upload limits plus the server configuration loaded from the
//! environment (`.env` files are honored through `dotenvy`).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::encryption::CipherAlgorithm;
use crate::file_extensions::normalize_allowed;
use crate::storage_types::StorageBackend;

/// Stall timeout applied when none is configured.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

const DEFAULT_PORT: u16 = 4000;
const DEFAULT_SERVER_ID: &str = "sealpost";

/// Size, count and type limits for one upload request. `None` means unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Limits {
    /// Maximum raw bytes per file.
    pub file_size: Option<u64>,
    /// Maximum number of files per request.
    pub files: Option<usize>,
    /// Allowed extensions. Presence enables content sniffing; an empty list rejects every file.
    pub allowed: Option<Vec<String>>,
}

impl Limits {
    /// Sniffing runs only when an allow-list is configured.
    pub fn sniffing_enabled(&self) -> bool {
        self.allowed.is_some()
    }

    /// The allow-list with aliases collapsed to canonical extensions.
    pub fn normalized_allowed(&self) -> Option<Vec<String>> {
        self.allowed.as_deref().map(normalize_allowed)
    }
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub server_port: u16,
    pub server_id: String,
    pub environment: String,
    pub upload_dest: PathBuf,
    pub upload_key: Option<String>,
    pub upload_algorithm: Option<String>,
    pub max_file_size_bytes: Option<u64>,
    pub max_files: Option<usize>,
    pub allowed_extensions: Option<Vec<String>>,
    pub upload_timeout_ms: u64,
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<ServerConfig>);

impl Config {
    fn inner(&self) -> &ServerConfig {
        &self.0
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = ServerConfig::from_vars(|name| env::var(name).ok())?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    pub fn server_port(&self) -> u16 {
        self.inner().server_port
    }

    pub fn server_id(&self) -> &str {
        &self.inner().server_id
    }

    pub fn environment(&self) -> &str {
        &self.inner().environment
    }

    pub fn upload_dest(&self) -> &PathBuf {
        &self.inner().upload_dest
    }

    pub fn upload_key(&self) -> Option<&str> {
        self.inner().upload_key.as_deref()
    }

    pub fn upload_algorithm(&self) -> Option<&str> {
        self.inner().upload_algorithm.as_deref()
    }

    pub fn limits(&self) -> Limits {
        Limits {
            file_size: self.inner().max_file_size_bytes,
            files: self.inner().max_files,
            allowed: self.inner().allowed_extensions.clone(),
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.inner().upload_timeout_ms)
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.inner().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.inner().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }
}

fn parse_optional<T: std::str::FromStr>(
    value: Option<String>,
    name: &str,
) -> Result<Option<T>, anyhow::Error> {
    match value {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", name)),
        _ => Ok(None),
    }
}

impl ServerConfig {
    /// Build the configuration from a variable lookup (the process environment in production).
    pub fn from_vars<F>(var: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let server_port = var("PORT")
            .unwrap_or_else(|| DEFAULT_PORT.to_string())
            .parse()
            .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?;

        let upload_dest = var("UPLOAD_DEST")
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("sealpost"));

        let allowed_extensions = var("ALLOWED_EXTENSIONS").map(|list| {
            list.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        });

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => StorageBackend::default(),
        };

        Ok(ServerConfig {
            server_port,
            server_id: var("SEALPOST_SERVER_ID").unwrap_or_else(|| DEFAULT_SERVER_ID.to_string()),
            environment,
            upload_dest,
            upload_key: var("UPLOAD_KEY").filter(|k| !k.is_empty()),
            upload_algorithm: var("UPLOAD_ALGORITHM").filter(|a| !a.is_empty()),
            max_file_size_bytes: parse_optional(var("MAX_FILE_SIZE_BYTES"), "MAX_FILE_SIZE_BYTES")?,
            max_files: parse_optional(var("MAX_FILES"), "MAX_FILES")?,
            allowed_extensions,
            upload_timeout_ms: parse_optional(var("UPLOAD_TIMEOUT_MS"), "UPLOAD_TIMEOUT_MS")?
                .unwrap_or(DEFAULT_TIMEOUT_MS),
            storage_backend,
            s3_bucket: var("S3_BUCKET"),
            s3_region: var("S3_REGION").or_else(|| var("AWS_REGION")),
            s3_endpoint: var("S3_ENDPOINT"),
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(name) = self.upload_algorithm.as_deref() {
            if self.upload_key.is_none() {
                return Err(anyhow::anyhow!(
                    "UPLOAD_ALGORITHM is set but UPLOAD_KEY is missing"
                ));
            }
            name.parse::<CipherAlgorithm>()
                .map_err(|e| anyhow::anyhow!("UPLOAD_ALGORITHM is invalid: {}", e))?;
        }

        if self.max_file_size_bytes == Some(0) {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_BYTES must be greater than 0"));
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() && self.s3_endpoint.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or S3_ENDPOINT must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.upload_dest.as_os_str().is_empty() {
                    return Err(anyhow::anyhow!(
                        "UPLOAD_DEST must not be empty when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}
