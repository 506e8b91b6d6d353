use crate::{Destination, LocalDirectory, ObjectStoreDestination, StorageBackend, StorageError, StorageResult};
use sealpost_core::Config;
use std::sync::Arc;

/// Create the upload destination described by configuration.
///
/// Local destinations are created on startup so a fresh deployment works without
/// preparing directories by hand.
pub async fn create_destination(config: &Config) -> StorageResult<Destination> {
    match config.storage_backend() {
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;

            let remote = ObjectStoreDestination::s3(
                bucket,
                config.s3_region(),
                config.s3_endpoint(),
                None,
            )?;

            tracing::info!(path = %remote.scheme(), bucket = %bucket, "Using object store destination");
            Ok(Destination::Remote(Arc::new(remote)))
        }

        StorageBackend::Local => {
            let dir = LocalDirectory::create(config.upload_dest()).await?;
            tracing::info!(path = %dir.dir().display(), "Using local destination");
            Ok(Destination::Local(dir))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealpost_core::ServerConfig;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_destination_is_created() {
        let dir = tempdir().unwrap();
        let dest_path = dir.path().join("uploads");
        let dest_str = dest_path.display().to_string();

        let server = ServerConfig::from_vars(|name| match name {
            "UPLOAD_DEST" => Some(dest_str.clone()),
            _ => None,
        })
        .unwrap();
        let config = Config(Box::new(server));

        let dest = create_destination(&config).await.unwrap();
        assert!(dest.is_local());
        assert!(dest_path.is_dir());
    }

    #[tokio::test]
    async fn test_s3_without_bucket_fails() {
        let server = ServerConfig::from_vars(|name| match name {
            "STORAGE_BACKEND" => Some("s3".to_string()),
            _ => None,
        })
        .unwrap();
        let config = Config(Box::new(server));

        assert!(matches!(
            create_destination(&config).await,
            Err(StorageError::ConfigError(_))
        ));
    }
}
