use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use sealpost_storage::{ByteSink, SinkDescriptor, SinkReceipt, StorageError, StorageResult};

/// Marker that makes a [`FlakySink`] fail the write that completes it.
pub const POISON: &[u8] = b"poison";

/// In-memory remote destination whose sinks break on demand.
#[derive(Default)]
pub struct FlakyDestination {
    pub refuse_open: bool,
    pub stored: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub deleted: Arc<Mutex<Vec<String>>>,
}

impl FlakyDestination {
    pub fn refusing() -> Self {
        FlakyDestination {
            refuse_open: true,
            ..Default::default()
        }
    }

    pub fn stored_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stored.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

pub struct FlakySink {
    name: String,
    buffer: Vec<u8>,
    stored: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

#[async_trait]
impl ByteSink for FlakySink {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&chunk);
        if self.buffer.windows(POISON.len()).any(|w| w == POISON) {
            return Err(StorageError::UploadFailed("connection reset".to_string()));
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<SinkReceipt> {
        let bytes_written = self.buffer.len() as u64;
        self.stored.lock().unwrap().insert(self.name, self.buffer);
        Ok(SinkReceipt {
            bytes_written,
            confirmed: true,
        })
    }

    async fn abort(self: Box<Self>) {}
}

#[async_trait]
impl SinkDescriptor for FlakyDestination {
    fn path(&self) -> &str {
        "memory://flaky"
    }

    fn protocol(&self) -> Option<&str> {
        Some("memory")
    }

    async fn create_sink(&self, name: &str) -> StorageResult<Box<dyn ByteSink>> {
        if self.refuse_open {
            return Err(StorageError::IoError(std::io::Error::other("disk gone")));
        }
        Ok(Box::new(FlakySink {
            name: name.to_string(),
            buffer: Vec::new(),
            stored: Arc::clone(&self.stored),
        }))
    }

    async fn delete_failed(&self, name: &str) -> StorageResult<()> {
        self.stored.lock().unwrap().remove(name);
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
