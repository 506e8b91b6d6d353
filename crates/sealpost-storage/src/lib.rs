//! Sealpost Storage Library
//!
//! This crate provides the destination abstraction uploads are written to: a
//! `Destination` is either a local directory or a remote `SinkDescriptor`, and
//! hands out one `ByteSink` per stored file.
//!
//! # Storage names
//!
//! Names are flat (no separators, no `..`). Local destinations store `<dir>/<name>`,
//! object store destinations store `<prefix>/<name>`.

pub mod destination;
pub mod factory;
pub mod local;
pub mod object;
pub mod traits;

// Re-export commonly used types
pub use destination::{Destination, STREAM_FOLDER};
pub use factory::create_destination;
pub use local::LocalDirectory;
pub use object::ObjectStoreDestination;
pub use sealpost_core::StorageBackend;
pub use traits::{ByteSink, ByteStream, SinkDescriptor, SinkReceipt, StorageError, StorageResult};
