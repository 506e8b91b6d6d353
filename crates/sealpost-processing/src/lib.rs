//! Sealpost Processing Library
//!
//! Byte transforms applied to each uploaded file (transport decoding, content
//! sniffing, encryption), the stall guard for the request body, and storage name
//! generation.

pub mod names;
pub mod sniffer;
pub mod stages;
pub mod stall;
pub mod transport;

pub use names::{NameGenerator, CIPHERED_SUFFIX, NO_EXTENSION};
pub use sniffer::{sniff, ContentSniffer, SniffResult, SniffState, EVALUATION_ROUNDS, MINIMUM_BYTES};
pub use stages::{plan_stages, StageChain, StageError, StageKind};
pub use stall::{StallError, StallTimeoutGuard};
pub use transport::{requires_decoding, Base64Decoder};
