//! Per-file processing chain.
//!
//! A chain is planned once per request from the request's modes and instantiated
//! once per file. Order is fixed: transport decode, sniff, cipher. The sink sits
//! after the last stage.

use std::future::Future;

use bytes::{Bytes, BytesMut};
use sealpost_core::encryption::{CipherError, CipherStreamFactory, Encryptor, IvPrepend};

use crate::sniffer::{ContentSniffer, SniffResult, SniffState};
use crate::transport::{requires_decoding, Base64Decoder};

/// Stage failures
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("invalid base64 input: {0}")]
    Decode(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("cipher stage planned without a key")]
    MissingKey,

    #[error("stage used after finish")]
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    TransportDecode,
    Sniff,
    Cipher,
}

/// The ordered stage list for one file.
pub fn plan_stages(encoding: &str, sniffing: bool, ciphering: bool) -> Vec<StageKind> {
    let mut plan = Vec::with_capacity(3);
    if requires_decoding(encoding) {
        plan.push(StageKind::TransportDecode);
    }
    if sniffing {
        plan.push(StageKind::Sniff);
    }
    if ciphering {
        plan.push(StageKind::Cipher);
    }
    plan
}

/// Encrypt, then prepend the IV.
pub struct CipherStage {
    encrypt: Option<Encryptor>,
    prepend_iv: IvPrepend,
}

impl CipherStage {
    pub fn new(factory: &CipherStreamFactory) -> Result<Self, StageError> {
        let streams = factory.cipher_streams()?;
        Ok(CipherStage {
            encrypt: Some(streams.encrypt),
            prepend_iv: streams.prepend_iv,
        })
    }

    fn push(&mut self, chunk: &[u8]) -> Result<Bytes, StageError> {
        let encrypt = self.encrypt.as_mut().ok_or(StageError::Finished)?;
        Ok(self.prepend_iv.push(encrypt.update(chunk)))
    }

    fn finish(&mut self) -> Result<Bytes, StageError> {
        let encrypt = self.encrypt.take().ok_or(StageError::Finished)?;
        let mut out = BytesMut::new();
        out.extend_from_slice(&self.prepend_iv.push(encrypt.finish()));
        // Only non-empty when no ciphertext was ever produced.
        out.extend_from_slice(&self.prepend_iv.finish());
        Ok(out.freeze())
    }
}

pub enum Stage {
    TransportDecode(Base64Decoder),
    Sniff(ContentSniffer),
    Cipher(CipherStage),
}

impl Stage {
    fn push(&mut self, chunk: Bytes) -> Result<Bytes, StageError> {
        match self {
            Stage::TransportDecode(decoder) => decoder.push(&chunk),
            Stage::Sniff(sniffer) => {
                sniffer.observe(&chunk);
                Ok(chunk)
            }
            Stage::Cipher(cipher) => cipher.push(&chunk),
        }
    }

    fn finish(&mut self) -> Result<Bytes, StageError> {
        match self {
            Stage::TransportDecode(decoder) => decoder.finish(),
            Stage::Sniff(sniffer) => {
                sniffer.end_of_input();
                Ok(Bytes::new())
            }
            Stage::Cipher(cipher) => cipher.finish(),
        }
    }
}

/// Instantiated stages for one file.
pub struct StageChain {
    stages: Vec<Stage>,
}

impl StageChain {
    pub fn new(plan: &[StageKind], cipher: Option<&CipherStreamFactory>) -> Result<Self, StageError> {
        let stages = plan
            .iter()
            .map(|kind| match kind {
                StageKind::TransportDecode => Ok(Stage::TransportDecode(Base64Decoder::new())),
                StageKind::Sniff => Ok(Stage::Sniff(ContentSniffer::new())),
                StageKind::Cipher => {
                    let factory = cipher.ok_or(StageError::MissingKey)?;
                    Ok(Stage::Cipher(CipherStage::new(factory)?))
                }
            })
            .collect::<Result<Vec<_>, StageError>>()?;
        Ok(StageChain { stages })
    }

    /// Plan and instantiate in one step.
    pub fn build(
        encoding: &str,
        sniffing: bool,
        cipher: Option<&CipherStreamFactory>,
    ) -> Result<Self, StageError> {
        let plan = plan_stages(encoding, sniffing, cipher.is_some());
        Self::new(&plan, cipher)
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages
            .iter()
            .map(|stage| match stage {
                Stage::TransportDecode(_) => StageKind::TransportDecode,
                Stage::Sniff(_) => StageKind::Sniff,
                Stage::Cipher(_) => StageKind::Cipher,
            })
            .collect()
    }

    /// Push one raw chunk through every stage. The result may be empty.
    pub fn push(&mut self, chunk: Bytes) -> Result<Bytes, StageError> {
        let mut data = chunk;
        for stage in self.stages.iter_mut() {
            if data.is_empty() {
                break;
            }
            data = stage.push(data)?;
        }
        Ok(data)
    }

    /// Flush every stage in order. Bytes flushed by one stage still pass through the later ones.
    pub fn finish(&mut self) -> Result<Bytes, StageError> {
        let mut carried = Bytes::new();
        for stage in self.stages.iter_mut() {
            let mut out = BytesMut::new();
            if !carried.is_empty() {
                out.extend_from_slice(&stage.push(carried)?);
            }
            out.extend_from_slice(&stage.finish()?);
            carried = out.freeze();
        }
        Ok(carried)
    }

    fn sniffer(&self) -> Option<&ContentSniffer> {
        self.stages.iter().find_map(|stage| match stage {
            Stage::Sniff(sniffer) => Some(sniffer),
            _ => None,
        })
    }

    /// `None` when the chain does not sniff.
    pub fn sniff_state(&self) -> Option<&SniffState> {
        self.sniffer().map(ContentSniffer::state)
    }

    /// Future resolving with the sniff result; `None` when the chain does not sniff.
    pub fn detect(&mut self) -> Option<impl Future<Output = Option<SniffResult>> + Send + 'static> {
        self.stages.iter_mut().find_map(|stage| match stage {
            Stage::Sniff(sniffer) => Some(sniffer.detect()),
            _ => None,
        })
    }
}
