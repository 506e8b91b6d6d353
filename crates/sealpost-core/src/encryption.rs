//! Streaming symmetric encryption for stored artifacts.
//!
//! Every encrypted artifact is laid out as `IV (16 bytes) || ciphertext`. The key is
//! the SHA-256 digest of the configured passphrase, so its length never depends on
//! the passphrase or on the selected algorithm.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::io::SeekFrom;
use std::path::Path;
use std::str::FromStr;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use aes::Aes256;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

/// Length of the initialization vector stored in front of every ciphertext.
pub const IV_LEN: usize = 16;

const BLOCK_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Stream of plaintext chunks produced by [`CipherStreamFactory::decrypt_file`].
pub type DecryptedStream = BoxStream<'static, Result<Bytes, CipherError>>;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("Unsupported cipher algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Encrypted source holds {0} bytes, shorter than the 16-byte IV")]
    TruncatedIv(usize),

    #[error("Ciphertext is corrupt or was produced with another key")]
    Corrupt,

    #[error("Invalid key or IV length")]
    InvalidLength,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Supported cipher algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CipherAlgorithm {
    #[default]
    Aes256Cbc,
    Aes256Ctr,
}

impl FromStr for CipherAlgorithm {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aes-256-cbc" | "aes256" => Ok(CipherAlgorithm::Aes256Cbc),
            "aes-256-ctr" => Ok(CipherAlgorithm::Aes256Ctr),
            other => Err(CipherError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl Display for CipherAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CipherAlgorithm::Aes256Cbc => write!(f, "aes-256-cbc"),
            CipherAlgorithm::Aes256Ctr => write!(f, "aes-256-ctr"),
        }
    }
}

/// Derive the 32-byte symmetric key from a passphrase.
pub fn derive_key(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Produces per-file cipher transforms from one passphrase-derived key.
#[derive(Clone)]
pub struct CipherStreamFactory {
    key: [u8; 32],
    algorithm: CipherAlgorithm,
}

impl std::fmt::Debug for CipherStreamFactory {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CipherStreamFactory")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// The transforms applied to one file: encrypt first, then prepend the IV.
pub struct CipherStreams {
    pub encrypt: Encryptor,
    pub prepend_iv: IvPrepend,
    pub iv: [u8; IV_LEN],
}

impl CipherStreamFactory {
    pub fn new(passphrase: &str, algorithm: CipherAlgorithm) -> Self {
        Self {
            key: derive_key(passphrase),
            algorithm,
        }
    }

    /// Build a factory from an optional algorithm name, defaulting to AES-256-CBC.
    pub fn from_options(passphrase: &str, algorithm: Option<&str>) -> Result<Self, CipherError> {
        let algorithm = match algorithm {
            Some(name) => name.parse()?,
            None => CipherAlgorithm::default(),
        };
        Ok(Self::new(passphrase, algorithm))
    }

    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }

    /// Fresh transforms with a newly generated IV.
    pub fn cipher_streams(&self) -> Result<CipherStreams, CipherError> {
        let iv: [u8; IV_LEN] = rand::random();
        Ok(CipherStreams {
            encrypt: self.encryptor(&iv)?,
            prepend_iv: IvPrepend::new(iv),
            iv,
        })
    }

    pub fn encryptor(&self, iv: &[u8; IV_LEN]) -> Result<Encryptor, CipherError> {
        let inner = match self.algorithm {
            CipherAlgorithm::Aes256Cbc => EncryptorInner::Cbc {
                cipher: Aes256CbcEnc::new_from_slices(&self.key, iv)
                    .map_err(|_| CipherError::InvalidLength)?,
                pending: Vec::with_capacity(BLOCK_LEN),
            },
            CipherAlgorithm::Aes256Ctr => EncryptorInner::Ctr(
                Aes256Ctr::new_from_slices(&self.key, iv)
                    .map_err(|_| CipherError::InvalidLength)?,
            ),
        };
        Ok(Encryptor { inner })
    }

    pub fn decryptor(&self, iv: &[u8; IV_LEN]) -> Result<Decryptor, CipherError> {
        let inner = match self.algorithm {
            CipherAlgorithm::Aes256Cbc => DecryptorInner::Cbc {
                cipher: Aes256CbcDec::new_from_slices(&self.key, iv)
                    .map_err(|_| CipherError::InvalidLength)?,
                pending: Vec::with_capacity(BLOCK_LEN * 2),
            },
            CipherAlgorithm::Aes256Ctr => DecryptorInner::Ctr(
                Aes256Ctr::new_from_slices(&self.key, iv)
                    .map_err(|_| CipherError::InvalidLength)?,
            ),
        };
        Ok(Decryptor { inner })
    }

    /// Open an encrypted artifact and return its plaintext as a stream.
    ///
    /// The IV is read with its own handle; the ciphertext is read by a second handle
    /// positioned at byte 16.
    pub async fn decrypt_file(&self, path: impl AsRef<Path>) -> Result<DecryptedStream, CipherError> {
        let path = path.as_ref();

        let mut iv = [0u8; IV_LEN];
        {
            let mut head = File::open(path).await?;
            let mut filled = 0;
            while filled < IV_LEN {
                let n = head.read(&mut iv[filled..]).await?;
                if n == 0 {
                    return Err(CipherError::TruncatedIv(filled));
                }
                filled += n;
            }
        }

        let mut body = File::open(path).await?;
        body.seek(SeekFrom::Start(IV_LEN as u64)).await?;

        let decryptor = self.decryptor(&iv)?;
        let chunks = ReaderStream::new(body);

        let plaintext = stream::unfold(
            (chunks, Some(decryptor)),
            |(mut chunks, mut decryptor)| async move {
                let current = decryptor.as_mut()?;
                match chunks.next().await {
                    Some(Ok(chunk)) => {
                        let out = current.update(&chunk);
                        Some((Ok(out), (chunks, decryptor)))
                    }
                    Some(Err(e)) => Some((Err(CipherError::Io(e)), (chunks, None))),
                    None => {
                        let last = decryptor.take()?.finish();
                        Some((last, (chunks, None)))
                    }
                }
            },
        );

        Ok(plaintext.boxed())
    }

    /// Encrypt a whole buffer into the `IV || ciphertext` layout.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let CipherStreams {
            mut encrypt,
            mut prepend_iv,
            ..
        } = self.cipher_streams()?;

        let mut out = Vec::with_capacity(IV_LEN + plaintext.len() + BLOCK_LEN);
        out.extend_from_slice(&prepend_iv.push(encrypt.update(plaintext)));
        out.extend_from_slice(&prepend_iv.push(encrypt.finish()));
        out.extend_from_slice(&prepend_iv.finish());
        Ok(out)
    }

    /// Decrypt a whole `IV || ciphertext` buffer.
    pub fn decrypt_bytes(&self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        if data.len() < IV_LEN {
            return Err(CipherError::TruncatedIv(data.len()));
        }
        let (iv_bytes, ciphertext) = data.split_at(IV_LEN);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(iv_bytes);

        let mut decryptor = self.decryptor(&iv)?;
        let mut out = decryptor.update(ciphertext).to_vec();
        out.extend_from_slice(&decryptor.finish()?);
        Ok(out)
    }
}

enum EncryptorInner {
    Cbc {
        cipher: Aes256CbcEnc,
        pending: Vec<u8>,
    },
    Ctr(Aes256Ctr),
}

/// Incremental encryption transform.
pub struct Encryptor {
    inner: EncryptorInner,
}

impl Encryptor {
    /// Encrypt the next chunk. CBC output lags by up to one partial block.
    pub fn update(&mut self, chunk: &[u8]) -> Bytes {
        match &mut self.inner {
            EncryptorInner::Cbc { cipher, pending } => {
                pending.extend_from_slice(chunk);
                let ready = pending.len() / BLOCK_LEN * BLOCK_LEN;
                let mut out: Vec<u8> = pending.drain(..ready).collect();
                for block in out.chunks_exact_mut(BLOCK_LEN) {
                    cipher.encrypt_block_mut(GenericArray::from_mut_slice(block));
                }
                Bytes::from(out)
            }
            EncryptorInner::Ctr(cipher) => {
                let mut out = chunk.to_vec();
                cipher.apply_keystream(&mut out);
                Bytes::from(out)
            }
        }
    }

    /// Flush the final (PKCS#7 padded) block.
    pub fn finish(self) -> Bytes {
        match self.inner {
            EncryptorInner::Cbc { cipher, pending } => {
                Bytes::from(cipher.encrypt_padded_vec_mut::<Pkcs7>(&pending))
            }
            EncryptorInner::Ctr(_) => Bytes::new(),
        }
    }
}

enum DecryptorInner {
    Cbc {
        cipher: Aes256CbcDec,
        pending: Vec<u8>,
    },
    Ctr(Aes256Ctr),
}

/// Incremental decryption transform.
pub struct Decryptor {
    inner: DecryptorInner,
}

impl Decryptor {
    /// Decrypt the next chunk. CBC holds back the last block until `finish` so the
    /// padding can be stripped.
    pub fn update(&mut self, chunk: &[u8]) -> Bytes {
        match &mut self.inner {
            DecryptorInner::Cbc { cipher, pending } => {
                pending.extend_from_slice(chunk);
                let ready = pending.len().saturating_sub(1) / BLOCK_LEN * BLOCK_LEN;
                let mut out: Vec<u8> = pending.drain(..ready).collect();
                for block in out.chunks_exact_mut(BLOCK_LEN) {
                    cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
                Bytes::from(out)
            }
            DecryptorInner::Ctr(cipher) => {
                let mut out = chunk.to_vec();
                cipher.apply_keystream(&mut out);
                Bytes::from(out)
            }
        }
    }

    pub fn finish(self) -> Result<Bytes, CipherError> {
        match self.inner {
            DecryptorInner::Cbc { cipher, pending } => {
                if pending.len() != BLOCK_LEN {
                    return Err(CipherError::Corrupt);
                }
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(&pending)
                    .map(Bytes::from)
                    .map_err(|_| CipherError::Corrupt)
            }
            DecryptorInner::Ctr(_) => Ok(Bytes::new()),
        }
    }
}

/// Emits the IV once, in front of the first ciphertext bytes.
pub struct IvPrepend {
    iv: Option<[u8; IV_LEN]>,
}

impl IvPrepend {
    pub fn new(iv: [u8; IV_LEN]) -> Self {
        Self { iv: Some(iv) }
    }

    pub fn push(&mut self, chunk: Bytes) -> Bytes {
        if chunk.is_empty() {
            return chunk;
        }
        match self.iv.take() {
            Some(iv) => {
                let mut out = BytesMut::with_capacity(IV_LEN + chunk.len());
                out.put_slice(&iv);
                out.put_slice(&chunk);
                out.freeze()
            }
            None => chunk,
        }
    }

    /// Returns the IV if no ciphertext was ever pushed (empty CTR payloads).
    pub fn finish(&mut self) -> Bytes {
        self.iv
            .take()
            .map(|iv| Bytes::copy_from_slice(&iv))
            .unwrap_or_default()
    }
}
