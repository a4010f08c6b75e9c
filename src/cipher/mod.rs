//! Pluggable chunk ciphers.
//!
//! This module provides:
//! - [`NopCipher`]: identity transform
//! - [`ByteMapCipher`]: random byte-substitution table
//! - [`Base64Cipher`]: unpadded base64 text encoding
//!
//! A cipher transforms whatever chunk the transport hands it. Chunk
//! boundaries are decided by the read buffer, not by any framing, so only
//! ciphers that work byte-by-byte survive re-chunking on the wire.
//! [`Base64Cipher`] does not: see its docs.
//!
//! Ciphers are built once at startup and shared by every tunnel through an
//! `Arc<dyn Cipher>`, so implementations must be safe for concurrent use.

mod b64;
mod byte_map;
mod nop;

pub use b64::Base64Cipher;
pub use byte_map::ByteMapCipher;
pub use nop::NopCipher;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of entries in a substitution table (one per byte value)
pub const TABLE_SIZE: usize = 256;

/// A symmetric transform applied independently to each I/O chunk.
pub trait Cipher: Send + Sync {
    /// Transform plaintext bytes for the wire.
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverse [`Cipher::encrypt`].
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Upper bound on the wire size of `plain_len` encrypted bytes.
    ///
    /// Readers size their raw reads with this so one chunk that decrypts to
    /// at most `plain_len` bytes is never cut short.
    fn max_encoded_len(&self, plain_len: usize) -> usize {
        plain_len
    }
}

/// Which cipher to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherKind {
    /// Identity transform
    #[default]
    Nop,
    /// Byte-substitution table
    Table,
    /// Base64 text encoding
    Base64,
}

/// Cipher selection as it appears in configuration files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherConfig {
    /// Cipher variant
    #[serde(default)]
    pub kind: CipherKind,

    /// Base64-encoded substitution table, shared by both ends (table only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Seed for a deterministic table when no explicit table is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl CipherConfig {
    /// Configuration for the given variant with no table material.
    pub fn new(kind: CipherKind) -> Self {
        Self {
            kind,
            table: None,
            seed: None,
        }
    }

    /// Configuration carrying a freshly generated substitution table.
    pub fn random_table() -> Self {
        Self {
            kind: CipherKind::Table,
            table: Some(ByteMapCipher::random().to_base64()),
            seed: None,
        }
    }

    /// Build the shared cipher instance.
    ///
    /// A table cipher is taken from `table` if present, then from `seed`.
    /// With neither, a random table is generated; that only works when both
    /// ends live in the same process.
    pub fn build(&self) -> Result<Arc<dyn Cipher>> {
        let cipher: Arc<dyn Cipher> = match self.kind {
            CipherKind::Nop => Arc::new(NopCipher::new()),
            CipherKind::Base64 => Arc::new(Base64Cipher::new()),
            CipherKind::Table => match (&self.table, self.seed) {
                (Some(encoded), _) => Arc::new(ByteMapCipher::from_base64(encoded)?),
                (None, Some(seed)) => Arc::new(ByteMapCipher::from_seed(seed)),
                (None, None) => {
                    tracing::warn!("no table configured, generating a process-local one");
                    Arc::new(ByteMapCipher::random())
                }
            },
        };
        Ok(cipher)
    }

    /// Whether separate processes building this config get the same cipher.
    pub fn is_shareable(&self) -> bool {
        self.kind != CipherKind::Table || self.table.is_some() || self.seed.is_some()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.kind != CipherKind::Table && (self.table.is_some() || self.seed.is_some()) {
            return Err(Error::config("table and seed only apply to the table cipher"));
        }
        if let Some(encoded) = &self.table {
            ByteMapCipher::from_base64(encoded)?;
        }
        Ok(())
    }
}
