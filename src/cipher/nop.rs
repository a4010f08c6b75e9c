//! Identity cipher.

use crate::cipher::Cipher;
use crate::error::Result;

/// Passes bytes through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopCipher;

impl NopCipher {
    /// Create a new identity cipher.
    pub fn new() -> Self {
        NopCipher
    }
}

impl Cipher for NopCipher {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn name(&self) -> &'static str {
        "nop"
    }
}
