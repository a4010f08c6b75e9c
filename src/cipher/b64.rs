//! Base64 text "cipher".
//!
//! Encodes every chunk with the standard alphabet and no padding. This is a
//! block encoding pretending to be a stream cipher: decoding only works on
//! the exact output of one `encrypt` call. When the transport re-chunks the
//! encoded bytes (a short read, a coalesced write) the receiving side decodes
//! garbage or fails outright. Both ends of a tunnel must therefore see the
//! same chunk boundaries, which TCP does not promise.

use ::base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};

use crate::cipher::Cipher;
use crate::error::{Error, Result};

/// Unpadded base64 encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Cipher;

impl Base64Cipher {
    /// Create a new base64 cipher.
    pub fn new() -> Self {
        Base64Cipher
    }
}

impl Cipher for Base64Cipher {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(STANDARD_NO_PAD.encode(data).into_bytes())
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        STANDARD_NO_PAD
            .decode(data)
            .map_err(|e| Error::cipher(format!("invalid base64 chunk: {}", e)))
    }

    fn name(&self) -> &'static str {
        "base64"
    }

    fn max_encoded_len(&self, plain_len: usize) -> usize {
        // Four symbols per three bytes, unpadded tail
        (plain_len * 4 + 2) / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_unsplit() {
        let cipher = Base64Cipher::new();
        let data = b"Hello, World!";

        let encoded = cipher.encrypt(data).unwrap();
        assert_eq!(encoded, b"SGVsbG8sIFdvcmxkIQ");
        assert_eq!(cipher.decrypt(&encoded).unwrap(), data);
    }

    #[test]
    fn test_max_encoded_len_is_exact() {
        let cipher = Base64Cipher::new();
        for len in [0usize, 1, 2, 3, 4, 5, 247, 262, 4096] {
            let encoded = cipher.encrypt(&vec![0xffu8; len]).unwrap();
            assert_eq!(cipher.max_encoded_len(len), encoded.len(), "len {}", len);
        }
    }

    #[test]
    fn test_empty_input() {
        let cipher = Base64Cipher::new();
        assert!(cipher.encrypt(&[]).unwrap().is_empty());
        assert!(cipher.decrypt(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_alphabet() {
        let cipher = Base64Cipher::new();
        assert!(matches!(cipher.decrypt(b"not*base64!"), Err(Error::Cipher(_))));
    }

    // Splitting the encoded output across two decrypt calls only works when
    // the split lands on a 4-character group boundary. Everywhere else the
    // result is either an error or different bytes.
    #[test]
    fn test_split_decode_corrupts() {
        let cipher = Base64Cipher::new();
        let data: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(37)).collect();
        let encoded = cipher.encrypt(&data).unwrap();

        let mut corrupted = 0;
        let mut intact = 0;
        for split in 1..encoded.len() {
            let (left, right) = encoded.split_at(split);
            let joined = match (cipher.decrypt(left), cipher.decrypt(right)) {
                (Ok(mut a), Ok(b)) => {
                    a.extend(b);
                    Some(a)
                }
                _ => None,
            };
            if joined.as_deref() == Some(data.as_slice()) {
                intact += 1;
            } else {
                corrupted += 1;
            }
        }

        assert!(corrupted > intact);
        // Only group-aligned splits survive
        assert_eq!(intact, (encoded.len() - 1) / 4);
    }
}
