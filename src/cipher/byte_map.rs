//! Byte-substitution cipher.
//!
//! Each byte is replaced through a fixed permutation of the 256 byte values.
//! The permutation is drawn from an RNG owned by the constructor call, so a
//! fixed seed always yields the same table and no global generator is
//! touched.

use ::base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::cipher::{Cipher, TABLE_SIZE};
use crate::error::{Error, Result};

/// Substitution cipher over a random byte permutation.
#[derive(Clone)]
pub struct ByteMapCipher {
    table: [u8; TABLE_SIZE],
    reversed: [u8; TABLE_SIZE],
}

impl ByteMapCipher {
    /// Build a table from OS entropy.
    pub fn random() -> Self {
        Self::shuffled(&mut StdRng::from_entropy())
    }

    /// Build a deterministic table from a seed.
    pub fn from_seed(seed: u64) -> Self {
        Self::shuffled(&mut StdRng::seed_from_u64(seed))
    }

    /// Use an explicit forward table.
    ///
    /// # Errors
    ///
    /// Fails unless every byte value appears exactly once.
    pub fn from_table(table: [u8; TABLE_SIZE]) -> Result<Self> {
        let mut reversed = [0u8; TABLE_SIZE];
        let mut seen = [false; TABLE_SIZE];

        for (plain, &mapped) in table.iter().enumerate() {
            if seen[mapped as usize] {
                return Err(Error::cipher(format!(
                    "table maps more than one byte to {:#04x}",
                    mapped
                )));
            }
            seen[mapped as usize] = true;
            reversed[mapped as usize] = plain as u8;
        }

        Ok(Self { table, reversed })
    }

    /// Decode a table exported with [`ByteMapCipher::to_base64`].
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::cipher(format!("invalid base64 table: {}", e)))?;
        let table: [u8; TABLE_SIZE] = bytes.try_into().map_err(|bytes: Vec<u8>| Error::Buffer {
            expected: TABLE_SIZE,
            actual: bytes.len(),
        })?;
        Self::from_table(table)
    }

    /// Export the forward table so the other end can load it.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.table)
    }

    /// The forward table.
    pub fn table(&self) -> &[u8; TABLE_SIZE] {
        &self.table
    }

    fn shuffled(rng: &mut StdRng) -> Self {
        let mut table = [0u8; TABLE_SIZE];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = i as u8;
        }
        table.shuffle(rng);

        let mut reversed = [0u8; TABLE_SIZE];
        for (plain, &mapped) in table.iter().enumerate() {
            reversed[mapped as usize] = plain as u8;
        }
        Self { table, reversed }
    }
}

impl Cipher for ByteMapCipher {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.iter().map(|&b| self.table[b as usize]).collect())
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.iter().map(|&b| self.reversed[b as usize]).collect())
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

impl std::fmt::Debug for ByteMapCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The table is the key; keep it out of logs.
        f.debug_struct("ByteMapCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_roundtrip() {
        let cipher = ByteMapCipher::random();
        for b in 0..=255u8 {
            let encrypted = cipher.encrypt(&[b]).unwrap();
            assert_eq!(encrypted.len(), 1);
            assert_eq!(cipher.decrypt(&encrypted).unwrap(), vec![b]);
        }
    }

    #[test]
    fn test_table_is_bijection() {
        let cipher = ByteMapCipher::random();
        let mut seen = [0u32; TABLE_SIZE];
        for &mapped in cipher.table() {
            seen[mapped as usize] += 1;
        }
        assert!(seen.iter().all(|&count| count == 1));

        for b in 0..TABLE_SIZE {
            assert_eq!(cipher.reversed[cipher.table[b] as usize] as usize, b);
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = ByteMapCipher::from_seed(42);
        let b = ByteMapCipher::from_seed(42);
        let c = ByteMapCipher::from_seed(43);

        assert_eq!(a.table(), b.table());
        assert_ne!(a.table(), c.table());
    }

    #[test]
    fn test_independent_instances_incompatible() {
        let a = ByteMapCipher::from_seed(1);
        let b = ByteMapCipher::from_seed(2);
        let data: Vec<u8> = (0..=255).collect();

        let wire = a.encrypt(&data).unwrap();
        assert_ne!(b.decrypt(&wire).unwrap(), data);
    }

    #[test]
    fn test_survives_rechunking() {
        let cipher = ByteMapCipher::random();
        let data = b"the quick brown fox jumps over the lazy dog";
        let wire = cipher.encrypt(data).unwrap();

        let (left, right) = wire.split_at(13);
        let mut decoded = cipher.decrypt(left).unwrap();
        decoded.extend(cipher.decrypt(right).unwrap());
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_export_roundtrip() {
        let cipher = ByteMapCipher::random();
        let restored = ByteMapCipher::from_base64(&cipher.to_base64()).unwrap();
        assert_eq!(cipher.table(), restored.table());
    }

    #[test]
    fn test_rejects_non_permutation() {
        let mut table = [0u8; TABLE_SIZE];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = i as u8;
        }
        table[10] = 11;

        assert!(matches!(
            ByteMapCipher::from_table(table),
            Err(Error::Cipher(_))
        ));
    }

    #[test]
    fn test_rejects_short_table() {
        let encoded = STANDARD.encode([1u8, 2, 3]);
        assert!(matches!(
            ByteMapCipher::from_base64(&encoded),
            Err(Error::Buffer { expected: 256, actual: 3 })
        ));
    }
}
