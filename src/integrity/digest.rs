//! SHA-256 helpers shared by hashing, seeding and locking.

use sha2::{Digest, Sha256};

/// Computes the lowercase hex SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Returns the first 8 bytes of the SHA-256 of `data` as a big-endian integer.
pub fn sha256_u64(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Derives the sub-seed a stage uses from the run seed and the stage name.
///
/// Two stages never share a random stream, and a stage's stream does not
/// depend on which other stages ran before it.
pub fn derive_seed(run_seed: u64, stage: &str) -> u64 {
    sha256_u64(format!("{}|{}", run_seed, stage).as_bytes())
}

/// Whether `value` looks like a hex SHA-256 digest.
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_u64_uses_leading_bytes() {
        assert_eq!(sha256_u64(b"abc"), 0xba7816bf8f01cfea);
    }

    #[test]
    fn test_derive_seed_is_stable_and_stage_specific() {
        assert_eq!(derive_seed(2025, "split"), derive_seed(2025, "split"));
        assert_ne!(derive_seed(2025, "split"), derive_seed(2025, "diversity"));
        assert_ne!(derive_seed(2025, "split"), derive_seed(2026, "split"));
    }

    #[test]
    fn test_is_sha256_hex() {
        assert!(is_sha256_hex(&sha256_hex(b"x")));
        assert!(!is_sha256_hex("abc"));
        assert!(!is_sha256_hex(&"G".repeat(64)));
    }
}
