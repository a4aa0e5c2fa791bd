//! Secure random number generation.
//!
//! Wraps the operating system's entropy source (e.g., /dev/urandom on Unix,
//! BCryptGenRandom on Windows).

use rand::RngCore;
use rand_core::OsRng;

/// Cryptographically secure random number generator.
pub struct SecureRandom;

impl SecureRandom {
    /// Fill a buffer with cryptographically secure random bytes.
    pub fn fill(dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }

    /// Generate a fixed-size array of random bytes.
    pub fn bytes<const N: usize>() -> [u8; N] {
        let mut buf = [0u8; N];
        OsRng.fill_bytes(&mut buf);
        buf
    }
}

/// Generate random padding of the specified length.
///
/// Padding bytes are drawn from the CSPRNG so padded frames are
/// indistinguishable from data-bearing ones after encryption boundaries.
pub fn random_padding(len: usize) -> Vec<u8> {
    let mut padding = vec![0u8; len];
    SecureRandom::fill(&mut padding);
    padding
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_random_fill() {
        let mut buf1 = [0u8; 32];
        let mut buf2 = [0u8; 32];

        SecureRandom::fill(&mut buf1);
        SecureRandom::fill(&mut buf2);

        assert!(!buf1.iter().all(|&b| b == 0));
        assert_ne!(buf1, buf2);
    }

    #[test]
    fn test_secure_random_bytes() {
        let bytes1: [u8; 16] = SecureRandom::bytes();
        let bytes2: [u8; 16] = SecureRandom::bytes();
        assert_ne!(bytes1, bytes2);
    }

    #[test]
    fn test_random_padding() {
        let padding = random_padding(100);
        assert_eq!(padding.len(), 100);

        // All zeros is astronomically unlikely with real entropy
        assert!(!padding.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_random_padding_empty() {
        assert!(random_padding(0).is_empty());
    }
}
