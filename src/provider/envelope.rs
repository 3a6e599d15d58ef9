//! Local sealing with an unwrapped data key.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{BenchError, Result};

/// Length of a data-encryption key in bytes
pub const DATA_KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// Plaintext data key; zeroed on drop
pub struct DataKey(Zeroizing<Vec<u8>>);

/// Ciphertext with the nonce it was sealed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl DataKey {
    /// Take ownership of unwrapped key bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let bytes = Zeroizing::new(bytes);
        if bytes.len() != DATA_KEY_LEN {
            return Err(BenchError::Crypto(format!(
                "data key must be {} bytes, got {}",
                DATA_KEY_LEN,
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Fresh random key
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; DATA_KEY_LEN]);
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Seal `plaintext` under a random nonce
    pub fn seal(&self, plaintext: &[u8]) -> Result<Sealed> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| BenchError::Crypto("sealing failed".to_string()))?;

        Ok(Sealed { nonce, ciphertext })
    }

    /// Open a payload sealed under this key
    pub fn open(&self, sealed: &Sealed) -> Result<Vec<u8>> {
        self.cipher()
            .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_slice())
            .map_err(|_| BenchError::Crypto("authentication failed".to_string()))
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey(..)")
    }
}

impl Sealed {
    /// `nonce || ciphertext`, the layout used for wrapped keys
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() <= NONCE_LEN {
            return Err(BenchError::Crypto("sealed blob too short".to_string()));
        }
        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let mut n = [0u8; NONCE_LEN];
        n.copy_from_slice(nonce);
        Ok(Self {
            nonce: n,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let key = DataKey::generate();
        let sealed = key.seal(b"foo").unwrap();

        assert_ne!(sealed.ciphertext, b"foo".to_vec());
        assert_eq!(key.open(&sealed).unwrap(), b"foo".to_vec());
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let sealed = DataKey::generate().seal(b"foo").unwrap();
        let err = DataKey::generate().open(&sealed).unwrap_err();
        assert!(matches!(err, BenchError::Crypto(_)));
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(DataKey::from_bytes(vec![0u8; 16]).is_err());
        assert!(DataKey::from_bytes(vec![7u8; DATA_KEY_LEN]).is_ok());
    }

    #[test]
    fn test_sealed_bytes_layout() {
        let sealed = DataKey::generate().seal(b"payload").unwrap();
        let bytes = sealed.to_bytes();
        assert_eq!(&bytes[..NONCE_LEN], &sealed.nonce);
        assert_eq!(Sealed::from_bytes(&bytes).unwrap(), sealed);
        assert!(Sealed::from_bytes(&bytes[..NONCE_LEN]).is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let key = DataKey::from_bytes(vec![0xAB; DATA_KEY_LEN]).unwrap();
        assert_eq!(format!("{key:?}"), "DataKey(..)");
    }
}
