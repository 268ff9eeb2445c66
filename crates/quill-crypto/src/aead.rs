//! AES-256-GCM sealing with cipher-owned nonces
//!
//! There is deliberately no entry point that takes a nonce for encryption.
//! [`seal_with_fresh_nonce`] draws the nonce, shows it to the caller so the
//! associated data (the container header, which embeds the nonce) can be
//! built, then encrypts under it.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm,
};
use quill_core::{QuillError, QuillResult};
use zeroize::Zeroizing;

use crate::kdf::DerivedKey;
use crate::random::fill_random;
use crate::{NONCE_SIZE, TAG_SIZE};

pub type Nonce = [u8; NONCE_SIZE];

/// Output of one seal.
#[derive(Debug, Clone)]
pub struct Sealed {
    /// The nonce drawn for this seal.
    pub nonce: Nonce,
    /// Associated data returned by the caller's builder, unchanged.
    pub aad: Vec<u8>,
    /// Ciphertext followed by the 16-byte tag.
    pub ciphertext: Vec<u8>,
}

/// Encrypt `plaintext` under `key` with a freshly generated nonce.
///
/// `build_aad` receives the nonce and returns the associated data to bind.
pub fn seal_with_fresh_nonce<F>(
    key: &DerivedKey,
    build_aad: F,
    plaintext: &[u8],
) -> QuillResult<Sealed>
where
    F: FnOnce(&Nonce) -> Vec<u8>,
{
    let mut nonce = [0u8; NONCE_SIZE];
    fill_random(&mut nonce)?;

    let aad = build_aad(&nonce);
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let ciphertext = cipher
        .encrypt(
            aes_gcm::Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: &aad,
            },
        )
        .map_err(|_| QuillError::Encryption)?;

    Ok(Sealed {
        nonce,
        aad,
        ciphertext,
    })
}

/// Decrypt and authenticate `ciphertext` (ciphertext || tag).
///
/// Any mismatch (wrong key, altered AAD, altered ciphertext, truncation)
/// yields [`QuillError::AuthenticationFailure`].
pub fn open(
    key: &DerivedKey,
    nonce: &Nonce,
    aad: &[u8],
    ciphertext: &[u8],
) -> QuillResult<Zeroizing<Vec<u8>>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(QuillError::AuthenticationFailure);
    }

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(
            aes_gcm::Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| QuillError::AuthenticationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KEY_SIZE;

    fn key(byte: u8) -> DerivedKey {
        DerivedKey::from_bytes([byte; KEY_SIZE])
    }

    fn header_with(nonce: &Nonce) -> Vec<u8> {
        let mut aad = b"HDR:".to_vec();
        aad.extend_from_slice(nonce);
        aad
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let k = key(1);
        let sealed = seal_with_fresh_nonce(&k, header_with, b"It began...").unwrap();

        assert_eq!(&sealed.aad[4..], &sealed.nonce);
        let plain = open(&k, &sealed.nonce, &sealed.aad, &sealed.ciphertext).unwrap();
        assert_eq!(plain.as_slice(), b"It began...");
    }

    #[test]
    fn test_ciphertext_size() {
        let sealed = seal_with_fresh_nonce(&key(1), |_| Vec::new(), &[0u8; 1000]).unwrap();
        assert_eq!(sealed.ciphertext.len(), 1000 + TAG_SIZE);
    }

    #[test]
    fn test_empty_plaintext() {
        let k = key(3);
        let sealed = seal_with_fresh_nonce(&k, |_| Vec::new(), b"").unwrap();
        let plain = open(&k, &sealed.nonce, &sealed.aad, &sealed.ciphertext).unwrap();
        assert!(plain.is_empty());
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let sealed = seal_with_fresh_nonce(&key(1), header_with, b"secret").unwrap();
        let err = open(&key(2), &sealed.nonce, &sealed.aad, &sealed.ciphertext).unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn test_aad_mismatch_fails_authentication() {
        let k = key(1);
        let sealed = seal_with_fresh_nonce(&k, header_with, b"secret").unwrap();
        let mut aad = sealed.aad.clone();
        aad[0] ^= 0x01;
        assert!(open(&k, &sealed.nonce, &aad, &sealed.ciphertext)
            .unwrap_err()
            .is_authentication_failure());
    }

    #[test]
    fn test_tampered_ciphertext_and_truncation() {
        let k = key(1);
        let sealed = seal_with_fresh_nonce(&k, |_| Vec::new(), b"secret data").unwrap();

        for i in 0..sealed.ciphertext.len() {
            let mut ct = sealed.ciphertext.clone();
            ct[i] ^= 0xFF;
            assert!(open(&k, &sealed.nonce, &[], &ct)
                .unwrap_err()
                .is_authentication_failure());
        }

        let short = &sealed.ciphertext[..TAG_SIZE - 1];
        assert!(open(&k, &sealed.nonce, &[], short)
            .unwrap_err()
            .is_authentication_failure());
    }

    #[test]
    fn test_nonces_are_fresh() {
        let k = key(1);
        let a = seal_with_fresh_nonce(&k, |_| Vec::new(), b"same").unwrap();
        let b = seal_with_fresh_nonce(&k, |_| Vec::new(), b"same").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }
}
