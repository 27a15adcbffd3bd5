//! Authenticated encryption for share packets (§4.1): AES-256-GCM under the
//! HKDF-derived 32-byte key, self-authenticated ciphertext with a random
//! 96-bit nonce prepended.

use crate::crypto::kdf::SymmetricKey;
use crate::error::{Result, SecAggError};
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};

const NONCE_LEN: usize = 12;

pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .expect("AES-256-GCM encryption over a bounded plaintext cannot fail");
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce.as_slice());
    out.extend_from_slice(&ciphertext);
    out
}

pub fn decrypt(key: &SymmetricKey, packet: &[u8]) -> Result<Vec<u8>> {
    if packet.len() < NONCE_LEN {
        return Err(SecAggError::DecryptionFailure);
    }
    let (nonce, ciphertext) = packet.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(nonce.into(), ciphertext)
        .map_err(|_| SecAggError::DecryptionFailure)
}
