//! Expands a raw ECDH shared secret into a 32-byte symmetric key via
//! HKDF-SHA256 with empty salt and empty info (§4.1).
//!
//! The resulting 32 bytes are used directly as an AES-256-GCM key — no
//! Fernet/base64 indirection, per the resolved open question in the design.

use hkdf::Hkdf;
use sha2::Sha256;

pub type SymmetricKey = [u8; 32];

pub fn derive(shared_secret: &[u8]) -> SymmetricKey {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut out = [0u8; 32];
    hk.expand(&[], &mut out)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    out
}
