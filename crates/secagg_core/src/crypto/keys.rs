//! Key generation, DER (de)serialization, ECDH, and ECDSA over NIST P-384.
//!
//! Public keys travel as DER `SubjectPublicKeyInfo`; private keys as DER
//! PKCS#8, unencrypted (§4.1). The protocol's signature is taken over
//! SHA-256 of the signed payload regardless of the P-384 curve choice, per
//! §4.1 — the curve is picked for its 192-bit security level, the hash is
//! pinned independently.

use crate::error::{Result, SecAggError};
use ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use elliptic_curve::sec1::ToEncodedPoint;
use p384::ecdsa::{Signature, SigningKey, VerifyingKey};
use p384::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use p384::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};

/// A static Diffie-Hellman keypair, used for both the `sk1`/`pk1` (pairwise
/// mask) and `sk2`/`pk2` (share-encryption) roles.
#[derive(Clone)]
pub struct DhKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl DhKeyPair {
    pub fn generate() -> Self {
        let secret = SecretKey::random(&mut rand::rngs::OsRng);
        let public = secret.public_key();
        DhKeyPair { secret, public }
    }

    /// DER PKCS#8, unencrypted.
    pub fn private_key_der(&self) -> Result<Vec<u8>> {
        self.secret
            .to_pkcs8_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| SecAggError::KeyEncoding(e.to_string()))
    }

    pub fn from_private_key_der(der: &[u8]) -> Result<Self> {
        let secret =
            SecretKey::from_pkcs8_der(der).map_err(|e| SecAggError::KeyEncoding(e.to_string()))?;
        let public = secret.public_key();
        Ok(DhKeyPair { secret, public })
    }

    /// DER `SubjectPublicKeyInfo`.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        self.public
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| SecAggError::KeyEncoding(e.to_string()))
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// ECDH shared secret (raw, not yet run through the KDF).
    pub fn diffie_hellman(&self, peer_public_der: &[u8]) -> Result<[u8; 48]> {
        let peer = decode_public_key(peer_public_der)?;
        let shared = elliptic_curve::ecdh::diffie_hellman(
            self.secret.to_nonzero_scalar(),
            peer.as_affine(),
        );
        let mut out = [0u8; 48];
        out.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(out)
    }
}

pub fn decode_public_key(der: &[u8]) -> Result<PublicKey> {
    PublicKey::from_public_key_der(der).map_err(|e| SecAggError::KeyEncoding(e.to_string()))
}

/// Returns the uncompressed SEC1 point encoding, used only to give peer
/// public keys a stable byte identity for duplicate-detection (§4.4 H2 step 2).
pub fn public_key_fingerprint(der: &[u8]) -> Result<Vec<u8>> {
    let key = decode_public_key(der)?;
    Ok(key.to_encoded_point(false).as_bytes().to_vec())
}

/// ECDSA signing keypair, used to sign `[pk1_bytes, pk2_bytes]` once per round.
pub struct SigningKeyPair {
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        let signing = SigningKey::random(&mut rand::rngs::OsRng);
        let verifying = *signing.verifying_key();
        SigningKeyPair { signing, verifying }
    }

    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        self.verifying
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| SecAggError::KeyEncoding(e.to_string()))
    }

    /// Sign the SHA-256 digest of `message`.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha256::digest(message);
        let signature: Signature = self
            .signing
            .sign_prehash(&digest)
            .map_err(|e| SecAggError::Signing(e.to_string()))?;
        Ok(signature.to_der().as_bytes().to_vec())
    }
}

/// Verify `signature` (DER-encoded) over the SHA-256 digest of `message`
/// under the DER-encoded verifying key `sig_pub_der`.
pub fn verify(sig_pub_der: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let verifying = VerifyingKey::from_public_key_der(sig_pub_der)
        .map_err(|e| SecAggError::KeyEncoding(e.to_string()))?;
    let signature = Signature::from_der(signature).map_err(|e| SecAggError::Signing(e.to_string()))?;
    let digest = Sha256::digest(message);
    Ok(verifying.verify_prehash(&digest, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_roundtrips_through_der() {
        let pair = DhKeyPair::generate();
        let der = pair.public_key_der().unwrap();
        let restored = DhKeyPair::from_private_key_der(&pair.private_key_der().unwrap()).unwrap();
        assert_eq!(der, restored.public_key_der().unwrap());
    }

    #[test]
    fn ecdh_shared_secret_agrees() {
        let alice = DhKeyPair::generate();
        let bob = DhKeyPair::generate();
        let alice_shared = alice.diffie_hellman(&bob.public_key_der().unwrap()).unwrap();
        let bob_shared = bob.diffie_hellman(&alice.public_key_der().unwrap()).unwrap();
        assert_eq!(alice_shared, bob_shared);
    }

    #[test]
    fn signature_verifies() {
        let signer = SigningKeyPair::generate();
        let msg = b"pk1 || pk2";
        let sig = signer.sign(msg).unwrap();
        let pub_der = signer.public_key_der().unwrap();
        assert!(verify(&pub_der, msg, &sig).unwrap());
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let signer = SigningKeyPair::generate();
        let msg = b"pk1 || pk2";
        let mut sig = signer.sign(msg).unwrap();
        let last = sig.len() - 1;
        sig[last] ^= 0xFF;
        let pub_der = signer.public_key_der().unwrap();
        assert!(verify(&pub_der, msg, &sig).is_err() || !verify(&pub_der, msg, &sig).unwrap());
    }
}
