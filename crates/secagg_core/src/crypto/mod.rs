//! Cryptographic primitives for the protocol: key agreement and signatures
//! (`keys`), key derivation (`kdf`), authenticated encryption (`aead`), the
//! mask generator (`prg`), and dropout-tolerant secret sharing (`shamir`).

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod prg;
pub mod shamir;
