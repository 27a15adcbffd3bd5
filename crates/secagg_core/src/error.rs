//! Error kinds for the secure aggregation protocol.
//!
//! Per-participant failures (decryption, bad signature, timeout, transport) are
//! logged and drop the participant from the cohort; they never reach here as a
//! propagated `Err` to the strategy. Only coordinator-level failures and a
//! participant's own handler errors are returned.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecAggError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("threshold unmet at {stage}: have {have}, need {need}")]
    ThresholdUnmet {
        stage: &'static str,
        have: usize,
        need: usize,
    },

    #[error("duplicate public key in ShareKeys input")]
    DuplicatePublicKey,

    #[error("signature verification failed for peer {peer}")]
    SignatureInvalid { peer: u32 },

    #[error("own key bundle in ShareKeys input does not match AskKeys output")]
    SelfKeyMismatch,

    #[error("packet misrouted or envelope/plaintext mismatch")]
    PacketMisrouted,

    #[error("AEAD decryption failed")]
    DecryptionFailure,

    #[error("failed to reconstruct secret for owner {owner}: fewer than threshold shares collected")]
    ReconstructionFailed { owner: u32 },

    #[error("handler invoked out of order: expected {expected}, got {got}")]
    OutOfOrder {
        expected: &'static str,
        got: &'static str,
    },

    #[error("participant request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("ragged tensor shape mismatch")]
    ShapeMismatch,

    #[error("signing error: {0}")]
    Signing(String),

    #[error("key encoding error: {0}")]
    KeyEncoding(String),

    #[error("secret sharing error: {0}")]
    SecretSharing(String),
}

pub type Result<T> = core::result::Result<T, SecAggError>;
