//! Typed envelopes exchanged between coordinator and participant across the
//! five rounds (§3, §4.4). Everything here is `bincode`-serializable; no
//! delimiter-joined strings anywhere on the wire.

use crate::config::SecAggConfig;
use crate::crypto::shamir::SecretShare;
use crate::vector::{FloatVector, ModVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A participant's identifier within one aggregation round, `[0, sample_num)`.
pub type ParticipantId = u32;

/// H0 input: the round's configuration plus this participant's own id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupParams {
    pub config: SecAggConfig,
    pub sec_agg_id: ParticipantId,
}

/// H1 output: one participant's public key material, signed as a bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyShareBundle {
    /// DER SPKI of the pairwise-mask DH key.
    pub pk1: Vec<u8>,
    /// DER SPKI of the share-encryption DH key.
    pub pk2: Vec<u8>,
    /// DER SPKI of the ECDSA verifying key.
    pub sig_pub: Vec<u8>,
    /// DER signature over `bincode([pk1, pk2])`, signed with the matching
    /// ECDSA private key.
    pub signature: Vec<u8>,
}

/// H2 input: the restricted view of the round's public key bundles this
/// participant is allowed to see (§4.5 Stage 2).
pub type PublicKeysView = BTreeMap<ParticipantId, KeyShareBundle>;

/// Plaintext carried inside a [`SharePacket`]'s ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePlaintext {
    pub source: ParticipantId,
    pub destination: ParticipantId,
    pub b_share: SecretShare,
    pub sk1_share: SecretShare,
}

/// H2 output: one encrypted share delivery, addressed by id (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharePacket {
    pub source: ParticipantId,
    pub destination: ParticipantId,
    pub ciphertext: Vec<u8>,
}

/// The strategy's per-participant contribution for this round (§6): a
/// parameters blob plus its integer weight. Built directly via
/// [`FitIns::new`] in tests and by the strategy in production — there is no
/// hidden test-mode branch in the protocol core (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitIns {
    pub parameters: FloatVector,
    pub weights_factor: u64,
}

impl FitIns {
    pub fn new(parameters: FloatVector, weights_factor: u64) -> Self {
        FitIns {
            parameters,
            weights_factor,
        }
    }
}

/// H3 input: this participant's forwarded share packets plus its own round
/// contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskVectorsRequest {
    pub packets: Vec<SharePacket>,
    pub fit_ins: FitIns,
}

/// H3 output: the masked, quantized, weighted vector with the leading
/// `weights_factor` singleton already prepended (§4.4 H3 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskVectorsResponse {
    pub masked_vector: ModVector,
}

/// H4 input: the neighbourhood-restricted available/dropout partition this
/// participant must disclose shares for. The two sets are disjoint by
/// construction (§4.4 H4 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmaskVectorsRequest {
    pub available: Vec<ParticipantId>,
    pub dropout: Vec<ParticipantId>,
}

/// H4 output: one share per id in the union of `available` and `dropout`.
/// Whether a given entry is a `b_share` or an `sk1_share` is determined by
/// which side of the partition its id fell on, not by anything in this
/// response — the coordinator already knows which is which.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmaskVectorsResponse {
    pub shares: BTreeMap<ParticipantId, SecretShare>,
}
