//! Per-participant state machine (§4.4): five handlers driven in strict
//! order by an internal phase tag. Each handler owns exactly the state it
//! needs and discards nothing until the round itself ends.

use crate::config::SecAggConfig;
use crate::crypto::keys::{DhKeyPair, SigningKeyPair};
use crate::crypto::shamir::{self, SecretShare};
use crate::crypto::{aead, kdf};
use crate::error::{Result, SecAggError};
use crate::message::{
    AskVectorsRequest, AskVectorsResponse, KeyShareBundle, ParticipantId, PublicKeysView,
    SharePacket, SharePlaintext, SetupParams, UnmaskVectorsRequest, UnmaskVectorsResponse,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParticipantPhase {
    Created,
    SetupDone,
    KeysAsked,
    SharesExchanged,
    VectorsAsked,
    Done,
}

impl ParticipantPhase {
    fn name(self) -> &'static str {
        match self {
            ParticipantPhase::Created => "Created",
            ParticipantPhase::SetupDone => "SetupDone",
            ParticipantPhase::KeysAsked => "KeysAsked",
            ParticipantPhase::SharesExchanged => "SharesExchanged",
            ParticipantPhase::VectorsAsked => "VectorsAsked",
            ParticipantPhase::Done => "Done",
        }
    }
}

/// One participant's state across a single aggregation round.
pub struct Participant {
    phase: ParticipantPhase,
    sec_agg_id: ParticipantId,
    config: Option<SecAggConfig>,

    dh1: Option<DhKeyPair>,
    dh2: Option<DhKeyPair>,
    signing: Option<SigningKeyPair>,
    own_bundle: Option<KeyShareBundle>,

    b: Option<[u8; 32]>,

    peer_pk1: BTreeMap<ParticipantId, Vec<u8>>,
    shared_key_2_dict: BTreeMap<ParticipantId, kdf::SymmetricKey>,
    b_share_dict: BTreeMap<ParticipantId, SecretShare>,
    sk1_share_dict: BTreeMap<ParticipantId, SecretShare>,
}

impl Participant {
    pub fn new(sec_agg_id: ParticipantId) -> Self {
        Participant {
            phase: ParticipantPhase::Created,
            sec_agg_id,
            config: None,
            dh1: None,
            dh2: None,
            signing: None,
            own_bundle: None,
            b: None,
            peer_pk1: BTreeMap::new(),
            shared_key_2_dict: BTreeMap::new(),
            b_share_dict: BTreeMap::new(),
            sk1_share_dict: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ParticipantId {
        self.sec_agg_id
    }

    fn expect_phase(&self, expected: ParticipantPhase) -> Result<()> {
        if self.phase != expected {
            return Err(SecAggError::OutOfOrder {
                expected: expected.name(),
                got: self.phase.name(),
            });
        }
        Ok(())
    }

    fn config(&self) -> Result<&SecAggConfig> {
        self.config
            .as_ref()
            .ok_or(SecAggError::OutOfOrder {
                expected: ParticipantPhase::SetupDone.name(),
                got: ParticipantPhase::Created.name(),
            })
    }

    /// H0: store the round configuration.
    pub fn setup(&mut self, params: SetupParams) -> Result<()> {
        self.expect_phase(ParticipantPhase::Created)?;
        self.sec_agg_id = params.sec_agg_id;
        self.config = Some(params.config);
        self.phase = ParticipantPhase::SetupDone;
        info!(id = self.sec_agg_id, "setup complete");
        Ok(())
    }

    /// H1: generate this round's key material and sign the public bundle.
    pub fn ask_keys(&mut self) -> Result<KeyShareBundle> {
        self.expect_phase(ParticipantPhase::SetupDone)?;

        let dh1 = DhKeyPair::generate();
        let dh2 = DhKeyPair::generate();
        let signing = SigningKeyPair::generate();

        let pk1 = dh1.public_key_der()?;
        let pk2 = dh2.public_key_der()?;
        let sig_pub = signing.public_key_der()?;
        let signature = signing.sign(&signed_message(&pk1, &pk2))?;

        let bundle = KeyShareBundle {
            pk1,
            pk2,
            sig_pub,
            signature,
        };

        self.dh1 = Some(dh1);
        self.dh2 = Some(dh2);
        self.signing = Some(signing);
        self.own_bundle = Some(bundle.clone());
        self.phase = ParticipantPhase::KeysAsked;
        Ok(bundle)
    }

    /// H2: validate peers, split this participant's secrets, and return the
    /// encrypted packets to forward to each peer.
    pub fn share_keys(&mut self, public_keys: PublicKeysView) -> Result<Vec<SharePacket>> {
        self.expect_phase(ParticipantPhase::KeysAsked)?;
        let config = self.config()?.clone();

        if public_keys.len() < config.threshold {
            return Err(SecAggError::ThresholdUnmet {
                stage: "ShareKeys",
                have: public_keys.len(),
                need: config.threshold,
            });
        }

        let mut seen = std::collections::HashSet::new();
        for bundle in public_keys.values() {
            if !seen.insert(bundle.pk1.clone()) || !seen.insert(bundle.pk2.clone()) {
                return Err(SecAggError::DuplicatePublicKey);
            }
        }

        let own_bundle = self.own_bundle.clone().expect("own_bundle set in H1");
        match public_keys.get(&self.sec_agg_id) {
            Some(bundle) if *bundle == own_bundle => {}
            _ => return Err(SecAggError::SelfKeyMismatch),
        }

        for (&peer_id, bundle) in &public_keys {
            let ok = crate::crypto::keys::verify(
                &bundle.sig_pub,
                &signed_message(&bundle.pk1, &bundle.pk2),
                &bundle.signature,
            )?;
            if !ok {
                return Err(SecAggError::SignatureInvalid { peer: peer_id });
            }
            self.peer_pk1.insert(peer_id, bundle.pk1.clone());
        }

        let mut b = [0u8; 32];
        {
            use rand::RngCore;
            rand::rngs::OsRng.fill_bytes(&mut b);
        }
        self.b = Some(b);
        let dh1 = self.dh1.clone().expect("dh1 set in H1");
        let dh2 = self.dh2.clone().expect("dh2 set in H1");
        let sk1_der = dh1.private_key_der()?;

        let b_shares = shamir::split(&b, config.threshold, config.share_num)?;
        let sk1_shares = shamir::split(&sk1_der, config.threshold, config.share_num)?;

        let peer_ids: Vec<ParticipantId> = public_keys.keys().copied().collect();
        let mut packets = Vec::new();

        for (i, &peer_id) in peer_ids.iter().enumerate() {
            let b_share = b_shares[i].clone();
            let sk1_share = sk1_shares[i].clone();

            if peer_id == self.sec_agg_id {
                self.b_share_dict.insert(self.sec_agg_id, b_share);
                self.sk1_share_dict.insert(self.sec_agg_id, sk1_share);
                continue;
            }

            let peer_bundle = &public_keys[&peer_id];
            let shared_secret = dh2.diffie_hellman(&peer_bundle.pk2)?;
            let shared_key = kdf::derive(&shared_secret);
            self.shared_key_2_dict.insert(peer_id, shared_key);

            let plaintext = SharePlaintext {
                source: self.sec_agg_id,
                destination: peer_id,
                b_share,
                sk1_share,
            };
            let serialized = bincode::serialize(&plaintext)
                .map_err(|e| SecAggError::Transport(e.to_string()))?;
            let ciphertext = aead::encrypt(&shared_key, &serialized);

            packets.push(SharePacket {
                source: self.sec_agg_id,
                destination: peer_id,
                ciphertext,
            });
        }

        self.phase = ParticipantPhase::SharesExchanged;
        Ok(packets)
    }

    /// H3: absorb forwarded share packets, quantize and mask this
    /// participant's own contribution.
    pub fn ask_vectors(&mut self, request: AskVectorsRequest) -> Result<AskVectorsResponse> {
        self.expect_phase(ParticipantPhase::SharesExchanged)?;
        let config = self.config()?.clone();

        if request.packets.len() + 1 < config.threshold {
            return Err(SecAggError::ThresholdUnmet {
                stage: "AskVectors",
                have: request.packets.len() + 1,
                need: config.threshold,
            });
        }

        let mut available_set = BTreeSet::new();
        available_set.insert(self.sec_agg_id);

        for packet in &request.packets {
            if packet.destination != self.sec_agg_id {
                return Err(SecAggError::PacketMisrouted);
            }
            let key = self
                .shared_key_2_dict
                .get(&packet.source)
                .ok_or(SecAggError::PacketMisrouted)?;
            let plaintext_bytes = aead::decrypt(key, &packet.ciphertext)?;
            let plaintext: SharePlaintext = bincode::deserialize(&plaintext_bytes)
                .map_err(|e| SecAggError::Transport(e.to_string()))?;
            if plaintext.source != packet.source || plaintext.destination != packet.destination {
                return Err(SecAggError::PacketMisrouted);
            }
            self.b_share_dict.insert(plaintext.source, plaintext.b_share);
            self.sk1_share_dict.insert(plaintext.source, plaintext.sk1_share);
            available_set.insert(plaintext.source);
        }

        let weights_factor = request.fit_ins.weights_factor.min(config.max_weights_factor);
        let quantized = request
            .fit_ins
            .parameters
            .quantize(config.clipping_range, config.target_range);
        let weighted = quantized
            .scalar_mul(weights_factor, config.mod_range)
            .prepend_scalar(weights_factor);
        let shapes = weighted.shapes();

        let private_mask = crate::crypto::prg::prg(
            self.b.as_ref().expect("b generated in H2"),
            config.mod_range,
            &shapes,
        );
        let mut masked = weighted.add(&private_mask, config.mod_range)?;

        let dh1 = self.dh1.clone().expect("dh1 set in H1");
        for &peer_id in &available_set {
            if peer_id == self.sec_agg_id {
                continue;
            }
            let Some(peer_pk1) = self.peer_pk1.get(&peer_id) else {
                continue;
            };
            let pair_secret = dh1.diffie_hellman(peer_pk1)?;
            let pair_key = kdf::derive(&pair_secret);
            let pair_mask = crate::crypto::prg::prg(&pair_key, config.mod_range, &shapes);
            masked = if self.sec_agg_id > peer_id {
                masked.add(&pair_mask, config.mod_range)?
            } else {
                masked.sub(&pair_mask, config.mod_range)?
            };
        }

        self.phase = ParticipantPhase::VectorsAsked;
        Ok(AskVectorsResponse {
            masked_vector: masked.modulo(config.mod_range),
        })
    }

    /// H4: disclose the shares the coordinator needs to reconstruct
    /// dropouts' pairwise masks and survivors' private masks.
    pub fn unmask_vectors(
        &mut self,
        request: UnmaskVectorsRequest,
    ) -> Result<UnmaskVectorsResponse> {
        self.expect_phase(ParticipantPhase::VectorsAsked)?;
        let config = self.config()?.clone();

        if request.available.len() < config.threshold {
            return Err(SecAggError::ThresholdUnmet {
                stage: "UnmaskVectors",
                have: request.available.len(),
                need: config.threshold,
            });
        }

        let available: BTreeSet<ParticipantId> = request.available.iter().copied().collect();
        let dropout: BTreeSet<ParticipantId> = request.dropout.iter().copied().collect();
        if !available.is_disjoint(&dropout) {
            return Err(SecAggError::PacketMisrouted);
        }

        let mut shares = BTreeMap::new();
        for id in &request.available {
            if let Some(share) = self.b_share_dict.get(id) {
                shares.insert(*id, share.clone());
            } else {
                warn!(id = *id, "no b_share held for requested survivor");
            }
        }
        for id in &request.dropout {
            if let Some(share) = self.sk1_share_dict.get(id) {
                shares.insert(*id, share.clone());
            } else {
                warn!(id = *id, "no sk1_share held for requested dropout");
            }
        }

        self.phase = ParticipantPhase::Done;
        Ok(UnmaskVectorsResponse { shares })
    }
}

/// The message signed in H1 and verified in H2: `bincode([pk1, pk2])`.
fn signed_message(pk1: &[u8], pk2: &[u8]) -> Vec<u8> {
    bincode::serialize(&(pk1, pk2)).expect("serializing two byte slices cannot fail")
}
