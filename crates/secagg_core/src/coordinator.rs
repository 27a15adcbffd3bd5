//! Coordinator engine (§4.5): the linear state machine driving one
//! aggregation round across its five stages, reconstructing the sum at the
//! end.
//!
//! ```text
//! Invited -Setup-> setup_ok -AskKeys-> keys_ok -ShareKeys-> shares_ok
//!        -AskVectors-> vectors_ok -UnmaskVectors-> Reconstructed
//! ```

use crate::config::SecAggConfig;
use crate::crypto::keys::DhKeyPair;
use crate::crypto::shamir::{self, SecretShare};
use crate::crypto::{kdf, prg};
use crate::error::{Result, SecAggError};
use crate::message::{
    AskVectorsRequest, FitIns, KeyShareBundle, ParticipantId, PublicKeysView, SetupParams,
    SharePacket, UnmaskVectorsRequest,
};
use crate::transport::ParticipantTransport;
use crate::vector::{FloatVector, ModVector};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Upper bound on simultaneously in-flight participant requests within one
/// stage; real concurrency is additionally capped by the number of survivors.
const MAX_CONCURRENT_REQUESTS: usize = 64;

pub struct Coordinator<T: ParticipantTransport> {
    transport: Arc<T>,
    config: SecAggConfig,
}

impl<T: ParticipantTransport + 'static> Coordinator<T> {
    pub fn new(transport: Arc<T>, config: SecAggConfig) -> Self {
        Coordinator { transport, config }
    }

    /// Runs one complete aggregation round for the given per-participant fit
    /// assignments (as produced by `Strategy::configure_fit`), returning the
    /// aggregated, reverse-quantized parameters.
    pub async fn run_round(
        &self,
        fit_assignments: Vec<(ParticipantId, FitIns)>,
    ) -> Result<FloatVector> {
        let invited: Vec<ParticipantId> = fit_assignments.iter().map(|(id, _)| *id).collect();
        let fit_by_id: BTreeMap<ParticipantId, FitIns> = fit_assignments.into_iter().collect();
        let timeout = Duration::from_secs(self.config.timeout);

        // Stage 0: Setup.
        let setup_results = dispatch(
            Arc::clone(&self.transport),
            "Setup",
            &invited,
            timeout,
            |transport, id| {
                let config = self.config.clone();
                async move { transport.setup(id, SetupParams { config, sec_agg_id: id }).await }
            },
        )
        .await;
        let setup_ok: Vec<ParticipantId> = setup_results.into_keys().collect();
        self.check_min_num("Setup", &setup_ok)?;

        // Stage 1: AskKeys.
        let keys_results: BTreeMap<ParticipantId, KeyShareBundle> = dispatch(
            Arc::clone(&self.transport),
            "AskKeys",
            &setup_ok,
            timeout,
            |transport, id| async move { transport.ask_keys(id).await },
        )
        .await;
        let keys_ok: Vec<ParticipantId> = keys_results.keys().copied().collect();
        self.check_min_num("AskKeys", &keys_ok)?;
        let public_keys_dict: PublicKeysView = keys_results;

        // Stage 2: ShareKeys.
        let neighbours: BTreeMap<ParticipantId, BTreeSet<ParticipantId>> = keys_ok
            .iter()
            .map(|&id| (id, self.neighbourhood(id)))
            .collect();

        let share_results: BTreeMap<ParticipantId, Vec<SharePacket>> = dispatch(
            Arc::clone(&self.transport),
            "ShareKeys",
            &keys_ok,
            timeout,
            |transport, id| {
                let view: PublicKeysView = public_keys_dict
                    .iter()
                    .filter(|(peer_id, _)| neighbours[&id].contains(peer_id))
                    .map(|(peer_id, bundle)| (*peer_id, bundle.clone()))
                    .collect();
                async move { transport.share_keys(id, view).await }
            },
        )
        .await;
        let shares_ok: BTreeSet<ParticipantId> = share_results.keys().copied().collect();
        self.check_min_num("ShareKeys", &shares_ok.iter().copied().collect::<Vec<_>>())?;

        let mut forwarding_table: BTreeMap<ParticipantId, Vec<SharePacket>> = BTreeMap::new();
        for packets in share_results.into_values() {
            for packet in packets {
                if shares_ok.contains(&packet.destination) {
                    forwarding_table.entry(packet.destination).or_default().push(packet);
                }
            }
        }

        // Stage 3: AskVectors.
        let shares_ok_vec: Vec<ParticipantId> = shares_ok.iter().copied().collect();
        let vector_results: BTreeMap<ParticipantId, ModVector> = dispatch(
            Arc::clone(&self.transport),
            "AskVectors",
            &shares_ok_vec,
            timeout,
            |transport, id| {
                let packets = forwarding_table.get(&id).cloned().unwrap_or_default();
                let fit_ins = fit_by_id
                    .get(&id)
                    .cloned()
                    .expect("every invited id has a fit assignment");
                async move {
                    transport
                        .ask_vectors(id, AskVectorsRequest { packets, fit_ins })
                        .await
                        .map(|response| response.masked_vector)
                }
            },
        )
        .await;
        let vectors_ok: BTreeSet<ParticipantId> = vector_results.keys().copied().collect();
        self.check_min_num("AskVectors", &vectors_ok.iter().copied().collect::<Vec<_>>())?;
        let dropout: BTreeSet<ParticipantId> = shares_ok.difference(&vectors_ok).copied().collect();

        let mut sum = vector_results
            .values()
            .next()
            .cloned()
            .map(|first| ModVector::zero(&first.shapes()))
            .ok_or(SecAggError::ThresholdUnmet {
                stage: "AskVectors",
                have: 0,
                need: self.config.min_num,
            })?;
        for masked in vector_results.values() {
            sum = sum.add(masked, self.config.mod_range)?;
        }
        let shapes = sum.shapes();

        // Stage 4: UnmaskVectors.
        let vectors_ok_vec: Vec<ParticipantId> = vectors_ok.iter().copied().collect();
        let unmask_results: BTreeMap<ParticipantId, BTreeMap<ParticipantId, SecretShare>> =
            dispatch(
                Arc::clone(&self.transport),
                "UnmaskVectors",
                &vectors_ok_vec,
                timeout,
                |transport, id| {
                    let neighbours_of_id = &neighbours[&id];
                    let available: Vec<ParticipantId> =
                        vectors_ok.intersection(neighbours_of_id).copied().collect();
                    let dropout_view: Vec<ParticipantId> =
                        dropout.intersection(neighbours_of_id).copied().collect();
                    async move {
                        transport
                            .unmask_vectors(id, UnmaskVectorsRequest { available, dropout: dropout_view })
                            .await
                            .map(|response| response.shares)
                    }
                },
            )
            .await;

        let unmask_ok: Vec<ParticipantId> = unmask_results.keys().copied().collect();
        self.check_threshold("UnmaskVectors", &unmask_ok)?;

        let mut collected_shares: BTreeMap<ParticipantId, Vec<SecretShare>> = BTreeMap::new();
        for shares in unmask_results.into_values() {
            for (owner, share) in shares {
                collected_shares.entry(owner).or_default().push(share);
            }
        }

        for &owner in vectors_ok.iter().chain(dropout.iter()) {
            let shares = collected_shares.entry(owner).or_default();
            if shares.len() < self.config.threshold {
                return Err(SecAggError::ReconstructionFailed { owner });
            }
            let secret = shamir::combine(shares.as_slice(), self.config.threshold)?;

            if vectors_ok.contains(&owner) {
                let mut seed = [0u8; 32];
                if secret.len() != 32 {
                    return Err(SecAggError::ReconstructionFailed { owner });
                }
                seed.copy_from_slice(&secret);
                let private_mask = prg::prg(&seed, self.config.mod_range, &shapes);
                sum = sum.sub(&private_mask, self.config.mod_range)?;
            } else {
                let owner_dh1 = DhKeyPair::from_private_key_der(&secret)?;
                let owner_neighbours = self.neighbourhood(owner);
                for &peer_id in owner_neighbours.intersection(&vectors_ok) {
                    let peer_pk1 = public_keys_dict[&peer_id].pk1.clone();
                    let pair_secret = owner_dh1.diffie_hellman(&peer_pk1)?;
                    let pair_key = kdf::derive(&pair_secret);
                    let pair_mask = prg::prg(&pair_key, self.config.mod_range, &shapes);
                    sum = if owner > peer_id {
                        sum.add(&pair_mask, self.config.mod_range)?
                    } else {
                        sum.sub(&pair_mask, self.config.mod_range)?
                    };
                }
            }
        }

        let (total_weights_factor, unweighted_sum) = sum.modulo(self.config.mod_range).split_leading_scalar()?;
        let averaged = unweighted_sum.scalar_div_as_float(total_weights_factor);
        let result = averaged.reverse_quantize(self.config.clipping_range, self.config.target_range);

        info!(
            sample_num = self.config.sample_num,
            dropouts = dropout.len(),
            "aggregation round complete"
        );
        Ok(result)
    }

    /// The `§4.5` cyclic neighbourhood of radius `share_num/2` on the id ring,
    /// or the whole invited set when `share_num == sample_num` (complete graph).
    fn neighbourhood(&self, id: ParticipantId) -> BTreeSet<ParticipantId> {
        let sample_num = self.config.sample_num as i64;
        if self.config.share_num == self.config.sample_num {
            return (0..sample_num as u32).collect();
        }
        let radius = (self.config.share_num / 2) as i64;
        let i = id as i64;
        (-radius..=radius)
            .map(|k| (((i + k) % sample_num + sample_num) % sample_num) as ParticipantId)
            .collect()
    }

    fn check_min_num(&self, stage: &'static str, cohort: &[ParticipantId]) -> Result<()> {
        if cohort.len() < self.config.min_num {
            warn!(stage, have = cohort.len(), need = self.config.min_num, "round aborted");
            return Err(SecAggError::ThresholdUnmet {
                stage,
                have: cohort.len(),
                need: self.config.min_num,
            });
        }
        Ok(())
    }

    fn check_threshold(&self, stage: &'static str, cohort: &[ParticipantId]) -> Result<()> {
        if cohort.len() < self.config.threshold {
            warn!(stage, have = cohort.len(), need = self.config.threshold, "round aborted");
            return Err(SecAggError::ThresholdUnmet {
                stage,
                have: cohort.len(),
                need: self.config.threshold,
            });
        }
        Ok(())
    }
}

/// Dispatches one request per id concurrently through a bounded worker pool,
/// joining on completion; a participant that errors or exceeds `timeout` is
/// logged and dropped from the returned cohort rather than failing the round.
async fn dispatch<R, Fut, F, T>(
    transport: Arc<T>,
    stage: &'static str,
    ids: &[ParticipantId],
    timeout: Duration,
    f: F,
) -> BTreeMap<ParticipantId, R>
where
    T: ParticipantTransport,
    F: Fn(Arc<T>, ParticipantId) -> Fut,
    Fut: std::future::Future<Output = Result<R>>,
{
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS));
    let tasks = ids.iter().map(|&id| {
        let semaphore = Arc::clone(&semaphore);
        let fut = f(Arc::clone(&transport), id);
        async move {
            let _permit = semaphore.acquire().await.expect("semaphore is never closed");
            match tokio::time::timeout(timeout, fut).await {
                Ok(Ok(value)) => Some((id, value)),
                Ok(Err(error)) => {
                    warn!(id, stage, %error, "participant failed");
                    None
                }
                Err(_) => {
                    warn!(id, stage, "participant request timed out");
                    None
                }
            }
        }
    });
    futures::future::join_all(tasks).await.into_iter().flatten().collect()
}
