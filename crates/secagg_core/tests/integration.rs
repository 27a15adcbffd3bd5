//! End-to-end aggregation rounds over [`LocalTransport`], exercising the
//! concrete scenarios the coordinator/participant engines must satisfy.

use secagg_core::config::{SecAggConfig, SecAggParamOverrides};
use secagg_core::coordinator::Coordinator;
use secagg_core::error::SecAggError;
use secagg_core::message::{
    AskVectorsRequest, AskVectorsResponse, FitIns, KeyShareBundle, ParticipantId, PublicKeysView,
    SharePacket, SetupParams, UnmaskVectorsRequest, UnmaskVectorsResponse,
};
use secagg_core::transport::{LocalTransport, ParticipantTransport};
use secagg_core::vector::{FloatTensor, FloatVector};
use std::collections::BTreeSet;
use std::sync::Arc;

fn single_value_vector(value: f64) -> FloatVector {
    FloatVector {
        tensors: vec![FloatTensor {
            shape: vec![1],
            data: vec![value],
        }],
    }
}

fn fit_assignments(
    ids: &[ParticipantId],
    values_and_weights: &[(f64, u64)],
) -> Vec<(ParticipantId, FitIns)> {
    ids.iter()
        .zip(values_and_weights.iter())
        .map(|(&id, &(value, weight))| (id, FitIns::new(single_value_vector(value), weight)))
        .collect()
}

/// Wraps [`LocalTransport`] to inject per-id failures at chosen stages, so
/// tests can exercise dropout and tampering without a real network.
struct FaultyTransport {
    inner: LocalTransport,
    fail_ask_vectors: BTreeSet<ParticipantId>,
    fail_unmask: BTreeSet<ParticipantId>,
    /// Corrupts the outgoing packet from `tamper_source` to `tamper_destination`.
    tamper: Option<(ParticipantId, ParticipantId)>,
}

impl FaultyTransport {
    fn new(ids: impl IntoIterator<Item = ParticipantId>) -> Self {
        FaultyTransport {
            inner: LocalTransport::new(ids),
            fail_ask_vectors: BTreeSet::new(),
            fail_unmask: BTreeSet::new(),
            tamper: None,
        }
    }
}

impl ParticipantTransport for FaultyTransport {
    async fn setup(&self, id: ParticipantId, params: SetupParams) -> secagg_core::Result<()> {
        self.inner.setup(id, params).await
    }

    async fn ask_keys(&self, id: ParticipantId) -> secagg_core::Result<KeyShareBundle> {
        self.inner.ask_keys(id).await
    }

    async fn share_keys(
        &self,
        id: ParticipantId,
        view: PublicKeysView,
    ) -> secagg_core::Result<Vec<SharePacket>> {
        let mut packets = self.inner.share_keys(id, view).await?;
        if let Some((source, destination)) = self.tamper {
            if id == source {
                for packet in &mut packets {
                    if packet.destination == destination {
                        if let Some(last) = packet.ciphertext.last_mut() {
                            *last ^= 0x01;
                        }
                    }
                }
            }
        }
        Ok(packets)
    }

    async fn ask_vectors(
        &self,
        id: ParticipantId,
        request: AskVectorsRequest,
    ) -> secagg_core::Result<AskVectorsResponse> {
        if self.fail_ask_vectors.contains(&id) {
            return Err(SecAggError::Transport("simulated dropout".into()));
        }
        self.inner.ask_vectors(id, request).await
    }

    async fn unmask_vectors(
        &self,
        id: ParticipantId,
        request: UnmaskVectorsRequest,
    ) -> secagg_core::Result<UnmaskVectorsResponse> {
        if self.fail_unmask.contains(&id) {
            return Err(SecAggError::Transport("simulated dropout".into()));
        }
        self.inner.unmask_vectors(id, request).await
    }
}

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected}, got {actual} (tolerance {tolerance})"
    );
}

#[tokio::test]
async fn three_survivors_all_zero_aggregate() {
    let ids: Vec<ParticipantId> = vec![0, 1, 2];
    let config = SecAggConfig::complete(3, SecAggParamOverrides::default()).unwrap();
    let transport = Arc::new(LocalTransport::new(ids.clone()));
    let coordinator = Coordinator::new(transport, config);

    let assignments = fit_assignments(&ids, &[(0.0, 1), (0.0, 1), (0.0, 1)]);
    let result = coordinator.run_round(assignments).await.unwrap();

    assert_close(result.tensors[0].data[0], 0.0, 1e-3);
}

#[tokio::test]
async fn three_participants_weighted_mean() {
    let ids: Vec<ParticipantId> = vec![0, 1, 2];
    let config = SecAggConfig::complete(3, SecAggParamOverrides::default()).unwrap();
    let transport = Arc::new(LocalTransport::new(ids.clone()));
    let coordinator = Coordinator::new(transport, config);

    let assignments = fit_assignments(&ids, &[(1.0, 1), (2.0, 2), (3.0, 3)]);
    let result = coordinator.run_round(assignments).await.unwrap();

    let expected = (1.0 * 1.0 + 2.0 * 2.0 + 3.0 * 3.0) / (1.0 + 2.0 + 3.0);
    assert_close(result.tensors[0].data[0], expected, 1e-3);
}

#[tokio::test]
async fn one_dropout_of_five_still_reconstructs() {
    let ids: Vec<ParticipantId> = (0..5).collect();
    let config = SecAggConfig::complete(5, SecAggParamOverrides::default()).unwrap();
    let mut transport = FaultyTransport::new(ids.clone());
    transport.fail_ask_vectors.insert(4);
    let coordinator = Coordinator::new(Arc::new(transport), config);

    let assignments = fit_assignments(
        &ids,
        &[(1.0, 1), (1.0, 1), (1.0, 1), (1.0, 1), (1.0, 1)],
    );
    let result = coordinator.run_round(assignments).await.unwrap();

    assert_close(result.tensors[0].data[0], 1.0, 1e-3);
}

#[tokio::test]
async fn neighbourhood_restricted_dropout_reconstruction() {
    let ids: Vec<ParticipantId> = (0..5).collect();
    let overrides = SecAggParamOverrides {
        share_num: Some(3),
        ..Default::default()
    };
    let config = SecAggConfig::complete(5, overrides).unwrap();
    let mut transport = FaultyTransport::new(ids.clone());
    transport.fail_ask_vectors.insert(2);
    let coordinator = Coordinator::new(Arc::new(transport), config);

    let assignments = fit_assignments(
        &ids,
        &[(2.0, 1), (2.0, 1), (2.0, 1), (2.0, 1), (2.0, 1)],
    );
    let result = coordinator.run_round(assignments).await.unwrap();

    assert_close(result.tensors[0].data[0], 2.0, 1e-3);
}

#[tokio::test]
async fn double_dropout_below_threshold_aborts() {
    let ids: Vec<ParticipantId> = (0..5).collect();
    let overrides = SecAggParamOverrides {
        min_num: Some(3),
        threshold: Some(4),
        share_num: Some(5),
        ..Default::default()
    };
    let config = SecAggConfig::complete(5, overrides).unwrap();
    let mut transport = FaultyTransport::new(ids.clone());
    transport.fail_ask_vectors.insert(3);
    transport.fail_ask_vectors.insert(4);
    let coordinator = Coordinator::new(Arc::new(transport), config);

    let assignments = fit_assignments(
        &ids,
        &[(1.0, 1), (1.0, 1), (1.0, 1), (1.0, 1), (1.0, 1)],
    );
    let result = coordinator.run_round(assignments).await;

    assert!(matches!(result, Err(SecAggError::ThresholdUnmet { .. })));
}

#[tokio::test]
async fn tampered_ciphertext_byte_drops_one_participant_but_round_succeeds() {
    let ids: Vec<ParticipantId> = (0..5).collect();
    let config = SecAggConfig::complete(5, SecAggParamOverrides::default()).unwrap();
    let mut transport = FaultyTransport::new(ids.clone());
    // Corrupt the packet participant 0 sends to participant 1; participant 1
    // fails to decrypt it and drops out of AskVectors, but the round still
    // has 4 survivors against a threshold of 4.
    transport.tamper = Some((0, 1));
    let coordinator = Coordinator::new(Arc::new(transport), config);

    let assignments = fit_assignments(
        &ids,
        &[(1.0, 1), (1.0, 1), (1.0, 1), (1.0, 1), (1.0, 1)],
    );
    let result = coordinator.run_round(assignments).await.unwrap();

    assert_close(result.tensors[0].data[0], 1.0, 1e-3);
}
