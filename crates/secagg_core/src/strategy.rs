//! The federated-learning strategy seam (§6): the thing that decides who
//! participates and what they train on. The core only depends on this
//! trait; selecting participants, running local training, and consuming the
//! aggregated result are all the strategy's job, not the coordinator's.

use crate::config::SecAggParamOverrides;
use crate::message::{FitIns, ParticipantId};
use crate::vector::FloatVector;

/// Implemented by whatever drives an aggregation round from the outside.
pub trait Strategy: Send + Sync {
    /// Selects participants for `server_round` and hands each one its
    /// initial parameters and per-participant fit configuration.
    fn configure_fit(
        &self,
        server_round: u64,
        parameters: &FloatVector,
        participant_ids: &[ParticipantId],
    ) -> Vec<(ParticipantId, FitIns)>;

    /// Returns the secure-aggregation parameter overrides for a round with
    /// `sample_num` invited participants; the coordinator completes any
    /// field left unset per the default table in §6.
    fn get_sec_agg_param(&self, sample_num: usize) -> SecAggParamOverrides;
}
