//! The participant RPC seam (§6): five strictly-ordered async calls the
//! coordinator drives, standing in for whatever real transport (gRPC, HTTP,
//! a P2P swarm) a deployment chooses. The core ships only the in-process
//! [`LocalTransport`] used by its own tests.

use crate::error::Result;
use crate::message::{
    AskVectorsRequest, AskVectorsResponse, KeyShareBundle, ParticipantId, PublicKeysView,
    SharePacket, SetupParams, UnmaskVectorsRequest, UnmaskVectorsResponse,
};
use crate::participant::Participant;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Drives the five-handler sequence of a single participant over whatever
/// channel an implementation chooses. The coordinator never inspects a
/// participant directly; it only ever calls through this trait.
pub trait ParticipantTransport: Send + Sync {
    fn setup(
        &self,
        id: ParticipantId,
        params: SetupParams,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn ask_keys(
        &self,
        id: ParticipantId,
    ) -> impl std::future::Future<Output = Result<KeyShareBundle>> + Send;

    fn share_keys(
        &self,
        id: ParticipantId,
        view: PublicKeysView,
    ) -> impl std::future::Future<Output = Result<Vec<SharePacket>>> + Send;

    fn ask_vectors(
        &self,
        id: ParticipantId,
        request: AskVectorsRequest,
    ) -> impl std::future::Future<Output = Result<AskVectorsResponse>> + Send;

    fn unmask_vectors(
        &self,
        id: ParticipantId,
        request: UnmaskVectorsRequest,
    ) -> impl std::future::Future<Output = Result<UnmaskVectorsResponse>> + Send;
}

/// An in-process transport directly driving one [`Participant`] value per id,
/// guarded by its own mutex so concurrent stage dispatch is safe without the
/// coordinator knowing anything about the participants' internals.
pub struct LocalTransport {
    participants: BTreeMap<ParticipantId, Mutex<Participant>>,
}

impl LocalTransport {
    pub fn new(ids: impl IntoIterator<Item = ParticipantId>) -> Self {
        let participants = ids
            .into_iter()
            .map(|id| (id, Mutex::new(Participant::new(id))))
            .collect();
        LocalTransport { participants }
    }

    fn get(&self, id: ParticipantId) -> &Mutex<Participant> {
        self.participants
            .get(&id)
            .unwrap_or_else(|| panic!("no local participant registered for id {id}"))
    }
}

impl ParticipantTransport for LocalTransport {
    async fn setup(&self, id: ParticipantId, params: SetupParams) -> Result<()> {
        self.get(id).lock().await.setup(params)
    }

    async fn ask_keys(&self, id: ParticipantId) -> Result<KeyShareBundle> {
        self.get(id).lock().await.ask_keys()
    }

    async fn share_keys(
        &self,
        id: ParticipantId,
        view: PublicKeysView,
    ) -> Result<Vec<SharePacket>> {
        self.get(id).lock().await.share_keys(view)
    }

    async fn ask_vectors(
        &self,
        id: ParticipantId,
        request: AskVectorsRequest,
    ) -> Result<AskVectorsResponse> {
        self.get(id).lock().await.ask_vectors(request)
    }

    async fn unmask_vectors(
        &self,
        id: ParticipantId,
        request: UnmaskVectorsRequest,
    ) -> Result<UnmaskVectorsResponse> {
        self.get(id).lock().await.unmask_vectors(request)
    }
}
