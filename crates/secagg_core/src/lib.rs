//! Five-round secure aggregation for federated learning (Bonawitz et al.
//! 2017): a coordinator sums participant-contributed vectors without
//! learning any individual contribution, tolerating a bounded number of
//! dropouts via Shamir-backed reconstruction of the masks they leave behind.
//!
//! The protocol core is split leaves-first: [`crypto`] primitives,
//! [`vector`] arithmetic and quantization, the [`message`] wire schema, the
//! [`participant`] and [`coordinator`] state machines, and the [`strategy`]
//! / [`transport`] seams that connect the core to whatever federated
//! learning system and RPC layer a deployment actually uses.

pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod error;
pub mod message;
pub mod participant;
pub mod strategy;
pub mod transport;
pub mod vector;

pub use config::{SecAggConfig, SecAggParamOverrides};
pub use coordinator::Coordinator;
pub use error::{Result, SecAggError};
pub use participant::Participant;
pub use strategy::Strategy;
pub use transport::{LocalTransport, ParticipantTransport};
