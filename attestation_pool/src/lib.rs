//! Pending attestations between gossip and block inclusion: the aggregation
//! pool itself, the per-slot bandwidth planner, and the inclusion monitor.

pub mod cap_planner;
pub mod inclusion_monitor;
pub mod pool;

pub use crate::cap_planner::AttesterCapManager;
pub use crate::inclusion_monitor::InclusionMonitor;
pub use crate::pool::{AttestationPool, InsertOutcome};

use thiserror::Error;
use types::primitives::{Epoch, Slot};

#[derive(PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("attestation has no aggregation bits set")]
    EmptyAggregationBits,
    #[error("attestation slot {attestation_slot} is outside [{lowest_permissible_slot}, {current_slot}]")]
    SlotOutOfWindow {
        attestation_slot: Slot,
        lowest_permissible_slot: Slot,
        current_slot: Slot,
    },
    #[error("target epoch {target_epoch} does not match the attestation slot epoch {slot_epoch}")]
    TargetEpochMismatch {
        target_epoch: Epoch,
        slot_epoch: Epoch,
    },
    #[error("attestation source does not match the justified checkpoint")]
    SourceCheckpointMismatch,
    #[error("the pool is full ({0} attestations)")]
    PoolFull(usize),
    #[error("aggregation bitfields have different lengths")]
    InconsistentBitLength,
}
