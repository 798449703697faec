//! Equivocation tables for proposals and attestations.
//!
//! Both detectors accumulate evidence into buffers that a draining
//! `detect_*` call empties and a `peek_*` call only surveys. Old entries
//! are pruned as newer ones arrive.

pub mod attester;
pub mod proposer;

pub use crate::attester::{AttesterEvidence, AttesterSlashingDetector, AttestationRecord, EvidenceKind};
pub use crate::proposer::{ProposerEvidence, ProposerSlashingDetector};

use thiserror::Error;
use types::primitives::Slot;

#[derive(PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("slot {slot} regressed below the detector's window floor {window_floor}")]
    SlotRegression { slot: Slot, window_floor: Slot },
}
