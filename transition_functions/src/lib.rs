pub mod blocks;
pub mod epochs;
pub mod process_slot;

use types::primitives::{Epoch, Slot};

/// Errors surfaced by slot, block and epoch processing. Soft outcomes that
/// callers treat as non-fatal are explicit variants; invariant violations
/// panic instead of appearing here.
#[derive(PartialEq, Eq, Debug)]
pub enum Error {
    Helper(helper_functions::error::Error),
    SlotsNotAdvanced { state_slot: Slot, target_slot: Slot },
    BlockSlotMismatch { state_slot: Slot, block_slot: Slot },
    BlockBeforeGenesis,
    ParentRootMismatch,
    StateRootMismatch,
    ProposerIndexMismatch,
    ProposerSlashed,
    EmptyRandaoReveal,
    InvalidSignature,
    TargetEpochMismatch { target_epoch: Epoch, attestation_epoch: Epoch },
    TargetEpochNotCurrentOrPrevious { target_epoch: Epoch },
    AttestationTooNew { state_slot: Slot, attestation_slot: Slot },
    AttestationTooOld { state_slot: Slot, attestation_slot: Slot },
    SourceCheckpointMismatch,
    /// The attestation set no participation flag that was not already set.
    /// Callers treat this as a non-fatal outcome.
    NoNewFlags,
    HeadersNotDistinct,
    HeadersForDifferentProposers,
    HeaderSlotMismatch,
    ValidatorNotSlashable,
    AttestationsNotSlashable,
    NoSlashableIndices,
    ValidatorNotActive,
    ValidatorAlreadyExited,
    ExitEpochInFuture,
    ValidatorNotMature,
    RegistryLimitReached,
}

impl From<helper_functions::error::Error> for Error {
    fn from(error: helper_functions::error::Error) -> Self {
        Self::Helper(error)
    }
}
