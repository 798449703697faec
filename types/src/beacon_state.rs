use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{BitVector, FixedVector, VariableList};
use tree_hash_derive::TreeHash;

use crate::config::Config;
use crate::consts::JustificationBitsLength;
use crate::primitives::*;
use crate::types::*;

#[derive(PartialEq, Debug)]
pub enum Error {
    RegistryLimitReached,
}

/// The authoritative snapshot at a slot.
///
/// Field order is the Merkleization order; reordering fields changes the
/// hash-tree-root. The registry, balances, participation arrays and
/// inactivity scores are co-indexed and must only grow through
/// [`BeaconState::add_validator`].
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct BeaconState<C: Config> {
    // Versioning
    pub genesis_time: UnixSeconds,
    pub genesis_validators_root: H256,
    pub slot: Slot,
    pub fork: Fork,

    // History
    pub latest_block_header: BeaconBlockHeader,
    pub block_roots: FixedVector<H256, C::SlotsPerHistoricalRoot>,
    pub state_roots: FixedVector<H256, C::SlotsPerHistoricalRoot>,
    pub historical_roots: VariableList<H256, C::HistoricalRootsLimit>,

    // Eth1
    pub eth1_data: Eth1Data,
    pub eth1_data_votes: VariableList<Eth1Data, C::SlotsPerEth1VotingPeriod>,
    pub eth1_deposit_index: u64,

    // Registry
    pub validators: VariableList<Validator, C::ValidatorRegistryLimit>,
    pub balances: VariableList<Gwei, C::ValidatorRegistryLimit>,

    // Randomness
    pub randao_mixes: FixedVector<H256, C::EpochsPerHistoricalVector>,

    // Slashings
    pub slashings: FixedVector<Gwei, C::EpochsPerSlashingsVector>,

    // Participation
    pub previous_epoch_participation: VariableList<ParticipationFlags, C::ValidatorRegistryLimit>,
    pub current_epoch_participation: VariableList<ParticipationFlags, C::ValidatorRegistryLimit>,

    // Finality
    pub justification_bits: BitVector<JustificationBitsLength>,
    pub previous_justified_checkpoint: Checkpoint,
    pub current_justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,

    // Inactivity
    pub inactivity_scores: VariableList<u64, C::ValidatorRegistryLimit>,

    // Sync
    pub current_sync_committee: SyncCommittee<C>,
    pub next_sync_committee: SyncCommittee<C>,

    // Execution
    pub latest_execution_payload_header: ExecutionPayloadHeader<C>,
}

impl<C: Config> BeaconState<C> {
    /// Appends a validator together with its balance, participation bytes
    /// and inactivity score, keeping the four lists co-indexed.
    pub fn add_validator(
        &mut self,
        validator: Validator,
        balance: Gwei,
    ) -> Result<ValidatorIndex, Error> {
        let index = self.validators.len() as ValidatorIndex;

        self.validators
            .push(validator)
            .map_err(|_| Error::RegistryLimitReached)?;
        self.balances
            .push(balance)
            .map_err(|_| Error::RegistryLimitReached)?;
        self.previous_epoch_participation
            .push(0)
            .map_err(|_| Error::RegistryLimitReached)?;
        self.current_epoch_participation
            .push(0)
            .map_err(|_| Error::RegistryLimitReached)?;
        self.inactivity_scores
            .push(0)
            .map_err(|_| Error::RegistryLimitReached)?;

        debug_assert!(self.registry_is_consistent());
        Ok(index)
    }

    /// Registry, balances, participation arrays and inactivity scores must
    /// have the same length at all times. Anything else is a programming
    /// error, not a recoverable condition.
    pub fn registry_is_consistent(&self) -> bool {
        let count = self.validators.len();
        self.balances.len() == count
            && self.previous_epoch_participation.len() == count
            && self.current_epoch_participation.len() == count
            && self.inactivity_scores.len() == count
    }
}

#[cfg(test)]
mod tests {
    use tree_hash::TreeHash;

    use crate::config::MinimalConfig;

    use super::*;

    #[test]
    fn add_validator_keeps_lists_co_indexed() {
        let mut state = BeaconState::<MinimalConfig>::default();

        let index = state
            .add_validator(Validator::default(), 32_000_000_000)
            .expect("the registry has room");

        assert_eq!(index, 0);
        assert_eq!(state.validators.len(), 1);
        assert_eq!(state.balances.len(), 1);
        assert_eq!(state.previous_epoch_participation.len(), 1);
        assert_eq!(state.current_epoch_participation.len(), 1);
        assert_eq!(state.inactivity_scores.len(), 1);
        assert!(state.registry_is_consistent());
    }

    #[test]
    fn default_state_buffers_are_full_length() {
        let state = BeaconState::<MinimalConfig>::default();

        assert_eq!(state.block_roots.len(), 64);
        assert_eq!(state.state_roots.len(), 64);
        assert_eq!(state.randao_mixes.len(), 64);
        assert_eq!(state.slashings.len(), 64);
    }

    #[test]
    fn tree_hash_commits_to_slot() {
        let state = BeaconState::<MinimalConfig>::default();
        let advanced = BeaconState::<MinimalConfig> {
            slot: 1,
            ..BeaconState::default()
        };

        assert_ne!(state.tree_hash_root(), advanced.tree_hash_root());
    }

    #[test]
    fn clone_is_a_deep_copy() {
        let mut state = BeaconState::<MinimalConfig>::default();
        state
            .add_validator(Validator::default(), 1)
            .expect("the registry has room");

        let snapshot = state.clone();
        state.balances[0] = 2;

        assert_eq!(snapshot.balances[0], 1);
    }
}
