use helper_functions::beacon_state_accessors::{
    get_active_validator_indices, get_beacon_proposer_index, get_current_epoch,
    get_total_active_balance,
};
use helper_functions::beacon_state_mutators::{decrease_balance, increase_balance};
use helper_functions::crypto::{hash_tree_root, SignatureVerifier};
use helper_functions::error::Error as HelperError;
use parking_lot::RwLock;
use transition_functions::epochs::process_epoch::process_epoch;
use transition_functions::process_slot::{process_slots, state_transition};
use transition_functions::Error as TransitionError;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::{Epoch, Gwei, Slot, ValidatorIndex, H256};
use types::types::{Checkpoint, SignedBeaconBlock, Validator};

/// The exclusive owner of the canonical [`BeaconState`].
///
/// All mutation goes through the write lock; read accessors take the read
/// lock and hand out either copies or values. A reader observes the state
/// strictly before or strictly after a transition, never in between.
/// Helpers suffixed `_locked` run against an already-acquired guard and
/// must not re-enter the lock.
pub struct StateMachine<C: Config> {
    state: RwLock<BeaconState<C>>,
}

impl<C: Config> StateMachine<C> {
    pub fn new(genesis_state: BeaconState<C>) -> Self {
        assert!(
            genesis_state.registry_is_consistent(),
            "validators, balances, participation and inactivity scores must be co-indexed",
        );
        Self {
            state: RwLock::new(genesis_state),
        }
    }

    // Read accessors.

    /// A deep copy of the current state.
    pub fn snapshot(&self) -> BeaconState<C> {
        self.state.read().clone()
    }

    pub fn slot(&self) -> Slot {
        self.state.read().slot
    }

    pub fn current_epoch(&self) -> Epoch {
        get_current_epoch(&self.state.read())
    }

    pub fn hash_tree_root(&self) -> H256 {
        hash_tree_root(&*self.state.read())
    }

    pub fn validator_count(&self) -> usize {
        self.state.read().validators.len()
    }

    pub fn active_validator_indices(&self, epoch: Epoch) -> Vec<ValidatorIndex> {
        get_active_validator_indices(&self.state.read(), epoch)
    }

    pub fn total_active_balance(&self) -> Result<Gwei, HelperError> {
        get_total_active_balance(&self.state.read())
    }

    pub fn proposer_index(&self) -> Result<ValidatorIndex, HelperError> {
        get_beacon_proposer_index(&self.state.read())
    }

    /// Effective balances indexed by validator, for fork-choice weighting.
    pub fn effective_balances(&self) -> Vec<Gwei> {
        Self::effective_balances_locked(&self.state.read())
    }

    pub fn justified_checkpoint(&self) -> Checkpoint {
        self.state.read().current_justified_checkpoint
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.state.read().finalized_checkpoint
    }

    pub fn latest_block_root(&self) -> H256 {
        self.state.read().latest_block_header.canonical_root()
    }

    // Mutations.

    pub fn add_validator(
        &self,
        validator: Validator,
        balance: Gwei,
    ) -> Result<ValidatorIndex, types::BeaconStateError> {
        self.state.write().add_validator(validator, balance)
    }

    pub fn increase_balance(&self, index: ValidatorIndex, delta: Gwei) {
        increase_balance(&mut self.state.write(), index, delta);
    }

    pub fn decrease_balance(&self, index: ValidatorIndex, delta: Gwei) {
        decrease_balance(&mut self.state.write(), index, delta);
    }

    /// Advances through empty slots, running epoch transitions at the
    /// boundaries crossed.
    pub fn process_slots(&self, slot: Slot) -> Result<(), TransitionError> {
        process_slots(&mut self.state.write(), slot)
    }

    /// Runs the epoch transition in place. Atomic with respect to readers.
    pub fn process_epoch(&self) {
        process_epoch(&mut self.state.write());
    }

    /// Applies a signed block, advancing slots first if needed.
    pub fn process_block(
        &self,
        signed_block: &SignedBeaconBlock<C>,
        verifier: &dyn SignatureVerifier,
        validate_state_root: bool,
    ) -> Result<(), TransitionError> {
        state_transition(
            &mut self.state.write(),
            signed_block,
            verifier,
            validate_state_root,
        )
    }

    fn effective_balances_locked(state: &BeaconState<C>) -> Vec<Gwei> {
        state
            .validators
            .iter()
            .map(|validator| validator.effective_balance)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use ssz_types::{FixedVector, VariableList};
    use types::config::MinimalConfig;

    use super::*;

    const MAX_EB: Gwei = 32_000_000_000;

    fn active_validator() -> Validator {
        Validator {
            effective_balance: MAX_EB,
            activation_epoch: 0,
            exit_epoch: u64::max_value(),
            withdrawable_epoch: u64::max_value(),
            ..Validator::default()
        }
    }

    fn genesis_state(count: usize) -> BeaconState<MinimalConfig> {
        BeaconState {
            validators: VariableList::from(vec![active_validator(); count]),
            balances: VariableList::from(vec![MAX_EB; count]),
            previous_epoch_participation: VariableList::from(vec![0; count]),
            current_epoch_participation: VariableList::from(vec![0; count]),
            inactivity_scores: VariableList::from(vec![0; count]),
            randao_mixes: FixedVector::from(vec![H256::from([2; 32]); 8]),
            ..BeaconState::default()
        }
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutations() {
        let machine = StateMachine::new(genesis_state(2));

        let snapshot = machine.snapshot();
        machine.increase_balance(0, 5);

        assert_eq!(snapshot.balances[0], MAX_EB);
        assert_eq!(machine.snapshot().balances[0], MAX_EB + 5);
    }

    #[test]
    fn slot_processing_advances_through_epochs() {
        let machine = StateMachine::new(genesis_state(4));

        machine
            .process_slots(17)
            .expect("the target slot is ahead of the state");

        assert_eq!(machine.slot(), 17);
        assert_eq!(machine.current_epoch(), 2);
        // The second boundary crossed charged the no-participation
        // penalties for epoch 0.
        assert!(machine.snapshot().balances.iter().all(|b| *b < MAX_EB));
    }

    #[test]
    fn adding_a_validator_grows_every_parallel_list() {
        let machine = StateMachine::new(genesis_state(1));

        machine
            .add_validator(active_validator(), MAX_EB)
            .expect("the registry has room");

        let state = machine.snapshot();
        assert_eq!(state.validators.len(), 2);
        assert!(state.registry_is_consistent());
    }

    #[test]
    fn effective_balances_match_the_registry() {
        let machine = StateMachine::new(genesis_state(3));
        assert_eq!(machine.effective_balances(), vec![MAX_EB; 3]);
    }

    #[test]
    fn proposer_index_is_deterministic() {
        let machine = StateMachine::new(genesis_state(4));
        let first = machine.proposer_index().expect("validators are active");
        let second = machine.proposer_index().expect("validators are active");
        assert_eq!(first, second);
    }
}
