use std::cmp;
use std::convert::TryFrom;

use typenum::marker_traits::Unsigned;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::*;

use crate::beacon_state_accessors::{
    get_beacon_proposer_index, get_current_epoch, get_validator_churn_limit,
};
use crate::error::Error;
use crate::misc::compute_activation_exit_epoch;

pub fn increase_balance<C: Config>(state: &mut BeaconState<C>, index: ValidatorIndex, delta: Gwei) {
    match usize::try_from(index) {
        Err(_err) => {}
        Ok(id) => state.balances[id] += delta,
    }
}

/// Clamps at zero; a negative balance is never materialized.
pub fn decrease_balance<C: Config>(state: &mut BeaconState<C>, index: ValidatorIndex, delta: Gwei) {
    match usize::try_from(index) {
        Err(_err) => {}
        Ok(id) => {
            state.balances[id] = if delta > state.balances[id] {
                0
            } else {
                state.balances[id] - delta
            }
        }
    }
}

/// Places the validator in the exit queue. The queue epoch is the latest
/// pending exit (or the earliest the lookahead allows) and moves back one
/// epoch whenever a full churn's worth of validators already leaves there.
pub fn initiate_validator_exit<C: Config>(
    state: &mut BeaconState<C>,
    index: ValidatorIndex,
) -> Result<(), Error> {
    let id = usize::try_from(index).map_err(|_| Error::IndexOutOfRange)?;
    if id >= state.validators.len() {
        return Err(Error::IndexOutOfRange);
    }
    if state.validators[id].exit_epoch != C::far_future_epoch() {
        return Err(Error::ValidatorExitAlreadyInitiated);
    }

    let mut exit_queue_epoch = state
        .validators
        .iter()
        .map(|validator| validator.exit_epoch)
        .filter(|exit_epoch| *exit_epoch != C::far_future_epoch())
        .max()
        .unwrap_or(0);
    exit_queue_epoch = cmp::max(
        exit_queue_epoch,
        compute_activation_exit_epoch::<C>(get_current_epoch(state)),
    );

    let exit_queue_churn = state
        .validators
        .iter()
        .filter(|validator| validator.exit_epoch == exit_queue_epoch)
        .count() as u64;
    if exit_queue_churn >= get_validator_churn_limit(state) {
        exit_queue_epoch += 1;
    }

    let validator = &mut state.validators[id];
    validator.exit_epoch = exit_queue_epoch;
    validator.withdrawable_epoch = exit_queue_epoch + C::min_validator_withdrawability_delay();

    Ok(())
}

/// Marks the validator slashed, records its balance in the slashings ring,
/// applies the immediate penalty and credits the proposer and whistleblower.
pub fn slash_validator<C: Config>(
    state: &mut BeaconState<C>,
    slashed_index: ValidatorIndex,
    whistleblower_index: Option<ValidatorIndex>,
) -> Result<(), Error> {
    let epoch = get_current_epoch(state);
    match initiate_validator_exit(state, slashed_index) {
        Ok(()) | Err(Error::ValidatorExitAlreadyInitiated) => {}
        Err(error) => return Err(error),
    }

    let id = usize::try_from(slashed_index).map_err(|_| Error::IndexOutOfRange)?;
    let effective_balance = {
        let validator = &mut state.validators[id];
        validator.slashed = true;
        validator.withdrawable_epoch = cmp::max(
            validator.withdrawable_epoch,
            epoch + C::EpochsPerSlashingsVector::to_u64(),
        );
        validator.effective_balance
    };

    let ring_index = (epoch % C::EpochsPerSlashingsVector::to_u64()) as usize;
    state.slashings[ring_index] += effective_balance;
    decrease_balance(
        state,
        slashed_index,
        effective_balance / C::min_slashing_penalty_quotient(),
    );

    let proposer_index = get_beacon_proposer_index(state)?;
    let whistleblower_reward = effective_balance / C::whistleblower_reward_quotient();
    let proposer_reward = whistleblower_reward * C::proposer_weight() / C::weight_denominator();
    increase_balance(state, proposer_index, proposer_reward);
    increase_balance(
        state,
        whistleblower_index.unwrap_or(proposer_index),
        whistleblower_reward - proposer_reward,
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use ssz_types::{FixedVector, VariableList};
    use types::config::MainnetConfig;
    use types::types::Validator;

    use super::*;

    #[test]
    fn test_increase_balance() {
        let mut state: BeaconState<MainnetConfig> = BeaconState {
            balances: VariableList::from(vec![0]),
            ..BeaconState::default()
        };
        increase_balance(&mut state, 0, 1);
        assert_eq!(state.balances[0], 1);
    }

    #[test]
    fn test_decrease_balance() {
        let mut state: BeaconState<MainnetConfig> = BeaconState {
            balances: VariableList::from(vec![5]),
            ..BeaconState::default()
        };
        decrease_balance(&mut state, 0, 3);
        assert_eq!(state.balances[0], 2);
    }

    #[test]
    fn test_decrease_balance_clamps_at_zero() {
        let mut state: BeaconState<MainnetConfig> = BeaconState {
            balances: VariableList::from(vec![0]),
            ..BeaconState::default()
        };
        decrease_balance(&mut state, 0, 1);
        assert_eq!(state.balances[0], 0);
    }

    #[test]
    fn exit_respects_activation_lookahead() {
        let validator = Validator {
            activation_epoch: 0,
            exit_epoch: u64::max_value(),
            withdrawable_epoch: u64::max_value(),
            ..Validator::default()
        };
        let mut state: BeaconState<MainnetConfig> = BeaconState {
            validators: VariableList::from(vec![validator]),
            balances: VariableList::from(vec![32_000_000_000]),
            ..BeaconState::default()
        };

        initiate_validator_exit(&mut state, 0).expect("validator has not exited yet");

        let exited = &state.validators[0];
        assert_eq!(
            exited.exit_epoch,
            compute_activation_exit_epoch::<MainnetConfig>(0),
        );
        assert_eq!(
            exited.withdrawable_epoch,
            exited.exit_epoch + MainnetConfig::min_validator_withdrawability_delay(),
        );
    }

    #[test]
    fn repeated_exit_is_rejected() {
        let validator = Validator {
            activation_epoch: 0,
            exit_epoch: u64::max_value(),
            withdrawable_epoch: u64::max_value(),
            ..Validator::default()
        };
        let mut state: BeaconState<MainnetConfig> = BeaconState {
            validators: VariableList::from(vec![validator]),
            balances: VariableList::from(vec![32_000_000_000]),
            ..BeaconState::default()
        };

        initiate_validator_exit(&mut state, 0).expect("validator has not exited yet");
        assert_eq!(
            initiate_validator_exit(&mut state, 0),
            Err(Error::ValidatorExitAlreadyInitiated),
        );
    }

    #[test]
    fn slashed_validator_is_penalized_and_recorded() {
        let validator = Validator {
            effective_balance: 32_000_000_000,
            activation_epoch: 0,
            exit_epoch: u64::max_value(),
            withdrawable_epoch: u64::max_value(),
            ..Validator::default()
        };
        let mut state: BeaconState<MainnetConfig> = BeaconState {
            validators: VariableList::from(vec![validator; 4]),
            balances: VariableList::from(vec![32_000_000_000; 4]),
            randao_mixes: FixedVector::from(vec![H256::from([1; 32]); 4]),
            ..BeaconState::default()
        };

        slash_validator(&mut state, 0, None).expect("validator is slashable");

        assert!(state.validators[0].slashed);
        assert_eq!(
            state.validators[0].withdrawable_epoch,
            <MainnetConfig as Config>::EpochsPerSlashingsVector::to_u64(),
        );
        assert_eq!(state.slashings[0], 32_000_000_000);
        assert!(state.balances[0] < 32_000_000_000);
    }
}
