use std::collections::BTreeSet;

use helper_functions::{
    beacon_state_accessors::{
        get_current_epoch, get_previous_epoch, get_total_active_balance,
    },
    beacon_state_mutators::{decrease_balance, increase_balance},
    math::integer_squareroot,
    participation_flags::has_flag,
    predicates::is_active_validator,
};
use rayon::prelude::*;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::consts::*;
use types::primitives::*;

pub fn get_base_reward<C: Config>(effective_balance: Gwei, sqrt_total_active_balance: u64) -> Gwei {
    effective_balance * C::base_reward_factor() / sqrt_total_active_balance
}

/// Active at `epoch`, unslashed, and holding `flag_index` in the matching
/// participation array.
pub fn get_unslashed_participating_indices<C: Config>(
    state: &BeaconState<C>,
    flag_index: u8,
    epoch: Epoch,
) -> BTreeSet<ValidatorIndex> {
    let participation = if epoch == get_current_epoch(state) {
        &state.current_epoch_participation
    } else {
        &state.previous_epoch_participation
    };

    state
        .validators
        .iter()
        .enumerate()
        .filter(|(index, validator)| {
            is_active_validator(validator, epoch)
                && !validator.slashed
                && has_flag(participation[*index], flag_index)
        })
        .map(|(index, _)| index as ValidatorIndex)
        .collect()
}

pub fn get_eligible_validator_indices<C: Config>(state: &BeaconState<C>) -> Vec<ValidatorIndex> {
    let previous_epoch = get_previous_epoch(state);
    state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            is_active_validator(validator, previous_epoch)
                || (validator.slashed && previous_epoch + 1 < validator.withdrawable_epoch)
        })
        .map(|(index, _)| index as ValidatorIndex)
        .collect()
}

pub fn is_in_inactivity_leak<C: Config>(state: &BeaconState<C>) -> bool {
    get_current_epoch(state) - state.finalized_checkpoint.epoch
        > C::min_epochs_to_inactivity_penalty()
}

/// Inactivity scores only move for validators eligible in the previous
/// epoch: timely-target attesters recover, everyone else accrues, and
/// outside a leak scores drain quickly.
pub fn process_inactivity_updates<C: Config>(state: &mut BeaconState<C>) {
    if get_current_epoch(state) == C::genesis_epoch() {
        return;
    }

    let previous_epoch = get_previous_epoch(state);
    let target_attesters =
        get_unslashed_participating_indices(state, TIMELY_TARGET_FLAG_INDEX, previous_epoch);
    let leaking = is_in_inactivity_leak(state);

    for index in get_eligible_validator_indices(state) {
        let id = index as usize;
        let mut score = state.inactivity_scores[id];

        if target_attesters.contains(&index) {
            score -= std::cmp::min(1, score);
        } else {
            score += C::inactivity_score_bias();
        }
        if !leaking {
            score -= std::cmp::min(C::inactivity_score_recovery_rate(), score);
        }

        state.inactivity_scores[id] = score;
    }
}

/// One epoch of attestation rewards and penalties under the participation
/// flag model. The per-validator deltas are independent, so they are
/// computed in parallel and applied in index order.
pub fn process_rewards_and_penalties<C: Config>(state: &mut BeaconState<C>) {
    if get_current_epoch(state) == C::genesis_epoch() {
        return;
    }

    let previous_epoch = get_previous_epoch(state);
    let total_active_balance =
        get_total_active_balance(state).expect("active validator indices are in range");
    let sqrt_total = integer_squareroot(total_active_balance);

    let flags = [
        (TIMELY_SOURCE_FLAG_INDEX, C::timely_source_weight()),
        (TIMELY_TARGET_FLAG_INDEX, C::timely_target_weight()),
        (TIMELY_HEAD_FLAG_INDEX, C::timely_head_weight()),
    ];
    let participating: Vec<BTreeSet<ValidatorIndex>> = flags
        .iter()
        .map(|(flag_index, _)| {
            get_unslashed_participating_indices(state, *flag_index, previous_epoch)
        })
        .collect();
    let eligible: BTreeSet<ValidatorIndex> =
        get_eligible_validator_indices(state).into_iter().collect();

    let deltas: Vec<(Gwei, Gwei)> = (0..state.validators.len())
        .into_par_iter()
        .map(|id| {
            let index = id as ValidatorIndex;
            if !eligible.contains(&index) {
                return (0, 0);
            }

            let effective_balance = state.validators[id].effective_balance;
            let base_reward = get_base_reward::<C>(effective_balance, sqrt_total);

            let mut reward = 0;
            let mut penalty = 0;
            for ((flag_index, weight), attesters) in flags.iter().zip(&participating) {
                if attesters.contains(&index) {
                    reward += base_reward * weight / C::weight_denominator();
                } else if *flag_index != TIMELY_HEAD_FLAG_INDEX {
                    // Missing the head earns nothing but costs nothing.
                    penalty += base_reward * weight / C::weight_denominator();
                }
            }

            if !participating[TIMELY_TARGET_FLAG_INDEX as usize].contains(&index) {
                penalty += effective_balance * state.inactivity_scores[id]
                    / C::inactivity_penalty_quotient();
            }

            (reward, penalty)
        })
        .collect();

    for (id, (reward, penalty)) in deltas.into_iter().enumerate() {
        increase_balance(state, id as ValidatorIndex, reward);
        decrease_balance(state, id as ValidatorIndex, penalty);
    }
}
