use std::cmp;
use std::mem;

use helper_functions::{
    beacon_state_accessors::{
        get_active_validator_indices, get_block_root, get_current_epoch, get_previous_epoch,
        get_randao_mix, get_seed, get_total_active_balance, get_total_balance,
        get_validator_churn_limit,
    },
    beacon_state_mutators::{decrease_balance, initiate_validator_exit},
    crypto::{hash, hash_tree_root},
    error::Error as HelperError,
    math::int_to_bytes,
    misc::{compute_activation_exit_epoch, compute_shuffled_index},
    predicates::{is_active_validator, is_eligible_for_activation_queue},
};
use itertools::Itertools as _;
use log::info;
use ssz_types::VariableList;
use typenum::marker_traits::Unsigned;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::consts::*;
use types::primitives::*;
use types::types::{Checkpoint, HistoricalBatch, SyncCommittee};

use super::rewards_and_penalties::{
    get_unslashed_participating_indices, process_inactivity_updates,
    process_rewards_and_penalties,
};

/// Candidate draws before sync-committee sampling falls back to padding.
const SYNC_SAMPLING_BOUND: u64 = 65_536;

/// The epoch transition. All-or-nothing: the caller holds the exclusive
/// state lock for the whole call, and any internal inconsistency panics
/// rather than leaving a partial transition behind.
pub fn process_epoch<C: Config>(state: &mut BeaconState<C>) {
    assert!(
        state.registry_is_consistent(),
        "validators, balances, participation and inactivity scores must be co-indexed",
    );

    process_justification_and_finalization(state);
    process_inactivity_updates(state);
    process_rewards_and_penalties(state);
    process_registry_updates(state);
    process_slashings(state);
    process_final_updates(state);
}

/// Casper FFG: shift the justification bits, justify this epoch's targets
/// when they reach a supermajority, then try the four finalization rules
/// against the pre-shift checkpoints.
pub fn process_justification_and_finalization<C: Config>(state: &mut BeaconState<C>) {
    let current_epoch = get_current_epoch(state);
    if current_epoch <= C::genesis_epoch() + 1 {
        return;
    }
    let previous_epoch = get_previous_epoch(state);

    let old_previous_justified = state.previous_justified_checkpoint;
    let old_current_justified = state.current_justified_checkpoint;
    let old_finalized_epoch = state.finalized_checkpoint.epoch;

    let total_active_balance =
        get_total_active_balance(state).expect("active validator indices are in range");
    let previous_target_balance = attesting_target_balance(state, previous_epoch);
    let current_target_balance = attesting_target_balance(state, current_epoch);

    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    shift_justification_bits(state);

    if previous_target_balance * 3 >= total_active_balance * 2 {
        state.current_justified_checkpoint = Checkpoint {
            epoch: previous_epoch,
            root: get_block_root(state, previous_epoch)
                .expect("the previous epoch start slot is within the root buffer"),
        };
        set_justification_bit(state, 1);
    }
    if current_target_balance * 3 >= total_active_balance * 2 {
        state.current_justified_checkpoint = Checkpoint {
            epoch: current_epoch,
            root: get_block_root(state, current_epoch)
                .expect("the current epoch start slot is within the root buffer"),
        };
        set_justification_bit(state, 0);
    }

    let bits = &state.justification_bits;
    let bit = |index: usize| bits.get(index).unwrap_or(false);

    // 2nd/3rd/4th most recent epochs justified, 4th as source.
    if bit(1) && bit(2) && bit(3) && old_previous_justified.epoch + 3 == current_epoch {
        state.finalized_checkpoint = old_previous_justified;
    }
    // 2nd/3rd most recent epochs justified, 3rd as source.
    if bit(1) && bit(2) && old_previous_justified.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_previous_justified;
    }
    // 1st/2nd/3rd most recent epochs justified, 3rd as source.
    if bit(0) && bit(1) && bit(2) && old_current_justified.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_current_justified;
    }
    // 1st/2nd most recent epochs justified, 2nd as source.
    if bit(0) && bit(1) && old_current_justified.epoch + 1 == current_epoch {
        state.finalized_checkpoint = old_current_justified;
    }

    if state.finalized_checkpoint.epoch > old_finalized_epoch {
        info!(
            "finalized epoch {} at epoch {}",
            state.finalized_checkpoint.epoch, current_epoch,
        );
    }
}

fn attesting_target_balance<C: Config>(state: &BeaconState<C>, epoch: Epoch) -> Gwei {
    let indices: Vec<ValidatorIndex> =
        get_unslashed_participating_indices(state, TIMELY_TARGET_FLAG_INDEX, epoch)
            .into_iter()
            .collect();
    match get_total_balance(state, &indices) {
        Ok(balance) => balance,
        Err(HelperError::IndexOutOfRange) => unreachable!("indices come from the registry"),
        Err(_) => 0,
    }
}

fn shift_justification_bits<C: Config>(state: &mut BeaconState<C>) {
    let old = state.justification_bits.clone();
    for index in (1..JUSTIFICATION_BITS_LENGTH).rev() {
        let previous = old.get(index - 1).unwrap_or(false);
        state
            .justification_bits
            .set(index, previous)
            .expect("justification bit index is within bounds");
    }
    state
        .justification_bits
        .set(0, false)
        .expect("justification bit index is within bounds");
}

fn set_justification_bit<C: Config>(state: &mut BeaconState<C>, index: usize) {
    state
        .justification_bits
        .set(index, true)
        .expect("justification bit index is within bounds");
}

/// Queues newly funded validators, ejects validators that fell to the
/// ejection balance, and activates the queue head up to the churn limit.
pub fn process_registry_updates<C: Config>(state: &mut BeaconState<C>) {
    let current_epoch = get_current_epoch(state);

    let mut newly_eligible = Vec::new();
    let mut exiting = Vec::new();
    for (index, validator) in state.validators.iter().enumerate() {
        if is_eligible_for_activation_queue::<C>(validator) {
            newly_eligible.push(index);
        }
        if is_active_validator(validator, current_epoch)
            && validator.effective_balance <= C::ejection_balance()
        {
            exiting.push(index as ValidatorIndex);
        }
    }

    for index in newly_eligible {
        state.validators[index].activation_eligibility_epoch = current_epoch + 1;
    }
    for index in exiting {
        match initiate_validator_exit(state, index) {
            Ok(()) | Err(HelperError::ValidatorExitAlreadyInitiated) => {}
            Err(error) => unreachable!("ejected index comes from the registry: {:?}", error),
        }
    }

    // Queue eligible validators not dequeued before the finalized epoch,
    // ordered by eligibility epoch with the index as tie-break.
    let activation_queue = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            validator.activation_eligibility_epoch != C::far_future_epoch()
                && validator.activation_epoch
                    >= compute_activation_exit_epoch::<C>(state.finalized_checkpoint.epoch)
        })
        .sorted_by_key(|(index, validator)| (validator.activation_eligibility_epoch, *index))
        .map(|(index, _)| index)
        .collect_vec();

    let churn_limit = get_validator_churn_limit(state);
    let delayed_activation_epoch = compute_activation_exit_epoch::<C>(current_epoch);
    for index in activation_queue.into_iter().take(churn_limit as usize) {
        let validator = &mut state.validators[index];
        if validator.activation_epoch == C::far_future_epoch() {
            validator.activation_epoch = delayed_activation_epoch;
        }
    }
}

/// Applies the proportional penalty to validators halfway through their
/// slashing withdrawal span.
pub fn process_slashings<C: Config>(state: &mut BeaconState<C>) {
    let epoch = get_current_epoch(state);
    let total_balance =
        get_total_active_balance(state).expect("active validator indices are in range");
    let slashings_sum: Gwei = state.slashings.iter().sum();
    let adjusted_total = cmp::min(
        slashings_sum * C::proportional_slashing_multiplier(),
        total_balance,
    );

    let mut penalties = Vec::new();
    for (index, validator) in state.validators.iter().enumerate() {
        if validator.slashed
            && epoch + C::EpochsPerSlashingsVector::to_u64() / 2 == validator.withdrawable_epoch
        {
            let increment = C::effective_balance_increment();
            let penalty_numerator = validator.effective_balance / increment * adjusted_total;
            let penalty = penalty_numerator / total_balance * increment;
            penalties.push((index as ValidatorIndex, penalty));
        }
    }
    for (index, penalty) in penalties {
        decrease_balance(state, index, penalty);
    }
}

/// Everything that rotates at the epoch boundary: eth1 votes, effective
/// balances, the slashings ring, RANDAO mixes, historical roots,
/// participation arrays and sync committees.
pub fn process_final_updates<C: Config>(state: &mut BeaconState<C>) {
    let current_epoch = get_current_epoch(state);
    let next_epoch = current_epoch + 1;

    // Reset eth1 data votes.
    if (state.slot + 1) % C::SlotsPerEth1VotingPeriod::to_u64() == 0 {
        state.eth1_data_votes = VariableList::from(vec![]);
    }

    // Update effective balances with hysteresis.
    let hysteresis_increment = C::effective_balance_increment() / C::hysteresis_quotient();
    let downward = hysteresis_increment * C::hysteresis_downward_multiplier();
    let upward = hysteresis_increment * C::hysteresis_upward_multiplier();
    for index in 0..state.validators.len() {
        let balance = state.balances[index];
        let validator = &mut state.validators[index];
        if balance + downward < validator.effective_balance
            || validator.effective_balance + upward < balance
        {
            validator.effective_balance = cmp::min(
                balance - balance % C::effective_balance_increment(),
                C::max_effective_balance(),
            );
        }
    }

    // Reset slashings.
    let slashings_index = (next_epoch % C::EpochsPerSlashingsVector::to_u64()) as usize;
    state.slashings[slashings_index] = 0;

    // Rotate the RANDAO mix into the next epoch.
    let mixes_index = (next_epoch % C::EpochsPerHistoricalVector::to_u64()) as usize;
    state.randao_mixes[mixes_index] =
        get_randao_mix(state, current_epoch).expect("the mix index wraps modulo the vector");

    // Set the historical root accumulator.
    if next_epoch % (C::SlotsPerHistoricalRoot::to_u64() / C::SlotsPerEpoch::to_u64()) == 0 {
        let historical_batch = HistoricalBatch::<C> {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        };
        state
            .historical_roots
            .push(hash_tree_root(&historical_batch))
            .expect("the historical roots limit is effectively unreachable");
    }

    // Rotate participation: previous <- current, current <- zeroed.
    let zeroed = VariableList::from(vec![0; state.validators.len()]);
    state.previous_epoch_participation =
        mem::replace(&mut state.current_epoch_participation, zeroed);

    // Rotate sync committees at the period boundary.
    if next_epoch % C::epochs_per_sync_committee_period() == 0 {
        let incoming = get_next_sync_committee(state);
        state.current_sync_committee = mem::replace(&mut state.next_sync_committee, incoming);
    }
}

/// Effective-balance-weighted sampling of the next sync committee.
///
/// The aggregate pubkey is a SHA-256 placeholder; a real deployment derives
/// it with the BLS backend instead.
pub fn get_next_sync_committee<C: Config>(state: &BeaconState<C>) -> SyncCommittee<C> {
    let epoch = get_current_epoch(state) + 1;
    let active = get_active_validator_indices(state, epoch);
    if active.is_empty() {
        return SyncCommittee::default();
    }

    let seed = match get_seed(state, epoch, C::domain_sync_committee()) {
        Ok(seed) => seed,
        Err(_) => return SyncCommittee::default(),
    };

    let total = active.len() as u64;
    let size = C::SyncCommitteeSize::to_usize();
    let mut pubkeys = Vec::with_capacity(size);
    let mut i = 0;
    while pubkeys.len() < size && i < SYNC_SAMPLING_BOUND {
        let shuffled = compute_shuffled_index::<C>(i % total, total, &seed)
            .expect("the index is reduced modulo the active count");
        let candidate = active[shuffled as usize];

        let mut combined = seed.as_bytes().to_vec();
        combined.append(&mut int_to_bytes(i / 32, 8));
        let random_byte = hash(&combined)[(i % 32) as usize];

        let effective_balance = state.validators[candidate as usize].effective_balance;
        if effective_balance * 255 >= C::max_effective_balance() * u64::from(random_byte) {
            pubkeys.push(state.validators[candidate as usize].pubkey);
        }
        i += 1;
    }
    while pubkeys.len() < size {
        pubkeys.push(state.validators[active[0] as usize].pubkey);
    }

    let mut concatenated = Vec::with_capacity(48 * size);
    for pubkey in &pubkeys {
        concatenated.extend_from_slice(pubkey.as_bytes());
    }
    let digest = hash(&concatenated);
    let mut aggregate = [0; 48];
    aggregate[..32].copy_from_slice(&digest);

    SyncCommittee {
        pubkeys: pubkeys.into(),
        aggregate_pubkey: PublicKeyBytes::from_bytes(&aggregate)
            .expect("48 bytes is a valid public key"),
    }
}
