use std::cmp;
use std::collections::BTreeSet;
use std::convert::TryFrom;

use ssz_types::BitList;
use typenum::marker_traits::Unsigned;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::*;
use types::types::{Attestation, AttestationData, IndexedAttestation};

use crate::crypto::hash;
use crate::error::Error;
use crate::math::int_to_bytes;
use crate::misc::{compute_committee, compute_epoch_at_slot, compute_proposer_index};
use crate::predicates::is_active_validator;

/// Seed derivation consumes this many leading bytes of a RANDAO mix.
const SEED_MIX_LENGTH: usize = 20;

pub fn get_current_epoch<C: Config>(state: &BeaconState<C>) -> Epoch {
    compute_epoch_at_slot::<C>(state.slot)
}

pub fn get_previous_epoch<C: Config>(state: &BeaconState<C>) -> Epoch {
    let current_epoch = get_current_epoch(state);
    let genesis_epoch = C::genesis_epoch();

    if current_epoch > genesis_epoch {
        current_epoch - 1
    } else {
        genesis_epoch
    }
}

pub fn get_block_root<C: Config>(state: &BeaconState<C>, epoch: Epoch) -> Result<H256, Error> {
    get_block_root_at_slot(state, epoch * C::SlotsPerEpoch::to_u64())
}

pub fn get_block_root_at_slot<C: Config>(
    state: &BeaconState<C>,
    slot: Slot,
) -> Result<H256, Error> {
    if !(slot < state.slot && state.slot <= slot + C::SlotsPerHistoricalRoot::to_u64()) {
        return Err(Error::SlotOutOfRange);
    }
    match usize::try_from(slot % C::SlotsPerHistoricalRoot::to_u64()) {
        Err(_err) => Err(Error::IndexOutOfRange),
        Ok(id) => Ok(state.block_roots[id]),
    }
}

pub fn get_randao_mix<C: Config>(state: &BeaconState<C>, epoch: Epoch) -> Result<H256, Error> {
    match usize::try_from(epoch % C::EpochsPerHistoricalVector::to_u64()) {
        Err(_err) => Err(Error::IndexOutOfRange),
        Ok(id) => Ok(state.randao_mixes[id]),
    }
}

pub fn get_active_validator_indices<C: Config>(
    state: &BeaconState<C>,
    epoch: Epoch,
) -> Vec<ValidatorIndex> {
    let mut active_validator_indices = Vec::new();
    for (i, validator) in state.validators.iter().enumerate() {
        if is_active_validator(validator, epoch) {
            active_validator_indices.push(i as ValidatorIndex);
        }
    }
    active_validator_indices
}

pub fn get_validator_churn_limit<C: Config>(state: &BeaconState<C>) -> u64 {
    let active_validator_indices = get_active_validator_indices(state, get_current_epoch(state));

    cmp::max(
        C::min_per_epoch_churn_limit(),
        active_validator_indices.len() as u64 / C::churn_limit_quotient(),
    )
}

/// SHA-256(domain_type_le ‖ epoch_le ‖ mix[0..20]).
pub fn get_seed<C: Config>(
    state: &BeaconState<C>,
    epoch: Epoch,
    domain_type: DomainType,
) -> Result<H256, Error> {
    let mix = get_randao_mix(state, epoch)?;

    let mut input = [0; 32];
    input[0..4].copy_from_slice(&domain_type.to_le_bytes());
    input[4..12].copy_from_slice(&int_to_bytes(epoch, 8));
    input[12..32].copy_from_slice(&mix[..SEED_MIX_LENGTH]);

    Ok(H256::from_slice(&hash(&input)))
}

pub fn get_beacon_proposer_index<C: Config>(
    state: &BeaconState<C>,
) -> Result<ValidatorIndex, Error> {
    let epoch = get_current_epoch(state);
    let epoch_seed = get_seed(state, epoch, C::domain_beacon_proposer())?;

    let mut combined = epoch_seed.as_bytes().to_vec();
    combined.append(&mut int_to_bytes(state.slot, 8));
    let slot_seed = H256::from_slice(&hash(&combined));

    let indices = get_active_validator_indices(state, epoch);
    compute_proposer_index(state, &indices, &slot_seed)
}

pub fn get_committee_count_per_slot<C: Config>(state: &BeaconState<C>, epoch: Epoch) -> u64 {
    cmp::max(
        1,
        cmp::min(
            C::max_committees_per_slot(),
            get_active_validator_indices(state, epoch).len() as u64
                / C::SlotsPerEpoch::to_u64()
                / C::target_committee_size(),
        ),
    )
}

pub fn get_beacon_committee<C: Config>(
    state: &BeaconState<C>,
    slot: Slot,
    index: CommitteeIndex,
) -> Result<Vec<ValidatorIndex>, Error> {
    let epoch = compute_epoch_at_slot::<C>(slot);
    let committees_per_slot = get_committee_count_per_slot(state, epoch);
    if index >= committees_per_slot {
        return Err(Error::CommitteeIndexOutOfRange);
    }

    compute_committee::<C>(
        &get_active_validator_indices(state, epoch),
        &get_seed(state, epoch, C::domain_beacon_attester())?,
        (slot % C::SlotsPerEpoch::to_u64()) * committees_per_slot + index,
        committees_per_slot * C::SlotsPerEpoch::to_u64(),
    )
}

/// Enumerates the validators whose aggregation bits are set, walking the
/// committee for `(data.slot, data.index)`.
pub fn get_attesting_indices<C: Config>(
    state: &BeaconState<C>,
    data: &AttestationData,
    bits: &BitList<C::MaxValidatorsPerCommittee>,
) -> Result<BTreeSet<ValidatorIndex>, Error> {
    let committee = get_beacon_committee(state, data.slot, data.index)?;
    if bits.len() != committee.len() {
        return Err(Error::AttestationBitsInvalid);
    }

    let mut attesting_indices = BTreeSet::new();
    for (position, index) in committee.iter().enumerate() {
        if bits.get(position) == Ok(true) {
            attesting_indices.insert(*index);
        }
    }
    Ok(attesting_indices)
}

pub fn get_indexed_attestation<C: Config>(
    state: &BeaconState<C>,
    attestation: &Attestation<C>,
) -> Result<IndexedAttestation<C>, Error> {
    let attesting_indices =
        get_attesting_indices(state, &attestation.data, &attestation.aggregation_bits)?;

    // A `BTreeSet` iterates in ascending order, which is the order indexed
    // attestations require.
    Ok(IndexedAttestation {
        attesting_indices: attesting_indices.into_iter().collect::<Vec<_>>().into(),
        data: attestation.data.clone(),
        signature: attestation.signature.clone(),
    })
}

pub fn get_total_balance<C: Config>(
    state: &BeaconState<C>,
    indices: &[ValidatorIndex],
) -> Result<Gwei, Error> {
    let mut sum = 0;
    for index in indices.iter() {
        match usize::try_from(*index) {
            Err(_err) => return Err(Error::IndexOutOfRange),
            Ok(id) => {
                sum += state
                    .validators
                    .get(id)
                    .ok_or(Error::IndexOutOfRange)?
                    .effective_balance
            }
        }
    }
    // Never less than one increment, so that callers can divide by it.
    Ok(cmp::max(C::effective_balance_increment(), sum))
}

pub fn get_total_active_balance<C: Config>(state: &BeaconState<C>) -> Result<Gwei, Error> {
    get_total_balance(
        state,
        &get_active_validator_indices(state, get_current_epoch(state)),
    )
}

pub fn get_domain<C: Config>(
    state: &BeaconState<C>,
    domain_type: DomainType,
    message_epoch: Option<Epoch>,
) -> Domain {
    let epoch = message_epoch.unwrap_or_else(|| get_current_epoch(state));
    let fork_version = if epoch < state.fork.epoch {
        &state.fork.previous_version
    } else {
        &state.fork.current_version
    };
    crate::misc::compute_domain(domain_type, Some(fork_version))
}
