use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::*;
use types::types::{AttestationData, IndexedAttestation, Validator};
use typenum::marker_traits::Unsigned;

use crate::crypto::{signing_root, SignatureVerifier};
use crate::error::Error;
use crate::misc::compute_domain;

pub fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}

pub fn is_slashable_validator(validator: &Validator, epoch: Epoch) -> bool {
    !validator.slashed
        && validator.activation_epoch <= epoch
        && epoch < validator.withdrawable_epoch
}

pub fn is_eligible_for_activation_queue<C: Config>(validator: &Validator) -> bool {
    validator.activation_eligibility_epoch == C::far_future_epoch()
        && validator.effective_balance == C::max_effective_balance()
}

pub fn is_slashable_attestation_data(data_1: &AttestationData, data_2: &AttestationData) -> bool {
    // Double vote
    (data_1 != data_2 && data_1.target.epoch == data_2.target.epoch) ||
    // Surround vote
    (data_1.source.epoch < data_2.source.epoch && data_2.target.epoch < data_1.target.epoch)
}

/// Indices must be sorted, unique, non-empty and within the committee cap;
/// the aggregate signature must check out against the attesting pubkeys.
pub fn is_valid_indexed_attestation<C: Config>(
    state: &BeaconState<C>,
    indexed_attestation: &IndexedAttestation<C>,
    verifier: &dyn SignatureVerifier,
) -> Result<(), Error> {
    let indices = &indexed_attestation.attesting_indices;

    if indices.is_empty() {
        return Err(Error::AttestingIndicesEmpty);
    }
    if indices.len() > C::MaxValidatorsPerCommittee::to_usize() {
        return Err(Error::MaxIndicesExceeded);
    }
    let is_sorted_and_unique = indices.windows(2).all(|pair| pair[0] < pair[1]);
    if !is_sorted_and_unique {
        return Err(Error::AttestingIndicesNotSorted);
    }

    let mut pubkeys = Vec::with_capacity(indices.len());
    for index in indices.iter() {
        let validator = state
            .validators
            .get(*index as usize)
            .ok_or(Error::IndexOutOfRange)?;
        pubkeys.push(validator.pubkey);
    }

    let domain = compute_domain(
        C::domain_beacon_attester(),
        Some(&state.fork.current_version),
    );
    let root = signing_root(&indexed_attestation.data, domain);
    if !verifier.fast_aggregate_verify(root, &pubkeys, &indexed_attestation.signature) {
        return Err(Error::SignatureInvalid);
    }

    Ok(())
}
