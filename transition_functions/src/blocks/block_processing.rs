use std::cmp;
use std::convert::TryFrom;

use helper_functions::{
    beacon_state_accessors::{
        get_beacon_proposer_index, get_current_epoch, get_domain, get_indexed_attestation,
        get_previous_epoch, get_randao_mix, get_total_active_balance,
    },
    beacon_state_mutators::{increase_balance, initiate_validator_exit, slash_validator},
    crypto::{hash, hash_tree_root, signing_root, SignatureVerifier},
    error::Error as HelperError,
    math::{integer_squareroot, xor},
    misc::{compute_domain, compute_epoch_at_slot},
    participation_flags::add_flag,
    predicates::{
        is_active_validator, is_slashable_attestation_data, is_slashable_validator,
        is_valid_indexed_attestation,
    },
};
use typenum::marker_traits::Unsigned;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::consts::*;
use types::primitives::*;
use types::types::{
    Attestation, AttesterSlashing, BeaconBlockHeader, Deposit, DepositMessage, ProposerSlashing,
    SignedBeaconBlock, SignedVoluntaryExit,
};

use crate::epochs::rewards_and_penalties::get_base_reward;
use crate::Error;

pub fn process_block<C: Config>(
    state: &mut BeaconState<C>,
    signed_block: &SignedBeaconBlock<C>,
    verifier: &dyn SignatureVerifier,
) -> Result<(), Error> {
    process_block_header(state, signed_block, verifier)?;
    process_randao(state, &signed_block.message.body.randao_reveal, verifier)?;
    process_eth1_data(state, &signed_block.message.body.eth1_data);
    process_operations(state, signed_block, verifier)
}

fn process_block_header<C: Config>(
    state: &mut BeaconState<C>,
    signed_block: &SignedBeaconBlock<C>,
    verifier: &dyn SignatureVerifier,
) -> Result<(), Error> {
    let block = &signed_block.message;

    if block.slot != state.slot {
        return Err(Error::BlockSlotMismatch {
            state_slot: state.slot,
            block_slot: block.slot,
        });
    }
    if block.parent_root != state.latest_block_header.canonical_root() {
        return Err(Error::ParentRootMismatch);
    }

    let proposer_index = get_beacon_proposer_index(state)?;
    if block.proposer_index != proposer_index {
        return Err(Error::ProposerIndexMismatch);
    }

    let proposer = &state.validators[proposer_index as usize];
    if proposer.slashed {
        return Err(Error::ProposerSlashed);
    }

    let domain = get_domain(state, C::domain_beacon_proposer(), None);
    let root = signing_root(block, domain);
    if !verifier.verify(root, &proposer.pubkey, &signed_block.signature) {
        return Err(Error::InvalidSignature);
    }

    state.latest_block_header = BeaconBlockHeader {
        slot: block.slot,
        proposer_index: block.proposer_index,
        parent_root: block.parent_root,
        // Zeroed here and filled in by the next slot's root caching.
        state_root: H256::zero(),
        body_root: hash_tree_root(&block.body),
    };

    Ok(())
}

fn process_randao<C: Config>(
    state: &mut BeaconState<C>,
    randao_reveal: &SignatureBytes,
    verifier: &dyn SignatureVerifier,
) -> Result<(), Error> {
    if randao_reveal.is_empty() {
        return Err(Error::EmptyRandaoReveal);
    }

    let epoch = get_current_epoch(state);
    let proposer = &state.validators[get_beacon_proposer_index(state)? as usize];

    let domain = get_domain(state, C::domain_randao(), None);
    let root = signing_root(&epoch, domain);
    if !verifier.verify(root, &proposer.pubkey, randao_reveal) {
        return Err(Error::InvalidSignature);
    }

    let mix = xor(
        &get_randao_mix(state, epoch)?,
        &H256::from_slice(&hash(randao_reveal.as_bytes())),
    );
    let index = (epoch % C::EpochsPerHistoricalVector::to_u64()) as usize;
    state.randao_mixes[index] = mix;

    Ok(())
}

fn process_eth1_data<C: Config>(state: &mut BeaconState<C>, eth1_data: &types::types::Eth1Data) {
    if state.eth1_data_votes.push(eth1_data.clone()).is_err() {
        // The vote buffer resets every voting period; a full buffer means the
        // period already has a decided majority.
        return;
    }

    let votes = state
        .eth1_data_votes
        .iter()
        .filter(|vote| *vote == eth1_data)
        .count() as u64;
    if votes * 2 > C::SlotsPerEth1VotingPeriod::to_u64() {
        state.eth1_data = eth1_data.clone();
    }
}

fn process_operations<C: Config>(
    state: &mut BeaconState<C>,
    signed_block: &SignedBeaconBlock<C>,
    verifier: &dyn SignatureVerifier,
) -> Result<(), Error> {
    let body = &signed_block.message.body;

    for proposer_slashing in body.proposer_slashings.iter() {
        process_proposer_slashing(state, proposer_slashing, verifier)?;
    }
    for attester_slashing in body.attester_slashings.iter() {
        process_attester_slashing(state, attester_slashing, verifier)?;
    }
    for attestation in body.attestations.iter() {
        match process_attestation(state, attestation, verifier) {
            // An attestation whose flags were all set already changes
            // nothing; the block remains valid.
            Ok(()) | Err(Error::NoNewFlags) => {}
            Err(error) => return Err(error),
        }
    }
    for deposit in body.deposits.iter() {
        process_deposit(state, deposit, verifier)?;
    }
    for voluntary_exit in body.voluntary_exits.iter() {
        process_voluntary_exit(state, voluntary_exit, verifier)?;
    }

    Ok(())
}

pub fn process_proposer_slashing<C: Config>(
    state: &mut BeaconState<C>,
    proposer_slashing: &ProposerSlashing,
    verifier: &dyn SignatureVerifier,
) -> Result<(), Error> {
    let header_1 = &proposer_slashing.signed_header_1.message;
    let header_2 = &proposer_slashing.signed_header_2.message;

    if header_1.slot != header_2.slot {
        return Err(Error::HeaderSlotMismatch);
    }
    if header_1.proposer_index != header_2.proposer_index {
        return Err(Error::HeadersForDifferentProposers);
    }
    if header_1 == header_2 {
        return Err(Error::HeadersNotDistinct);
    }

    let proposer_index = header_1.proposer_index;
    let proposer = state
        .validators
        .get(proposer_index as usize)
        .ok_or(Error::Helper(HelperError::IndexOutOfRange))?;
    if !is_slashable_validator(proposer, get_current_epoch(state)) {
        return Err(Error::ValidatorNotSlashable);
    }

    let pubkey = proposer.pubkey;
    for signed_header in &[
        &proposer_slashing.signed_header_1,
        &proposer_slashing.signed_header_2,
    ] {
        let epoch = compute_epoch_at_slot::<C>(signed_header.message.slot);
        let domain = get_domain(state, C::domain_beacon_proposer(), Some(epoch));
        let root = signing_root(&signed_header.message, domain);
        if !verifier.verify(root, &pubkey, &signed_header.signature) {
            return Err(Error::InvalidSignature);
        }
    }

    slash_validator(state, proposer_index, None)?;
    Ok(())
}

pub fn process_attester_slashing<C: Config>(
    state: &mut BeaconState<C>,
    attester_slashing: &AttesterSlashing<C>,
    verifier: &dyn SignatureVerifier,
) -> Result<(), Error> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    if !is_slashable_attestation_data(&attestation_1.data, &attestation_2.data) {
        return Err(Error::AttestationsNotSlashable);
    }
    is_valid_indexed_attestation(state, attestation_1, verifier)?;
    is_valid_indexed_attestation(state, attestation_2, verifier)?;

    let current_epoch = get_current_epoch(state);
    let mut slashed_any = false;
    // Both index lists are sorted; the intersection is as well.
    let indices_2: Vec<_> = attestation_2.attesting_indices.to_vec();
    for index in attestation_1
        .attesting_indices
        .iter()
        .filter(|index| indices_2.contains(index))
        .copied()
        .collect::<Vec<_>>()
    {
        let slashable = state
            .validators
            .get(index as usize)
            .map(|validator| is_slashable_validator(validator, current_epoch))
            .unwrap_or(false);
        if slashable {
            slash_validator(state, index, None)?;
            slashed_any = true;
        }
    }

    if !slashed_any {
        return Err(Error::NoSlashableIndices);
    }
    Ok(())
}

/// Applies an attestation to the participation arrays.
///
/// Each newly earned flag credits the proposer at inclusion time. If every
/// flag the attestation could set is set already, `Error::NoNewFlags` is
/// returned and the state is unchanged.
pub fn process_attestation<C: Config>(
    state: &mut BeaconState<C>,
    attestation: &Attestation<C>,
    verifier: &dyn SignatureVerifier,
) -> Result<(), Error> {
    let data = &attestation.data;
    let current_epoch = get_current_epoch(state);
    let previous_epoch = get_previous_epoch(state);

    if data.target.epoch != current_epoch && data.target.epoch != previous_epoch {
        return Err(Error::TargetEpochNotCurrentOrPrevious {
            target_epoch: data.target.epoch,
        });
    }
    let attestation_epoch = compute_epoch_at_slot::<C>(data.slot);
    if data.target.epoch != attestation_epoch {
        return Err(Error::TargetEpochMismatch {
            target_epoch: data.target.epoch,
            attestation_epoch,
        });
    }
    if data.slot + C::min_attestation_inclusion_delay() > state.slot {
        return Err(Error::AttestationTooNew {
            state_slot: state.slot,
            attestation_slot: data.slot,
        });
    }
    if state.slot > data.slot + C::SlotsPerEpoch::to_u64() {
        return Err(Error::AttestationTooOld {
            state_slot: state.slot,
            attestation_slot: data.slot,
        });
    }

    let justified_checkpoint = if data.target.epoch == current_epoch {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };
    if data.source != justified_checkpoint {
        return Err(Error::SourceCheckpointMismatch);
    }

    let indexed_attestation = get_indexed_attestation(state, attestation)?;
    is_valid_indexed_attestation(state, &indexed_attestation, verifier)?;

    let inclusion_delay = state.slot - data.slot;
    let mut flag_indices = Vec::with_capacity(3);
    if inclusion_delay <= integer_squareroot(C::SlotsPerEpoch::to_u64()) {
        flag_indices.push(TIMELY_SOURCE_FLAG_INDEX);
    }
    if inclusion_delay <= C::SlotsPerEpoch::to_u64() {
        flag_indices.push(TIMELY_TARGET_FLAG_INDEX);
    }
    if inclusion_delay == C::min_attestation_inclusion_delay() {
        flag_indices.push(TIMELY_HEAD_FLAG_INDEX);
    }

    let total_active_balance = get_total_active_balance(state)?;
    let sqrt_total = integer_squareroot(total_active_balance);
    let in_current_epoch = data.target.epoch == current_epoch;

    let mut proposer_reward = 0;
    let mut any_new_flags = false;
    for index in indexed_attestation.attesting_indices.iter().copied() {
        let id = usize::try_from(index).map_err(|_| Error::Helper(HelperError::IndexOutOfRange))?;
        let base_reward = get_base_reward::<C>(state.validators[id].effective_balance, sqrt_total);

        let participation = if in_current_epoch {
            &mut state.current_epoch_participation
        } else {
            &mut state.previous_epoch_participation
        };
        let old_flags = participation[id];
        let mut new_flags = old_flags;
        for flag_index in &flag_indices {
            new_flags = add_flag(new_flags, *flag_index);
        }
        if new_flags != old_flags {
            participation[id] = new_flags;
            any_new_flags = true;
            proposer_reward +=
                base_reward * C::proposer_weight() / (C::weight_denominator() - C::proposer_weight());
        }
    }

    if !any_new_flags {
        return Err(Error::NoNewFlags);
    }

    let proposer_index = get_beacon_proposer_index(state)?;
    increase_balance(state, proposer_index, proposer_reward);
    Ok(())
}

pub fn process_deposit<C: Config>(
    state: &mut BeaconState<C>,
    deposit: &Deposit,
    verifier: &dyn SignatureVerifier,
) -> Result<(), Error> {
    // Deposits are processed in order; the index is how the eth1 bridge is
    // resumed after a restart.
    state.eth1_deposit_index += 1;

    let pubkey = deposit.data.pubkey;
    let amount = deposit.data.amount;

    if let Some(index) = state
        .validators
        .iter()
        .position(|validator| validator.pubkey == pubkey)
    {
        increase_balance(state, index as ValidatorIndex, amount);
        return Ok(());
    }

    // Proof of possession for new validators. The deposit contract performs
    // no signature checks, so an invalid one is skipped, not surfaced.
    let message = DepositMessage {
        pubkey,
        withdrawal_credentials: deposit.data.withdrawal_credentials,
        amount,
    };
    let domain = compute_domain(C::domain_deposit(), None);
    let root = signing_root(&message, domain);
    if !verifier.verify(root, &pubkey, &deposit.data.signature) {
        return Ok(());
    }

    let effective_balance = cmp::min(
        amount - amount % C::effective_balance_increment(),
        C::max_effective_balance(),
    );
    state
        .add_validator(
            types::types::Validator {
                pubkey,
                withdrawal_credentials: deposit.data.withdrawal_credentials,
                effective_balance,
                slashed: false,
                activation_eligibility_epoch: C::far_future_epoch(),
                activation_epoch: C::far_future_epoch(),
                exit_epoch: C::far_future_epoch(),
                withdrawable_epoch: C::far_future_epoch(),
            },
            amount,
        )
        .map_err(|_| Error::RegistryLimitReached)?;

    Ok(())
}

pub fn process_voluntary_exit<C: Config>(
    state: &mut BeaconState<C>,
    signed_exit: &SignedVoluntaryExit,
    verifier: &dyn SignatureVerifier,
) -> Result<(), Error> {
    let exit = &signed_exit.message;
    let current_epoch = get_current_epoch(state);

    let validator = state
        .validators
        .get(exit.validator_index as usize)
        .ok_or(Error::Helper(HelperError::IndexOutOfRange))?;

    if !is_active_validator(validator, current_epoch) {
        return Err(Error::ValidatorNotActive);
    }
    if validator.exit_epoch != C::far_future_epoch() {
        return Err(Error::ValidatorAlreadyExited);
    }
    if current_epoch < exit.epoch {
        return Err(Error::ExitEpochInFuture);
    }
    if current_epoch < validator.activation_epoch + C::shard_committee_period() {
        return Err(Error::ValidatorNotMature);
    }

    let domain = get_domain(state, C::domain_voluntary_exit(), Some(exit.epoch));
    let root = signing_root(exit, domain);
    if !verifier.verify(root, &validator.pubkey, &signed_exit.signature) {
        return Err(Error::InvalidSignature);
    }

    initiate_validator_exit(state, exit.validator_index)?;
    Ok(())
}
