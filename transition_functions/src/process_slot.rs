use helper_functions::crypto::{hash_tree_root, SignatureVerifier};
use typenum::marker_traits::Unsigned;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::{Slot, H256};
use types::types::SignedBeaconBlock;

use crate::blocks::block_processing::process_block;
use crate::epochs::process_epoch::process_epoch;
use crate::Error;

/// Advances the state to `block.message.slot`, applies the block and
/// optionally checks the resulting state root against the one the block
/// committed to.
pub fn state_transition<C: Config>(
    state: &mut BeaconState<C>,
    signed_block: &SignedBeaconBlock<C>,
    verifier: &dyn SignatureVerifier,
    validate_state_root: bool,
) -> Result<(), Error> {
    let block = &signed_block.message;

    process_slots(state, block.slot)?;
    process_block(state, signed_block, verifier)?;

    if validate_state_root && block.state_root != hash_tree_root(state) {
        return Err(Error::StateRootMismatch);
    }

    Ok(())
}

/// Advances through empty slots, running the epoch transition at each epoch
/// boundary crossed on the way.
pub fn process_slots<C: Config>(state: &mut BeaconState<C>, slot: Slot) -> Result<(), Error> {
    if slot < state.slot {
        return Err(Error::SlotsNotAdvanced {
            state_slot: state.slot,
            target_slot: slot,
        });
    }

    while state.slot < slot {
        cache_roots(state);
        // Process the epoch on the start slot of the next epoch.
        if (state.slot + 1) % C::SlotsPerEpoch::to_u64() == 0 {
            process_epoch(state);
        }
        state.slot += 1;
    }

    Ok(())
}

fn cache_roots<C: Config>(state: &mut BeaconState<C>) {
    let slot_index = (state.slot % C::SlotsPerHistoricalRoot::to_u64()) as usize;

    let previous_state_root = hash_tree_root(state);
    state.state_roots[slot_index] = previous_state_root;

    if state.latest_block_header.state_root == H256::zero() {
        state.latest_block_header.state_root = previous_state_root;
    }

    state.block_roots[slot_index] = state.latest_block_header.canonical_root();
}
