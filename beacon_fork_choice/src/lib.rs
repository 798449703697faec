//! LMD-GHOST fork choice over a proto-array block tree with Casper FFG
//! filtering.
//!
//! Blocks and attestations reaching this crate are already validated by
//! state processing; the store only decides which branch is canonical.

pub mod proto_array;
pub mod vote_store;

use core::marker::PhantomData;

use log::{info, warn};
use parking_lot::Mutex;
use thiserror::Error;
use typenum::marker_traits::Unsigned;
use types::config::Config;
use types::primitives::{Epoch, Gwei, Slot, ValidatorIndex, H256};
use types::types::Checkpoint;

use crate::proto_array::ProtoArray;
use crate::vote_store::VoteStore;

#[derive(PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("block {0} is already known")]
    DuplicateBlock(H256),
    #[error("parent {0} is not in the block tree")]
    UnknownParent(H256),
    #[error("justified root {0} is not in the block tree")]
    UnknownJustifiedRoot(H256),
    #[error("finalized root {0} is not in the block tree")]
    UnknownFinalizedRoot(H256),
    #[error("no viable head (justified epoch {justified_epoch}, finalized epoch {finalized_epoch})")]
    NoViableHead {
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
    },
    #[error("{deltas} deltas do not cover {nodes} nodes")]
    InvalidDeltaLength { deltas: usize, nodes: usize },
    #[error("weight delta overflowed at node {0}")]
    DeltaOverflow(usize),
    #[error("slot {new_slot} is not later than {old_slot}")]
    SlotRegression { old_slot: Slot, new_slot: Slot },
    #[error(
        "stale attestation from validator {validator_index}: epoch {attestation_epoch} \
         is not newer than {known_epoch}"
    )]
    StaleAttestation {
        validator_index: ValidatorIndex,
        known_epoch: Epoch,
        attestation_epoch: Epoch,
    },
    #[error("{0} checkpoint update would move backwards")]
    CheckpointRegression(&'static str),
}

/// The outcome of a head computation.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct HeadUpdate {
    pub root: H256,
    /// The previous head is not an ancestor of the new one.
    pub reorged: bool,
}

struct Inner {
    current_slot: Slot,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    proto_array: ProtoArray,
    balances: Vec<Gwei>,
    previous_balances: Vec<Gwei>,
    proposer_boost_root: Option<H256>,
    applied_boost: Option<(H256, Gwei)>,
    previous_head: Option<H256>,
}

/// The fork-choice store. One mutex guards the tree and checkpoints; the
/// vote store nests its own lock so attestations can stream in while a
/// head computation runs.
pub struct Store<C: Config> {
    inner: Mutex<Inner>,
    votes: VoteStore,
    phantom: PhantomData<C>,
}

impl<C: Config> Store<C> {
    pub fn new(anchor_slot: Slot, anchor_root: H256, justified: Checkpoint, finalized: Checkpoint) -> Self {
        Self {
            inner: Mutex::new(Inner {
                current_slot: anchor_slot,
                justified_checkpoint: justified,
                finalized_checkpoint: finalized,
                proto_array: ProtoArray::new(
                    anchor_slot,
                    anchor_root,
                    justified.epoch,
                    finalized.epoch,
                ),
                balances: Vec::new(),
                previous_balances: Vec::new(),
                proposer_boost_root: None,
                applied_boost: None,
                previous_head: None,
            }),
            votes: VoteStore::default(),
            phantom: PhantomData,
        }
    }

    /// Advances the store clock. Any proposer boost expires here.
    pub fn on_slot(&self, slot: Slot) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if slot <= inner.current_slot {
            return Err(Error::SlotRegression {
                old_slot: inner.current_slot,
                new_slot: slot,
            });
        }
        inner.current_slot = slot;
        inner.proposer_boost_root = None;
        Ok(())
    }

    /// Registers a block. A block for the current slot received on time
    /// temporarily boosts its subtree until the next slot boundary.
    pub fn on_block(
        &self,
        slot: Slot,
        root: H256,
        parent_root: H256,
        justified_epoch: Epoch,
        finalized_epoch: Epoch,
        timely: bool,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner
            .proto_array
            .on_block(slot, root, parent_root, justified_epoch, finalized_epoch)?;

        if timely && slot == inner.current_slot {
            inner.proposer_boost_root = Some(root);
        }
        Ok(())
    }

    /// Records a validator's latest vote. Stale votes are rejected by the
    /// vote store; the weight moves at the next head computation.
    pub fn on_attestation(
        &self,
        validator_index: ValidatorIndex,
        block_root: H256,
        target_epoch: Epoch,
    ) -> Result<(), Error> {
        self.votes
            .process_attestation(validator_index, block_root, target_epoch)
    }

    /// Refreshes the effective balances used to weight votes. Read-only
    /// snapshots come from the state machine after each epoch transition.
    pub fn set_balances(&self, balances: Vec<Gwei>) {
        self.inner.lock().balances = balances;
    }

    /// Both epochs must be non-decreasing; anything else means the caller
    /// fed checkpoints out of order.
    pub fn update_checkpoints(
        &self,
        justified: Checkpoint,
        finalized: Checkpoint,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        if justified.epoch < inner.justified_checkpoint.epoch {
            return Err(Error::CheckpointRegression("justified"));
        }
        if finalized.epoch < inner.finalized_checkpoint.epoch {
            return Err(Error::CheckpointRegression("finalized"));
        }
        inner.justified_checkpoint = justified;
        inner.finalized_checkpoint = finalized;
        Ok(())
    }

    /// Applies pending vote deltas and the proposer boost, then walks the
    /// tree from the justified root.
    pub fn get_head(&self) -> Result<HeadUpdate, Error> {
        let inner = &mut *self.inner.lock();

        let mut deltas = self.votes.compute_deltas(
            inner.proto_array.node_count(),
            |root| inner.proto_array.index_of(root),
            &inner.previous_balances,
            &inner.balances,
        );

        if let Some((boosted_root, amount)) = inner.applied_boost.take() {
            if let Some(index) = inner.proto_array.index_of(&boosted_root) {
                deltas[index] -= amount as i64;
            }
        }
        if let Some(boosted_root) = inner.proposer_boost_root {
            if let Some(index) = inner.proto_array.index_of(&boosted_root) {
                let amount = Self::proposer_boost_amount(&inner.balances);
                deltas[index] += amount as i64;
                inner.applied_boost = Some((boosted_root, amount));
            }
        }

        inner.proto_array.apply_score_changes(
            deltas,
            inner.justified_checkpoint.epoch,
            inner.finalized_checkpoint.epoch,
        )?;
        inner.previous_balances = inner.balances.clone();

        let root = inner
            .proto_array
            .find_head(&inner.justified_checkpoint.root)?;

        let reorged = match inner.previous_head {
            Some(previous) if previous != root => {
                !inner.proto_array.is_descendant(&previous, &root)
            }
            _ => false,
        };
        if reorged {
            warn!(
                "reorg: head moved from {:?} to {:?}",
                inner.previous_head, root,
            );
        }
        inner.previous_head = Some(root);

        Ok(HeadUpdate { root, reorged })
    }

    /// Retains only the finalized root and its descendants.
    pub fn prune(&self, finalized_root: H256) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.proto_array.prune(finalized_root)?;
        info!(
            "pruned fork choice to {:?}, {} nodes remain",
            finalized_root,
            inner.proto_array.node_count(),
        );
        Ok(())
    }

    pub fn contains_block(&self, root: &H256) -> bool {
        self.inner.lock().proto_array.contains_block(root)
    }

    pub fn block_count(&self) -> usize {
        self.inner.lock().proto_array.node_count()
    }

    /// One committee's worth of stake, scaled by the boost percentage.
    fn proposer_boost_amount(balances: &[Gwei]) -> Gwei {
        let total: Gwei = balances.iter().sum();
        let committee_weight = total / C::SlotsPerEpoch::to_u64();
        committee_weight * C::proposer_score_boost() / 100
    }
}

#[cfg(test)]
mod tests {
    use types::config::MinimalConfig;

    use super::*;

    fn root(byte: u8) -> H256 {
        H256::from([byte; 32])
    }

    fn checkpoint(epoch: Epoch, byte: u8) -> Checkpoint {
        Checkpoint {
            epoch,
            root: root(byte),
        }
    }

    fn store_with_anchor() -> Store<MinimalConfig> {
        Store::new(0, root(0), checkpoint(0, 0), checkpoint(0, 0))
    }

    #[test]
    fn attested_fork_wins() {
        let store = store_with_anchor();
        store.set_balances(vec![1]);

        store
            .on_block(1, root(0xa), root(0), 0, 0, false)
            .expect("parent is the anchor");
        store
            .on_block(2, root(0xb), root(0xa), 0, 0, false)
            .expect("parent is known");
        store
            .on_block(2, root(0xc), root(0xa), 0, 0, false)
            .expect("parent is known");

        store
            .on_attestation(0, root(0xc), 1)
            .expect("the first vote is never stale");

        let head = store.get_head().expect("a viable head exists");
        assert_eq!(head.root, root(0xc));
        assert!(!head.reorged);
    }

    #[test]
    fn head_is_idempotent_without_new_messages() {
        let store = store_with_anchor();
        store.set_balances(vec![1, 1]);

        store
            .on_block(1, root(0xa), root(0), 0, 0, false)
            .expect("parent is the anchor");
        store
            .on_attestation(0, root(0xa), 1)
            .expect("the first vote is never stale");

        let first = store.get_head().expect("a viable head exists");
        let second = store.get_head().expect("a viable head exists");
        assert_eq!(first.root, second.root);
        assert!(!second.reorged);
    }

    #[test]
    fn sole_descendant_of_justified_root_is_head() {
        let store = store_with_anchor();
        store
            .on_block(1, root(0xa), root(0), 0, 0, false)
            .expect("parent is the anchor");

        let head = store.get_head().expect("a viable head exists");
        assert_eq!(head.root, root(0xa));
    }

    #[test]
    fn proposer_boost_flips_an_even_split_and_expires() {
        let store = store_with_anchor();
        // Enough stake for the boost to outweigh the tie-break.
        store.set_balances(vec![32_000_000_000; 8]);

        store.on_slot(1).expect("slot 1 is later than slot 0");
        store
            .on_block(1, root(0x9f), root(0), 0, 0, false)
            .expect("parent is the anchor");
        // The low-root sibling arrives on time and gets the boost.
        store
            .on_block(1, root(0x01), root(0), 0, 0, true)
            .expect("parent is the anchor");

        let boosted = store.get_head().expect("a viable head exists");
        assert_eq!(boosted.root, root(0x01));

        // At the next slot the boost expires and the tie-break returns the
        // higher root.
        store.on_slot(2).expect("slot 2 is later than slot 1");
        let after = store.get_head().expect("a viable head exists");
        assert_eq!(after.root, root(0x9f));
        assert!(after.reorged);
    }

    #[test]
    fn pruning_keeps_only_descendants() {
        let store = store_with_anchor();
        store
            .on_block(1, root(0xa), root(0), 0, 0, false)
            .expect("parent is the anchor");
        store
            .on_block(1, root(0xb), root(0), 0, 0, false)
            .expect("parent is the anchor");
        store
            .on_block(2, root(0xc), root(0xa), 0, 0, false)
            .expect("parent is known");

        store.prune(root(0xa)).expect("the root is known");

        assert!(store.contains_block(&root(0xa)));
        assert!(store.contains_block(&root(0xc)));
        assert!(!store.contains_block(&root(0xb)));
        assert!(!store.contains_block(&root(0)));
        assert_eq!(store.block_count(), 2);
    }

    #[test]
    fn clock_cannot_move_backwards() {
        let store = store_with_anchor();
        store.on_slot(5).expect("slot 5 is later than slot 0");
        assert_eq!(
            store.on_slot(5),
            Err(Error::SlotRegression {
                old_slot: 5,
                new_slot: 5,
            }),
        );
    }

    #[test]
    fn checkpoints_are_monotonic() {
        let store = store_with_anchor();
        store
            .update_checkpoints(checkpoint(2, 1), checkpoint(1, 2))
            .expect("both checkpoints advance");

        assert_eq!(
            store.update_checkpoints(checkpoint(1, 1), checkpoint(1, 2)),
            Err(Error::CheckpointRegression("justified")),
        );
        assert_eq!(
            store.update_checkpoints(checkpoint(2, 1), checkpoint(0, 2)),
            Err(Error::CheckpointRegression("finalized")),
        );
    }

    #[test]
    fn head_requires_a_known_justified_root() {
        let store = store_with_anchor();
        store
            .update_checkpoints(checkpoint(1, 0x77), checkpoint(0, 0))
            .expect("both checkpoints advance");

        assert_eq!(
            store.get_head(),
            Err(Error::UnknownJustifiedRoot(root(0x77))),
        );
    }
}
