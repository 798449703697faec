use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tree_hash::TreeHash;
use typenum::marker_traits::Unsigned;
use types::config::Config;
use types::primitives::{Epoch, Slot, H256};
use types::types::{Attestation, Checkpoint};

use crate::Error;

/// Attestations older than `current_slot - PRUNE_SLOTS` are dropped and
/// refused.
pub const PRUNE_SLOTS: u64 = 32;

/// A DoS bound on distinct pool entries.
const MAX_POOL_SIZE: usize = 16_384;

fn epoch_at_slot<C: Config>(slot: Slot) -> Epoch {
    slot / C::SlotsPerEpoch::to_u64()
}

#[derive(PartialEq, Debug)]
pub enum InsertOutcome {
    /// The data had not been seen before; a new entry was created.
    Added,
    /// Bit-disjoint with an existing entry of the same data; merged by OR.
    Aggregated,
    /// Every set bit was already covered, or the data key was already
    /// included in a block. No changes were made.
    Duplicate,
}

struct Inner<C: Config> {
    current_slot: Slot,
    justified_checkpoint: Checkpoint,
    entries: HashMap<H256, Vec<Attestation<C>>>,
    included: HashSet<H256>,
    entry_count: usize,
}

/// The pending-attestation set, keyed by attestation data root.
///
/// Thread-safe behind its own mutex. The pool borrows read-only views of
/// the current slot and the justified checkpoint; both are refreshed by the
/// owning node as the chain advances.
pub struct AttestationPool<C: Config> {
    inner: Mutex<Inner<C>>,
}

impl<C: Config> Default for AttestationPool<C> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current_slot: 0,
                justified_checkpoint: Checkpoint::default(),
                entries: HashMap::new(),
                included: HashSet::new(),
                entry_count: 0,
            }),
        }
    }
}

impl<C: Config> AttestationPool<C> {
    /// Moves the pool's clock forward and prunes anything that fell out of
    /// the retention window.
    pub fn advance_slot(&self, current_slot: Slot) {
        let mut inner = self.inner.lock();
        inner.current_slot = current_slot;

        let lowest = current_slot.saturating_sub(PRUNE_SLOTS);
        let mut removed = 0;
        inner.entries.retain(|_, attestations| {
            attestations.retain(|attestation| {
                let keep = attestation.data.slot >= lowest;
                if !keep {
                    removed += 1;
                }
                keep
            });
            !attestations.is_empty()
        });
        inner.entry_count -= removed;
    }

    pub fn set_justified_checkpoint(&self, checkpoint: Checkpoint) {
        self.inner.lock().justified_checkpoint = checkpoint;
    }

    /// Marks a data key as included in a block; later copies of it are
    /// absorbed silently.
    pub fn register_included(&self, data_root: H256) {
        self.inner.lock().included.insert(data_root);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert(&self, attestation: Attestation<C>) -> Result<InsertOutcome, Error> {
        if attestation.aggregation_bits.is_zero() {
            return Err(Error::EmptyAggregationBits);
        }

        let mut inner = self.inner.lock();

        let slot = attestation.data.slot;
        let lowest = inner.current_slot.saturating_sub(PRUNE_SLOTS);
        if slot < lowest || slot > inner.current_slot {
            return Err(Error::SlotOutOfWindow {
                attestation_slot: slot,
                lowest_permissible_slot: lowest,
                current_slot: inner.current_slot,
            });
        }

        let slot_epoch = epoch_at_slot::<C>(slot);
        if attestation.data.target.epoch != slot_epoch {
            return Err(Error::TargetEpochMismatch {
                target_epoch: attestation.data.target.epoch,
                slot_epoch,
            });
        }
        if attestation.data.source != inner.justified_checkpoint {
            return Err(Error::SourceCheckpointMismatch);
        }

        let data_root = attestation.data.tree_hash_root();
        if inner.included.contains(&data_root) {
            return Ok(InsertOutcome::Duplicate);
        }

        let entry_count = inner.entry_count;
        let entries = inner.entries.entry(data_root).or_insert_with(Vec::new);
        for existing in entries.iter_mut() {
            if existing.aggregation_bits.len() != attestation.aggregation_bits.len() {
                return Err(Error::InconsistentBitLength);
            }
            let overlap = existing
                .aggregation_bits
                .intersection(&attestation.aggregation_bits);
            if overlap.num_set_bits() == attestation.aggregation_bits.num_set_bits() {
                return Ok(InsertOutcome::Duplicate);
            }
            if overlap.is_zero() {
                existing.aggregation_bits = existing
                    .aggregation_bits
                    .union(&attestation.aggregation_bits);
                // The aggregate signature is combined by the BLS backend in
                // a real deployment; the stub keeps the first signature.
                return Ok(InsertOutcome::Aggregated);
            }
        }

        if entry_count >= MAX_POOL_SIZE {
            return Err(Error::PoolFull(entry_count));
        }
        entries.push(attestation);
        inner.entry_count += 1;
        Ok(InsertOutcome::Added)
    }

    /// Selects attestations for a block at `block_slot`: at least one slot
    /// old, still within the retention window, best-covered first, newer
    /// slots breaking ties.
    pub fn get_for_block(&self, block_slot: Slot, limit: usize) -> Vec<Attestation<C>> {
        let inner = self.inner.lock();

        let mut candidates: Vec<&Attestation<C>> = inner
            .entries
            .values()
            .flatten()
            .filter(|attestation| {
                attestation.data.slot + 1 <= block_slot
                    && attestation.data.slot + PRUNE_SLOTS >= block_slot
            })
            .collect();

        candidates.sort_by(|left, right| {
            right
                .aggregation_bits
                .num_set_bits()
                .cmp(&left.aggregation_bits.num_set_bits())
                .then(right.data.slot.cmp(&left.data.slot))
        });

        candidates
            .into_iter()
            .take(limit)
            .cloned()
            .collect()
    }
}
