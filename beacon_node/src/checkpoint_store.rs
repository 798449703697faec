use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::{Epoch, H256};
use types::types::Checkpoint;

#[derive(PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("finalized epoch {new_epoch} is older than the stored epoch {latest_epoch}")]
    NonMonotonicFinality {
        latest_epoch: Epoch,
        new_epoch: Epoch,
    },
}

struct Inner<C: Config> {
    states: HashMap<H256, BeaconState<C>>,
    checkpoints: Vec<Checkpoint>,
}

/// In-memory finality store: finalized checkpoints in order, with the state
/// snapshot at each finalized root. Durable backends plug in behind the
/// same contract.
pub struct CheckpointStore<C: Config> {
    inner: Mutex<Inner<C>>,
}

impl<C: Config> Default for CheckpointStore<C> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                states: HashMap::new(),
                checkpoints: Vec::new(),
            }),
        }
    }
}

impl<C: Config> CheckpointStore<C> {
    /// Records a finalized checkpoint with the state at its root. Epochs
    /// must be non-decreasing; finality never reverts.
    pub fn checkpoint(&self, checkpoint: Checkpoint, state: BeaconState<C>) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        if let Some(latest) = inner.checkpoints.last() {
            if checkpoint.epoch < latest.epoch {
                return Err(Error::NonMonotonicFinality {
                    latest_epoch: latest.epoch,
                    new_epoch: checkpoint.epoch,
                });
            }
        }

        inner.states.insert(checkpoint.root, state);
        if inner.checkpoints.last() != Some(&checkpoint) {
            inner.checkpoints.push(checkpoint);
        }
        Ok(())
    }

    pub fn latest_finalized(&self) -> Option<Checkpoint> {
        self.inner.lock().checkpoints.last().copied()
    }

    pub fn state_by_root(&self, root: &H256) -> Option<BeaconState<C>> {
        self.inner.lock().states.get(root).cloned()
    }

    /// Drops everything older than `oldest_kept_epoch`. The latest
    /// checkpoint always survives.
    pub fn prune_below(&self, oldest_kept_epoch: Epoch) {
        let mut inner = self.inner.lock();
        let latest = inner.checkpoints.last().copied();

        inner
            .checkpoints
            .retain(|checkpoint| checkpoint.epoch >= oldest_kept_epoch || Some(*checkpoint) == latest);
        let inner = &mut *inner;
        let checkpoints = &inner.checkpoints;
        inner
            .states
            .retain(|root, _| checkpoints.iter().any(|checkpoint| checkpoint.root == *root));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use types::config::MinimalConfig;

    use super::*;

    fn checkpoint(epoch: Epoch, byte: u8) -> Checkpoint {
        Checkpoint {
            epoch,
            root: H256::from([byte; 32]),
        }
    }

    fn state_at_slot(slot: u64) -> BeaconState<MinimalConfig> {
        BeaconState {
            slot,
            ..BeaconState::default()
        }
    }

    #[test]
    fn stores_and_returns_the_latest_checkpoint() {
        let store = CheckpointStore::default();
        assert_eq!(store.latest_finalized(), None);

        store
            .checkpoint(checkpoint(1, 1), state_at_slot(8))
            .expect("the first checkpoint always fits");
        store
            .checkpoint(checkpoint(2, 2), state_at_slot(16))
            .expect("epoch 2 is not older than epoch 1");

        assert_eq!(store.latest_finalized(), Some(checkpoint(2, 2)));
        assert_eq!(
            store
                .state_by_root(&H256::from([1; 32]))
                .map(|state| state.slot),
            Some(8),
        );
    }

    #[test]
    fn finality_cannot_move_backwards() {
        let store = CheckpointStore::default();
        store
            .checkpoint(checkpoint(3, 1), state_at_slot(24))
            .expect("the first checkpoint always fits");

        assert_eq!(
            store.checkpoint(checkpoint(2, 2), state_at_slot(16)),
            Err(Error::NonMonotonicFinality {
                latest_epoch: 3,
                new_epoch: 2,
            }),
        );
    }

    #[test]
    fn repeated_checkpoints_are_stored_once() {
        let store = CheckpointStore::default();
        store
            .checkpoint(checkpoint(1, 1), state_at_slot(8))
            .expect("the first checkpoint always fits");
        store
            .checkpoint(checkpoint(1, 1), state_at_slot(8))
            .expect("re-checkpointing is allowed");

        assert_eq!(store.len(), 1);
    }

    #[test]
    fn pruning_keeps_the_latest_checkpoint() {
        let store = CheckpointStore::default();
        for epoch in 1..=4 {
            store
                .checkpoint(checkpoint(epoch, epoch as u8), state_at_slot(epoch * 8))
                .expect("epochs increase");
        }

        store.prune_below(4);

        assert_eq!(store.len(), 1);
        assert_eq!(store.latest_finalized(), Some(checkpoint(4, 4)));
        assert!(store.state_by_root(&H256::from([1; 32])).is_none());
        assert!(store.state_by_root(&H256::from([4; 32])).is_some());
    }
}
