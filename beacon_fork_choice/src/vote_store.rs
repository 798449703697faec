use std::collections::HashMap;

use parking_lot::Mutex;
use types::primitives::{Epoch, Gwei, ValidatorIndex, H256};

use crate::Error;

/// Where a validator's latest message points now and where it will point
/// once the next head computation consumes it.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct VoteTracker {
    pub current_root: H256,
    pub current_epoch: Epoch,
    pub next_root: H256,
    pub next_epoch: Epoch,
}

/// Latest-message table, one tracker per validator.
///
/// Carries its own mutex so the fork-choice lock does not have to be held
/// while attestations stream in. Callers outside the fork-choice module
/// must not hold the fork-choice lock when calling into this type.
#[derive(Default)]
pub struct VoteStore {
    votes: Mutex<HashMap<ValidatorIndex, VoteTracker>>,
}

impl VoteStore {
    /// Records a validator's vote. Only a strictly newer target epoch
    /// replaces the pending vote; anything older is rejected as stale.
    pub fn process_attestation(
        &self,
        validator_index: ValidatorIndex,
        block_root: H256,
        target_epoch: Epoch,
    ) -> Result<(), Error> {
        let mut votes = self.votes.lock();
        let vote = votes.entry(validator_index).or_default();

        if vote.next_epoch == 0 && vote.next_root == H256::zero() {
            // First message from this validator.
            vote.next_root = block_root;
            vote.next_epoch = target_epoch;
            return Ok(());
        }

        if target_epoch <= vote.next_epoch {
            return Err(Error::StaleAttestation {
                validator_index,
                known_epoch: vote.next_epoch,
                attestation_epoch: target_epoch,
            });
        }

        vote.next_root = block_root;
        vote.next_epoch = target_epoch;
        Ok(())
    }

    pub fn vote_count(&self) -> usize {
        self.votes.lock().len()
    }

    /// Turns the difference between each validator's current and next vote
    /// into per-node weight deltas, committing the next vote as current.
    ///
    /// `old_balances` weights the vote being removed, `new_balances` the one
    /// being added; votes for pruned blocks simply have no node to land on.
    pub fn compute_deltas(
        &self,
        node_count: usize,
        index_of: impl Fn(&H256) -> Option<usize>,
        old_balances: &[Gwei],
        new_balances: &[Gwei],
    ) -> Vec<i64> {
        let mut deltas = vec![0_i64; node_count];
        let mut votes = self.votes.lock();

        for (validator_index, vote) in votes.iter_mut() {
            if vote.current_root == vote.next_root && vote.current_epoch == vote.next_epoch {
                continue;
            }

            let old_balance = old_balances
                .get(*validator_index as usize)
                .copied()
                .unwrap_or(0);
            let new_balance = new_balances
                .get(*validator_index as usize)
                .copied()
                .unwrap_or(0);

            if let Some(index) = index_of(&vote.current_root) {
                deltas[index] -= old_balance as i64;
            }
            if let Some(index) = index_of(&vote.next_root) {
                deltas[index] += new_balance as i64;
            }

            vote.current_root = vote.next_root;
            vote.current_epoch = vote.next_epoch;
        }

        deltas
    }
}
