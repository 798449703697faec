use std::collections::HashMap;
use std::mem;

use log::info;
use parking_lot::Mutex;
use types::primitives::{Slot, ValidatorIndex, H256};

use crate::Error;

/// Proposals older than this many slots behind the newest registration are
/// dropped and refused.
const PROPOSAL_WINDOW_SLOTS: Slot = 8192;

/// One pair of conflicting proposals. A triple proposal yields one record
/// per pairing with the earlier roots.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProposerEvidence {
    pub proposer_index: ValidatorIndex,
    pub slot: Slot,
    pub root_1: H256,
    pub root_2: H256,
}

struct Inner {
    proposals: HashMap<(ValidatorIndex, Slot), Vec<H256>>,
    evidence: Vec<ProposerEvidence>,
    highest_slot: Slot,
}

/// Detects double proposals: two distinct block roots signed by the same
/// proposer for the same slot.
pub struct ProposerSlashingDetector {
    inner: Mutex<Inner>,
}

impl Default for ProposerSlashingDetector {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                proposals: HashMap::new(),
                evidence: Vec::new(),
                highest_slot: 0,
            }),
        }
    }
}

impl ProposerSlashingDetector {
    /// Registers a proposal, emitting evidence for every prior conflicting
    /// root. Registering the same root twice is a no-op.
    pub fn register_proposal(
        &self,
        proposer_index: ValidatorIndex,
        slot: Slot,
        block_root: H256,
    ) -> Result<(), Error> {
        let mut inner = self.inner.lock();

        let window_floor = inner.highest_slot.saturating_sub(PROPOSAL_WINDOW_SLOTS);
        if slot < window_floor {
            return Err(Error::SlotRegression { slot, window_floor });
        }
        if slot > inner.highest_slot {
            inner.highest_slot = slot;
            let floor = slot.saturating_sub(PROPOSAL_WINDOW_SLOTS);
            inner.proposals.retain(|(_, slot), _| *slot >= floor);
        }

        let inner = &mut *inner;
        let roots = inner
            .proposals
            .entry((proposer_index, slot))
            .or_insert_with(Vec::new);
        if roots.contains(&block_root) {
            return Ok(());
        }

        for existing in roots.iter() {
            info!(
                "double proposal by validator {} at slot {}: {:?} vs {:?}",
                proposer_index, slot, existing, block_root,
            );
            inner.evidence.push(ProposerEvidence {
                proposer_index,
                slot,
                root_1: *existing,
                root_2: block_root,
            });
        }
        roots.push(block_root);

        Ok(())
    }

    /// Drains the accumulated evidence.
    pub fn detect_proposer_slashings(&self) -> Vec<ProposerEvidence> {
        mem::replace(&mut self.inner.lock().evidence, Vec::new())
    }

    /// Surveys the accumulated evidence without draining it.
    pub fn peek_proposer_slashings(&self) -> Vec<ProposerEvidence> {
        self.inner.lock().evidence.clone()
    }
}
