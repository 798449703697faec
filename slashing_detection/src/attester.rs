use std::collections::HashMap;
use std::mem;

use log::info;
use parking_lot::Mutex;
use types::primitives::{Epoch, ValidatorIndex, H256};

/// Attestations whose target is this many epochs behind the newest seen
/// target are pruned on insertion.
const ATTESTATION_WINDOW_EPOCHS: Epoch = 4096;

/// A compact view of a vote, enough to run the slashing rules.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AttestationRecord {
    pub source_epoch: Epoch,
    pub target_epoch: Epoch,
    pub target_root: H256,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EvidenceKind {
    DoubleVote,
    SurroundVote,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AttesterEvidence {
    pub validator_index: ValidatorIndex,
    pub kind: EvidenceKind,
    pub attestation_1: AttestationRecord,
    pub attestation_2: AttestationRecord,
}

struct Inner {
    attestations: HashMap<ValidatorIndex, Vec<AttestationRecord>>,
    evidence: Vec<AttesterEvidence>,
}

/// Detects double votes and surround votes over a sliding window of recent
/// target epochs.
pub struct AttesterSlashingDetector {
    inner: Mutex<Inner>,
}

impl Default for AttesterSlashingDetector {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                attestations: HashMap::new(),
                evidence: Vec::new(),
            }),
        }
    }
}

impl AttesterSlashingDetector {
    /// Registers a vote and pairs it against every retained prior vote of
    /// the same validator. An exact repeat is a no-op.
    pub fn register_attestation(
        &self,
        validator_index: ValidatorIndex,
        attestation: AttestationRecord,
    ) {
        let inner = &mut *self.inner.lock();
        let records = inner
            .attestations
            .entry(validator_index)
            .or_insert_with(Vec::new);

        // Prune on insertion: drop everything older than the window ending
        // at the newest target seen for this validator.
        let newest_target = records
            .iter()
            .map(|record| record.target_epoch)
            .chain(Some(attestation.target_epoch))
            .max()
            .unwrap_or(0);
        let window_floor = newest_target.saturating_sub(ATTESTATION_WINDOW_EPOCHS);
        records.retain(|record| record.target_epoch >= window_floor);

        if attestation.target_epoch < window_floor || records.contains(&attestation) {
            return;
        }

        for prior in records.iter() {
            let kind = if attestation.target_epoch == prior.target_epoch
                && attestation.target_root != prior.target_root
            {
                Some(EvidenceKind::DoubleVote)
            } else if (attestation.source_epoch < prior.source_epoch
                && prior.target_epoch < attestation.target_epoch)
                || (prior.source_epoch < attestation.source_epoch
                    && attestation.target_epoch < prior.target_epoch)
            {
                Some(EvidenceKind::SurroundVote)
            } else {
                None
            };

            if let Some(kind) = kind {
                info!(
                    "slashable votes by validator {}: {:?} ({:?} vs {:?})",
                    validator_index, kind, prior, attestation,
                );
                inner.evidence.push(AttesterEvidence {
                    validator_index,
                    kind,
                    attestation_1: *prior,
                    attestation_2: attestation,
                });
            }
        }

        records.push(attestation);
    }

    /// Drains the accumulated evidence.
    pub fn detect_attester_slashings(&self) -> Vec<AttesterEvidence> {
        mem::replace(&mut self.inner.lock().evidence, Vec::new())
    }

    /// Surveys the accumulated evidence without draining it.
    pub fn peek_attester_slashings(&self) -> Vec<AttesterEvidence> {
        self.inner.lock().evidence.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source_epoch: Epoch, target_epoch: Epoch, root_byte: u8) -> AttestationRecord {
        AttestationRecord {
            source_epoch,
            target_epoch,
            target_root: H256::from([root_byte; 32]),
        }
    }

    #[test]
    fn distinct_targets_in_distinct_epochs_are_fine() {
        let detector = AttesterSlashingDetector::default();
        detector.register_attestation(0, record(0, 1, 1));
        detector.register_attestation(0, record(1, 2, 2));

        assert!(detector.detect_attester_slashings().is_empty());
    }

    #[test]
    fn double_vote_is_detected() {
        let detector = AttesterSlashingDetector::default();
        detector.register_attestation(0, record(0, 5, 1));
        detector.register_attestation(0, record(0, 5, 2));

        let evidence = detector.detect_attester_slashings();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].kind, EvidenceKind::DoubleVote);
        assert_eq!(evidence[0].validator_index, 0);

        assert!(detector.detect_attester_slashings().is_empty());
    }

    #[test]
    fn surround_vote_is_detected() {
        let detector = AttesterSlashingDetector::default();
        detector.register_attestation(2, record(10, 20, 1));
        detector.register_attestation(2, record(11, 19, 2));

        let evidence = detector.detect_attester_slashings();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].kind, EvidenceKind::SurroundVote);
        assert_eq!(evidence[0].validator_index, 2);
    }

    #[test]
    fn surrounding_vote_is_detected_in_the_other_direction() {
        let detector = AttesterSlashingDetector::default();
        detector.register_attestation(2, record(11, 19, 1));
        detector.register_attestation(2, record(10, 20, 2));

        let evidence = detector.detect_attester_slashings();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].kind, EvidenceKind::SurroundVote);
    }

    #[test]
    fn identical_votes_are_not_slashable() {
        let detector = AttesterSlashingDetector::default();
        detector.register_attestation(0, record(0, 5, 1));
        detector.register_attestation(0, record(0, 5, 1));

        assert!(detector.detect_attester_slashings().is_empty());
    }

    #[test]
    fn votes_by_different_validators_do_not_conflict() {
        let detector = AttesterSlashingDetector::default();
        detector.register_attestation(0, record(0, 5, 1));
        detector.register_attestation(1, record(0, 5, 2));

        assert!(detector.detect_attester_slashings().is_empty());
    }

    #[test]
    fn peek_does_not_drain() {
        let detector = AttesterSlashingDetector::default();
        detector.register_attestation(0, record(0, 5, 1));
        detector.register_attestation(0, record(0, 5, 2));

        assert_eq!(detector.peek_attester_slashings().len(), 1);
        assert_eq!(detector.peek_attester_slashings().len(), 1);
        assert_eq!(detector.detect_attester_slashings().len(), 1);
    }

    #[test]
    fn old_votes_fall_out_of_the_window() {
        let detector = AttesterSlashingDetector::default();
        detector.register_attestation(0, record(0, 5, 1));
        // A much newer vote prunes the old one...
        detector.register_attestation(0, record(9000, 9001, 2));
        // ...so a double vote against epoch 5 goes unnoticed.
        detector.register_attestation(0, record(0, 5, 3));

        assert!(detector.detect_attester_slashings().is_empty());
    }
}
