use std::sync::Arc;

use anyhow::{anyhow, Result};
use attestation_pool::{AttestationPool, AttesterCapManager, InclusionMonitor, InsertOutcome};
use beacon_fork_choice::{HeadUpdate, Store};
use helper_functions::beacon_state_accessors::{
    get_attesting_indices, get_beacon_committee, get_committee_count_per_slot, get_current_epoch,
};
use helper_functions::misc::compute_epoch_at_slot;
use helper_functions::crypto::{hash_tree_root, SignatureVerifier};
use helper_functions::math::integer_squareroot;
use log::{debug, info};
use slashing_detection::{
    AttestationRecord, AttesterSlashingDetector, ProposerSlashingDetector,
};
use tree_hash::TreeHash as _;
use typenum::marker_traits::Unsigned;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::consts::*;
use types::primitives::{Slot, H256, SignatureBytes};
use types::types::{Attestation, Checkpoint, Eth1Data, SignedBeaconBlock};

use crate::checkpoint_store::CheckpointStore;
use crate::clock::{SlotTimer, WallClock};
use crate::producer::{produce_block, BlockMaterials};
use crate::state_machine::StateMachine;

/// The assembled beacon node: the canonical state machine plus every
/// satellite component, wired together the way a production service would
/// drive them.
pub struct Node<C: Config> {
    state_machine: StateMachine<C>,
    fork_choice: Store<C>,
    attestation_pool: AttestationPool<C>,
    cap_manager: AttesterCapManager,
    inclusion_monitor: InclusionMonitor,
    proposer_detector: ProposerSlashingDetector,
    attester_detector: AttesterSlashingDetector,
    checkpoint_store: CheckpointStore<C>,
    timer: SlotTimer<C>,
    verifier: Box<dyn SignatureVerifier>,
    anchor_checkpoint: Checkpoint,
}

impl<C: Config> Node<C> {
    pub fn new(
        genesis_state: BeaconState<C>,
        clock: Arc<dyn WallClock>,
        verifier: Box<dyn SignatureVerifier>,
    ) -> Self {
        // The anchor is the state's own header with the state root filled
        // in, exactly as slot processing will record it. Every party can
        // derive the same root independently.
        let mut anchor_header = genesis_state.latest_block_header.clone();
        if anchor_header.state_root == H256::zero() {
            anchor_header.state_root = hash_tree_root(&genesis_state);
        }
        let anchor_root = anchor_header.canonical_root();
        let anchor_checkpoint = Checkpoint {
            epoch: get_current_epoch(&genesis_state),
            root: anchor_root,
        };

        let timer = SlotTimer::new(genesis_state.genesis_time, clock);
        let fork_choice = Store::new(
            genesis_state.slot,
            anchor_root,
            anchor_checkpoint,
            anchor_checkpoint,
        );
        let state_machine = StateMachine::new(genesis_state);
        fork_choice.set_balances(state_machine.effective_balances());

        Self {
            state_machine,
            fork_choice,
            attestation_pool: AttestationPool::default(),
            cap_manager: AttesterCapManager::default(),
            inclusion_monitor: InclusionMonitor::default(),
            proposer_detector: ProposerSlashingDetector::default(),
            attester_detector: AttesterSlashingDetector::default(),
            checkpoint_store: CheckpointStore::default(),
            timer,
            verifier,
            anchor_checkpoint,
        }
    }

    pub fn state_machine(&self) -> &StateMachine<C> {
        &self.state_machine
    }

    pub fn fork_choice(&self) -> &Store<C> {
        &self.fork_choice
    }

    pub fn attestation_pool(&self) -> &AttestationPool<C> {
        &self.attestation_pool
    }

    pub fn cap_manager(&self) -> &AttesterCapManager {
        &self.cap_manager
    }

    pub fn inclusion_monitor(&self) -> &InclusionMonitor {
        &self.inclusion_monitor
    }

    pub fn proposer_detector(&self) -> &ProposerSlashingDetector {
        &self.proposer_detector
    }

    pub fn attester_detector(&self) -> &AttesterSlashingDetector {
        &self.attester_detector
    }

    pub fn checkpoint_store(&self) -> &CheckpointStore<C> {
        &self.checkpoint_store
    }

    pub fn timer(&self) -> &SlotTimer<C> {
        &self.timer
    }

    /// Advances every component to `slot`.
    pub fn handle_slot_start(&self, slot: Slot) -> Result<()> {
        info!("slot {} started", slot);

        self.state_machine
            .process_slots(slot)
            .map_err(|error| anyhow!("slot processing failed: {:?}", error))?;
        self.fork_choice.on_slot(slot)?;
        self.attestation_pool.advance_slot(slot);
        self.sync_satellites_with_state()
    }

    /// Applies a gossiped or locally produced block everywhere it matters.
    pub fn accept_beacon_block(
        &self,
        signed_block: &SignedBeaconBlock<C>,
        timely: bool,
        validate_state_root: bool,
    ) -> Result<()> {
        let block = &signed_block.message;
        let block_root = hash_tree_root(block);
        debug!("received beacon block {:?} at slot {}", block_root, block.slot);

        self.proposer_detector
            .register_proposal(block.proposer_index, block.slot, block_root)?;

        self.state_machine
            .process_block(signed_block, self.verifier.as_ref(), validate_state_root)
            .map_err(|error| anyhow!("block processing failed: {:?}", error))?;

        let justified = self.state_machine.justified_checkpoint();
        let finalized = self.state_machine.finalized_checkpoint();
        self.fork_choice.on_block(
            block.slot,
            block_root,
            block.parent_root,
            justified.epoch,
            finalized.epoch,
            timely,
        )?;

        self.track_included_attestations(signed_block);
        self.sync_satellites_with_state()
    }

    /// Feeds an attestation into the pool, the vote store and the slashing
    /// detector. Duplicate aggregation is reported, not failed.
    pub fn accept_beacon_attestation(
        &self,
        attestation: Attestation<C>,
    ) -> Result<InsertOutcome> {
        let data = &attestation.data;
        let snapshot = self.state_machine.snapshot();
        if let Ok(indices) = get_attesting_indices(&snapshot, data, &attestation.aggregation_bits)
        {
            for index in indices {
                self.attester_detector.register_attestation(
                    index,
                    AttestationRecord {
                        source_epoch: data.source.epoch,
                        target_epoch: data.target.epoch,
                        target_root: data.target.root,
                    },
                );
                match self
                    .fork_choice
                    .on_attestation(index, data.beacon_block_root, data.target.epoch)
                {
                    Ok(()) | Err(beacon_fork_choice::Error::StaleAttestation { .. }) => {}
                    Err(error) => return Err(error.into()),
                }
            }
        }

        let outcome = self.attestation_pool.insert(attestation)?;
        Ok(outcome)
    }

    /// Assembles an unsigned block for `slot` from the pools. The caller
    /// signs it and feeds it back through [`Node::accept_beacon_block`].
    pub fn produce_beacon_block(
        &self,
        slot: Slot,
        randao_reveal: SignatureBytes,
        graffiti: H256,
        eth1_data: Eth1Data,
    ) -> Result<types::types::BeaconBlock<C>> {
        let attestations = self
            .attestation_pool
            .get_for_block(slot, C::MaxAttestations::to_usize());
        let snapshot = self.state_machine.snapshot();

        // Plan the slot's attestation bandwidth while the committee sizes
        // are at hand.
        let committees_per_slot =
            get_committee_count_per_slot(&snapshot, compute_epoch_at_slot::<C>(slot));
        let committee_sizes: Vec<usize> = (0..committees_per_slot)
            .filter_map(|index| {
                get_beacon_committee(&snapshot, slot, index)
                    .map(|committee| committee.len())
                    .ok()
            })
            .collect();
        self.cap_manager.plan_for_slot(slot, &committee_sizes);

        let materials = BlockMaterials {
            randao_reveal,
            eth1_data,
            graffiti,
            proposer_slashings: Vec::new(),
            attester_slashings: Vec::new(),
            attestations,
            deposits: Vec::new(),
            voluntary_exits: Vec::new(),
            sync_aggregate: Default::default(),
            execution_payload_header: snapshot.latest_execution_payload_header.clone(),
        };

        let proposer_index = self
            .state_machine
            .proposer_index()
            .map_err(|error| anyhow!("proposer selection failed: {:?}", error))?;
        let parent_root = self.state_machine.latest_block_root();

        let block = produce_block(slot, proposer_index, parent_root, Some(&materials))?;
        for attestation in block.body.attestations.iter() {
            self.attestation_pool
                .register_included(attestation.data.tree_hash_root());
        }
        Ok(block)
    }

    pub fn get_head(&self) -> Result<HeadUpdate> {
        Ok(self.fork_choice.get_head()?)
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.state_machine.finalized_checkpoint()
    }

    /// Pushes fresh balances and checkpoints into the satellite components
    /// and persists/prunes on a finality advance.
    fn sync_satellites_with_state(&self) -> Result<()> {
        self.fork_choice
            .set_balances(self.state_machine.effective_balances());
        self.attestation_pool
            .set_justified_checkpoint(self.state_machine.justified_checkpoint());

        let justified = self.state_machine.justified_checkpoint();
        let finalized = self.state_machine.finalized_checkpoint();
        let store_justified = if justified.epoch > self.anchor_checkpoint.epoch {
            justified
        } else {
            self.anchor_checkpoint
        };
        let store_finalized = if finalized.epoch > self.anchor_checkpoint.epoch {
            finalized
        } else {
            self.anchor_checkpoint
        };
        self.fork_choice
            .update_checkpoints(store_justified, store_finalized)?;

        if finalized.epoch > self.anchor_checkpoint.epoch
            && self.checkpoint_store.latest_finalized().map(|c| c.epoch) < Some(finalized.epoch)
        {
            info!("finalized checkpoint advanced to epoch {}", finalized.epoch);
            self.checkpoint_store
                .checkpoint(finalized, self.state_machine.snapshot())?;
            if self.fork_choice.contains_block(&finalized.root) {
                self.fork_choice.prune(finalized.root)?;
            }
            self.inclusion_monitor.prune_before(finalized.epoch);
        }

        Ok(())
    }

    /// Updates the inclusion monitor from a block's attestations.
    fn track_included_attestations(&self, signed_block: &SignedBeaconBlock<C>) {
        let block = &signed_block.message;
        let snapshot = self.state_machine.snapshot();

        for attestation in block.body.attestations.iter() {
            let data = &attestation.data;
            let delay = block.slot.saturating_sub(data.slot);

            let mut flags = 0;
            if delay <= integer_squareroot(C::SlotsPerEpoch::to_u64()) {
                flags |= 1 << TIMELY_SOURCE_FLAG_INDEX;
            }
            if delay <= C::SlotsPerEpoch::to_u64() {
                flags |= 1 << TIMELY_TARGET_FLAG_INDEX;
            }
            if delay == C::min_attestation_inclusion_delay() {
                flags |= 1 << TIMELY_HEAD_FLAG_INDEX;
            }

            if let Ok(indices) =
                get_attesting_indices(&snapshot, data, &attestation.aggregation_bits)
            {
                for index in indices {
                    self.inclusion_monitor.record(index, data.target.epoch, flags);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use helper_functions::beacon_state_accessors::get_beacon_proposer_index;
    use helper_functions::crypto::StubVerifier;
    use ssz_types::{FixedVector, VariableList};
    use transition_functions::process_slot::process_slots;
    use types::config::MinimalConfig;
    use types::primitives::Gwei;
    use types::types::Validator;

    use crate::clock::ManualClock;

    use super::*;

    const MAX_EB: Gwei = 32_000_000_000;

    fn non_zero_signature() -> SignatureBytes {
        let mut bytes = [0; 96];
        bytes[0] = 1;
        SignatureBytes::from_bytes(&bytes).expect("96 bytes is a valid signature")
    }

    fn active_validator() -> Validator {
        Validator {
            effective_balance: MAX_EB,
            activation_epoch: 0,
            exit_epoch: u64::max_value(),
            withdrawable_epoch: u64::max_value(),
            ..Validator::default()
        }
    }

    fn genesis_state(count: usize) -> BeaconState<MinimalConfig> {
        BeaconState {
            genesis_time: 1_000_000,
            validators: VariableList::from(vec![active_validator(); count]),
            balances: VariableList::from(vec![MAX_EB; count]),
            previous_epoch_participation: VariableList::from(vec![0; count]),
            current_epoch_participation: VariableList::from(vec![0; count]),
            inactivity_scores: VariableList::from(vec![0; count]),
            randao_mixes: FixedVector::from(vec![H256::from([3; 32]); 8]),
            ..BeaconState::default()
        }
    }

    fn node_with_validators(count: usize) -> Node<MinimalConfig> {
        Node::new(
            genesis_state(count),
            Arc::new(ManualClock::new(1_000_000)),
            Box::new(StubVerifier),
        )
    }

    /// Builds a block for slot 1 that passes header, randao and signature
    /// checks under the stub verifier.
    fn valid_block_at_slot_one(node: &Node<MinimalConfig>) -> SignedBeaconBlock<MinimalConfig> {
        let mut preview = node.state_machine().snapshot();
        process_slots(&mut preview, 1).expect("slot 1 is ahead of genesis");
        let proposer_index =
            get_beacon_proposer_index(&preview).expect("validators are active");
        let parent_root = preview.latest_block_header.canonical_root();

        let block = produce_block(
            1,
            proposer_index,
            parent_root,
            Some(&BlockMaterials {
                randao_reveal: non_zero_signature(),
                eth1_data: Eth1Data::default(),
                graffiti: H256::zero(),
                proposer_slashings: Vec::new(),
                attester_slashings: Vec::new(),
                attestations: Vec::new(),
                deposits: Vec::new(),
                voluntary_exits: Vec::new(),
                sync_aggregate: Default::default(),
                execution_payload_header: Default::default(),
            }),
        )
        .expect("the block materials are valid");

        SignedBeaconBlock {
            message: block,
            signature: non_zero_signature(),
        }
    }

    #[test]
    fn accepted_block_becomes_the_head() {
        let node = node_with_validators(8);
        node.handle_slot_start(1).expect("slot 1 is ahead of genesis");

        let signed_block = valid_block_at_slot_one(&node);
        let block_root = hash_tree_root(&signed_block.message);

        node.accept_beacon_block(&signed_block, false, false)
            .expect("the block is valid");

        assert!(node.fork_choice().contains_block(&block_root));
        let head = node.get_head().expect("a viable head exists");
        assert_eq!(head.root, block_root);
    }

    #[test]
    fn equivocating_proposals_surface_as_evidence() {
        let node = node_with_validators(8);
        node.handle_slot_start(1).expect("slot 1 is ahead of genesis");

        let signed_block = valid_block_at_slot_one(&node);
        let mut conflicting = signed_block.clone();
        conflicting.message.body.graffiti = H256::from([0x42; 32]);

        node.accept_beacon_block(&signed_block, false, false)
            .expect("the block is valid");
        // The second block fails state processing (the header was already
        // replaced) but its proposal is registered first.
        let _ = node.accept_beacon_block(&conflicting, false, false);

        let evidence = node.proposer_detector().detect_proposer_slashings();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].slot, 1);
    }

    #[test]
    fn pool_attestations_flow_into_produced_blocks() {
        let node = node_with_validators(16);
        node.handle_slot_start(1).expect("slot 1 is ahead of genesis");

        let snapshot = node.state_machine().snapshot();
        let committee =
            helper_functions::beacon_state_accessors::get_beacon_committee(&snapshot, 0, 0)
                .expect("committee exists");
        let mut bits: ssz_types::BitList<
            <MinimalConfig as Config>::MaxValidatorsPerCommittee,
        > = ssz_types::BitList::with_capacity(committee.len()).expect("length is within bounds");
        bits.set(0, true).expect("bit exists");

        let attestation = Attestation::<MinimalConfig> {
            aggregation_bits: bits,
            data: types::types::AttestationData {
                slot: 0,
                index: 0,
                beacon_block_root: H256::from([5; 32]),
                source: snapshot.current_justified_checkpoint,
                target: Checkpoint::default(),
            },
            signature: non_zero_signature(),
        };

        node.accept_beacon_attestation(attestation)
            .expect("the attestation is acceptable");

        let block = node
            .produce_beacon_block(1, non_zero_signature(), H256::zero(), Eth1Data::default())
            .expect("production inputs are valid");
        assert_eq!(block.body.attestations.len(), 1);
        // Production also planned the slot's attestation bandwidth.
        assert!(node.cap_manager().cached_plan(1).is_some());

        // The data key is now marked included; a copy is absorbed.
        let copy = block.body.attestations[0].clone();
        assert_eq!(
            node.accept_beacon_attestation(copy).expect("still acceptable"),
            InsertOutcome::Duplicate,
        );
    }

    #[test]
    fn attestation_votes_reach_fork_choice() {
        let node = node_with_validators(16);
        node.handle_slot_start(1).expect("slot 1 is ahead of genesis");

        let signed_block = valid_block_at_slot_one(&node);
        let block_root = hash_tree_root(&signed_block.message);
        node.accept_beacon_block(&signed_block, false, false)
            .expect("the block is valid");

        node.handle_slot_start(2).expect("slot 2 is ahead of slot 1");

        let snapshot = node.state_machine().snapshot();
        let committee =
            helper_functions::beacon_state_accessors::get_beacon_committee(&snapshot, 1, 0)
                .expect("committee exists");
        let mut bits: ssz_types::BitList<
            <MinimalConfig as Config>::MaxValidatorsPerCommittee,
        > = ssz_types::BitList::with_capacity(committee.len()).expect("length is within bounds");
        bits.set(0, true).expect("bit exists");

        let attestation = Attestation::<MinimalConfig> {
            aggregation_bits: bits,
            data: types::types::AttestationData {
                slot: 1,
                index: 0,
                beacon_block_root: block_root,
                source: snapshot.current_justified_checkpoint,
                target: Checkpoint::default(),
            },
            signature: non_zero_signature(),
        };

        node.accept_beacon_attestation(attestation)
            .expect("the attestation is acceptable");

        let head = node.get_head().expect("a viable head exists");
        assert_eq!(head.root, block_root);
    }

    #[test]
    fn slot_timer_follows_the_manual_clock() {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let node = Node::<MinimalConfig>::new(
            genesis_state(4),
            clock.clone(),
            Box::new(StubVerifier),
        );

        assert_eq!(node.timer().current_slot(), 0);
        clock.set(1_000_000 + 2 * MinimalConfig::seconds_per_slot());
        assert_eq!(node.timer().current_slot(), 2);
    }
}
