use thiserror::Error;
use typenum::marker_traits::Unsigned;
use types::config::Config;
use types::primitives::{SignatureBytes, Slot, ValidatorIndex, H256};
use types::types::{
    Attestation, AttesterSlashing, BeaconBlock, BeaconBlockBody, Deposit, Eth1Data,
    ExecutionPayloadHeader, ProposerSlashing, SignedVoluntaryExit, SyncAggregate,
};

#[derive(PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("blocks cannot be produced for the genesis slot")]
    GenesisSlot,
    #[error("the parent root is empty")]
    EmptyParentRoot,
    #[error("no block materials were supplied")]
    MissingBody,
}

/// Everything a block body is assembled from. The producer copies what it
/// needs and never mutates these collections.
pub struct BlockMaterials<C: Config> {
    pub randao_reveal: SignatureBytes,
    pub eth1_data: Eth1Data,
    pub graffiti: H256,
    pub proposer_slashings: Vec<ProposerSlashing>,
    pub attester_slashings: Vec<AttesterSlashing<C>>,
    pub attestations: Vec<Attestation<C>>,
    pub deposits: Vec<Deposit>,
    pub voluntary_exits: Vec<SignedVoluntaryExit>,
    pub sync_aggregate: SyncAggregate<C>,
    pub execution_payload_header: ExecutionPayloadHeader<C>,
}

/// Assembles an unsigned block, truncating each operation list to its
/// per-body cap. The state root is left zeroed for the caller to fill in
/// after running the state transition.
pub fn produce_block<C: Config>(
    slot: Slot,
    proposer_index: ValidatorIndex,
    parent_root: H256,
    materials: Option<&BlockMaterials<C>>,
) -> Result<BeaconBlock<C>, Error> {
    if slot == 0 {
        return Err(Error::GenesisSlot);
    }
    if parent_root == H256::zero() {
        return Err(Error::EmptyParentRoot);
    }
    let materials = materials.ok_or(Error::MissingBody)?;

    let body = BeaconBlockBody {
        randao_reveal: materials.randao_reveal.clone(),
        eth1_data: materials.eth1_data.clone(),
        graffiti: materials.graffiti,
        proposer_slashings: capped(
            &materials.proposer_slashings,
            C::MaxProposerSlashings::to_usize(),
        )
        .into(),
        attester_slashings: capped(
            &materials.attester_slashings,
            C::MaxAttesterSlashings::to_usize(),
        )
        .into(),
        attestations: capped(&materials.attestations, C::MaxAttestations::to_usize()).into(),
        deposits: capped(&materials.deposits, C::MaxDeposits::to_usize()).into(),
        voluntary_exits: capped(
            &materials.voluntary_exits,
            C::MaxVoluntaryExits::to_usize(),
        )
        .into(),
        sync_aggregate: materials.sync_aggregate.clone(),
        execution_payload_header: materials.execution_payload_header.clone(),
    };

    Ok(BeaconBlock {
        slot,
        proposer_index,
        parent_root,
        state_root: H256::zero(),
        body,
    })
}

fn capped<T: Clone>(source: &[T], cap: usize) -> Vec<T> {
    source.iter().take(cap).cloned().collect()
}

#[cfg(test)]
mod tests {
    use ssz_types::BitList;
    use types::config::MinimalConfig;
    use types::primitives::AggregateSignatureBytes;
    use types::types::AttestationData;

    use super::*;

    fn materials() -> BlockMaterials<MinimalConfig> {
        BlockMaterials {
            randao_reveal: SignatureBytes::empty(),
            eth1_data: Eth1Data::default(),
            graffiti: H256::zero(),
            proposer_slashings: Vec::new(),
            attester_slashings: Vec::new(),
            attestations: Vec::new(),
            deposits: Vec::new(),
            voluntary_exits: Vec::new(),
            sync_aggregate: SyncAggregate::default(),
            execution_payload_header: ExecutionPayloadHeader::default(),
        }
    }

    fn attestation(slot: Slot) -> Attestation<MinimalConfig> {
        Attestation {
            aggregation_bits: BitList::with_capacity(8).expect("length is within bounds"),
            data: AttestationData {
                slot,
                ..AttestationData::default()
            },
            signature: AggregateSignatureBytes::empty(),
        }
    }

    #[test]
    fn produces_a_block_with_the_supplied_operations() {
        let mut materials = materials();
        materials.attestations = vec![attestation(1), attestation(2)];

        let block = produce_block(3, 7, H256::from([1; 32]), Some(&materials))
            .expect("the inputs are valid");

        assert_eq!(block.slot, 3);
        assert_eq!(block.proposer_index, 7);
        assert_eq!(block.parent_root, H256::from([1; 32]));
        assert_eq!(block.state_root, H256::zero());
        assert_eq!(block.body.attestations.len(), 2);
    }

    #[test]
    fn genesis_slot_is_rejected() {
        assert_eq!(
            produce_block::<MinimalConfig>(0, 0, H256::from([1; 32]), Some(&materials())),
            Err(Error::GenesisSlot),
        );
    }

    #[test]
    fn empty_parent_root_is_rejected() {
        assert_eq!(
            produce_block::<MinimalConfig>(1, 0, H256::zero(), Some(&materials())),
            Err(Error::EmptyParentRoot),
        );
    }

    #[test]
    fn missing_materials_are_rejected() {
        assert_eq!(
            produce_block::<MinimalConfig>(1, 0, H256::from([1; 32]), None),
            Err(Error::MissingBody),
        );
    }

    #[test]
    fn attestations_are_truncated_to_the_cap() {
        let mut materials = materials();
        materials.attestations = (0..200_u64).map(attestation).collect();

        let block = produce_block(5, 0, H256::from([1; 32]), Some(&materials))
            .expect("the inputs are valid");

        assert_eq!(
            block.body.attestations.len(),
            <MinimalConfig as Config>::MaxAttestations::to_usize(),
        );
        // The source collection is untouched.
        assert_eq!(materials.attestations.len(), 200);
    }

    #[test]
    fn caps_apply_to_every_operation_list() {
        let mut materials = materials();
        let exit = SignedVoluntaryExit {
            message: types::types::VoluntaryExit {
                epoch: 0,
                validator_index: 0,
            },
            signature: SignatureBytes::empty(),
        };
        materials.voluntary_exits = vec![exit; 40];

        let block = produce_block(5, 0, H256::from([1; 32]), Some(&materials))
            .expect("the inputs are valid");

        assert_eq!(
            block.body.voluntary_exits.len(),
            <MinimalConfig as Config>::MaxVoluntaryExits::to_usize(),
        );
    }
}
