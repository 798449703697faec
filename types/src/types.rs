use serde::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use ssz_types::{BitList, BitVector, FixedVector, VariableList};
use tree_hash::TreeHash;
use tree_hash_derive::TreeHash;

use crate::config::Config;
use crate::primitives::*;

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
pub struct Validator {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: H256,
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub activation_eligibility_epoch: Epoch,
    pub activation_epoch: Epoch,
    pub exit_epoch: Epoch,
    pub withdrawable_epoch: Epoch,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            pubkey: PublicKeyBytes::empty(),
            withdrawal_credentials: H256::zero(),
            effective_balance: 0,
            slashed: false,
            activation_eligibility_epoch: 0,
            activation_epoch: 0,
            exit_epoch: 0,
            withdrawable_epoch: 0,
        }
    }
}

#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Default, Hash, Deserialize, Serialize, Encode, Decode,
    TreeHash,
)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: H256,
}

#[derive(
    Clone, PartialEq, Eq, Debug, Default, Hash, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
pub struct AttestationData {
    pub slot: Slot,
    pub index: CommitteeIndex,
    pub beacon_block_root: H256,
    pub source: Checkpoint,
    pub target: Checkpoint,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct Attestation<C: Config> {
    pub aggregation_bits: BitList<C::MaxValidatorsPerCommittee>,
    pub data: AttestationData,
    pub signature: AggregateSignatureBytes,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct IndexedAttestation<C: Config> {
    pub attesting_indices: VariableList<ValidatorIndex, C::MaxValidatorsPerCommittee>,
    pub data: AttestationData,
    pub signature: AggregateSignatureBytes,
}

impl<C: Config> Default for IndexedAttestation<C> {
    fn default() -> Self {
        Self {
            attesting_indices: Default::default(),
            data: Default::default(),
            signature: AggregateSignatureBytes::empty(),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct AttesterSlashing<C: Config> {
    pub attestation_1: IndexedAttestation<C>,
    pub attestation_2: IndexedAttestation<C>,
}

#[derive(
    Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
pub struct BeaconBlockHeader {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: H256,
    pub state_root: H256,
    pub body_root: H256,
}

impl BeaconBlockHeader {
    pub fn canonical_root(&self) -> H256 {
        self.tree_hash_root()
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
pub struct SignedBeaconBlockHeader {
    pub message: BeaconBlockHeader,
    pub signature: SignatureBytes,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
pub struct ProposerSlashing {
    pub signed_header_1: SignedBeaconBlockHeader,
    pub signed_header_2: SignedBeaconBlockHeader,
}

#[derive(
    Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
pub struct Eth1Data {
    pub deposit_root: H256,
    pub deposit_count: u64,
    pub block_hash: H256,
}

#[derive(
    Clone, PartialEq, Eq, Debug, Default, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
pub struct Fork {
    pub previous_version: Version,
    pub current_version: Version,
    pub epoch: Epoch,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
pub struct DepositData {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: H256,
    pub amount: Gwei,
    pub signature: SignatureBytes,
}

/// What a deposit signature actually signs: the data minus the signature.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
pub struct DepositMessage {
    pub pubkey: PublicKeyBytes,
    pub withdrawal_credentials: H256,
    pub amount: Gwei,
}

/// The eth1 bridge and its Merkle proofs are outside this workspace; a
/// deposit reaching the state machine is already proven.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
pub struct Deposit {
    pub data: DepositData,
}

#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
pub struct VoluntaryExit {
    pub epoch: Epoch,
    pub validator_index: ValidatorIndex,
}

#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
pub struct SignedVoluntaryExit {
    pub message: VoluntaryExit,
    pub signature: SignatureBytes,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct SyncCommittee<C: Config> {
    pub pubkeys: FixedVector<PublicKeyBytes, C::SyncCommitteeSize>,
    pub aggregate_pubkey: AggregatePublicKeyBytes,
}

impl<C: Config> Default for SyncCommittee<C> {
    fn default() -> Self {
        Self {
            pubkeys: Default::default(),
            aggregate_pubkey: AggregatePublicKeyBytes::empty(),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct SyncAggregate<C: Config> {
    pub sync_committee_bits: BitVector<C::SyncCommitteeSize>,
    pub sync_committee_signature: AggregateSignatureBytes,
}

impl<C: Config> Default for SyncAggregate<C> {
    fn default() -> Self {
        Self {
            sync_committee_bits: Default::default(),
            sync_committee_signature: AggregateSignatureBytes::empty(),
        }
    }
}

/// An opaque summary of the execution payload. The execution layer itself is
/// an external collaborator; only the header is carried in consensus.
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct ExecutionPayloadHeader<C: Config> {
    pub parent_hash: H256,
    pub fee_recipient: Address,
    pub state_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: FixedVector<u8, C::BytesPerLogsBloom>,
    pub prev_randao: H256,
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: VariableList<u8, C::MaxExtraDataBytes>,
    pub base_fee_per_gas: U256,
    pub block_hash: H256,
    pub transactions_root: H256,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct BeaconBlockBody<C: Config> {
    pub randao_reveal: SignatureBytes,
    pub eth1_data: Eth1Data,
    pub graffiti: H256,
    pub proposer_slashings: VariableList<ProposerSlashing, C::MaxProposerSlashings>,
    pub attester_slashings: VariableList<AttesterSlashing<C>, C::MaxAttesterSlashings>,
    pub attestations: VariableList<Attestation<C>, C::MaxAttestations>,
    pub deposits: VariableList<Deposit, C::MaxDeposits>,
    pub voluntary_exits: VariableList<SignedVoluntaryExit, C::MaxVoluntaryExits>,
    pub sync_aggregate: SyncAggregate<C>,
    pub execution_payload_header: ExecutionPayloadHeader<C>,
}

impl<C: Config> Default for BeaconBlockBody<C> {
    fn default() -> Self {
        Self {
            randao_reveal: SignatureBytes::empty(),
            eth1_data: Default::default(),
            graffiti: Default::default(),
            proposer_slashings: Default::default(),
            attester_slashings: Default::default(),
            attestations: Default::default(),
            deposits: Default::default(),
            voluntary_exits: Default::default(),
            sync_aggregate: Default::default(),
            execution_payload_header: Default::default(),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct BeaconBlock<C: Config> {
    pub slot: Slot,
    pub proposer_index: ValidatorIndex,
    pub parent_root: H256,
    pub state_root: H256,
    pub body: BeaconBlockBody<C>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct SignedBeaconBlock<C: Config> {
    pub message: BeaconBlock<C>,
    pub signature: SignatureBytes,
}

impl<C: Config> Default for SignedBeaconBlock<C> {
    fn default() -> Self {
        Self {
            message: Default::default(),
            signature: SignatureBytes::empty(),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize, Encode, Decode, TreeHash)]
#[serde(bound = "C: Config")]
pub struct HistoricalBatch<C: Config> {
    pub block_roots: FixedVector<H256, C::SlotsPerHistoricalRoot>,
    pub state_roots: FixedVector<H256, C::SlotsPerHistoricalRoot>,
}

#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Default, Deserialize, Serialize, Encode, Decode, TreeHash,
)]
pub struct SigningRoot {
    pub object_root: H256,
    pub domain: Domain,
}

#[cfg(test)]
mod tests {
    use crate::config::MinimalConfig;

    use super::*;

    #[test]
    fn attestation_data_equality_is_byte_equality() {
        let data = AttestationData {
            slot: 3,
            index: 1,
            beacon_block_root: H256::from([1; 32]),
            ..AttestationData::default()
        };
        let mut other = data.clone();
        assert_eq!(data, other);

        other.index = 2;
        assert_ne!(data, other);
    }

    #[test]
    fn header_canonical_root_commits_to_body_root() {
        let header = BeaconBlockHeader {
            slot: 5,
            body_root: H256::from([7; 32]),
            ..BeaconBlockHeader::default()
        };
        let mut other = header.clone();
        other.body_root = H256::from([8; 32]);

        assert_ne!(header.canonical_root(), other.canonical_root());
    }

    #[test]
    fn default_block_body_is_empty() {
        let body = BeaconBlockBody::<MinimalConfig>::default();
        assert_eq!(body.attestations.len(), 0);
        assert_eq!(body.deposits.len(), 0);
        assert!(body.randao_reveal.is_empty());
    }
}
