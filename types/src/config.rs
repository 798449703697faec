use core::fmt::Debug;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use typenum::{
    Unsigned, U1048576, U1099511627776, U128, U16, U16777216, U2, U2048, U256, U32, U512, U64,
    U65536, U8, U8192,
};

use crate::consts::{FAR_FUTURE_EPOCH, GENESIS_EPOCH};
use crate::primitives::{Epoch, Gwei, Slot};

/// Compile-time protocol parameters.
///
/// Lengths that appear in SSZ containers are associated `typenum` types;
/// everything else is a function with a default impl that presets can
/// override.
pub trait Config:
    Clone + Copy + PartialEq + Eq + Debug + Default + Send + Sync + Serialize + DeserializeOwned + 'static
{
    type SlotsPerEpoch: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type SlotsPerHistoricalRoot: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type SlotsPerEth1VotingPeriod: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type EpochsPerHistoricalVector: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type EpochsPerSlashingsVector: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type HistoricalRootsLimit: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type ValidatorRegistryLimit: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type MaxValidatorsPerCommittee: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type SyncCommitteeSize: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type MaxProposerSlashings: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type MaxAttesterSlashings: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type MaxAttestations: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type MaxDeposits: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type MaxVoluntaryExits: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type MaxExtraDataBytes: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;
    type BytesPerLogsBloom: Unsigned + Clone + Debug + PartialEq + Eq + Send + Sync;

    fn genesis_epoch() -> Epoch {
        GENESIS_EPOCH
    }

    fn far_future_epoch() -> Epoch {
        FAR_FUTURE_EPOCH
    }

    fn seconds_per_slot() -> u64 {
        12
    }

    fn shuffle_round_count() -> u64 {
        90
    }

    fn target_committee_size() -> u64 {
        128
    }

    fn max_committees_per_slot() -> u64 {
        64
    }

    fn min_per_epoch_churn_limit() -> u64 {
        4
    }

    fn churn_limit_quotient() -> u64 {
        65_536
    }

    fn min_seed_lookahead() -> u64 {
        1
    }

    fn max_seed_lookahead() -> u64 {
        4
    }

    fn min_attestation_inclusion_delay() -> u64 {
        1
    }

    fn min_validator_withdrawability_delay() -> u64 {
        256
    }

    fn shard_committee_period() -> u64 {
        256
    }

    fn max_effective_balance() -> Gwei {
        32_000_000_000
    }

    fn effective_balance_increment() -> Gwei {
        1_000_000_000
    }

    fn ejection_balance() -> Gwei {
        16_000_000_000
    }

    fn hysteresis_quotient() -> u64 {
        4
    }

    fn hysteresis_downward_multiplier() -> u64 {
        1
    }

    fn hysteresis_upward_multiplier() -> u64 {
        5
    }

    fn base_reward_factor() -> u64 {
        64
    }

    fn timely_source_weight() -> u64 {
        14
    }

    fn timely_target_weight() -> u64 {
        26
    }

    fn timely_head_weight() -> u64 {
        14
    }

    fn sync_reward_weight() -> u64 {
        2
    }

    fn proposer_weight() -> u64 {
        8
    }

    fn weight_denominator() -> u64 {
        64
    }

    fn inactivity_penalty_quotient() -> u64 {
        // 3 * 2**24
        50_331_648
    }

    fn inactivity_score_bias() -> u64 {
        4
    }

    fn inactivity_score_recovery_rate() -> u64 {
        16
    }

    fn min_epochs_to_inactivity_penalty() -> u64 {
        4
    }

    fn proportional_slashing_multiplier() -> u64 {
        3
    }

    fn min_slashing_penalty_quotient() -> u64 {
        64
    }

    fn whistleblower_reward_quotient() -> u64 {
        512
    }

    fn proposer_score_boost() -> u64 {
        40
    }

    fn epochs_per_sync_committee_period() -> u64 {
        256
    }

    fn domain_beacon_proposer() -> u32 {
        0
    }

    fn domain_beacon_attester() -> u32 {
        1
    }

    fn domain_randao() -> u32 {
        2
    }

    fn domain_deposit() -> u32 {
        3
    }

    fn domain_voluntary_exit() -> u32 {
        4
    }

    fn domain_sync_committee() -> u32 {
        7
    }

    fn slots_per_epoch() -> Slot {
        Self::SlotsPerEpoch::to_u64()
    }

    fn slots_per_historical_root() -> u64 {
        Self::SlotsPerHistoricalRoot::to_u64()
    }

    fn epochs_per_historical_vector() -> u64 {
        Self::EpochsPerHistoricalVector::to_u64()
    }

    fn epochs_per_slashings_vector() -> u64 {
        Self::EpochsPerSlashingsVector::to_u64()
    }
}

/// The production preset.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct MainnetConfig;

impl Config for MainnetConfig {
    type SlotsPerEpoch = U32;
    type SlotsPerHistoricalRoot = U8192;
    type SlotsPerEth1VotingPeriod = U2048;
    type EpochsPerHistoricalVector = U65536;
    type EpochsPerSlashingsVector = U8192;
    type HistoricalRootsLimit = U16777216;
    type ValidatorRegistryLimit = U1099511627776;
    type MaxValidatorsPerCommittee = U2048;
    type SyncCommitteeSize = U512;
    type MaxProposerSlashings = U16;
    type MaxAttesterSlashings = U2;
    type MaxAttestations = U128;
    type MaxDeposits = U16;
    type MaxVoluntaryExits = U16;
    type MaxExtraDataBytes = U32;
    type BytesPerLogsBloom = U256;
}

/// A small preset for tests. Committees and history buffers shrink so that
/// interesting boundaries are reachable with a handful of validators.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub struct MinimalConfig;

impl Config for MinimalConfig {
    type SlotsPerEpoch = U8;
    type SlotsPerHistoricalRoot = U64;
    type SlotsPerEth1VotingPeriod = U32;
    type EpochsPerHistoricalVector = U64;
    type EpochsPerSlashingsVector = U64;
    type HistoricalRootsLimit = U16777216;
    type ValidatorRegistryLimit = U1048576;
    type MaxValidatorsPerCommittee = U2048;
    type SyncCommitteeSize = U32;
    type MaxProposerSlashings = U16;
    type MaxAttesterSlashings = U2;
    type MaxAttestations = U128;
    type MaxDeposits = U16;
    type MaxVoluntaryExits = U16;
    type MaxExtraDataBytes = U32;
    type BytesPerLogsBloom = U256;

    fn target_committee_size() -> u64 {
        4
    }

    fn max_committees_per_slot() -> u64 {
        4
    }

    fn churn_limit_quotient() -> u64 {
        32
    }

    fn epochs_per_sync_committee_period() -> u64 {
        8
    }

    fn shard_committee_period() -> u64 {
        64
    }

    fn seconds_per_slot() -> u64 {
        6
    }
}

#[cfg(test)]
mod tests {
    use typenum::Unsigned as _;

    use super::*;

    #[test]
    fn mainnet_epoch_shape() {
        assert_eq!(<MainnetConfig as Config>::SlotsPerEpoch::to_u64(), 32);
        assert_eq!(MainnetConfig::slots_per_historical_root(), 8192);
        assert_eq!(MainnetConfig::epochs_per_historical_vector(), 65_536);
        assert_eq!(MainnetConfig::epochs_per_slashings_vector(), 8192);
    }

    #[test]
    fn minimal_overrides_committee_parameters() {
        assert_eq!(MinimalConfig::target_committee_size(), 4);
        assert_eq!(MinimalConfig::max_committees_per_slot(), 4);
        assert_eq!(<MinimalConfig as Config>::SlotsPerEpoch::to_u64(), 8);
    }

    #[test]
    fn weights_sum_to_denominator_minus_sync_and_proposer() {
        let flag_weights = MainnetConfig::timely_source_weight()
            + MainnetConfig::timely_target_weight()
            + MainnetConfig::timely_head_weight();
        assert_eq!(
            flag_weights + MainnetConfig::sync_reward_weight() + MainnetConfig::proposer_weight(),
            MainnetConfig::weight_denominator(),
        );
    }
}
