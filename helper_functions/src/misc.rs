use std::cmp::max;
use std::convert::TryFrom;

use log::warn;
use typenum::marker_traits::Unsigned;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::*;

use crate::{
    crypto::hash,
    error::Error,
    math::{bytes_to_int, int_to_bytes},
};

const MAX_RANDOM_BYTE: u64 = (1 << 8) - 1;

/// The sampling loop in [`compute_proposer_index`] terminates after a few
/// iterations for any realistic stake distribution. The bound exists so a
/// pathological registry cannot spin forever.
const PROPOSER_SAMPLING_BOUND: u64 = 10_000;

/// The swap-or-not shuffle. Maps `index` to its position in a permutation of
/// `[0, index_count)` determined by `seed`.
pub fn compute_shuffled_index<C: Config>(
    index: ValidatorIndex,
    index_count: u64,
    seed: &H256,
) -> Result<ValidatorIndex, Error> {
    if index_count == 0 {
        return Err(Error::EmptyCommittee);
    }
    if index >= index_count {
        return Err(Error::IndexOutOfRange);
    }
    let mut index = index;
    for current_round in 0..C::shuffle_round_count() {
        index = shuffle_round::<C>(index, index_count, seed, current_round);
    }
    Ok(index)
}

/// The inverse permutation: walks the rounds backwards with the same
/// per-round arithmetic, so `unshuffle(shuffle(i)) == i`.
pub fn compute_unshuffled_index<C: Config>(
    index: ValidatorIndex,
    index_count: u64,
    seed: &H256,
) -> Result<ValidatorIndex, Error> {
    if index_count == 0 {
        return Err(Error::EmptyCommittee);
    }
    if index >= index_count {
        return Err(Error::IndexOutOfRange);
    }
    let mut index = index;
    for current_round in (0..C::shuffle_round_count()).rev() {
        index = shuffle_round::<C>(index, index_count, seed, current_round);
    }
    Ok(index)
}

fn shuffle_round<C: Config>(index: u64, index_count: u64, seed: &H256, round: u64) -> u64 {
    let pivot = bytes_to_int(hash_seed_round(&seed[..], round)) % index_count;
    let flip = (pivot + index_count - index) % index_count;
    let position = max(index, flip);
    let source = hash_seed_round_position(&seed[..], round, position);
    let byte = source[((position % 256) / 8) as usize];
    let bit = (byte >> (position % 8)) % 2;
    if bit == 0 {
        index
    } else {
        flip
    }
}

fn hash_seed_round(seed: &[u8], round: u64) -> [u8; 8] {
    let mut input = seed.to_vec();
    input.append(&mut int_to_bytes(round, 1));
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&hash(&input)[..8]);
    bytes
}

fn hash_seed_round_position(seed: &[u8], round: u64, position: u64) -> Vec<u8> {
    let mut input = seed.to_vec();
    input.append(&mut int_to_bytes(round, 1));
    input.append(&mut int_to_bytes(position / 256, 4));
    hash(&input)
}

pub fn compute_epoch_at_slot<C: Config>(slot: Slot) -> Epoch {
    slot / C::SlotsPerEpoch::to_u64()
}

pub fn compute_start_slot_at_epoch<C: Config>(epoch: Epoch) -> Slot {
    epoch * C::SlotsPerEpoch::to_u64()
}

pub fn is_epoch_start_slot<C: Config>(slot: Slot) -> bool {
    slot % C::SlotsPerEpoch::to_u64() == 0
}

pub fn compute_activation_exit_epoch<C: Config>(epoch: Epoch) -> Epoch {
    epoch + 1 + C::max_seed_lookahead()
}

/// Slices committee `index` out of `count` committees over the shuffled
/// positions of `indices`. Committee sizes differ by at most one.
pub fn compute_committee<C: Config>(
    indices: &[ValidatorIndex],
    seed: &H256,
    index: u64,
    count: u64,
) -> Result<Vec<ValidatorIndex>, Error> {
    if count == 0 {
        return Err(Error::EmptyCommittee);
    }
    if index >= count {
        return Err(Error::CommitteeIndexOutOfRange);
    }

    let total = indices.len() as u64;
    let start = total * index / count;
    let end = total * (index + 1) / count;

    let mut committee = Vec::with_capacity(usize::try_from(end - start).unwrap_or(0));
    for position in start..end {
        let shuffled = compute_shuffled_index::<C>(position, total, seed)?;
        committee.push(indices[shuffled as usize]);
    }

    Ok(committee)
}

/// Effective-balance-weighted proposer sampling. Deterministic in
/// `(indices, seed)` and biased proportionally to effective balance.
pub fn compute_proposer_index<C: Config>(
    state: &BeaconState<C>,
    indices: &[ValidatorIndex],
    seed: &H256,
) -> Result<ValidatorIndex, Error> {
    if indices.is_empty() {
        return Err(Error::NoActiveValidators);
    }

    let total = indices.len() as u64;
    let mut i = 0;
    while i < PROPOSER_SAMPLING_BOUND {
        let shuffled = compute_shuffled_index::<C>(i % total, total, seed)?;
        let candidate = indices[shuffled as usize];

        let mut combined = seed.as_bytes().to_vec();
        combined.append(&mut int_to_bytes(i / 32, 8));
        let random_byte = hash(&combined)[(i % 32) as usize];

        let effective_balance = state
            .validators
            .get(candidate as usize)
            .ok_or(Error::IndexOutOfRange)?
            .effective_balance;
        if effective_balance * MAX_RANDOM_BYTE >= C::max_effective_balance() * u64::from(random_byte)
        {
            return Ok(candidate);
        }
        i += 1;
    }

    warn!(
        "proposer sampling exhausted {} attempts, falling back to the first active index",
        PROPOSER_SAMPLING_BOUND,
    );
    Ok(indices[0])
}

pub fn compute_domain(domain_type: DomainType, fork_version: Option<&Version>) -> Domain {
    let mut domain = [0; 32];
    domain[0..4].copy_from_slice(&domain_type.to_le_bytes());
    if let Some(version) = fork_version {
        domain[4..8].copy_from_slice(version.as_array());
    }
    H256::from(domain)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use types::config::MainnetConfig;

    use super::*;

    fn test_seed(byte: u8) -> H256 {
        H256::from_slice(&hash(&[byte, 0x5e]))
    }

    #[test]
    fn shuffled_index_stays_in_range() {
        let seed = test_seed(0);
        for i in 0..1000 {
            let shuffled = compute_shuffled_index::<MainnetConfig>(i, 1000, &seed)
                .expect("index is within range");
            assert!(shuffled < 1000);
        }
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let seed = H256::from_slice(&hash(b"permutation test"));
        let outputs = (0..50)
            .map(|i| compute_shuffled_index::<MainnetConfig>(i, 50, &seed))
            .collect::<Result<BTreeSet<_>, _>>()
            .expect("all indices are within range");

        assert_eq!(outputs.len(), 50);
        assert!(outputs.iter().all(|shuffled| *shuffled < 50));
    }

    #[test]
    fn unshuffle_inverts_shuffle() {
        let seed = test_seed(0);
        for i in 0..100 {
            let shuffled = compute_shuffled_index::<MainnetConfig>(i, 100, &seed)
                .expect("index is within range");
            let unshuffled = compute_unshuffled_index::<MainnetConfig>(shuffled, 100, &seed)
                .expect("index is within range");
            assert_eq!(unshuffled, i);
        }
    }

    #[test]
    fn shuffle_of_single_element_is_identity() {
        assert_eq!(
            compute_shuffled_index::<MainnetConfig>(0, 1, &test_seed(1)),
            Ok(0),
        );
    }

    #[test]
    fn shuffle_rejects_empty_set() {
        assert_eq!(
            compute_shuffled_index::<MainnetConfig>(0, 0, &test_seed(1)),
            Err(Error::EmptyCommittee),
        );
    }

    #[test]
    fn shuffle_rejects_index_at_count() {
        assert_eq!(
            compute_shuffled_index::<MainnetConfig>(1, 1, &test_seed(1)),
            Err(Error::IndexOutOfRange),
        );
    }

    #[test]
    fn committees_partition_the_indices() {
        let indices: Vec<ValidatorIndex> = (0..37).collect();
        let seed = test_seed(0);
        let count = 4;

        let mut seen = BTreeSet::new();
        let mut sizes = Vec::new();
        for committee_index in 0..count {
            let committee =
                compute_committee::<MainnetConfig>(&indices, &seed, committee_index, count)
                    .expect("committee index is within range");
            sizes.push(committee.len());
            seen.extend(committee);
        }

        assert_eq!(seen, indices.iter().copied().collect());
        let smallest = sizes.iter().min().expect("there are committees");
        let largest = sizes.iter().max().expect("there are committees");
        assert!(largest - smallest <= 1);
    }

    #[test]
    fn committee_index_out_of_range_is_rejected() {
        let indices: Vec<ValidatorIndex> = (0..8).collect();
        assert_eq!(
            compute_committee::<MainnetConfig>(&indices, &test_seed(1), 4, 4),
            Err(Error::CommitteeIndexOutOfRange),
        );
    }

    #[test]
    fn test_epoch_at_slot() {
        assert_eq!(compute_epoch_at_slot::<MainnetConfig>(17), 0);
        assert_eq!(compute_epoch_at_slot::<MainnetConfig>(32), 1);
    }

    #[test]
    fn test_compute_start_slot_at_epoch() {
        assert_eq!(
            compute_start_slot_at_epoch::<MainnetConfig>(10),
            <MainnetConfig as Config>::SlotsPerEpoch::to_u64() * 10,
        );
    }

    #[test]
    fn test_compute_activation_exit_epoch() {
        assert_eq!(compute_activation_exit_epoch::<MainnetConfig>(0), 5);
    }

    #[test]
    fn domain_embeds_type_and_version() {
        let domain = compute_domain(2, Some(&Version::from([0, 0, 1, 0])));
        assert_eq!(domain[0], 2);
        assert_eq!(domain[6], 1);
        assert_eq!(&domain[8..], &[0; 24][..]);
    }
}
