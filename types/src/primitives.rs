use core::fmt;

use derive_more::Display;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ssz::{Decode, DecodeError, Encode};
use tree_hash::{Hash256, TreeHash, TreeHashType};

pub use ethereum_types::{H160, H256, U256};

pub type Slot = u64;
pub type Epoch = u64;
pub type Gwei = u64;
pub type CommitteeIndex = u64;
pub type ValidatorIndex = u64;
pub type DomainType = u32;
pub type UnixSeconds = u64;

/// A domain is the 32-byte mixin that separates signatures produced for
/// different purposes and forks. Deriving it is the job of
/// `helper_functions::misc::compute_domain`.
pub type Domain = H256;

pub type ParticipationFlags = u8;

pub type AggregatePublicKeyBytes = PublicKeyBytes;
pub type AggregateSignatureBytes = SignatureBytes;

const PUBLIC_KEY_LENGTH: usize = 48;
const SIGNATURE_LENGTH: usize = 96;
const VERSION_LENGTH: usize = 4;
const ADDRESS_LENGTH: usize = 20;

// `ethereum-types` stops at `H64`, and the BLS backend is an external
// collaborator, so the fixed-width key and signature containers are wrapped
// arrays with the SSZ and tree-hash impls written out by hand.

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes([u8; PUBLIC_KEY_LENGTH]);

impl PublicKeyBytes {
    pub fn empty() -> Self {
        Self([0; PUBLIC_KEY_LENGTH])
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: PUBLIC_KEY_LENGTH,
            });
        }
        let mut array = [0; PUBLIC_KEY_LENGTH];
        array.copy_from_slice(bytes);
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }
}

impl Default for PublicKeyBytes {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "0x{}", hex::encode(&self.0[..]))
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SignatureBytes([u8; SIGNATURE_LENGTH]);

impl SignatureBytes {
    pub fn empty() -> Self {
        Self([0; SIGNATURE_LENGTH])
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: SIGNATURE_LENGTH,
            });
        }
        let mut array = [0; SIGNATURE_LENGTH];
        array.copy_from_slice(bytes);
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }
}

impl Default for SignatureBytes {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "0x{}", hex::encode(&self.0[..]))
    }
}

/// A fork version. Two of these plus a boundary epoch make up a `Fork`.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Display, Hash)]
#[display(fmt = "{:?}", _0)]
pub struct Version([u8; VERSION_LENGTH]);

impl Version {
    pub fn as_array(&self) -> &[u8; VERSION_LENGTH] {
        &self.0
    }
}

impl From<[u8; VERSION_LENGTH]> for Version {
    fn from(array: [u8; VERSION_LENGTH]) -> Self {
        Self(array)
    }
}

/// An execution-layer address. `tree_hash` does not cover `H160`, so the
/// impls live here.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Hash)]
pub struct Address(H160);

impl Address {
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<H160> for Address {
    fn from(hash: H160) -> Self {
        Self(hash)
    }
}

macro_rules! impl_fixed_bytes_traits {
    ($name: ident, $length: expr, $accessor: expr) => {
        impl Encode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $length
            }

            fn ssz_bytes_len(&self) -> usize {
                $length
            }

            fn ssz_append(&self, buf: &mut Vec<u8>) {
                let accessor: fn(&$name) -> &[u8] = $accessor;
                buf.extend_from_slice(accessor(self));
            }
        }

        impl Decode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $length
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
                $name::from_bytes(bytes)
            }
        }

        impl TreeHash for $name {
            fn tree_hash_type() -> TreeHashType {
                TreeHashType::Vector
            }

            fn tree_hash_packed_encoding(&self) -> Vec<u8> {
                unreachable!("vectors are never packed")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("vectors are never packed")
            }

            fn tree_hash_root(&self) -> Hash256 {
                let accessor: fn(&$name) -> &[u8] = $accessor;
                tree_hash::merkle_root(accessor(self), 0)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let accessor: fn(&$name) -> &[u8] = $accessor;
                serializer.serialize_str(&format!("0x{}", hex::encode(accessor(self))))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let string = String::deserialize(deserializer)?;
                let stripped = string.strip_prefix("0x").unwrap_or(&string);
                let bytes = hex::decode(stripped).map_err(D::Error::custom)?;
                $name::from_bytes(&bytes).map_err(|error| D::Error::custom(format!("{:?}", error)))
            }
        }
    };
}

impl_fixed_bytes_traits!(PublicKeyBytes, PUBLIC_KEY_LENGTH, |this: &PublicKeyBytes| {
    &this.0[..]
});
impl_fixed_bytes_traits!(SignatureBytes, SIGNATURE_LENGTH, |this: &SignatureBytes| {
    &this.0[..]
});
impl_fixed_bytes_traits!(Version, VERSION_LENGTH, |this: &Version| &this.0[..]);
impl_fixed_bytes_traits!(Address, ADDRESS_LENGTH, |this: &Address| this.0.as_bytes());

impl Version {
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != VERSION_LENGTH {
            return Err(DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: VERSION_LENGTH,
            });
        }
        let mut array = [0; VERSION_LENGTH];
        array.copy_from_slice(bytes);
        Ok(Self(array))
    }
}

impl Address {
    fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() != ADDRESS_LENGTH {
            return Err(DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: ADDRESS_LENGTH,
            });
        }
        Ok(Self(H160::from_slice(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use ssz::{Decode, Encode};
    use tree_hash::TreeHash;

    use super::*;

    #[test]
    fn public_key_bytes_ssz_round_trip() {
        let mut bytes = [0; 48];
        bytes[0] = 0xaa;
        bytes[47] = 0xbb;
        let pubkey = PublicKeyBytes::from_bytes(&bytes).expect("48 bytes is a valid public key");

        let encoded = pubkey.as_ssz_bytes();
        assert_eq!(encoded.len(), 48);
        assert_eq!(PublicKeyBytes::from_ssz_bytes(&encoded), Ok(pubkey));
    }

    #[test]
    fn public_key_bytes_rejects_wrong_length() {
        assert!(PublicKeyBytes::from_bytes(&[0; 47]).is_err());
    }

    #[test]
    fn empty_signature_is_empty() {
        assert!(SignatureBytes::empty().is_empty());

        let mut bytes = [0; 96];
        bytes[95] = 1;
        let signature = SignatureBytes::from_bytes(&bytes).expect("96 bytes is a valid signature");
        assert!(!signature.is_empty());
    }

    #[test]
    fn signature_tree_hash_covers_all_chunks() {
        let mut bytes = [0; 96];
        bytes[64] = 0xcc;
        let signature = SignatureBytes::from_bytes(&bytes).expect("96 bytes is a valid signature");

        assert_ne!(
            signature.tree_hash_root(),
            SignatureBytes::empty().tree_hash_root(),
        );
    }

    #[test]
    fn version_round_trips_through_array() {
        let version = Version::from([0, 0, 0, 1]);
        assert_eq!(version.as_array(), &[0, 0, 0, 1]);
        assert_eq!(Version::from_ssz_bytes(&version.as_ssz_bytes()), Ok(version));
    }
}
