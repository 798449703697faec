use ring::digest::{digest, SHA256};
use tree_hash::TreeHash;
use types::primitives::{
    AggregateSignatureBytes, Domain, PublicKeyBytes, SignatureBytes, H256,
};
use types::types::SigningRoot;

#[cfg(test)]
use mockall::automock;

pub fn hash(input: &[u8]) -> Vec<u8> {
    digest(&SHA256, input).as_ref().to_vec()
}

pub fn hash_pair(left: &[u8], right: &[u8]) -> H256 {
    let mut concatenated = Vec::with_capacity(left.len() + right.len());
    concatenated.extend_from_slice(left);
    concatenated.extend_from_slice(right);
    H256::from_slice(&hash(&concatenated))
}

pub fn hash_tree_root<T: TreeHash>(object: &T) -> H256 {
    object.tree_hash_root()
}

/// The root actually covered by a signature: the object root mixed with the
/// domain.
pub fn signing_root<T: TreeHash>(object: &T, domain: Domain) -> H256 {
    SigningRoot {
        object_root: object.tree_hash_root(),
        domain,
    }
    .tree_hash_root()
}

/// The seam to the BLS backend. The core never constructs signatures; it
/// only asks an implementation of this trait whether one checks out.
#[cfg_attr(test, automock)]
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, signing_root: H256, pubkey: &PublicKeyBytes, signature: &SignatureBytes)
        -> bool;

    fn fast_aggregate_verify(
        &self,
        signing_root: H256,
        pubkeys: &[PublicKeyBytes],
        signature: &AggregateSignatureBytes,
    ) -> bool;
}

/// Accepts any non-zero signature and rejects the all-zero one. Deployments
/// replace this with a real BLS backend.
pub struct StubVerifier;

impl SignatureVerifier for StubVerifier {
    fn verify(
        &self,
        _signing_root: H256,
        _pubkey: &PublicKeyBytes,
        signature: &SignatureBytes,
    ) -> bool {
        !signature.is_empty()
    }

    fn fast_aggregate_verify(
        &self,
        _signing_root: H256,
        pubkeys: &[PublicKeyBytes],
        signature: &AggregateSignatureBytes,
    ) -> bool {
        !pubkeys.is_empty() && !signature.is_empty()
    }
}
