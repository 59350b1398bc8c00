//! two-to-one node hashing

use sha2::{Digest, Sha256};

use crate::Hash;

/// domain tag for the empty leaf
pub const ZERO_LEAF_DOMAIN: &[u8] = b"voucher_pool_zero_leaf_v1";

/// hash function used to combine two child nodes
///
/// implementations must be deterministic and must produce values that the
/// on-chain pool accepts as tree nodes. the tree never hashes leaves, it only
/// combines them, so commitments are inserted verbatim.
pub trait NodeHasher {
    /// combine a left and right child
    fn hash_pair(left: &Hash, right: &Hash) -> Hash;

    /// value of an empty leaf slot
    fn zero_leaf() -> Hash;
}

/// sha256 over `left || right`, truncated to 253 bits
///
/// clearing the top three bits keeps every node below the bn254 scalar
/// modulus, so nodes are valid circuit inputs without reduction.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256FieldHasher;

impl Sha256FieldHasher {
    fn truncate(mut digest: Hash) -> Hash {
        digest[0] &= 0x1f;
        digest
    }
}

impl NodeHasher for Sha256FieldHasher {
    fn hash_pair(left: &Hash, right: &Hash) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(left);
        hasher.update(right);
        Self::truncate(hasher.finalize().into())
    }

    fn zero_leaf() -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(ZERO_LEAF_DOMAIN);
        Self::truncate(hasher.finalize().into())
    }
}

/// zero hashes for every level, `zeros[0]` is the empty leaf and
/// `zeros[height]` the root of an empty tree
pub fn zero_hashes<H: NodeHasher>(height: usize) -> Vec<Hash> {
    let mut zeros = Vec::with_capacity(height + 1);
    zeros.push(H::zero_leaf());
    for level in 0..height {
        let below = zeros[level];
        zeros.push(H::hash_pair(&below, &below));
    }
    zeros
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_to_field() {
        let h = Sha256FieldHasher::hash_pair(&[0xff; 32], &[0xee; 32]);
        assert!(h[0] < 0x20);
        assert!(Sha256FieldHasher::zero_leaf()[0] < 0x20);
    }

    #[test]
    fn test_hash_pair_is_ordered() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(
            Sha256FieldHasher::hash_pair(&a, &b),
            Sha256FieldHasher::hash_pair(&b, &a)
        );
    }

    #[test]
    fn test_zero_hashes_chain() {
        let zeros = zero_hashes::<Sha256FieldHasher>(4);
        assert_eq!(zeros.len(), 5);
        for level in 0..4 {
            assert_eq!(
                zeros[level + 1],
                Sha256FieldHasher::hash_pair(&zeros[level], &zeros[level])
            );
        }
    }
}
