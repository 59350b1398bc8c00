//! membership proofs

use crate::{hasher::NodeHasher, Hash};

/// sibling path from a leaf to the root
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MerkleProof {
    /// root of the tree the proof was generated against
    pub root: Hash,
    /// sibling hashes, leaf level first
    pub path_elements: Vec<Hash>,
    /// 0 when the path node is a left child, 1 when it is a right child
    pub path_indices: Vec<u8>,
    pub leaf: Hash,
    pub leaf_index: usize,
}

impl MerkleProof {
    pub fn depth(&self) -> usize {
        self.path_elements.len()
    }

    /// recompute the root this proof commits to
    pub fn compute_root<H: NodeHasher>(&self) -> Hash {
        compute_root::<H>(&self.leaf, &self.path_elements, &self.path_indices)
    }

    /// check the proof against an expected root
    pub fn verify<H: NodeHasher>(&self, expected_root: &Hash) -> bool {
        self.path_elements.len() == self.path_indices.len()
            && &self.compute_root::<H>() == expected_root
    }
}

/// fold a leaf up a sibling path
pub fn compute_root<H: NodeHasher>(leaf: &Hash, path_elements: &[Hash], path_indices: &[u8]) -> Hash {
    path_elements
        .iter()
        .zip(path_indices.iter())
        .fold(*leaf, |current, (sibling, &side)| {
            if side == 0 {
                H::hash_pair(&current, sibling)
            } else {
                H::hash_pair(sibling, &current)
            }
        })
}
