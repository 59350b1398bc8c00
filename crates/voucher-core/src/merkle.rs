//! merkle engine seam between the synchronizer and the tree implementation

use pool_merkle::{IncrementalMerkleTree, MerkleProof, NodeHasher, Sha256FieldHasher};

use crate::codec::FieldElement;
use crate::error::Result;

/// the pool tree used by default
pub type PoolTree = IncrementalMerkleTree<Sha256FieldHasher>;

/// append-only commitment tree as seen by the voucher client
pub trait MerkleTreeEngine: Send + Sync + 'static {
    fn insert(&mut self, leaf: FieldElement) -> Result<usize>;

    fn clear(&mut self);

    fn root(&self) -> FieldElement;

    fn leaf_count(&self) -> usize;

    fn leaf(&self, index: usize) -> Option<FieldElement>;

    fn leaf_index(&self, leaf: &FieldElement) -> Option<usize>;

    fn generate_proof(&self, leaf_index: usize) -> Result<MerkleProof>;

    /// checks against the current root
    fn verify_proof(&self, proof: &MerkleProof) -> bool;

    fn compute_root_from_proof(&self, proof: &MerkleProof) -> FieldElement;
}

impl<H: NodeHasher + Send + Sync + 'static> MerkleTreeEngine for IncrementalMerkleTree<H> {
    fn insert(&mut self, leaf: FieldElement) -> Result<usize> {
        Ok(IncrementalMerkleTree::insert(self, leaf.to_bytes())?)
    }

    fn clear(&mut self) {
        IncrementalMerkleTree::clear(self)
    }

    fn root(&self) -> FieldElement {
        IncrementalMerkleTree::root(self).into()
    }

    fn leaf_count(&self) -> usize {
        IncrementalMerkleTree::leaf_count(self)
    }

    fn leaf(&self, index: usize) -> Option<FieldElement> {
        IncrementalMerkleTree::leaf(self, index).copied().map(FieldElement::from)
    }

    fn leaf_index(&self, leaf: &FieldElement) -> Option<usize> {
        IncrementalMerkleTree::leaf_index(self, leaf.as_bytes())
    }

    fn generate_proof(&self, leaf_index: usize) -> Result<MerkleProof> {
        Ok(IncrementalMerkleTree::generate_proof(self, leaf_index)?)
    }

    fn verify_proof(&self, proof: &MerkleProof) -> bool {
        IncrementalMerkleTree::verify_proof(self, proof, None)
    }

    fn compute_root_from_proof(&self, proof: &MerkleProof) -> FieldElement {
        IncrementalMerkleTree::compute_root_from_proof(self, proof).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_over_pool_tree() {
        let mut tree = PoolTree::new(4).unwrap();
        let engine: &mut dyn MerkleTreeEngine = &mut tree;
        for i in 1..=3u64 {
            engine.insert(FieldElement::from_u64(i)).unwrap();
        }
        assert_eq!(engine.leaf_count(), 3);
        assert_eq!(engine.leaf_index(&FieldElement::from_u64(2)), Some(1));
        assert_eq!(engine.leaf(2), Some(FieldElement::from_u64(3)));

        let proof = engine.generate_proof(1).unwrap();
        assert!(engine.verify_proof(&proof));
        assert_eq!(engine.compute_root_from_proof(&proof), engine.root());

        engine.clear();
        assert_eq!(engine.leaf_count(), 0);
    }

    #[test]
    fn test_out_of_bounds_maps_to_voucher_error() {
        let tree = PoolTree::new(4).unwrap();
        let err = MerkleTreeEngine::generate_proof(&tree, 0).unwrap_err();
        assert!(matches!(err, crate::VoucherError::Tree(_)));
    }
}
