//! incremental commitment tree for privacy pools
//!
//! mirrors the on-chain "merkle tree with history" state machine: leaves are
//! appended left to right, the rightmost filled node of every level is cached,
//! and the last `root_history_size` roots are kept in a ring buffer indexed by
//! `current_root_index`.
//!
//! the tree does not hash leaves. commitments go in verbatim and only interior
//! nodes are produced by the [`NodeHasher`].

pub mod hasher;
pub mod proof;

pub use hasher::{zero_hashes, NodeHasher, Sha256FieldHasher};
pub use proof::{compute_root, MerkleProof};

use std::marker::PhantomData;
use thiserror::Error;

pub type Hash = [u8; 32];

/// default tree height used by the voucher pool
pub const DEFAULT_HEIGHT: usize = 20;

/// default size of the root history ring
pub const ROOT_HISTORY_SIZE: usize = 30;

/// largest supported height, keeps capacity within u64
pub const MAX_HEIGHT: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("tree is full ({capacity} leaves)")]
    TreeFull { capacity: u64 },

    #[error("invalid tree height {0}")]
    InvalidHeight(usize),

    #[error("leaf index {index} out of bounds ({leaf_count} leaves)")]
    LeafIndexOutOfBounds { index: usize, leaf_count: usize },

    #[error("invalid tree state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;

/// append-only merkle tree with a root history
#[derive(Clone, Debug)]
pub struct IncrementalMerkleTree<H: NodeHasher = Sha256FieldHasher> {
    height: usize,
    root_history_size: usize,
    leaves: Vec<Hash>,
    filled_subtrees: Vec<Hash>,
    zeros: Vec<Hash>,
    roots: Vec<Hash>,
    current_root_index: usize,
    _hasher: PhantomData<H>,
}

impl<H: NodeHasher> IncrementalMerkleTree<H> {
    pub fn new(height: usize) -> Result<Self> {
        Self::with_root_history(height, ROOT_HISTORY_SIZE)
    }

    pub fn with_root_history(height: usize, root_history_size: usize) -> Result<Self> {
        if height == 0 || height > MAX_HEIGHT {
            return Err(TreeError::InvalidHeight(height));
        }
        if root_history_size == 0 {
            return Err(TreeError::InvalidState("root history size must be non-zero".into()));
        }

        let zeros = zero_hashes::<H>(height);
        Ok(Self {
            height,
            root_history_size,
            leaves: Vec::new(),
            filled_subtrees: zeros[..height].to_vec(),
            roots: vec![zeros[height]],
            zeros,
            current_root_index: 0,
            _hasher: PhantomData,
        })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    /// append a leaf, returns its index
    pub fn insert(&mut self, leaf: Hash) -> Result<usize> {
        let leaf_index = self.leaves.len();
        if leaf_index as u64 >= self.capacity() {
            return Err(TreeError::TreeFull { capacity: self.capacity() });
        }

        let mut index = leaf_index;
        let mut current = leaf;
        for level in 0..self.height {
            if index % 2 == 0 {
                self.filled_subtrees[level] = current;
                current = H::hash_pair(&current, &self.zeros[level]);
            } else {
                current = H::hash_pair(&self.filled_subtrees[level], &current);
            }
            index /= 2;
        }

        self.current_root_index = (self.current_root_index + 1) % self.root_history_size;
        if self.roots.len() < self.root_history_size {
            self.roots.push(current);
        } else {
            self.roots[self.current_root_index] = current;
        }
        self.leaves.push(leaf);

        Ok(leaf_index)
    }

    pub fn bulk_insert(&mut self, leaves: &[Hash]) -> Result<Vec<usize>> {
        leaves.iter().map(|leaf| self.insert(*leaf)).collect()
    }

    /// reset to the empty tree, keeping height and history size
    pub fn clear(&mut self) {
        self.leaves.clear();
        self.filled_subtrees = self.zeros[..self.height].to_vec();
        self.roots = vec![self.zeros[self.height]];
        self.current_root_index = 0;
    }

    pub fn root(&self) -> Hash {
        self.roots[self.current_root_index]
    }

    pub fn roots(&self) -> &[Hash] {
        &self.roots
    }

    pub fn current_root_index(&self) -> usize {
        self.current_root_index
    }

    /// walk the history ring backwards from the current root
    pub fn is_known_root(&self, root: &Hash) -> bool {
        let len = self.roots.len();
        (0..len)
            .map(|back| (self.current_root_index + len - back) % len)
            .any(|i| &self.roots[i] == root)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaves(&self) -> &[Hash] {
        &self.leaves
    }

    pub fn leaf(&self, index: usize) -> Option<&Hash> {
        self.leaves.get(index)
    }

    /// first index holding `leaf`
    pub fn leaf_index(&self, leaf: &Hash) -> Option<usize> {
        self.leaves.iter().position(|l| l == leaf)
    }

    pub fn contains(&self, leaf: &Hash) -> bool {
        self.leaf_index(leaf).is_some()
    }

    /// sibling path for the leaf at `leaf_index`
    pub fn generate_proof(&self, leaf_index: usize) -> Result<MerkleProof> {
        let leaf = *self.leaves.get(leaf_index).ok_or(TreeError::LeafIndexOutOfBounds {
            index: leaf_index,
            leaf_count: self.leaves.len(),
        })?;

        let mut path_elements = Vec::with_capacity(self.height);
        let mut path_indices = Vec::with_capacity(self.height);
        let mut layer = self.leaves.clone();
        let mut index = leaf_index;

        for level in 0..self.height {
            let zero = self.zeros[level];
            let sibling = layer.get(index ^ 1).copied().unwrap_or(zero);
            path_elements.push(sibling);
            path_indices.push((index % 2) as u8);

            layer = layer
                .chunks(2)
                .map(|pair| H::hash_pair(&pair[0], pair.get(1).unwrap_or(&zero)))
                .collect();
            index /= 2;
        }

        Ok(MerkleProof {
            root: self.root(),
            path_elements,
            path_indices,
            leaf,
            leaf_index,
        })
    }

    pub fn compute_root_from_proof(&self, proof: &MerkleProof) -> Hash {
        proof.compute_root::<H>()
    }

    /// verify against `root`, or the current root when none is given
    pub fn verify_proof(&self, proof: &MerkleProof, root: Option<&Hash>) -> bool {
        let target = root.copied().unwrap_or_else(|| self.root());
        proof.verify::<H>(&target)
    }

    pub fn state(&self) -> TreeState {
        TreeState {
            height: self.height,
            root_history_size: self.root_history_size,
            leaves: self.leaves.clone(),
            filled_subtrees: self.filled_subtrees.clone(),
            roots: self.roots.clone(),
            current_root_index: self.current_root_index,
        }
    }

    /// restore a snapshot, rejecting structurally inconsistent state
    pub fn from_state(state: TreeState) -> Result<Self> {
        let mut tree = Self::with_root_history(state.height, state.root_history_size)?;
        if state.filled_subtrees.len() != state.height {
            return Err(TreeError::InvalidState(format!(
                "expected {} filled subtrees, got {}",
                state.height,
                state.filled_subtrees.len()
            )));
        }
        if state.roots.is_empty()
            || state.roots.len() > state.root_history_size
            || state.current_root_index >= state.roots.len()
        {
            return Err(TreeError::InvalidState("root history out of range".into()));
        }
        if state.leaves.len() as u64 > tree.capacity() {
            return Err(TreeError::TreeFull { capacity: tree.capacity() });
        }

        tree.leaves = state.leaves;
        tree.filled_subtrees = state.filled_subtrees;
        tree.roots = state.roots;
        tree.current_root_index = state.current_root_index;
        Ok(tree)
    }
}

/// serializable snapshot of a tree
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeState {
    pub height: usize,
    pub root_history_size: usize,
    pub leaves: Vec<Hash>,
    pub filled_subtrees: Vec<Hash>,
    pub roots: Vec<Hash>,
    pub current_root_index: usize,
}

/// short hex form for logs
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}
