//! Binary hash tree over an ordered batch of items.
//!
//! Nodes live in a single arena. Leaves occupy the first `n` slots in input
//! order and every level above them is appended as a contiguous run, so a
//! level is just a range of arena indices. When a level has an odd number of
//! nodes the last one is paired with itself: its parent points at the same
//! arena slot twice, and that slot's digest is what shows up as the sibling
//! in an inclusion proof.

use crate::codec::canonical_bytes;
use crate::hash::{hash, hash_concat, Hash};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Digest of a single item: `H(canonical_encode(item))`.
pub fn leaf_hash<T: Serialize + ?Sized>(item: &T) -> Hash {
    hash(&canonical_bytes(item))
}

/// Digest of an internal node, left before right.
fn node_hash(left: &Hash, right: &Hash) -> Hash {
    hash_concat(&[left.as_ref(), right.as_ref()])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    /// Owns the item at the same position of the input batch.
    Leaf,
    /// Arena indices of the two children. Equal for a self-paired node.
    Internal { left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct HashNode {
    digest: Hash,
    kind: NodeKind,
}

/// An authenticated summary of an ordered batch of items.
#[derive(Debug, Clone)]
pub struct HashTree<T> {
    items: Vec<T>,
    nodes: Vec<HashNode>,
    /// Arena ranges per level, leaves first. Empty for an empty tree.
    levels: Vec<Range<usize>>,
}

impl<T: Serialize> HashTree<T> {
    /// Build a tree over `items`, preserving their order.
    ///
    /// An empty batch yields a tree with no root.
    pub fn build(items: Vec<T>) -> Self {
        let mut nodes: Vec<HashNode> = Vec::with_capacity(items.len() * 2);
        for item in &items {
            nodes.push(HashNode {
                digest: leaf_hash(item),
                kind: NodeKind::Leaf,
            });
        }

        if nodes.is_empty() {
            return Self {
                items,
                nodes,
                levels: Vec::new(),
            };
        }

        let mut levels = vec![0..nodes.len()];
        let mut current = 0..nodes.len();

        while current.len() > 1 {
            let start = nodes.len();
            for left in current.clone().step_by(2) {
                // Odd count: the last node becomes its own sibling.
                let right = if left + 1 < current.end { left + 1 } else { left };
                let digest = node_hash(&nodes[left].digest, &nodes[right].digest);
                nodes.push(HashNode {
                    digest,
                    kind: NodeKind::Internal { left, right },
                });
            }
            current = start..nodes.len();
            levels.push(current.clone());
        }

        Self {
            items,
            nodes,
            levels,
        }
    }

    /// Verify that `item` sits at `index` under this tree's root.
    ///
    /// Returns false, never panics, for an empty tree, an out-of-range index,
    /// a different item or any altered proof entry.
    pub fn verify(&self, item: &T, proof: &[Hash], index: usize) -> bool {
        let Some(stored) = self.leaf_digest(index) else {
            return false;
        };
        let digest = leaf_hash(item);
        if digest != stored {
            return false;
        }
        verify_proof(&self.root_hash(), digest, proof, index)
    }
}

impl<T> HashTree<T> {
    /// Root digest, or [`Hash::ZERO`] for an empty tree.
    pub fn root_hash(&self) -> Hash {
        self.root().map(|node| node.digest).unwrap_or(Hash::ZERO)
    }

    fn root(&self) -> Option<&HashNode> {
        let top = self.levels.last()?;
        self.nodes.get(top.start)
    }

    /// Inclusion proof for the leaf at `index`: sibling digests from the leaf
    /// level up to (not including) the root.
    ///
    /// Empty for an empty tree or an out-of-range index.
    pub fn proof(&self, index: usize) -> Vec<Hash> {
        if index >= self.items.len() {
            return Vec::new();
        }

        let mut proof = Vec::with_capacity(self.height());
        let mut position = index;

        for pair in self.levels.windows(2) {
            let parent = &self.nodes[pair[1].start + position / 2];
            let NodeKind::Internal { left, right } = parent.kind else {
                unreachable!("levels above the leaves only hold internal nodes");
            };
            let sibling = if position % 2 == 0 { right } else { left };
            proof.push(self.nodes[sibling].digest);
            position /= 2;
        }

        proof
    }

    /// Digest of the leaf at `index`.
    pub fn leaf_digest(&self, index: usize) -> Option<Hash> {
        if index >= self.items.len() {
            return None;
        }
        Some(self.nodes[index].digest)
    }

    /// Number of edges between a leaf and the root: ⌈log2(n)⌉, 0 when empty.
    pub fn height(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The items in input order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// The item at `index`.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Consume the tree, returning its items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Whether the node at `position` of `level` is paired with itself.
    ///
    /// Only the last node of an odd-sized level is.
    pub fn is_self_paired(&self, level: usize, position: usize) -> bool {
        let (Some(range), Some(parents)) = (self.levels.get(level), self.levels.get(level + 1))
        else {
            return false;
        };
        if position >= range.len() {
            return false;
        }
        match self.nodes[parents.start + position / 2].kind {
            NodeKind::Internal { left, right } => left == right,
            NodeKind::Leaf => false,
        }
    }
}

/// Fold a leaf digest with an inclusion proof and compare against `root`.
///
/// At each step the parity of the current index picks the concatenation
/// order: even folds as `H(current ++ entry)`, odd as `H(entry ++ current)`.
/// The index is halved after every fold.
pub fn verify_proof(root: &Hash, leaf: Hash, proof: &[Hash], index: usize) -> bool {
    let mut current = leaf;
    let mut index = index;

    for entry in proof {
        current = if index % 2 == 0 {
            node_hash(&current, entry)
        } else {
            node_hash(entry, &current)
        };
        index /= 2;
    }

    current == *root
}

impl<T: PartialEq> PartialEq for HashTree<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Eq> Eq for HashTree<T> {}

impl<T: Serialize> Default for HashTree<T> {
    fn default() -> Self {
        Self::build(Vec::new())
    }
}

// On the wire a tree is just its ordered items; the arena is rebuilt on decode.
impl<T: Serialize> Serialize for HashTree<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.items.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for HashTree<T>
where
    T: Serialize + Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let items = Vec::<T>::deserialize(deserializer)?;
        Ok(Self::build(items))
    }
}
