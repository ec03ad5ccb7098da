//! Append-only Merkle tree with lazy hashing

use crate::{
    error::AccumulatorError,
    hash::Hash,
    hasher::Keccak256Hasher,
    proof::{Direction, Path, PathStep},
};

/// Pending leaves are folded into the shape once this many are queued
pub const PENDING_BATCH: usize = 256;

/// Arena slot. Children are indices into `Tree::nodes`.
#[derive(Clone, Debug)]
struct Node {
    /// Valid only while `dirty` is false
    hash: Hash,
    dirty: bool,
    swap: bool,
    /// Nodes in this subtree, including self
    size: u64,
    /// 1 for a leaf
    height: u32,
    children: Option<(usize, usize)>,
}

impl Node {
    const fn leaf(hash: Hash) -> Self {
        Self {
            hash,
            dirty: false,
            swap: false,
            size: 1,
            height: 1,
            children: None,
        }
    }

    /// Perfect binary subtree: `size == 2^height - 1`
    fn is_full(&self) -> bool {
        u128::from(self.size) == (1u128 << self.height) - 1
    }
}

/// Incremental binary Merkle tree over [`Hash`] leaves.
///
/// Leaves are appended to a pending batch and folded into the canonical
/// left-balanced shape on demand: for `n` leaves the left subtree holds the
/// largest power of two strictly below `n`. The shape depends only on the
/// number and order of leaves, never on their values. Parents are hashed
/// with the sorted-pair rule of [`Keccak256Hasher::hash_pair`].
///
/// Insertion and hashing use explicit worklists so deep trees never recurse.
#[derive(Clone, Debug, Default)]
pub struct Tree {
    nodes: Vec<Node>,
    root: Option<usize>,
    /// Arena index of every folded leaf, in insertion order
    leaves: Vec<usize>,
    pending: Vec<Hash>,
    /// Leaves whose hashes were absorbed into an ancestor and dropped
    num_flushed: u64,
}

impl Tree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree holding `leaves` in order
    pub fn with_leaves<I: IntoIterator<Item = Hash>>(leaves: I) -> Self {
        let mut tree = Self::new();
        tree.extend(leaves);
        tree
    }

    /// Queue a leaf. Never fails.
    pub fn insert(&mut self, leaf: Hash) {
        self.pending.push(leaf);
        if self.pending.len() >= PENDING_BATCH {
            self.fold(false);
        }
    }

    /// Queue several leaves in order
    pub fn extend<I: IntoIterator<Item = Hash>>(&mut self, leaves: I) {
        for leaf in leaves {
            self.insert(leaf);
        }
    }

    /// Fold pending leaves into the shape.
    ///
    /// With `complete == false` only the structure is updated and stale
    /// hashes stay dirty; `complete == true` also rehashes them.
    pub fn fold(&mut self, complete: bool) {
        let pending = std::mem::take(&mut self.pending);
        for leaf in pending {
            self.attach(leaf);
        }
        if complete {
            self.rehash();
        }
    }

    /// Root hash after folding and rehashing everything pending
    pub fn root(&mut self) -> Result<Hash, AccumulatorError> {
        self.fold(true);
        self.root.map(|idx| self.nodes[idx].hash).ok_or(AccumulatorError::EmptyTree)
    }

    /// Inclusion path for the leaf at `index`
    pub fn path(&mut self, index: u64) -> Result<Path, AccumulatorError> {
        self.check_index(index)?;
        self.fold(true);

        let mut current = self.root.ok_or(AccumulatorError::EmptyTree)?;
        let mut local = index;
        let mut steps = Vec::with_capacity(self.nodes[current].height as usize - 1);

        while let Some((left, right)) = self.nodes[current].children {
            let swap = self.nodes[current].swap;
            let left_leaves = self.nodes[left].size.div_ceil(2);
            if local < left_leaves {
                steps.push(PathStep {
                    sibling: self.nodes[right].hash,
                    direction: Direction::Left,
                    swap,
                });
                current = left;
            } else {
                local -= left_leaves;
                steps.push(PathStep {
                    sibling: self.nodes[left].hash,
                    direction: Direction::Right,
                    swap,
                });
                current = right;
            }
        }
        steps.reverse();

        Ok(Path {
            leaf: self.nodes[current].hash,
            leaf_index: index,
            max_index: self.max_index(),
            steps,
        })
    }

    /// Leaf hash at `index`, folded or still pending
    pub fn leaf(&self, index: u64) -> Result<Hash, AccumulatorError> {
        self.check_index(index)?;
        let local = (index - self.num_flushed) as usize;
        match self.leaves.get(local) {
            Some(&idx) => Ok(self.nodes[idx].hash),
            None => Ok(self.pending[local - self.leaves.len()]),
        }
    }

    /// Total leaves, including pending and flushed ones
    pub fn num_leaves(&self) -> u64 {
        self.num_flushed + self.leaves.len() as u64 + self.pending.len() as u64
    }

    /// Smallest addressable leaf index
    pub const fn min_index(&self) -> u64 {
        self.num_flushed
    }

    /// Largest addressable leaf index, 0 when empty
    pub fn max_index(&self) -> u64 {
        self.num_leaves().saturating_sub(1)
    }

    /// `true` if no leaf was ever inserted
    pub fn is_empty(&self) -> bool {
        self.num_leaves() == 0
    }

    /// Leaves queued but not yet folded into the shape
    pub fn len_pending(&self) -> usize {
        self.pending.len()
    }

    /// Height of the folded shape (1 for a single leaf, 0 when nothing is folded)
    pub fn height(&self) -> u32 {
        self.root.map_or(0, |idx| self.nodes[idx].height)
    }

    fn check_index(&self, index: u64) -> Result<(), AccumulatorError> {
        if self.is_empty() || index < self.min_index() || index > self.max_index() {
            return Err(AccumulatorError::IndexOutOfRange {
                index,
                min: self.min_index(),
                max: self.max_index(),
            });
        }
        Ok(())
    }

    fn push_node(&mut self, node: Node) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Place one leaf into the shape.
    ///
    /// Walks down from the root through non-full nodes; the first full
    /// subtree met becomes the left child of a new parent whose right child
    /// is the leaf. Ancestors are then resized bottom-up and marked dirty.
    fn attach(&mut self, hash: Hash) {
        let leaf = self.push_node(Node::leaf(hash));
        self.leaves.push(leaf);

        let Some(mut current) = self.root else {
            self.root = Some(leaf);
            return;
        };

        let mut ancestors = Vec::new();
        while let Some((left, right)) = self.nodes[current].children {
            if self.nodes[current].is_full() {
                break;
            }
            ancestors.push(current);
            current = if self.nodes[left].is_full() {
                right
            } else {
                left
            };
        }

        let (size, height) = (self.nodes[current].size + 2, self.nodes[current].height + 1);
        let parent = self.push_node(Node {
            hash: Hash::ZERO,
            dirty: true,
            swap: false,
            size,
            height,
            children: Some((current, leaf)),
        });

        match ancestors.last() {
            Some(&above) => {
                if let Some((left, right)) = self.nodes[above].children.as_mut() {
                    if *left == current {
                        *left = parent;
                    } else {
                        *right = parent;
                    }
                }
            }
            None => self.root = Some(parent),
        }

        for &idx in ancestors.iter().rev() {
            if let Some((left, right)) = self.nodes[idx].children {
                let size = self.nodes[left].size + self.nodes[right].size + 1;
                let height = self.nodes[left].height.max(self.nodes[right].height) + 1;
                let node = &mut self.nodes[idx];
                node.size = size;
                node.height = height;
                node.dirty = true;
            }
        }
    }

    /// Recompute every dirty hash, children before parents
    fn rehash(&mut self) {
        let Some(root) = self.root else {
            return;
        };
        if !self.nodes[root].dirty {
            return;
        }

        let mut stack = vec![(root, false)];
        while let Some((idx, expanded)) = stack.pop() {
            let Some((left, right)) = self.nodes[idx].children else {
                continue;
            };
            if expanded {
                let pair =
                    Keccak256Hasher::hash_pair(&self.nodes[left].hash, &self.nodes[right].hash);
                let node = &mut self.nodes[idx];
                node.hash = pair.out;
                node.swap = pair.swap;
                node.dirty = false;
            } else {
                stack.push((idx, true));
                for child in [right, left] {
                    if self.nodes[child].dirty {
                        stack.push((child, false));
                    }
                }
            }
        }
    }
}

impl FromIterator<Hash> for Tree {
    fn from_iter<I: IntoIterator<Item = Hash>>(iter: I) -> Self {
        Self::with_leaves(iter)
    }
}
