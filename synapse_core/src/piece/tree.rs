//! Binary Merkle tree over [`Node`]s, zero-padded to a power of two.

use super::{MAX_HEIGHT, Node};

/// Pending left siblings, one slot per tree level.
///
/// Slot `k` holds the root of a complete subtree of `2^k` leaves that is
/// still waiting for its right sibling. Pushing leaves works like
/// incrementing a binary counter, so the stack never holds more than one
/// node per level.
#[derive(Clone, Copy, Debug)]
pub struct PendingStack {
    slots: [Option<Node>; MAX_HEIGHT as usize + 1],
    leaves: u64,
}

impl Default for PendingStack {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingStack {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_HEIGHT as usize + 1],
            leaves: 0,
        }
    }

    /// Number of leaves pushed so far.
    pub fn leaves(&self) -> u64 {
        self.leaves
    }

    /// Appends a leaf, merging complete subtrees upwards.
    ///
    /// Returns `false` (leaving the stack untouched) if the tree would grow
    /// beyond `2^MAX_HEIGHT` leaves.
    pub fn push(&mut self, leaf: Node) -> bool {
        if self.leaves >= 1u64 << MAX_HEIGHT {
            return false;
        }
        let mut node = leaf;
        let mut level = 0usize;
        while let Some(left) = self.slots[level].take() {
            node = Node::parent(&left, &node);
            level += 1;
        }
        self.slots[level] = Some(node);
        self.leaves += 1;
        true
    }

    /// Folds the pending nodes into the root of a tree of height `height`,
    /// treating every leaf that was never pushed as zero.
    ///
    /// Returns `None` if more than `2^height` leaves were pushed.
    pub fn root(&self, height: u8) -> Option<Node> {
        if height > MAX_HEIGHT || self.leaves > 1u64 << height {
            return None;
        }

        // `acc` is the root of everything to the right of the pending nodes
        // seen so far, at the current level.
        let mut acc: Option<Node> = None;
        for level in 0..height {
            acc = match (self.slots[level as usize], acc) {
                (Some(left), Some(right)) => Some(Node::parent(&left, &right)),
                (Some(left), None) => Some(Node::parent(&left, &Node::zero(level))),
                (None, Some(left)) => Some(Node::parent(&left, &Node::zero(level))),
                (None, None) => None,
            };
        }

        match (acc, self.slots[height as usize]) {
            (Some(root), None) | (None, Some(root)) => Some(root),
            (None, None) => Some(Node::zero(height)),
            (Some(_), Some(_)) => None,
        }
    }
}

/// Smallest tree height whose leaf count covers `leaves`.
pub fn height_for_leaves(leaves: u64) -> u8 {
    leaves.max(1).next_power_of_two().trailing_zeros() as u8
}

/// Root and height of the tree over `leaves`, zero-padded to a power of two.
///
/// A single leaf is its own root at height zero. Returns `None` for an empty
/// slice or a tree taller than `MAX_HEIGHT`.
pub fn root_of_leaves(leaves: &[Node]) -> Option<(Node, u8)> {
    match leaves {
        [] => None,
        [leaf] => Some((*leaf, 0)),
        _ => {
            let height = height_for_leaves(leaves.len() as u64);
            if height > MAX_HEIGHT {
                return None;
            }
            let mut layer: Vec<Node> = leaves.to_vec();
            for level in 0..height {
                layer = layer
                    .chunks(2)
                    .map(|pair| match pair {
                        [left, right] => Node::parent(left, right),
                        [left] => Node::parent(left, &Node::zero(level)),
                        _ => unreachable!("chunks(2) yields one or two nodes"),
                    })
                    .collect();
            }
            Some((layer[0], height))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(i: u8) -> Node {
        let mut bytes = [i; 32];
        bytes[31] &= 0x3f;
        Node::from_bytes(bytes)
    }

    #[test]
    fn test_single_leaf_short_circuits() {
        assert_eq!(root_of_leaves(&[leaf(7)]), Some((leaf(7), 0)));
        assert_eq!(root_of_leaves(&[]), None);
    }

    #[test]
    fn test_two_leaves() {
        let (root, height) = root_of_leaves(&[leaf(1), leaf(2)]).unwrap();
        assert_eq!(height, 1);
        assert_eq!(root, Node::parent(&leaf(1), &leaf(2)));
    }

    #[test]
    fn test_odd_leaves_padded_with_zero() {
        let (root, height) = root_of_leaves(&[leaf(1), leaf(2), leaf(3)]).unwrap();
        assert_eq!(height, 2);
        let expected = Node::parent(
            &Node::parent(&leaf(1), &leaf(2)),
            &Node::parent(&leaf(3), &Node::ZERO),
        );
        assert_eq!(root, expected);
    }

    #[test]
    fn test_pending_stack_matches_layered_build() {
        for count in 1..=40u8 {
            let leaves: Vec<Node> = (0..count).map(leaf).collect();
            let mut stack = PendingStack::new();
            for node in &leaves {
                assert!(stack.push(*node));
            }
            let (expected, height) = root_of_leaves(&leaves).unwrap();
            assert_eq!(stack.root(height), Some(expected), "leaf count {count}");
        }
    }

    #[test]
    fn test_pending_stack_taller_target() {
        // four leaves inside a tree of height 4 are padded with 12 zero leaves
        let leaves: Vec<Node> = (1..=4).map(leaf).collect();
        let mut stack = PendingStack::new();
        for node in &leaves {
            stack.push(*node);
        }
        let mut padded = leaves.clone();
        padded.resize(16, Node::ZERO);
        let (expected, height) = root_of_leaves(&padded).unwrap();
        assert_eq!(height, 4);
        assert_eq!(stack.root(4), Some(expected));
    }

    #[test]
    fn test_pending_stack_rejects_short_target() {
        let mut stack = PendingStack::new();
        for i in 0..5 {
            stack.push(leaf(i));
        }
        assert_eq!(stack.root(2), None);
    }

    #[test]
    fn test_height_for_leaves() {
        assert_eq!(height_for_leaves(1), 0);
        assert_eq!(height_for_leaves(2), 1);
        assert_eq!(height_for_leaves(3), 2);
        assert_eq!(height_for_leaves(4), 2);
        assert_eq!(height_for_leaves(5), 3);
    }
}
