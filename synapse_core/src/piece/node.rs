//! Nodes of the piece commitment tree (SHA-256, truncated to 254 bits).

use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use std::{borrow::Borrow, fmt};

use super::MAX_HEIGHT;

/// A 32-byte node of the piece commitment tree.
///
/// Leaves come out of FR32 padding and inner nodes out of [`Node::parent`],
/// so the two most significant bits of the last byte are always clear and
/// every node is a valid BLS12-381 scalar.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Node([u8; 32]);

static ZERO_COMMITMENTS: LazyLock<[Node; MAX_HEIGHT as usize + 1]> = LazyLock::new(|| {
    let mut table = [Node::ZERO; MAX_HEIGHT as usize + 1];
    for level in 1..table.len() {
        table[level] = Node::parent(&table[level - 1], &table[level - 1]);
    }
    table
});

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Node").field(&self.to_hex()).finish()
    }
}

impl Node {
    /// The all-zero leaf.
    pub const ZERO: Node = Node([0u8; 32]);

    /// The size of a node in bytes.
    pub const SIZE: usize = 32;

    /// Create a `Node` from its raw bytes representation.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Bytes of the node.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hashes two sibling nodes into their parent.
    pub fn parent(left: &Node, right: &Node) -> Node {
        let mut hasher = Sha256::new();
        hasher.update(left.0);
        hasher.update(right.0);
        let mut out: [u8; 32] = hasher.finalize().into();
        out[31] &= 0b0011_1111;
        Node(out)
    }

    /// Root of a tree of `2^level` zero leaves.
    ///
    /// # Panics
    ///
    /// Panics if `level > MAX_HEIGHT`.
    pub fn zero(level: u8) -> Node {
        ZERO_COMMITMENTS[level as usize]
    }

    /// Convert the node to a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Hex of the first 5 bytes, for log lines.
    pub fn fmt_short(&self) -> String {
        hex::encode(&self.0[..5])
    }
}

impl AsRef<[u8]> for Node {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8; 32]> for Node {
    fn borrow(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Node {
    fn from(value: [u8; 32]) -> Self {
        Node(value)
    }
}

impl From<Node> for [u8; 32] {
    fn from(value: Node) -> Self {
        value.0
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
