//! Piece CIDs.
//!
//! The default encoding is PieceCID v2 (FRC-0069): a CIDv1 with the `raw`
//! codec whose `fr32-sha256-trunc254-padbintree` multihash digest carries
//! the padding, the tree height and the root. The legacy v1 encoding
//! (CommP: `fil-commitment-unsealed` + `sha2-256-trunc254-padded`) carries
//! only the root; it can be parsed, and produced with
//! [`PieceCid::to_legacy`], but is never emitted by default.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::size::{max_raw_size, raw_size};
use super::{MAX_HEIGHT, MIN_HEIGHT, Node, varint};

const CID_VERSION: u64 = 1;
const CODEC_RAW: u64 = 0x55;
const CODEC_FIL_COMMITMENT_UNSEALED: u64 = 0xf101;
const MULTIHASH_FR32_SHA256_TRUNC254_PADBINTREE: u64 = 0x1011;
const MULTIHASH_SHA2_256_TRUNC254_PADDED: u64 = 0x1012;

#[derive(thiserror::Error, Debug)]
pub enum PieceCidError {
    #[error("invalid multibase string: {0}")]
    Multibase(#[from] multibase::Error),
    #[error("invalid or truncated varint")]
    InvalidVarint,
    #[error("unsupported CID version: {0}")]
    UnsupportedVersion(u64),
    #[error("invalid codec: expected {0:#x}, got {1:#x}")]
    InvalidCodec(u64, u64),
    #[error("invalid multihash type: expected {0:#x}, got {1:#x}")]
    InvalidMultihashType(u64, u64),
    #[error("invalid digest length: expected {0}, got {1}")]
    InvalidDigestLength(usize, usize),
    #[error("trailing bytes after CID: {0}")]
    TrailingBytes(usize),
    #[error(
        "invalid tree height {0}: must be between {min} and {max}",
        min = MIN_HEIGHT,
        max = MAX_HEIGHT
    )]
    InvalidHeight(u8),
    #[error("padding of {padding} bytes leaves no payload in a {padded_size} byte piece")]
    InvalidPadding { padding: u64, padded_size: u64 },
    #[error("raw size {raw_size} does not fit a piece")]
    InvalidRawSize { raw_size: u64 },
}

/// Identifier for a piece: the CommP root plus the shape of the tree it was
/// built over.
///
/// Displayed as base32 multibase, which is also what providers and the CDN
/// expect in URLs.
///
/// ```
/// use synapse_core::piece::{PieceCid, calculate};
///
/// let piece = calculate(b"Hello, Filecoin Synapse!").unwrap();
/// assert_eq!(piece.raw_size(), 24);
/// let text = piece.to_string();
/// assert_eq!(text.parse::<PieceCid>().unwrap(), piece);
/// ```
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PieceCid {
    root: Node,
    height: u8,
    padding: u64,
}

impl fmt::Debug for PieceCid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PieceCid")
            .field("root", &self.root)
            .field("height", &self.height)
            .field("padding", &self.padding)
            .finish()
    }
}

impl PieceCid {
    /// Assembles a piece CID from its parts, checking that the height is in
    /// range and that the padding leaves at least one payload byte.
    pub fn new(root: Node, height: u8, padding: u64) -> Result<Self, PieceCidError> {
        if !(MIN_HEIGHT..=MAX_HEIGHT).contains(&height) {
            return Err(PieceCidError::InvalidHeight(height));
        }
        let padded_size = (Node::SIZE as u64) << height;
        if padding >= max_raw_size(padded_size) {
            return Err(PieceCidError::InvalidPadding {
                padding,
                padded_size,
            });
        }
        Ok(Self {
            root,
            height,
            padding,
        })
    }

    /// Upgrades a legacy CommP to v2. The tree shape is derived from the
    /// raw payload size, which legacy identifiers do not carry.
    pub fn from_legacy(legacy: LegacyPieceCid, raw_size: u64) -> Result<Self, PieceCidError> {
        if raw_size == 0 {
            return Err(PieceCidError::InvalidRawSize { raw_size });
        }
        let padded_size = super::size::padded_size_for(raw_size)
            .ok_or(PieceCidError::InvalidRawSize { raw_size })?;
        let height = super::size::height_for_padded_size(padded_size);
        Self::new(legacy.root, height, max_raw_size(padded_size) - raw_size)
    }

    /// The truncated Merkle root.
    pub fn root(&self) -> Node {
        self.root
    }

    /// Height of the tree; the tree has `2^height` leaves.
    pub fn height(&self) -> u8 {
        self.height
    }

    /// Zero bytes appended to the payload before FR32 padding.
    pub fn padding(&self) -> u64 {
        self.padding
    }

    /// Size in bytes of the padded tree.
    pub fn padded_size(&self) -> u64 {
        (Node::SIZE as u64) << self.height
    }

    /// Size in bytes of the original payload.
    pub fn raw_size(&self) -> u64 {
        raw_size(self)
    }

    /// The v1 identifier for the same root.
    pub fn to_legacy(&self) -> LegacyPieceCid {
        LegacyPieceCid { root: self.root }
    }

    pub fn parse(str: &str) -> Result<Self, PieceCidError> {
        let (_, bytes) = multibase::decode(str)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PieceCidError> {
        let digest = decode_cid(
            bytes,
            CODEC_RAW,
            MULTIHASH_FR32_SHA256_TRUNC254_PADBINTREE,
        )?;

        let (padding, rest) = varint::decode(digest)?;
        let expected_len = digest.len() - rest.len() + 1 + Node::SIZE;
        let [height, root @ ..] = rest else {
            return Err(PieceCidError::InvalidDigestLength(
                expected_len,
                digest.len(),
            ));
        };
        let root: [u8; 32] = root
            .try_into()
            .map_err(|_| PieceCidError::InvalidDigestLength(expected_len, digest.len()))?;

        Self::new(Node::from_bytes(root), *height, padding)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut digest = Vec::with_capacity(Node::SIZE + 10);
        varint::encode(self.padding, &mut digest);
        digest.push(self.height);
        digest.extend_from_slice(self.root.as_bytes());

        encode_cid(
            CODEC_RAW,
            MULTIHASH_FR32_SHA256_TRUNC254_PADBINTREE,
            &digest,
        )
    }

    pub fn to_base32(&self) -> String {
        multibase::encode(multibase::Base::Base32Lower, self.to_bytes())
    }
}

impl fmt::Display for PieceCid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base32())
    }
}

impl FromStr for PieceCid {
    type Err = PieceCidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PieceCid::parse(s)
    }
}

impl Serialize for PieceCid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PieceCid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        PieceCid::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Legacy (v1) piece commitment: the root alone.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct LegacyPieceCid {
    root: Node,
}

impl LegacyPieceCid {
    pub fn root(&self) -> Node {
        self.root
    }

    pub fn parse(str: &str) -> Result<Self, PieceCidError> {
        let (_, bytes) = multibase::decode(str)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PieceCidError> {
        let digest = decode_cid(
            bytes,
            CODEC_FIL_COMMITMENT_UNSEALED,
            MULTIHASH_SHA2_256_TRUNC254_PADDED,
        )?;
        let root: [u8; 32] = digest
            .try_into()
            .map_err(|_| PieceCidError::InvalidDigestLength(Node::SIZE, digest.len()))?;
        Ok(Self {
            root: Node::from_bytes(root),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        encode_cid(
            CODEC_FIL_COMMITMENT_UNSEALED,
            MULTIHASH_SHA2_256_TRUNC254_PADDED,
            self.root.as_bytes(),
        )
    }

    pub fn to_base32(&self) -> String {
        multibase::encode(multibase::Base::Base32Lower, self.to_bytes())
    }
}

impl fmt::Display for LegacyPieceCid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base32())
    }
}

impl FromStr for LegacyPieceCid {
    type Err = PieceCidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LegacyPieceCid::parse(s)
    }
}

/// Either encoding, for inputs that may carry a v1 or a v2 identifier
/// (provider responses, user input).
#[derive(Clone, Copy, Hash, PartialEq, Eq, Debug)]
pub enum PieceLink {
    V2(PieceCid),
    Legacy(LegacyPieceCid),
}

impl PieceLink {
    pub fn root(&self) -> Node {
        match self {
            PieceLink::V2(piece) => piece.root(),
            PieceLink::Legacy(legacy) => legacy.root(),
        }
    }

    /// Whether this identifies the same content as `piece`. A legacy link
    /// can only be compared by root.
    pub fn matches(&self, piece: &PieceCid) -> bool {
        match self {
            PieceLink::V2(other) => other == piece,
            PieceLink::Legacy(legacy) => legacy.root() == piece.root(),
        }
    }

    pub fn parse(str: &str) -> Result<Self, PieceCidError> {
        let (_, bytes) = multibase::decode(str)?;
        match PieceCid::from_bytes(&bytes) {
            Ok(piece) => Ok(PieceLink::V2(piece)),
            Err(PieceCidError::InvalidCodec(..)) => {
                LegacyPieceCid::from_bytes(&bytes).map(PieceLink::Legacy)
            }
            Err(err) => Err(err),
        }
    }
}

impl fmt::Display for PieceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PieceLink::V2(piece) => fmt::Display::fmt(piece, f),
            PieceLink::Legacy(legacy) => fmt::Display::fmt(legacy, f),
        }
    }
}

impl FromStr for PieceLink {
    type Err = PieceCidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PieceLink::parse(s)
    }
}

fn encode_cid(codec: u64, multihash: u64, digest: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(digest.len() + 8);
    varint::encode(CID_VERSION, &mut out);
    varint::encode(codec, &mut out);
    varint::encode(multihash, &mut out);
    varint::encode(digest.len() as u64, &mut out);
    out.extend_from_slice(digest);
    out
}

/// Checks the CID header and returns the multihash digest.
fn decode_cid(bytes: &[u8], codec: u64, multihash: u64) -> Result<&[u8], PieceCidError> {
    let (version, rest) = varint::decode(bytes)?;
    if version != CID_VERSION {
        return Err(PieceCidError::UnsupportedVersion(version));
    }
    let (actual_codec, rest) = varint::decode(rest)?;
    if actual_codec != codec {
        return Err(PieceCidError::InvalidCodec(codec, actual_codec));
    }
    let (actual_multihash, rest) = varint::decode(rest)?;
    if actual_multihash != multihash {
        return Err(PieceCidError::InvalidMultihashType(
            multihash,
            actual_multihash,
        ));
    }
    let (len, rest) = varint::decode(rest)?;
    let len = usize::try_from(len).map_err(|_| PieceCidError::InvalidVarint)?;
    if rest.len() < len {
        return Err(PieceCidError::InvalidDigestLength(len, rest.len()));
    }
    if rest.len() > len {
        return Err(PieceCidError::TrailingBytes(rest.len() - len));
    }
    Ok(rest)
}
