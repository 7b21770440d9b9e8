//! Block digest provider.
//!
//! Two widths per algorithm:
//!   - **wide** — the full digest, stored in the in-memory per-block hash
//!     arrays and folded into the rolling layer digest.
//!   - **short** — the prefix length used for the hex comparison in the
//!     integrity scanner. `short <= wide`, and for Md5/Crc32 the two are
//!     equal.
//!
//! The layer digest is a hash of hashes: the wide hash of every block whose
//! payload lands in a layer is folded into one rolling context, in emission
//! order, and the finalized value identifies the layer.

use crc32fast::Hasher as Crc32;
use md5::{Digest as _, Md5};
use serde::{Deserialize, Serialize};

/// Digest algorithm selector. The choice is host configuration; it is not
/// recorded in the checkpoint file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestKind {
    /// MD5 — 16-byte wide digest, the original engine's default.
    Md5,
    /// CRC32 — 4-byte wide digest, cheapest change detection.
    Crc32,
    /// BLAKE3 — 32-byte wide digest, compared by its 16-byte prefix.
    Blake3,
}

impl DigestKind {
    /// Bytes of the wide digest, as kept in the per-block hash arrays.
    #[inline]
    pub fn wide_len(self) -> usize {
        match self {
            DigestKind::Md5 => 16,
            DigestKind::Crc32 => 4,
            DigestKind::Blake3 => 32,
        }
    }

    /// Bytes of the digest prefix checked during verification.
    #[inline]
    pub fn short_len(self) -> usize {
        match self {
            DigestKind::Md5 => 16,
            DigestKind::Crc32 => 4,
            DigestKind::Blake3 => 16,
        }
    }

    /// Hash one block into `out`, which must be exactly `wide_len` bytes.
    pub fn hash_into(self, data: &[u8], out: &mut [u8]) {
        debug_assert_eq!(out.len(), self.wide_len());
        match self {
            DigestKind::Md5 => out.copy_from_slice(&Md5::digest(data)),
            DigestKind::Crc32 => {
                let mut h = Crc32::new();
                h.update(data);
                out.copy_from_slice(&h.finalize().to_le_bytes());
            }
            DigestKind::Blake3 => out.copy_from_slice(blake3::hash(data).as_bytes()),
        }
    }

    /// Hash one block, allocating.
    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; self.wide_len()];
        self.hash_into(data, &mut out);
        out
    }

    /// Start a rolling layer digest.
    pub fn layer_digest(self) -> LayerDigest {
        LayerDigest(match self {
            DigestKind::Md5 => Rolling::Md5(Md5::new()),
            DigestKind::Crc32 => Rolling::Crc32(Crc32::new()),
            DigestKind::Blake3 => Rolling::Blake3(blake3::Hasher::new()),
        })
    }
}

enum Rolling {
    Md5(Md5),
    Crc32(Crc32),
    Blake3(blake3::Hasher),
}

/// Rolling digest over the wide block hashes emitted into one layer.
pub struct LayerDigest(Rolling);

impl LayerDigest {
    /// Fold one wide block hash into the layer digest.
    pub fn update(&mut self, block_hash: &[u8]) {
        match &mut self.0 {
            Rolling::Md5(h) => h.update(block_hash),
            Rolling::Crc32(h) => h.update(block_hash),
            Rolling::Blake3(h) => {
                h.update(block_hash);
            }
        }
    }

    /// Finalize and return the wide layer digest as lowercase hex.
    pub fn finalize_hex(self) -> String {
        match self.0 {
            Rolling::Md5(h) => hex::encode(h.finalize()),
            Rolling::Crc32(h) => hex::encode(h.finalize().to_le_bytes()),
            Rolling::Blake3(h) => hex::encode(h.finalize().as_bytes()),
        }
    }
}
