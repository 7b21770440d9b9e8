//! Engine configuration, immutable for the process lifetime.

use crate::digest::DigestKind;
use serde::{Deserialize, Serialize};

/// Default block size: 16 KiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 16 * 1024;
/// Default stack depth: 5 layers per file.
pub const DEFAULT_STACK_SIZE: u32 = 5;

/// Geometry and digest choice for the differential checkpoint engine.
///
/// `block_size` and `stack_size` are recorded in every file's preamble;
/// recovery refuses a file written with different values. The digest choice
/// is not recorded — it is host configuration and must match across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DcpConfig {
    /// Diff granularity in bytes. Power of two recommended, 1 KiB–1 MiB typical.
    pub block_size: u64,
    /// Layers per file before rolling over to a new file id.
    pub stack_size: u32,
    pub digest: DigestKind,
}

impl DcpConfig {
    /// Build a configuration; zero geometry values are clamped to 1.
    pub fn new(block_size: u64, stack_size: u32, digest: DigestKind) -> Self {
        Self {
            block_size: block_size.max(1),
            stack_size: stack_size.max(1),
            digest,
        }
    }

    /// Number of blocks covering `size` bytes, tail block included.
    #[inline]
    pub fn block_count(&self, size: u64) -> u64 {
        size / self.block_size + u64::from(size % self.block_size != 0)
    }
}

impl Default for DcpConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE, DEFAULT_STACK_SIZE, DigestKind::Md5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_count_rounds_up() {
        let cfg = DcpConfig::new(8, 4, DigestKind::Md5);
        assert_eq!(cfg.block_count(0), 0);
        assert_eq!(cfg.block_count(8), 1);
        assert_eq!(cfg.block_count(9), 2);
        assert_eq!(cfg.block_count(20), 3);
    }

    #[test]
    fn zero_geometry_is_clamped() {
        let cfg = DcpConfig::new(0, 0, DigestKind::Crc32);
        assert_eq!(cfg.block_size, 1);
        assert_eq!(cfg.stack_size, 1);
    }
}
