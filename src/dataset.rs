//! Registered datasets and the per-dataset hash state.
//!
//! A dataset is one protected memory region: a host-chosen id and the
//! bytes to checkpoint. The engine attaches the block-hash array of the
//! last checkpointed contents; the encoder compares against it to decide
//! which blocks a diff layer must carry.

use crate::config::DcpConfig;

/// Highest admissible dataset id (ids are written as a 32-bit field whose
/// sign bit is never used).
pub const MAX_VAR_ID: u32 = 0x7FFF_FFFF;

/// Highest admissible block index; the diff-block header stores the index
/// in 16 bits.
pub const MAX_BLOCK_IDX: u64 = u16::MAX as u64;

/// Largest admissible block count per dataset: 2^16 blocks cover the
/// indices 0..=[`MAX_BLOCK_IDX`]. A dataset needing more blocks than this
/// cannot be addressed by the diff encoding and is refused on write.
pub const MAX_BLOCK_COUNT: u64 = 1 << 16;

/// One protected memory region.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: u32,
    /// The protected bytes. The host mutates these between checkpoint
    /// passes; `recover_all`/`recover_var` write the restored image here.
    pub data: Vec<u8>,
    /// Byte length the hash array below describes (the dataset's size at
    /// the last checkpoint; 0 when no baseline exists).
    pub(crate) hash_data_size: u64,
    /// Concatenated wide block hashes of the last checkpointed contents,
    /// `block_count(hash_data_size) * wide_len` bytes.
    pub(crate) hash_array: Vec<u8>,
}

impl Dataset {
    pub fn new(id: u32, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            hash_data_size: 0,
            hash_array: Vec::new(),
        }
    }

    /// Current size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Forget the hash baseline so that every block appears changed.
    pub(crate) fn reset_hash_state(&mut self) {
        self.hash_array.clear();
        self.hash_data_size = 0;
    }

    /// Recompute the hash array from the current in-memory contents, with
    /// the same zero-padding rule as the encoder, so the next write pass
    /// diffs against what was just recovered.
    pub(crate) fn rebuild_hash_array(&mut self, cfg: &DcpConfig) {
        let block = cfg.block_size as usize;
        let wide = cfg.digest.wide_len();
        let nb_blocks = cfg.block_count(self.size()) as usize;

        self.hash_array = vec![0u8; nb_blocks * wide];
        self.hash_data_size = self.size();

        let mut scratch = vec![0u8; block];
        for b in 0..nb_blocks {
            let start = b * block;
            let end = (start + block).min(self.data.len());
            let out = &mut self.hash_array[b * wide..(b + 1) * wide];
            if end - start == block {
                cfg.digest.hash_into(&self.data[start..end], out);
            } else {
                scratch.fill(0);
                scratch[..end - start].copy_from_slice(&self.data[start..end]);
                cfg.digest.hash_into(&scratch, out);
            }
        }
    }
}

/// Resolve a variable id to its position in the registration list.
/// Linear scan; dataset counts are small.
pub fn index_of(datasets: &[Dataset], var_id: u32) -> Option<usize> {
    datasets.iter().position(|d| d.id == var_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestKind;

    #[test]
    fn index_of_finds_by_id_not_position() {
        let sets = vec![Dataset::new(7, vec![0; 4]), Dataset::new(3, vec![0; 4])];
        assert_eq!(index_of(&sets, 3), Some(1));
        assert_eq!(index_of(&sets, 7), Some(0));
        assert_eq!(index_of(&sets, 8), None);
    }

    #[test]
    fn rebuild_pads_the_tail_block() {
        let cfg = DcpConfig::new(8, 4, DigestKind::Md5);
        let mut ds = Dataset::new(1, (0u8..20).collect());
        ds.rebuild_hash_array(&cfg);

        assert_eq!(ds.hash_data_size, 20);
        assert_eq!(ds.hash_array.len(), 3 * 16);

        // The tail hash must equal the hash of the padded 8-byte block.
        let mut padded = vec![0u8; 8];
        padded[..4].copy_from_slice(&[16, 17, 18, 19]);
        assert_eq!(&ds.hash_array[32..48], cfg.digest.hash(&padded).as_slice());
    }
}
