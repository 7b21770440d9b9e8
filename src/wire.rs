//! On-disk records of the layered checkpoint format.
//!
//! # File layout (all fields little-endian)
//!
//! ```text
//! File         := Preamble Layer0 Layer1 ... LayerK        (K < stackSize)
//!
//! Preamble     := u64 blockSize
//!                 u32 stackSize
//!
//! Layer0       := i32 ckptID
//!                 u32 nbVar
//!                 (VarHeader byte[ceil(dataSize/B)*B]){nbVar}
//!                                        -- last block zero-padded to B
//! VarHeader    := u32 varId
//!                 u64 dataSize
//!
//! LayerK>0     := i32 ckptID
//!                 u32 nbVar
//!                 (DiffBlockMeta byte[B])*                 -- one changed block each
//! DiffBlockMeta:= u32 varId
//!                 u16 blockId                              -- exactly 6 bytes, no padding
//! ```
//!
//! # Endianness
//! Every numeric field is little-endian with a fixed width; nothing depends
//! on host layout. The 6-byte `DiffBlockMeta` is assembled by hand — it must
//! never be written through a struct image.
//!
//! # Padding
//! The final block of a dataset is zero-padded to a full block on disk, in
//! every layer. The pad bytes are part of the stream: readers consume them,
//! and the integrity scanner hashes the full padded block.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Bytes of the file preamble: `u64` block size + `u32` stack depth.
pub const PREAMBLE_SIZE: u64 = 12;

/// Bytes of each layer header: `i32` ckptID + `u32` nbVar.
pub const LAYER_HEADER_SIZE: u64 = 8;

/// Bytes of each baseline variable header: `u32` varId + `u64` dataSize.
pub const VAR_HEADER_SIZE: u64 = 12;

/// Bytes of each diff-block header.
pub const DIFF_META_SIZE: u64 = 6;

// ── Preamble ─────────────────────────────────────────────────────────────────

/// File anchor at offset 0: the geometry every layer of the file was
/// written with. Recovery refuses a file whose geometry disagrees with the
/// process configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    pub block_size: u64,
    pub stack_size: u32,
}

impl Preamble {
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_u64::<LittleEndian>(self.block_size)?;
        w.write_u32::<LittleEndian>(self.stack_size)
    }

    pub fn read<R: Read>(mut r: R) -> io::Result<Self> {
        let block_size = r.read_u64::<LittleEndian>()?;
        let stack_size = r.read_u32::<LittleEndian>()?;
        Ok(Self {
            block_size,
            stack_size,
        })
    }
}

// ── Layer header ─────────────────────────────────────────────────────────────

/// Head of every layer: the logical checkpoint id supplied by the host and
/// the number of registered variables at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerHeader {
    pub ckpt_id: i32,
    pub nb_var: u32,
}

impl LayerHeader {
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_i32::<LittleEndian>(self.ckpt_id)?;
        w.write_u32::<LittleEndian>(self.nb_var)
    }

    pub fn read<R: Read>(mut r: R) -> io::Result<Self> {
        let ckpt_id = r.read_i32::<LittleEndian>()?;
        let nb_var = r.read_u32::<LittleEndian>()?;
        Ok(Self { ckpt_id, nb_var })
    }
}

// ── Baseline variable header ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarHeader {
    pub var_id: u32,
    pub data_size: u64,
}

impl VarHeader {
    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.var_id)?;
        w.write_u64::<LittleEndian>(self.data_size)
    }

    pub fn read<R: Read>(mut r: R) -> io::Result<Self> {
        let var_id = r.read_u32::<LittleEndian>()?;
        let data_size = r.read_u64::<LittleEndian>()?;
        Ok(Self { var_id, data_size })
    }
}

// ── Diff-block header ────────────────────────────────────────────────────────

/// Tag preceding each changed block in a diff layer. Exactly 6 bytes on
/// disk: `varId` as LE u32 followed by `blockId` as LE u16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffBlockMeta {
    pub var_id: u32,
    pub block_id: u16,
}

impl DiffBlockMeta {
    /// Pack into the 6-byte wire image.
    pub fn to_bytes(&self) -> [u8; DIFF_META_SIZE as usize] {
        let mut buf = [0u8; DIFF_META_SIZE as usize];
        buf[0..4].copy_from_slice(&self.var_id.to_le_bytes());
        buf[4..6].copy_from_slice(&self.block_id.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; DIFF_META_SIZE as usize]) -> Self {
        Self {
            var_id: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            block_id: u16::from_le_bytes([buf[4], buf[5]]),
        }
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    pub fn read<R: Read>(mut r: R) -> io::Result<Self> {
        let mut buf = [0u8; DIFF_META_SIZE as usize];
        r.read_exact(&mut buf)?;
        Ok(Self::from_bytes(&buf))
    }
}

// ── Checkpoint file names ────────────────────────────────────────────────────

/// Build the per-rank checkpoint file name: `dcp-id<FileId>-rank<Rank>.fti`,
/// decimal without zero-padding.
pub fn ckpt_file_name(file_id: u32, rank: u32) -> String {
    format!("dcp-id{file_id}-rank{rank}.fti")
}

/// Parse `dcp-id<FileId>-rank<Rank>.fti` back into `(file_id, rank)`.
pub fn parse_file_name(name: &str) -> Option<(u32, u32)> {
    let rest = name.strip_prefix("dcp-id")?.strip_suffix(".fti")?;
    let (file_id, rank) = rest.split_once("-rank")?;
    Some((file_id.parse().ok()?, rank.parse().ok()?))
}
