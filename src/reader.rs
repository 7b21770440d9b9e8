//! Layer decoder — the recover path.
//!
//! Recovery replays the file front to back: the baseline layer restores a
//! full image of every dataset, then each verified diff layer patches the
//! blocks it carries. Diff layers have no length field on disk; the replay
//! is bounded by the per-layer sizes in [`DcpState`], which the integrity
//! scanner (or the write path itself, in-process) has established.
//!
//! The preamble check is strict here: a file written with a different
//! block size or stack depth cannot be replayed and is refused before any
//! dataset byte is touched.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::config::DcpConfig;
use crate::dataset::{index_of, Dataset, MAX_BLOCK_COUNT};
use crate::error::DcpError;
use crate::state::DcpState;
use crate::wire::{
    ckpt_file_name, DiffBlockMeta, LayerHeader, Preamble, VarHeader, DIFF_META_SIZE,
    LAYER_HEADER_SIZE,
};

/// Restore every registered dataset to the state of the newest recoverable
/// checkpoint, then rebuild each dataset's hash baseline so the next write
/// pass diffs against the recovered image.
pub fn recover_all(
    dir: &Path,
    rank: u32,
    cfg: &DcpConfig,
    state: &DcpState,
    datasets: &mut [Dataset],
) -> Result<(), DcpError> {
    let (path, file) = open_checked(dir, rank, cfg, state)?;
    let ioerr = |e: io::Error| DcpError::io(&path, e);
    let mut r = BufReader::new(file);

    let block = cfg.block_size as usize;
    let mut scratch = vec![0u8; block];

    // Baseline layer: a full image of every variable, in written order.
    let header = LayerHeader::read(&mut r).map_err(ioerr)?;
    for _ in 0..header.nb_var {
        let var = VarHeader::read(&mut r).map_err(ioerr)?;
        let idx = resolve(datasets, var.var_id, cfg, var.data_size)?;
        let ds = &mut datasets[idx];

        r.read_exact(&mut ds.data[..var.data_size as usize])
            .map_err(ioerr)?;
        let overflow = (var.data_size % cfg.block_size) as usize;
        if overflow != 0 {
            r.read_exact(&mut scratch[..block - overflow]).map_err(ioerr)?;
        }
    }

    // Diff layers: patch changed blocks in place, bounded by the recorded
    // layer sizes.
    let nb_layers = (state.nb_layer_reco as usize).min(state.layer_size.len());
    for layer in 1..nb_layers {
        LayerHeader::read(&mut r).map_err(ioerr)?;
        let mut pos = LAYER_HEADER_SIZE;

        while pos < state.layer_size[layer] {
            let meta = DiffBlockMeta::read(&mut r).map_err(ioerr)?;
            let idx = index_of(datasets, meta.var_id).ok_or(DcpError::UnknownVarId(meta.var_id))?;
            patch_block(&mut r, &mut datasets[idx], meta.block_id, cfg, &mut scratch)
                .map_err(ioerr)?;
            pos += cfg.block_size + DIFF_META_SIZE;
        }
    }

    for ds in datasets.iter_mut() {
        ds.rebuild_hash_array(cfg);
    }
    Ok(())
}

/// Restore a single dataset, leaving every other dataset's memory
/// untouched. Same scaffolding as [`recover_all`]; blocks belonging to
/// other variables are skipped.
pub fn recover_var(
    dir: &Path,
    rank: u32,
    var_id: u32,
    cfg: &DcpConfig,
    state: &DcpState,
    datasets: &mut [Dataset],
) -> Result<(), DcpError> {
    let target = index_of(datasets, var_id).ok_or(DcpError::UnknownVarId(var_id))?;

    let (path, file) = open_checked(dir, rank, cfg, state)?;
    let ioerr = |e: io::Error| DcpError::io(&path, e);
    let mut r = BufReader::new(file);

    let block = cfg.block_size as usize;
    let mut scratch = vec![0u8; block];

    let header = LayerHeader::read(&mut r).map_err(ioerr)?;
    for _ in 0..header.nb_var {
        let var = VarHeader::read(&mut r).map_err(ioerr)?;
        if var.var_id == var_id {
            resolve(datasets, var.var_id, cfg, var.data_size)?;
            let ds = &mut datasets[target];
            r.read_exact(&mut ds.data[..var.data_size as usize])
                .map_err(ioerr)?;
            let overflow = (var.data_size % cfg.block_size) as usize;
            if overflow != 0 {
                r.read_exact(&mut scratch[..block - overflow]).map_err(ioerr)?;
            }
        } else {
            // Skip the full padded extent of the foreign variable.
            let skip = cfg.block_count(var.data_size) * cfg.block_size;
            r.seek_relative(skip as i64).map_err(ioerr)?;
        }
    }

    let nb_layers = (state.nb_layer_reco as usize).min(state.layer_size.len());
    for layer in 1..nb_layers {
        LayerHeader::read(&mut r).map_err(ioerr)?;
        let mut pos = LAYER_HEADER_SIZE;

        while pos < state.layer_size[layer] {
            let meta = DiffBlockMeta::read(&mut r).map_err(ioerr)?;
            if meta.var_id == var_id {
                patch_block(&mut r, &mut datasets[target], meta.block_id, cfg, &mut scratch)
                    .map_err(ioerr)?;
            } else {
                r.seek_relative(cfg.block_size as i64).map_err(ioerr)?;
            }
            pos += cfg.block_size + DIFF_META_SIZE;
        }
    }

    datasets[target].rebuild_hash_array(cfg);
    Ok(())
}

/// Open the newest checkpoint file and enforce the geometry contract.
fn open_checked(
    dir: &Path,
    rank: u32,
    cfg: &DcpConfig,
    state: &DcpState,
) -> Result<(std::path::PathBuf, File), DcpError> {
    let file_id = state
        .active_file_id(cfg.stack_size)
        .ok_or(DcpError::NothingToRecover)?;
    let path = dir.join(ckpt_file_name(file_id, rank));

    let file = File::open(&path).map_err(|e| DcpError::io(&path, e))?;
    let preamble = Preamble::read(&file).map_err(|e| DcpError::io(&path, e))?;

    if preamble.block_size != cfg.block_size {
        return Err(DcpError::BlockSizeMismatch {
            config: cfg.block_size,
            file: preamble.block_size,
        });
    }
    if preamble.stack_size != cfg.stack_size {
        return Err(DcpError::StackDepthMismatch {
            config: cfg.stack_size,
            file: preamble.stack_size,
        });
    }
    Ok((path, file))
}

/// Validate a baseline entry against the registered dataset.
fn resolve(
    datasets: &[Dataset],
    var_id: u32,
    cfg: &DcpConfig,
    declared: u64,
) -> Result<usize, DcpError> {
    let idx = index_of(datasets, var_id).ok_or(DcpError::UnknownVarId(var_id))?;
    let max_size = MAX_BLOCK_COUNT * cfg.block_size;
    if declared > max_size {
        return Err(DcpError::BlockRangeOverflow {
            id: var_id,
            size: declared,
            max: max_size,
        });
    }
    let registered = datasets[idx].size();
    if declared > registered {
        return Err(DcpError::DatasetSizeMismatch {
            id: var_id,
            declared,
            registered,
        });
    }
    Ok(idx)
}

/// Apply one diff block: copy the live chunk into place and consume the
/// pad. A block at or past the current dataset end is consumed without
/// patching — the current size is the replay's upper bound.
fn patch_block<R: Read>(
    r: &mut R,
    ds: &mut Dataset,
    block_id: u16,
    cfg: &DcpConfig,
    scratch: &mut [u8],
) -> io::Result<()> {
    let offset = u64::from(block_id) * cfg.block_size;
    let size = ds.size();
    if offset >= size {
        return r.read_exact(scratch);
    }

    let chunk = (size - offset).min(cfg.block_size) as usize;
    let start = offset as usize;
    r.read_exact(&mut ds.data[start..start + chunk])?;
    if chunk < scratch.len() {
        r.read_exact(&mut scratch[chunk..])?;
    }
    Ok(())
}
