//! Layer encoder — the differential write path.
//!
//! Every pass hashes each registered dataset block by block and emits only
//! the blocks whose hash changed since the previous checkpoint. The first
//! layer of a file (`counter % stack_size == 0`) is the baseline: the hash
//! state is discarded first, so every block commits and the layer carries a
//! full image. Subsequent layers prefix each committed block with the
//! 6-byte `(varId, blockId)` header.
//!
//! On any failure after the file is opened, the in-progress layer is rolled
//! back: the file is truncated to the byte position of the last successful
//! layer, and the per-dataset hash arrays keep describing that layer, so a
//! retry re-commits exactly the blocks the truncation discarded.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::DcpConfig;
use crate::dataset::{Dataset, MAX_BLOCK_COUNT, MAX_VAR_ID};
use crate::error::DcpError;
use crate::state::DcpState;
use crate::wire::{
    ckpt_file_name, DiffBlockMeta, LayerHeader, Preamble, VarHeader, DIFF_META_SIZE,
    LAYER_HEADER_SIZE, PREAMBLE_SIZE, VAR_HEADER_SIZE,
};

/// Write one checkpoint layer for `rank` into `dir`.
///
/// Creates `dcp-id<FileId>-rank<rank>.fti` when this checkpoint opens a new
/// file, appends otherwise. On success the per-dataset hash arrays describe
/// the just-written contents, `state` carries the new layer size/hash and
/// advanced counter, and the previous file is removed on rollover.
///
/// Returns the number of bytes appended to the file.
pub fn write_checkpoint(
    dir: &Path,
    rank: u32,
    ckpt_id: i32,
    cfg: &DcpConfig,
    state: &mut DcpState,
    datasets: &mut [Dataset],
) -> Result<u64, DcpError> {
    state.data_size = 0;
    state.dcp_size = 0;

    // A snapshot restored from an older run may carry short bookkeeping
    // vectors; grow them to the configured depth before indexing.
    let depth = cfg.stack_size as usize;
    if state.layer_size.len() < depth {
        state.layer_size.resize(depth, 0);
    }
    if state.layer_hash.len() < depth {
        state.layer_hash.resize(depth, String::new());
    }

    // Refuse out-of-range datasets before any byte is written. 2^16 blocks
    // (indices 0..=65535) is the most the diff-block header can address.
    let max_size = MAX_BLOCK_COUNT * cfg.block_size;
    for ds in datasets.iter() {
        if ds.id > MAX_VAR_ID {
            return Err(DcpError::VarIdOverflow {
                id: ds.id,
                max: MAX_VAR_ID,
            });
        }
        if ds.size() > max_size {
            return Err(DcpError::BlockRangeOverflow {
                id: ds.id,
                size: ds.size(),
                max: max_size,
            });
        }
    }

    let file_id = state.file_id(cfg.stack_size);
    let layer = state.layer(cfg.stack_size);
    let path = dir.join(ckpt_file_name(file_id, rank));
    let ioerr = |e: io::Error| DcpError::io(&path, e);

    let file = if layer == 0 {
        File::create(&path).map_err(ioerr)?
    } else {
        OpenOptions::new().append(true).open(&path).map_err(ioerr)?
    };

    // A fresh file invalidates the old hash state so every block commits.
    if layer == 0 {
        for ds in datasets.iter_mut() {
            ds.reset_hash_state();
        }
        state.file_size = 0;
    }
    let rollback_to = state.file_size;

    match encode_layer(&file, &path, ckpt_id, layer, cfg, state, datasets) {
        Ok(outcome) => {
            // The layer is durable; only now do the fresh hashes become the
            // comparison baseline for the next pass.
            for (ds, hashes) in datasets.iter_mut().zip(outcome.new_hashes) {
                ds.hash_array = hashes;
                ds.hash_data_size = ds.size();
            }

            state.layer_size[layer as usize] = outcome.layer_size;
            state.layer_hash[layer as usize] = outcome.layer_hash;
            state.file_size += outcome.layer_size;
            state.counter += 1;
            // A successful write leaves layers 0..=layer consistent by
            // construction; keep the recovery bookkeeping in step so an
            // in-process recover needs no verification pass first.
            state.nb_layer_reco = layer + 1;
            state.nb_var_reco = datasets.len() as u32;
            state.ckpt_id = ckpt_id;

            if layer == 0 {
                remove_previous_file(dir, file_id, rank);
            }
            Ok(outcome.layer_size)
        }
        Err(e) => {
            if let Err(trunc) = file.set_len(rollback_to) {
                warn!(
                    "could not roll '{}' back to {} bytes: {}",
                    path.display(),
                    rollback_to,
                    trunc
                );
            }
            Err(e)
        }
    }
}

struct LayerOutcome {
    layer_size: u64,
    layer_hash: String,
    /// Freshly computed per-dataset hash arrays, in registration order.
    new_hashes: Vec<Vec<u8>>,
}

fn encode_layer(
    file: &File,
    path: &Path,
    ckpt_id: i32,
    layer: u32,
    cfg: &DcpConfig,
    state: &mut DcpState,
    datasets: &[Dataset],
) -> Result<LayerOutcome, DcpError> {
    let ioerr = |e: io::Error| DcpError::io(path, e);
    let block = cfg.block_size as usize;
    let wide = cfg.digest.wide_len();

    let mut w = BufWriter::new(file);
    let mut layer_digest = cfg.digest.layer_digest();
    let mut layer_size: u64 = 0;
    let mut scratch = vec![0u8; block];
    let mut new_hashes = Vec::with_capacity(datasets.len());

    if layer == 0 {
        Preamble {
            block_size: cfg.block_size,
            stack_size: cfg.stack_size,
        }
        .write(&mut w)
        .map_err(ioerr)?;
        layer_size += PREAMBLE_SIZE;
    }

    LayerHeader {
        ckpt_id,
        nb_var: datasets.len() as u32,
    }
    .write(&mut w)
    .map_err(ioerr)?;
    layer_size += LAYER_HEADER_SIZE;

    for ds in datasets {
        let size = ds.size();
        state.data_size += size;

        let nb_blocks = cfg.block_count(size) as usize;
        let mut hash_tmp = vec![0u8; nb_blocks * wide];

        if layer == 0 {
            VarHeader {
                var_id: ds.id,
                data_size: size,
            }
            .write(&mut w)
            .map_err(ioerr)?;
            layer_size += VAR_HEADER_SIZE;
        }

        let mut pos: u64 = 0;
        while pos < size {
            let block_id = (pos / cfg.block_size) as usize;
            let hash_idx = block_id * wide;
            let chunk = (size - pos).min(cfg.block_size) as usize;

            // Tail blocks are zero-padded to a full block; the pad is part
            // of both the hash input and the on-disk payload.
            let payload: &[u8] = if chunk < block {
                scratch.fill(0);
                scratch[..chunk].copy_from_slice(&ds.data[pos as usize..pos as usize + chunk]);
                &scratch
            } else {
                &ds.data[pos as usize..pos as usize + block]
            };
            cfg.digest
                .hash_into(payload, &mut hash_tmp[hash_idx..hash_idx + wide]);

            // Blocks past the old hashed extent are always new.
            let commit = pos >= ds.hash_data_size
                || ds.hash_array.get(hash_idx..hash_idx + wide)
                    != Some(&hash_tmp[hash_idx..hash_idx + wide]);

            if commit {
                if layer > 0 {
                    DiffBlockMeta {
                        var_id: ds.id,
                        block_id: block_id as u16,
                    }
                    .write(&mut w)
                    .map_err(ioerr)?;
                    layer_size += DIFF_META_SIZE;
                }
                w.write_all(payload).map_err(ioerr)?;
                layer_size += cfg.block_size;
                state.dcp_size += chunk as u64;
                layer_digest.update(&hash_tmp[hash_idx..hash_idx + wide]);
            }

            pos += cfg.block_size;
        }

        new_hashes.push(hash_tmp);
    }

    w.flush().map_err(ioerr)?;
    file.sync_all().map_err(ioerr)?;

    Ok(LayerOutcome {
        layer_size,
        layer_hash: layer_digest.finalize_hex(),
        new_hashes,
    })
}

/// Best-effort removal of the previous file after a rollover. A missing
/// file is expected; anything else is only worth a warning.
fn remove_previous_file(dir: &Path, file_id: u32, rank: u32) {
    let Some(old_id) = file_id.checked_sub(1) else {
        return;
    };
    let old = dir.join(ckpt_file_name(old_id, rank));
    match std::fs::remove_file(&old) {
        Ok(()) => debug!("removed superseded checkpoint '{}'", old.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("cannot delete file '{}': {}", old.display(), e),
    }
}
