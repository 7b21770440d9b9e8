//! Integrity scanner and file existence probe.
//!
//! The scanner walks a checkpoint file end to end, recomputes every layer's
//! rolling digest exactly as the encoder computed it, and establishes the
//! longest prefix of layers whose digests match the recorded layer hashes.
//! Everything after the last matching layer is untrusted and truncated, so
//! a later append extends a clean tail.
//!
//! Corruption is a *report*, not an error: a diff layer that fails its
//! digest, or a file that simply ends, stops the scan and caps the
//! recoverable-layer count. Only a failed syscall or an unusable baseline
//! layer surfaces as `Err`.

use std::fs::OpenOptions;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::warn;

use crate::config::DcpConfig;
use crate::digest::DigestKind;
use crate::error::DcpError;
use crate::state::DcpState;
use crate::wire::{parse_file_name, LayerHeader, Preamble, VarHeader, DIFF_META_SIZE,
    LAYER_HEADER_SIZE, PREAMBLE_SIZE, VAR_HEADER_SIZE};

/// Upper bound on a block size adopted from a file's preamble. Anything
/// larger than this is a corrupt preamble, not a configuration choice.
const MAX_ADOPTED_BLOCK_SIZE: u64 = 1 << 30;

/// Outcome of one verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// Layers whose recomputed digest matched, counted from the baseline.
    pub nb_layer_reco: u32,
    /// Variable count recorded in the last verified layer.
    pub nb_var_reco: u32,
    /// Logical checkpoint id of the last verified layer.
    pub ckpt_id: i32,
    /// Reconstructed checkpoint counter (`fileId * stackSize + verified`).
    pub counter: u32,
    /// Byte position the file was truncated to.
    pub file_size: u64,
}

/// Verify `path` against the layer hashes recorded in `state`.
///
/// On success, `state` carries the scanner outputs (`nb_layer_reco`,
/// `nb_var_reco`, `ckpt_id`, `counter`, `file_size`) and the file has been
/// truncated to the last verified byte. A baseline-layer digest mismatch
/// means the file serves no recovery at all and is reported as `Err`
/// without truncating.
///
/// Unlike the recover path, a preamble that disagrees with the
/// configuration is adopted for the scan with a warning — the engine must
/// discover how much of the file is intact before any decision. The
/// caller's configuration is not modified.
pub fn verify_checkpoint(
    path: &Path,
    cfg: &DcpConfig,
    state: &mut DcpState,
) -> Result<VerifyReport, DcpError> {
    let ioerr = |e: io::Error| DcpError::io(path, e);

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(ioerr)?;

    let preamble = Preamble::read(&file).map_err(ioerr)?;
    if preamble.block_size != cfg.block_size {
        warn!(
            "block size differs between configuration ({}) and checkpoint file ({}); scanning with the file's value",
            cfg.block_size, preamble.block_size
        );
    }
    if preamble.stack_size != cfg.stack_size {
        warn!(
            "stack depth differs between configuration ({}) and checkpoint file ({}); scanning with the file's value",
            cfg.stack_size, preamble.stack_size
        );
    }
    let block_size = preamble.block_size.max(1);
    let stack_size = preamble.stack_size;
    if block_size > MAX_ADOPTED_BLOCK_SIZE {
        warn!(
            "implausible block size {} in '{}'; refusing to scan",
            block_size,
            path.display()
        );
        return Err(ioerr(io::Error::new(
            io::ErrorKind::InvalidData,
            "block size in preamble is implausible",
        )));
    }

    // The counter restarts from the file id embedded in the name.
    let file_id = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_file_name)
        .map(|(id, _rank)| id)
        .unwrap_or_else(|| {
            warn!("'{}' does not match dcp-id<N>-rank<M>.fti", path.display());
            0
        });
    let mut counter = file_id.saturating_mul(stack_size);

    state.nb_layer_reco = 0;

    let mut r = BufReader::new(&file);
    let mut payload = vec![0u8; block_size as usize];
    let mut fs: u64 = PREAMBLE_SIZE;

    // ── Baseline layer ──────────────────────────────────────────────────
    let mut digest = cfg.digest.layer_digest();
    let header = LayerHeader::read(&mut r).map_err(ioerr)?;
    fs += LAYER_HEADER_SIZE;

    for _ in 0..header.nb_var {
        let var = VarHeader::read(&mut r).map_err(ioerr)?;
        fs += VAR_HEADER_SIZE;

        let mut pos: u64 = 0;
        while pos < var.data_size {
            r.read_exact(&mut payload).map_err(ioerr)?;
            digest.update(&cfg.digest.hash(&payload));
            pos += block_size;
        }
        fs += pos;
    }

    let stored = state.layer_hash.first().map(String::as_str).unwrap_or("");
    if !short_hex_matches(cfg.digest, &digest.finalize_hex(), stored) {
        warn!("layer hash differs in baseline of '{}'", path.display());
        return Err(DcpError::BaselineHashMismatch);
    }

    state.nb_layer_reco = 1;
    state.nb_var_reco = header.nb_var;
    state.ckpt_id = header.ckpt_id;
    counter += 1;

    // ── Diff layers ─────────────────────────────────────────────────────
    let mut meta = [0u8; DIFF_META_SIZE as usize];
    'layers: for layer in 1..(stack_size as usize).min(state.layer_size.len()) {
        let mut digest = cfg.digest.layer_digest();

        // A clean end of file here is the normal stop.
        let header = match LayerHeader::read(&mut r) {
            Ok(h) => h,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break 'layers,
            Err(e) => return Err(ioerr(e)),
        };

        let mut layer_bytes = LAYER_HEADER_SIZE;
        while layer_bytes < state.layer_size[layer] {
            match read_diff_block(&mut r, &mut meta, &mut payload) {
                Ok(()) => {}
                // The layer is shorter than recorded: unrecoverable tail.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break 'layers,
                Err(e) => return Err(ioerr(e)),
            }
            digest.update(&cfg.digest.hash(&payload));
            layer_bytes += DIFF_META_SIZE + block_size;
        }

        let stored = state.layer_hash.get(layer).map(String::as_str).unwrap_or("");
        if !short_hex_matches(cfg.digest, &digest.finalize_hex(), stored) {
            warn!("layer hash differs in layer {layer} of '{}'", path.display());
            break 'layers;
        }

        fs += layer_bytes;
        state.nb_layer_reco = layer as u32 + 1;
        state.nb_var_reco = header.nb_var;
        state.ckpt_id = header.ckpt_id;
        counter += 1;
    }

    state.counter = counter;
    state.file_size = fs;

    // Drop any unverified tail so future appends extend a clean file.
    file.set_len(fs).map_err(ioerr)?;

    Ok(VerifyReport {
        nb_layer_reco: state.nb_layer_reco,
        nb_var_reco: state.nb_var_reco,
        ckpt_id: state.ckpt_id,
        counter,
        file_size: fs,
    })
}

/// Existence probe: `true` iff `path` exists, is exactly `expected_size`
/// bytes, and — when `checksum` is non-empty — passes verification.
pub fn check_file(
    path: &Path,
    expected_size: u64,
    checksum: &str,
    cfg: &DcpConfig,
    state: &mut DcpState,
) -> bool {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(_) => {
            warn!("missing file: '{}'", path.display());
            return false;
        }
    };
    if meta.len() != expected_size {
        return false;
    }
    if checksum.is_empty() {
        return true;
    }
    verify_checkpoint(path, cfg, state).is_ok()
}

fn read_diff_block<R: Read>(
    r: &mut R,
    meta: &mut [u8; DIFF_META_SIZE as usize],
    payload: &mut [u8],
) -> io::Result<()> {
    r.read_exact(meta)?;
    r.read_exact(payload)
}

/// Compare the short-width digest prefix: the stored hash is the full wide
/// hex, the comparison uses only the first `2 * short_len` characters.
fn short_hex_matches(kind: DigestKind, computed: &str, stored: &str) -> bool {
    let n = 2 * kind.short_len();
    match (computed.get(..n), stored.get(..n)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_comparison_uses_the_prefix() {
        // Blake3 compares 16 of its 32 bytes; a difference past that point
        // is invisible to the scanner.
        let a = format!("{}{}", "ab".repeat(16), "00".repeat(16));
        let b = format!("{}{}", "ab".repeat(16), "ff".repeat(16));
        assert!(short_hex_matches(DigestKind::Blake3, &a, &b));
        assert!(!short_hex_matches(DigestKind::Blake3, &a, ""));

        // Md5 compares its full 16 bytes (32 hex characters).
        let c = format!("{}{}", "cd".repeat(8), "ab".repeat(8));
        assert!(!short_hex_matches(DigestKind::Md5, &a, &c));
        assert!(short_hex_matches(DigestKind::Md5, &a[..32], &a));
    }
}
