//! # strata — differential block-level checkpointing
//!
//! Persists a process's in-memory datasets to a file system so the process
//! can resume after a failure. After a full baseline, each checkpoint
//! stores only the blocks whose content hash changed since the previous
//! one; recovery replays the baseline plus every verified incremental
//! layer.
//!
//! Engine guarantees:
//! - All numeric fields on disk are little-endian, fixed width
//! - A file always opens with its write-time geometry `(blockSize,
//!   stackSize)`; the recover path refuses a geometry mismatch outright
//! - Every layer is identified by a rolling digest over the wide hashes of
//!   the blocks it carries, reproducible bit-exactly by the scanner
//! - Verification establishes the longest trustworthy layer prefix and
//!   truncates everything after it; a failed write rolls the file back to
//!   the last complete layer
//! - Each rank owns its own file; there is no cross-process state
//!
//! ```no_run
//! use strata::{recover_all, write_checkpoint};
//! use strata::{Dataset, DcpConfig, DcpState};
//! use std::path::Path;
//!
//! let cfg = DcpConfig::default();
//! let mut state = DcpState::new(cfg.stack_size);
//! let mut datasets = vec![Dataset::new(1, vec![0u8; 1 << 20])];
//!
//! let dir = Path::new("/scratch/ckpt");
//! write_checkpoint(dir, 0, 1, &cfg, &mut state, &mut datasets)?;
//! // ... mutate, checkpoint again, crash, restart ...
//! recover_all(dir, 0, &cfg, &state, &mut datasets)?;
//! # Ok::<(), strata::DcpError>(())
//! ```

pub mod config;
pub mod dataset;
pub mod digest;
pub mod error;
pub mod reader;
pub mod state;
pub mod verify;
pub mod wire;
pub mod writer;

// Flat re-exports for the most common types.
pub use config::DcpConfig;
pub use dataset::{index_of, Dataset, MAX_BLOCK_COUNT, MAX_BLOCK_IDX, MAX_VAR_ID};
pub use digest::{DigestKind, LayerDigest};
pub use error::{DcpError, Status};
pub use reader::{recover_all, recover_var};
pub use state::DcpState;
pub use verify::{check_file, verify_checkpoint, VerifyReport};
pub use wire::{ckpt_file_name, parse_file_name};
pub use writer::write_checkpoint;
