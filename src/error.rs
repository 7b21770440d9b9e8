//! Error taxonomy for the checkpoint engine.
//!
//! Every public operation returns `Result<_, DcpError>`. The host decides
//! escalation from [`DcpError::status`]: `NonSuccess` means the operation
//! failed but earlier checkpoint data is untouched (retry a level up),
//! `NonRecoverable` means this checkpoint cannot serve a recovery at all.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Outcome class reported to the host, mirroring the engine's contract:
/// I/O and semantic file errors are transient, configuration mismatches in
/// the recover path are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Transient or recoverable failure; the caller may retry or fail over.
    NonSuccess,
    /// The checkpoint cannot be used with the current configuration.
    NonRecoverable,
}

#[derive(Error, Debug)]
pub enum DcpError {
    #[error("I/O failure on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file preamble's block size disagrees with the configuration.
    /// Recover refuses outright; the verify path adopts the file's value.
    #[error("block size differs between configuration ({config}) and checkpoint file ({file})")]
    BlockSizeMismatch { config: u64, file: u64 },

    #[error("stack depth differs between configuration ({config}) and checkpoint file ({file})")]
    StackDepthMismatch { config: u32, file: u32 },

    /// A layer references a variable id that is not registered.
    #[error("dataset id {0} is not registered")]
    UnknownVarId(u32),

    #[error("dataset id {id} exceeds the maximum representable id {max}")]
    VarIdOverflow { id: u32, max: u32 },

    /// The dataset's block count would not fit the 16-bit block index.
    #[error("dataset {id}: {size} bytes exceed the addressable range of {max} bytes")]
    BlockRangeOverflow { id: u32, size: u64, max: u64 },

    /// A baseline entry declares more bytes than the registered buffer holds.
    #[error("dataset {id}: checkpoint declares {declared} bytes but {registered} are registered")]
    DatasetSizeMismatch {
        id: u32,
        declared: u64,
        registered: u64,
    },

    /// The recomputed baseline-layer digest does not match the stored one.
    #[error("baseline layer hash differs from the recorded value")]
    BaselineHashMismatch,

    /// No checkpoint has been written or verified yet.
    #[error("no checkpoint layer is available to recover from")]
    NothingToRecover,
}

impl DcpError {
    /// Map the error onto the host-facing outcome class.
    pub fn status(&self) -> Status {
        match self {
            DcpError::BlockSizeMismatch { .. } | DcpError::StackDepthMismatch { .. } => {
                Status::NonRecoverable
            }
            _ => Status::NonSuccess,
        }
    }

    pub(crate) fn io(path: &std::path::Path, source: io::Error) -> Self {
        DcpError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
