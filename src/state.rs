//! Per-process checkpoint state.
//!
//! Everything the engine must remember *outside* the checkpoint file:
//! layer sizes (diff layers carry no length field of their own), layer
//! hashes (the scanner's ground truth), and the monotonic counter that
//! drives file rollover. The host persists a snapshot of this state and
//! restores it before verification after a restart.

use serde::{Deserialize, Serialize};

/// Mutable long-lived engine state for one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcpState {
    /// Total checkpoints emitted since the start.
    pub counter: u32,
    /// Cumulative bytes written to the current file.
    pub file_size: u64,
    /// Byte length of each emitted layer of the current file. Index 0
    /// includes the file preamble.
    pub layer_size: Vec<u64>,
    /// Hex of each layer's wide rolling digest.
    pub layer_hash: Vec<String>,
    /// Number of trailing-consistent layers established by the verifier.
    pub nb_layer_reco: u32,
    /// Variable count of the last verified layer.
    pub nb_var_reco: u32,
    /// Logical checkpoint id of the last written or verified layer.
    pub ckpt_id: i32,
    /// Total registered bytes seen by the last write pass.
    pub data_size: u64,
    /// Unpadded data bytes actually committed by the last write pass; the
    /// `dcp_size / data_size` ratio is the differential efficacy.
    pub dcp_size: u64,
}

impl DcpState {
    pub fn new(stack_size: u32) -> Self {
        Self {
            counter: 0,
            file_size: 0,
            layer_size: vec![0; stack_size as usize],
            layer_hash: vec![String::new(); stack_size as usize],
            nb_layer_reco: 0,
            nb_var_reco: 0,
            ckpt_id: 0,
            data_size: 0,
            dcp_size: 0,
        }
    }

    /// File id the *next* checkpoint will be written to.
    #[inline]
    pub fn file_id(&self, stack_size: u32) -> u32 {
        self.counter / stack_size.max(1)
    }

    /// Layer index the *next* checkpoint will occupy; 0 means a new file.
    #[inline]
    pub fn layer(&self, stack_size: u32) -> u32 {
        self.counter % stack_size.max(1)
    }

    /// File id of the most recently written checkpoint, if any.
    pub fn active_file_id(&self, stack_size: u32) -> Option<u32> {
        self.counter
            .checked_sub(1)
            .map(|c| c / stack_size.max(1))
    }

    /// Serialize for host persistence.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_drives_file_and_layer() {
        let mut st = DcpState::new(4);
        assert_eq!((st.file_id(4), st.layer(4)), (0, 0));
        assert_eq!(st.active_file_id(4), None);

        st.counter = 3;
        assert_eq!((st.file_id(4), st.layer(4)), (0, 3));
        st.counter = 4;
        assert_eq!((st.file_id(4), st.layer(4)), (1, 0));
        assert_eq!(st.active_file_id(4), Some(0));
        st.counter = 5;
        assert_eq!(st.active_file_id(4), Some(1));
    }

    #[test]
    fn snapshot_round_trip() {
        let mut st = DcpState::new(2);
        st.counter = 3;
        st.layer_hash[1] = "abcd".into();
        st.layer_size[1] = 22;
        st.file_size = 78;

        let restored = DcpState::from_bytes(&st.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.counter, 3);
        assert_eq!(restored.layer_hash[1], "abcd");
        assert_eq!(restored.layer_size[1], 22);
        assert_eq!(restored.file_size, 78);
    }
}
