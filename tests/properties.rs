use proptest::prelude::*;
use tempfile::TempDir;

use strata::{
    ckpt_file_name, recover_all, verify_checkpoint, write_checkpoint, Dataset, DcpConfig,
    DcpState, DigestKind,
};

const B: u64 = 8;
const S: u32 = 4;

fn padded_blocks(data: &[u8], block: usize) -> Vec<Vec<u8>> {
    data.chunks(block)
        .map(|c| {
            let mut v = c.to_vec();
            v.resize(block, 0);
            v
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// A baseline plus arbitrary per-layer byte mutations always recovers
    /// the final image, every diff layer's size obeys `8 + m·(B+6)` for
    /// the m blocks whose padded content actually changed, and the scanner
    /// confirms the whole stack.
    #[test]
    fn mutated_stack_round_trips(
        initial in proptest::collection::vec(any::<u8>(), 1..200),
        rounds in proptest::collection::vec(
            proptest::collection::vec((any::<proptest::sample::Index>(), any::<u8>()), 1..4),
            0..(S as usize - 1)
        ),
    ) {
        let tmp = TempDir::new().unwrap();
        let cfg = DcpConfig::new(B, S, DigestKind::Md5);
        let mut state = DcpState::new(cfg.stack_size);
        let mut sets = vec![Dataset::new(11, initial)];

        write_checkpoint(tmp.path(), 0, 0, &cfg, &mut state, &mut sets).unwrap();

        for (i, round) in rounds.iter().enumerate() {
            let before = padded_blocks(&sets[0].data, B as usize);
            for (idx, byte) in round {
                let pos = idx.index(sets[0].data.len());
                sets[0].data[pos] = *byte;
            }
            let after = padded_blocks(&sets[0].data, B as usize);
            let changed = before.iter().zip(&after).filter(|(a, b)| a != b).count() as u64;

            let appended =
                write_checkpoint(tmp.path(), 0, i as i32 + 1, &cfg, &mut state, &mut sets)
                    .unwrap();
            prop_assert_eq!(appended, 8 + changed * (B + 6));
        }

        let expected = sets[0].data.clone();
        sets[0].data = vec![0u8; expected.len()];
        recover_all(tmp.path(), 0, &cfg, &state, &mut sets).unwrap();
        prop_assert_eq!(&sets[0].data, &expected);

        // The scanner reproduces the writer's bookkeeping bit-exactly.
        let path = tmp.path().join(ckpt_file_name(0, 0));
        let mut rescanned = DcpState::from_bytes(&state.to_bytes().unwrap()).unwrap();
        let report = verify_checkpoint(&path, &cfg, &mut rescanned).unwrap();
        prop_assert_eq!(report.nb_layer_reco as usize, rounds.len() + 1);
        prop_assert_eq!(report.file_size, state.file_size);
    }
}
