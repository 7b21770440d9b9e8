use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata::{write_checkpoint, Dataset, DcpConfig, DcpState, DigestKind};
use tempfile::TempDir;

fn bench_write(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let cfg = DcpConfig::new(16 * 1024, 32, DigestKind::Md5);
    let data = vec![0x5Au8; 8 * 1024 * 1024];

    c.bench_function("baseline_write_8mb", |b| {
        b.iter(|| {
            let mut state = DcpState::new(cfg.stack_size);
            let mut sets = vec![Dataset::new(1, black_box(data.clone()))];
            write_checkpoint(tmp.path(), 0, 0, &cfg, &mut state, &mut sets).unwrap()
        })
    });

    c.bench_function("unchanged_diff_write_8mb", |b| {
        let mut state = DcpState::new(cfg.stack_size);
        let mut sets = vec![Dataset::new(1, data.clone())];
        write_checkpoint(tmp.path(), 0, 0, &cfg, &mut state, &mut sets).unwrap();
        b.iter(|| {
            // Pin to layer 1 so every iteration measures a pure diff pass.
            state.counter = 1;
            write_checkpoint(tmp.path(), 0, 1, &cfg, &mut state, &mut sets).unwrap()
        })
    });
}

criterion_group!(benches, bench_write);
criterion_main!(benches);
