use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use strata::wire::{LayerHeader, Preamble, VarHeader};
use strata::{check_file, verify_checkpoint, DcpConfig, DcpState, DigestKind};

#[derive(Parser)]
#[command(name = "strata", version, about = "Differential checkpoint file inspector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a checkpoint file's geometry and baseline composition
    Info {
        input: PathBuf,
    },
    /// Verify a checkpoint against a saved state snapshot and truncate the
    /// unverifiable tail
    Verify {
        input: PathBuf,
        /// JSON state snapshot persisted by the host; updated in place
        #[arg(short, long)]
        state: PathBuf,
        /// Digest: md5 (default), crc32, blake3
        #[arg(short, long, default_value = "md5")]
        digest: String,
    },
    /// Probe that a checkpoint file exists with the expected size
    Check {
        input: PathBuf,
        #[arg(short = 's', long)]
        size: u64,
        /// When set, also require the integrity scan to pass against this
        /// state snapshot
        #[arg(long)]
        state: Option<PathBuf>,
        #[arg(short, long, default_value = "md5")]
        digest: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match Cli::parse().command {
        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input } => {
            let file_size = std::fs::metadata(&input)?.len();
            let file = File::open(&input)?;
            let mut r = BufReader::new(file);

            let preamble = Preamble::read(&mut r)?;
            let header = LayerHeader::read(&mut r)?;

            println!("── dCP checkpoint ───────────────────────────────────────");
            println!("  Path         {}", input.display());
            println!("  File size    {} B", file_size);
            println!("  Block size   {} B", preamble.block_size);
            println!("  Stack depth  {}", preamble.stack_size);
            println!("  Ckpt id      {}", header.ckpt_id);
            println!("  Variables    {}", header.nb_var);

            let block = preamble.block_size.max(1);
            let mut baseline_end = 12 + 8;
            for _ in 0..header.nb_var {
                let var = VarHeader::read(&mut r)?;
                let padded = (var.data_size).div_ceil(block) * block;
                println!(
                    "    var id={:<6} size={:<12} padded={} B",
                    var.var_id, var.data_size, padded
                );
                r.seek(SeekFrom::Current(padded as i64))?;
                baseline_end += 12 + padded;
            }
            println!("  Baseline     {} B", baseline_end);
            println!("  Diff layers  {} B", file_size.saturating_sub(baseline_end));
        }

        // ── Verify ───────────────────────────────────────────────────────────
        Commands::Verify {
            input,
            state,
            digest,
        } => {
            let mut st = DcpState::from_bytes(&std::fs::read(&state)?)?;

            // Scan with the file's own geometry; the digest is host config.
            let preamble = Preamble::read(File::open(&input)?)?;
            let cfg = DcpConfig::new(preamble.block_size, preamble.stack_size, parse_digest(&digest));

            let report = verify_checkpoint(&input, &cfg, &mut st)?;
            println!("── Verification ─────────────────────────────────────────");
            println!("  Layers ok    {}", report.nb_layer_reco);
            println!("  Variables    {}", report.nb_var_reco);
            println!("  Ckpt id      {}", report.ckpt_id);
            println!("  Counter      {}", report.counter);
            println!("  Durable size {} B", report.file_size);

            std::fs::write(&state, st.to_bytes()?)?;
        }

        // ── Check ────────────────────────────────────────────────────────────
        Commands::Check {
            input,
            size,
            state,
            digest,
        } => {
            let ok = match (File::open(&input), state) {
                (Err(_), _) => {
                    eprintln!("missing file: '{}'", input.display());
                    false
                }
                (Ok(f), Some(state_path)) => {
                    let mut st = DcpState::from_bytes(&std::fs::read(&state_path)?)?;
                    match Preamble::read(f) {
                        Ok(preamble) => {
                            let cfg = DcpConfig::new(
                                preamble.block_size,
                                preamble.stack_size,
                                parse_digest(&digest),
                            );
                            let checksum = st.layer_hash.first().cloned().unwrap_or_default();
                            check_file(&input, size, &checksum, &cfg, &mut st)
                        }
                        Err(_) => false,
                    }
                }
                (Ok(_), None) => {
                    let cfg = DcpConfig::default();
                    let mut st = DcpState::new(cfg.stack_size);
                    check_file(&input, size, "", &cfg, &mut st)
                }
            };
            println!("{}", if ok { "present" } else { "absent" });
            if !ok {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_digest(s: &str) -> DigestKind {
    match s.to_ascii_lowercase().as_str() {
        "md5" => DigestKind::Md5,
        "crc32" => DigestKind::Crc32,
        "blake3" => DigestKind::Blake3,
        other => {
            eprintln!("Unknown digest '{}', defaulting to md5", other);
            DigestKind::Md5
        }
    }
}
