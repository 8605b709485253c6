//! fotovault command line interface.
//!
//! Runs the pipeline in single-shot mode: a command enqueues work and
//! the queue is drained by a small worker pool before the process
//! exits.
//!
//! ```bash
//! fotovault scan                   # ingest the library, generate thumbnails
//! fotovault regenerate --force     # rebuild every thumbnail
//! fotovault rotate 7 90            # rotate photo 7 clockwise
//! fotovault status 3               # inspect job 3
//! ```

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::info;

use fotovault::config::Config;
use fotovault::db::Database;
use fotovault::pipeline::{MemoryQueue, Pipeline, ThumbSize};
use fotovault::scanner::{ScanProgress, Scanner};

enum Command {
    Scan,
    Regenerate { force: bool },
    Rotate { photo_id: i64, degrees: i32 },
    Status { job_id: i64 },
    Artifact { photo_id: i64, size: ThumbSize, out: PathBuf },
}

struct CliArgs {
    command: Command,
    config_path: Option<PathBuf>,
    workers: Option<usize>,
}

fn main() -> Result<()> {
    let args = parse_args()?;

    fotovault::logging::init(None)?;

    let config = match &args.config_path {
        Some(path) => Config::load_from(path.clone())?,
        None => Config::load()?,
    };
    let mut thumb_config = config.thumbnails.clone();
    if let Some(workers) = args.workers {
        thumb_config.workers = workers;
    }

    let db = Arc::new(Database::open(&config.db_path)?);
    db.initialize()?;
    info!("Database opened at {:?}", config.db_path);

    let queue = Arc::new(MemoryQueue::new());
    let pipeline = Arc::new(Pipeline::new(db, queue, thumb_config.clone()));

    match args.command {
        Command::Scan => {
            let scanner = Scanner::new(config.library.clone());
            let (tx, rx) = std::sync::mpsc::channel();
            let reporter = thread::spawn(move || {
                for update in rx {
                    if let ScanProgress::Scanning { current, total, path } = update {
                        info!("Scanning {current}/{total}: {path}");
                    }
                }
            });

            let result = scanner.scan(&pipeline, Some(tx))?;
            let _ = reporter.join();

            println!(
                "Scanned {} files: {} new, {} known, {} errors",
                result.total_found, result.new, result.known, result.errors
            );
            process_queue(&pipeline, thumb_config.workers);
            if let Some(job_id) = result.generation_job_id {
                print_status(&pipeline, job_id)?;
            }
        }
        Command::Regenerate { force } => {
            let job_id = pipeline.regenerate_all(force)?;
            process_queue(&pipeline, thumb_config.workers);
            print_status(&pipeline, job_id)?;
        }
        Command::Rotate { photo_id, degrees } => {
            let outcome = pipeline.set_rotation(photo_id, degrees)?;
            println!(
                "Photo {photo_id}: final rotation {}, version {}",
                outcome.final_rotation, outcome.rotation_version
            );
            // Run the queued interactive regeneration before exiting.
            process_queue(&pipeline, 1);
        }
        Command::Status { job_id } => {
            print_status(&pipeline, job_id)?;
        }
        Command::Artifact { photo_id, size, out } => {
            let bytes = pipeline.get_artifact(photo_id, size, None)?;
            std::fs::write(&out, &bytes)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {} bytes to {}", bytes.len(), out.display());
        }
    }

    Ok(())
}

/// Drain the queue with a small worker pool, then return.
fn process_queue(pipeline: &Arc<Pipeline>, workers: usize) {
    pipeline.queue().close();

    let mut handles = Vec::new();
    for _ in 0..workers.max(1) {
        let pipeline = Arc::clone(pipeline);
        handles.push(thread::spawn(move || pipeline.run_until_closed()));
    }
    for handle in handles {
        let _ = handle.join();
    }
}

fn print_status(pipeline: &Pipeline, job_id: i64) -> Result<()> {
    let status = pipeline.get_job_status(job_id)?;
    println!(
        "Job {}: {} [{}] {:.0}% ({}/{})",
        status.id,
        status.kind.as_str(),
        status.status.as_str(),
        status.progress(),
        status.processed_items,
        status
            .total_items
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string()),
    );
    if let Some(error) = &status.error_message {
        println!("  error: {error}");
    }
    Ok(())
}

fn parse_args() -> Result<CliArgs> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path = None;
    let mut workers = None;
    let mut positional = Vec::new();
    let mut force = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--workers" | "-w" => {
                if i + 1 < args.len() {
                    workers = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--force" | "-f" => {
                force = true;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown option: {arg}");
                print_help();
                std::process::exit(1);
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("scan") => Command::Scan,
        Some("regenerate") => Command::Regenerate { force },
        Some("rotate") => {
            let [_, photo_id, degrees] = positional.as_slice() else {
                bail!("usage: fotovault rotate <photo_id> <degrees>");
            };
            Command::Rotate {
                photo_id: photo_id.parse().context("photo id must be an integer")?,
                degrees: degrees.parse().context("degrees must be an integer")?,
            }
        }
        Some("status") => {
            let [_, job_id] = positional.as_slice() else {
                bail!("usage: fotovault status <job_id>");
            };
            Command::Status {
                job_id: job_id.parse().context("job id must be an integer")?,
            }
        }
        Some("artifact") => {
            let [_, photo_id, size, out] = positional.as_slice() else {
                bail!("usage: fotovault artifact <photo_id> <size> <out_file>");
            };
            let size = ThumbSize::from_str(size)
                .with_context(|| format!("invalid size {size}, expected 150, 400 or 1200"))?;
            Command::Artifact {
                photo_id: photo_id.parse().context("photo id must be an integer")?,
                size,
                out: PathBuf::from(out),
            }
        }
        Some(other) => bail!("unknown command: {other}"),
        None => {
            print_help();
            std::process::exit(1);
        }
    };

    Ok(CliArgs {
        command,
        config_path,
        workers,
    })
}

fn print_help() {
    println!(
        r#"fotovault - personal photo library

USAGE:
    fotovault [OPTIONS] <COMMAND>

COMMANDS:
    scan                              Scan the library and generate thumbnails
    regenerate [--force]              Regenerate missing (or all) thumbnails
    rotate <photo_id> <degrees>       Set user rotation (0, 90, 180, 270)
    status <job_id>                   Show job progress
    artifact <photo_id> <size> <out>  Resolve a thumbnail to a file

OPTIONS:
    --config, -c PATH   Path to config file
    --workers, -w N     Worker threads for batch processing
    --force, -f         With regenerate: rebuild every thumbnail
    --help, -h          Show this help message

ENVIRONMENT:
    FOTOVAULT_LOG       Log level (trace, debug, info, warn, error)
"#
    );
}
