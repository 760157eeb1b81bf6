use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use minios_storage::fs::sfs::DEFAULT_LABEL;
use minios_storage::SFS_BLOCK_SIZE;
use mkfs::{build_image, ImageOptions};

#[derive(Parser)]
#[command(about = "Create an SFS disk image")]
struct Args {
    /// Output disk image path
    #[arg(short, long)]
    output: PathBuf,

    /// Directory to import files from
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Image size in 4 KiB blocks
    #[arg(short, long, default_value_t = 256)]
    blocks: u32,

    /// Volume label (at most 31 bytes)
    #[arg(short, long, default_value = DEFAULT_LABEL)]
    label: String,

    /// More output; repeat for storage-layer debug logs
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Logging
// ═══════════════════════════════════════════════════════════════════════════════

static LOGGER: StderrLogger = StderrLogger;
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logger(level: log::LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logger(match (args.quiet, args.verbose) {
        (true, _) => log::LevelFilter::Error,
        (false, 0) => log::LevelFilter::Warn,
        (false, 1) => log::LevelFilter::Info,
        (false, _) => log::LevelFilter::Debug,
    });

    if !args.quiet {
        println!(
            "Creating SFS image: {:?} ({} blocks, {} KiB, label \"{}\")",
            args.output,
            args.blocks,
            args.blocks as u64 * SFS_BLOCK_SIZE as u64 / 1024,
            args.label
        );
    }

    let opts = ImageOptions {
        output: args.output,
        blocks: args.blocks,
        label: args.label,
        source: args.dir,
        verbose: args.verbose > 0,
    };

    match build_image(&opts) {
        Ok((summary, stats)) => {
            if !args.quiet {
                println!(
                    "\n✅ Done. {} files ({} bytes) and {} directories imported, {} skipped.",
                    summary.files, summary.bytes, summary.directories, summary.skipped
                );
                println!(
                    "   {} of {} blocks free, {} of {} inodes free",
                    stats.free_blocks, stats.total_blocks, stats.free_inodes, stats.total_inodes
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("mkfs: {}", e);
            ExitCode::FAILURE
        }
    }
}
