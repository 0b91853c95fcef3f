//! Data cleanup tool.
//!
//! Deletes archived files but keeps the directory structure, either for
//! the whole data directory or only for the named subdirectories.

use std::path::PathBuf;

use clap::Parser;

use hl_archiver::cleanup::clear_files;
use hl_archiver::config::{config_path, load_config};
use hl_archiver::util::format_size;

#[derive(Parser)]
#[command(
    name = "clear-data",
    version,
    about = "Delete archived files while keeping the directory structure"
)]
struct Cli {
    /// Only show what would be deleted
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Data directory; defaults to the archiver's configured one
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Subdirectories to clear, relative to the data directory (e.g. `trades candle/BTC`)
    dirs: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => load_config(config_path())?.data_dir,
    };

    println!(
        "Starting data cleanup process{}...",
        if cli.dry_run { " (DRY RUN)" } else { "" }
    );
    if cli.dirs.is_empty() {
        println!("Clearing all data directories");
    } else {
        println!("Clearing only specified directories: {}", cli.dirs.join(", "));
    }

    let summary = clear_files(&data_dir, &cli.dirs, cli.dry_run)?;

    let verb = if cli.dry_run { "Would delete" } else { "Deleted" };
    for file in &summary.removed {
        println!(
            "{} file: {} ({})",
            verb,
            file.path.display(),
            format_size(file.bytes as f64)
        );
    }

    println!(
        "{} {} files ({})",
        if cli.dry_run { "Would have deleted" } else { "Deleted" },
        summary.files(),
        format_size(summary.bytes() as f64)
    );
    println!("Note: Directory structure is preserved.");
    Ok(())
}
