//! Storage reporting tool.
//!
//! Commands:
//!   - `current`: walk the data directory now and show sizes per category
//!   - `history`: show the size ledger, optionally for one category
//!   - `growth`: per-category growth between first and last ledger record
//!   - `help`: usage

use std::path::PathBuf;

use clap::{CommandFactory, Parser, ValueEnum};

use hl_archiver::config::{config_path, load_config};
use hl_archiver::report::{render_current, render_growth, render_history};
use hl_archiver::storage::StorageEngine;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "storage-stats",
    version,
    about = "Show storage size, size history and growth of the archive",
    after_help = "Examples:\n  storage-stats current\n  storage-stats history trades/BTC\n  storage-stats growth candle/BTC/1m"
)]
struct Cli {
    /// What to show
    #[arg(value_enum, default_value_t = Command::Current)]
    command: Command,

    /// Category label (e.g. `trades/BTC`) or `all`
    #[arg(default_value = "all")]
    category: String,

    /// Data directory; defaults to the archiver's configured one
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Command {
    Current,
    History,
    Growth,
    Help,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => load_config(config_path())?.data_dir,
    };
    let storage = StorageEngine::open(&data_dir)?;

    let category = match cli.category.as_str() {
        "all" => None,
        other => Some(other),
    };

    match cli.command {
        Command::Current => println!("{}", render_current(&storage.current_size_snapshot()?)),
        Command::History => println!("{}", render_history(&storage.history(category), category)),
        Command::Growth => println!("{}", render_growth(&storage.history(category), category)),
        Command::Help => Cli::command().print_help()?,
    }
    Ok(())
}
