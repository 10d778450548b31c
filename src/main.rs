//! CLI entrypoint for `mentalist`.
//!
//! Loads the reference tables and a chain document (or the default chain),
//! waits for background word counts, prints a terminal summary, and
//! optionally writes the wordlist, a hashcat rule file, or the chain itself.
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use log::{LevelFilter, error, info, warn};
use mentalist::{
    engine::Engine, export::WriteOutcome, io::DEFAULT_MMAP_THRESHOLD_BYTES,
    report::render_summary,
};

#[derive(Parser, Debug)]
#[command(
    name = "mentalist",
    version,
    about = "Wordlist and hashcat rule generator driven by chains of word transforms"
)]
struct Args {
    /// Chain document (JSON). Without it the default dictionary chain is used
    #[arg(short = 'c', long = "chain")]
    chain: Option<PathBuf>,

    /// Directory holding the dictionary and reference tables ($DATA_DIR)
    #[arg(short = 'd', long = "data-dir", default_value = "data")]
    data_dir: PathBuf,

    /// Write the generated wordlist to this file
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Write the chain as hashcat rules to this file
    #[arg(short = 'r', long = "rules")]
    rules: Option<PathBuf>,

    /// Comment line for the rule file header (repeatable)
    #[arg(long = "comment")]
    comments: Vec<String>,

    /// Only write the base words, skipping every later node
    #[arg(long = "basewords-only")]
    basewords_only: bool,

    /// Save the loaded chain as a JSON document
    #[arg(long = "save-chain")]
    save_chain: Option<PathBuf>,

    /// Override mmap threshold in bytes. If zero, disable mmap.
    #[arg(long = "mmap-threshold", default_value_t = DEFAULT_MMAP_THRESHOLD_BYTES)]
    mmap_threshold: u64,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Control color output (auto, always, never)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Suppress summary output (still writes outputs if requested)
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

const ASCII_TITLE: &str = r#"
 __  __            _        _ _     _
|  \/  | ___ _ __ | |_ __ _| (_)___| |_
| |\/| |/ _ \ '_ \| __/ _` | | / __| __|
| |  | |  __/ | | | || (_| | | \__ \ |_
|_|  |_|\___|_| |_|\__\__,_|_|_|___/\__|
"#;

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

fn verify_inputs(args: &Args) -> Result<()> {
    if let Some(chain) = &args.chain {
        if !chain.exists() {
            bail!("chain file not found: {}", chain.display());
        }
    }
    if !args.data_dir.is_dir() {
        warn!(
            "data directory not found: {} (continuing with empty reference tables)",
            args.data_dir.display()
        );
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);
    // Configure color policy
    match args.color {
        ColorChoice::Always => {
            colored::control::set_override(true);
        }
        ColorChoice::Never => {
            colored::control::set_override(false);
        }
        ColorChoice::Auto => {}
    }
    if let Err(e) = verify_inputs(&args) {
        error!("{}", e);
        std::process::exit(2);
    }

    let mut engine = match Engine::load_tables(&args.data_dir) {
        Ok(engine) => engine,
        Err(e) => {
            error!("failed to load reference tables: {}", e);
            std::process::exit(3);
        }
    };
    let threshold = if args.mmap_threshold == 0 {
        u64::MAX
    } else {
        args.mmap_threshold
    };
    engine.set_mmap_threshold(threshold);

    let loaded = match &args.chain {
        Some(path) => engine.load_chain(path),
        None => engine.load_default_chain(),
    };
    if let Err(e) = loaded {
        error!("failed to load chain: {}", e);
        std::process::exit(3);
    }
    engine.wait_for_counts();

    if !args.quiet {
        // Print banner and summary
        println!("{}", ASCII_TITLE.bold().green());
        println!("{}", render_summary(&engine.stats()));
    }

    if let Some(path) = &args.save_chain {
        if let Err(e) = engine.save_chain(path) {
            error!("failed to save chain to {}: {}", path.display(), e);
            std::process::exit(4);
        }
        info!("saved chain to {}", path.display());
    }

    if let Some(path) = &args.rules {
        if let Err(e) = engine.to_hashcat(path, &args.comments) {
            error!("failed to write {}: {}", path.display(), e);
            std::process::exit(5);
        }
    }

    if let Some(path) = &args.output {
        let quiet = args.quiet;
        let result = engine.process(path, args.basewords_only, |pct| {
            if !quiet && pct % 10 == 0 {
                info!("{}% complete", pct);
            }
        });
        match result {
            Ok(WriteOutcome::Completed { .. }) => {}
            Ok(WriteOutcome::Cancelled) => {
                warn!("processing cancelled; {} was removed", path.display());
            }
            Err(e) => {
                error!("failed to write {}: {}", path.display(), e);
                std::process::exit(6);
            }
        }
    }
}
