//! Diagnostic tool for Ledger binary journal caches
//!
//! `info` describes what an image holds; `check` tells whether an image can
//! stand in for a journal file. Both exit with status 1 when the file is not
//! a usable cache.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::Parser;
use ledger_core::binary::{ImageFormat, SourceRecord};
use ledger_core::{BinaryReader, CodecConfig, Journal, LoadOutcome};
use log::{debug, LevelFilter};

mod cli;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    let config = cli.codec_config();
    debug!("Codec options: {config:?}");

    let result = match &cli.command {
        Command::Info { cache } => info(cache, config),
        Command::Check { cache, file } => check(cache, file, config),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            if cli.verbose {
                for cause in e.chain().skip(1) {
                    eprintln!("Caused by: {}", cause);
                }
            }
            process::exit(2);
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file =
        File::open(path).with_context(|| format!("cannot open cache {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn info(path: &Path, config: CodecConfig) -> Result<i32> {
    let mut stream = open(path)?;
    let Some(format) = ImageFormat::detect(&mut stream)? else {
        println!("not a ledger cache");
        return Ok(1);
    };

    let reader = BinaryReader::new(format.config(config));
    let sources = reader
        .read_sources(&mut stream)
        .with_context(|| format!("cannot read source list of {}", path.display()))?
        .unwrap_or_default();

    let mut journal = Journal::new();
    reader
        .load(&mut stream, &mut journal, None, None)
        .with_context(|| format!("cannot load {}", path.display()))?;

    println!("format: {format}");
    println!("sources: {}", sources.len());
    for source in &sources {
        println!("  {}  {}", source.path.display(), describe_mtime(source));
    }
    println!("accounts: {}", journal.account_count());
    println!("commodities: {}", journal.commodities.len());
    println!("entries: {}", journal.entry_count());
    println!("transactions: {}", journal.transaction_count());
    Ok(0)
}

fn check(path: &Path, file: &Path, config: CodecConfig) -> Result<i32> {
    let mut stream = open(path)?;
    let Some(format) = ImageFormat::detect(&mut stream)? else {
        println!("not a ledger cache");
        return Ok(1);
    };
    let expected = if config.guards { ImageFormat::Guarded } else { ImageFormat::Plain };
    if format != expected {
        println!("not a ledger cache: image uses the {format} variant, expected {expected}");
        if format == ImageFormat::Guarded {
            println!("hint: run with --guards");
        }
        return Ok(1);
    }

    let reader = BinaryReader::new(config);
    let mut journal = Journal::new();
    let outcome = reader
        .load_outcome(&mut stream, &mut journal, Some(file), None)
        .with_context(|| format!("cannot load {}", path.display()))?;

    match outcome {
        LoadOutcome::Loaded(count) => {
            println!("fresh: {count} entries");
            Ok(0)
        }
        LoadOutcome::Stale(reason) => {
            println!("stale: {reason}");
            Ok(1)
        }
        LoadOutcome::FormatMismatch => {
            println!("not a ledger cache");
            Ok(1)
        }
    }
}

fn describe_mtime(source: &SourceRecord) -> String {
    match Utc.timestamp_opt(source.mtime, 0).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => source.mtime.to_string(),
    }
}
