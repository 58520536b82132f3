//! Command-line argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ledger_core::CodecConfig;

#[derive(Parser)]
#[command(name = "ledger-cache")]
#[command(version, about = "Inspect and validate Ledger binary journal caches", long_about = None)]
pub struct Cli {
    /// Expect the guarded image variant (strings bracketed by guard words)
    #[arg(long = "guards", global = true)]
    pub guards: bool,

    /// Treat source files that no longer exist as unchanged
    #[arg(long = "trust-missing", global = true)]
    pub trust_missing: bool,

    /// Print debug logging and full error chains
    #[arg(long = "verbose", short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Describe a cache image without validating it
    Info {
        /// Cache image to inspect
        cache: PathBuf,
    },
    /// Check whether a cache image is fresh for a journal file
    Check {
        /// Cache image to check
        cache: PathBuf,

        /// Primary journal file the cache must belong to
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
}

impl Cli {
    /// Codec options from the environment, overridden by flags
    pub fn codec_config(&self) -> CodecConfig {
        let mut config = CodecConfig::from_env();
        if self.guards {
            config = config.with_guards(true);
        }
        if self.trust_missing {
            config = config.with_missing_source_is_stale(false);
        }
        config
    }
}
