//! Command-line interface for Bosun
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Bosun - connectivity watchdog with cooldown-gated remediation
#[derive(Parser)]
#[command(name = "bosun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "bosun.toml")]
    pub config: PathBuf,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the Warden and monitor until interrupted
    ///
    /// SIGUSR1 evaluates immediately, SIGUSR2 toggles pause.
    Run,

    /// Run a single evaluation and exit (0 when healthy)
    Check {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Run the health probe once without remediating
    Probe {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remediate now, ignoring cooldown, then verify
    Remediate {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration
    Validate,

    /// Generate shell completions
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "bosun", &mut std::io::stdout());
    }
}
