//! toolpin - declarative CLI tool version manager
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
//!
//! Command-line front end for `toolpin-core`: argument parsing, logging
//! setup, and the wiring between a manifest on disk and the installer.

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Version reported by `--version` (derived from git tags at build time).
pub const VERSION: &str = env!("TOOLPIN_VERSION");

/// Top-level arguments.
#[derive(Debug, Parser)]
#[command(name = "toolpin")]
#[command(author, version = VERSION, about = "toolpin - declarative CLI tool version manager")]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace). Overrides RUST_LOG.
    #[arg(long, global = true, env = "TOOLPIN_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Path of the manifest (default: nearest toolpin.yaml)
    #[arg(short, long, global = true, env = "TOOLPIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install every package in the manifest
    #[command(alias = "i")]
    Install {
        /// Only create command links; install packages lazily
        #[arg(short = 'l', long)]
        only_link: bool,
        /// Fail instead of repairing missing executable bits
        #[arg(long)]
        test: bool,
        /// Policy file restricting registries and packages
        #[arg(long, env = "TOOLPIN_POLICY_CONFIG")]
        policy: Option<PathBuf>,
        /// Proxy package as NAME@VERSION, from the standard registry
        #[arg(long, env = "TOOLPIN_PROXY")]
        proxy: Option<String>,
        /// Maximum number of concurrent installs
        #[arg(long)]
        max_parallelism: Option<usize>,
    },
    /// Print the absolute path of a command's executable
    Which {
        /// Command name
        command: String,
    },
    /// Trust or ignore the repository policy file
    Policy {
        /// What to do with the policy file.
        #[command(subcommand)]
        action: PolicyCommand,
    },
}

/// `toolpin policy` subcommands.
#[derive(Debug, Subcommand)]
pub enum PolicyCommand {
    /// Apply the policy file from now on, until it changes
    Allow {
        /// Policy file (default: the one next to the manifest)
        path: Option<PathBuf>,
    },
    /// Ignore the policy file without warning
    Deny {
        /// Policy file (default: the one next to the manifest)
        path: Option<PathBuf>,
    },
}
