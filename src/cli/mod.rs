//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for dashclone using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// dashclone - copy Metabase dashboards between instances
#[derive(Parser, Debug)]
#[command(name = "dashclone")]
#[command(version, about, long_about = None)]
#[command(author = "dashclone Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "dashclone.toml", env = "DASHCLONE_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "DASHCLONE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy dashboards, questions or collections to the destination
    ///
    /// Roots are copied grouped by flag: --dashboard, --question,
    /// --collection, --root, then --collection-dashboards. Within a flag the
    /// command-line order is kept.
    Copy(commands::copy::CopyArgs),

    /// List items of a collection
    List(commands::list::ListArgs),

    /// Show the ID mapping cache of the configured instance pair
    Status(commands::status::StatusArgs),

    /// Remove entries from the ID mapping cache
    Forget(commands::forget::ForgetArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
