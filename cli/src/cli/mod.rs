//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::export::Service;

pub mod commands;

/// hut - command-line client for sr.ht
#[derive(Parser, Debug)]
#[command(name = "hut", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: <config dir>/hut/config.json)
    #[arg(long, global = true, env = "HUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Instance to use (default: first configured instance)
    #[arg(long, global = true, env = "HUT_INSTANCE")]
    pub instance: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export account data from every service into a directory
    Export {
        /// Target directory; re-running resumes an interrupted export
        dir: PathBuf,

        /// Only export these services (repeatable)
        #[arg(long = "service", value_enum)]
        services: Vec<Service>,
    },

    /// Recreate exported resources on the selected instance
    Import {
        /// Directory produced by `hut export`
        dir: PathBuf,
    },

    /// builds.sr.ht
    Builds {
        #[command(subcommand)]
        command: BuildsCommands,
    },

    /// hg.sr.ht
    Hg {
        #[command(subcommand)]
        command: HgCommands,
    },

    /// Print version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BuildsCommands {
    /// Stream a job's logs until it finishes
    Follow {
        /// Job ID
        job_id: i64,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum HgCommands {
    /// Export a single repository
    Export {
        /// Repository name
        repo: String,
        /// Target directory
        dir: PathBuf,
    },

    /// Import a single exported repository
    Import {
        /// Repository directory (the one holding info.json)
        dir: PathBuf,
    },
}
