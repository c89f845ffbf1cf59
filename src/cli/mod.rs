use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::session::{NODE_VERSION_ENV, TSCONFIG_PATH_ENV};

pub mod commands;
pub mod logging;
pub mod output;

#[derive(Parser)]
#[command(
    name = "tsloader",
    version,
    about = "TypeScript-aware module resolution and loading for Node's ESM hooks"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Explicit tsconfig path (skips discovery)
    #[arg(long, global = true, env = TSCONFIG_PATH_ENV)]
    pub tsconfig: Option<PathBuf>,

    /// Host Node.js version used to pick capabilities (default: latest)
    #[arg(long, global = true, env = NODE_VERSION_ENV)]
    pub node_version: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a specifier and print the target URL and format
    Resolve {
        /// Module specifier, as written in an import
        specifier: String,
        /// Importing file (default: resolve as the entry point)
        #[arg(long)]
        from: Option<PathBuf>,
        /// Export conditions, in priority order (default: node, import)
        #[arg(long = "condition")]
        conditions: Vec<String>,
    },

    /// Resolve and load a specifier, printing the final source
    Load {
        /// Module specifier, as written in an import
        specifier: String,
        /// Importing file (default: resolve as the entry point)
        #[arg(long)]
        from: Option<PathBuf>,
        /// Write dependency notifications to stderr as JSON lines
        #[arg(long)]
        report_dependencies: bool,
    },

    /// Show the project configuration that applies to a path
    Config {
        /// File or directory (default: current directory)
        #[arg(long)]
        from: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Compact,
}
