use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vigil", about = "Vigil threat-intelligence store migration CLI", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to config file (default: ./vigil.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate entity stores to a new index generation
    Migrate {
        /// Migration run identifier
        #[arg(long)]
        id: String,

        /// Target index generation prefix (e.g. "2.0.0")
        #[arg(long)]
        prefix: String,

        /// Entity types to migrate, comma-separated (default: all configured)
        #[arg(long, value_delimiter = ',')]
        stores: Vec<String>,

        /// Actually execute; without this flag the plan is printed and
        /// nothing is persisted
        #[arg(long)]
        confirm: bool,

        /// Resume an existing run instead of initializing a new one
        #[arg(long)]
        restart: bool,
    },

    /// Show the state of a migration run
    Status {
        /// Migration run identifier
        #[arg(long)]
        id: String,
    },
}
