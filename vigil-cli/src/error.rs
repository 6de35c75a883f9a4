use colored::Colorize;
use std::fmt;
use std::process;

/// Exit codes for the CLI.
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Unified error type for CLI operations.
#[derive(Debug)]
pub enum CliError {
    /// Error from the migration engine.
    Migration(vigil_migration::MigrationError),
    /// Error from the document-store layer.
    Store(vigil_store::StoreError),
    /// Configuration file issues.
    Config(String),
    /// Argument / usage errors.
    Usage(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Migration(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Store(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Config(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::Usage(msg) => write!(
                f,
                "{} {msg}\n  {} see 'vigil --help'",
                "error:".red().bold(),
                "help:".cyan().bold(),
            ),
        }
    }
}

impl From<vigil_migration::MigrationError> for CliError {
    fn from(e: vigil_migration::MigrationError) -> Self {
        CliError::Migration(e)
    }
}

impl From<vigil_store::StoreError> for CliError {
    fn from(e: vigil_store::StoreError) -> Self {
        CliError::Store(e)
    }
}

/// Print the error and exit with the appropriate code.
pub fn exit_with_error(e: CliError) -> ! {
    eprintln!("{e}");
    let code = match e {
        CliError::Usage(_) => EXIT_USAGE,
        _ => EXIT_ERROR,
    };
    process::exit(code);
}
