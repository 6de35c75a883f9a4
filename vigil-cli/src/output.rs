//! Human-readable rendering of migration state

use colored::Colorize;
use vigil_migration::MigrationState;

/// Print a per-entity-type progress summary to stdout.
pub fn print_state(state: &MigrationState) {
    println!(
        "migration {} (created {})",
        state.id.bold(),
        state.created.to_rfc3339()
    );
    for (entity_type, entry) in &state.stores {
        let status = if entry.completed.is_some() {
            "completed".green().to_string()
        } else if entry.started.is_some() {
            "in progress".yellow().to_string()
        } else {
            "not started".dimmed().to_string()
        };
        println!(
            "  {:<14} {:>9} / {:<9} {} → {}  [{}]",
            entity_type,
            entry.target.migrated,
            entry.source.total,
            entry.source.index,
            entry.target.index,
            status
        );
    }
}
