use crate::error::{CliError, CliResult};
use crate::output;
use colored::Colorize;
use std::sync::Arc;
use vigil_migration::{MigrationConfig, Migrator};
use vigil_store::{Conn, HttpStore};

pub async fn run(
    config: MigrationConfig,
    id: &str,
    prefix: &str,
    stores: Vec<String>,
    confirm: bool,
    restart: bool,
) -> CliResult<()> {
    let entity_types: Vec<String> = if stores.is_empty() {
        config.stores.keys().cloned().collect()
    } else {
        stores
    };
    if entity_types.is_empty() {
        return Err(CliError::Usage(
            "no entity stores configured and none given via --stores".to_string(),
        ));
    }

    let conn = Conn::connect(config.conn.clone())?;
    let migrator = Migrator::new(Arc::new(HttpStore::new(conn)), config);

    if restart {
        let state = migrator.get_migration(id).await?;
        println!(
            "{} resuming migration {} ({} entity types)",
            "→".cyan(),
            id.bold(),
            state.stores.len()
        );
    } else {
        let state = migrator.init_migration(id, prefix, &entity_types, confirm).await?;
        if !confirm {
            println!(
                "{} dry run for migration {} — pass --confirm to execute",
                "→".cyan(),
                id.bold()
            );
            output::print_state(&state);
            return Ok(());
        }
        println!(
            "{} initialized migration {} ({} entity types)",
            "→".cyan(),
            id.bold(),
            state.stores.len()
        );
    }

    let state = migrator.run(id).await?;
    output::print_state(&state);
    if state.is_complete() {
        println!("{} migration {} complete", "✓".green().bold(), id.bold());
    }
    Ok(())
}
