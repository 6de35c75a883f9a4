use crate::error::CliResult;
use crate::output;
use std::sync::Arc;
use vigil_migration::{MigrationConfig, Migrator};
use vigil_store::{Conn, HttpStore};

pub async fn run(config: MigrationConfig, id: &str) -> CliResult<()> {
    let conn = Conn::connect(config.conn.clone())?;
    let migrator = Migrator::new(Arc::new(HttpStore::new(conn)), config);
    let state = migrator.get_migration(id).await?;
    output::print_state(&state);
    Ok(())
}
