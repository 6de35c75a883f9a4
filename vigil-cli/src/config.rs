use crate::error::{CliError, CliResult};
use std::path::{Path, PathBuf};
use vigil_migration::MigrationConfig;

const CONFIG_FILE: &str = "vigil.toml";

/// Resolve the config path: an explicit `--config` wins, otherwise
/// `./vigil.toml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(CONFIG_FILE),
    }
}

/// Load and parse the migration configuration
///
/// Fails closed: unknown endpoints or malformed store definitions are
/// reported before anything touches the document store.
pub fn load_config(path: &Path) -> CliResult<MigrationConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        CliError::Config(format!("cannot read config {}: {e}", path.display()))
    })?;
    toml::from_str(&raw).map_err(|e| {
        CliError::Config(format!("cannot parse config {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_parses_stores() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vigil.toml");
        std::fs::write(
            &path,
            r#"
batch_size = 50

[conn]
endpoint = "http://localhost:9200"

[stores.indicator]
indexname = "intel_indicator"

[stores.indicator.settings]
number_of_shards = 5
number_of_replicas = 1

[stores.event]
indexname = "intel_event"
"#,
        )
        .expect("write config");

        let config = load_config(&path).expect("config should parse");
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.stores.len(), 2);
        assert_eq!(config.stores["indicator"].indexname, "intel_indicator");
        assert_eq!(
            config.stores["indicator"].settings["number_of_shards"],
            serde_json::json!(5)
        );
    }

    #[test]
    fn test_missing_config_is_a_config_error() {
        let result = load_config(Path::new("/nonexistent/vigil.toml"));
        assert!(matches!(result, Err(CliError::Config(_))));
    }
}
