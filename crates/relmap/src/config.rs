//! Configuration file handling for relmap.
//!
//! Looks for `.config/relmap.styx` in the current directory or any parent directory.

pub use relmap_config::Config;

use std::path::{Path, PathBuf};
use thiserror::Error;

const CONFIG_FILE: &str = ".config/relmap.styx";

/// Load configuration from `.config/relmap.styx`, searching up the directory tree.
pub fn load() -> Result<(Config, PathBuf), ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Path) -> Result<(Config, PathBuf), ConfigError> {
    let config_path = find_config_file(start)?;
    tracing::debug!(path = %config_path.display(), "loading config");
    let content =
        std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io(e.to_string()))?;
    let config = parse(&content)?;
    Ok((config, config_path))
}

/// Parse configuration text.
pub fn parse(content: &str) -> Result<Config, ConfigError> {
    facet_styx::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn find_config_file(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No .config/relmap.styx found in current directory or any parent")]
    NotFound,

    #[error("Failed to read .config/relmap.styx: {0}")]
    Io(String),

    #[error("Failed to parse .config/relmap.styx: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_config_in_parent() {
        let root = std::env::temp_dir().join(format!("relmap-config-{}", std::process::id()));
        let nested = root.join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(root.join(".config")).unwrap();
        std::fs::write(root.join(CONFIG_FILE), "database blog\n").unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, root.join(CONFIG_FILE));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_parse_config() {
        let config = parse("database blog\nignored_schemas (public old)\n").unwrap();
        assert_eq!(config.database_or("fallback"), "blog");
        assert_eq!(config.ignored_schemas, ["public", "old"]);

        let unnamed = parse("ignored_schemas (legacy)\n").unwrap();
        assert_eq!(unnamed.database, None);
        assert_eq!(unnamed.database_or("fallback"), "fallback");
    }

    #[test]
    fn test_load_from_nested_directory() {
        let root = std::env::temp_dir().join(format!("relmap-load-{}", std::process::id()));
        let nested = root.join("src/model");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::create_dir_all(root.join(".config")).unwrap();
        std::fs::write(root.join(CONFIG_FILE), "database shop\n").unwrap();

        let (config, path) = load_from(&nested).unwrap();
        assert_eq!(config.database.as_deref(), Some("shop"));
        assert!(config.ignored_schemas.is_empty());
        assert_eq!(path, root.join(CONFIG_FILE));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let err = parse("ignored_schemas {").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("Failed to parse .config/relmap.styx"));
    }

    #[test]
    fn test_missing_config_message() {
        assert_eq!(
            ConfigError::NotFound.to_string(),
            "No .config/relmap.styx found in current directory or any parent"
        );
    }
}
