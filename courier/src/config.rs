//! Locating and loading the RON configuration file

use std::path::{Path, PathBuf};

use crate::controller::Courier;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "COURIER_CONFIG";

fn default_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./courier.config.ron"),
        PathBuf::from("/etc/courier/courier.config.ron"),
    ]
}

/// Find the configuration file using the following precedence:
/// 1. `COURIER_CONFIG` environment variable
/// 2. ./courier.config.ron (current working directory)
/// 3. /etc/courier/courier.config.ron (system-wide config)
///
/// # Errors
///
/// If `COURIER_CONFIG` names a missing file, or no candidate exists.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    locate(
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        &default_paths(),
    )
}

fn locate(env_path: Option<PathBuf>, default_paths: &[PathBuf]) -> anyhow::Result<PathBuf> {
    if let Some(path) = env_path {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
    }

    for path in default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

/// Read and parse a configuration file
///
/// # Errors
///
/// If the file cannot be read or is not a valid `Courier` document.
pub fn load(path: &Path) -> anyhow::Result<Courier> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config from {}: {e}", path.display()))?;

    ron::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid config in {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_path_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let explicit = dir.path().join("explicit.ron");
        let fallback = dir.path().join("fallback.ron");
        std::fs::write(&explicit, "()").unwrap();
        std::fs::write(&fallback, "()").unwrap();

        let found = locate(Some(explicit.clone()), &[fallback]).unwrap();
        assert_eq!(found, explicit);
    }

    #[test]
    fn missing_env_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = dir.path().join("fallback.ron");
        std::fs::write(&fallback, "()").unwrap();

        let err = locate(Some(dir.path().join("missing.ron")), &[fallback]).unwrap_err();
        assert!(err.to_string().contains("non-existent"));
    }

    #[test]
    fn first_existing_default_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.ron");
        let present = dir.path().join("present.ron");
        std::fs::write(&present, "()").unwrap();

        assert_eq!(locate(None, &[absent.clone(), present.clone()]).unwrap(), present);
        assert!(locate(None, &[absent]).is_err());
    }

    #[test]
    fn load_parses_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.config.ron");
        std::fs::write(&path, "Courier(delivery: (batch_size: 5))").unwrap();

        let courier = load(&path).unwrap();
        assert_eq!(courier.delivery().batch_size, 5);

        std::fs::write(&path, "Courier(delivery: (batch_size: \"five\"))").unwrap();
        assert!(load(&path).is_err());
    }
}
