//! Configuration management for the CLI
//!
//! Layers, lowest precedence first: built-in defaults, the user file
//! (`~/.config/fleet-advisor/config.toml`), an explicit `--config` file,
//! `FLEET_ADVISOR_*` environment variables, then command-line flags.

use advisor_lib::RunConfig;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "FLEET_ADVISOR";

/// Location of the per-user configuration file
pub fn user_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("fleet-advisor").join("config.toml"))
}

/// Build the run configuration from files and environment
pub fn load(explicit: Option<&Path>) -> Result<RunConfig> {
    let mut builder = Config::builder();

    if let Some(user) = user_config_path() {
        builder = builder.add_source(File::from(user).required(false));
    }
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file {} does not exist", path.display());
        }
        builder = builder.add_source(File::from(path.to_path_buf()).required(true));
    }

    let settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to load configuration")?;

    settings
        .try_deserialize::<RunConfig>()
        .context("Failed to parse configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "lookback_days = 14\nworkspace_filter = \"1001\"\n\n[generation_minimums]\nd = 6"
        )
        .unwrap();

        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.lookback_days, 14);
        assert_eq!(config.workspace_filter, "1001");
        assert_eq!(config.generation_minimums.get("d"), Some(&6));
        assert_eq!(config.driver_cpu_threshold, 16);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = load(Some(Path::new("/nonexistent/fleet-advisor.toml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_user_config_path_is_namespaced() {
        if let Some(path) = user_config_path() {
            assert!(path.ends_with("fleet-advisor/config.toml"));
        }
    }
}
