use crate::config::{ChainPreset, Config};
use color_eyre::eyre::{Context, Result};
use log::info;
use std::fs::File;
use std::path::Path;

/// Load and parse configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .with_context(|| format!("Failed to open config file {}", config_path.display()))?;

    let config: Config = serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Load the config file when one is given, otherwise start from defaults
pub fn load_or_default(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => load_config(path),
        None => Ok(Config::default()),
    }
}

/// CLI arguments that override values from the YAML file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub preset: Option<ChainPreset>,
    pub rpc_url: Option<String>,
    pub max_attempts: Option<u32>,
    pub log_level: Option<String>,
}

/// Apply CLI overrides to a configuration
pub fn apply_overrides(config: &mut Config, overrides: &CliOverrides) -> Result<()> {
    if let Some(preset) = overrides.preset {
        config.chain.preset = Some(preset);
        // a preset on the command line replaces a URL from the file
        if overrides.rpc_url.is_none() {
            config.chain.rpc_url = None;
        }
    }

    if let Some(url) = &overrides.rpc_url {
        config.chain.rpc_url = Some(url.clone());
    }

    if let Some(attempts) = overrides.max_attempts {
        config.retry.max_attempts = Some(attempts);
    }

    if let Some(level) = &overrides.log_level {
        config.general.log_level = Some(level.clone());
    }

    // Re-validate after applying overrides
    config.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "chain:\n  rpc_url: \"http://127.0.0.1:26657\"\nscan:\n  start_height: 10\n  end_height: 20"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.rpc_url().as_deref(), Some("http://127.0.0.1:26657"));
        assert_eq!(config.scan.unwrap().end_height, Some(20));
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chain:\n  rpc_url: \"ftp://example\"").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_preset_override_clears_file_url() {
        let mut config = Config::default();
        config.chain.rpc_url = Some("http://localhost:26657".to_string());

        let overrides = CliOverrides {
            preset: Some(ChainPreset::Celestia),
            ..Default::default()
        };
        apply_overrides(&mut config, &overrides).unwrap();
        assert_eq!(
            config.rpc_url().as_deref(),
            Some("https://celestia-mainnet-rpc.itrocket.net")
        );
    }

    #[test]
    fn test_attempt_override() {
        let mut config = Config::default();
        let overrides = CliOverrides {
            max_attempts: Some(3),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        apply_overrides(&mut config, &overrides).unwrap();
        assert_eq!(config.retry.max_attempts, Some(3));
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
    }
}
