//! Configuration module for mixpool-server.
//!
//! Handles loading configuration from TOML files and CLI arguments, and
//! converting it into the runtime `MixConfig` consumed by the engine.

pub mod file;

use crate::config::file::FileConfig;
use mixpool_core::config::MixConfig;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Loaded configuration result containing all parts.
#[derive(Debug)]
pub struct LoadedConfig {
    pub listen: SocketAddr,
    pub ledger_rpc_url: Url,
    pub ledger_contract: String,
    pub compute_rpc_url: Url,
    pub compute_contract: String,
    pub mix: MixConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// Reads the TOML file, applies CLI overrides, and validates the
    /// result.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        let mix = convert_mix(&file_config)?;
        validate(&file_config, &mix)?;

        Ok(LoadedConfig {
            listen: file_config.server.listen,
            ledger_rpc_url: file_config.ledger.rpc_url,
            ledger_contract: file_config.ledger.contract,
            compute_rpc_url: file_config.compute.rpc_url,
            compute_contract: file_config.compute.contract,
            mix,
        })
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn convert_mix(config: &FileConfig) -> Result<MixConfig, ConfigError> {
    let minimum_amount: u128 = config.mix.minimum_amount.parse().map_err(|_| {
        ConfigError::Validation(format!(
            "mix.minimum_amount is not a decimal amount: {}",
            config.mix.minimum_amount
        ))
    })?;
    Ok(MixConfig {
        threshold: config.mix.threshold,
        minimum_amount,
        deal_interval_blocks: config.mix.deal_interval_blocks,
        poll_interval_secs: config.mix.poll_interval_secs,
        key_retry: config.mix.key_retry,
        gas: config.mix.gas,
    })
}

fn validate(config: &FileConfig, mix: &MixConfig) -> Result<(), ConfigError> {
    if mix.threshold < 2 {
        return Err(ConfigError::Validation(
            "mix.threshold must be at least 2; a deal of one participant mixes nothing".into(),
        ));
    }
    if mix.deal_interval_blocks == 0 {
        return Err(ConfigError::Validation(
            "mix.deal_interval_blocks must be positive".into(),
        ));
    }
    if mix.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "mix.poll_interval_secs must be positive".into(),
        ));
    }
    if config.ledger.contract.is_empty() || config.compute.contract.is_empty() {
        return Err(ConfigError::Validation(
            "ledger.contract and compute.contract must be set".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    const SAMPLE: &str = r#"
        [server]
        listen = "127.0.0.1:8547"

        [ledger]
        rpc_url = "http://localhost:9545"
        contract = "0x59d3631c86bbe35ef041872d502f218a39fba150"

        [compute]
        rpc_url = "http://localhost:3346"
        contract = "0x1d1b9890d277de99fa953218d4c2cd2577bf9c42"

        [mix]
        threshold = 3
        minimum_amount = "10000000000000000000"
        deal_interval_blocks = 40
        poll_interval_secs = 5
    "#;

    fn write_config(content: &str) -> tempfile_path::TempConfig {
        tempfile_path::TempConfig::new(content)
    }

    /// Minimal temp-file helper so the loader can be exercised without
    /// extra dev-dependencies.
    mod tempfile_path {
        use std::path::PathBuf;

        pub struct TempConfig {
            pub path: PathBuf,
        }

        impl TempConfig {
            pub fn new(content: &str) -> Self {
                let path = std::env::temp_dir().join(format!(
                    "mixpool-config-test-{}.toml",
                    uuid::Uuid::new_v4()
                ));
                std::fs::write(&path, content).unwrap();
                Self { path }
            }
        }

        impl Drop for TempConfig {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    #[test]
    fn loads_a_full_config() {
        let file = write_config(SAMPLE);
        let loaded = ConfigLoader::new(&file.path, None).load().unwrap();

        assert_eq!(loaded.listen.port(), 8547);
        assert_eq!(loaded.mix.threshold, 3);
        assert_eq!(loaded.mix.minimum_amount, 10_000_000_000_000_000_000);
        assert_eq!(loaded.mix.deal_interval_blocks, 40);
        // Unspecified subsections fall back to defaults.
        assert_eq!(loaded.mix.key_retry.max_attempts, 8);
    }

    #[test]
    fn listen_override_wins() {
        let file = write_config(SAMPLE);
        let listen = "0.0.0.0:9000".parse().unwrap();
        let loaded = ConfigLoader::new(&file.path, Some(listen)).load().unwrap();
        assert_eq!(loaded.listen, listen);
    }

    #[test]
    fn rejects_sub_mixing_threshold() {
        let file = write_config(&SAMPLE.replace("threshold = 3", "threshold = 1"));
        let err = ConfigLoader::new(&file.path, None).load().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn rejects_malformed_amount() {
        let file = write_config(&SAMPLE.replace(
            "minimum_amount = \"10000000000000000000\"",
            "minimum_amount = \"ten\"",
        ));
        let err = ConfigLoader::new(&file.path, None).load().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
