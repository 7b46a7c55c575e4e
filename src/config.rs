//! Configuration management for the cross-space driver
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::contracts::ContractSetVersion;
use crate::tx::FailurePolicy;

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub core: CoreConfig,
    pub evm: EvmConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub failure: FailureConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    pub rpc_url: String,
    pub network_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvmConfig {
    pub rpc_url: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Environment variable holding the admin private key
    pub private_key_env: String,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            private_key_env: "ADMIN_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub backoff_ms: u64,
    /// Log every n-th consecutive failure
    pub log_every: u64,
    pub core_poll_secs: u64,
    pub evm_poll_ms: u64,
    pub nonce_poll_ms: u64,
    /// Unlimited when absent
    pub max_attempts: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 500,
            log_every: 10,
            core_poll_secs: 30,
            evm_poll_ms: 1000,
            nonce_poll_ms: 1000,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub storage_margin_percent: u64,
    pub fee_markup_percent: u64,
    pub evm_gas_multiplier_percent: u64,
    pub evm_gas_floor: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            storage_margin_percent: 30,
            fee_markup_percent: 5,
            evm_gas_multiplier_percent: 150,
            evm_gas_floor: 500_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FailureConfig {
    pub core: FailurePolicy,
    pub evm: FailurePolicy,
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            core: FailurePolicy::FailFast,
            evm: FailurePolicy::FailFast,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    pub manifest_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub contract_set: ContractSetVersion,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("contractAddress.json"),
            artifacts_dir: PathBuf::from("artifacts"),
            contract_set: ContractSetVersion::V2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9464
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from `CROSSSPACE_CONFIG`, or the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => env::var("CROSSSPACE_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/default.toml")),
        };

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text
    pub fn from_toml(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.core.rpc_url.is_empty() {
            anyhow::bail!("Core space has no RPC URL configured");
        }
        if self.evm.rpc_url.is_empty() {
            anyhow::bail!("EVM space has no RPC URL configured");
        }
        if self.retry.log_every == 0 {
            anyhow::bail!("retry.log_every must be at least 1");
        }
        if self.retry.max_attempts == Some(0) {
            anyhow::bail!("retry.max_attempts must be at least 1 when set");
        }
        if self.failure.core == FailurePolicy::LogAndContinue {
            tracing::warn!("Core execution failures will be logged and the workflow continued");
        }

        Ok(())
    }

    /// Read the admin private key from the configured environment variable
    pub fn private_key(&self) -> Result<String> {
        let key = env::var(&self.wallet.private_key_env).with_context(|| {
            format!(
                "No wallet configured. Set {}",
                self.wallet.private_key_env
            )
        })?;
        Ok(key.trim_start_matches("0x").to_string())
    }
}

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [core]
        rpc_url = "http://localhost:12537"
        network_id = 1

        [evm]
        rpc_url = "http://localhost:8545"
        chain_id = 71
    "#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("CROSSSPACE_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${CROSSSPACE_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_defaults_follow_observed_policy() {
        let settings = Settings::from_toml(MINIMAL).unwrap();
        assert_eq!(settings.retry.backoff_ms, 500);
        assert_eq!(settings.retry.log_every, 10);
        assert_eq!(settings.retry.core_poll_secs, 30);
        assert_eq!(settings.retry.max_attempts, None);
        assert_eq!(settings.gas.storage_margin_percent, 30);
        assert_eq!(settings.gas.evm_gas_floor, 500_000);
        assert_eq!(settings.failure.evm, FailurePolicy::FailFast);
        assert_eq!(settings.deployment.contract_set, ContractSetVersion::V2);
        assert_eq!(settings.wallet.private_key_env, "ADMIN_KEY");
        assert!(!settings.metrics.enabled);
    }

    #[test]
    fn test_overrides_and_validation() {
        let text = format!(
            "{}\n[failure]\ncore = \"log_and_continue\"\n\n[deployment]\ncontract_set = \"v1\"\n",
            MINIMAL
        );
        let settings = Settings::from_toml(&text).unwrap();
        assert_eq!(settings.failure.core, FailurePolicy::LogAndContinue);
        assert_eq!(settings.failure.evm, FailurePolicy::FailFast);
        assert_eq!(settings.deployment.contract_set, ContractSetVersion::V1);

        let bad = format!("{}\n[retry]\nlog_every = 0\n", MINIMAL);
        assert!(Settings::from_toml(&bad).is_err());
    }
}
