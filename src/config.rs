use alloy::primitives::U256;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::ethereum::contract::{GasPolicy, DEFAULT_GAS_LIMIT, MIN_GAS_PRICE};
use crate::ethereum::provider::{ReceiptPolicy, TransportOptions};
use crate::ethereum::utils;

pub const DEFAULT_PRIVATE_KEY_ENV: &str = "INVOKER_PRIVATE_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub default_network: String,
    pub networks: HashMap<String, NetworkConfig>,
    #[serde(default)]
    pub receipt: ReceiptConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    /// Expected chain id; a node reporting another one is logged.
    pub chain_id: u64,
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub gas: GasConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    pub default_gas_limit: u64,
    /// Wei
    pub min_gas_price: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            default_gas_limit: DEFAULT_GAS_LIMIT,
            min_gas_price: MIN_GAS_PRICE as u64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptConfig {
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
        }
    }
}

/// Where the signing key comes from. The key itself never lives in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    pub private_key_env: String,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            private_key_env: DEFAULT_PRIVATE_KEY_ENV.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub allow_write_operations: bool,
    /// Wei, decimal or `0x` hex
    pub max_transaction_value: Option<String>,
}

fn network(rpc_url: &str, chain_id: u64, explorer_url: Option<&str>) -> NetworkConfig {
    NetworkConfig {
        rpc_url: rpc_url.to_string(),
        chain_id,
        explorer_url: explorer_url.map(str::to_string),
        gas: GasConfig::default(),
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = HashMap::new();

        networks.insert(
            "ethereum".to_string(),
            network(
                "https://eth-mainnet.g.alchemy.com/v2/demo",
                1,
                Some("https://etherscan.io"),
            ),
        );
        networks.insert(
            "sepolia".to_string(),
            network(
                "https://eth-sepolia.g.alchemy.com/v2/demo",
                11155111,
                Some("https://sepolia.etherscan.io"),
            ),
        );
        networks.insert(
            "polygon".to_string(),
            network(
                "https://polygon-mainnet.g.alchemy.com/v2/demo",
                137,
                Some("https://polygonscan.com"),
            ),
        );
        networks.insert(
            "arbitrum".to_string(),
            network(
                "https://arb-mainnet.g.alchemy.com/v2/demo",
                42161,
                Some("https://arbiscan.io"),
            ),
        );
        networks.insert(
            "local".to_string(),
            network("http://127.0.0.1:8545", 31337, None),
        );

        Self {
            default_network: "ethereum".to_string(),
            networks,
            receipt: ReceiptConfig::default(),
            transport: TransportConfig::default(),
            signer: SignerConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {:?}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {:?}: {}", path, e))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow!("Failed to create config directory {:?}: {}", parent, e)
                })?;
            }
        }

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {:?}: {}", path, e))?;

        Ok(())
    }

    /// Load configuration with fallback to default
    pub async fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Self {
        let mut config = match path {
            Some(path) => match Self::load_from_file(path).await {
                Ok(config) => {
                    tracing::info!("Loaded configuration from file");
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to load config file, using defaults: {}", e);
                    Self::default()
                }
            },
            None => Self::default(),
        };

        config.apply_api_key(std::env::var("ALCHEMY_API_KEY").ok());
        config
    }

    /// Substitutes the Alchemy key into demo and placeholder endpoints
    fn apply_api_key(&mut self, api_key: Option<String>) {
        match api_key {
            Some(api_key) => {
                tracing::info!("Using ALCHEMY_API_KEY environment variable for RPC URLs");

                for (network_name, network_config) in &mut self.networks {
                    if network_config.rpc_url.contains("alchemy.com/v2/demo") {
                        network_config.rpc_url = network_config
                            .rpc_url
                            .replace("/demo", &format!("/{}", api_key));
                        tracing::debug!("Updated {} RPC URL with API key", network_name);
                    } else if network_config.rpc_url.contains("YOUR_API_KEY_HERE") {
                        network_config.rpc_url =
                            network_config.rpc_url.replace("YOUR_API_KEY_HERE", &api_key);
                        tracing::debug!("Updated {} RPC URL with API key", network_name);
                    }
                }
            }
            None => {
                for (network_name, network_config) in &self.networks {
                    if network_config.rpc_url.contains("/demo") {
                        tracing::warn!("Using demo RPC endpoint for {}, set ALCHEMY_API_KEY environment variable for better reliability", network_name);
                    }
                }
            }
        }
    }

    /// Network by name, or the default network
    pub fn network(&self, name: Option<&str>) -> Result<&NetworkConfig> {
        let name = name.unwrap_or(&self.default_network);
        let mut available: Vec<String> = self.networks.keys().cloned().collect();
        available.sort();
        utils::validate_network(name, &available)?;

        self.networks
            .get(name)
            .ok_or_else(|| anyhow!("Unknown network: '{}'", name))
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connect_timeout: Duration::from_secs(self.transport.connect_timeout_secs),
            receipt: ReceiptPolicy {
                poll_interval: Duration::from_millis(self.receipt.poll_interval_ms),
                timeout: Duration::from_secs(self.receipt.timeout_secs),
            },
        }
    }

    /// Private key from the configured environment variable, if set
    pub fn private_key(&self) -> Option<String> {
        std::env::var(&self.signer.private_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn max_transaction_value(&self) -> Result<Option<U256>> {
        self.security
            .max_transaction_value
            .as_deref()
            .map(utils::parse_amount)
            .transpose()
            .map_err(|e| anyhow!("Invalid security.max_transaction_value: {}", e))
    }

    /// Get default config file path
    pub fn default_config_path() -> Result<std::path::PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("contract-invoker").join("config.toml"))
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let sample_config = r#"# Contract Invoker Configuration File
# This file configures networks, signing, receipt polling and security settings

# Default network to use when none is specified
default_network = "ethereum"

# Network configurations
[networks.ethereum]
rpc_url = "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 1
explorer_url = "https://etherscan.io"

[networks.ethereum.gas]
default_gas_limit = 3_000_000   # ceiling used while estimating
min_gas_price = 1_000_000_000   # 1 Gwei, used when no gas price is given

[networks.sepolia]
rpc_url = "https://eth-sepolia.g.alchemy.com/v2/YOUR_API_KEY_HERE"
chain_id = 11155111
explorer_url = "https://sepolia.etherscan.io"

[networks.local]
rpc_url = "http://127.0.0.1:8545"
chain_id = 31337

# Receipt polling
[receipt]
poll_interval_ms = 1000
timeout_secs = 300

[transport]
connect_timeout_secs = 5

# The private key is read from this environment variable, never from this file
[signer]
private_key_env = "INVOKER_PRIVATE_KEY"

# Security settings
[security]
allow_write_operations = false
# max_transaction_value = "1000000000000000000"  # 1 ETH in wei

# Environment variables that can be used:
# ALCHEMY_API_KEY - Your Alchemy API key (replaces YOUR_API_KEY_HERE above)
# INVOKER_PRIVATE_KEY - Hex private key used to sign messages and transactions
"#;
        sample_config.to_string()
    }
}

impl NetworkConfig {
    pub fn gas_policy(&self) -> GasPolicy {
        GasPolicy {
            default_gas_limit: self.gas.default_gas_limit,
            min_gas_price: u128::from(self.gas.min_gas_price),
        }
    }
}
