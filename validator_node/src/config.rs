//! Node configuration: optional file, `GRID_` environment overlay, then
//! command line overrides.

use crate::chain::endpoint_for_chain;
use crate::dumper::abi::{MARKET_ABI, REGISTRY_ABI};
use crate::validator::Intervals;
use ethers::types::Address;
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Named chain: local, dev, test or product
    pub chain: String,
    /// Explicit endpoint, overrides `chain`
    pub rpc_url: Option<String>,
    pub registry_address: String,
    pub market_address: String,
    /// Hex encoded secp256k1 key, with or without 0x
    pub private_key: String,
    pub data_dir: PathBuf,
    pub storage: StorageBackend,
    /// Replacement contract interfaces (JSON ABI files)
    pub registry_abi_path: Option<PathBuf>,
    pub market_abi_path: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub prepare_interval_secs: u64,
    pub prove_interval_secs: u64,
    pub wait_interval_secs: u64,
    pub result_queue_capacity: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            chain: "dev".to_string(),
            rpc_url: None,
            registry_address: String::new(),
            market_address: String::new(),
            private_key: String::new(),
            data_dir: PathBuf::from("data"),
            storage: StorageBackend::Memory,
            registry_abi_path: None,
            market_abi_path: None,
            poll_interval_secs: 10,
            prepare_interval_secs: 10,
            prove_interval_secs: 10,
            wait_interval_secs: 100,
            result_queue_capacity: 100,
        }
    }
}

impl ValidatorConfig {
    /// Load from an optional file (format by extension) overlaid with
    /// `GRID_*` environment variables, `__` separating nested keys.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("GRID")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn endpoint(&self) -> String {
        match &self.rpc_url {
            Some(url) if !url.is_empty() => url.clone(),
            _ => endpoint_for_chain(&self.chain).to_string(),
        }
    }

    pub fn registry_address(&self) -> Result<Address> {
        parse_address("registry_address", &self.registry_address)
    }

    pub fn market_address(&self) -> Result<Address> {
        parse_address("market_address", &self.market_address)
    }

    pub fn secret_key(&self) -> Result<SecretKey> {
        let raw = self.private_key.trim();
        let raw = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(raw).map_err(|e| ConfigError::Invalid {
            field: "private_key",
            reason: e.to_string(),
        })?;
        SecretKey::from_slice(&bytes).map_err(|e| ConfigError::Invalid {
            field: "private_key",
            reason: e.to_string(),
        })
    }

    pub fn intervals(&self) -> Result<Intervals> {
        Intervals::new(
            Duration::from_secs(self.prepare_interval_secs),
            Duration::from_secs(self.prove_interval_secs),
            Duration::from_secs(self.wait_interval_secs),
        )
        .map_err(|e| ConfigError::Invalid {
            field: "intervals",
            reason: e.to_string(),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Contract interfaces, bundled unless overridden
    pub fn abi_sources(&self) -> Result<Vec<String>> {
        let read = |path: &Option<PathBuf>, bundled: &str| match path {
            Some(path) => std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            }),
            None => Ok(bundled.to_string()),
        };
        Ok(vec![
            read(&self.registry_abi_path, REGISTRY_ABI)?,
            read(&self.market_abi_path, MARKET_ABI)?,
        ])
    }

    /// Check everything startup depends on
    pub fn validate(&self) -> Result<()> {
        self.registry_address()?;
        self.market_address()?;
        self.secret_key()?;
        self.intervals()?;
        if self.endpoint().is_empty() {
            return Err(ConfigError::Invalid {
                field: "rpc_url",
                reason: "empty endpoint".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address> {
    Address::from_str(value.trim()).map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{:?}: {}", value, e),
    })
}
