//! ---
//! fdh_section: "02-configuration"
//! fdh_subsection: "module"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Dapp configuration schema, loading, and validation."
//! fdh_version: "v0.0.0-prealpha"
//! fdh_owner: "tbd"
//! ---
//! Typed configuration consumed by the harness at setup time.
//!
//! The dapp configuration is produced by an external provider; this crate pins
//! it to an explicit schema ([`DappConfig`]) at the point where the harness
//! consumes it and exposes the providers used to resolve it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

/// Configuration providers consulted during suite setup.
pub mod provider;

pub use provider::{ConfigProvider, DefaultConfigProvider, FileConfigProvider, StaticConfigProvider};

/// Port the Flow emulator binds by default and the one teardown releases.
pub const DEFAULT_EMULATOR_PORT: u16 = 3570;

/// Default file name probed when no explicit path is supplied.
pub const DEFAULT_CONFIG_FILE: &str = "fdh.toml";

fn default_emulator_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_emulator_port() -> u16 {
    DEFAULT_EMULATOR_PORT
}

fn default_http_uri() -> String {
    "http://127.0.0.1:8080".to_owned()
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

/// Configuration handed to the suite for the duration of a single run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DappConfig {
    /// Emulator the dapp under test talks to.
    #[serde(default)]
    pub emulator: EmulatorConfig,
    /// Flow account addresses available to the suite.
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Contract name to deploying account address.
    #[serde(default)]
    pub contracts: IndexMap<String, String>,
    /// Port release behaviour after the suite.
    #[serde(default)]
    pub teardown: TeardownConfig,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Provider-specific settings carried through without interpretation.
    #[serde(default)]
    pub settings: IndexMap<String, toml::Value>,
}

/// Metadata describing where a [`DappConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedDappConfig {
    /// The validated configuration.
    pub config: DappConfig,
    /// File the configuration was read from.
    pub source: PathBuf,
}

impl DappConfig {
    /// Environment variable naming a configuration file to use instead of the candidates.
    pub const ENV_CONFIG_PATH: &'static str = "FDH_CONFIG";

    /// Load configuration from disk, respecting the `FDH_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedDappConfig> {
        Self::load_with_source_from(env_override().as_deref(), candidates)
    }

    /// Same as [`DappConfig::load_with_source`] with the override value supplied
    /// by the caller. A blank override counts as unset.
    pub(crate) fn load_with_source_from<P: AsRef<Path>>(
        env_override: Option<&str>,
        candidates: &[P],
    ) -> Result<LoadedDappConfig> {
        if let Some(env_path) = env_override.map(str::trim).filter(|p| !p.is_empty()) {
            let path = PathBuf::from(env_path);
            let config = Self::from_path(&path)?;
            return Ok(LoadedDappConfig {
                config,
                source: path,
            });
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedDappConfig {
                    config,
                    source: path.to_path_buf(),
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Read and validate a configuration file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading dapp configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<DappConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Look up the deploying account of a named contract.
    pub fn contract_address(&self, name: &str) -> Option<&str> {
        self.contracts.get(name).map(String::as_str)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.emulator.validate()?;
        for address in &self.accounts {
            validate_address(address).with_context(|| "invalid entry in accounts")?;
        }
        for (name, address) in &self.contracts {
            if name.trim().is_empty() {
                return Err(anyhow!("contract names cannot be empty"));
            }
            validate_address(address)
                .with_context(|| format!("invalid address for contract '{name}'"))?;
        }
        Ok(())
    }
}

impl std::str::FromStr for DappConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: DappConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Connection details of the emulator the dapp under test talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Host the emulator listens on.
    #[serde(default = "default_emulator_host")]
    pub host: String,
    /// gRPC port of the emulator.
    #[serde(default = "default_emulator_port")]
    pub port: u16,
    /// REST endpoint of the emulator.
    #[serde(default = "default_http_uri")]
    pub http_uri: String,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            host: default_emulator_host(),
            port: default_emulator_port(),
            http_uri: default_http_uri(),
        }
    }
}

impl EmulatorConfig {
    /// Reject empty hosts, port 0, and non-http(s) endpoints.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("emulator host cannot be empty"));
        }
        if self.port == 0 {
            return Err(anyhow!("emulator port must be non-zero"));
        }
        let uri = self.http_uri.trim();
        if !(uri.starts_with("http://") || uri.starts_with("https://")) {
            return Err(anyhow!(
                "emulator http_uri '{}' must use an http:// or https:// scheme",
                self.http_uri
            ));
        }
        Ok(())
    }
}

/// Settings for the after-suite release of the emulator port.
///
/// The port itself is fixed when the harness is built so that teardown can
/// still run when this configuration never resolves.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeardownConfig {
    /// Wait between SIGTERM and SIGKILL.
    #[serde(default = "default_grace_period")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub grace_period: Duration,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
        }
    }
}

/// Available log formats for the harness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    StructuredJson,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "structured-json" | "json" => Ok(LogFormat::StructuredJson),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Where and how the harness writes logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LoggingConfig {
    /// Stdout format.
    #[serde(default)]
    pub format: LogFormat,
    /// When set, a daily rolling log file is written here as well.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Log file name prefix; defaults to the service name.
    #[serde(default)]
    pub file_prefix: Option<String>,
}

/// Raw value of the `FDH_CONFIG` override, if set.
pub(crate) fn env_override() -> Option<String> {
    std::env::var(DappConfig::ENV_CONFIG_PATH).ok()
}

/// Check a Flow account address: `0x` followed by 1 to 16 hex digits.
pub fn validate_address(address: &str) -> Result<()> {
    let digits = address
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("address '{}' must start with 0x", address))?;
    if digits.is_empty() || digits.len() > 16 {
        return Err(anyhow!(
            "address '{}' must carry between 1 and 16 hex digits",
            address
        ));
    }
    if !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(anyhow!("address '{}' contains non-hex characters", address));
    }
    Ok(())
}
