//! ---
//! fdh_section: "02-configuration"
//! fdh_subsection: "module"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Configuration providers resolved during suite setup."
//! fdh_version: "v0.0.0-prealpha"
//! fdh_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::{env_override, DappConfig, DEFAULT_CONFIG_FILE};

/// Zero-argument source of the configuration a run operates on.
///
/// Implementations are called exactly once per run. A returned error, or a
/// configuration that fails [`DappConfig::validate`], fails the whole run.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Human-readable label used in logs.
    fn name(&self) -> &str;

    /// Resolve the configuration for a new run.
    async fn provide(&self) -> Result<DappConfig>;
}

#[async_trait]
impl<P> ConfigProvider for Arc<P>
where
    P: ConfigProvider + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn provide(&self) -> Result<DappConfig> {
        (**self).provide().await
    }
}

/// Reads TOML from the first existing candidate.
///
/// Providers built with [`FileConfigProvider::new`] honour the `FDH_CONFIG`
/// override; [`FileConfigProvider::explicit`] reads only the given path.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    candidates: Vec<PathBuf>,
    honour_env: bool,
}

impl FileConfigProvider {
    /// Probe `candidates` in order, unless `FDH_CONFIG` names a file.
    pub fn new<I, P>(candidates: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            honour_env: true,
        }
    }

    /// Read exactly `path`, ignoring `FDH_CONFIG`.
    pub fn explicit(path: impl Into<PathBuf>) -> Self {
        Self {
            candidates: vec![path.into()],
            honour_env: false,
        }
    }

    /// Paths probed when no override applies.
    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Whether `FDH_CONFIG` takes precedence over the candidates.
    pub fn honours_env_override(&self) -> bool {
        self.honour_env
    }

    fn resolve(&self, env_override: Option<&str>) -> Result<DappConfig> {
        let env_override = env_override.filter(|_| self.honour_env);
        let loaded = DappConfig::load_with_source_from(env_override, &self.candidates)?;
        info!(source = %loaded.source.display(), "dapp configuration loaded");
        Ok(loaded.config)
    }
}

impl Default for FileConfigProvider {
    fn default() -> Self {
        Self::new([DEFAULT_CONFIG_FILE])
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn provide(&self) -> Result<DappConfig> {
        self.resolve(env_override().as_deref())
    }
}

/// Hands out clones of a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    config: DappConfig,
}

impl StaticConfigProvider {
    /// Serve `config` to every run.
    pub fn new(config: DappConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn provide(&self) -> Result<DappConfig> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}

/// Uses the file provider when a file is present, built-in defaults otherwise.
///
/// An `FDH_CONFIG` override or an explicit path that cannot be read is still
/// an error.
#[derive(Debug, Clone, Default)]
pub struct DefaultConfigProvider {
    files: FileConfigProvider,
}

impl DefaultConfigProvider {
    /// Fall back to defaults when none of `files` resolves.
    pub fn new(files: FileConfigProvider) -> Self {
        Self { files }
    }

    fn resolve(&self, env_override: Option<&str>) -> Result<DappConfig> {
        // An explicit path is mandatory.
        if !self.files.honours_env_override() {
            return self.files.resolve(env_override);
        }
        let override_set = env_override.is_some_and(|value| !value.trim().is_empty());
        if override_set || self.files.candidates().iter().any(|path| path.exists()) {
            return self.files.resolve(env_override);
        }
        info!("no configuration file present; using built-in defaults");
        Ok(DappConfig::default())
    }
}

#[async_trait]
impl ConfigProvider for DefaultConfigProvider {
    fn name(&self) -> &str {
        "default"
    }

    async fn provide(&self) -> Result<DappConfig> {
        self.resolve(env_override().as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_accounts(path: &Path, account: &str) {
        std::fs::write(path, format!("accounts = [\"{account}\"]")).unwrap();
    }

    #[tokio::test]
    async fn static_provider_rejects_invalid_config() {
        let mut config = DappConfig::default();
        config.accounts.push("nope".to_owned());
        let provider = StaticConfigProvider::new(config);
        assert!(provider.provide().await.is_err());
    }

    #[test]
    fn default_provider_falls_back_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let provider =
            DefaultConfigProvider::new(FileConfigProvider::new([dir.path().join("fdh.toml")]));
        assert_eq!(provider.resolve(None).unwrap(), DappConfig::default());
    }

    #[test]
    fn default_provider_follows_override_even_without_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let overridden = dir.path().join("override.toml");
        write_accounts(&overridden, "0x1");
        let provider =
            DefaultConfigProvider::new(FileConfigProvider::new([dir.path().join("fdh.toml")]));
        let config = provider.resolve(overridden.to_str()).unwrap();
        assert_eq!(config.accounts, vec!["0x1".to_owned()]);
    }

    #[test]
    fn file_provider_surfaces_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fdh.toml");
        std::fs::write(&path, "accounts = 7").unwrap();
        let provider = DefaultConfigProvider::new(FileConfigProvider::new([&path]));
        let err = provider.resolve(None).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
    }

    #[test]
    fn explicit_path_ignores_override() {
        let dir = tempfile::tempdir().unwrap();
        let from_env = dir.path().join("env.toml");
        let from_flag = dir.path().join("cli.toml");
        write_accounts(&from_env, "0x1");
        write_accounts(&from_flag, "0x2");

        let candidates = FileConfigProvider::new([&from_flag]);
        assert_eq!(
            candidates.resolve(from_env.to_str()).unwrap().accounts,
            vec!["0x1".to_owned()]
        );

        let explicit = FileConfigProvider::explicit(&from_flag);
        assert!(!explicit.honours_env_override());
        assert_eq!(
            explicit.resolve(from_env.to_str()).unwrap().accounts,
            vec!["0x2".to_owned()]
        );
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileConfigProvider::explicit(dir.path().join("absent.toml"));
        let err = provider.resolve(None).unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
        // A missing explicit file never degrades to defaults.
        assert!(DefaultConfigProvider::new(provider).resolve(None).is_err());
    }

    #[tokio::test]
    async fn explicit_provider_wins_over_process_override() {
        let dir = tempfile::tempdir().unwrap();
        let from_env = dir.path().join("env.toml");
        let from_flag = dir.path().join("cli.toml");
        write_accounts(&from_env, "0x1");
        write_accounts(&from_flag, "0x2");

        std::env::set_var(DappConfig::ENV_CONFIG_PATH, &from_env);
        let resolved = FileConfigProvider::explicit(&from_flag).provide().await;
        std::env::remove_var(DappConfig::ENV_CONFIG_PATH);

        assert_eq!(resolved.unwrap().accounts, vec!["0x2".to_owned()]);
    }

    #[tokio::test]
    async fn arc_provider_delegates() {
        let provider: Arc<dyn ConfigProvider> = Arc::new(StaticConfigProvider::default());
        assert_eq!(provider.name(), "static");
        assert!(provider.provide().await.is_ok());
    }
}
