//! ---
//! fdh_section: "05-external-interfaces"
//! fdh_subsection: "binary"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "CLI entry point running the Flow dapp suite."
//! fdh_version: "v0.0.0-prealpha"
//! fdh_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use fdh_config::{
    ConfigProvider, DefaultConfigProvider, FileConfigProvider, LogFormat, LoggingConfig,
};
use fdh_testharness::{flow_dapp_suite, HarnessBootstrap, HarnessError, PortSpec, SystemPortTerminator};
use tracing::error;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run the Flow dapp test suite and release the emulator port afterwards",
    long_about = None
)]
struct Cli {
    /// Configuration file; without it `FDH_CONFIG`, then `fdh.toml`, then defaults apply.
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Port released during teardown, as `3570` or `:3570`.
    #[arg(short, long, value_name = "PORT", default_value_t = PortSpec::default())]
    port: PortSpec,
    /// Print the run report as JSON instead of a summary line.
    #[arg(long)]
    json: bool,
    /// Stdout log format: `pretty` or `structured-json`.
    #[arg(long, value_name = "FORMAT", default_value = "pretty")]
    log_format: LogFormat,
    /// Also write daily rolling JSON logs to this directory.
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn provider(&self) -> Arc<dyn ConfigProvider> {
        match &self.config {
            Some(path) => Arc::new(FileConfigProvider::explicit(path.clone())),
            None => Arc::new(DefaultConfigProvider::default()),
        }
    }

    fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            format: self.log_format,
            directory: self.log_dir.clone(),
            file_prefix: None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    fdh_logging::init_tracing("fdh-test", &cli.logging())?;

    let harness =
        HarnessBootstrap::new(cli.provider(), SystemPortTerminator::new()).with_port(cli.port);
    let suite = flow_dapp_suite();

    let report = match harness.run(&suite).await {
        Ok(report) => report,
        Err(err @ HarnessError::Setup(_)) => {
            error!(error = %err, "suite aborted");
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err.into()),
    };

    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.summary_line());
        for case in report.cases.iter().filter(|c| !c.outcome.is_pass()) {
            println!("  failed: {} > {} ({:?})", case.group, case.name, case.outcome);
        }
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn port_accepts_colon_notation() {
        let cli = Cli::parse_from(["fdh-test", "--port", ":4000", "--log-format", "json"]);
        assert_eq!(cli.port.port(), 4000);
        assert_eq!(cli.log_format, LogFormat::StructuredJson);
        assert!(cli.config.is_none());
    }

    #[test]
    fn defaults_target_emulator_port() {
        let cli = Cli::parse_from(["fdh-test"]);
        assert_eq!(cli.port.port(), fdh_config::DEFAULT_EMULATOR_PORT);
        assert!(!cli.json);
    }

    #[test]
    fn rejects_zero_port() {
        assert!(Cli::try_parse_from(["fdh-test", "--port", "0"]).is_err());
    }

    #[tokio::test]
    async fn config_flag_wins_over_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let from_env = dir.path().join("env.toml");
        let from_flag = dir.path().join("cli.toml");
        std::fs::write(&from_env, "accounts = [\"0x1\"]").unwrap();
        std::fs::write(&from_flag, "accounts = [\"0x2\"]").unwrap();

        let cli = Cli::parse_from(["fdh-test", "--config", from_flag.to_str().unwrap()]);
        std::env::set_var(fdh_config::DappConfig::ENV_CONFIG_PATH, &from_env);
        let resolved = cli.provider().provide().await;
        std::env::remove_var(fdh_config::DappConfig::ENV_CONFIG_PATH);

        assert_eq!(resolved.unwrap().accounts, vec!["0x2".to_owned()]);
    }
}
