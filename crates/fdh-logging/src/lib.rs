//! ---
//! fdh_section: "03-logging"
//! fdh_subsection: "module"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Structured logging adapters and sinks."
//! fdh_version: "v0.0.0-prealpha"
//! fdh_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Tracing initialisation and suite-aware logging helpers.

use anyhow::Result;
use fdh_config::{LogFormat, LoggingConfig};
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

/// Suite-aware logging macros.
pub mod macros;

const LOG_ENV: &str = "FDH_LOG";

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Initialize a baseline pretty subscriber suitable for development and tests.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// Initialize the subscriber from the harness logging configuration.
///
/// * `FDH_LOG` overrides the filter (e.g. `info`, `debug,fdh_testharness=trace`).
///   When unset `RUST_LOG` is honoured, finally defaulting to `info`.
/// * When `directory` is configured a daily rolling JSON file is written in
///   addition to stdout.
///
/// Repeated calls are no-ops once a global subscriber is installed.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .boxed(),
    };

    let file_layer = match &config.directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)?;
            let prefix = config
                .file_prefix
                .clone()
                .unwrap_or_else(|| service_name.to_owned());
            let appender = daily(directory, format!("{prefix}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_timer(fmt::time::UtcTime::rfc_3339())
                    .json()
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    tracing::debug!(service = %service_name, format = ?config.format, "tracing initialised");
    Ok(())
}

fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info")),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Suite position propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct SuiteContext<'a> {
    /// Name of the top-level suite.
    pub suite: Option<&'a str>,
    /// Slash-separated path of the enclosing group.
    pub group: Option<&'a str>,
    /// Name of the test case being executed.
    pub case: Option<&'a str>,
}

impl<'a> SuiteContext<'a> {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the suite name.
    pub fn with_suite(mut self, suite: &'a str) -> Self {
        self.suite = Some(suite);
        self
    }

    /// Attach the group path.
    pub fn with_group(mut self, group: &'a str) -> Self {
        self.group = Some(group);
        self
    }

    /// Attach the case name.
    pub fn with_case(mut self, case: &'a str) -> Self {
        self.case = Some(case);
        self
    }
}

/// Outcome attached to lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// The phase completed.
    Success,
    /// The phase failed; for teardown this is logged and otherwise ignored.
    Fault,
}

impl PhaseOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            PhaseOutcome::Success => "success",
            PhaseOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lifecycle event (`setup`, `teardown`, ...) with an outcome.
pub fn log_phase_event(
    context: Option<&SuiteContext>,
    phase: &str,
    message: &str,
    outcome: PhaseOutcome,
) {
    let default = SuiteContext::default();
    let ctx = context.unwrap_or(&default);
    let suite = ctx.suite.unwrap_or("");
    let group = ctx.group.unwrap_or("");
    let case = ctx.case.unwrap_or("");
    let label = outcome.as_str();
    // `tracing::event!` needs a constant level.
    match outcome {
        PhaseOutcome::Success => {
            tracing::info!(phase, outcome = label, suite, group, case, message = %message)
        }
        PhaseOutcome::Fault => {
            tracing::warn!(phase, outcome = label, suite, group, case, message = %message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macros_emit_without_panic() {
        init();
        let ctx = SuiteContext::new()
            .with_suite("Flow Dapp Tests")
            .with_group("Blank Tests");
        crate::fdh_info!(context = ctx.clone(), "group entered");
        crate::fdh_warn!("no cases declared");
        crate::fdh_error!(context = ctx.with_case("deploys"), "case failed: {}", "boom");
    }

    #[test]
    fn phase_event_helper_emits() {
        init();
        let ctx = SuiteContext::new().with_suite("Flow Dapp Tests");
        log_phase_event(Some(&ctx), "setup", "configuration resolved", PhaseOutcome::Success);
        log_phase_event(None, "teardown", "nothing listening", PhaseOutcome::Fault);
    }

    #[test]
    fn init_tracing_creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let config = LoggingConfig {
            format: LogFormat::StructuredJson,
            directory: Some(logs.clone()),
            file_prefix: Some("fdh-test".to_owned()),
        };
        init_tracing("fdh-test", &config).unwrap();
        assert!(logs.is_dir());
    }
}
