//! ---
//! fdh_section: "11-test-harness"
//! fdh_subsection: "01-bootstrap"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Setup, case execution, and teardown lifecycle."
//! fdh_version: "v0.1.0"
//! fdh_owner: "tbd"
//! ---
//! A run is `setup -> cases -> teardown`, executed once, strictly in order.
//!
//! Teardown runs on every exit path once the port has been claimed: after
//! passing and failing cases, after a panicking case, and after a failed
//! setup. Its own failures are logged and recorded, never returned.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fdh_config::{ConfigProvider, DappConfig, TeardownConfig};
use fdh_logging::{fdh_info, fdh_warn, log_phase_event, PhaseOutcome, SuiteContext};
use futures::FutureExt;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::Instrument;

use crate::error::HarnessError;
use crate::report::{CaseOutcome, CaseReport, SuiteReport, TeardownReport};
use crate::suite::{Suite, TestContext};
use crate::terminator::{PortSpec, PortTerminator};

/// Ports owned by in-flight runs in this process.
static CLAIMED_PORTS: Lazy<Mutex<HashSet<u16>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Exclusive hold on a teardown port for the duration of a run.
struct PortClaim(u16);

impl PortClaim {
    fn acquire(port: u16) -> Result<Self, HarnessError> {
        if CLAIMED_PORTS.lock().insert(port) {
            Ok(Self(port))
        } else {
            Err(HarnessError::PortBusy(port))
        }
    }
}

impl Drop for PortClaim {
    fn drop(&mut self) {
        CLAIMED_PORTS.lock().remove(&self.0);
    }
}

struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, HarnessError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| HarnessError::AlreadyRunning)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives a [`Suite`] through its lifecycle.
///
/// The harness holds no per-run state: the configuration resolved by setup
/// lives only for the run that resolved it.
pub struct HarnessBootstrap<P, T> {
    provider: P,
    terminator: T,
    port: PortSpec,
    running: AtomicBool,
    runs: AtomicU64,
}

impl<P, T> HarnessBootstrap<P, T>
where
    P: ConfigProvider,
    T: PortTerminator,
{
    /// Create a harness releasing the default emulator port on teardown.
    pub fn new(provider: P, terminator: T) -> Self {
        Self {
            provider,
            terminator,
            port: PortSpec::default(),
            running: AtomicBool::new(false),
            runs: AtomicU64::new(0),
        }
    }

    /// Override the port released during teardown.
    pub fn with_port(mut self, port: PortSpec) -> Self {
        self.port = port;
        self
    }

    /// Port released during teardown.
    pub fn port(&self) -> u16 {
        self.port.port()
    }

    /// Execute one full run of `suite`.
    ///
    /// Returns the run report when setup succeeded, whatever the case
    /// outcomes. Returns [`HarnessError::Setup`] when setup failed; teardown
    /// has still run by then.
    pub async fn run(&self, suite: &Suite) -> Result<SuiteReport, HarnessError> {
        let _running = RunningFlag::acquire(&self.running)?;
        let _claim = PortClaim::acquire(self.port())?;
        let run_id = self.runs.fetch_add(1, Ordering::Relaxed) + 1;
        let span = tracing::info_span!("suite_run", suite = suite.name(), run_id, port = self.port());
        self.run_claimed(suite, run_id).instrument(span).await
    }

    async fn run_claimed(&self, suite: &Suite, run_id: u64) -> Result<SuiteReport, HarnessError> {
        let started = Instant::now();
        let ctx = SuiteContext::new().with_suite(suite.name());

        let setup = self.setup(&ctx).await;
        let cases = match &setup {
            Ok(config) => execute_cases(suite, TestContext::new(Arc::clone(config), run_id)).await,
            Err(_) => Vec::new(),
        };
        let grace = setup
            .as_ref()
            .map(|config| config.teardown.grace_period)
            .unwrap_or_else(|_| TeardownConfig::default().grace_period);
        let teardown = self.teardown(&ctx, grace).await;

        setup.map(|_| SuiteReport {
            suite: suite.name().to_owned(),
            run_id,
            cases,
            teardown,
            duration_ms: started.elapsed().as_millis(),
        })
    }

    async fn setup(&self, ctx: &SuiteContext<'_>) -> Result<Arc<DappConfig>, HarnessError> {
        let resolved = self
            .provider
            .provide()
            .await
            .and_then(|config| config.validate().map(|()| config));
        match resolved {
            Ok(config) => {
                log_phase_event(
                    Some(ctx),
                    "setup",
                    &format!("configuration resolved by {} provider", self.provider.name()),
                    PhaseOutcome::Success,
                );
                Ok(Arc::new(config))
            }
            Err(err) => {
                log_phase_event(
                    Some(ctx),
                    "setup",
                    &format!("{} provider failed: {err:#}", self.provider.name()),
                    PhaseOutcome::Fault,
                );
                Err(HarnessError::Setup(err))
            }
        }
    }

    async fn teardown(&self, ctx: &SuiteContext<'_>, grace: Duration) -> TeardownReport {
        let port = self.port();
        // A panicking terminator is treated like any other teardown failure.
        let attempt = AssertUnwindSafe(self.terminator.terminate(port, grace))
            .catch_unwind()
            .await;
        match attempt {
            Ok(Ok(outcome)) => {
                let message = if outcome.nothing_listening() {
                    format!("nothing listening on {}", self.port)
                } else {
                    format!(
                        "released {}: {} terminated, {} survived",
                        self.port,
                        outcome.terminated.len(),
                        outcome.survived.len()
                    )
                };
                log_phase_event(Some(ctx), "teardown", &message, PhaseOutcome::Success);
                TeardownReport {
                    port,
                    outcome: Some(outcome),
                    error: None,
                }
            }
            Ok(Err(err)) => teardown_fault(ctx, port, err.to_string()),
            Err(payload) => teardown_fault(ctx, port, panic_message(payload.as_ref())),
        }
    }
}

fn teardown_fault(ctx: &SuiteContext<'_>, port: u16, error: String) -> TeardownReport {
    log_phase_event(
        Some(ctx),
        "teardown",
        &format!("ignoring teardown failure: {error}"),
        PhaseOutcome::Fault,
    );
    TeardownReport {
        port,
        outcome: None,
        error: Some(error),
    }
}

async fn execute_cases(suite: &Suite, ctx: TestContext) -> Vec<CaseReport> {
    let plan = suite.plan();
    if plan.is_empty() {
        fdh_info!(
            context = SuiteContext::new().with_suite(suite.name()),
            "suite declares no test cases"
        );
    }
    let mut reports = Vec::with_capacity(plan.len());
    for planned in plan {
        let name = planned.case.name();
        let log_ctx = SuiteContext::new()
            .with_suite(suite.name())
            .with_group(&planned.group_path)
            .with_case(name);
        let started = Instant::now();
        let run_case = async { planned.case.invoke(ctx.clone()).await };
        let outcome = match AssertUnwindSafe(run_case).catch_unwind().await {
            Ok(Ok(())) => {
                fdh_info!(context = log_ctx, "case passed");
                CaseOutcome::Passed
            }
            Ok(Err(err)) => {
                let message = format!("{err:#}");
                fdh_warn!(context = log_ctx, "case failed: {message}");
                CaseOutcome::Failed { message }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                fdh_warn!(context = log_ctx, "case panicked: {message}");
                CaseOutcome::Panicked { message }
            }
        };
        reports.push(CaseReport {
            group: planned.group_path.clone(),
            name: name.to_owned(),
            outcome,
            duration_ms: started.elapsed().as_millis(),
        });
    }
    reports
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
