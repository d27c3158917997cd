//! ---
//! fdh_section: "11-test-harness"
//! fdh_subsection: "01-bootstrap"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Test harness lifecycle orchestration and shared exports."
//! fdh_version: "v0.1.0"
//! fdh_owner: "tbd"
//! ---
//! The test harness crate runs a declared suite through its lifecycle:
//! configuration setup, sequential test cases, and best-effort release of
//! the emulator port.

/// Harness and terminator errors.
pub mod error;
/// The declared Flow dapp suite.
pub mod flow_dapp;
/// Run reports.
pub mod report;
/// Setup, case execution, and teardown.
pub mod runner;
/// Suite, group, and case declarations.
pub mod suite;
/// Releasing a port by terminating its listeners.
pub mod terminator;

pub use error::{HarnessError, TerminateError};
pub use flow_dapp::{flow_dapp_harness, flow_dapp_suite};
pub use report::{CaseOutcome, CaseReport, SuiteReport, TeardownReport};
pub use runner::HarnessBootstrap;
pub use suite::{Suite, TestCase, TestContext, TestGroup};
pub use terminator::{PortSpec, PortTerminator, SystemPortTerminator, TerminationOutcome};
