//! ---
//! fdh_section: "11-test-harness"
//! fdh_subsection: "01-bootstrap"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Error types surfaced by the harness and the port terminator."
//! fdh_version: "v0.1.0"
//! fdh_owner: "tbd"
//! ---
use thiserror::Error;

/// Errors that fail a suite run.
///
/// Teardown problems are deliberately absent: they are logged and recorded in
/// the run report but never returned.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The configuration provider failed or produced an invalid configuration.
    #[error("suite setup failed: {0:#}")]
    Setup(anyhow::Error),
    /// Another in-flight run already owns the teardown port.
    #[error("port {0} is already claimed by another suite run")]
    PortBusy(u16),
    /// `run` was called while this harness was mid-run.
    #[error("harness is already running a suite")]
    AlreadyRunning,
}

/// Failures while locating or signalling the process bound to a port.
#[derive(Debug, Error)]
pub enum TerminateError {
    /// Reading the socket or process tables failed.
    #[error("failed to inspect listeners on port {port}: {source}")]
    Lookup {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    /// `lsof` ran but reported an error.
    #[error("listener lookup for port {port} exited with status {status}: {stderr}")]
    LookupCommand {
        port: u16,
        status: i32,
        stderr: String,
    },
    #[error("terminating processes by port is not supported on this platform")]
    Unsupported,
}
