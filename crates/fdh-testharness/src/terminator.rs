//! ---
//! fdh_section: "11-test-harness"
//! fdh_subsection: "03-teardown"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Locate and terminate processes listening on a TCP port."
//! fdh_version: "v0.1.0"
//! fdh_owner: "tbd"
//! ---
//! Port-based process termination used by suite teardown.
//!
//! Listeners are discovered from `/proc` on Linux and via `lsof` on other Unix
//! platforms. Each listener receives SIGTERM, is given the grace period to
//! exit, and is then sent SIGKILL.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use fdh_config::DEFAULT_EMULATOR_PORT;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::TerminateError;

/// A TCP port in the `3570` or `:3570` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PortSpec(u16);

impl PortSpec {
    /// Returns `None` for port 0.
    pub fn new(port: u16) -> Option<Self> {
        (port != 0).then_some(Self(port))
    }

    /// The numeric port.
    pub fn port(self) -> u16 {
        self.0
    }
}

impl Default for PortSpec {
    fn default() -> Self {
        Self(DEFAULT_EMULATOR_PORT)
    }
}

impl FromStr for PortSpec {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix(':').unwrap_or(trimmed);
        let port: u16 = digits
            .parse()
            .map_err(|_| format!("invalid port specifier '{raw}'"))?;
        PortSpec::new(port).ok_or_else(|| "port must be greater than zero".to_owned())
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.0)
    }
}

/// What a termination attempt found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TerminationOutcome {
    pub port: u16,
    /// PIDs listening on the port, excluding the harness itself.
    pub found: Vec<u32>,
    pub terminated: Vec<u32>,
    pub survived: Vec<u32>,
}

impl TerminationOutcome {
    /// True when no process other than the harness held the port.
    pub fn nothing_listening(&self) -> bool {
        self.found.is_empty()
    }
}

/// Capability to request termination of whatever listens on a port.
#[async_trait]
pub trait PortTerminator: Send + Sync {
    /// Terminate every process listening on `port`, escalating to SIGKILL
    /// after `grace`. Finding no listener is a successful outcome.
    async fn terminate(
        &self,
        port: u16,
        grace: Duration,
    ) -> Result<TerminationOutcome, TerminateError>;
}

#[async_trait]
impl<T> PortTerminator for std::sync::Arc<T>
where
    T: PortTerminator + ?Sized,
{
    async fn terminate(
        &self,
        port: u16,
        grace: Duration,
    ) -> Result<TerminationOutcome, TerminateError> {
        (**self).terminate(port, grace).await
    }
}

/// Terminator backed by the operating system's process table.
#[derive(Debug, Clone)]
pub struct SystemPortTerminator {
    poll_interval: Duration,
}

impl Default for SystemPortTerminator {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl SystemPortTerminator {
    /// Terminator polling every 100 ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// How often a signalled process is checked for exit.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl PortTerminator for SystemPortTerminator {
    async fn terminate(
        &self,
        port: u16,
        grace: Duration,
    ) -> Result<TerminationOutcome, TerminateError> {
        let own_pid = std::process::id();
        let mut found = find_listeners(port).await?;
        found.retain(|pid| *pid != own_pid);
        found.sort_unstable();
        found.dedup();

        let mut outcome = TerminationOutcome {
            port,
            found: found.clone(),
            ..TerminationOutcome::default()
        };
        if found.is_empty() {
            debug!(port, "no process listening");
            return Ok(outcome);
        }

        for pid in found {
            if kill_process(pid, grace, self.poll_interval).await {
                outcome.terminated.push(pid);
            } else {
                outcome.survived.push(pid);
            }
        }
        info!(
            port,
            terminated = ?outcome.terminated,
            survived = ?outcome.survived,
            "port listeners signalled"
        );
        Ok(outcome)
    }
}

/// TCP state code for LISTEN in `/proc/net/tcp`.
const TCP_LISTEN: &str = "0A";

/// Socket inodes listening on `port` in a `/proc/net/tcp` style table.
pub fn parse_listening_inodes(table: &str, port: u16) -> Vec<u64> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || fields[3] != TCP_LISTEN {
                return None;
            }
            let (_, port_hex) = fields[1].rsplit_once(':')?;
            let local_port = u16::from_str_radix(port_hex, 16).ok()?;
            if local_port != port {
                return None;
            }
            fields[9].parse::<u64>().ok().filter(|inode| *inode != 0)
        })
        .collect()
}

/// Inode from a `/proc/<pid>/fd/<n>` link target such as `socket:[12345]`.
pub fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

#[cfg(target_os = "linux")]
async fn find_listeners(port: u16) -> Result<Vec<u32>, TerminateError> {
    let mut inodes = Vec::new();
    for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
        match tokio::fs::read_to_string(table).await {
            Ok(contents) => inodes.extend(parse_listening_inodes(&contents, port)),
            // tcp6 is absent on kernels without IPv6.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(TerminateError::Lookup { port, source }),
        }
    }
    if inodes.is_empty() {
        return Ok(Vec::new());
    }
    tokio::task::spawn_blocking(move || scan_proc_for_inodes(&inodes))
        .await
        .map_err(|err| TerminateError::Lookup {
            port,
            source: std::io::Error::new(std::io::ErrorKind::Other, err.to_string()),
        })?
        .map_err(|source| TerminateError::Lookup { port, source })
}

#[cfg(target_os = "linux")]
fn scan_proc_for_inodes(inodes: &[u64]) -> std::io::Result<Vec<u32>> {
    let mut pids = Vec::new();
    for entry in std::fs::read_dir("/proc")? {
        let entry = entry?;
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        // Processes of other users or ones that exited mid-scan are unreadable.
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        let owns_socket = fds.flatten().any(|fd| {
            std::fs::read_link(fd.path())
                .ok()
                .and_then(|target| target.to_str().and_then(parse_socket_link))
                .is_some_and(|inode| inodes.contains(&inode))
        });
        if owns_socket {
            pids.push(pid);
        }
    }
    Ok(pids)
}

#[cfg(all(unix, not(target_os = "linux")))]
async fn find_listeners(port: u16) -> Result<Vec<u32>, TerminateError> {
    let output = tokio::process::Command::new("lsof")
        .args(["-nP", "-t", &format!("-iTCP:{port}"), "-sTCP:LISTEN"])
        .output()
        .await
        .map_err(|source| TerminateError::Lookup { port, source })?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    // lsof exits 1 with empty output when nothing matches.
    if !output.status.success() && !stdout.trim().is_empty() {
        return Err(TerminateError::LookupCommand {
            port,
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect())
}

#[cfg(not(unix))]
async fn find_listeners(_port: u16) -> Result<Vec<u32>, TerminateError> {
    Err(TerminateError::Unsupported)
}

/// SIGTERM, wait up to `grace`, then SIGKILL. Returns whether the process is gone.
#[cfg(unix)]
async fn kill_process(pid: u32, grace: Duration, poll_interval: Duration) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    let nix_pid = Pid::from_raw(raw);

    if process_gone(nix_pid) {
        return true;
    }

    if let Err(err) = kill(nix_pid, Signal::SIGTERM) {
        warn!(pid, error = %err, "failed to send SIGTERM");
        return process_gone(nix_pid);
    }

    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(poll_interval).await;
        if process_gone(nix_pid) {
            debug!(pid, "process exited after SIGTERM");
            return true;
        }
    }

    warn!(pid, "process ignored SIGTERM, sending SIGKILL");
    if let Err(err) = kill(nix_pid, Signal::SIGKILL) {
        warn!(pid, error = %err, "failed to send SIGKILL");
        return process_gone(nix_pid);
    }
    tokio::time::sleep(poll_interval).await;
    process_gone(nix_pid)
}

/// A process is gone once signal 0 reports `ESRCH` or it lingers only as a
/// zombie. `EPERM` means it exists but is not ours to signal.
#[cfg(unix)]
fn process_gone(pid: nix::unistd::Pid) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;

    match kill(pid, None) {
        Err(Errno::ESRCH) => true,
        Ok(()) | Err(_) => is_zombie(pid),
    }
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: nix::unistd::Pid) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| parse_proc_state(&stat))
        .is_some_and(|state| matches!(state, 'Z' | 'X'))
}

/// Reaps `pid` when it is an exited child of this process.
#[cfg(all(unix, not(target_os = "linux")))]
fn is_zombie(pid: nix::unistd::Pid) -> bool {
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};

    matches!(
        waitpid(pid, Some(WaitPidFlag::WNOHANG)),
        Ok(status) if status != WaitStatus::StillAlive
    )
}

/// State letter from a `/proc/<pid>/stat` line, e.g. `Z` for a zombie.
pub fn parse_proc_state(stat: &str) -> Option<char> {
    // comm is parenthesised and may itself contain spaces or parentheses.
    let (_, rest) = stat.rsplit_once(')')?;
    rest.trim_start().chars().next()
}

#[cfg(not(unix))]
async fn kill_process(_pid: u32, _grace: Duration, _poll_interval: Duration) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:0DF2 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 41523 1 0000000000000000 100 0 0 10 0
   1: 0100007F:0DF2 0100007F:A1B2 01 00000000:00000000 00:00000000 00000000  1000        0 41999 1 0000000000000000 20 4 30 10 -1
   2: 00000000:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 17000 1 0000000000000000 100 0 0 10 0
";

    #[test]
    fn port_spec_accepts_colon_prefix() {
        assert_eq!("3570".parse::<PortSpec>().unwrap().port(), 3570);
        assert_eq!(":3570".parse::<PortSpec>().unwrap().port(), 3570);
        assert_eq!(PortSpec::default().to_string(), ":3570");
    }

    #[test]
    fn port_spec_rejects_garbage() {
        assert!("".parse::<PortSpec>().is_err());
        assert!(":".parse::<PortSpec>().is_err());
        assert!("0".parse::<PortSpec>().is_err());
        assert!("70000".parse::<PortSpec>().is_err());
        assert!("localhost:3570".parse::<PortSpec>().is_err());
    }

    #[test]
    fn listening_inodes_ignore_established_and_other_ports() {
        // 0x0DF2 == 3570, 0x1F90 == 8080
        assert_eq!(parse_listening_inodes(TABLE, 3570), vec![41523]);
        assert_eq!(parse_listening_inodes(TABLE, 8080), vec![17000]);
        assert!(parse_listening_inodes(TABLE, 9999).is_empty());
    }

    #[test]
    fn listening_inodes_handle_ipv6_addresses() {
        let table = "header\n   0: 00000000000000000000000000000000:0DF2 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 5150 1 0 100 0 0 10 0\n";
        assert_eq!(parse_listening_inodes(table, 3570), vec![5150]);
    }

    #[test]
    fn socket_links_parse_inode() {
        assert_eq!(parse_socket_link("socket:[41523]"), Some(41523));
        assert_eq!(parse_socket_link("pipe:[41523]"), None);
        assert_eq!(parse_socket_link("/dev/null"), None);
    }

    #[test]
    fn proc_state_skips_parenthesised_comm() {
        assert_eq!(parse_proc_state("4242 (fdh-port-holder) Z 1 4242 4242 0"), Some('Z'));
        assert_eq!(parse_proc_state("7 (odd) name (x)) S 1 7 7 0"), Some('S'));
        assert_eq!(parse_proc_state("garbage"), None);
        assert_eq!(parse_proc_state("9 (trailing)"), None);
    }

    #[cfg(unix)]
    #[test]
    fn unsignalable_process_is_not_gone() {
        // pid 1 always exists; signal 0 yields Ok or EPERM, never ESRCH.
        assert!(!process_gone(nix::unistd::Pid::from_raw(1)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn unreaped_child_counts_as_terminated_without_waiting_out_grace() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();

        let started = std::time::Instant::now();
        let gone = kill_process(child.id(), Duration::from_secs(5), Duration::from_millis(20)).await;

        assert!(gone);
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!child.wait().unwrap().success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unused_port_yields_empty_outcome() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let outcome = SystemPortTerminator::new()
            .terminate(port, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(outcome.nothing_listening());
        assert_eq!(outcome.port, port);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn never_targets_own_process() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        // Lookup may legitimately fail where lsof is unavailable.
        if let Ok(outcome) = SystemPortTerminator::new()
            .terminate(port, Duration::from_millis(10))
            .await
        {
            assert!(!outcome.found.contains(&std::process::id()));
            assert!(outcome.terminated.is_empty());
        }
        drop(listener);
    }
}
