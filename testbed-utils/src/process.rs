//! Module for supervising groups of long-running child processes.
//!
//! The orchestration scripts start one process per emulated node and watch
//! their combined output until a wall-clock deadline, at which point every
//! member receives an interrupt. There is no confirmation that a member
//! actually exits; the caller decides whether to wait further.

use std::fmt;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::Instant;

/// Error raised when an external command could not be run or exited non-zero.
#[derive(Debug)]
pub struct CommandError {
    /// The full command line that was attempted.
    pub command: String,
    pub kind: CommandErrorKind,
}

#[derive(Debug)]
pub enum CommandErrorKind {
    /// The process could not be spawned at all.
    Spawn(std::io::Error),
    /// The process ran but exited with a non-zero status.
    Status(ExitStatus),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CommandErrorKind::Spawn(e) => {
                write!(f, "could not run `{}`: {}", self.command, e)
            }
            CommandErrorKind::Status(status) => {
                write!(f, "`{}` exited with {}", self.command, status)
            }
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            CommandErrorKind::Spawn(e) => Some(e),
            CommandErrorKind::Status(_) => None,
        }
    }
}

/// Run an external command to completion, capturing its output and mapping a
/// non-zero exit status to an error.
pub async fn run_checked<I, S>(argv: I) -> Result<Output, CommandError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let argv: Vec<String> = argv.into_iter().map(|s| s.as_ref().to_string()).collect();
    let command = argv.join(" ");
    log::debug!("running `{command}`");

    let output = Command::new(&argv[0])
        .args(&argv[1..])
        .output()
        .await
        .map_err(|e| CommandError {
            command: command.clone(),
            kind: CommandErrorKind::Spawn(e),
        })?;

    if output.status.success() {
        Ok(output)
    } else {
        log::debug!(
            "stderr of `{command}`: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        Err(CommandError {
            command,
            kind: CommandErrorKind::Status(output.status),
        })
    }
}

struct Member {
    name: String,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    /// Set once the member's stdout reached EOF.
    done: bool,
}

/// A named collection of child processes whose combined stdout is polled
/// cooperatively, in the manner of mininet's `pmonitor`.
pub struct ProcessGroup {
    name: String,
    members: Vec<Member>,
}

impl ProcessGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Spawn a new member process. Stdout is piped for monitoring; stderr is
    /// inherited so failures of the node executables remain visible.
    pub fn spawn(&mut self, name: impl Into<String>, cmd: &mut Command) -> std::io::Result<()> {
        let name = name.into();
        let mut child = cmd.stdout(Stdio::piped()).stderr(Stdio::inherit()).spawn()?;
        let stdout = child
            .stdout
            .take()
            .expect("stdout was configured as piped");
        log::debug!("[{}] spawned member {name}", self.name);
        self.members.push(Member {
            name,
            child,
            lines: BufReader::new(stdout).lines(),
            done: false,
        });
        Ok(())
    }

    /// Poll the members' combined output until the deadline passes, logging
    /// every line as `<name>: line`. Afterwards, every member is sent an
    /// interrupt signal. Polling is bounded by `poll` per member, so a full
    /// pass over the group never blocks indefinitely.
    pub async fn monitor_until(&mut self, deadline: Instant, poll: Duration) {
        while Instant::now() < deadline {
            let mut saw_output = false;
            for member in self.members.iter_mut().filter(|m| !m.done) {
                match tokio::time::timeout(poll, member.lines.next_line()).await {
                    Ok(Ok(Some(line))) => {
                        log::info!("<{}>: {}", member.name, line);
                        saw_output = true;
                    }
                    Ok(Ok(None)) => member.done = true,
                    Ok(Err(e)) => {
                        log::warn!("<{}>: read error: {e}", member.name);
                        member.done = true;
                    }
                    // no output within the poll window
                    Err(_) => {}
                }
            }
            if !saw_output && self.members.iter().all(|m| m.done) {
                // all streams closed, nothing left to monitor
                tokio::time::sleep_until(deadline).await;
                break;
            }
            if self.members.is_empty() {
                tokio::time::sleep(poll).await;
            }
        }
        self.interrupt_all().await;
    }

    /// Send SIGINT to every member. Delivery is not confirmed.
    pub async fn interrupt_all(&mut self) {
        self.signal_all("-INT").await;
    }

    /// Send SIGTERM to every member. Delivery is not confirmed.
    pub async fn terminate_all(&mut self) {
        self.signal_all("-TERM").await;
    }

    async fn signal_all(&mut self, signal: &str) {
        for member in &self.members {
            let Some(pid) = member.child.id() else {
                // already exited and reaped
                continue;
            };
            log::debug!("[{}] sending {signal} to {} (pid {pid})", self.name, member.name);
            if let Err(e) = run_checked(["kill", signal, &pid.to_string()]).await {
                log::warn!("[{}] could not signal {}: {e}", self.name, member.name);
            }
        }
    }
}

impl fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("name", &self.name)
            .field("members", &self.members.iter().map(|m| &m.name).collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn run_checked_captures_output() {
        let out = run_checked(["echo", "hello"]).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn run_checked_reports_failure() {
        let err = run_checked(["false"]).await.unwrap_err();
        assert!(matches!(err.kind, CommandErrorKind::Status(_)));
        assert_eq!(err.command, "false");
    }

    #[tokio::test]
    async fn monitor_stops_at_deadline() {
        let mut group = ProcessGroup::new("test");
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "while true; do echo tick; sleep 1; done"]);
        group.spawn("ticker", &mut cmd).unwrap();

        let deadline = Instant::now() + Duration::from_millis(600);
        group.monitor_until(deadline, Duration::from_millis(100)).await;
        assert!(Instant::now() >= deadline);
    }

    #[tokio::test]
    async fn monitor_drains_short_lived_members() {
        let mut group = ProcessGroup::new("test");
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo one; echo two"]);
        group.spawn("short", &mut cmd).unwrap();

        let deadline = Instant::now() + Duration::from_millis(400);
        group.monitor_until(deadline, Duration::from_millis(50)).await;
        assert!(group.members[0].done);
    }
}
