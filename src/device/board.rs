//! Simulated board process.
//!
//! A board is an external simulator (for example `simavr` running a
//! firmware image) that publishes its UART as an OS serial path. The bridge
//! only starts it, waits for the path to appear and kills it again.

// ============================================================================
// Imports
// ============================================================================

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Serial path published by the default simulator.
pub const DEFAULT_PORT_PATH: &str = "/tmp/simavr-uart0";

/// Interval between checks for the serial path.
const PORT_POLL_INTERVAL: Duration = Duration::from_millis(20);

// ============================================================================
// BoardCommand
// ============================================================================

/// How to start a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardCommand {
    /// Simulator executable.
    pub program: PathBuf,
    /// Arguments passed to the simulator.
    pub args: Vec<OsString>,
    /// Working directory, or the current one.
    pub cwd: Option<PathBuf>,
    /// Serial path the simulator publishes.
    pub port_path: PathBuf,
}

impl BoardCommand {
    /// Creates a command for `program` publishing [`DEFAULT_PORT_PATH`].
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            port_path: PathBuf::from(DEFAULT_PORT_PATH),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets the serial path the simulator publishes.
    #[must_use]
    pub fn port_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.port_path = path.into();
        self
    }
}

// ============================================================================
// ProcessGuard
// ============================================================================

/// Kills the simulator when dropped.
struct ProcessGuard {
    child: Option<Child>,
    pid: u32,
}

impl ProcessGuard {
    fn new(child: Child) -> Self {
        let pid = child.id().unwrap_or(0);
        debug!(pid, "Board process guard created");
        Self {
            child: Some(child),
            pid,
        }
    }

    /// Kills the process and waits for it to exit.
    async fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!(pid = self.pid, error = %e, "Failed to kill board");
            }
            info!(pid = self.pid, "Board terminated");
        }
    }

    /// Returns `true` while the process is running.
    fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(e) = child.start_kill()
        {
            debug!(pid = self.pid, error = %e, "Failed to send kill signal in Drop");
        }
    }
}

// ============================================================================
// Board
// ============================================================================

/// A running simulator process.
pub struct Board {
    process: ProcessGuard,
    port_path: PathBuf,
}

impl Board {
    /// Starts the simulator with inherited stdio.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BoardLaunchFailed`] if the process cannot be spawned.
    pub fn spawn(command: &BoardCommand) -> Result<Self> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(ref cwd) = command.cwd {
            cmd.current_dir(cwd);
        }

        let child = cmd.spawn().map_err(Error::board_launch_failed)?;
        let process = ProcessGuard::new(child);

        info!(
            pid = process.pid,
            program = %command.program.display(),
            port_path = %command.port_path.display(),
            "Board started"
        );

        Ok(Self {
            process,
            port_path: command.port_path.clone(),
        })
    }

    /// Returns the serial path the board publishes.
    #[inline]
    #[must_use]
    pub fn port_path(&self) -> &Path {
        &self.port_path
    }

    /// Returns the process ID.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.process.pid
    }

    /// Waits until the serial path exists.
    ///
    /// # Errors
    ///
    /// - [`Error::BoardLaunchFailed`] if the process exits first
    /// - [`Error::Config`] if the path does not appear within `limit`
    pub async fn wait_for_port(&mut self, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;

        loop {
            if tokio::fs::try_exists(&self.port_path).await.unwrap_or(false) {
                debug!(port_path = %self.port_path.display(), "Board serial path ready");
                return Ok(());
            }

            if !self.process.is_running() {
                return Err(Error::BoardLaunchFailed {
                    message: "board exited before publishing its serial path".into(),
                });
            }

            if Instant::now() >= deadline {
                return Err(Error::config(format!(
                    "serial path {} did not appear within {}ms",
                    self.port_path.display(),
                    limit.as_millis()
                )));
            }

            sleep(PORT_POLL_INTERVAL).await;
        }
    }

    /// Kills the board and waits for it to exit.
    pub async fn stop(mut self) {
        self.process.kill().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_defaults() {
        let command = BoardCommand::new("simavr");
        assert_eq!(command.port_path, Path::new(DEFAULT_PORT_PATH));
        assert!(command.args.is_empty());
        assert!(command.cwd.is_none());
    }

    #[test]
    fn test_command_builder() {
        let command = BoardCommand::new("simavr")
            .arg("-m")
            .arg("atmega328p")
            .cwd("/opt/fw")
            .port_path("/tmp/uart1");

        assert_eq!(command.args, vec![OsString::from("-m"), OsString::from("atmega328p")]);
        assert_eq!(command.cwd.as_deref(), Some(Path::new("/opt/fw")));
        assert_eq!(command.port_path, Path::new("/tmp/uart1"));
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let command = BoardCommand::new("/definitely/not/a/simulator");
        let result = Board::spawn(&command);
        assert!(matches!(result, Err(Error::BoardLaunchFailed { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exited_board_reports_launch_failure() {
        let command = BoardCommand::new("true").port_path("/definitely/not/published");
        let mut board = Board::spawn(&command).expect("spawn");

        let result = board.wait_for_port(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::BoardLaunchFailed { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_for_existing_path() {
        let command = BoardCommand::new("sleep").arg("5").port_path("/");
        let mut board = Board::spawn(&command).expect("spawn");

        board
            .wait_for_port(Duration::from_secs(1))
            .await
            .expect("path exists");
        board.stop().await;
    }
}
