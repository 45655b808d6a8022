//! Child process lifecycle shared by all SDK tool launchers.
//!
//! A [`ProcessLauncher`] is single-use: it spawns one process, owns it until
//! [`ProcessLauncher::stop`] and keeps the captured output readable after the
//! process has gone. Dropping a running launcher kills its child.

use crate::error::{ClientError, Result};
use crate::monitor::{OutputBuffer, OutputMonitor, StreamMode};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tracing::{debug, info, warn};

#[cfg(unix)]
use std::os::fd::OwnedFd;
#[cfg(unix)]
use tokio::net::unix::pipe;

/// Exit code reported for a process killed by a signal.
pub const SIGNALLED_EXIT_CODE: i32 = -1;

/// Program and arguments for one launch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory; the launcher's own when unset.
    pub current_dir: Option<PathBuf>,
}

impl LaunchRequest {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir: None,
        }
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Full argument vector including the program itself.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherState {
    NotStarted,
    Running,
    Stopped,
}

/// Owns one child process and the buffers its output is drained into.
#[derive(Debug)]
pub struct ProcessLauncher {
    state: LauncherState,
    mode: StreamMode,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    pid: Option<u32>,
    monitor: Option<OutputMonitor>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
}

impl Default for ProcessLauncher {
    fn default() -> Self {
        Self::new(StreamMode::default())
    }
}

impl ProcessLauncher {
    pub fn new(mode: StreamMode) -> Self {
        Self {
            state: LauncherState::NotStarted,
            mode,
            child: None,
            stdin: None,
            pid: None,
            monitor: None,
            stdout: OutputBuffer::new(),
            stderr: OutputBuffer::new(),
        }
    }

    pub fn state(&self) -> LauncherState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Spawn the process and start draining its output.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, request: &LaunchRequest) -> Result<u32> {
        if self.state != LauncherState::NotStarted {
            return Err(ClientError::AlreadyStarted);
        }

        let spawn_error = |source: std::io::Error| ClientError::Spawn {
            program: request.program.clone(),
            source,
        };

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .stdin(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.current_dir {
            cmd.current_dir(dir);
        }

        // Merged output shares one pipe between stdout and stderr, so lines
        // keep the order the child wrote them in.
        let merged = match self.mode {
            StreamMode::Merged => {
                let (reader, writer) = std::io::pipe().map_err(spawn_error)?;
                cmd.stdout(writer.try_clone().map_err(spawn_error)?)
                    .stderr(writer);
                Some(reader)
            }
            StreamMode::Separate => {
                cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
                None
            }
        };

        debug!(program = %request.program.display(), args = ?request.args, "spawning process");

        let spawned = cmd.spawn();
        // The command holds the parent's copies of the pipe's write end; the
        // reader only sees end-of-stream once they are closed.
        drop(cmd);
        let mut child = spawned.map_err(spawn_error)?;

        let pid = child.id().unwrap_or_default();
        let monitor = match merged {
            Some(reader) => OutputMonitor::spawn(
                Some(async_pipe_reader(reader).map_err(spawn_error)?),
                None::<ChildStderr>,
                &self.stdout,
                &self.stderr,
                self.mode,
            ),
            None => OutputMonitor::spawn(
                child.stdout.take(),
                child.stderr.take(),
                &self.stdout,
                &self.stderr,
                self.mode,
            ),
        };
        self.monitor = Some(monitor);
        self.stdin = child.stdin.take();
        self.child = Some(child);
        self.pid = Some(pid);
        self.state = LauncherState::Running;

        info!(pid, program = %request.program.display(), "process started");
        Ok(pid)
    }

    /// Stop output monitoring and kill the process if it is still alive.
    ///
    /// Idempotent. Does not wait for the process to exit.
    pub fn stop(&mut self) {
        if self.state == LauncherState::Stopped {
            return;
        }
        self.state = LauncherState::Stopped;
        self.stdin = None;

        if let Some(monitor) = &self.monitor {
            monitor.stop();
        }

        if let Some(child) = self.child.as_mut() {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(pid = ?self.pid, ?status, "process already exited");
                }
                Ok(None) | Err(_) => {
                    if let Err(err) = child.start_kill() {
                        warn!(pid = ?self.pid, error = %err, "failed to kill process");
                    } else {
                        info!(pid = ?self.pid, "process killed");
                    }
                }
            }
        }
    }

    /// Exit code if the process has finished, without blocking.
    pub fn try_exit_code(&mut self) -> Result<Option<i32>> {
        let child = self.child.as_mut().ok_or(ClientError::NotStarted)?;
        Ok(child
            .try_wait()?
            .map(|status| status.code().unwrap_or(SIGNALLED_EXIT_CODE)))
    }

    /// Wait for the process to exit and return its exit code.
    pub async fn wait(&mut self) -> Result<i32> {
        let child = self.child.as_mut().ok_or(ClientError::NotStarted)?;
        let status = child.wait().await?;
        Ok(status.code().unwrap_or(SIGNALLED_EXIT_CODE))
    }

    /// Write `data` to the process's stdin, then close it.
    pub async fn write_stdin(&mut self, data: &[u8]) -> Result<()> {
        let mut stdin = self.stdin.take().ok_or(ClientError::NotStarted)?;
        stdin.write_all(data).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Give the output monitor up to `limit` to collect trailing output
    /// after the process has exited.
    pub async fn settle_output(&mut self, limit: Duration) -> bool {
        match self.monitor.as_mut() {
            Some(monitor) => monitor.settle(limit).await,
            None => true,
        }
    }

    pub fn stdout(&self) -> String {
        self.stdout.contents()
    }

    pub fn stderr(&self) -> String {
        self.stderr.contents()
    }

    pub fn stdout_buffer(&self) -> &OutputBuffer {
        &self.stdout
    }

    pub fn stderr_buffer(&self) -> &OutputBuffer {
        &self.stderr
    }
}

/// Registers the read end of an anonymous pipe with the tokio reactor.
#[cfg(unix)]
fn async_pipe_reader(reader: std::io::PipeReader) -> std::io::Result<pipe::Receiver> {
    pipe::Receiver::from_owned_fd(OwnedFd::from(reader))
}

/// Pipes cannot be polled here, so reads go through tokio's blocking pool.
#[cfg(not(unix))]
fn async_pipe_reader(reader: std::io::PipeReader) -> std::io::Result<tokio::fs::File> {
    use std::os::windows::io::OwnedHandle;
    Ok(tokio::fs::File::from_std(std::fs::File::from(OwnedHandle::from(reader))))
}
