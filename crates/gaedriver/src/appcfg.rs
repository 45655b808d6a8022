//! appcfg invocations and the deploy-with-retry controller.
//!
//! appcfg reports its errors on stdout, so all pattern checks look there
//! first. A stale transaction left behind by an interrupted deployment blocks
//! every later `update` until it is rolled back; [`Deployer::update`] detects
//! that case, rolls back and tries again.
//!
//! With a backend configured every action goes through `appcfg backends`,
//! and the backend can be started, stopped and deleted.

use crate::args::{appcfg_request, backend_request};
use crate::client::ExternalClient;
use crate::error::{ClientError, Result};
use crate::launcher::{LaunchRequest, ProcessLauncher};
use crate::monitor::StreamMode;
use crate::runtime::RuntimeLocator;
use async_trait::async_trait;
use gaedriver_core::DriverConfig;
use regex::Regex;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const UPDATE: &str = "update";
pub const ROLLBACK: &str = "rollback";
pub const START: &str = "start";
pub const STOP: &str = "stop";
pub const DELETE: &str = "delete";

/// appcfg output for a `start` of a backend that is already running.
pub const ALREADY_STARTED: &str = "is already started";
/// appcfg output for a `stop` of a backend that is not running.
pub const ALREADY_STOPPED: &str = "is already stopped";

const OUTPUT_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

static TRANSACTION_CONFLICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Another transaction by user \D+ is already in progress")
        .expect("conflict pattern is valid")
});

/// True if appcfg refused to act because another transaction is open.
pub fn is_transaction_conflict(output: &str) -> bool {
    TRANSACTION_CONFLICT.is_match(output)
}

/// True if `output` mentions an error in any letter case.
pub fn shows_error(output: &str) -> bool {
    output.to_lowercase().contains("error")
}

/// One appcfg action. The password is fed on stdin right after spawning.
#[derive(Debug)]
pub struct Appcfg {
    config: DriverConfig,
    java: PathBuf,
    action: String,
    backend: Option<String>,
    options: Vec<String>,
    launcher: ProcessLauncher,
}

impl Appcfg {
    /// `options` are appended after the configured appcfg flags.
    pub fn new(
        config: &DriverConfig,
        runtime: &dyn RuntimeLocator,
        action: &str,
        options: Vec<String>,
    ) -> Self {
        let options = config
            .appcfg_flags
            .iter()
            .cloned()
            .chain(options)
            .collect();
        Self {
            config: config.clone(),
            java: runtime.java_binary(),
            action: action.to_string(),
            backend: None,
            options,
            launcher: ProcessLauncher::default(),
        }
    }

    /// Run the action as `appcfg backends` against `backend_id`.
    pub fn for_backend(mut self, backend_id: &str) -> Self {
        self.backend = Some(backend_id.to_string());
        self
    }

    pub fn with_stream_mode(mut self, mode: StreamMode) -> Self {
        self.launcher = ProcessLauncher::new(mode);
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }
}

#[async_trait]
impl ExternalClient for Appcfg {
    fn launcher(&self) -> &ProcessLauncher {
        &self.launcher
    }

    fn launcher_mut(&mut self) -> &mut ProcessLauncher {
        &mut self.launcher
    }

    fn build_request(&self) -> LaunchRequest {
        match &self.backend {
            Some(backend_id) => {
                backend_request(&self.java, &self.config, backend_id, &self.action, &self.options)
            }
            None => appcfg_request(&self.java, &self.config, &self.action, &self.options),
        }
    }

    async fn after_start(&mut self) -> Result<()> {
        let password = format!("{}\n", self.config.password);
        match self.launcher.write_stdin(password.as_bytes()).await {
            Ok(()) => {}
            // appcfg may exit before reading stdin; its exit code tells the story.
            Err(ClientError::Io(err)) if err.kind() == ErrorKind::BrokenPipe => {
                warn!(action = %self.action, "appcfg closed stdin before reading the password");
            }
            Err(err) => return Err(err),
        }

        let code = self.launcher.wait().await?;
        if !self.launcher.settle_output(OUTPUT_SETTLE_TIMEOUT).await {
            debug!(action = %self.action, "appcfg output still open after exit");
        }

        if code != 0 {
            warn!(action = %self.action, code, "appcfg failed");
            return Err(ClientError::ExitCode {
                action: self.action.clone(),
                code,
                stdout: self.launcher.stdout(),
                stderr: self.launcher.stderr(),
            });
        }

        info!(action = %self.action, backend = ?self.backend, "appcfg finished");
        Ok(())
    }
}

/// Output of a finished appcfg action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppcfgOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Result of a successful [`Deployer::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    /// `update` attempts made, including the successful one.
    pub attempts: u32,
    pub output: AppcfgOutput,
}

/// Runs appcfg actions against one configured application, or against its
/// backend when `backend_id` is set.
#[derive(Debug, Clone)]
pub struct Deployer {
    config: DriverConfig,
    runtime: Arc<dyn RuntimeLocator>,
    stream_mode: StreamMode,
}

impl Deployer {
    pub fn new(config: DriverConfig, runtime: Arc<dyn RuntimeLocator>) -> Self {
        Self {
            config,
            runtime,
            stream_mode: StreamMode::default(),
        }
    }

    /// Keep appcfg's stderr apart from its stdout.
    pub fn with_stream_mode(mut self, mode: StreamMode) -> Self {
        self.stream_mode = mode;
        self
    }

    /// The configured backend, if any.
    pub fn backend_id(&self) -> Option<&str> {
        Some(self.config.backend_id.as_str()).filter(|id| !id.is_empty())
    }

    /// Client for one action, scoped to the backend if one is configured.
    pub fn client(&self, action: &str, options: Vec<String>) -> Appcfg {
        let client = Appcfg::new(&self.config, self.runtime.as_ref(), action, options)
            .with_stream_mode(self.stream_mode);
        match self.backend_id() {
            Some(backend_id) => client.for_backend(backend_id),
            None => client,
        }
    }

    /// Run a single action to completion. The process is stopped whether
    /// the action succeeds or not.
    pub async fn run_action(&self, action: &str, options: &[String]) -> Result<AppcfgOutput> {
        let mut client = self.client(action, options.to_vec());
        let result = client.start().await;
        client.stop();
        result?;
        Ok(AppcfgOutput {
            stdout: client.stdout(),
            stderr: client.stderr(),
        })
    }

    /// Roll back a stale transaction.
    ///
    /// Any mention of an error in the rollback output counts as failure,
    /// even with a zero exit code.
    pub async fn rollback(&self) -> Result<AppcfgOutput> {
        let output = match self.run_action(ROLLBACK, &[]).await {
            Ok(output) => output,
            Err(ClientError::ExitCode { stdout, stderr, .. }) => {
                return Err(ClientError::RollbackFailed { stdout, stderr });
            }
            Err(err) => return Err(err),
        };

        if shows_error(&output.stdout) || shows_error(&output.stderr) {
            return Err(ClientError::RollbackFailed {
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Deploy the application, rolling back and retrying when a stale
    /// transaction blocks the update.
    ///
    /// Makes at most `rollback_retries` update attempts (at least one).
    /// Failures other than a transaction conflict are returned right away.
    pub async fn update(&self, options: &[String]) -> Result<UpdateReport> {
        let max_attempts = self.config.timing.rollback_retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            info!(attempt, max_attempts, backend = ?self.backend_id(), "deploying application");

            let (stdout, stderr) = match self.run_action(UPDATE, options).await {
                Ok(output) => {
                    let wait = self.config.timing.deploy_wait;
                    debug!(wait_ms = wait.as_millis() as u64, "waiting for deployment to settle");
                    tokio::time::sleep(wait).await;
                    return Ok(UpdateReport {
                        attempts: attempt,
                        output,
                    });
                }
                Err(ClientError::ExitCode {
                    action,
                    stdout,
                    stderr,
                    ..
                }) if action == UPDATE && is_transaction_conflict(&stdout) => (stdout, stderr),
                Err(err) => return Err(err),
            };

            if attempt >= max_attempts {
                warn!(attempt, "update still blocked by another transaction");
                return Err(ClientError::RetriesExhausted {
                    attempts: attempt,
                    stdout,
                    stderr,
                });
            }

            warn!(attempt, "update blocked by another transaction, rolling back");
            self.rollback().await?;
        }
    }

    /// Start the configured backend. A backend that is already running is
    /// left alone.
    pub async fn start_backend(&self) -> Result<AppcfgOutput> {
        self.backend_action(START, Some(ALREADY_STARTED)).await
    }

    /// Stop the configured backend. A backend that is not running is left
    /// alone.
    pub async fn stop_backend(&self) -> Result<AppcfgOutput> {
        self.backend_action(STOP, Some(ALREADY_STOPPED)).await
    }

    pub async fn delete_backend(&self) -> Result<AppcfgOutput> {
        self.backend_action(DELETE, None).await
    }

    /// Run a backend lifecycle action. Output containing `settled` means the
    /// backend already is where the action would take it, whatever the exit
    /// code. Otherwise any mention of an error is a failure.
    async fn backend_action(&self, action: &str, settled: Option<&str>) -> Result<AppcfgOutput> {
        let Some(backend_id) = self.backend_id() else {
            return Err(ClientError::NoBackend);
        };
        let is_settled = |stdout: &str| settled.is_some_and(|marker| stdout.contains(marker));

        let output = match self.run_action(action, &[]).await {
            Ok(output) => output,
            Err(ClientError::ExitCode { stdout, stderr, .. }) if is_settled(stdout.as_str()) => {
                AppcfgOutput { stdout, stderr }
            }
            Err(err) => return Err(err),
        };

        if is_settled(output.stdout.as_str()) {
            info!(backend = backend_id, action, "backend already in requested state");
            return Ok(output);
        }
        if shows_error(&output.stdout) || shows_error(&output.stderr) {
            warn!(backend = backend_id, action, "backend action reported an error");
            return Err(ClientError::BackendAction {
                action: action.to_string(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        info!(backend = backend_id, action, "backend action finished");
        Ok(output)
    }
}
