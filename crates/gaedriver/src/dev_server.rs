//! Local dev server launcher.
//!
//! After the process is spawned, [`DevServer::start`] polls the captured
//! output until the ready marker shows up, the process dies, or the startup
//! timeout runs out.

use crate::args::dev_server_request;
use crate::client::ExternalClient;
use crate::error::{ClientError, Result};
use crate::launcher::{LaunchRequest, ProcessLauncher};
use crate::runtime::RuntimeLocator;
use async_trait::async_trait;
use gaedriver_core::target::DEFAULT_DEV_SERVER_PORT;
use gaedriver_core::{DriverConfig, HostPort};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long to wait for trailing output once the process has exited.
const OUTPUT_SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Waiting,
    Ready,
    Failed,
    TimedOut,
}

#[derive(Debug)]
pub struct DevServer {
    config: DriverConfig,
    java: PathBuf,
    address: HostPort,
    options: Vec<String>,
    launcher: ProcessLauncher,
    readiness: Readiness,
}

impl DevServer {
    /// Fails with [`ClientError::InvalidConfig`] if the application hostname
    /// carries a port that is not a number.
    pub fn new(
        config: &DriverConfig,
        runtime: &dyn RuntimeLocator,
        options: Vec<String>,
    ) -> Result<Self> {
        let address = HostPort::parse(&config.target.app_hostname, DEFAULT_DEV_SERVER_PORT)?;
        Ok(Self {
            config: config.clone(),
            java: runtime.java_binary(),
            address,
            options,
            launcher: ProcessLauncher::default(),
            readiness: Readiness::Waiting,
        })
    }

    /// Address the dev server is told to listen on.
    pub fn address(&self) -> &HostPort {
        &self.address
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    /// Poll until the ready marker appears.
    ///
    /// The marker is checked before the exit status, so a server that printed
    /// the marker counts as ready even if it exits right after.
    pub async fn wait_until_ready(&mut self) -> Result<()> {
        let timing = &self.config.timing;
        let marker = timing.ready_marker.as_str();
        let started = Instant::now();

        loop {
            if self.launcher.stdout_buffer().contains(marker) {
                self.readiness = Readiness::Ready;
                info!(
                    address = %self.address,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "dev server ready"
                );
                return Ok(());
            }

            if let Some(code) = self.launcher.try_exit_code()? {
                self.launcher.settle_output(OUTPUT_SETTLE_TIMEOUT).await;
                if self.launcher.stdout_buffer().contains(marker) {
                    self.readiness = Readiness::Ready;
                    warn!(code, "dev server exited right after becoming ready");
                    return Ok(());
                }

                self.readiness = Readiness::Failed;
                let stdout = self.launcher.stdout();
                let stderr = self.launcher.stderr();
                warn!(code, "dev server exited before becoming ready");
                return Err(if code == 0 {
                    ClientError::Terminated { stdout, stderr }
                } else {
                    ClientError::StartupFailed {
                        code,
                        stdout,
                        stderr,
                    }
                });
            }

            let elapsed = started.elapsed();
            if elapsed >= timing.startup_timeout {
                self.readiness = Readiness::TimedOut;
                warn!(
                    timeout_ms = timing.startup_timeout.as_millis() as u64,
                    "dev server did not become ready"
                );
                return Err(ClientError::StartupTimeout {
                    waited_ms: elapsed.as_millis() as u64,
                    stdout: self.launcher.stdout(),
                    stderr: self.launcher.stderr(),
                });
            }

            debug!(elapsed_ms = elapsed.as_millis() as u64, "waiting for dev server");
            let remaining = timing.startup_timeout.saturating_sub(elapsed);
            tokio::time::sleep(timing.poll_interval.min(remaining)).await;
        }
    }
}

#[async_trait]
impl ExternalClient for DevServer {
    fn launcher(&self) -> &ProcessLauncher {
        &self.launcher
    }

    fn launcher_mut(&mut self) -> &mut ProcessLauncher {
        &mut self.launcher
    }

    fn build_request(&self) -> LaunchRequest {
        dev_server_request(&self.java, &self.config, &self.address, &self.options)
    }

    async fn after_start(&mut self) -> Result<()> {
        self.wait_until_ready().await
    }
}
