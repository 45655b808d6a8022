//! Set up and tear down an application under test.

use crate::appcfg::{Deployer, UpdateReport};
use crate::client::ExternalClient;
use crate::dev_server::DevServer;
use crate::error::{ClientError, Result};
use crate::launcher::LauncherState;
use crate::runtime::RuntimeLocator;
use gaedriver_core::{BackendsYaml, DriverConfig};
use std::sync::Arc;
use tracing::{info, warn};

/// Picks the dev server or an appcfg deployment based on the resolved target.
///
/// A cluster target is deployed with `update`; anything on `localhost` runs on
/// a dev server that lives until [`GaeDriver::tear_down_app`] or until the
/// driver is dropped. With a backend configured, a cluster deployment also
/// writes `backends.yaml` and starts the backend, and tear down stops and
/// deletes it again.
#[derive(Debug)]
pub struct GaeDriver {
    config: DriverConfig,
    runtime: Arc<dyn RuntimeLocator>,
    options: Vec<String>,
    dev_server: Option<DevServer>,
    backends_yaml: Option<BackendsYaml>,
    last_update: Option<UpdateReport>,
}

impl GaeDriver {
    pub fn new(config: DriverConfig, runtime: Arc<dyn RuntimeLocator>) -> Self {
        Self {
            config,
            runtime,
            options: Vec::new(),
            dev_server: None,
            backends_yaml: None,
            last_update: None,
        }
    }

    /// Extra options for the tool that sets the app up.
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn deployer(&self) -> Deployer {
        Deployer::new(self.config.clone(), Arc::clone(&self.runtime))
    }

    pub async fn set_up_app(&mut self) -> Result<()> {
        let server_running = self
            .dev_server
            .as_ref()
            .is_some_and(|server| server.launcher().state() == LauncherState::Running);
        if server_running || self.backends_yaml.is_some() {
            return Err(ClientError::AlreadyStarted);
        }

        if self.config.target.is_cluster() {
            info!(app = %self.config.app_id, host = %self.config.target.app_hostname, "deploying app");
            let deployer = self.deployer();
            if deployer.backend_id().is_none() {
                self.last_update = Some(deployer.update(&self.options).await?);
                return Ok(());
            }

            let yaml = BackendsYaml::install(
                &self.config.app_dir,
                &self.config.backend_id,
                self.config.backend_instances,
            )?;
            match Self::deploy_backend(&deployer, &self.options).await {
                Ok(report) => {
                    self.last_update = Some(report);
                    self.backends_yaml = Some(yaml);
                    return Ok(());
                }
                Err(err) => {
                    if let Err(restore_err) = yaml.restore() {
                        warn!(error = %restore_err, "could not restore backends.yaml");
                    }
                    return Err(err);
                }
            }
        }

        let mut server = DevServer::new(&self.config, self.runtime.as_ref(), self.options.clone())?;
        info!(app = %self.config.app_id, address = %server.address(), "starting dev server");
        if let Err(err) = server.start().await {
            server.stop();
            return Err(err);
        }
        self.dev_server = Some(server);
        Ok(())
    }

    async fn deploy_backend(deployer: &Deployer, options: &[String]) -> Result<UpdateReport> {
        let report = deployer.update(options).await?;
        deployer.start_backend().await?;
        Ok(report)
    }

    /// Stop the dev server, or stop and delete a deployed backend.
    ///
    /// Frontend deployments stay deployed. `backends.yaml` is restored even if
    /// stopping or deleting the backend fails; the first failure is returned.
    pub async fn tear_down_app(&mut self) -> Result<()> {
        if let Some(server) = self.dev_server.as_mut() {
            info!(address = %server.address(), "stopping dev server");
            server.stop();
        }

        let Some(yaml) = self.backends_yaml.take() else {
            return Ok(());
        };
        let deployer = self.deployer();
        info!(backend = %self.config.backend_id, "removing backend");
        let removed = async {
            deployer.stop_backend().await?;
            deployer.delete_backend().await
        }
        .await;
        let restored = yaml.restore();
        removed?;
        restored?;
        Ok(())
    }

    pub fn dev_server(&self) -> Option<&DevServer> {
        self.dev_server.as_ref()
    }

    /// True between a backend set up and its tear down.
    pub fn has_backend(&self) -> bool {
        self.backends_yaml.is_some()
    }

    pub fn last_update(&self) -> Option<&UpdateReport> {
        self.last_update.as_ref()
    }

    /// Dev server stdout, empty if none was started.
    pub fn stdout(&self) -> String {
        self.dev_server
            .as_ref()
            .map(|server| server.stdout())
            .unwrap_or_default()
    }

    pub fn stderr(&self) -> String {
        self.dev_server
            .as_ref()
            .map(|server| server.stderr())
            .unwrap_or_default()
    }
}
