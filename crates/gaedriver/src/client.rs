//! The lifecycle shared by the dev server and appcfg launchers.

use crate::error::Result;
use crate::launcher::{LaunchRequest, ProcessLauncher};
use async_trait::async_trait;

/// An external SDK tool run as a child process.
///
/// Implementors supply the command line and what happens after the process
/// is up (waiting for readiness, feeding credentials). Start, stop and output
/// access come from the shared [`ProcessLauncher`].
#[async_trait]
pub trait ExternalClient: Send {
    fn launcher(&self) -> &ProcessLauncher;

    fn launcher_mut(&mut self) -> &mut ProcessLauncher;

    /// The command line for this client.
    fn build_request(&self) -> LaunchRequest;

    /// Runs once the process has been spawned.
    async fn after_start(&mut self) -> Result<()>;

    /// Spawn the tool and run [`ExternalClient::after_start`].
    ///
    /// On error the process may still be running; call
    /// [`ExternalClient::stop`] to clean up.
    async fn start(&mut self) -> Result<()> {
        let request = self.build_request();
        self.launcher_mut().start(&request)?;
        self.after_start().await
    }

    fn stop(&mut self) {
        self.launcher_mut().stop();
    }

    fn stdout(&self) -> String {
        self.launcher().stdout()
    }

    fn stderr(&self) -> String {
        self.launcher().stderr()
    }
}
