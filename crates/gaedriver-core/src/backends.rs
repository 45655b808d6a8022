//! `backends.yaml` for deployments that target a backend.
//!
//! The file is generated into the application directory before `update` and
//! put back the way it was on tear down. A file that was already there is
//! parked next to it as [`BACKENDS_YAML_BACKUP`] in the meantime.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const BACKENDS_YAML: &str = "backends.yaml";
pub const BACKENDS_YAML_BACKUP: &str = "backends.yaml.e2e";

/// Instances used when `backendInstances` is unset or zero.
pub const DEFAULT_BACKEND_INSTANCES: u32 = 2;

/// Contents of a `backends.yaml` declaring a single public, dynamic backend.
pub fn render(backend_id: &str, instances: u32) -> String {
    let instances = if instances == 0 {
        DEFAULT_BACKEND_INSTANCES
    } else {
        instances
    };
    format!("backends:\n- name: {backend_id}\n  options: public, dynamic\n  instances: {instances}\n")
}

/// A generated `backends.yaml` that has to be restored once the backend is
/// gone.
#[derive(Debug)]
#[must_use = "the generated backends.yaml stays in place until restore() is called"]
pub struct BackendsYaml {
    path: PathBuf,
    backup: PathBuf,
    had_original: bool,
}

impl BackendsYaml {
    /// Write `backends.yaml` for `backend_id` into `app_dir`.
    ///
    /// A backup left behind by an interrupted run is kept as is, since it
    /// holds the user's file and the current one was generated.
    pub fn install(app_dir: &Path, backend_id: &str, instances: u32) -> io::Result<Self> {
        let path = app_dir.join(BACKENDS_YAML);
        let backup = app_dir.join(BACKENDS_YAML_BACKUP);

        let had_original = if backup.exists() {
            debug!(backup = %backup.display(), "keeping backup from an earlier run");
            true
        } else if path.exists() {
            std::fs::copy(&path, &backup)?;
            debug!(backup = %backup.display(), "backed up backends.yaml");
            true
        } else {
            false
        };

        std::fs::write(&path, render(backend_id, instances))?;
        info!(path = %path.display(), backend = backend_id, "wrote backends.yaml");
        Ok(Self {
            path,
            backup,
            had_original,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if a user's `backends.yaml` was set aside.
    pub fn had_original(&self) -> bool {
        self.had_original
    }

    /// Put the user's `backends.yaml` back, or remove the generated one if
    /// there was none.
    pub fn restore(self) -> io::Result<()> {
        if self.had_original {
            std::fs::copy(&self.backup, &self.path)?;
            std::fs::remove_file(&self.backup)?;
            info!(path = %self.path.display(), "restored backends.yaml");
        } else {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
            info!(path = %self.path.display(), "removed generated backends.yaml");
        }
        Ok(())
    }
}
