//! gaedriver - App Engine SDK tool driver
//!
//! Launches the local dev server or deploys with appcfg, captures the tools'
//! output and turns their exit codes and messages into [`ClientError`]s.
//! Configuration parsing and target resolution live in `gaedriver-core`.

pub mod appcfg;
pub mod args;
pub mod client;
pub mod dev_server;
pub mod driver;
pub mod error;
pub mod launcher;
pub mod monitor;
pub mod runtime;

pub use appcfg::{Appcfg, AppcfgOutput, Deployer, UpdateReport};
pub use client::ExternalClient;
pub use dev_server::{DevServer, Readiness};
pub use driver::GaeDriver;
pub use error::{ClientError, Result};
pub use launcher::{LaunchRequest, LauncherState, ProcessLauncher};
pub use monitor::{OutputBuffer, StreamMode};
pub use runtime::{FixedRuntime, JavaHome, RuntimeLocator};
