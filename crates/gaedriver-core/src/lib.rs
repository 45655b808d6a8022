//! gaedriver-core - configuration and target resolution for gaedriver.
//!
//! Plain data handling with no processes and no async. The only file the
//! crate writes is the generated `backends.yaml`.

pub mod app_id;
pub mod backends;
pub mod config;
pub mod driver_config;
pub mod ports;
pub mod target;

pub use app_id::AppId;
pub use backends::BackendsYaml;
pub use config::{Config, ConfigError};
pub use driver_config::{DriverConfig, Timing};
pub use ports::{FixedPortPicker, PortPicker, RandomPortPicker};
pub use target::{HostPort, Target, TargetKind};
