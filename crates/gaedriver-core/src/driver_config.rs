//! Resolved, read-only configuration snapshot consumed by the launchers.

use crate::app_id::AppId;
use crate::config::Config;
use crate::ports::PortPicker;
use crate::target::Target;
use std::path::PathBuf;
use std::time::Duration;

/// Polling and retry knobs for the SDK tool launchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Substring in dev server output that signals readiness.
    pub ready_marker: String,
    /// Longest time to wait for the ready marker.
    pub startup_timeout: Duration,
    /// Interval between readiness checks.
    pub poll_interval: Duration,
    /// Pause after a successful deployment before the app is used.
    pub deploy_wait: Duration,
    /// Total `update` attempts when a stale transaction blocks deployment.
    pub rollback_retries: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Timing {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ready_marker: config.ready_marker.clone(),
            startup_timeout: config.startup_timeout(),
            poll_interval: config.poll_interval(),
            deploy_wait: config.deploy_wait(),
            rollback_retries: config.rollback_retries,
        }
    }
}

/// Configuration after application-ID parsing and target resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub app_id: AppId,
    pub backend_id: String,
    pub backend_instances: u32,
    pub target: Target,
    pub sdk_dir: PathBuf,
    pub app_dir: PathBuf,
    pub java_home: Option<PathBuf>,
    pub username: String,
    pub password: String,
    /// Extra flags for every appcfg invocation.
    pub appcfg_flags: Vec<String>,
    pub timing: Timing,
}

impl DriverConfig {
    /// Resolve a raw [`Config`]. `ports` is only consulted when no cluster
    /// hostname is configured.
    pub fn resolve(config: &Config, ports: &dyn PortPicker) -> Self {
        let app_id = AppId::parse(&config.app_id);
        let target = Target::resolve(
            &app_id,
            &config.backend_id,
            &config.cluster_hostname,
            &config.ac_hostname,
            ports,
        );
        Self {
            app_id,
            backend_id: config.backend_id.clone(),
            backend_instances: config.backend_instances,
            target,
            sdk_dir: config.sdk_dir.clone(),
            app_dir: config.app_dir.clone(),
            java_home: config.java_home.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            appcfg_flags: config.appcfg_flags.clone(),
            timing: Timing::from_config(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedPortPicker;
    use crate::target::{TargetKind, NO_AC_ON_DEV_SERVER};

    fn test_config() -> Config {
        Config {
            app_id: "s~appId".to_string(),
            backend_id: "backendId".to_string(),
            backend_instances: 3,
            cluster_hostname: "clusterHostname".to_string(),
            sdk_dir: PathBuf::from("sdkDir"),
            app_dir: PathBuf::from("appDir"),
            ac_hostname: "acHostname".to_string(),
            username: "username".to_string(),
            password: "password".to_string(),
            appcfg_flags: vec!["--flag".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn resolve_copies_fields_and_parses_app_id() {
        let resolved = DriverConfig::resolve(&test_config(), &FixedPortPicker(None));
        assert_eq!(resolved.app_id.full, "s~appId");
        assert_eq!(resolved.app_id.display, "appId");
        assert_eq!(resolved.backend_id, "backendId");
        assert_eq!(resolved.backend_instances, 3);
        assert_eq!(resolved.sdk_dir, PathBuf::from("sdkDir"));
        assert_eq!(resolved.app_dir, PathBuf::from("appDir"));
        assert_eq!(resolved.username, "username");
        assert_eq!(resolved.password, "password");
        assert_eq!(resolved.appcfg_flags, vec!["--flag"]);
        assert_eq!(resolved.target.kind, TargetKind::Cluster);
        assert_eq!(resolved.target.ac_hostname, "acHostname");
        assert_eq!(
            resolved.target.app_hostname,
            "backendId.appId.clusterHostname"
        );
    }

    #[test]
    fn resolve_local_target_uses_picked_port() {
        let config = Config {
            cluster_hostname: String::new(),
            ..test_config()
        };
        let resolved = DriverConfig::resolve(&config, &FixedPortPicker(Some(4711)));
        assert_eq!(resolved.target.kind, TargetKind::DevServer);
        assert_eq!(resolved.target.app_hostname, "localhost:4711");
        assert_eq!(resolved.target.ac_hostname, NO_AC_ON_DEV_SERVER);
    }

    #[test]
    fn timing_defaults_match_config_defaults() {
        let timing = Timing::default();
        assert_eq!(timing.startup_timeout, Duration::from_millis(60_000));
        assert_eq!(timing.poll_interval, Duration::from_millis(500));
        assert_eq!(timing.rollback_retries, 2);
    }
}
