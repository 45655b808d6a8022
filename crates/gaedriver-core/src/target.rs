//! Where the application under test lives: a hosted cluster or a local dev
//! server, and the hostnames derived from that choice.

use crate::app_id::AppId;
use crate::config::ConfigError;
use crate::ports::PortPicker;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Port used for the dev server when nothing else is known.
pub const DEFAULT_DEV_SERVER_PORT: u16 = 8080;

/// Admin-console hostname placeholder for dev server targets.
pub const NO_AC_ON_DEV_SERVER: &str = "AC_NOT_AVAILABLE_ON_DEVAPPSERVER";

/// Anything not starting with `localhost` is treated as a hosted cluster.
pub fn is_cluster_appserver(cluster_hostname: &str) -> bool {
    !cluster_hostname.starts_with("localhost")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Deployed with appcfg to a hosted cluster.
    Cluster,
    /// Served locally by the dev server.
    DevServer,
}

/// Resolved hostnames for one application environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    pub cluster_hostname: String,
    /// Hostname (optionally `host:port`) the application answers on.
    pub app_hostname: String,
    /// Admin-console hostname passed to appcfg as `--server`.
    pub ac_hostname: String,
}

impl Target {
    /// Derive the target from configured hostnames.
    ///
    /// An empty cluster hostname selects a dev server on a free local port;
    /// if `ports` finds none, [`DEFAULT_DEV_SERVER_PORT`] is used.
    pub fn resolve(
        app_id: &AppId,
        backend_id: &str,
        cluster_hostname: &str,
        ac_hostname: &str,
        ports: &dyn PortPicker,
    ) -> Self {
        let cluster_hostname = if cluster_hostname.is_empty() {
            let port = ports
                .pick_unused_port()
                .unwrap_or(DEFAULT_DEV_SERVER_PORT);
            format!("localhost:{port}")
        } else {
            cluster_hostname.to_string()
        };

        if is_cluster_appserver(&cluster_hostname) {
            let app_hostname = if backend_id.is_empty() {
                format!("{}.{cluster_hostname}", app_id.display)
            } else {
                format!("{backend_id}.{}.{cluster_hostname}", app_id.display)
            };
            Self {
                kind: TargetKind::Cluster,
                cluster_hostname,
                app_hostname,
                ac_hostname: ac_hostname.to_string(),
            }
        } else {
            Self {
                kind: TargetKind::DevServer,
                app_hostname: cluster_hostname.clone(),
                cluster_hostname,
                ac_hostname: NO_AC_ON_DEV_SERVER.to_string(),
            }
        }
    }

    pub fn is_cluster(&self) -> bool {
        self.kind == TargetKind::Cluster
    }
}

/// A host and port split from a `host[:port]` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    /// Split on the first colon; without one, `default_port` is used.
    pub fn parse(hostname: &str, default_port: u16) -> Result<Self, ConfigError> {
        match hostname.split_once(':') {
            None => Ok(Self {
                host: hostname.to_string(),
                port: default_port,
            }),
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;
                Ok(Self {
                    host: host.to_string(),
                    port,
                })
            }
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
