//! Configuration parsing for the driver.
//!
//! Reads the properties-style `key=value` file (default
//! `~/.gaedriver.properties`). `key: value` is accepted as well, and `#` or
//! `!` start a comment line.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Name of the configuration file looked up in the user's home directory.
pub const DEFAULT_CONFIG_FILE: &str = ".gaedriver.properties";

/// Marker the dev server prints once it accepts connections.
pub const DEFAULT_READY_MARKER: &str = "The server is running at";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
    #[error("\"{0}\" is not a valid port")]
    InvalidPort(String),
    #[error("cannot locate home directory for the default config file")]
    NoHomeDir,
}

/// Raw driver settings as written by the user.
///
/// Field names match the property keys of the properties file
/// (`appId`, `clusterHostname`, ...). Nothing here is resolved yet; see
/// [`crate::DriverConfig::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    // Application
    pub app_id: String,
    pub backend_id: String,
    pub backend_instances: u32,

    // Hosts
    pub cluster_hostname: String,
    pub ac_hostname: String,

    // Local directories
    pub sdk_dir: PathBuf,
    pub app_dir: PathBuf,
    /// Java installation used to run the SDK tools. Falls back to `JAVA_HOME`.
    pub java_home: Option<PathBuf>,

    // Credentials
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,

    /// Extra flags passed to every appcfg invocation.
    pub appcfg_flags: Vec<String>,

    // Timing and retries
    pub ready_marker: String,
    pub startup_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub deploy_wait_ms: u64,
    pub rollback_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            backend_id: String::new(),
            backend_instances: 0,
            cluster_hostname: String::new(),
            ac_hostname: String::new(),
            sdk_dir: PathBuf::new(),
            app_dir: PathBuf::new(),
            java_home: None,
            username: String::new(),
            password: String::new(),
            appcfg_flags: Vec::new(),
            ready_marker: DEFAULT_READY_MARKER.to_string(),
            startup_timeout_ms: 60_000,
            poll_interval_ms: 500,
            deploy_wait_ms: 2_000,
            rollback_retries: 2,
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load config from `~/.gaedriver.properties`.
    pub fn from_default_file() -> Result<Self, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoHomeDir)?;
        Self::from_file(&path)
    }

    /// Location of the default config file, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_FILE))
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content, &path.display().to_string())
    }

    /// Parse config content (key=value format).
    pub fn parse_content(&mut self, content: &str, source: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                continue;
            }

            let Some((key, value)) = Self::split_entry(trimmed) else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value, source)?;
        }
        Ok(())
    }

    /// Split at the first `=` or `:`, whichever comes first.
    fn split_entry(line: &str) -> Option<(&str, &str)> {
        let idx = line.find(['=', ':'])?;
        Some((&line[..idx], &line[idx + 1..]))
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    fn apply_value(&mut self, key: &str, value: &str, source: &str) -> Result<(), ConfigError> {
        match key {
            "appId" => self.app_id = value.to_string(),
            "backendId" => self.backend_id = value.to_string(),
            "backendInstances" => {
                // An empty value means "no backends".
                self.backend_instances = if value.is_empty() {
                    0
                } else {
                    Self::parse_int(key, value)?
                };
            }
            "clusterHostname" => self.cluster_hostname = value.to_string(),
            "acHostname" => self.ac_hostname = value.to_string(),
            "sdkDir" => self.sdk_dir = PathBuf::from(value),
            "appDir" => self.app_dir = PathBuf::from(value),
            "javaHome" => {
                self.java_home = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            "username" => self.username = value.to_string(),
            "password" => self.password = value.to_string(),
            "appcfgFlags" => {
                self.appcfg_flags = value.split_whitespace().map(str::to_string).collect();
            }
            "readyMarker" => self.ready_marker = value.to_string(),
            "startupTimeoutMs" => self.startup_timeout_ms = Self::parse_int(key, value)?,
            "pollIntervalMs" => self.poll_interval_ms = Self::parse_int(key, value)?,
            "deployWaitMs" => self.deploy_wait_ms = Self::parse_int(key, value)?,
            "rollbackRetries" => self.rollback_retries = Self::parse_int(key, value)?,
            _ => {
                warn!(key, source, "ignoring unknown config key");
            }
        }
        Ok(())
    }

    fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deploy_wait(&self) -> Duration {
        Duration::from_millis(self.deploy_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert!(config.app_id.is_empty());
        assert_eq!(config.backend_instances, 0);
        assert_eq!(config.ready_marker, "The server is running at");
        assert_eq!(config.startup_timeout(), Duration::from_secs(60));
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.deploy_wait(), Duration::from_secs(2));
        assert_eq!(config.rollback_retries, 2);
        assert!(config.java_home.is_none());
    }

    #[test]
    fn parse_all_properties() {
        let mut config = Config::default();
        let content = r#"
# test configuration
appId=appIdValue
backendId=backendIdValue
backendInstances=17
clusterHostname=clusterHostnameValue
sdkDir=sdkDirValue
appDir=appDirValue
acHostname=acHostnameValue
username=usernameValue
password="passwordValue"
"#;
        config.parse_content(content, "test").unwrap();
        assert_eq!(config.app_id, "appIdValue");
        assert_eq!(config.backend_id, "backendIdValue");
        assert_eq!(config.backend_instances, 17);
        assert_eq!(config.cluster_hostname, "clusterHostnameValue");
        assert_eq!(config.sdk_dir, PathBuf::from("sdkDirValue"));
        assert_eq!(config.app_dir, PathBuf::from("appDirValue"));
        assert_eq!(config.ac_hostname, "acHostnameValue");
        assert_eq!(config.username, "usernameValue");
        assert_eq!(config.password, "passwordValue");
    }

    #[test]
    fn invalid_backend_instances_is_rejected() {
        let mut config = Config::default();
        let err = config
            .parse_content("backendInstances=no integer", "test")
            .unwrap_err();
        match err {
            ConfigError::InvalidInt { key, value } => {
                assert_eq!(key, "backendInstances");
                assert_eq!(value, "no integer");
            }
            e => panic!("expected InvalidInt, got {e:?}"),
        }
    }

    #[test]
    fn empty_backend_instances_means_zero() {
        let mut config = Config::default();
        config.parse_content("backendInstances=", "test").unwrap();
        assert_eq!(config.backend_instances, 0);
    }

    #[test]
    fn colon_separator_keeps_port_in_value() {
        let mut config = Config::default();
        config
            .parse_content("clusterHostname: localhost:8081\nappId=s~foo", "test")
            .unwrap();
        assert_eq!(config.cluster_hostname, "localhost:8081");
        assert_eq!(config.app_id, "s~foo");
    }

    #[test]
    fn equals_separator_keeps_colon_in_value() {
        let mut config = Config::default();
        config
            .parse_content("clusterHostname=localhost:9000", "test")
            .unwrap();
        assert_eq!(config.cluster_hostname, "localhost:9000");
    }

    #[test]
    fn parse_flags_and_timing() {
        let mut config = Config::default();
        let content = "
appcfgFlags=--runtime=java -R
readyMarker=Dev App Server is now running
startupTimeoutMs=1500
pollIntervalMs=25
deployWaitMs=0
rollbackRetries=3
javaHome=/opt/jdk
";
        config.parse_content(content, "test").unwrap();
        assert_eq!(config.appcfg_flags, vec!["--runtime=java", "-R"]);
        assert_eq!(config.ready_marker, "Dev App Server is now running");
        assert_eq!(config.startup_timeout(), Duration::from_millis(1500));
        assert_eq!(config.poll_interval(), Duration::from_millis(25));
        assert_eq!(config.deploy_wait(), Duration::ZERO);
        assert_eq!(config.rollback_retries, 3);
        assert_eq!(config.java_home, Some(PathBuf::from("/opt/jdk")));
    }

    #[test]
    fn line_without_separator_is_rejected() {
        let mut config = Config::default();
        let result = config.parse_content("justakey", "test");
        assert!(matches!(result, Err(ConfigError::InvalidLine(_))));
    }

    #[test]
    fn comments_and_unknown_keys_are_ignored() {
        let mut config = Config::default();
        config
            .parse_content("! bang comment\n# hash comment\nsomethingElse=1\nappId=x", "test")
            .unwrap();
        assert_eq!(config.app_id, "x");
    }

    #[test]
    fn unquote_removes_quotes() {
        assert_eq!(Config::unquote("\"hello\""), "hello");
        assert_eq!(Config::unquote("'world'"), "world");
        assert_eq!(Config::unquote("noquotes"), "noquotes");
        assert_eq!(Config::unquote("\""), "\"");
    }

    #[test]
    fn from_file_reads_properties() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "appId=filed\nsdkDir=/sdk").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.app_id, "filed");
        assert_eq!(config.sdk_dir, PathBuf::from("/sdk"));
    }

    #[test]
    fn from_file_missing_is_read_error() {
        let result = Config::from_file(Path::new("/nonexistent/gaedriver.properties"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    fn default_path_is_in_home_dir() {
        let Some(home) = dirs::home_dir() else {
            assert!(Config::default_path().is_none());
            return;
        };
        assert_eq!(Config::default_path(), Some(home.join(".gaedriver.properties")));
    }

    #[test]
    fn password_is_not_serialized() {
        let config = Config {
            password: "secret".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"appId\""));
    }
}
