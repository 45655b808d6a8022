//! Locating the Java runtime that runs the SDK tools.

use std::fmt;
use std::path::{Path, PathBuf};

/// Resolves the executable used to launch the SDK's Java tools.
pub trait RuntimeLocator: fmt::Debug + Send + Sync {
    fn java_binary(&self) -> PathBuf;
}

/// `<java_home>/bin/java`, with `java_home` taken from the config or the
/// `JAVA_HOME` environment variable. Without either, plain `java` is run
/// from `PATH`.
#[derive(Debug, Clone, Default)]
pub struct JavaHome {
    home: Option<PathBuf>,
}

impl JavaHome {
    pub fn new(home: Option<PathBuf>) -> Self {
        Self { home }
    }

    /// Use `configured` if set, otherwise `JAVA_HOME`.
    pub fn from_env_or(configured: Option<&Path>) -> Self {
        let home = configured
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("JAVA_HOME").map(PathBuf::from))
            .filter(|home| !home.as_os_str().is_empty());
        Self { home }
    }
}

impl RuntimeLocator for JavaHome {
    fn java_binary(&self) -> PathBuf {
        match &self.home {
            Some(home) => home.join("bin").join("java"),
            None => PathBuf::from("java"),
        }
    }
}

/// A fixed executable path.
#[derive(Debug, Clone)]
pub struct FixedRuntime(pub PathBuf);

impl RuntimeLocator for FixedRuntime {
    fn java_binary(&self) -> PathBuf {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_home_points_into_bin() {
        let locator = JavaHome::new(Some(PathBuf::from("/opt/jdk")));
        assert_eq!(locator.java_binary(), PathBuf::from("/opt/jdk/bin/java"));
    }

    #[test]
    fn missing_java_home_uses_path_lookup() {
        assert_eq!(JavaHome::new(None).java_binary(), PathBuf::from("java"));
    }

    #[test]
    fn configured_home_wins_over_environment() {
        let locator = JavaHome::from_env_or(Some(Path::new("/configured/jdk")));
        assert_eq!(
            locator.java_binary(),
            PathBuf::from("/configured/jdk/bin/java")
        );
    }

    #[test]
    fn fixed_runtime_is_returned_verbatim() {
        let locator = FixedRuntime(PathBuf::from("/tmp/fake-java"));
        assert_eq!(locator.java_binary(), PathBuf::from("/tmp/fake-java"));
    }
}
