use gaedriver_core::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of an SDK tool launch.
///
/// Variants that follow a started process carry the output captured so far,
/// so the tool's own complaint is never lost.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("client already started")]
    AlreadyStarted,
    #[error("client not started")]
    NotStarted,
    #[error("could not start dev server (exit code {code}):\n{stdout}\n{stderr}")]
    StartupFailed {
        code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("dev server not ready after {waited_ms}ms:\n{stdout}\n{stderr}")]
    StartupTimeout {
        waited_ms: u64,
        stdout: String,
        stderr: String,
    },
    #[error("process exited before becoming ready:\n{stdout}\n{stderr}")]
    Terminated { stdout: String, stderr: String },
    #[error("appcfg {action} failed with exit code {code}:\n{stdout}")]
    ExitCode {
        action: String,
        code: i32,
        stdout: String,
        stderr: String,
    },
    #[error("deployment failed and subsequent rollback failed:\n{stdout}\n{stderr}")]
    RollbackFailed { stdout: String, stderr: String },
    #[error("update still blocked after {attempts} attempts:\n{stdout}\n{stderr}")]
    RetriesExhausted {
        attempts: u32,
        stdout: String,
        stderr: String,
    },
    #[error("appcfg backends {action} reported an error:\n{stdout}\n{stderr}")]
    BackendAction {
        action: String,
        stdout: String,
        stderr: String,
    },
    #[error("no backend configured")]
    NoBackend,
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Captured stdout of the failed process, if this error carries any.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::StartupFailed { stdout, .. }
            | Self::StartupTimeout { stdout, .. }
            | Self::Terminated { stdout, .. }
            | Self::ExitCode { stdout, .. }
            | Self::RollbackFailed { stdout, .. }
            | Self::RetriesExhausted { stdout, .. }
            | Self::BackendAction { stdout, .. } => Some(stdout),
            _ => None,
        }
    }

    /// Everything the failed process printed, stdout first.
    pub fn captured_output(&self) -> Option<String> {
        let stderr = match self {
            Self::StartupFailed { stderr, .. }
            | Self::StartupTimeout { stderr, .. }
            | Self::Terminated { stderr, .. }
            | Self::ExitCode { stderr, .. }
            | Self::RollbackFailed { stderr, .. }
            | Self::RetriesExhausted { stderr, .. }
            | Self::BackendAction { stderr, .. } => stderr.as_str(),
            _ => "",
        };
        self.stdout().map(|stdout| format!("{stdout}{stderr}"))
    }

    /// True for a non-zero exit of the given appcfg action.
    pub fn is_exit_of(&self, action: &str) -> bool {
        matches!(self, Self::ExitCode { action: a, .. } if a == action)
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
