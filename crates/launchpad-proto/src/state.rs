//! Session lifecycle states.

use std::fmt;

/// Synthetic exit code recorded when a child could not be launched.
pub const LAUNCH_FAILURE_CODE: i32 = -1;

/// How a child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code. Non-zero when the process was killed by a signal.
    pub code: i32,
    /// Name of the terminating signal, if any.
    pub signal: Option<String>,
}

impl ExitInfo {
    pub fn from_code(code: i32) -> Self {
        Self { code, signal: None }
    }

    pub fn from_signal(code: i32, signal: impl Into<String>) -> Self {
        Self {
            code,
            signal: Some(signal.into()),
        }
    }

    /// Exit info for a child that never started.
    pub fn launch_failure() -> Self {
        Self::from_code(LAUNCH_FAILURE_CODE)
    }

    /// Exit info when the child's status could not be determined.
    pub fn unknown() -> Self {
        Self::from_code(LAUNCH_FAILURE_CODE)
    }

    /// True when the child exited normally with code 0.
    pub fn success(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }
}

/// Lifecycle of a single session.
///
/// ```text
/// Idle -> Starting -> Running -> (Stopping) -> Exited
/// ```
///
/// `Exited` is terminal: once reached, no further transition happens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Starting,
    Running,
    /// A terminate signal was sent; waiting for the child to exit.
    Stopping,
    Exited(ExitInfo),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited(_))
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// The exit info once terminal.
    pub fn exit_info(&self) -> Option<&ExitInfo> {
        match self {
            Self::Exited(info) => Some(info),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Exited(_) => "exited",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(info) => write!(f, "exited ({})", info.code),
            other => f.write_str(other.name()),
        }
    }
}
