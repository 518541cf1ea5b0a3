use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised synchronously when a session cannot be launched.
///
/// No events are ever published for a session whose launch failed.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The request had an empty command.
    #[error("No command given")]
    EmptyCommand,

    /// The working directory does not exist or is not a directory.
    #[error("Working directory does not exist: {}", .0.display())]
    MissingWorkingDir(PathBuf),

    /// The session's PTY settings cannot work, e.g. a zero read buffer.
    #[error("Invalid PTY configuration: {0}")]
    InvalidConfig(String),

    /// The pseudo-terminal could not be allocated.
    #[error("Failed to allocate pseudo-terminal: {0}")]
    PtyAllocation(String),

    /// The child binary could not be spawned (not found, not executable,
    /// permission denied).
    #[error("Failed to spawn `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    /// A worker thread could not be started.
    #[error("Failed to start worker thread: {0}")]
    Thread(#[source] io::Error),

    /// `start` was called on a session that was already started.
    #[error("Session has already been started")]
    AlreadyStarted,
}

/// Errors raised by operations on a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation requires a running session.
    #[error("Session is not running (state: {state})")]
    NotRunning { state: &'static str },

    /// Writing to the pseudo-terminal failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
