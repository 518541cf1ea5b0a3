//! # launchpad-proto
//!
//! Shared types and error definitions for the Launchpad process runner.
//!
//! This crate holds the vocabulary spoken between the PTY runner and whatever
//! drives it (a TUI, a GUI event loop, a test harness):
//! - [`RunRequest`]: what to launch and where
//! - [`OutputChunk`] / [`SessionEvent`]: what comes back
//! - [`SessionState`] / [`ExitInfo`]: the lifecycle of one child process
//! - [`LaunchError`] / [`SessionError`]: the error taxonomy
//!
//! Nothing here performs I/O.

mod error;
mod output;
mod request;
mod state;

pub use error::{LaunchError, SessionError};
pub use output::{OutputChunk, SessionEvent, StreamKind};
pub use request::RunRequest;
pub use state::{ExitInfo, LAUNCH_FAILURE_CODE, SessionState};
