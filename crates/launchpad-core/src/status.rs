//! Status lines shown around a run's output.
//!
//! PTY output is always [`StreamKind::Normal`]; these helpers produce the
//! caller-side lines with their own kinds so a UI can color them.
//!
//! [`StreamKind::Normal`]: launchpad_proto::StreamKind::Normal

use launchpad_proto::{ExitInfo, LaunchError, OutputChunk, RunRequest};

/// `$ command args`, shown before the first output line.
pub fn start_banner(request: &RunRequest) -> OutputChunk {
    OutputChunk::info(format!("$ {}", request.display_command()))
}

/// `Process exited with code N`, a success line for 0 and an error otherwise.
pub fn exit_status_chunk(exit: &ExitInfo) -> OutputChunk {
    let mut text = format!("Process exited with code {}", exit.code);
    if let Some(signal) = &exit.signal {
        text.push_str(&format!(" ({signal})"));
    }

    if exit.success() {
        OutputChunk::success(text)
    } else {
        OutputChunk::error(text)
    }
}

/// The error line for a run that never started.
pub fn launch_failure_chunk(error: &LaunchError) -> OutputChunk {
    OutputChunk::error(format!("Failed to start: {error}"))
}
