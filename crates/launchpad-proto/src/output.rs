//! Output delivered from a running session to its consumer.

use serde::{Deserialize, Serialize};

use crate::state::ExitInfo;

/// Display classification of a chunk of output.
///
/// A PTY interleaves stdout and stderr with no marker, so everything read from
/// the child is [`StreamKind::Normal`]. The other kinds are assigned by the
/// caller for its own messages (banners, status lines, launch failures).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    #[default]
    Normal,
    Info,
    Error,
    Success,
}

/// One unit of display-ready text.
///
/// The text has already been stripped of ANSI sequences and carriage returns
/// and never contains the line terminator it was split on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub text: String,
    pub kind: StreamKind,
}

impl OutputChunk {
    pub fn new(text: impl Into<String>, kind: StreamKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn normal(text: impl Into<String>) -> Self {
        Self::new(text, StreamKind::Normal)
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, StreamKind::Info)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, StreamKind::Error)
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(text, StreamKind::Success)
    }
}

/// Events published by a session, in order.
///
/// A session that launched successfully produces any number of
/// [`SessionEvent::Output`] events followed by exactly one
/// [`SessionEvent::Exited`], after which the channel closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A line (or idle-flushed partial line) of child output.
    Output(OutputChunk),
    /// The child exited and all of its output has been delivered.
    Exited(ExitInfo),
}

impl SessionEvent {
    /// Returns the chunk if this is an output event.
    pub fn as_output(&self) -> Option<&OutputChunk> {
        match self {
            Self::Output(chunk) => Some(chunk),
            Self::Exited(_) => None,
        }
    }
}
