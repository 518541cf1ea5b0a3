//! # launchpad-pty
//!
//! Runs a command inside a pseudo-terminal and streams what it prints.
//!
//! A [`Session`] owns one child process. Once started it publishes
//! [`launchpad_proto::SessionEvent`]s over a bounded channel: display lines
//! as they complete, an interactive prompt after a short idle period, and a
//! single exit event at the end. Keystrokes go back in through
//! [`Session::send_input`].
//!
//! ## Output Processing
//!
//! Raw PTY bytes pass through the [`LineAssembler`], which splits them into
//! lines and runs every line through [`ansi::strip`]. The result is plain
//! text: no colors, no cursor movement, no carriage returns. This is not a
//! terminal emulator.
//!
//! ## Threads
//!
//! Blocking PTY reads and the blocking wait on the child happen on dedicated
//! threads, never on the caller's. The caller may consume events with
//! `recv().await` from an async runtime or `blocking_recv()` from a plain
//! thread.

pub mod ansi;
mod config;
mod line_assembler;
mod pty_reader;
mod session;

pub use config::PtyConfig;
pub use line_assembler::LineAssembler;
pub use session::{EventReceiver, Session};
