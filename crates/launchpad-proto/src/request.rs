//! Run requests handed to the runner by the project-discovery side.

use std::path::{Path, PathBuf};

/// A command to launch inside a pseudo-terminal.
///
/// The runner has no opinion on how the pair of directory and argv is
/// produced; it only executes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Directory the child is started in.
    pub working_dir: PathBuf,
    /// Program to execute (resolved through `PATH` when not a path).
    pub command: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

impl RunRequest {
    /// Creates a request for `command` with no arguments.
    pub fn new(working_dir: impl Into<PathBuf>, command: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Appends a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Returns the working directory.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Renders the command line for display, e.g. `run build.sh --release`.
    ///
    /// Arguments containing whitespace are single-quoted. This is for humans,
    /// not for feeding back into a shell.
    pub fn display_command(&self) -> String {
        let mut line = self.command.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}
