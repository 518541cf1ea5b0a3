//! A single child process attached to a pseudo-terminal.
//!
//! Lifecycle:
//!
//! ```text
//! Idle --start--> Starting --> Running --stop--> Stopping --> Exited
//!                    |            |                              ^
//!                    |            +------------------------------+
//!                    +--(launch failed)--> Exited(-1)
//! ```
//!
//! Three threads serve a running session:
//! - the pump, blocking on reads of the PTY master
//! - the [`PtyReader`], turning bytes into [`SessionEvent`]s
//! - the exit watcher, blocking on the child's `wait`
//!
//! The exit watcher is the only writer of [`SessionState::Exited`]. It uses a
//! compare-and-set on the state so a concurrent `stop` can never produce a
//! second terminal transition.

use std::io::{self, Write};
use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use launchpad_proto::{ExitInfo, LaunchError, RunRequest, SessionError, SessionEvent, SessionState};
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::PtyConfig;
use crate::pty_reader::{PtyReader, PtySource};

/// Receiving end of a session's event stream.
///
/// Yields zero or more [`SessionEvent::Output`] followed by exactly one
/// [`SessionEvent::Exited`], then `None`.
pub type EventReceiver = mpsc::Receiver<SessionEvent>;

/// Handles held for the lifetime of a launched child.
struct SessionIo {
    pid: Option<u32>,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    // Closing the master hangs up the child, so it lives as long as the session.
    _master: Mutex<Box<dyn MasterPty + Send>>,
}

/// One run of one command inside a PTY.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// use launchpad_proto::{RunRequest, SessionEvent};
/// use launchpad_pty::{PtyConfig, Session};
///
/// let mut session = Session::new(RunRequest::new(".", "ls"), PtyConfig::default());
/// let mut events = session.start()?;
/// while let Some(event) = events.recv().await {
///     match event {
///         SessionEvent::Output(chunk) => println!("{}", chunk.text),
///         SessionEvent::Exited(info) => println!("exit {}", info.code),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Session {
    request: RunRequest,
    config: PtyConfig,
    state: Arc<watch::Sender<SessionState>>,
    io: Option<SessionIo>,
}

impl Session {
    /// Creates a session in [`SessionState::Idle`]. Nothing is spawned yet.
    pub fn new(request: RunRequest, config: PtyConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            request,
            config,
            state: Arc::new(state),
            io: None,
        }
    }

    /// Allocates the PTY, spawns the child and starts the worker threads.
    ///
    /// Returns as soon as the child is running. On failure the session ends
    /// in `Exited` with [`launchpad_proto::LAUNCH_FAILURE_CODE`] and no event
    /// is ever published.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::AlreadyStarted`] if called twice, otherwise the
    /// reason the child could not be launched.
    pub fn start(&mut self) -> Result<EventReceiver, LaunchError> {
        let started = self.state.send_if_modified(|state| {
            if matches!(state, SessionState::Idle) {
                *state = SessionState::Starting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(LaunchError::AlreadyStarted);
        }

        let command = self.request.display_command();
        match self.launch() {
            Ok((io, events)) => {
                info!(command = %command, pid = io.pid, "Session started");
                self.io = Some(io);
                // The child may already have exited; never overwrite that.
                self.state.send_if_modified(|state| {
                    if matches!(state, SessionState::Starting) {
                        *state = SessionState::Running;
                        true
                    } else {
                        false
                    }
                });
                Ok(events)
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Failed to launch session");
                self.state
                    .send_replace(SessionState::Exited(ExitInfo::launch_failure()));
                Err(e)
            }
        }
    }

    fn launch(&self) -> Result<(SessionIo, EventReceiver), LaunchError> {
        let request = &self.request;
        self.config.validate().map_err(LaunchError::InvalidConfig)?;
        if request.command.trim().is_empty() {
            return Err(LaunchError::EmptyCommand);
        }
        if !request.working_dir().is_dir() {
            return Err(LaunchError::MissingWorkingDir(request.working_dir.clone()));
        }

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: self.config.rows,
                cols: self.config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| LaunchError::PtyAllocation(e.to_string()))?;

        let child = pair
            .slave
            .spawn_command(self.command_builder())
            .map_err(|e| LaunchError::Spawn {
                command: request.display_command(),
                reason: e.to_string(),
            })?;
        // Only the child may hold the slave, otherwise the master never sees EOF.
        drop(pair.slave);

        let pid = child.process_id();
        debug!(pid, "Child spawned");

        let handles = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match handles {
            Ok(handles) => handles,
            Err(e) => {
                reap(child);
                return Err(LaunchError::PtyAllocation(e.to_string()));
            }
        };
        let killer = child.clone_killer();

        let (events_tx, events_rx) = mpsc::channel(self.config.channel_capacity);
        let (exit_tx, exit_rx) = std_mpsc::channel();

        let workers =
            spawn_exit_watcher(Arc::clone(&self.state), exit_tx, pid).and_then(|watcher| {
                PtySource::spawn(reader, self.config.read_buffer_size)
                    .and_then(|source| {
                        PtyReader::new(source, &self.config, events_tx, exit_rx).spawn(pid)
                    })
                    .map(|_| watcher)
            });
        let watcher = match workers {
            Ok(watcher) => watcher,
            Err(e) => {
                reap(child);
                return Err(LaunchError::Thread(e));
            }
        };
        // The watcher owns the child only once every worker is up, so each
        // failure above can still reap it.
        if let Err(std_mpsc::SendError(child)) = watcher.send(child) {
            reap(child);
            return Err(LaunchError::Thread(io::Error::other(
                "exit watcher stopped before taking the child",
            )));
        }

        let io = SessionIo {
            pid,
            writer: Mutex::new(writer),
            killer: Mutex::new(killer),
            _master: Mutex::new(pair.master),
        };
        Ok((io, events_rx))
    }

    fn command_builder(&self) -> CommandBuilder {
        let request = &self.request;
        let mut cmd = CommandBuilder::new(&request.command);
        cmd.args(&request.args);
        cmd.cwd(request.working_dir());
        cmd.env("TERM", &self.config.term);
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        cmd
    }

    /// Writes `text` followed by a newline to the child's stdin.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRunning`] unless the session is `Running`; nothing
    /// is written in that case.
    pub fn send_input(&self, text: &str) -> Result<(), SessionError> {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.write(line.as_bytes())
    }

    /// Writes `bytes` verbatim, e.g. `&[0x03]` for Ctrl+C.
    ///
    /// # Errors
    ///
    /// Same as [`Session::send_input`].
    pub fn send_raw(&self, bytes: &[u8]) -> Result<(), SessionError> {
        self.write(bytes)
    }

    fn write(&self, bytes: &[u8]) -> Result<(), SessionError> {
        let io = self.running_io()?;
        let mut writer = io.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn running_io(&self) -> Result<&SessionIo, SessionError> {
        let blocked = {
            let state = self.state.borrow();
            (!state.is_running()).then(|| state.name())
        };
        match (blocked, &self.io) {
            (None, Some(io)) => Ok(io),
            (Some(state), _) => Err(SessionError::NotRunning { state }),
            (None, None) => Err(SessionError::NotRunning { state: "idle" }),
        }
    }

    /// Asks the child to terminate (SIGTERM to its process group).
    ///
    /// Advisory: the PTY stays open and the session reaches `Exited` only
    /// once the child is gone. Calling it again while stopping or after exit
    /// does nothing.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRunning`] if the session was never started.
    pub fn stop(&self) -> Result<(), SessionError> {
        let mut previous = SessionState::Idle;
        self.state.send_if_modified(|state| {
            previous = state.clone();
            if state.is_running() {
                *state = SessionState::Stopping;
                true
            } else {
                false
            }
        });

        match previous {
            SessionState::Running => self.signal(false),
            SessionState::Stopping | SessionState::Exited(_) => Ok(()),
            other => Err(SessionError::NotRunning {
                state: other.name(),
            }),
        }
    }

    /// Kills the child outright (SIGKILL). Never done implicitly by `stop`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRunning`] if the session was never started.
    pub fn kill(&self) -> Result<(), SessionError> {
        let state = self.state.borrow().clone();
        match state {
            SessionState::Running | SessionState::Stopping => {
                self.state.send_if_modified(|state| {
                    if state.is_running() {
                        *state = SessionState::Stopping;
                        true
                    } else {
                        false
                    }
                });
                self.signal(true)
            }
            SessionState::Exited(_) => Ok(()),
            other => Err(SessionError::NotRunning {
                state: other.name(),
            }),
        }
    }

    fn signal(&self, force: bool) -> Result<(), SessionError> {
        match &self.io {
            Some(io) => signal_child(io, force).map_err(SessionError::from),
            None => Ok(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watches state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Resolves once the session is `Exited`.
    ///
    /// Returns `None` for a session that was never started.
    pub async fn wait_exited(&self) -> Option<ExitInfo> {
        if matches!(*self.state.borrow(), SessionState::Idle) {
            return None;
        }
        let mut rx = self.state.subscribe();
        let state = rx.wait_for(SessionState::is_terminal).await.ok()?;
        state.exit_info().cloned()
    }

    /// Process id of the child, once spawned.
    pub fn pid(&self) -> Option<u32> {
        self.io.as_ref().and_then(|io| io.pid)
    }

    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    pub fn working_dir(&self) -> &Path {
        self.request.working_dir()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let Some(io) = &self.io else {
            return;
        };
        if self.state.borrow().is_terminal() {
            return;
        }
        debug!(pid = io.pid, "Session dropped while child alive, killing");
        if let Err(e) = signal_child(io, true) {
            debug!(error = %e, "Failed to kill child on drop");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("request", &self.request)
            .field("state", &*self.state.borrow())
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

type BoxedChild = Box<dyn Child + Send + Sync>;

/// Starts the thread that blocks on the child's exit, records the terminal
/// state and hands the exit info to the reader.
///
/// The child is passed in through the returned sender. If the sender is
/// dropped instead, the thread ends without touching the state.
fn spawn_exit_watcher(
    state: Arc<watch::Sender<SessionState>>,
    exit_tx: std_mpsc::Sender<ExitInfo>,
    pid: Option<u32>,
) -> io::Result<std_mpsc::Sender<BoxedChild>> {
    let (child_tx, child_rx) = std_mpsc::channel::<BoxedChild>();
    thread::Builder::new()
        .name("launchpad-exit-watcher".to_string())
        .spawn(move || {
            let Ok(mut child) = child_rx.recv() else {
                return;
            };
            let info = match child.wait() {
                Ok(status) => exit_info(&status),
                Err(e) => {
                    warn!(pid, error = %e, "Failed to wait for child");
                    ExitInfo::unknown()
                }
            };
            debug!(pid, exit_code = info.code, signal = ?info.signal, "Child exited");

            state.send_if_modified(|current| {
                if current.is_terminal() {
                    false
                } else {
                    *current = SessionState::Exited(info.clone());
                    true
                }
            });
            let _ = exit_tx.send(info);
        })?;
    Ok(child_tx)
}

/// Kills and waits for a child whose session failed to launch.
fn reap(mut child: BoxedChild) {
    if let Err(e) = child.kill() {
        debug!(error = %e, "Kill during launch cleanup failed");
    }
    let _ = child.wait();
}

fn exit_info(status: &portable_pty::ExitStatus) -> ExitInfo {
    let code = i32::try_from(status.exit_code()).unwrap_or(i32::MAX);
    match status.signal() {
        Some(signal) => ExitInfo::from_signal(code, signal),
        None => ExitInfo::from_code(code),
    }
}

#[cfg(unix)]
fn signal_child(io: &SessionIo, force: bool) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::Pid;

    let Some(raw) = io.pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return kill_via_handle(io);
    };
    let pid = Pid::from_raw(raw);
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };

    // The child leads its own session, so its pgid is its pid.
    debug!(pid = %pid, signal = signal.as_str(), "Signalling process group");
    match killpg(pid, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(_) => match kill(pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        },
    }
}

#[cfg(not(unix))]
fn signal_child(io: &SessionIo, _force: bool) -> io::Result<()> {
    kill_via_handle(io)
}

fn kill_via_handle(io: &SessionIo) -> io::Result<()> {
    debug!(pid = io.pid, "Killing child through its handle");
    io.killer
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .kill()
}
