//! At most one active session per manager.
//!
//! Starting a run while another is still alive stops the old one first and
//! waits for it to reach a terminal state. A child that ignores the stop
//! request for `stop_grace` is killed.
//!
//! Sessions are produced through [`SessionLauncher`] so the replacement
//! policy can be exercised without spawning real processes.

use std::time::Duration;

use launchpad_proto::{LaunchError, RunRequest, SessionError, SessionState};
use launchpad_pty::{EventReceiver, PtyConfig, Session};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;

/// Operations the manager needs from a live session.
pub trait ManagedSession: Send {
    fn state(&self) -> SessionState;

    /// Forwards one line of input.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRunning`] unless the session is running.
    fn send_input(&self, text: &str) -> Result<(), SessionError>;

    /// Requests termination. A no-op once stopping or exited.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRunning`] if the session never started.
    fn stop(&self) -> Result<(), SessionError>;

    /// Forces termination.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRunning`] if the session never started.
    fn kill(&self) -> Result<(), SessionError>;

    /// Receiver observing every state transition.
    fn state_watch(&self) -> watch::Receiver<SessionState>;
}

/// Creates and starts sessions.
pub trait SessionLauncher {
    type Session: ManagedSession;

    /// Launches `request`, returning the running session and its events.
    ///
    /// # Errors
    ///
    /// Returns the [`LaunchError`] when the child could not be started.
    fn launch(
        &mut self,
        request: RunRequest,
    ) -> Result<(Self::Session, EventReceiver), LaunchError>;
}

impl ManagedSession for Session {
    fn state(&self) -> SessionState {
        Session::state(self)
    }

    fn send_input(&self, text: &str) -> Result<(), SessionError> {
        Session::send_input(self, text)
    }

    fn stop(&self) -> Result<(), SessionError> {
        Session::stop(self)
    }

    fn kill(&self) -> Result<(), SessionError> {
        Session::kill(self)
    }

    fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.subscribe()
    }
}

/// Launches real PTY sessions.
#[derive(Debug, Clone, Default)]
pub struct PtyLauncher {
    config: PtyConfig,
}

impl PtyLauncher {
    pub fn new(config: PtyConfig) -> Self {
        Self { config }
    }
}

impl SessionLauncher for PtyLauncher {
    type Session = Session;

    fn launch(&mut self, request: RunRequest) -> Result<(Session, EventReceiver), LaunchError> {
        let mut session = Session::new(request, self.config.clone());
        let events = session.start()?;
        Ok((session, events))
    }
}

/// Owns the active session, if any.
pub struct SessionManager<L: SessionLauncher = PtyLauncher> {
    launcher: L,
    active: Option<L::Session>,
    stop_grace: Duration,
    kill_grace: Duration,
}

impl SessionManager<PtyLauncher> {
    /// Creates a manager launching PTY sessions configured by `config`.
    pub fn new(config: &RunnerConfig) -> Self {
        Self::with_launcher(PtyLauncher::new(config.pty.clone()), config)
    }
}

impl<L: SessionLauncher> SessionManager<L> {
    pub fn with_launcher(launcher: L, config: &RunnerConfig) -> Self {
        Self {
            launcher,
            active: None,
            stop_grace: config.stop_grace(),
            kill_grace: config.kill_grace(),
        }
    }

    /// Runs `request`, replacing the active session.
    ///
    /// The previous session is stopped exactly once and awaited before the
    /// new child is spawned. If the launch fails, no session is active
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns the [`LaunchError`] of the new session.
    pub async fn run(&mut self, request: RunRequest) -> Result<EventReceiver, LaunchError> {
        self.retire_active().await;

        let command = request.display_command();
        debug!(command = %command, "Launching session");
        let (session, events) = self.launcher.launch(request)?;
        info!(command = %command, "Session running");
        self.active = Some(session);
        Ok(events)
    }

    /// Forwards a line of input to the active session.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRunning`] when no session is running.
    pub fn send_input(&self, text: &str) -> Result<(), SessionError> {
        self.active_or_idle()?.send_input(text)
    }

    /// Requests termination of the active session without waiting.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRunning`] when no session was ever started.
    pub fn stop(&self) -> Result<(), SessionError> {
        self.active_or_idle()?.stop()
    }

    /// Kills the active session without waiting.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotRunning`] when no session was ever started.
    pub fn kill(&self) -> Result<(), SessionError> {
        self.active_or_idle()?.kill()
    }

    /// State of the active session, `Idle` when there is none.
    pub fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map_or(SessionState::Idle, ManagedSession::state)
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    pub fn active_session(&self) -> Option<&L::Session> {
        self.active.as_ref()
    }

    /// Stops the active session and waits for it to exit.
    pub async fn shutdown(&mut self) {
        self.retire_active().await;
    }

    fn active_or_idle(&self) -> Result<&L::Session, SessionError> {
        self.active
            .as_ref()
            .ok_or(SessionError::NotRunning { state: "idle" })
    }

    async fn retire_active(&mut self) {
        let Some(session) = self.active.take() else {
            return;
        };
        let mut states = session.state_watch();
        if states.borrow().is_terminal() {
            return;
        }

        debug!("Stopping previous session");
        if let Err(e) = session.stop() {
            debug!(error = %e, "Stop request failed");
        }
        if wait_terminal(&mut states, self.stop_grace).await {
            return;
        }

        warn!(
            grace_ms = self.stop_grace.as_millis(),
            "Session ignored stop request, killing"
        );
        if let Err(e) = session.kill() {
            warn!(error = %e, "Kill request failed");
        }
        if !wait_terminal(&mut states, self.kill_grace).await {
            warn!("Session still not exited after kill, abandoning it");
        }
    }
}

impl<L: SessionLauncher> std::fmt::Debug for SessionManager<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("stop_grace", &self.stop_grace)
            .field("kill_grace", &self.kill_grace)
            .finish_non_exhaustive()
    }
}

/// Waits up to `grace` for a terminal state. A dropped sender counts as
/// terminal since nothing can change the state any more.
async fn wait_terminal(states: &mut watch::Receiver<SessionState>, grace: Duration) -> bool {
    timeout(grace, states.wait_for(SessionState::is_terminal))
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_proto::ExitInfo;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records every call; exits on stop unless told to ignore it.
    struct MockSession {
        name: String,
        log: Log,
        state: Arc<watch::Sender<SessionState>>,
        ignores_stop: bool,
    }

    impl MockSession {
        fn finish(&self, code: i32) {
            self.state.send_if_modified(|state| {
                if state.is_terminal() {
                    false
                } else {
                    *state = SessionState::Exited(ExitInfo::from_code(code));
                    true
                }
            });
        }
    }

    impl ManagedSession for MockSession {
        fn state(&self) -> SessionState {
            self.state.borrow().clone()
        }

        fn send_input(&self, text: &str) -> Result<(), SessionError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("input {} {text}", self.name));
            Ok(())
        }

        fn stop(&self) -> Result<(), SessionError> {
            self.log.lock().unwrap().push(format!("stop {}", self.name));
            if !self.ignores_stop {
                self.finish(143);
            }
            Ok(())
        }

        fn kill(&self) -> Result<(), SessionError> {
            self.log.lock().unwrap().push(format!("kill {}", self.name));
            self.finish(137);
            Ok(())
        }

        fn state_watch(&self) -> watch::Receiver<SessionState> {
            self.state.subscribe()
        }
    }

    #[derive(Default)]
    struct MockLauncher {
        log: Log,
        /// Senders of every launched session, so tests can end them.
        launched: Vec<Arc<watch::Sender<SessionState>>>,
    }

    impl SessionLauncher for MockLauncher {
        type Session = MockSession;

        fn launch(
            &mut self,
            request: RunRequest,
        ) -> Result<(MockSession, EventReceiver), LaunchError> {
            if request.command == "missing" {
                self.log.lock().unwrap().push("launch failed".to_string());
                return Err(LaunchError::Spawn {
                    command: request.command,
                    reason: "not found".to_string(),
                });
            }
            self.log
                .lock()
                .unwrap()
                .push(format!("launch {}", request.command));

            let (state, _) = watch::channel(SessionState::Running);
            let state = Arc::new(state);
            self.launched.push(Arc::clone(&state));
            let (_tx, rx) = mpsc::channel(1);
            let session = MockSession {
                name: request.command.clone(),
                log: Arc::clone(&self.log),
                state,
                ignores_stop: request.args.iter().any(|a| a == "--ignore-term"),
            };
            Ok((session, rx))
        }
    }

    fn manager() -> (SessionManager<MockLauncher>, Log) {
        let launcher = MockLauncher::default();
        let log = Arc::clone(&launcher.log);
        let config = RunnerConfig {
            stop_grace_ms: 50,
            kill_grace_ms: 50,
            ..Default::default()
        };
        (SessionManager::with_launcher(launcher, &config), log)
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_new_run_stops_previous_exactly_once() {
        let (mut manager, log) = manager();
        manager.run(RunRequest::new(".", "first")).await.unwrap();
        assert!(manager.is_running());

        manager.run(RunRequest::new(".", "second")).await.unwrap();
        assert!(manager.is_running());
        assert_eq!(
            entries(&log),
            vec!["launch first", "stop first", "launch second"]
        );
    }

    #[tokio::test]
    async fn test_stubborn_session_is_killed_after_grace() {
        let (mut manager, log) = manager();
        manager
            .run(RunRequest::new(".", "stubborn").arg("--ignore-term"))
            .await
            .unwrap();

        manager.run(RunRequest::new(".", "next")).await.unwrap();
        assert_eq!(
            entries(&log),
            vec!["launch stubborn", "stop stubborn", "kill stubborn", "launch next"]
        );
    }

    #[tokio::test]
    async fn test_exited_session_is_not_stopped() {
        let (mut manager, log) = manager();
        manager.run(RunRequest::new(".", "quick")).await.unwrap();
        manager.launcher.launched[0].send_replace(SessionState::Exited(ExitInfo::from_code(0)));
        assert!(!manager.is_running());

        manager.run(RunRequest::new(".", "next")).await.unwrap();
        assert_eq!(entries(&log), vec!["launch quick", "launch next"]);
    }

    #[tokio::test]
    async fn test_failed_launch_leaves_no_active_session() {
        let (mut manager, log) = manager();
        manager.run(RunRequest::new(".", "first")).await.unwrap();

        let err = manager.run(RunRequest::new(".", "missing")).await.unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
        assert!(manager.active_session().is_none());
        assert_eq!(manager.state(), SessionState::Idle);
        assert_eq!(
            entries(&log),
            vec!["launch first", "stop first", "launch failed"]
        );
    }

    #[tokio::test]
    async fn test_input_goes_to_active_session() {
        let (mut manager, log) = manager();
        assert!(matches!(
            manager.send_input("hi"),
            Err(SessionError::NotRunning { state: "idle" })
        ));
        assert!(matches!(
            manager.stop(),
            Err(SessionError::NotRunning { state: "idle" })
        ));

        manager.run(RunRequest::new(".", "repl")).await.unwrap();
        manager.send_input("hi").unwrap();
        assert_eq!(entries(&log), vec!["launch repl", "input repl hi"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_active_session() {
        let (mut manager, log) = manager();
        manager.run(RunRequest::new(".", "server")).await.unwrap();
        manager.shutdown().await;

        assert!(manager.active_session().is_none());
        assert_eq!(entries(&log), vec!["launch server", "stop server"]);

        // Nothing left to stop.
        manager.shutdown().await;
        assert_eq!(entries(&log).len(), 2);
    }
}
