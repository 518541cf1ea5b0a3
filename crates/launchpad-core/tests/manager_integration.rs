#[cfg(unix)]
mod manager_integration {
    use std::time::Duration;

    use launchpad_core::{RunnerConfig, SessionManager, logging, status};
    use launchpad_proto::{ExitInfo, RunRequest, SessionEvent, SessionState, StreamKind};
    use launchpad_pty::EventReceiver;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn config() -> RunnerConfig {
        let config = RunnerConfig::parse(
            "pty:\n  poll_interval_ms: 20\nstop_grace_ms: 500\nkill_grace_ms: 500\nlog_filter: launchpad=debug\n",
        )
        .expect("config");
        logging::init_from(&config);
        config
    }

    async fn exit_of(events: &mut EventReceiver) -> ExitInfo {
        loop {
            match timeout(Duration::from_secs(10), events.recv())
                .await
                .expect("timed out waiting for exit")
            {
                Some(SessionEvent::Output(_)) => {}
                Some(SessionEvent::Exited(exit)) => return exit,
                None => panic!("stream ended without Exited"),
            }
        }
    }

    #[tokio::test]
    async fn second_run_replaces_running_session() {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut manager = SessionManager::new(&config());

        let mut first = manager
            .run(RunRequest::new(temp_dir.path(), "sleep").arg("30"))
            .await
            .expect("first run");
        assert!(manager.is_running());

        let mut second = manager
            .run(RunRequest::new(temp_dir.path(), "sh").args(["-c", "echo second"]))
            .await
            .expect("second run");

        // The first session was already terminal before the second started.
        let first_exit = exit_of(&mut first).await;
        assert!(!first_exit.success());

        let mut lines = Vec::new();
        let exit = loop {
            match second.recv().await.expect("event") {
                SessionEvent::Output(chunk) => lines.push(chunk.text),
                SessionEvent::Exited(exit) => break exit,
            }
        };
        assert_eq!(lines, vec!["second"]);
        assert!(exit.success());
        assert_eq!(
            status::exit_status_chunk(&exit).kind,
            StreamKind::Success
        );
    }

    #[tokio::test]
    async fn stubborn_child_is_killed_on_replace() {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut manager = SessionManager::new(&config());

        let mut stubborn = manager
            .run(RunRequest::new(temp_dir.path(), "sh").args([
                "-c",
                r#"trap "" TERM; echo ready; while :; do sleep 0.1; done"#,
            ]))
            .await
            .expect("stubborn run");
        match timeout(Duration::from_secs(10), stubborn.recv()).await {
            Ok(Some(SessionEvent::Output(chunk))) => assert_eq!(chunk.text, "ready"),
            other => panic!("expected ready line, got {other:?}"),
        }

        manager
            .run(RunRequest::new(temp_dir.path(), "true"))
            .await
            .expect("replacement run");

        let exit = exit_of(&mut stubborn).await;
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn failed_launch_reports_error_line() {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut manager = SessionManager::new(&config());

        let err = manager
            .run(RunRequest::new(temp_dir.path(), "launchpad-no-such-command-xyz"))
            .await
            .expect_err("launch must fail");
        assert_eq!(manager.state(), SessionState::Idle);
        assert!(manager.send_input("x").is_err());

        let line = status::launch_failure_chunk(&err);
        assert_eq!(line.kind, StreamKind::Error);
        assert!(line.text.contains("launchpad-no-such-command-xyz"));
    }

    #[tokio::test]
    async fn shutdown_waits_for_exit() {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut manager = SessionManager::new(&config());
        let mut events = manager
            .run(RunRequest::new(temp_dir.path(), "sleep").arg("30"))
            .await
            .expect("run");

        manager.shutdown().await;
        assert!(!manager.is_running());
        assert!(!exit_of(&mut events).await.success());
    }
}
