//! # launchpad-core
//!
//! The layer a UI talks to when running commands:
//! - [`SessionManager`]: one active PTY session at a time, replaced safely
//! - [`RunnerConfig`]: YAML configuration for the manager and its sessions
//! - [`status`]: the banner and exit lines shown around a run's output
//! - [`logging`]: `tracing` subscriber setup
//!
//! ## Example
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use launchpad_core::{RunnerConfig, SessionManager, logging, status};
//! use launchpad_proto::{RunRequest, SessionEvent};
//!
//! let config = RunnerConfig::load("launchpad.yml")?;
//! logging::init_from(&config);
//! let mut manager = SessionManager::new(&config);
//!
//! let request = RunRequest::new("/path/to/project", "make").arg("test");
//! println!("{}", status::start_banner(&request).text);
//! let mut events = manager.run(request).await?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Output(chunk) => println!("{}", chunk.text),
//!         SessionEvent::Exited(exit) => println!("{}", status::exit_status_chunk(&exit).text),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod config;
pub mod logging;
mod manager;
pub mod status;

pub use config::{ConfigError, RunnerConfig};
pub use manager::{ManagedSession, PtyLauncher, SessionLauncher, SessionManager};
