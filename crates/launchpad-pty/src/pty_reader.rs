//! PTY output reader.
//!
//! Architecture:
//! - A pump thread performs the blocking reads on the PTY master and hands
//!   each fragment over a small bounded channel.
//! - The reader thread waits on that channel with a bounded timeout, so every
//!   wait ends in one of the [`ReadOutcome`] variants. Timeouts drive the
//!   idle flush of partial lines; data goes through the [`LineAssembler`].
//! - Lines are published as [`SessionEvent::Output`], and once the PTY is
//!   closed (or the child has exited and the PTY stayed silent for the drain
//!   window) the reader emits the final flush and then the single
//!   [`SessionEvent::Exited`].
//!
//! The reader never returns errors to anyone. A read error ends the stream.

use std::io::{self, Read};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use launchpad_proto::{ExitInfo, OutputChunk, SessionEvent};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::config::PtyConfig;
use crate::line_assembler::LineAssembler;

/// Fragments in flight between the pump and the reader. Small on purpose: a
/// slow consumer should push back on the child through the PTY.
const PUMP_CAPACITY: usize = 64;

/// Result of one bounded wait for PTY data.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    /// Bytes read from the PTY master.
    Data(Vec<u8>),
    /// Nothing arrived within the poll interval.
    Timeout,
    /// The slave side was closed (zero-byte read), normally because the child
    /// exited.
    Closed,
    /// The read failed. Treated as end of stream.
    Error(io::Error),
}

/// Blocking PTY reads moved onto their own thread.
pub(crate) struct PtySource {
    rx: std_mpsc::Receiver<ReadOutcome>,
}

impl PtySource {
    /// Starts the pump thread for `reader`.
    pub(crate) fn spawn(
        mut reader: Box<dyn Read + Send>,
        buffer_size: usize,
    ) -> io::Result<Self> {
        let (tx, rx) = std_mpsc::sync_channel(PUMP_CAPACITY);

        thread::Builder::new()
            .name("launchpad-pty-pump".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; buffer_size];
                loop {
                    let outcome = match reader.read(&mut buf) {
                        Ok(0) => ReadOutcome::Closed,
                        Ok(n) => ReadOutcome::Data(buf[..n].to_vec()),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(10));
                            continue;
                        }
                        Err(e) => ReadOutcome::Error(e),
                    };
                    let last = !matches!(outcome, ReadOutcome::Data(_));
                    if tx.send(outcome).is_err() || last {
                        break;
                    }
                }
                trace!("PTY pump exiting");
            })?;

        Ok(Self { rx })
    }

    /// Waits up to `timeout` for the next fragment.
    pub(crate) fn wait(&self, timeout: Duration) -> ReadOutcome {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => ReadOutcome::Timeout,
            Err(RecvTimeoutError::Disconnected) => ReadOutcome::Closed,
        }
    }
}

/// Drains one session's PTY into its event channel.
pub(crate) struct PtyReader {
    source: PtySource,
    assembler: LineAssembler,
    events: mpsc::Sender<SessionEvent>,
    exit_rx: std_mpsc::Receiver<ExitInfo>,
    poll_interval: Duration,
    drain_timeout: Duration,
    consumer_gone: bool,
}

impl PtyReader {
    pub(crate) fn new(
        source: PtySource,
        config: &PtyConfig,
        events: mpsc::Sender<SessionEvent>,
        exit_rx: std_mpsc::Receiver<ExitInfo>,
    ) -> Self {
        Self {
            source,
            assembler: LineAssembler::new(config.idle_flush_ticks, config.max_line_bytes),
            events,
            exit_rx,
            poll_interval: config.poll_interval,
            drain_timeout: config.drain_timeout,
            consumer_gone: false,
        }
    }

    /// Runs the read loop on a dedicated thread.
    pub(crate) fn spawn(self, pid: Option<u32>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("launchpad-pty-reader".to_string())
            .spawn(move || {
                let _span = tracing::debug_span!("pty_reader", pid).entered();
                self.run();
            })
    }

    fn run(mut self) {
        debug!("PTY reader started");
        let mut exit: Option<ExitInfo> = None;
        let mut drain_deadline: Option<Instant> = None;

        loop {
            let mut silent = false;
            match self.source.wait(self.poll_interval) {
                ReadOutcome::Data(bytes) => {
                    trace!(bytes = bytes.len(), "PTY data");
                    for line in self.assembler.push(&bytes) {
                        self.emit(line);
                    }
                    // Output still flowing after exit: keep draining.
                    if drain_deadline.is_some() {
                        drain_deadline = Some(Instant::now() + self.drain_timeout);
                    }
                }
                ReadOutcome::Timeout => {
                    silent = true;
                    if let Some(partial) = self.assembler.tick() {
                        trace!("Idle flush of partial line");
                        self.emit(partial);
                    }
                }
                ReadOutcome::Closed => {
                    debug!("PTY closed");
                    break;
                }
                ReadOutcome::Error(e) => {
                    debug!(error = %e, "PTY read error, treating as end of stream");
                    break;
                }
            }

            if exit.is_none()
                && let Ok(info) = self.exit_rx.try_recv()
            {
                debug!(exit_code = info.code, "Child exited, draining remaining output");
                exit = Some(info);
                drain_deadline = Some(Instant::now() + self.drain_timeout);
            }

            // Something else (a grandchild) may still hold the slave open.
            // Only silence ends the drain; buffered output is never dropped.
            if silent
                && let Some(deadline) = drain_deadline
                && Instant::now() >= deadline
            {
                debug!("Drain window elapsed before PTY closed");
                break;
            }
        }

        if let Some(rest) = self.assembler.finish() {
            self.emit(rest);
        }

        let exit = exit
            .or_else(|| self.exit_rx.recv().ok())
            .unwrap_or_else(ExitInfo::unknown);
        debug!(exit_code = exit.code, "PTY reader finished");
        if !self.consumer_gone {
            let _ = self.events.blocking_send(SessionEvent::Exited(exit));
        }
    }

    fn emit(&mut self, text: String) {
        if self.consumer_gone {
            return;
        }
        if self
            .events
            .blocking_send(SessionEvent::Output(OutputChunk::normal(text)))
            .is_err()
        {
            // Keep draining so the child never blocks on a full PTY.
            debug!("Event receiver dropped, discarding further output");
            self.consumer_gone = true;
        }
    }
}
