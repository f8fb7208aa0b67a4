//! Progress view: a read-only snapshot of the pipeline's counters, and the
//! signal-driven reporter that renders it.
//!
//! The signal handler itself (installed by `signal-hook`, which registers
//! with `SA_RESTART` so ongoing reads and writes are not interrupted) only
//! enqueues the signal; a dedicated thread consumes it and does the formatted
//! printing. The snapshot reads are single atomic loads, so the reporter can
//! observe the pipeline at any moment without deadlocking it.

use std::os::raw::c_int;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use signal_hook::consts::SIGUSR1;
use signal_hook::iterator::backend::Handle;
use signal_hook::iterator::Signals;

use crate::format::{byte_count_phrase, interval_phrase};
use crate::pipeline::{Pipeline, ReaderState, WriterState};

/// Signals that trigger a live progress line. `SIGINFO` (ctrl-T) where the
/// platform has it, `SIGUSR1` everywhere.
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub const PROGRESS_SIGNALS: &[c_int] = &[SIGUSR1, libc::SIGINFO];

#[cfg(not(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
pub const PROGRESS_SIGNALS: &[c_int] = &[SIGUSR1];

/// One progress line, shared between the live reporter and the final
/// summary.
///
/// `progress_line(1_048_576, 1.0, true)` renders as
/// `Copied 1 MiB in 1 sec (overall avg 1 MiB/sec)`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn progress_line(num_bytes: u64, num_seconds: f64, is_final: bool) -> String {
    let rate = num_bytes as f64 / num_seconds;
    let rate = if rate.is_finite() { rate as u64 } else { 0 };
    format!(
        "{}{} in {} (overall avg {}/sec)",
        if is_final { "Copied " } else { "Have copied " },
        byte_count_phrase(num_bytes),
        interval_phrase(num_seconds),
        byte_count_phrase(rate),
    )
}

/// Point-in-time view of the pipeline's published counters. Each field was a
/// single atomic load; fields are individually coherent but not mutually.
#[derive(Debug, Clone, Copy)]
pub struct ProgressSnapshot {
    pub reader_state: ReaderState,
    pub writer_state: WriterState,
    pub total_copied: u64,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl ProgressSnapshot {
    /// The live form, measured against the current instant.
    #[must_use]
    pub fn render_live(&self) -> String {
        let Some(started) = self.started_at else {
            return "Copy has not started yet.".to_string();
        };
        if self.reader_state == ReaderState::BeforeFirstRead {
            return "Copy has not started yet.".to_string();
        }
        let num_seconds = (Instant::now() - started).as_secs_f64();
        progress_line(self.total_copied, num_seconds, false)
    }

    /// The final form, measured against `finished_at` when the supervisor
    /// has recorded it.
    #[must_use]
    pub fn render_final(&self) -> String {
        let Some(started) = self.started_at else {
            return "Copy has not started yet.".to_string();
        };
        let end = self.finished_at.unwrap_or_else(Instant::now);
        let num_seconds = (end - started).as_secs_f64();
        progress_line(self.total_copied, num_seconds, true)
    }
}

/// Signal-driven live reporter.
///
/// Owns the "Progress thread", which blocks on the signal iterator and
/// prints one live line per delivered signal.
pub struct ProgressReporter {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Install the signal handlers and spawn the reporting thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the handlers cannot be registered or the thread
    /// cannot be spawned.
    pub fn install(pipeline: Arc<Pipeline>) -> std::io::Result<Self> {
        let mut signals = Signals::new(PROGRESS_SIGNALS)?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("Progress thread".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    log::debug!("progress signal {signal}");
                    println!("{}", pipeline.snapshot().render_live());
                }
            })?;

        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Unregister and wait for the reporting thread to exit.
    pub fn stop(mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.handle.close();
    }
}
