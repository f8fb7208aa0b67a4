//! Supervisor: opens the descriptors, allocates the pipeline, spawns the
//! reader and writer threads, joins them, and finalizes the output.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::CopyError;
use crate::pipeline::{Pipeline, DEFAULT_CHUNK_SIZE};
use crate::progress::ProgressReporter;
use crate::{reader, writer};

/// Configuration for one copy.
pub struct CopyConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub chunk_size: usize,
}

impl CopyConfig {
    #[must_use]
    pub fn new(input: PathBuf, output: PathBuf) -> Self {
        Self {
            input,
            output,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// What a finished copy looked like.
#[derive(Debug, Clone, Copy)]
pub struct CopySummary {
    pub bytes_copied: u64,
    pub elapsed: Duration,
}

/// Copy `config.input` to `config.output`, reading and writing in parallel.
///
/// Loop failures are forwarded to stderr with a direction-tagged prefix
/// before this returns; a reader error takes precedence over a writer error
/// for the returned result. The output is truncated to the number of bytes
/// copied and the final progress line goes to stdout whatever the outcome.
///
/// # Errors
///
/// Returns the first `CopyError` hit by the supervisor or either loop.
pub fn run(config: &CopyConfig) -> Result<CopySummary, CopyError> {
    let mut input = File::open(&config.input).map_err(CopyError::OpenInput)?;
    let output = OpenOptions::new()
        .write(true)
        .create(true)
        .mode(0o644)
        .open(&config.output)
        .map_err(CopyError::CreateOutput)?;
    let output = Arc::new(output);

    advise_sequential(&input);

    let pipeline = Arc::new(Pipeline::new(config.chunk_size)?);

    // Hold the init gate while the reader comes up; the reader holds it in
    // turn for the duration of its priming read.
    let gate = pipeline.lock_init_gate();
    let reader_pipeline = Arc::clone(&pipeline);
    let reader_thread = thread::Builder::new()
        .name("Reader thread".to_string())
        .spawn(move || reader::run(&reader_pipeline, &mut input))
        .map_err(CopyError::Os)?;
    drop(gate);
    thread::yield_now();

    let writer_pipeline = Arc::clone(&pipeline);
    let writer_output = Arc::clone(&output);
    let writer_thread = match thread::Builder::new()
        .name("Writer thread".to_string())
        .spawn(move || {
            let mut out: &File = &writer_output;
            writer::run(&writer_pipeline, &mut out)
        }) {
        Ok(handle) => handle,
        Err(err) => {
            // The reader would wait forever for drains that will never
            // happen; tell it to stop, then collect it.
            pipeline.set_writer_done();
            let _ = reader_thread.join();
            return Err(CopyError::Os(err));
        }
    };

    let reporter = match ProgressReporter::install(Arc::clone(&pipeline)) {
        Ok(reporter) => Some(reporter),
        Err(err) => {
            log::warn!("progress reporting unavailable: {err}");
            None
        }
    };

    let reader_result = reader_thread
        .join()
        .unwrap_or_else(|_| Err(CopyError::StartupRace("reader thread panicked")));
    let writer_result = writer_thread
        .join()
        .unwrap_or_else(|_| Err(CopyError::StartupRace("writer thread panicked")));

    if let Err(err) = &reader_result {
        eprintln!("dd-parallel: {err}");
    }
    if let Err(err) = &writer_result {
        eprintln!("dd-parallel: {err}");
    }

    // The buffers are CHUNK-sized but the final fill may have been shorter.
    let truncate_result = output.set_len(pipeline.total_copied());
    pipeline.mark_finished();
    if let Some(reporter) = reporter {
        reporter.stop();
    }

    println!("{}", pipeline.snapshot().render_final());
    if let Err(err) = &truncate_result {
        log::warn!(
            "could not truncate output to {} bytes: {err}",
            pipeline.total_copied()
        );
    }

    reader_result?;
    writer_result?;
    truncate_result.map_err(CopyError::Write)?;

    let elapsed = match (pipeline.started_at(), pipeline.finished_at()) {
        (Some(started), Some(finished)) => finished - started,
        _ => Duration::ZERO,
    };
    Ok(CopySummary {
        bytes_copied: pipeline.total_copied(),
        elapsed,
    })
}

#[cfg(target_os = "linux")]
fn advise_sequential(file: &File) {
    use std::os::fd::AsRawFd;

    // SAFETY: the fd is owned and stays open for the duration of the call.
    let rc = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL) };
    if rc != 0 {
        log::warn!("posix_fadvise returned {rc}");
    }
}

#[cfg(target_os = "macos")]
fn advise_sequential(file: &File) {
    use std::os::fd::AsRawFd;

    // SAFETY: the fd is owned and stays open for the duration of the call.
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_RDAHEAD, 1) };
    if rc < 0 {
        log::warn!("fcntl(F_RDAHEAD) failed: {}", std::io::Error::last_os_error());
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn advise_sequential(_file: &File) {}
