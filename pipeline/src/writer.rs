//! Writer loop: drains filled slots to the output in the order they were
//! filled.
//!
//! The writer alternates 0, 1, 0, ... just like the reader, and drains a slot
//! only once `read_gen > write_gen`, so output order equals input order and
//! the writer never drains the same fill twice. Partial writes are looped
//! until the slot's `len` bytes are fully delivered.

use std::io::{self, Write};
use std::thread;

use crate::error::CopyError;
use crate::pipeline::{Pipeline, WriterState};

/// Run the writer loop until the reader is done and every slot is drained,
/// or until a write fails.
///
/// On return, `writer_done` is set whatever the outcome, so a reader waiting
/// for a drain that will never come stops instead of spinning.
///
/// # Errors
///
/// Returns `CopyError::Write` if a write fails mid-copy, or
/// `CopyError::StartupRace` if the pipeline was not in its initial state.
pub fn run<W: Write>(pipeline: &Pipeline, output: &mut W) -> Result<(), CopyError> {
    let result = run_inner(pipeline, output);
    pipeline.set_writer_done();
    result
}

fn run_inner<W: Write>(pipeline: &Pipeline, output: &mut W) -> Result<(), CopyError> {
    if pipeline.writer_state() != WriterState::BeforeFirstWrite {
        return Err(CopyError::StartupRace("writer starting in bad state"));
    }

    // The reader publishes its priming result before setting this, so a slot
    // is never observed in a pre-initial state.
    while !pipeline.reader_ready() {
        thread::yield_now();
    }

    let mut idx = 0usize;
    loop {
        let slot = pipeline.slot(idx);
        log::debug!(
            "reader is {:?}; waiting to write slot {idx}",
            pipeline.reader_state()
        );
        let storage = slot.lock_for_drain();
        if !slot.pending() {
            // The reader has not produced new data for this slot yet.
            drop(storage);
            if pipeline.reader_done() && !pipeline.any_pending() {
                log::debug!(
                    "write loop exiting; reader is {:?}",
                    pipeline.reader_state()
                );
                return Ok(());
            }
            thread::yield_now();
            continue;
        }

        pipeline.set_writer_state(WriterState::WriteBegun);
        log::debug!("writing slot {idx}");
        let amt_to_write = slot.len();
        let mut offset = 0usize;
        while offset < amt_to_write {
            let amt_written = match write_retrying(output, &storage[offset..amt_to_write]) {
                Ok(0) => {
                    // A zero-length write would loop forever; treat it as the
                    // error it is.
                    pipeline.set_writer_state(WriterState::WriteFailed);
                    return Err(CopyError::Write(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "output accepted no bytes",
                    )));
                }
                Ok(n) => n,
                Err(err) => {
                    pipeline.set_writer_state(WriterState::WriteFailed);
                    log::debug!("write failure on slot {idx}");
                    return Err(CopyError::Write(err));
                }
            };
            offset += amt_written;
            pipeline.add_copied(amt_written as u64);
        }

        slot.publish_drain(storage);
        pipeline.set_writer_state(WriterState::WriteFinished);
        log::debug!("finished writing slot {idx}");

        idx = 1 - idx;
    }
}

fn write_retrying<W: Write>(output: &mut W, buf: &[u8]) -> io::Result<usize> {
    loop {
        match output.write(buf) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
