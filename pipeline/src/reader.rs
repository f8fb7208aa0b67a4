//! Reader loop: pulls bytes from the input into alternating slots.
//!
//! The priming read goes into slot 0 while the init gate is held; afterwards
//! the loop alternates 1, 0, 1, ... A slot is refilled only once the writer
//! has drained its previous fill (`read_gen == write_gen`), so the reader
//! never gets more than one chunk ahead.

use std::io::{self, Read};
use std::thread;

use crate::error::CopyError;
use crate::pipeline::{Pipeline, ReaderState};

/// Run the reader loop to EOF or failure.
///
/// On return, `reader_done` and `reader_ready` are set whatever the outcome,
/// so the writer's waits always terminate.
///
/// # Errors
///
/// Returns `CopyError::Read` if a read fails mid-copy, or
/// `CopyError::StartupRace` if the pipeline was not in its initial state.
pub fn run<R: Read>(pipeline: &Pipeline, input: &mut R) -> Result<(), CopyError> {
    let result = run_inner(pipeline, input);
    pipeline.set_reader_done();
    pipeline.publish_reader_ready();
    result
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn run_inner<R: Read>(pipeline: &Pipeline, input: &mut R) -> Result<(), CopyError> {
    if pipeline.reader_state() != ReaderState::BeforeFirstRead {
        return Err(CopyError::StartupRace("reader starting in bad state"));
    }

    let gate = pipeline.lock_init_gate();

    // Priming read into slot 0.
    pipeline.set_reader_state(ReaderState::ReadBegun);
    let slot = pipeline.slot(0);
    let mut storage = slot.lock_for_fill();
    pipeline.mark_started();
    log::debug!("reading into slot 0");

    let n = match read_retrying(input, &mut storage) {
        Ok(n) => n,
        Err(err) => {
            pipeline.set_reader_state(ReaderState::ReadFailed);
            drop(storage);
            drop(gate);
            return Err(CopyError::Read(err));
        }
    };
    slot.publish_fill(storage, n);
    pipeline.set_most_recently_read(0);
    if n == 0 {
        pipeline.set_reader_state(ReaderState::EndOfFile);
    } else {
        pipeline.set_reader_state(ReaderState::ReadFinished);
    }
    pipeline.publish_reader_ready();
    drop(gate);
    log::debug!("finished reading into slot 0 ({n} bytes)");

    if n == 0 {
        return Ok(());
    }

    let mut idx = 1usize;
    loop {
        let slot = pipeline.slot(idx);
        log::debug!("waiting to read into slot {idx}");
        let mut storage = slot.lock_for_fill();
        if slot.pending() {
            // The writer has not drained this slot's previous fill yet.
            drop(storage);
            if pipeline.writer_done() {
                // Nothing will drain it anymore; stop reading.
                log::debug!("read loop exiting; writer is {:?}", pipeline.writer_state());
                return Ok(());
            }
            thread::yield_now();
            continue;
        }

        log::debug!("reading into slot {idx}");
        pipeline.set_reader_state(ReaderState::ReadBegun);
        slot.set_dirty(true);

        let n = match read_retrying(input, &mut storage) {
            Ok(n) => n,
            Err(err) => {
                pipeline.set_reader_state(ReaderState::ReadFailed);
                log::debug!("read failure on slot {idx}");
                return Err(CopyError::Read(err));
            }
        };
        if n == 0 {
            pipeline.set_reader_state(ReaderState::EndOfFile);
            log::debug!("read loop reached end of input");
            return Ok(());
        }

        slot.publish_fill(storage, n);
        pipeline.set_most_recently_read(idx as i32);
        pipeline.set_reader_state(ReaderState::ReadFinished);
        log::debug!("finished reading into slot {idx} ({n} bytes)");

        idx = 1 - idx;
    }
}

fn read_retrying<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match input.read(buf) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
