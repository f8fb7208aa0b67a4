//! Tests that drive the reader and writer loops directly over in-memory
//! inputs and outputs, with small chunk sizes to force many handoffs.

use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use dd_pipeline::{reader, writer, CopyError, Pipeline, ReaderState, WriterState};

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Run a full copy through a pipeline with the given chunk size.
fn copy_through(chunk_size: usize, data: &[u8]) -> (Arc<Pipeline>, Vec<u8>) {
    let pipeline = Arc::new(Pipeline::new(chunk_size).unwrap());

    let reader_pipeline = Arc::clone(&pipeline);
    let input = data.to_vec();
    let reader_thread = thread::spawn(move || {
        let mut cursor = Cursor::new(input);
        reader::run(&reader_pipeline, &mut cursor)
    });

    let writer_pipeline = Arc::clone(&pipeline);
    let writer_thread = thread::spawn(move || {
        let mut out = Vec::new();
        writer::run(&writer_pipeline, &mut out).map(|()| out)
    });

    reader_thread.join().unwrap().unwrap();
    let out = writer_thread.join().unwrap().unwrap();
    (pipeline, out)
}

#[test]
fn copies_bytes_in_order_through_small_slots() {
    let data = patterned(100 * 1024 + 17);
    let (pipeline, out) = copy_through(1024, &data);

    assert_eq!(out, data);
    assert_eq!(pipeline.total_copied(), data.len() as u64);
    assert_eq!(pipeline.reader_state(), ReaderState::EndOfFile);
    assert_eq!(pipeline.writer_state(), WriterState::WriteFinished);
}

#[test]
fn all_slots_are_drained_after_eof() {
    let data = patterned(10 * 512);
    let (pipeline, out) = copy_through(512, &data);

    assert_eq!(out.len(), data.len());
    assert!(!pipeline.any_pending());
    for idx in 0..2 {
        assert_eq!(
            pipeline.slot(idx).read_gen(),
            pipeline.slot(idx).write_gen()
        );
    }
}

#[test]
fn empty_input_copies_nothing() {
    let (pipeline, out) = copy_through(512, &[]);

    assert!(out.is_empty());
    assert_eq!(pipeline.total_copied(), 0);
    assert_eq!(pipeline.reader_state(), ReaderState::EndOfFile);
    // The priming read publishes an empty fill into slot 0; the writer
    // drains it.
    assert_eq!(pipeline.slot(0).read_gen(), 1);
    assert_eq!(pipeline.slot(0).write_gen(), 1);
    assert_eq!(pipeline.slot(1).read_gen(), 0);
}

#[test]
fn single_chunk_input_uses_one_generation() {
    let data = patterned(512);
    let (pipeline, out) = copy_through(512, &data);

    assert_eq!(out, data);
    // One fill of slot 0 with the whole input, then EOF on slot 1 without a
    // publish.
    assert_eq!(pipeline.slot(0).read_gen(), 1);
    assert_eq!(pipeline.slot(1).read_gen(), 0);
    assert_eq!(pipeline.most_recently_read(), 0);
}

#[test]
fn reader_never_leads_writer_by_more_than_one_generation() {
    let pipeline = Arc::new(Pipeline::new(256).unwrap());
    let data = patterned(500 * 256);
    let done = Arc::new(AtomicBool::new(false));

    let reader_pipeline = Arc::clone(&pipeline);
    let reader_thread = thread::spawn(move || {
        let mut cursor = Cursor::new(data);
        reader::run(&reader_pipeline, &mut cursor)
    });
    let writer_pipeline = Arc::clone(&pipeline);
    let writer_thread = thread::spawn(move || {
        let mut out = Vec::new();
        writer::run(&writer_pipeline, &mut out)
    });

    let observer_pipeline = Arc::clone(&pipeline);
    let observer_done = Arc::clone(&done);
    let observer = thread::spawn(move || {
        let mut samples = 0u32;
        let mut last_total = 0u64;
        while !observer_done.load(Ordering::Acquire) {
            for idx in 0..2 {
                let slot = observer_pipeline.slot(idx);
                // Bracket the read_gen load between two write_gen loads so
                // the comparison is against a stable drain count.
                let w1 = slot.write_gen();
                let r = slot.read_gen();
                let w2 = slot.write_gen();
                if w1 == w2 {
                    assert!(r >= w1, "writer overtook reader on slot {idx}");
                    assert!(r <= w1 + 1, "reader overtook writer on slot {idx}");
                    samples += 1;
                }
            }
            let total = observer_pipeline.total_copied();
            assert!(total >= last_total, "total_copied went backwards");
            last_total = total;
        }
        samples
    });

    reader_thread.join().unwrap().unwrap();
    writer_thread.join().unwrap().unwrap();
    done.store(true, Ordering::Release);
    let samples = observer.join().unwrap();
    assert!(samples > 0);
}

/// An output that accepts a limited number of bytes and then fails.
struct FailingWriter {
    accepted: usize,
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.accepted == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "device detached"));
        }
        let n = buf.len().min(self.accepted);
        self.accepted -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_failure_stops_both_loops() {
    let pipeline = Arc::new(Pipeline::new(256).unwrap());
    let data = patterned(64 * 256);

    let reader_pipeline = Arc::clone(&pipeline);
    let reader_thread = thread::spawn(move || {
        let mut cursor = Cursor::new(data);
        reader::run(&reader_pipeline, &mut cursor)
    });
    let writer_pipeline = Arc::clone(&pipeline);
    let writer_thread = thread::spawn(move || {
        let mut out = FailingWriter { accepted: 1000 };
        writer::run(&writer_pipeline, &mut out)
    });

    let writer_result = writer_thread.join().unwrap();
    assert!(matches!(writer_result, Err(CopyError::Write(_))));
    assert_eq!(pipeline.writer_state(), WriterState::WriteFailed);

    // The reader must not hang waiting for drains that will never come.
    let reader_result = reader_thread.join().unwrap();
    assert!(reader_result.is_ok());
    assert!(pipeline.total_copied() <= 1000);
}

/// An input that produces a fixed number of chunks and then fails.
struct FailingReader {
    chunk: Vec<u8>,
    reads_left: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reads_left == 0 {
            return Err(io::Error::new(io::ErrorKind::Other, "medium error"));
        }
        self.reads_left -= 1;
        let n = self.chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&self.chunk[..n]);
        Ok(n)
    }
}

#[test]
fn read_failure_is_latched_and_pending_data_still_drains() {
    let pipeline = Arc::new(Pipeline::new(256).unwrap());

    let reader_pipeline = Arc::clone(&pipeline);
    let reader_thread = thread::spawn(move || {
        let mut input = FailingReader {
            chunk: patterned(256),
            reads_left: 3,
        };
        reader::run(&reader_pipeline, &mut input)
    });
    let writer_pipeline = Arc::clone(&pipeline);
    let writer_thread = thread::spawn(move || {
        let mut out = Vec::new();
        writer::run(&writer_pipeline, &mut out).map(|()| out)
    });

    let reader_result = reader_thread.join().unwrap();
    assert!(matches!(reader_result, Err(CopyError::Read(_))));
    assert_eq!(pipeline.reader_state(), ReaderState::ReadFailed);

    // Everything read before the failure reaches the output, in order.
    let out = writer_thread.join().unwrap().unwrap();
    assert_eq!(out, patterned(256).repeat(3));
    assert_eq!(pipeline.total_copied(), 3 * 256);
    assert!(!pipeline.any_pending());
}

#[test]
fn reader_rejects_reentry() {
    let pipeline = Arc::new(Pipeline::new(64).unwrap());
    let mut cursor = Cursor::new(Vec::new());
    reader::run(&pipeline, &mut cursor).unwrap();

    let result = reader::run(&pipeline, &mut cursor);
    assert!(matches!(result, Err(CopyError::StartupRace(_))));
    assert_eq!(result.unwrap_err().exit_code(), 70);
}

#[test]
fn writer_rejects_reentry() {
    let data = patterned(64);
    let (pipeline, _out) = copy_through(64, &data);

    let mut sink = Vec::new();
    let result = writer::run(&pipeline, &mut sink);
    assert!(matches!(result, Err(CopyError::StartupRace(_))));
    assert!(sink.is_empty());
}

#[test]
fn snapshot_of_untouched_pipeline_reports_not_started() {
    let pipeline = Pipeline::new(64).unwrap();
    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.render_live(), "Copy has not started yet.");
    assert_eq!(snapshot.render_final(), "Copy has not started yet.");
}

#[test]
fn snapshot_after_copy_renders_totals() {
    let data = patterned(2048);
    let (pipeline, _out) = copy_through(512, &data);

    let snapshot = pipeline.snapshot();
    assert_eq!(snapshot.total_copied, 2048);
    let line = snapshot.render_final();
    assert!(line.starts_with("Copied 2 KiB in "), "unexpected: {line}");
    assert!(line.contains("(overall avg "), "unexpected: {line}");
}
