//! Shared state for one copy: the two slots, the status enums, the byte
//! counter, and the startup gate.
//!
//! The whole of the coordination state lives in one owned [`Pipeline`] value
//! created by the supervisor and shared by `Arc` with the reader thread, the
//! writer thread, and the progress reporter.
//!
//! The state enums exist for diagnostics (logging, progress lines). Control
//! decisions are derived from the generation counters plus the `reader_done`
//! and `writer_done` latches, never from the enums.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

use crate::error::CopyError;
use crate::progress::ProgressSnapshot;
use crate::slot::Slot;

/// Per-buffer capacity. Upper bound of the 128 KiB - 1 MiB range that
/// measures best for sequential bulk I/O.
pub const DEFAULT_CHUNK_SIZE: usize = 1_048_576;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReaderState {
    BeforeFirstRead = 0,
    ReadBegun = 1,
    ReadFinished = 2,
    ReadFailed = 3,
    EndOfFile = 4,
}

impl ReaderState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::BeforeFirstRead,
            1 => Self::ReadBegun,
            2 => Self::ReadFinished,
            3 => Self::ReadFailed,
            _ => Self::EndOfFile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriterState {
    BeforeFirstWrite = 0,
    WriteBegun = 1,
    WriteFinished = 2,
    WriteFailed = 3,
}

impl WriterState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::BeforeFirstWrite,
            1 => Self::WriteBegun,
            2 => Self::WriteFinished,
            _ => Self::WriteFailed,
        }
    }
}

pub struct Pipeline {
    slots: [Slot; 2],
    reader_state: AtomicU8,
    writer_state: AtomicU8,
    total_copied: AtomicU64,
    most_recently_read: AtomicI32,
    reader_ready: AtomicBool,
    reader_done: AtomicBool,
    writer_done: AtomicBool,
    started_at: Mutex<Option<Instant>>,
    finished_at: Mutex<Option<Instant>>,
    init_gate: Mutex<()>,
}

impl Pipeline {
    /// Allocate both slots and the coordination state. Nothing is allocated
    /// inside the steady-state loops.
    ///
    /// # Errors
    ///
    /// Returns `CopyError::Allocation` if a slot buffer cannot be allocated.
    pub fn new(chunk_size: usize) -> Result<Self, CopyError> {
        Ok(Self {
            slots: [Slot::new(chunk_size)?, Slot::new(chunk_size)?],
            reader_state: AtomicU8::new(ReaderState::BeforeFirstRead as u8),
            writer_state: AtomicU8::new(WriterState::BeforeFirstWrite as u8),
            total_copied: AtomicU64::new(0),
            most_recently_read: AtomicI32::new(-1),
            reader_ready: AtomicBool::new(false),
            reader_done: AtomicBool::new(false),
            writer_done: AtomicBool::new(false),
            started_at: Mutex::new(None),
            finished_at: Mutex::new(None),
            init_gate: Mutex::new(()),
        })
    }

    /// One of the two slots. `idx` must be 0 or 1.
    #[must_use]
    pub fn slot(&self, idx: usize) -> &Slot {
        &self.slots[idx]
    }

    /// True while any slot holds an undrained fill.
    #[must_use]
    pub fn any_pending(&self) -> bool {
        self.slots.iter().any(Slot::pending)
    }

    #[must_use]
    pub fn reader_state(&self) -> ReaderState {
        ReaderState::from_raw(self.reader_state.load(Ordering::Acquire))
    }

    pub(crate) fn set_reader_state(&self, state: ReaderState) {
        self.reader_state.store(state as u8, Ordering::Release);
    }

    #[must_use]
    pub fn writer_state(&self) -> WriterState {
        WriterState::from_raw(self.writer_state.load(Ordering::Acquire))
    }

    pub(crate) fn set_writer_state(&self, state: WriterState) {
        self.writer_state.store(state as u8, Ordering::Release);
    }

    /// Bytes delivered to the output descriptor so far. Monotone.
    #[must_use]
    pub fn total_copied(&self) -> u64 {
        self.total_copied.load(Ordering::Acquire)
    }

    pub(crate) fn add_copied(&self, n: u64) {
        self.total_copied.fetch_add(n, Ordering::Release);
    }

    /// Index of the slot most recently filled by the reader, -1 until the
    /// first fill is published.
    #[must_use]
    pub fn most_recently_read(&self) -> i32 {
        self.most_recently_read.load(Ordering::Acquire)
    }

    pub(crate) fn set_most_recently_read(&self, idx: i32) {
        self.most_recently_read.store(idx, Ordering::Release);
    }

    /// True once the reader has published the outcome of its priming read.
    /// Published on failure as well as success, so the writer's startup wait
    /// always terminates.
    #[must_use]
    pub fn reader_ready(&self) -> bool {
        self.reader_ready.load(Ordering::Acquire)
    }

    pub(crate) fn publish_reader_ready(&self) {
        self.reader_ready.store(true, Ordering::Release);
    }

    /// True once the reader will publish no further fills (EOF or failure).
    #[must_use]
    pub fn reader_done(&self) -> bool {
        self.reader_done.load(Ordering::Acquire)
    }

    pub(crate) fn set_reader_done(&self) {
        self.reader_done.store(true, Ordering::Release);
    }

    /// True once the writer will drain no further slots.
    #[must_use]
    pub fn writer_done(&self) -> bool {
        self.writer_done.load(Ordering::Acquire)
    }

    pub(crate) fn set_writer_done(&self) {
        self.writer_done.store(true, Ordering::Release);
    }

    pub(crate) fn mark_started(&self) {
        *self.started_at.lock() = Some(Instant::now());
    }

    pub(crate) fn mark_finished(&self) {
        *self.finished_at.lock() = Some(Instant::now());
    }

    #[must_use]
    pub fn started_at(&self) -> Option<Instant> {
        *self.started_at.lock()
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<Instant> {
        *self.finished_at.lock()
    }

    /// The one-shot startup gate. The supervisor holds it while spawning the
    /// reader; the reader holds it for the duration of its priming read.
    pub(crate) fn lock_init_gate(&self) -> MutexGuard<'_, ()> {
        self.init_gate.lock()
    }

    /// Read-only snapshot for the progress reporter. Each field is a single
    /// atomic load; the snapshot is coherent per field, not across fields.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            reader_state: self.reader_state(),
            writer_state: self.writer_state(),
            total_copied: self.total_copied(),
            started_at: self.started_at(),
            finished_at: self.finished_at(),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pipeline(reader={:?}, writer={:?}, copied={}, mru={}, slot0={:?}, slot1={:?})",
            self.reader_state(),
            self.writer_state(),
            self.total_copied(),
            self.most_recently_read(),
            self.slots[0],
            self.slots[1]
        )
    }
}
