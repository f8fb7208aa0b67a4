//! One fixed-capacity buffer slot and its coordination metadata.
//!
//! A slot is half of the ping-pong pair through which bytes flow from the
//! reader to the writer. Ownership of the storage is handed back and forth
//! through two monotone generation counters:
//!
//! - `read_gen` counts completed fills (reads from the input),
//! - `write_gen` counts completed drains (writes to the output).
//!
//! The invariant `write_gen <= read_gen <= write_gen + 1` holds at all times:
//! the reader must not refill a slot whose previous fill has not been
//! drained, and the writer must not drain a slot that has not been refilled.
//!
//! # Thread Safety
//!
//! The storage itself sits behind a `parking_lot::RwLock` that is held for
//! the duration of the I/O syscall. The filling side takes the exclusive
//! guard (it mutates the bytes); the draining side takes the shared guard.
//! All metadata updates use release ordering so that a thread observing an
//! incremented generation also observes the corresponding `len` and storage
//! bytes.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::error::CopyError;

/// Exclusive access to a slot's storage while the reader fills it.
///
/// The lock is released when the guard is dropped, normally by passing it to
/// [`Slot::publish_fill`].
pub struct FillGuard<'a>(RwLockWriteGuard<'a, Box<[u8]>>);

impl Deref for FillGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for FillGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// Shared access to a slot's storage while the writer drains it.
pub struct DrainGuard<'a>(RwLockReadGuard<'a, Box<[u8]>>);

impl Deref for DrainGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

pub struct Slot {
    storage: RwLock<Box<[u8]>>,
    len: AtomicUsize,
    read_gen: AtomicU64,
    write_gen: AtomicU64,
    dirty: AtomicBool,
}

impl Slot {
    /// Allocate a slot with `capacity` bytes of storage.
    ///
    /// # Errors
    ///
    /// Returns `CopyError::Allocation` if the storage cannot be allocated.
    pub fn new(capacity: usize) -> Result<Self, CopyError> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| CopyError::Allocation(capacity))?;
        storage.resize(capacity, 0);

        Ok(Self {
            storage: RwLock::new(storage.into_boxed_slice()),
            len: AtomicUsize::new(0),
            read_gen: AtomicU64::new(0),
            write_gen: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
        })
    }

    /// Acquire the storage for filling. Blocks while a drain is in progress.
    #[must_use]
    pub fn lock_for_fill(&self) -> FillGuard<'_> {
        FillGuard(self.storage.write())
    }

    /// Publish a completed fill of `n` bytes: set `len`, mark the slot
    /// dirty, bump `read_gen`, and release the lock.
    pub fn publish_fill(&self, guard: FillGuard<'_>, n: usize) {
        debug_assert!(n <= guard.len());
        self.len.store(n, Ordering::Release);
        self.dirty.store(true, Ordering::Release);
        self.read_gen.fetch_add(1, Ordering::Release);
        drop(guard);
    }

    /// Acquire the storage for draining. Blocks while a fill is in progress.
    #[must_use]
    pub fn lock_for_drain(&self) -> DrainGuard<'_> {
        DrainGuard(self.storage.read())
    }

    /// Publish a completed drain: clear the dirty bit, bump `write_gen`, and
    /// release the lock.
    pub fn publish_drain(&self, guard: DrainGuard<'_>) {
        self.dirty.store(false, Ordering::Release);
        self.write_gen.fetch_add(1, Ordering::Release);
        drop(guard);
    }

    /// Bytes of valid data from the most recent fill.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of completed fills.
    #[must_use]
    pub fn read_gen(&self) -> u64 {
        self.read_gen.load(Ordering::Acquire)
    }

    /// Count of completed drains.
    #[must_use]
    pub fn write_gen(&self) -> u64 {
        self.write_gen.load(Ordering::Acquire)
    }

    /// True while the slot holds a fill that has not been drained yet. The
    /// generation counters are authoritative; `dirty` is advisory.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.read_gen() > self.write_gen()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Slot(len={}, read_gen={}, write_gen={}, dirty={})",
            self.len(),
            self.read_gen(),
            self.write_gen(),
            self.is_dirty()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_slot_holds_no_data() {
        let slot = Slot::new(64).unwrap();
        assert_eq!(slot.len(), 0);
        assert_eq!(slot.read_gen(), 0);
        assert_eq!(slot.write_gen(), 0);
        assert!(!slot.pending());
        assert!(!slot.is_dirty());
    }

    #[test]
    fn fill_then_drain_advances_generations() {
        let slot = Slot::new(64).unwrap();

        let mut guard = slot.lock_for_fill();
        guard[..5].copy_from_slice(b"hello");
        slot.publish_fill(guard, 5);

        assert_eq!(slot.len(), 5);
        assert_eq!(slot.read_gen(), 1);
        assert!(slot.pending());
        assert!(slot.is_dirty());

        let guard = slot.lock_for_drain();
        assert_eq!(&guard[..slot.len()], b"hello");
        slot.publish_drain(guard);

        assert_eq!(slot.write_gen(), 1);
        assert!(!slot.pending());
        assert!(!slot.is_dirty());
    }

    #[test]
    fn refill_overwrites_previous_fill() {
        let slot = Slot::new(8).unwrap();

        let mut guard = slot.lock_for_fill();
        guard[..3].copy_from_slice(b"old");
        slot.publish_fill(guard, 3);
        slot.publish_drain(slot.lock_for_drain());

        let mut guard = slot.lock_for_fill();
        guard[..8].copy_from_slice(b"newbytes");
        slot.publish_fill(guard, 8);

        assert_eq!(slot.read_gen(), 2);
        assert_eq!(slot.write_gen(), 1);
        assert_eq!(&slot.lock_for_drain()[..slot.len()], b"newbytes");
    }
}
