//! Fixed-size payload arena.
//!
//! Publish payloads live in a static pool of 64-byte units rather than on the
//! heap. A request takes the first run of contiguous free units that fits;
//! occupancy is a single `u64` bitmap guarded by a critical-section mutex, so
//! allocate and release are safe from any task context.
//!
//! ```text
//!  unit:   0    1    2    3    4    5  ...  UNITS-1
//!        ┌────┬────┬────┬────┬────┬────┬───┬────┐
//!  used: │ ## │ ## │    │ ## │    │    │   │    │
//!        └────┴────┴────┴────┴────┴────┴───┴────┘
//!          block A    ^    B    first fit for a 2-unit request
//! ```
//!
//! [`ArenaBlock`] is deliberately neither `Clone` nor `Copy`: releasing a
//! block consumes it, so a payload cannot be freed twice.

use core::cell::{Cell, UnsafeCell};
use core::sync::atomic::{AtomicUsize, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::warn;

use crate::config::{ARENA_UNIT_BYTES, ARENA_UNITS};
use crate::error::PublishError;

/// Handle to a contiguous run of arena units.
#[derive(Debug)]
pub struct ArenaBlock {
    start: u8,
    units: u8,
    len: u16,
    /// Id of the owning arena.
    owner: usize,
}

impl ArenaBlock {
    /// Payload length in bytes (may be shorter than the units it spans).
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of 64-byte units this block occupies.
    pub fn units(&self) -> usize {
        self.units as usize
    }
}

/// Source of arena ids. Zero is reserved for "not yet assigned".
static NEXT_ARENA_ID: AtomicUsize = AtomicUsize::new(1);

pub struct Arena<const UNITS: usize = ARENA_UNITS> {
    storage: UnsafeCell<[[u8; ARENA_UNIT_BYTES]; UNITS]>,
    used: Mutex<CriticalSectionRawMutex, Cell<u64>>,
    /// Assigned on first use and carried along if the arena moves.
    id: AtomicUsize,
}

// SAFETY: the bitmap hands each unit to at most one live `ArenaBlock`, and
// the byte accessors only reach the units of the block they are given. The
// bitmap itself is only touched under the critical-section mutex.
unsafe impl<const UNITS: usize> Sync for Arena<UNITS> {}

impl<const UNITS: usize> Default for Arena<UNITS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const UNITS: usize> Arena<UNITS> {
    const FITS_BITMAP: () = assert!(UNITS > 0 && UNITS <= 64, "arena must be 1..=64 units");

    pub const fn new() -> Self {
        let () = Self::FITS_BITMAP;
        Self {
            storage: UnsafeCell::new([[0; ARENA_UNIT_BYTES]; UNITS]),
            used: Mutex::new(Cell::new(0)),
            id: AtomicUsize::new(0),
        }
    }

    /// Reserve enough contiguous units for `size` bytes.
    ///
    /// A zero-byte request still takes one unit so the block has an
    /// identity. Fails with [`PublishError::OutOfMemory`] when no run is
    /// free; the arena is unchanged in that case.
    pub fn allocate(&self, size: usize) -> Result<ArenaBlock, PublishError> {
        let units = size.div_ceil(ARENA_UNIT_BYTES).max(1);
        if units > UNITS {
            warn!("arena: {size} B request exceeds pool of {} B", UNITS * ARENA_UNIT_BYTES);
            return Err(PublishError::OutOfMemory);
        }

        let mask = run_mask(units);
        let start = self.used.lock(|used| {
            let bits = used.get();
            let start = (0..=UNITS - units).find(|&s| bits & (mask << s) == 0)?;
            used.set(bits | (mask << start));
            Some(start)
        });

        match start {
            Some(start) => Ok(ArenaBlock {
                start: start as u8,
                units: units as u8,
                len: size as u16,
                owner: self.id(),
            }),
            None => Err(PublishError::OutOfMemory),
        }
    }

    /// Return a block's units to the pool.
    ///
    /// Panics if the block was allocated by a different arena.
    pub fn release(&self, block: ArenaBlock) {
        self.check_owner(&block);
        let mask = run_mask(block.units()) << block.start;
        self.used.lock(|used| {
            let bits = used.get();
            debug_assert_eq!(bits & mask, mask, "arena: releasing units that are not in use");
            used.set(bits & !mask);
        });
    }

    /// The slice borrows the block, so it cannot outlive a release.
    pub fn bytes<'s>(&'s self, block: &'s ArenaBlock) -> &'s [u8] {
        self.check_owner(block);
        // SAFETY: the block's units are reserved for it alone and lie inside
        // `storage`; shared access is tied to a shared borrow of the block.
        unsafe {
            let base = self.storage.get().cast::<u8>();
            core::slice::from_raw_parts(base.add(block.start as usize * ARENA_UNIT_BYTES), block.len())
        }
    }

    pub fn bytes_mut<'s>(&'s self, block: &'s mut ArenaBlock) -> &'s mut [u8] {
        self.check_owner(block);
        // SAFETY: as for `bytes`; the exclusive borrow of the block is the
        // only path to these units, so no other reference can alias them.
        unsafe {
            let base = self.storage.get().cast::<u8>();
            core::slice::from_raw_parts_mut(
                base.add(block.start as usize * ARENA_UNIT_BYTES),
                block.len(),
            )
        }
    }

    pub fn used_units(&self) -> usize {
        self.used.lock(|used| used.get().count_ones() as usize)
    }

    pub fn free_units(&self) -> usize {
        UNITS - self.used_units()
    }

    pub const fn capacity_units(&self) -> usize {
        UNITS
    }

    fn id(&self) -> usize {
        let id = self.id.load(Ordering::Acquire);
        if id != 0 {
            return id;
        }
        let fresh = NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed);
        match self.id.compare_exchange(0, fresh, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => fresh,
            Err(assigned) => assigned,
        }
    }

    fn check_owner(&self, block: &ArenaBlock) {
        assert_eq!(block.owner, self.id(), "arena: block belongs to another arena");
    }
}

fn run_mask(units: usize) -> u64 {
    if units >= 64 { u64::MAX } else { (1u64 << units) - 1 }
}
