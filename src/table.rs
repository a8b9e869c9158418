//! Connection Slot Table
//!
//! Growable arena of connection slots addressed by small integer
//! handles. Freed slots are recycled lowest-index-first; the sequence
//! never shrinks, so an issued handle never becomes an out-of-range
//! index. An operation on a freed handle fails with `StaleHandle`
//! instead.
//!
//! ## Concurrency:
//! - `slots`: protected by a Mutex held only for the scan/append/mark
//!   mutation, never across blocking I/O
//! - all methods take `&self`

use std::fmt;

use parking_lot::Mutex;

use crate::error::{Result, TetherError};

/// Identifies one accepted connection's slot
///
/// Stable for the lifetime of that connection; the index is reused
/// only after the slot has been explicitly released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

impl Handle {
    /// Position of this connection's slot in the table
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Addresses either the overlay's own socket or one accepted peer
///
/// "No handle given" and "handle 0" are distinct by construction;
/// there is no sentinel index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The listening (server) or outbound (client) socket itself
    Primary,

    /// One accepted peer connection
    Peer(Handle),
}

impl From<Handle> for Target {
    fn from(handle: Handle) -> Self {
        Target::Peer(handle)
    }
}

/// One entry in the table: an active descriptor or a reusable hole
enum Slot<T> {
    Active(T),
    Free,
}

impl<T> Slot<T> {
    fn is_free(&self) -> bool {
        matches!(self, Slot::Free)
    }
}

/// Growable indexed collection of connection entries
///
/// Entries are only ever marked free and reused, never removed, so
/// the table length is the high-water mark of concurrently held
/// connections.
pub struct SlotTable<T> {
    slots: Mutex<Vec<Slot<T>>>,
}

impl<T: Clone> SlotTable<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Store a descriptor in the lowest free slot, appending if none
    ///
    /// Returns the handle for the claimed slot.
    pub fn store(&self, item: T) -> Handle {
        let mut slots = self.slots.lock();

        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.is_free() {
                *slot = Slot::Active(item);
                tracing::trace!(index, "recycled free slot");
                return Handle(index);
            }
        }

        slots.push(Slot::Active(item));
        Handle(slots.len() - 1)
    }

    /// Clone out the descriptor at `handle`
    pub fn get(&self, handle: Handle) -> Result<T> {
        let slots = self.slots.lock();

        match slots.get(handle.0) {
            Some(Slot::Active(item)) => Ok(item.clone()),
            _ => Err(TetherError::StaleHandle(handle)),
        }
    }

    /// Mark the slot free and hand its descriptor back for closing
    ///
    /// The slot becomes eligible for reuse by the next `store`.
    pub fn release(&self, handle: Handle) -> Result<T> {
        let mut slots = self.slots.lock();

        let slot = slots
            .get_mut(handle.0)
            .ok_or(TetherError::StaleHandle(handle))?;

        match std::mem::replace(slot, Slot::Free) {
            Slot::Active(item) => Ok(item),
            Slot::Free => Err(TetherError::StaleHandle(handle)),
        }
    }

    /// Table length: the high-water mark of concurrently held
    /// connections. Never decreases.
    pub fn size(&self) -> usize {
        self.slots.lock().len()
    }

    /// Handles of the currently active entries, ascending
    pub fn handles(&self) -> Vec<Handle> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.is_free())
            .map(|(index, _)| Handle(index))
            .collect()
    }

    /// Number of active entries
    pub fn active_count(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|slot| !slot.is_free())
            .count()
    }
}

impl<T: Clone> Default for SlotTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
