//! Identity primitives shared by every entity in the graph
//!
//! Every entity (model, object, volume, instance, material, and their
//! embedded config objects) carries exactly one [`ObjectId`]. Within one
//! process no two live entities share an id unless one is an explicit *copy*
//! of the other: same id means same logical identity, which is what the
//! undo/redo and background-snapshot diffing layers key on to skip
//! recomputation for unchanged subtrees. *Clone* operations reassign fresh
//! ids across the whole subtree; *copy* operations preserve them.
//!
//! [`Timestamp`] is the cheap change-detection companion: mutable value-like
//! sub-objects (facet paint annotations, layer height profiles) bump their
//! timestamp on every mutation, and consumers compare timestamps instead of
//! deep-comparing contents.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Allocator for process-wide unique entity ids. 0 is the invalid sentinel.
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Source of fresh timestamp values; all objects start at 1 and only
/// `touch()` draws from this counter, so two never-touched objects still
/// compare equal.
static NEXT_TIMESTAMP: AtomicU64 = AtomicU64::new(2);

/// Process-wide unique identifier of one entity
///
/// Ids are allocated from an atomic counter; background threads (clone and
/// deserialization paths) may allocate concurrently. Serialized forms keep
/// ids verbatim, since persisted snapshots are re-read within the same
/// process for undo/redo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocate the next unique id
    pub fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The invalid sentinel (0), used by entities whose id is about to be
    /// overwritten by a copy or a deserialization
    pub const fn invalid() -> Self {
        ObjectId(0)
    }

    /// True iff this id was allocated (non-zero)
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Raw numeric value, for logging and map keys
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic dirty-counter for mutable value-like sub-objects
///
/// Freshly constructed values all carry timestamp 1; `touch()` overwrites
/// the value with a globally fresh one, so after any mutation the timestamp
/// differs from every snapshot taken before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The shared initial value all untouched objects carry
    pub const fn initial() -> Self {
        Timestamp(1)
    }

    /// Bump to a fresh, globally unique value
    pub fn touch(&mut self) {
        self.0 = NEXT_TIMESTAMP.fetch_add(1, Ordering::Relaxed);
    }

    /// Fast-path change check: equal timestamps mean "assume unchanged"
    pub fn matches(self, other: Timestamp) -> bool {
        self.0 == other.0
    }

    /// Raw counter value
    pub fn value(self) -> u64 {
        self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::initial()
    }
}

/// Lazily computed cache slot behind a shared reference
///
/// Stands in for the original's mutable-cache-fields-behind-const-accessors
/// idiom: accessors stay `&self`, mutators call [`Cached::invalidate`], and
/// the next accessor call recomputes. The cell makes the owning types
/// deliberately `!Sync`; the graph follows a single-writer discipline where
/// background work operates on copied trees, never the live one.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    slot: RefCell<Option<T>>,
}

impl<T: Clone> Cached<T> {
    /// Create an empty (invalid) cache slot
    pub fn new() -> Self {
        Cached {
            slot: RefCell::new(None),
        }
    }

    /// Drop the cached value; the next access recomputes
    pub fn invalidate(&self) {
        *self.slot.borrow_mut() = None;
    }

    /// True iff a value is currently cached
    pub fn is_valid(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Store a value directly
    pub fn set(&self, value: T) {
        *self.slot.borrow_mut() = Some(value);
    }

    /// The cached value, if valid
    pub fn get(&self) -> Option<T> {
        self.slot.borrow().clone()
    }

    /// Return the cached value, computing and storing it first if invalid
    pub fn get_or_compute(&self, compute: impl FnOnce() -> T) -> T {
        let mut slot = self.slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(compute());
        }
        slot.clone().unwrap_or_else(|| unreachable!())
    }

    /// Adjust the cached value in place, only if one is present
    ///
    /// Used by the translate fast-path, which shifts still-valid bounding
    /// boxes instead of invalidating them.
    pub fn update(&self, adjust: impl FnOnce(&mut T)) {
        if let Some(value) = self.slot.borrow_mut().as_mut() {
            adjust(value);
        }
    }
}

impl<T: Clone> Default for Cached<T> {
    fn default() -> Self {
        Cached::new()
    }
}
