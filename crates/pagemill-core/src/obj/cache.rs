//! Document-scoped indirect-object cache.
//!
//! Maps object numbers to retained cells under a reader-writer lock. The
//! parse path inserts a placeholder and runs the parser *without* the lock
//! held, so a parse that recurses into the cache neither deadlocks nor
//! re-parses: recursive callers observe the placeholder and see a missing
//! object instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;
use pagemill_parser::ParserError;

use crate::obj::ObjCell;

/// Object number that can never name a live object.
const INVALID_OBJNUM: u32 = u32::MAX;

/// A cached object together with its identity.
///
/// The object number is set exactly once, when the entry enters the cache.
#[derive(Debug)]
pub struct IndirectObject<T> {
    objnum: u32,
    generation: u32,
    payload: T,
}

impl<T> IndirectObject<T> {
    pub fn objnum(&self) -> u32 {
        self.objnum
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }
}

enum Slot<T> {
    /// A parse for this number is in flight.
    Pending,
    Ready(ObjCell<IndirectObject<T>>),
}

/// Fingerprint-to-object map shared by every thread touching one document.
pub struct IndirectObjectCache<T> {
    slots: RwLock<HashMap<u32, Slot<T>>>,
    next_objnum: AtomicU32,
}

impl<T> Default for IndirectObjectCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IndirectObjectCache<T> {
    pub fn new() -> Self {
        IndirectObjectCache {
            slots: RwLock::new(HashMap::new()),
            next_objnum: AtomicU32::new(1),
        }
    }

    fn valid_objnum(objnum: u32) -> bool {
        objnum != 0 && objnum != INVALID_OBJNUM
    }

    /// Retained cell for `objnum`, if present and fully parsed.
    pub fn get(&self, objnum: u32) -> Option<ObjCell<IndirectObject<T>>> {
        if !Self::valid_objnum(objnum) {
            return None;
        }
        match self.slots.read().get(&objnum) {
            Some(Slot::Ready(cell)) => Some(cell.retain()),
            _ => None,
        }
    }

    /// Retained cell for `objnum`, parsing on miss.
    ///
    /// At most one caller runs `parse` for a given number; concurrent and
    /// recursive callers that hit the in-flight placeholder get `Ok(None)`.
    /// A failed parse drops the placeholder and leaves the cache clean.
    pub fn get_or_parse<F>(
        &self,
        objnum: u32,
        parse: F,
    ) -> Result<Option<ObjCell<IndirectObject<T>>>, ParserError>
    where
        F: FnOnce() -> Result<T, ParserError>,
    {
        if !Self::valid_objnum(objnum) {
            return Ok(None);
        }

        {
            let slots = self.slots.read();
            match slots.get(&objnum) {
                Some(Slot::Ready(cell)) => return Ok(Some(cell.retain())),
                Some(Slot::Pending) => return Ok(None),
                None => {}
            }
        }

        {
            // Upgrade and re-check: the condition observed under the read
            // lock may no longer hold.
            let mut slots = self.slots.write();
            match slots.get(&objnum) {
                Some(Slot::Ready(cell)) => return Ok(Some(cell.retain())),
                Some(Slot::Pending) => return Ok(None),
                None => {
                    slots.insert(objnum, Slot::Pending);
                }
            }
        }

        // Parse with no lock held; the parser may call back into this cache.
        let parsed = parse();

        let mut slots = self.slots.write();
        match parsed {
            Ok(payload) => {
                let cell = ObjCell::new(IndirectObject {
                    objnum,
                    generation: 0,
                    payload,
                });
                slots.insert(objnum, Slot::Ready(cell.retain()));
                Ok(Some(cell))
            }
            Err(err) => {
                if let Some(Slot::Pending) = slots.get(&objnum) {
                    slots.remove(&objnum);
                }
                Err(err)
            }
        }
    }

    /// Insert a new object under the next free number; returns that number.
    pub fn add(&self, payload: T) -> u32 {
        let objnum = self.next_objnum.fetch_add(1, Ordering::Relaxed);
        let cell = ObjCell::new(IndirectObject {
            objnum,
            generation: 0,
            payload,
        });
        self.slots.write().insert(objnum, Slot::Ready(cell));
        objnum
    }

    /// Overwrite `objnum` only when `generation` strictly exceeds the stored
    /// one. The superseded cell is released here rather than lingering until
    /// an explicit delete.
    pub fn replace_if_higher_generation(&self, objnum: u32, generation: u32, payload: T) -> bool {
        if !Self::valid_objnum(objnum) {
            return false;
        }
        let mut slots = self.slots.write();
        let current = match slots.get(&objnum) {
            Some(Slot::Ready(cell)) => cell.generation(),
            _ => return false,
        };
        if generation <= current {
            return false;
        }
        slots.insert(
            objnum,
            Slot::Ready(ObjCell::new(IndirectObject {
                objnum,
                generation,
                payload,
            })),
        );
        true
    }

    /// Remove `objnum` if it holds a fully parsed entry.
    pub fn delete(&self, objnum: u32) -> bool {
        if !Self::valid_objnum(objnum) {
            return false;
        }
        let mut slots = self.slots.write();
        match slots.get(&objnum) {
            Some(Slot::Ready(_)) => {
                slots.remove(&objnum);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}
