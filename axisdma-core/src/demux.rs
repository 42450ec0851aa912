//! Destination demultiplexer (`spec.md` §4.5).

use spin::Mutex;

use crate::config::DMA_MAX_DEST;

/// Maps each of the `DMA_MAX_DEST` destination slots to at most one owning
/// session, enforcing `spec.md` §8 invariant 2: `|{s : d in mask(s)}| <= 1`
/// for every destination `d`.
pub struct Demultiplexer {
    owner: Mutex<[Option<u64>; DMA_MAX_DEST]>,
}

impl Demultiplexer {
    /// Creates a demultiplexer with every destination unclaimed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            owner: Mutex::new([None; DMA_MAX_DEST]),
        }
    }

    /// Attempts to claim every destination index in `indices` for
    /// `session_id`. All-or-nothing: if any requested index is already
    /// claimed by a different session, no claim is made and the first
    /// conflicting index is returned (`spec.md` §4.4, §8 invariant 2).
    pub fn claim(&self, session_id: u64, indices: &[usize]) -> Result<(), usize> {
        let mut owner = self.owner.lock();
        for &idx in indices {
            if let Some(existing) = owner[idx] {
                if existing != session_id {
                    return Err(idx);
                }
            }
        }
        for &idx in indices {
            owner[idx] = Some(session_id);
        }
        Ok(())
    }

    /// Releases every destination currently claimed by `session_id`.
    pub fn release_all(&self, session_id: u64) {
        let mut owner = self.owner.lock();
        for slot in owner.iter_mut() {
            if *slot == Some(session_id) {
                *slot = None;
            }
        }
    }

    /// The session currently holding destination `index`, if any.
    #[must_use]
    pub fn owner_of(&self, index: usize) -> Option<u64> {
        self.owner.lock()[index]
    }
}

impl Default for Demultiplexer {
    fn default() -> Self {
        Self::new()
    }
}
