//! Per-open-file session state (`spec.md` §4.4).

use std::sync::Arc;

use axisdma_api::DmaError;

use crate::buffer::{Buffer, BufferState};
use crate::demux::Demultiplexer;
use crate::queue::{WaitOutcome, WaitQueue};

/// State private to one open file descriptor on the character device.
///
/// A session does not own the TX free-queue or either buffer pool — those
/// are device-wide and shared across every open session — but it does own
/// its RX wait-queue and the bookkeeping needed to release everything it
/// claimed on close (`spec.md` §4.4, §5).
pub struct Session {
    id: u64,
    rx_queue: WaitQueue,
    /// `None` until the first successful [`Self::claim_destinations`] call;
    /// `spec.md` §4.4 allows at most one successful claim per session, so a
    /// failed (conflicting) attempt must not latch this — `Some` only
    /// records what hardware-destination ownership `Self::close` must
    /// release.
    claimed_destinations: spin::Mutex<Option<Vec<usize>>>,
}

impl Session {
    /// Opens a new session. `rx_capacity` should match the device's RX pool
    /// size so the queue can never reject a legitimate completion
    /// (`spec.md` §4.2).
    #[must_use]
    pub fn open(id: u64, rx_capacity: usize) -> Self {
        Self {
            id,
            rx_queue: WaitQueue::new(rx_capacity),
            claimed_destinations: spin::Mutex::new(None),
        }
    }

    /// Stable identifier used as the demux/buffer ownership tag.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// This session's RX wait-queue.
    #[must_use]
    pub const fn rx_queue(&self) -> &WaitQueue {
        &self.rx_queue
    }

    /// Claims every destination in `indices`, all-or-nothing. A session may
    /// do this at most once: a second call always fails with
    /// [`DmaError::AlreadyClaimed`], even with a disjoint index set
    /// (`spec.md` §4.4). A conflicting first attempt does not consume that
    /// one-shot allowance, so a session that lost a race may still claim a
    /// different set afterward (`spec.md` §8 S6).
    pub fn claim_destinations(&self, demux: &Demultiplexer, indices: &[usize]) -> Result<(), DmaError> {
        let mut claimed = self.claimed_destinations.lock();
        if claimed.is_some() {
            return Err(DmaError::AlreadyClaimed);
        }
        demux.claim(self.id, indices).map_err(|_| DmaError::DestinationInUse)?;
        *claimed = Some(indices.to_vec());
        Ok(())
    }

    /// Whether this session currently holds destination `index`, used to
    /// validate `write()`'s `dest` argument against the session's claimed
    /// mask (`spec.md` §4.4, §4.6).
    #[must_use]
    pub fn holds_destination(&self, index: usize) -> bool {
        self.claimed_destinations.lock().as_ref().is_some_and(|claimed| claimed.contains(&index))
    }

    /// Blocks until a completed RX buffer is available or `interrupt` fires,
    /// marking the returned buffer `Owned` by this session.
    pub fn wait_read(&self, interrupt: &dyn Fn() -> bool) -> Result<Arc<Buffer>, WaitOutcome> {
        let buf = self.rx_queue.wait_and_pop(interrupt)?;
        buf.set_state(BufferState::Owned(self.id));
        Ok(buf)
    }

    /// Validates that `buffer` is owned by this session and clears its
    /// ownership, leaving it `Idle` and ready for the caller ([`crate::device::Device`])
    /// to repost to hardware.
    pub fn return_index(&self, buffer: &Buffer) -> Result<(), DmaError> {
        if buffer.state() != BufferState::Owned(self.id) {
            return Err(DmaError::NotOwnedBySession);
        }
        buffer.set_state(BufferState::Idle);
        Ok(())
    }

    /// Releases every destination this session claimed, drains its RX
    /// queue, and reclaims any buffer from `rx_pool`/`tx_pool` still marked
    /// `Owned` by this session (the user never called `return_index` /
    /// `get_tx_index`'s counterpart before closing). Returns every buffer
    /// reclaimed so the caller can repost or free-queue them.
    pub fn close(&self, demux: &Demultiplexer, rx_pool: &crate::buffer::Pool, tx_pool: &crate::buffer::Pool) -> Vec<Arc<Buffer>> {
        demux.release_all(self.id);

        let mut reclaimed = Vec::new();
        let mut drained = Vec::new();
        self.rx_queue.pop_list(&mut drained, usize::MAX);
        for buf in drained {
            buf.set_state(BufferState::Idle);
            reclaimed.push(buf);
        }

        for buf in rx_pool.iter().chain(tx_pool.iter()) {
            if buf.state() == BufferState::Owned(self.id) {
                buf.set_state(BufferState::Idle);
                reclaimed.push(buf.clone());
            }
        }

        reclaimed
    }
}
