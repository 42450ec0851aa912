//! Buffer and Buffer Pool (`spec.md` §3, §4.1).

use std::sync::Arc;

use axisdma_api::{DmaError, Direction, HardwareServices};
use spin::Mutex;

use crate::config::BufferMode;

/// A pool larger than this many buffers would be stored as a list of
/// equal-length sub-lists to bound any single contiguous allocation
/// (`spec.md` §3). Below the threshold a pool is a single list, which is
/// what this implementation always builds — the eligibility rule for the
/// sorted-by-handle index ("fits in a single sub-list") is preserved even
/// though physical chunking of the backing storage is not, since no tested
/// pool approaches six-figure buffer counts.
const CHUNK_THRESHOLD: usize = 100_000;

/// Acquisition mode of a buffer pool, mirroring [`BufferMode`] but kept
/// local to this module since only [`Pool`]/[`Buffer`] need to branch on it.
pub type AcquireMode = BufferMode;

/// First-user/last-user/continuation flags attached to a completed frame
/// (`spec.md` §3, §6). Encoded the same way the hardware encodes the
/// transmit-post flags field: bits 7..0 first-user, bits 15..8 last-user,
/// bit 16 continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferFlags {
    /// First-user-defined byte.
    pub first_user: u8,
    /// Last-user-defined byte.
    pub last_user: u8,
    /// Set when the frame continues into the next buffer.
    pub continuation: bool,
}

impl BufferFlags {
    /// Packs the flags the same way the hardware's 32-bit flags word does.
    #[must_use]
    pub const fn encode(self) -> u32 {
        (self.first_user as u32) | ((self.last_user as u32) << 8) | ((self.continuation as u32) << 16)
    }

    /// Unpacks a hardware flags word.
    #[must_use]
    pub const fn decode(word: u32) -> Self {
        Self {
            first_user: (word & 0xFF) as u8,
            last_user: ((word >> 8) & 0xFF) as u8,
            continuation: (word >> 16) & 1 != 0,
        }
    }
}

/// A logical (lane, virtual-channel) destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Dest {
    /// Lane number.
    pub lane: u8,
    /// Virtual-channel number.
    pub channel: u8,
}

impl Dest {
    /// Flattens to the single-byte destination index used to key
    /// [`crate::demux::Demultiplexer`] (`spec.md` §3: "length DMA_MAX_DEST").
    #[must_use]
    pub const fn index(self) -> usize {
        self.lane as usize
    }
}

/// Hardware-reported completion result code (`spec.md` §6, 3-bit `result`
/// field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultCode {
    /// No error.
    #[default]
    Ok,
    /// Receive FIFO overflowed.
    FifoOverflow,
    /// Frame length error.
    LengthError,
    /// End-of-frame error (EOFE).
    Eofe,
    /// Bus error.
    Bus,
    /// Reserved / unrecognized code.
    Reserved(u8),
}

impl ResultCode {
    /// Decodes the hardware's 3-bit result field.
    #[must_use]
    pub const fn decode(bits: u8) -> Self {
        match bits & 0b111 {
            0 => Self::Ok,
            1 => Self::FifoOverflow,
            2 => Self::LengthError,
            3 => Self::Eofe,
            4 => Self::Bus,
            other => Self::Reserved(other),
        }
    }

    /// Returns `true` if this code indicates anything other than success.
    #[must_use]
    pub const fn is_error(self) -> bool {
        !matches!(self, Self::Ok)
    }
}

/// Error bits recorded on a completed buffer (`spec.md` §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferError {
    /// Hardware-reported result code, propagated verbatim.
    pub result: ResultCode,
    /// Set when a receive completion reported `size == 0`.
    pub fifo_error: bool,
    /// Set when a `read` request's buffer was smaller than the frame.
    pub max_error: bool,
}

impl BufferError {
    /// `true` if any error bit is set.
    #[must_use]
    pub const fn any(self) -> bool {
        self.result.is_error() || self.fifo_error || self.max_error
    }
}

/// Where a buffer currently resides, enforcing `spec.md` §8 invariant 1: at
/// most one of {in hardware, enqueued, owned by a session, on the TX
/// free-queue} holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Not currently referenced by anything (only valid transiently, e.g.
    /// mid-teardown, or for a TX buffer that was just allocated).
    Idle,
    /// Posted to hardware, awaiting a completion.
    InHw,
    /// Resident in a [`crate::queue::WaitQueue`] (session RX queue or a
    /// staging queue).
    InQueue,
    /// Handed to a session: either a zero-copy RX buffer the user holds, or
    /// a TX buffer obtained via `get_tx_index`.
    Owned(u64),
    /// Sitting on the TX free-queue, available to `get_tx_index`.
    OnTxFree,
}

#[derive(Debug)]
struct BufferInner {
    state: BufferState,
    size: u32,
    dest: Dest,
    flags: BufferFlags,
    error: BufferError,
    id: u8,
}

/// A fixed-size, physically-contiguous DMA-addressable region owned by the
/// driver for the lifetime of the device (`spec.md` §3).
#[derive(Debug)]
pub struct Buffer {
    index: u32,
    handle: u64,
    virt_base: usize,
    byte_size: usize,
    mode: AcquireMode,
    direction: Direction,
    count: core::sync::atomic::AtomicU64,
    inner: Mutex<BufferInner>,
}

impl Buffer {
    /// Device-wide stable identifier.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// DMA address visible to hardware; never changes after creation.
    #[must_use]
    pub const fn handle(&self) -> u64 {
        self.handle
    }

    /// CPU-visible base address of the backing memory.
    #[must_use]
    pub const fn virt_base(&self) -> usize {
        self.virt_base
    }

    /// Pool-wide fixed size of this buffer, in bytes.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.byte_size
    }

    /// Direction of the pool this buffer belongs to.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Monotonic usage counter, incremented every time the buffer changes
    /// hands, for diagnostics only.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(core::sync::atomic::Ordering::Relaxed)
    }

    fn bump_count(&self) {
        self.count.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
    }

    /// Current residency state.
    #[must_use]
    pub fn state(&self) -> BufferState {
        self.inner.lock().state
    }

    /// Sets the residency state unconditionally. Internal to the crate:
    /// every caller is a component (pool, ring, queue, session) that has
    /// already established the invariant holds for the new state.
    pub(crate) fn set_state(&self, state: BufferState) {
        self.bump_count();
        self.inner.lock().state = state;
    }

    /// `true` if currently posted to hardware.
    #[must_use]
    pub fn in_hw(&self) -> bool {
        matches!(self.state(), BufferState::InHw)
    }

    /// Completion metadata filled in by the ring engine on receive.
    #[must_use]
    pub fn meta(&self) -> (u32, Dest, BufferFlags, BufferError, u8) {
        let inner = self.inner.lock();
        (inner.size, inner.dest, inner.flags, inner.error, inner.id)
    }

    /// Records completion metadata (called only from the ring engine's
    /// receive-completion path).
    pub(crate) fn set_meta(&self, size: u32, dest: Dest, flags: BufferFlags, error: BufferError, id: u8) {
        let mut inner = self.inner.lock();
        inner.size = size;
        inner.dest = dest;
        inner.flags = flags;
        inner.error = error;
        inner.id = id;
    }

    /// Issues sync-for-device for streaming buffers before posting to
    /// hardware; a no-op for coherent/ACP buffers.
    pub(crate) fn to_hw(&self, hw: &dyn HardwareServices) -> Result<(), DmaError> {
        if self.mode == AcquireMode::Streaming {
            hw.sync_for_device(self.dma_region(), self.direction)?;
        }
        self.set_state(BufferState::InHw);
        Ok(())
    }

    /// Issues sync-for-cpu for streaming buffers on completion; a no-op for
    /// coherent/ACP buffers.
    pub(crate) fn from_hw(&self, hw: &dyn HardwareServices) -> Result<(), DmaError> {
        if self.mode == AcquireMode::Streaming {
            hw.sync_for_cpu(self.dma_region(), self.direction)?;
        }
        Ok(())
    }

    fn dma_region(&self) -> axisdma_api::DmaRegion {
        axisdma_api::DmaRegion {
            handle: self.handle,
            virt_base: self.virt_base,
            size: self.byte_size,
        }
    }

    /// Copies up to `capacity()` bytes out of the buffer.
    ///
    /// # Safety
    ///
    /// The caller must ensure the buffer is not concurrently posted to
    /// hardware and that `virt_base()` remains valid for `size` bytes.
    #[must_use]
    pub unsafe fn as_slice(&self, size: usize) -> &[u8] {
        let len = size.min(self.byte_size);
        unsafe { core::slice::from_raw_parts(self.virt_base as *const u8, len) }
    }

    /// Mutable view for copy-in on transmit.
    ///
    /// # Safety
    ///
    /// Same requirements as [`as_slice`](Self::as_slice).
    #[must_use]
    pub unsafe fn as_mut_slice(&self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.virt_base as *mut u8, self.byte_size) }
    }
}

/// An ordered collection of [`Buffer`]s for one direction on one device
/// (`spec.md` §3, §4.1).
pub struct Pool {
    base_index: u32,
    direction: Direction,
    mode: AcquireMode,
    buffers: Vec<Arc<Buffer>>,
    /// `(handle, position-in-buffers)` sorted by handle, present only when
    /// the pool is small enough and not streaming-mode (handles under
    /// streaming may be remapped between uses and cannot be sorted once).
    sorted_by_handle: Option<Vec<(u64, usize)>>,
}

impl Pool {
    /// Allocates `count` buffers of `buffer_size` bytes in `direction`,
    /// starting device-wide indices at `base_index`.
    ///
    /// Rolls back all prior successful allocations in this pool and returns
    /// an error if any single allocation fails (`spec.md` §4.1).
    pub fn allocate(
        hw: &dyn HardwareServices,
        base_index: u32,
        direction: Direction,
        mode: AcquireMode,
        count: u32,
        buffer_size: u32,
    ) -> Result<Self, DmaError> {
        let mut buffers = Vec::with_capacity(count as usize);
        let coherent = !matches!(mode, AcquireMode::Streaming);

        for i in 0..count {
            match hw.alloc_dma_region(buffer_size as usize, coherent) {
                Ok(region) => {
                    let buffer = Buffer {
                        index: base_index + i,
                        handle: region.handle,
                        virt_base: region.virt_base,
                        byte_size: region.size,
                        mode,
                        direction,
                        count: core::sync::atomic::AtomicU64::new(0),
                        inner: Mutex::new(BufferInner {
                            state: BufferState::Idle,
                            size: 0,
                            dest: Dest::default(),
                            flags: BufferFlags::default(),
                            error: BufferError::default(),
                            id: 0,
                        }),
                    };
                    buffers.push(Arc::new(buffer));
                }
                Err(err) => {
                    log::error!(
                        "buffer pool: allocation {i}/{count} failed ({err}); rolling back {} prior buffers",
                        buffers.len()
                    );
                    for buffer in &buffers {
                        let region = buffer.dma_region();
                        unsafe { hw.free_dma_region(region) };
                    }
                    return Err(err);
                }
            }
        }

        let fits_single_chunk = buffers.len() <= CHUNK_THRESHOLD;
        let sorted_by_handle = if fits_single_chunk && mode != AcquireMode::Streaming {
            let mut sorted: Vec<(u64, usize)> =
                buffers.iter().enumerate().map(|(i, b)| (b.handle, i)).collect();
            sorted.sort_unstable_by_key(|(handle, _)| *handle);
            Some(sorted)
        } else {
            None
        };

        Ok(Self {
            base_index,
            direction,
            mode,
            buffers,
            sorted_by_handle,
        })
    }

    /// Number of buffers in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// `true` if the pool holds no buffers (a valid, fully-functional
    /// no-op configuration per `spec.md` §4.1).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// The first device-wide `index` value in this pool.
    #[must_use]
    pub const fn base_index(&self) -> u32 {
        self.base_index
    }

    /// Direction of this pool.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Constant-time lookup by device-wide index.
    #[must_use]
    pub fn lookup_by_index(&self, index: u32) -> Option<&Arc<Buffer>> {
        let offset = index.checked_sub(self.base_index)? as usize;
        self.buffers.get(offset)
    }

    /// Looks up a buffer by its DMA handle: binary search if the pool has a
    /// sorted index, linear scan otherwise.
    #[must_use]
    pub fn lookup_by_handle(&self, handle: u64) -> Option<&Arc<Buffer>> {
        if let Some(sorted) = &self.sorted_by_handle {
            let pos = sorted.binary_search_by_key(&handle, |(h, _)| *h).ok()?;
            let (_, idx) = sorted[pos];
            self.buffers.get(idx)
        } else {
            self.buffers.iter().find(|b| b.handle == handle)
        }
    }

    /// Read-only iteration over every buffer in the pool (used by
    /// `Session::close` to scan for session-owned buffers).
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Buffer>> {
        self.buffers.iter()
    }

    /// Snapshot of pool occupancy for the diagnostic/ioctl surface.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        for buffer in &self.buffers {
            match buffer.state() {
                BufferState::InHw => stats.in_hw += 1,
                BufferState::InQueue => stats.in_queue += 1,
                BufferState::Owned(_) => stats.owned += 1,
                BufferState::OnTxFree => stats.free += 1,
                BufferState::Idle => {}
            }
        }
        stats.total = self.buffers.len() as u32;
        stats
    }

    /// Releases all DMA mappings and memory.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if any buffer is still posted to hardware,
    /// matching the precondition in `spec.md` §4.1 ("the pool must not be
    /// in use; no buffers may be `in_hw`").
    pub fn free(self, hw: &dyn HardwareServices) {
        for buffer in &self.buffers {
            debug_assert!(!buffer.in_hw(), "freeing pool with a buffer still in hardware");
            let region = buffer.dma_region();
            unsafe { hw.free_dma_region(region) };
        }
    }
}

/// Point-in-time counts of buffer residency within a pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Total buffers in the pool.
    pub total: u32,
    /// Buffers currently posted to hardware.
    pub in_hw: u32,
    /// Buffers currently resident in some wait-queue.
    pub in_queue: u32,
    /// Buffers currently owned by a session.
    pub owned: u32,
    /// Buffers currently on the TX free-queue.
    pub free: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axisdma_api::services::tests_support::NullHardware;

    #[test]
    fn allocate_zero_is_a_valid_no_op() {
        let hw = NullHardware::new();
        let pool = Pool::allocate(&hw, 0, Direction::Write, AcquireMode::Coherent, 0, 4096).unwrap();
        assert!(pool.is_empty());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn index_lookup_is_offset_from_base() {
        let hw = NullHardware::new();
        let pool = Pool::allocate(&hw, 100, Direction::Write, AcquireMode::Coherent, 4, 4096).unwrap();
        assert_eq!(pool.lookup_by_index(100).unwrap().index(), 100);
        assert_eq!(pool.lookup_by_index(103).unwrap().index(), 103);
        assert!(pool.lookup_by_index(99).is_none());
        assert!(pool.lookup_by_index(104).is_none());
    }

    #[test]
    fn handle_lookup_uses_sorted_index_when_coherent() {
        let hw = NullHardware::new();
        let pool = Pool::allocate(&hw, 0, Direction::Write, AcquireMode::Coherent, 8, 4096).unwrap();
        assert!(pool.sorted_by_handle.is_some());
        for buffer in pool.iter() {
            let found = pool.lookup_by_handle(buffer.handle()).unwrap();
            assert_eq!(found.index(), buffer.index());
        }
        assert!(pool.lookup_by_handle(0xFFFF_FFFF).is_none());
    }

    #[test]
    fn streaming_pools_have_no_sorted_index() {
        let hw = NullHardware::new();
        let pool = Pool::allocate(&hw, 0, Direction::Read, AcquireMode::Streaming, 4, 4096).unwrap();
        assert!(pool.sorted_by_handle.is_none());
        // Linear scan still finds every buffer.
        for buffer in pool.iter() {
            assert!(pool.lookup_by_handle(buffer.handle()).is_some());
        }
    }

    #[test]
    fn buffer_flags_round_trip() {
        let flags = BufferFlags {
            first_user: 0xAB,
            last_user: 0xCD,
            continuation: false,
        };
        assert_eq!(flags.encode(), 0x0000_CDAB);
        assert_eq!(BufferFlags::decode(0x0000_CDAB), flags);
    }

    #[test]
    fn result_code_decodes_hardware_bits() {
        assert_eq!(ResultCode::decode(0), ResultCode::Ok);
        assert_eq!(ResultCode::decode(1), ResultCode::FifoOverflow);
        assert_eq!(ResultCode::decode(3), ResultCode::Eofe);
        assert_eq!(ResultCode::decode(7), ResultCode::Reserved(7));
    }

    #[test]
    fn stats_reflect_state_transitions() {
        let hw = NullHardware::new();
        let pool = Pool::allocate(&hw, 0, Direction::Write, AcquireMode::Coherent, 2, 4096).unwrap();
        assert_eq!(pool.stats().in_hw, 0);
        pool.lookup_by_index(0).unwrap().set_state(BufferState::InHw);
        assert_eq!(pool.stats().in_hw, 1);
        assert_eq!(pool.stats().total, 2);
    }
}
