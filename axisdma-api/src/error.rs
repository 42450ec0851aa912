//! Error taxonomy shared by the hardware-services boundary and the DMA core.

use core::fmt;

/// Errors that can occur at the hardware-services boundary or while
/// operating on DMA buffers, rings, sessions, or destinations.
///
/// These map onto the error taxonomy in `spec.md` §7: resource exhaustion,
/// protocol violation, hardware-reported frame error, user-buffer-too-small,
/// address-out-of-window, and interrupted wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaError {
    /// Allocation of DMA-capable memory failed.
    AllocFailed,
    /// Mapping an MMIO region failed.
    MmioMapFailed,
    /// Registering or unmasking an interrupt failed.
    IrqSetupFailed,
    /// A streaming sync-for-device or sync-for-cpu call failed.
    SyncFailed,
    /// The requested index does not name a buffer in the pool.
    InvalidIndex,
    /// The requested destination is outside `[0, DMA_MAX_DEST)`.
    InvalidDestination,
    /// The session does not hold the destination named in a request.
    DestinationNotHeld,
    /// `claim_destinations` found a destination already held by another
    /// session; no partial claim is made.
    DestinationInUse,
    /// A session attempted to claim destinations a second time.
    AlreadyClaimed,
    /// The caller does not own the buffer it is trying to return or address.
    NotOwnedBySession,
    /// A register or mmap offset fell outside the allowed window.
    OutOfWindow,
    /// The received frame was larger than the caller's buffer.
    BufferTooSmall,
    /// The wait-queue is full.
    QueueFull,
    /// A blocking wait was interrupted before data arrived.
    Interrupted,
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocFailed => f.write_str("DMA allocation failed"),
            Self::MmioMapFailed => f.write_str("MMIO mapping failed"),
            Self::IrqSetupFailed => f.write_str("interrupt setup failed"),
            Self::SyncFailed => f.write_str("DMA sync failed"),
            Self::InvalidIndex => f.write_str("invalid buffer index"),
            Self::InvalidDestination => f.write_str("invalid destination"),
            Self::DestinationNotHeld => f.write_str("destination not held by session"),
            Self::DestinationInUse => f.write_str("destination already claimed"),
            Self::AlreadyClaimed => f.write_str("destinations already claimed by this session"),
            Self::NotOwnedBySession => f.write_str("buffer not owned by session"),
            Self::OutOfWindow => f.write_str("offset outside allowed window"),
            Self::BufferTooSmall => f.write_str("user buffer smaller than received frame"),
            Self::QueueFull => f.write_str("wait-queue full"),
            Self::Interrupted => f.write_str("wait interrupted"),
        }
    }
}
