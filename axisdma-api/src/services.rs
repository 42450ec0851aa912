//! Kernel/host service contract drivers use instead of touching hardware
//! directly.

use crate::direction::Direction;
use crate::error::DmaError;
use crate::resource::{DmaRegion, IrqLine, MmioWindow};

/// Services the host provides to the AXIS Gen2 DMA core.
///
/// Implemented by whatever owns the PCI device (probe/MMIO mapping is
/// explicitly out of scope for this crate, per `spec.md` §1) and passed to
/// [`axisdma_core`](../axisdma_core/index.html) at device construction. A
/// test double backed by plain `Vec<u8>` buffers and an in-memory register
/// file can implement this trait with no card present, which is how the
/// ring-engine and buffer-pool tests exercise IRQ-drain logic.
pub trait HardwareServices: Send + Sync {
    /// Allocates `count` bytes of DMA-capable memory.
    ///
    /// `coherent` selects a coherent mapping (no explicit sync required) vs.
    /// a streaming mapping (sync-for-device/sync-for-cpu required around
    /// each hand-off to hardware).
    fn alloc_dma_region(&self, size: usize, coherent: bool) -> Result<DmaRegion, DmaError>;

    /// Releases a region obtained from [`alloc_dma_region`](Self::alloc_dma_region).
    ///
    /// # Safety
    ///
    /// The caller must ensure no DMA operation still references the region
    /// and that `region` was returned by a prior `alloc_dma_region` call on
    /// `self` that has not already been freed.
    unsafe fn free_dma_region(&self, region: DmaRegion);

    /// Synchronizes a streaming-mode buffer for device access (CPU writes
    /// flushed so hardware observes them).
    fn sync_for_device(&self, region: DmaRegion, direction: Direction) -> Result<(), DmaError>;

    /// Synchronizes a streaming-mode buffer for CPU access (device writes
    /// made visible to the CPU).
    fn sync_for_cpu(&self, region: DmaRegion, direction: Direction) -> Result<(), DmaError>;

    /// Maps the card's register BAR, or a window of it, for volatile access.
    fn map_mmio(&self, phys_base: u64, size: u64) -> Result<MmioWindow, DmaError>;

    /// Registers the card's interrupt vector with the given level-triggered
    /// handler, returning a handle to later unregister it.
    ///
    /// The handler is invoked with no arguments and is expected to schedule
    /// (not itself run) the IRQ-drain work, matching the "IRQ-driven
    /// service" variant in `spec.md` §4.3.
    fn register_irq(&self, handler: fn()) -> Result<IrqLine, DmaError>;

    /// Unregisters a previously registered interrupt handler.
    fn unregister_irq(&self, irq: IrqLine);
}

#[cfg(any(test, feature = "test-support"))]
pub mod tests_support {
    //! A minimal in-memory [`HardwareServices`] usable from any crate's
    //! test suite without requiring `std`'s heap-backed allocator tricks.
    //!
    //! Kept here (rather than in `axisdma-core`) so both crates' test
    //! suites can share one fake without a dev-dependency cycle.
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};

    /// Hands out monotonically increasing fake handles; never actually
    /// allocates or frees memory, so it is only useful for address-space
    /// bookkeeping tests (e.g. [`crate::resource`] and sorted-lookup tests)
    /// that never dereference the handle.
    pub struct NullHardware {
        next_handle: AtomicU64,
    }

    impl NullHardware {
        /// Creates a fresh fake hardware backend.
        #[must_use]
        pub fn new() -> Self {
            Self {
                next_handle: AtomicU64::new(0x1000),
            }
        }
    }

    impl Default for NullHardware {
        fn default() -> Self {
            Self::new()
        }
    }

    impl HardwareServices for NullHardware {
        fn alloc_dma_region(&self, size: usize, _coherent: bool) -> Result<DmaRegion, DmaError> {
            let handle = self.next_handle.fetch_add(size as u64, Ordering::Relaxed);
            Ok(DmaRegion {
                handle,
                virt_base: handle as usize,
                size,
            })
        }

        unsafe fn free_dma_region(&self, _region: DmaRegion) {}

        fn sync_for_device(&self, _region: DmaRegion, _direction: Direction) -> Result<(), DmaError> {
            Ok(())
        }

        fn sync_for_cpu(&self, _region: DmaRegion, _direction: Direction) -> Result<(), DmaError> {
            Ok(())
        }

        fn map_mmio(&self, phys_base: u64, size: u64) -> Result<MmioWindow, DmaError> {
            Ok(unsafe { MmioWindow::new(phys_base, phys_base as usize, size) })
        }

        fn register_irq(&self, _handler: fn()) -> Result<IrqLine, DmaError> {
            Ok(IrqLine::new(0))
        }

        fn unregister_irq(&self, _irq: IrqLine) {}
    }

    #[test]
    fn allocations_have_increasing_handles() {
        let hw = NullHardware::new();
        let a = hw.alloc_dma_region(0x1000, true).unwrap();
        let b = hw.alloc_dma_region(0x1000, true).unwrap();
        assert!(b.handle > a.handle);
    }
}
