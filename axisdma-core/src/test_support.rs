//! `HardwareServices` test double backed by real heap memory.
//!
//! [`axisdma_api::services::tests_support::NullHardware`] is enough for
//! pure bookkeeping tests (index math, sorted lookups) that never
//! dereference a handle. The ring engine and anything touching
//! [`crate::buffer::Buffer::as_slice`] needs `virt_base` to be real,
//! readable/writable memory, so this crate's own tests use [`FakeHardware`]
//! instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use axisdma_api::{DmaError, DmaRegion, Direction, HardwareServices, IrqLine, MmioWindow};

/// In-memory `HardwareServices`: every DMA region and MMIO window is a
/// leaked `Box<[u8]>`, reclaimed on `free_dma_region`.
pub struct FakeHardware {
    next_handle: AtomicU64,
    live: Mutex<Vec<(u64, usize, usize)>>,
}

impl FakeHardware {
    /// Creates a fresh fake backend with no outstanding allocations.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            live: Mutex::new(Vec::new()),
        }
    }

    /// Number of DMA regions allocated and not yet freed, for tests that
    /// assert a pool's `free` released everything.
    #[must_use]
    pub fn live_region_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    fn alloc_backing(size: usize) -> usize {
        let boxed = vec![0u8; size].into_boxed_slice();
        Box::leak(boxed).as_mut_ptr() as usize
    }
}

impl Default for FakeHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareServices for FakeHardware {
    fn alloc_dma_region(&self, size: usize, _coherent: bool) -> Result<DmaRegion, DmaError> {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let virt_base = Self::alloc_backing(size.max(1));
        self.live.lock().unwrap().push((handle, virt_base, size));
        Ok(DmaRegion { handle, virt_base, size })
    }

    unsafe fn free_dma_region(&self, region: DmaRegion) {
        let mut live = self.live.lock().unwrap();
        if let Some(pos) = live.iter().position(|(h, _, _)| *h == region.handle) {
            live.remove(pos);
        }
        drop(live);
        // SAFETY: `region.virt_base` was produced by `Box::leak` in
        // `alloc_dma_region` with exactly `region.size.max(1)` bytes, and
        // the caller guarantees (per the trait's safety contract) no
        // outstanding DMA references it.
        unsafe {
            let raw = std::ptr::slice_from_raw_parts_mut(region.virt_base as *mut u8, region.size.max(1));
            drop(Box::from_raw(raw));
        }
    }

    fn sync_for_device(&self, _region: DmaRegion, _direction: Direction) -> Result<(), DmaError> {
        Ok(())
    }

    fn sync_for_cpu(&self, _region: DmaRegion, _direction: Direction) -> Result<(), DmaError> {
        Ok(())
    }

    fn map_mmio(&self, phys_base: u64, size: u64) -> Result<MmioWindow, DmaError> {
        let virt_base = Self::alloc_backing(size as usize);
        Ok(unsafe { MmioWindow::new(phys_base, virt_base, size) })
    }

    fn register_irq(&self, _handler: fn()) -> Result<IrqLine, DmaError> {
        Ok(IrqLine::new(0))
    }

    fn unregister_irq(&self, _irq: IrqLine) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_free_round_trip() {
        let hw = FakeHardware::new();
        let region = hw.alloc_dma_region(4096, true).unwrap();
        assert_eq!(hw.live_region_count(), 1);
        unsafe { hw.free_dma_region(region) };
        assert_eq!(hw.live_region_count(), 0);
    }

    #[test]
    fn allocated_memory_is_readable_and_writable() {
        let hw = FakeHardware::new();
        let region = hw.alloc_dma_region(16, true).unwrap();
        let slice = unsafe { std::slice::from_raw_parts_mut(region.virt_base as *mut u8, region.size) };
        slice[0] = 0xAB;
        assert_eq!(slice[0], 0xAB);
        unsafe { hw.free_dma_region(region) };
    }

    #[test]
    fn mmio_window_is_real_memory() {
        let hw = FakeHardware::new();
        let window = hw.map_mmio(0x1000_0000, 256).unwrap();
        let ptr = window.virt_base() as *mut u32;
        unsafe {
            ptr.write_volatile(0xDEAD_BEEF);
            assert_eq!(ptr.read_volatile(), 0xDEAD_BEEF);
        }
    }
}
