//! AXIS Gen2 MMIO register layout (`spec.md` §6).

use axisdma_api::MmioWindow;
use bitflags::bitflags;

/// Byte offsets into the card's BAR, named after the register map in
/// `spec.md` §6.
pub mod offset {
    pub const ENABLE_VERSION: u64 = 0x0000;
    pub const INT_ENABLE: u64 = 0x0004;
    pub const CONTINUOUS_ENABLE: u64 = 0x0008;
    pub const DROP_ENABLE: u64 = 0x000C;
    pub const WRITE_RING_BASE_LO: u64 = 0x0010;
    pub const WRITE_RING_BASE_HI: u64 = 0x0014;
    pub const READ_RING_BASE_LO: u64 = 0x0018;
    pub const READ_RING_BASE_HI: u64 = 0x001C;
    pub const FIFO_RESET: u64 = 0x0020;
    pub const MAX_SIZE: u64 = 0x0028;
    pub const ONLINE: u64 = 0x002C;
    pub const ACKNOWLEDGE: u64 = 0x0030;
    pub const ADDR_WIDTH: u64 = 0x0038;
    pub const CACHE_CONFIG: u64 = 0x003C;
    pub const READ_FIFO_A: u64 = 0x0040;
    pub const READ_FIFO_B: u64 = 0x0044;
    pub const WRITE_FIFO_A: u64 = 0x0048;
    pub const INT_ACK_AND_ENABLE: u64 = 0x004C;
    pub const INT_REQ_COUNT: u64 = 0x0050;
    pub const HW_WR_INDEX: u64 = 0x0054;
    pub const HW_RD_INDEX: u64 = 0x0058;
    pub const WR_REQ_MISSED: u64 = 0x005C;
    pub const READ_FIFO_C: u64 = 0x0060;
    pub const READ_FIFO_D: u64 = 0x0064;
    pub const WRITE_FIFO_B: u64 = 0x0070;
    pub const FORCE_INT: u64 = 0x0080;
    pub const IRQ_HOLD_OFF: u64 = 0x0084;
    pub const TIMEOUT: u64 = 0x0088;
    pub const BG_THRESHOLDS_BASE: u64 = 0x0090;
    pub const BG_COUNTS_BASE: u64 = 0x00B0;
    pub const DMA_ADDR_TABLE_BASE: u64 = 0x4000;
    pub const DMA_ADDR_TABLE_END: u64 = 0x7FFC;
}

bitflags! {
    /// `enable/version` register (offset `0x0000`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnableVersion: u32 {
        /// Bit 0: enable.
        const ENABLE = 1 << 0;
        /// Bit 16: 128-bit descriptor mode.
        const DESC_128 = 1 << 16;
    }
}

impl EnableVersion {
    /// Byte 3: driver-load counter.
    #[must_use]
    pub const fn load_counter(self) -> u8 {
        ((self.bits() >> 24) & 0xFF) as u8
    }
}

bitflags! {
    /// `int-enable` register (offset `0x0004`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IntEnable: u32 {
        const ENABLE = 1 << 0;
    }
}

/// `int-ack-and-enable` command encoding (offset `0x004C`): write
/// `0x30000 + N` to ack `N` completions and re-enable the interrupt.
#[must_use]
pub const fn int_ack_and_enable(completions: u32) -> u32 {
    0x0003_0000 + completions
}

/// Decodes `addr-width` (offset `0x0038`): low byte is `log2(ring length)`,
/// byte 1 encodes the DMA address width in bits.
#[must_use]
pub const fn decode_addr_width(raw: u32) -> (u8, u8) {
    let log2_len = (raw & 0xFF) as u8;
    let dma_addr_bits = ((raw >> 8) & 0xFF) as u8;
    (log2_len, dma_addr_bits)
}

/// Typed accessor over the AXIS Gen2 register block.
///
/// All reads/writes are volatile 32-bit accesses at `window.virt_base() +
/// offset`; callers must hold the device-level MMIO write-lock before any
/// sequence of related writes that must not interleave (`spec.md` §5).
pub struct Regs {
    window: MmioWindow,
}

impl Regs {
    /// Wraps an already-mapped register window.
    #[must_use]
    pub const fn new(window: MmioWindow) -> Self {
        Self { window }
    }

    /// Reads a 32-bit register at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` falls outside the mapped window.
    #[must_use]
    pub fn read32(&self, offset: u64) -> u32 {
        assert!(self.window.contains(offset, 4), "register offset out of window");
        let ptr = (self.window.virt_base() as u64 + offset) as *const u32;
        // SAFETY: offset was bounds-checked against the mapped window, and
        // the window is guaranteed live for the lifetime of `Regs` by its
        // `HardwareServices::map_mmio` caller.
        unsafe { ptr.read_volatile() }
    }

    /// Writes a 32-bit register at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` falls outside the mapped window.
    pub fn write32(&self, offset: u64, value: u32) {
        assert!(self.window.contains(offset, 4), "register offset out of window");
        let ptr = (self.window.virt_base() as u64 + offset) as *mut u32;
        // SAFETY: see `read32`.
        unsafe { ptr.write_volatile(value) };
    }

    /// `true` if `offset..offset+len` is addressable through this window —
    /// used by the ioctl register-window check (`spec.md` §4.6, §7).
    #[must_use]
    pub fn in_window(&self, offset: u64, len: u64) -> bool {
        self.window.contains(offset, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_version_bits() {
        let ev = EnableVersion::ENABLE | EnableVersion::DESC_128;
        assert!(ev.contains(EnableVersion::ENABLE));
        assert!(ev.contains(EnableVersion::DESC_128));
    }

    #[test]
    fn load_counter_is_byte_three() {
        let ev = EnableVersion::from_bits_retain(0x0500_0001);
        assert_eq!(ev.load_counter(), 0x05);
    }

    #[test]
    fn int_ack_and_enable_encoding() {
        assert_eq!(int_ack_and_enable(0), 0x0003_0000);
        assert_eq!(int_ack_and_enable(7), 0x0003_0007);
    }

    #[test]
    fn addr_width_decoding() {
        let (log2_len, dma_bits) = decode_addr_width(0x3F04);
        assert_eq!(log2_len, 0x04);
        assert_eq!(dma_bits, 0x3F);
    }
}
