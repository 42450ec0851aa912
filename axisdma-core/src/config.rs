//! Load-time device configuration (`spec.md` §6, "Environment / config").

use axisdma_api::DmaError;

/// DMA-mapping mode a buffer pool is allocated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    /// CPU and device views are kept coherent by the platform; no explicit
    /// sync is required around hand-offs.
    Coherent,
    /// Explicit sync-for-device / sync-for-cpu is required at each hand-off.
    Streaming,
    /// ARM Accelerator Coherency Port: device accesses host memory
    /// coherently, permitting zero-overhead sync like [`Self::Coherent`].
    Acp,
}

/// Interrupt servicing strategy selected at init (`spec.md` §4.3,
/// "Operational variants").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    /// A hard-IRQ handler schedules a drain work-item; a periodic
    /// forced-interrupt tick additionally covers staging-queue refills.
    Interrupt,
    /// No interrupts; a dedicated work-item repeatedly drains and
    /// re-queues itself.
    Polled,
}

/// Number of buffer-group threshold/credit register pairs (`spec.md` §6).
pub const BUFFER_GROUP_COUNT: usize = 8;

/// Number of destination slots in the demultiplexer table (`spec.md` §3).
pub const DMA_MAX_DEST: usize = 256;

/// Load-time parameters for one AXIS Gen2 DMA device.
#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    /// Number of buffers in the TX pool.
    pub tx_buffer_count: u32,
    /// Number of buffers in the RX pool.
    pub rx_buffer_count: u32,
    /// Size in bytes of every buffer in both pools.
    pub buffer_size: u32,
    /// DMA-mapping mode for both pools.
    pub buffer_mode: BufferMode,
    /// Continue-on-full receive enable (register `continuous-enable`).
    pub continue_enable: bool,
    /// Drop-on-full receive enable (register `drop-enable`).
    pub drop_enable: bool,
    /// IRQ coalescing delay, in hardware-defined ticks.
    pub irq_hold_off: u32,
    /// Transaction timeout, in hardware-defined ticks.
    pub timeout: u32,
    /// Interrupt servicing strategy.
    pub service_mode: ServiceMode,
    /// Per-buffer-group credit thresholds.
    pub group_thresholds: [u32; BUFFER_GROUP_COUNT],
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            tx_buffer_count: 128,
            rx_buffer_count: 128,
            buffer_size: 1 << 20,
            buffer_mode: BufferMode::Streaming,
            continue_enable: false,
            drop_enable: false,
            irq_hold_off: 0,
            timeout: 0,
            service_mode: ServiceMode::Interrupt,
            group_thresholds: [0; BUFFER_GROUP_COUNT],
        }
    }
}

impl DeviceConfig {
    /// Rejects configurations that cannot be realized by the hardware or
    /// that would make the buffer pools meaningless.
    pub fn validate(&self) -> Result<(), DmaError> {
        if self.buffer_size == 0 {
            return Err(DmaError::AllocFailed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(DeviceConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_buffer_size_is_rejected() {
        let mut cfg = DeviceConfig::default();
        cfg.buffer_size = 0;
        assert_eq!(cfg.validate(), Err(DmaError::AllocFailed));
    }
}
