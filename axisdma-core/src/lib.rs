//! Buffer pool, descriptor-ring engine, and session layer for AXIS Gen2
//! PCIe-attached FPGA scatter/gather DMA cards.
//!
//! The crate is organized leaf-first, matching the dependency order in
//! `spec.md` §2: [`buffer`] → [`queue`] → [`ring`] → [`demux`] → [`session`]
//! → [`chardev`]. [`device`] binds all of them into one per-card instance.
//!
//! PCI probing, MMIO region mapping, and DMA frame allocation are reached
//! through [`axisdma_api::HardwareServices`] rather than performed here —
//! they are explicitly out of scope (`spec.md` §1).

pub mod buffer;
pub mod chardev;
pub mod config;
pub mod demux;
pub mod device;
pub mod queue;
pub mod ring;
pub mod session;

#[cfg(test)]
pub mod test_support;

pub use axisdma_api::DmaError;
pub use buffer::{AcquireMode, Buffer, BufferFlags, Pool};
pub use chardev::{CharDevice, IoRequest, Ioctl, IoctlResult, PollStatus, WriteDescriptor, API_VERSION};
pub use config::DeviceConfig;
pub use demux::Demultiplexer;
pub use device::Device;
pub use queue::WaitQueue;
pub use buffer::ResultCode;
pub use ring::{DescriptorWidth, RingEngine};
pub use session::Session;
