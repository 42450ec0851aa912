//! Hardware-services contract for the AXIS Gen2 DMA core.
//!
//! This crate defines the boundary between the DMA buffer pool / ring engine
//! (`axisdma-core`) and whatever owns the physical card: PCI BAR mapping,
//! DMA frame allocation, and interrupt registration are all out of scope for
//! the core (see `spec.md` §1) and are reached only through the
//! [`HardwareServices`] trait. A test harness or a simulator can implement
//! this trait without any real hardware present.

#![cfg_attr(not(test), no_std)]

pub mod direction;
pub mod error;
pub mod resource;
pub mod services;

pub use direction::Direction;
pub use error::DmaError;
pub use resource::{DmaRegion, IrqLine, MmioWindow};
pub use services::HardwareServices;
