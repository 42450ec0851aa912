//! I/O entrypoints: the per-open-file character-device surface (`spec.md`
//! §4.6).

use std::sync::Arc;

use axisdma_api::DmaError;
use spin::Mutex;

use crate::buffer::{BufferError, BufferFlags, Dest};
use crate::device::Device;
use crate::session::Session;

/// Driver API version reported by [`Ioctl::ApiVersion`].
pub const API_VERSION: u32 = 1;

/// One open file descriptor on the device node. Owns a [`Session`] for its
/// lifetime and is the only type application code talks to directly
/// (`spec.md` §4.6).
pub struct CharDevice {
    device: Arc<Device>,
    session: Arc<Session>,
    debug: Mutex<bool>,
}

/// Metadata returned alongside a received frame (`spec.md` §4.6).
#[derive(Debug, Clone, Copy)]
pub struct IoRequest {
    /// Device-wide index of the buffer the frame arrived in.
    pub index: u32,
    /// Bytes received.
    pub size: u32,
    /// Destination the frame arrived on.
    pub dest: Dest,
    /// First-user/last-user/continuation flags.
    pub flags: BufferFlags,
    /// Hardware/driver error bits recorded on the completion.
    pub error: BufferError,
}

/// One target slot for [`CharDevice::read`] (`spec.md` §4.6: "N request
/// batch form").
pub enum ReadTarget<'a> {
    /// Copy the frame into `buf` and repost the buffer to hardware
    /// immediately, whether or not it fit.
    Copy(&'a mut [u8]),
    /// Hand the caller the buffer's index instead of copying; the buffer
    /// stays `Owned` by this session until it explicitly returns it via
    /// [`Ioctl::ReturnIndex`].
    ZeroCopy,
}

/// Data to post in [`CharDevice::write`] (`spec.md` §4.6: `ptr == 0` selects
/// the index mode).
pub enum WriteData<'a> {
    /// Copy `bytes` into a freshly-obtained TX buffer and post it.
    Copy(&'a [u8]),
    /// Post a TX buffer the session already owns (obtained earlier via
    /// [`Ioctl::GetTxIndex`]) without copying.
    ZeroCopy {
        /// Device-wide index of the already-owned buffer.
        index: u32,
    },
}

/// Per-write metadata supplied by the caller (`spec.md` §4.6).
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteDescriptor {
    /// Destination to transmit on; the session must currently hold it.
    pub dest: Dest,
    /// First-user/last-user/continuation flags to post with this frame.
    pub flags: BufferFlags,
    /// Byte length to post. Ignored for [`WriteData::Copy`], which posts
    /// the copied slice's own length; required for [`WriteData::ZeroCopy`],
    /// which has no slice to measure.
    pub size: u32,
}

/// Readiness as reported by [`CharDevice::poll`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PollStatus {
    /// `true` if a `read` would not block.
    pub readable: bool,
    /// `true` if a `write` would not block (always `true` here: `write`
    /// fails fast with [`DmaError::QueueFull`] instead of blocking,
    /// `spec.md` §4.4).
    pub writable: bool,
}

/// Requests accepted by [`CharDevice::ioctl`] (`spec.md` §4.6).
#[derive(Debug, Clone)]
pub enum Ioctl {
    /// Number of buffers in the RX pool.
    GetRxCount,
    /// Number of buffers in the TX pool.
    GetTxCount,
    /// Per-buffer capacity, in bytes.
    GetBufferSize,
    /// `true` if a `read` would not block right now.
    IsReadReady,
    /// Enables or disables verbose driver logging for this session.
    SetDebug(bool),
    /// Claims the listed destination indices for this session.
    ClaimDestinations(Vec<usize>),
    /// Returns a previously-delivered RX buffer by device-wide index.
    ReturnIndex(u32),
    /// Obtains a TX buffer without immediately writing to it.
    GetTxIndex,
    /// Reports [`API_VERSION`].
    ApiVersion,
    /// Opaque register passthrough: `(offset, value)`.
    DeviceCommand(u32, u64),
}

/// Results returned by [`CharDevice::ioctl`].
#[derive(Debug, Clone, Copy)]
pub enum IoctlResult {
    /// A count (buffer-pool sizes).
    Count(u32),
    /// A size in bytes.
    Size(u32),
    /// A boolean readiness flag.
    Ready(bool),
    /// A device-wide buffer index.
    Index(u32),
    /// A driver API version.
    Version(u32),
    /// The request was accepted; no value to report.
    Ack,
}

impl CharDevice {
    /// Opens a new session against `device`.
    #[must_use]
    pub fn open(device: Arc<Device>) -> Self {
        let session = device.open_session();
        Self {
            device,
            session,
            debug: Mutex::new(false),
        }
    }

    /// Closes the underlying session, releasing every destination and
    /// buffer it still held.
    pub fn close(self) {
        self.device.close_session(&self.session);
    }

    /// Services up to `targets.len()` receive requests, blocking on each in
    /// turn until a frame is available or `interrupt` fires (`spec.md` §4.6,
    /// §5, §7, §8 S5). A signal stops the batch: the interrupted slot's
    /// result is `Err(DmaError::Interrupted)` and no later slot is
    /// attempted.
    pub fn read(&self, targets: &mut [ReadTarget<'_>], interrupt: &dyn Fn() -> bool) -> Vec<Result<IoRequest, DmaError>> {
        let mut results = Vec::with_capacity(targets.len());
        for target in targets.iter_mut() {
            let result = self.read_one(target, interrupt);
            let interrupted = matches!(result, Err(DmaError::Interrupted));
            results.push(result);
            if interrupted {
                break;
            }
        }
        results
    }

    fn read_one(&self, target: &mut ReadTarget<'_>, interrupt: &dyn Fn() -> bool) -> Result<IoRequest, DmaError> {
        let buffer = self.session.wait_read(interrupt).map_err(|_| DmaError::Interrupted)?;
        let (size, dest, flags, mut error, id) = buffer.meta();

        if let ReadTarget::Copy(out) = target {
            if size as usize > out.len() {
                error.max_error = true;
                buffer.set_meta(size, dest, flags, error, id);
                self.device.return_index(&self.session, &buffer)?;
                return Err(DmaError::BufferTooSmall);
            }

            // SAFETY: the buffer is `Owned` by this session (set by
            // `wait_read`) and therefore not concurrently posted to
            // hardware.
            let data = unsafe { buffer.as_slice(size as usize) };
            out[..size as usize].copy_from_slice(data);
            self.device.return_index(&self.session, &buffer)?;
        }

        Ok(IoRequest { index: buffer.index(), size, dest, flags, error })
    }

    /// Posts `data` to hardware on `descriptor.dest`, which this session
    /// must already hold. Fails fast (never blocks) if a fresh TX buffer is
    /// needed and the free-queue is empty, matching `spec.md` §4.4.
    pub fn write(&self, data: WriteData<'_>, descriptor: WriteDescriptor) -> Result<(), DmaError> {
        match data {
            WriteData::Copy(bytes) => {
                let buffer = self.device.get_tx_index(&self.session)?;

                if bytes.len() > buffer.capacity() {
                    self.device.return_index(&self.session, &buffer)?;
                    return Err(DmaError::BufferTooSmall);
                }

                // SAFETY: `buffer` is `Owned` by this session and not
                // posted yet.
                let dest = unsafe { buffer.as_mut_slice() };
                dest[..bytes.len()].copy_from_slice(bytes);

                self.device.post_write(&self.session, &buffer, bytes.len() as u32, descriptor.dest, descriptor.flags)
            }
            WriteData::ZeroCopy { index } => {
                let buffer = self.device.lookup_buffer(index).ok_or(DmaError::InvalidIndex)?;
                self.device.post_write(&self.session, &buffer, descriptor.size, descriptor.dest, descriptor.flags)
            }
        }
    }

    /// Services one ioctl request.
    pub fn ioctl(&self, request: Ioctl) -> Result<IoctlResult, DmaError> {
        match request {
            Ioctl::GetRxCount => Ok(IoctlResult::Count(self.device.stats().0.total)),
            Ioctl::GetTxCount => Ok(IoctlResult::Count(self.device.stats().1.total)),
            Ioctl::GetBufferSize => Ok(IoctlResult::Size(self.device.config().buffer_size)),
            Ioctl::IsReadReady => Ok(IoctlResult::Ready(self.session.rx_queue().not_empty())),
            Ioctl::SetDebug(enabled) => {
                *self.debug.lock() = enabled;
                Ok(IoctlResult::Ack)
            }
            Ioctl::ClaimDestinations(indices) => {
                self.device.claim_destinations(&self.session, &indices)?;
                Ok(IoctlResult::Ack)
            }
            Ioctl::ReturnIndex(index) => {
                let buffer = self.device.lookup_buffer(index).ok_or(DmaError::InvalidIndex)?;
                self.device.return_index(&self.session, &buffer)?;
                Ok(IoctlResult::Ack)
            }
            Ioctl::GetTxIndex => {
                let buffer = self.device.get_tx_index(&self.session)?;
                Ok(IoctlResult::Index(buffer.index()))
            }
            Ioctl::ApiVersion => Ok(IoctlResult::Version(API_VERSION)),
            Ioctl::DeviceCommand(offset, value) => {
                self.device.raw_register_write(u64::from(offset), value as u32)?;
                Ok(IoctlResult::Ack)
            }
        }
    }

    /// Readiness for `select`/`poll`/`epoll` (`spec.md` §4.6).
    #[must_use]
    pub fn poll(&self) -> PollStatus {
        PollStatus {
            readable: self.session.rx_queue().not_empty(),
            writable: true,
        }
    }

    /// Byte offset into the device node's mmap region for buffer `index`,
    /// used by zero-copy callers that mmap buffers instead of calling
    /// [`Self::read`]/[`Self::write`].
    pub fn mmap_offset_for_index(&self, index: u32) -> Result<u64, DmaError> {
        self.device.lookup_buffer(index).ok_or(DmaError::InvalidIndex)?;
        Ok(u64::from(index) * u64::from(self.device.config().buffer_size))
    }

    /// Registers or deregisters this file descriptor for asynchronous
    /// (`SIGIO`-style) read-ready notification.
    ///
    /// This host-testable core has no OS signal-delivery mechanism to hook
    /// into, so the subscription is accepted but never actually fires; real
    /// delivery is the host integration's responsibility (`spec.md` §1, "out
    /// of scope: signal/async-notification delivery").
    pub fn fasync(&self, _enabled: bool) -> Result<(), DmaError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::ring::DescriptorWidth;
    use crate::test_support::FakeHardware;
    use axisdma_api::HardwareServices;

    fn make_device() -> Arc<Device> {
        let hw: Arc<dyn HardwareServices> = Arc::new(FakeHardware::new());
        let mut config = DeviceConfig::default();
        config.rx_buffer_count = 2;
        config.tx_buffer_count = 2;
        config.buffer_size = 64;
        let device = Device::new(hw, config, 0x1000_0000, 0x1_0000, 8, DescriptorWidth::Bits64).unwrap();
        device.start().unwrap();
        Arc::new(device)
    }

    #[test]
    fn write_posts_a_claimed_destination_and_frees_no_buffer_on_success() {
        let device = make_device();
        let writer = CharDevice::open(device.clone());
        writer.ioctl(Ioctl::ClaimDestinations(vec![0])).unwrap();
        writer.write(WriteData::Copy(b"hello"), WriteDescriptor::default()).unwrap();
        assert_eq!(device.stats().1.free, 1, "one TX buffer must now be posted, not free");
    }

    #[test]
    fn write_too_large_returns_buffer_too_small_and_frees_the_buffer() {
        let device = make_device();
        let writer = CharDevice::open(device.clone());
        let data = vec![0u8; 1024];
        let err = writer.write(WriteData::Copy(&data), WriteDescriptor::default()).unwrap_err();
        assert_eq!(err, DmaError::BufferTooSmall);
        assert_eq!(device.stats().1.free, 2, "the oversized-write buffer must be returned to the free-queue");
    }

    #[test]
    fn write_rejects_an_unclaimed_destination() {
        let device = make_device();
        let writer = CharDevice::open(device.clone());
        let descriptor = WriteDescriptor { dest: Dest { lane: 3, channel: 0 }, ..Default::default() };
        let err = writer.write(WriteData::Copy(b"hi"), descriptor).unwrap_err();
        assert_eq!(err, DmaError::DestinationNotHeld);
    }

    #[test]
    fn zero_copy_write_posts_an_already_owned_buffer_by_index() {
        let device = make_device();
        let writer = CharDevice::open(device.clone());
        writer.ioctl(Ioctl::ClaimDestinations(vec![1])).unwrap();
        let index = match writer.ioctl(Ioctl::GetTxIndex).unwrap() {
            IoctlResult::Index(i) => i,
            other => panic!("expected Index, got {other:?}"),
        };

        let descriptor = WriteDescriptor { dest: Dest { lane: 1, channel: 0 }, flags: BufferFlags::default(), size: 5 };
        writer.write(WriteData::ZeroCopy { index }, descriptor).unwrap();

        let buf = device.lookup_buffer(index).unwrap();
        assert!(buf.in_hw());
    }

    #[test]
    fn zero_copy_read_returns_index_without_copying_and_leaves_the_buffer_owned() {
        let device = make_device();
        let reader = CharDevice::open(device.clone());
        let buf = device.lookup_buffer(0).unwrap();
        buf.set_meta(4, Dest::default(), BufferFlags::default(), BufferError::default(), 0);
        reader.session.rx_queue().push(buf.clone());

        let mut targets = [ReadTarget::ZeroCopy];
        let results = reader.read(&mut targets, &|| false);
        assert_eq!(results.len(), 1);
        let request = results[0].as_ref().unwrap();
        assert_eq!(request.index, buf.index());
        assert_eq!(buf.state(), crate::buffer::BufferState::Owned(reader.session.id()));
    }

    #[test]
    fn too_small_copy_read_reposts_the_buffer_to_hardware() {
        let device = make_device();
        let reader = CharDevice::open(device.clone());
        let buf = device.lookup_buffer(0).unwrap();
        buf.set_meta(100, Dest::default(), BufferFlags::default(), BufferError::default(), 0);
        reader.session.rx_queue().push(buf.clone());

        let mut small = [0u8; 4];
        let mut targets = [ReadTarget::Copy(&mut small)];
        let results = reader.read(&mut targets, &|| false);
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(DmaError::BufferTooSmall)));
        assert!(buf.in_hw(), "buffer must be reposted to hardware, not left owned");
    }

    #[test]
    fn batch_read_processes_every_target() {
        let device = make_device();
        let reader = CharDevice::open(device.clone());
        let first = device.lookup_buffer(0).unwrap();
        let second = device.lookup_buffer(1).unwrap();
        first.set_meta(5, Dest::default(), BufferFlags::default(), BufferError::default(), 0);
        second.set_meta(5, Dest::default(), BufferFlags::default(), BufferError::default(), 0);
        reader.session.rx_queue().push(first.clone());
        reader.session.rx_queue().push(second.clone());

        let mut a = [0u8; 16];
        let mut b = [0u8; 16];
        let mut targets = [ReadTarget::Copy(&mut a), ReadTarget::Copy(&mut b)];
        let results = reader.read(&mut targets, &|| false);
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
    }

    #[test]
    fn ioctl_reports_pool_sizes_and_version() {
        let device = make_device();
        let cd = CharDevice::open(device);
        assert!(matches!(cd.ioctl(Ioctl::GetRxCount), Ok(IoctlResult::Count(2))));
        assert!(matches!(cd.ioctl(Ioctl::GetTxCount), Ok(IoctlResult::Count(2))));
        assert!(matches!(cd.ioctl(Ioctl::ApiVersion), Ok(IoctlResult::Version(API_VERSION))));
    }

    #[test]
    fn device_command_rejects_out_of_window_offset() {
        let device = make_device();
        let cd = CharDevice::open(device);
        let err = cd.ioctl(Ioctl::DeviceCommand(0xFFFF_0000, 0)).unwrap_err();
        assert_eq!(err, DmaError::OutOfWindow);
    }

    #[test]
    fn mmap_offset_rejects_unknown_index() {
        let device = make_device();
        let cd = CharDevice::open(device);
        assert_eq!(cd.mmap_offset_for_index(9999), Err(DmaError::InvalidIndex));
    }
}
