//! Per-card device state binding pools, ring, demultiplexer, and sessions
//! together (`spec.md` §2, §4).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axisdma_api::{DmaError, Direction, HardwareServices};
use spin::Mutex;

use crate::buffer::{Buffer, BufferFlags, BufferState, Dest, Pool};
use crate::config::DeviceConfig;
use crate::demux::Demultiplexer;
use crate::queue::WaitQueue;
use crate::ring::{DescriptorWidth, DrainEffect, RingEngine, TransmitPost};
use crate::session::Session;

/// One AXIS Gen2 DMA card: two buffer pools, a ring engine, the destination
/// demultiplexer, the device-wide TX free-queue, and the set of currently
/// open sessions.
///
/// `ring` is guarded by a single lock that plays the role of the
/// device-level write-lock `spec.md` §5 calls for around both IRQ-drain and
/// transmit-post register sequences — one mutex is enough to serialize both,
/// since nothing else ever touches the register block.
pub struct Device {
    hw: Arc<dyn HardwareServices>,
    config: DeviceConfig,
    rx_pool: Pool,
    tx_pool: Pool,
    ring: Mutex<RingEngine>,
    demux: Demultiplexer,
    tx_free: WaitQueue,
    sessions: Mutex<Vec<Arc<Session>>>,
    next_session_id: AtomicU64,
}

impl Device {
    /// Validates `config`, allocates both pools, and brings up the ring
    /// engine. The device is left offline; call [`Self::start`] once every
    /// buffer has been accounted for.
    pub fn new(
        hw: Arc<dyn HardwareServices>,
        config: DeviceConfig,
        phys_base: u64,
        mmio_size: u64,
        ring_len: usize,
        width: DescriptorWidth,
    ) -> Result<Self, DmaError> {
        config.validate()?;

        let rx_pool = Pool::allocate(
            hw.as_ref(),
            0,
            Direction::Write,
            config.buffer_mode,
            config.rx_buffer_count,
            config.buffer_size,
        )?;
        let tx_pool = Pool::allocate(
            hw.as_ref(),
            config.rx_buffer_count,
            Direction::Read,
            config.buffer_mode,
            config.tx_buffer_count,
            config.buffer_size,
        )?;

        let ring = RingEngine::init(hw.as_ref(), phys_base, mmio_size, ring_len, width, rx_pool.len(), tx_pool.len())?;
        for (group, &threshold) in config.group_thresholds.iter().enumerate() {
            ring.set_group_threshold(group as u8, threshold);
        }

        let tx_free = WaitQueue::new(tx_pool.len());
        for buf in tx_pool.iter() {
            buf.set_state(BufferState::OnTxFree);
            tx_free.push(buf.clone());
        }

        Ok(Self {
            hw,
            config,
            rx_pool,
            tx_pool,
            ring: Mutex::new(ring),
            demux: Demultiplexer::new(),
            tx_free,
            sessions: Mutex::new(Vec::new()),
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Hands every RX buffer to hardware and enables the card. Call once,
    /// after construction.
    pub fn start(&self) -> Result<(), DmaError> {
        let mut ring = self.ring.lock();
        for buf in self.rx_pool.iter() {
            ring.post_receive_free(buf, self.hw.as_ref())?;
        }
        ring.enable(self.config.irq_hold_off, self.config.timeout);
        Ok(())
    }

    /// Takes the card offline. Safe to call even if [`Self::start`] never ran.
    pub fn stop(&self) {
        self.ring.lock().disable();
    }

    /// Opens a new session and registers it with the device.
    pub fn open_session(self: &Arc<Self>) -> Arc<Session> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::open(id, self.rx_pool.len()));
        self.sessions.lock().push(session.clone());
        session
    }

    /// Closes `session`: releases its destinations, reclaims any buffer it
    /// still held, and returns RX buffers to hardware / TX buffers to the
    /// free-queue.
    pub fn close_session(&self, session: &Arc<Session>) {
        let reclaimed = session.close(&self.demux, &self.rx_pool, &self.tx_pool);
        for buf in reclaimed {
            self.reclaim_idle_buffer(&buf);
        }
        self.sessions.lock().retain(|s| s.id() != session.id());
    }

    fn reclaim_idle_buffer(&self, buf: &Arc<Buffer>) {
        match buf.direction() {
            Direction::Write => {
                let mut ring = self.ring.lock();
                let _ = ring.post_receive_free(buf, self.hw.as_ref());
            }
            Direction::Read => {
                buf.set_state(BufferState::OnTxFree);
                self.tx_free.push(buf.clone());
            }
        }
    }

    /// Claims destinations for `session` (`spec.md` §4.4).
    pub fn claim_destinations(&self, session: &Session, indices: &[usize]) -> Result<(), DmaError> {
        for &idx in indices {
            if idx >= crate::config::DMA_MAX_DEST {
                return Err(DmaError::InvalidDestination);
            }
        }
        session.claim_destinations(&self.demux, indices)
    }

    /// Hands `session` ownership of the next free TX buffer.
    pub fn get_tx_index(&self, session: &Session) -> Result<Arc<Buffer>, DmaError> {
        let buf = self.tx_free.pop().ok_or(DmaError::QueueFull)?;
        buf.set_state(BufferState::Owned(session.id()));
        Ok(buf)
    }

    /// Posts a TX buffer `session` owns to hardware, on `dest` — which
    /// `session` must currently hold (`spec.md` §4.4, §4.6).
    pub fn post_write(
        &self,
        session: &Session,
        buffer: &Arc<Buffer>,
        size: u32,
        dest: Dest,
        flags: BufferFlags,
    ) -> Result<(), DmaError> {
        if buffer.state() != BufferState::Owned(session.id()) {
            return Err(DmaError::NotOwnedBySession);
        }
        if !session.holds_destination(dest.index()) {
            return Err(DmaError::DestinationNotHeld);
        }
        let mut ring = self.ring.lock();
        let post = TransmitPost { index: buffer.index(), handle: buffer.handle(), size, dest, flags };
        ring.post_transmit(buffer, self.hw.as_ref(), post)
    }

    /// Returns a zero-copy RX buffer `session` is done with, reposting it to
    /// hardware.
    pub fn return_index(&self, session: &Session, buffer: &Arc<Buffer>) -> Result<(), DmaError> {
        session.return_index(buffer)?;
        self.reclaim_idle_buffer(buffer);
        Ok(())
    }

    /// Snapshot of pool occupancy, surfaced through the ioctl diagnostic
    /// surface (`spec.md` §4.6).
    #[must_use]
    pub fn stats(&self) -> (crate::buffer::PoolStats, crate::buffer::PoolStats) {
        (self.rx_pool.stats(), self.tx_pool.stats())
    }

    /// Load-time configuration this device was constructed with.
    #[must_use]
    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Looks up a buffer by its device-wide index in whichever pool owns it.
    pub fn lookup_buffer(&self, index: u32) -> Option<Arc<Buffer>> {
        self.rx_pool
            .lookup_by_index(index)
            .or_else(|| self.tx_pool.lookup_by_index(index))
            .cloned()
    }

    /// Passes an opaque register command straight through to hardware,
    /// rejecting offsets outside the mapped window (`spec.md` §4.6, §7:
    /// the `DeviceCommand` ioctl passthrough).
    pub fn raw_register_write(&self, offset: u64, value: u32) -> Result<(), DmaError> {
        self.ring.lock().raw_register_write(offset, value)
    }

    /// Number of IRQs that found nothing to drain.
    #[must_use]
    pub fn missed_irq_count(&self) -> u32 {
        self.ring.lock().missed_irq_count()
    }

    /// Runs one IRQ-drain pass: decodes both rings under the ring lock, then
    /// applies the resulting effects against sessions, the TX free-queue,
    /// and hardware reposts with the ring lock released (`spec.md` §4.3,
    /// §5 — "drain" and "apply" are deliberately separate so nothing holds
    /// the register lock across a session wake-up).
    pub fn service_irq(&self) {
        let effects = {
            let mut ring = self.ring.lock();
            let demux = &self.demux;
            ring.drain(
                self.hw.as_ref(),
                |index| self.lookup_buffer(index),
                |buf| {
                    let (_, dest, _, _, _) = buf.meta();
                    demux.owner_of(dest.index())
                },
            )
        };

        for effect in effects {
            self.apply_drain_effect(effect);
        }
    }

    fn apply_drain_effect(&self, effect: DrainEffect) {
        match effect {
            DrainEffect::EnqueueRx { session_id, buffer } => {
                let sessions = self.sessions.lock();
                match sessions.iter().find(|s| s.id() == session_id) {
                    Some(session) => {
                        if !session.rx_queue().push_irq(buffer.clone()) {
                            drop(sessions);
                            self.reclaim_idle_buffer(&buffer);
                        }
                    }
                    None => {
                        drop(sessions);
                        self.reclaim_idle_buffer(&buffer);
                    }
                }
            }
            // The ring engine already reserved this buffer's write-ring
            // slot (incrementing `write_posted`) when it produced this
            // effect; only the register write remains.
            DrainEffect::RepostRx { buffer } => {
                let ring = self.ring.lock();
                if let Err(err) = ring.commit_reserved_repost(&buffer, self.hw.as_ref()) {
                    log::warn!("failed to repost rx buffer {}: {err}", buffer.index());
                }
            }
            // Already parked on the ring engine's write-staging queue; it
            // will be reposted by a later drain pass's refill step once the
            // write-ring has room (`spec.md` §4.3, §8 boundary).
            DrainEffect::StageRx { buffer } => {
                log::debug!("write-ring at capacity; buffer {} staged for later repost", buffer.index());
            }
            DrainEffect::ReturnTx { buffer } => {
                buffer.set_state(BufferState::OnTxFree);
                self.tx_free.push_irq(buffer);
            }
            DrainEffect::GroupCredit { group } => {
                log::debug!("buffer group {group} crossed its configured threshold");
            }
        }
    }

    /// Releases both pools and the ring engine. The device must already be
    /// stopped and have no open sessions.
    pub fn teardown(self) {
        self.ring.into_inner().teardown(self.hw.as_ref());
        self.rx_pool.free(self.hw.as_ref());
        self.tx_pool.free(self.hw.as_ref());
    }
}
