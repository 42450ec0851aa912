//! Completion and post descriptor encode/decode (`spec.md` §6).

use crate::buffer::{BufferFlags, Dest, ResultCode};

/// Width of a descriptor ring's entries, fixed at init time (`spec.md` §4.3,
/// "Operational variants": "descriptor width — 64-bit or 128-bit — is
/// selected once, at ring setup, from `addr-width`, and never changes for
/// the life of the device").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWidth {
    /// Two 32-bit words per entry.
    Bits64,
    /// Four 32-bit words per entry.
    Bits128,
}

impl DescriptorWidth {
    /// Number of 32-bit words one ring entry occupies.
    #[must_use]
    pub const fn words(self) -> usize {
        match self {
            Self::Bits64 => 2,
            Self::Bits128 => 4,
        }
    }
}

/// A decoded completion entry, produced by hardware for both the write-ring
/// (receive) and the read-ring (transmit-done) (`spec.md` §6).
///
/// Bit layout, as given by `spec.md` §6:
///
/// ```text
/// 64-bit:  word0: [31..24]=first-user [23..16]=last-user [15..4]=index [3]=cont [2..0]=result
///          word1: [31..24]=dest       [23..0]=size
///
/// 128-bit: word0: [31..24]=first-user [23..16]=last-user [15..8]=id [3]=cont [2..0]=result
///          word1: index
///          word2: size
///          word3: [15..8]=channel     [7..0]=dest
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Device-wide buffer index hardware is reporting on.
    pub index: u32,
    /// Bytes transferred.
    pub size: u32,
    /// Destination the frame arrived on (meaningless for transmit-done).
    pub dest: Dest,
    /// First-user/last-user/continuation flags.
    pub flags: BufferFlags,
    /// Hardware result code.
    pub result: ResultCode,
    /// Buffer-group tag (`spec.md` §3). Only present on the wire in 128-bit
    /// mode; zero for 64-bit completions, which carry no `id` field.
    pub id: u8,
}

impl Completion {
    /// Decodes one ring entry, or returns `None` if every word is zero — the
    /// convention this driver uses for "hardware has not produced a
    /// completion in this slot yet" (`spec.md` §4.3).
    #[must_use]
    pub fn decode(width: DescriptorWidth, words: &[u32]) -> Option<Self> {
        if words.len() < width.words() || words[..width.words()].iter().all(|w| *w == 0) {
            return None;
        }
        match width {
            DescriptorWidth::Bits64 => {
                let w0 = words[0];
                let w1 = words[1];
                let first_user = ((w0 >> 24) & 0xFF) as u8;
                let last_user = ((w0 >> 16) & 0xFF) as u8;
                let index = (w0 >> 4) & 0x0FFF;
                let continuation = (w0 >> 3) & 1 != 0;
                let result = ResultCode::decode((w0 & 0b111) as u8);
                let dest_byte = ((w1 >> 24) & 0xFF) as u8;
                let size = w1 & 0x00FF_FFFF;
                Some(Self {
                    index,
                    size,
                    dest: Dest { lane: dest_byte, channel: 0 },
                    flags: BufferFlags { first_user, last_user, continuation },
                    result,
                    id: 0,
                })
            }
            DescriptorWidth::Bits128 => {
                let w0 = words[0];
                let index = words[1];
                let size = words[2];
                let w3 = words[3];
                let first_user = ((w0 >> 24) & 0xFF) as u8;
                let last_user = ((w0 >> 16) & 0xFF) as u8;
                let id = ((w0 >> 8) & 0xFF) as u8;
                let continuation = (w0 >> 3) & 1 != 0;
                let result = ResultCode::decode((w0 & 0b111) as u8);
                let dest_byte = (w3 & 0xFF) as u8;
                let channel = ((w3 >> 8) & 0xFF) as u8;
                Some(Self {
                    index,
                    size,
                    dest: Dest { lane: dest_byte, channel },
                    flags: BufferFlags { first_user, last_user, continuation },
                    result,
                    id,
                })
            }
        }
    }

    /// All-zero words, the "empty slot" marker a consumed entry is reset to.
    #[must_use]
    pub fn zeroed_slot(width: DescriptorWidth) -> Vec<u32> {
        vec![0; width.words()]
    }
}

/// `true` if `size` indicates the driver should additionally count the
/// completion as a FIFO error on the owning buffer (`spec.md` §7, §8: "a
/// receive completion reporting `size == 0`" sets the FIFO-error bit even if
/// `result == 0`).
#[must_use]
pub const fn is_fifo_error(size: u32) -> bool {
    size == 0
}

/// Packs the fields needed to post one new transmit descriptor through the
/// `read-fifo-{a,b,c,d}` registers (`spec.md` §4.3 point 2, §6).
#[derive(Debug, Clone, Copy)]
pub struct TransmitPost {
    /// Device-wide index of the buffer being transmitted.
    pub index: u32,
    /// DMA address of the buffer; only written to hardware in 128-bit mode
    /// (`spec.md` §6: "high handle bits" are needed once a handle can
    /// exceed 32 bits, which is exactly when 128-bit mode is mandatory).
    pub handle: u64,
    /// Byte length to transmit.
    pub size: u32,
    /// Destination to transmit on.
    pub dest: Dest,
    /// First-user/last-user/continuation flags for this frame.
    pub flags: BufferFlags,
}

impl TransmitPost {
    /// Builds the ordered register-write sequence for this post, as
    /// `(offset, value)` pairs the caller applies in order.
    ///
    /// `spec.md` §6 describes read-fifo A/B as "transmit descriptor post
    /// (64-bit-desc) or low words (128-bit)" and C/D as "transmit
    /// descriptor high words (128-bit)". Read literally: in 64-bit mode the
    /// whole descriptor (index/flags/dest/size, mirroring the 64-bit
    /// completion word layout with the result field left zero) fits in A/B;
    /// in 128-bit mode A/B instead carry the buffer's DMA address — the
    /// thing 128-bit mode exists to transmit — and the same descriptor
    /// shifts down to C/D.
    #[must_use]
    pub fn fifo_writes(self, width: DescriptorWidth) -> Vec<(u64, u32)> {
        use super::regs::offset;

        let descriptor_low = ((self.flags.first_user as u32) << 24)
            | ((self.flags.last_user as u32) << 16)
            | ((self.index & 0x0FFF) << 4)
            | ((self.flags.continuation as u32) << 3);
        let descriptor_high = ((self.dest.lane as u32) << 24) | (self.size & 0x00FF_FFFF);

        match width {
            DescriptorWidth::Bits64 => {
                vec![(offset::READ_FIFO_A, descriptor_low), (offset::READ_FIFO_B, descriptor_high)]
            }
            DescriptorWidth::Bits128 => {
                let lo = (self.handle & 0xFFFF_FFFF) as u32;
                let hi = (self.handle >> 32) as u32;
                vec![
                    (offset::READ_FIFO_A, lo),
                    (offset::READ_FIFO_B, hi),
                    (offset::READ_FIFO_C, descriptor_low),
                    (offset::READ_FIFO_D, descriptor_high),
                ]
            }
        }
    }
}

/// Packs the fields needed to hand hardware one empty receive buffer through
/// `write-fifo-{a,b}` (`spec.md` §4.3 point 1: "the driver writes a free
/// buffer's index (and, in 128-bit mode, the high bits of its handle)").
#[derive(Debug, Clone, Copy)]
pub struct ReceivePost {
    /// Device-wide index of the empty buffer.
    pub index: u32,
    /// DMA address of the buffer; only the high bits are posted, and only
    /// in 128-bit mode — the low bits are resolved by hardware from the
    /// per-index DMA address table (`spec.md` §6, 64-bit-desc mode only; in
    /// 128-bit mode the same table slot is assumed preprogrammed with the
    /// buffer's low address at pool-allocation time, outside this crate's
    /// scope along with the rest of PCI/MMIO setup).
    pub handle: u64,
}

impl ReceivePost {
    /// Builds the ordered register-write sequence for this post.
    #[must_use]
    pub fn fifo_writes(self, width: DescriptorWidth) -> Vec<(u64, u32)> {
        use super::regs::offset;

        let mut writes = vec![(offset::WRITE_FIFO_A, self.index)];
        if width == DescriptorWidth::Bits128 {
            writes.push((offset::WRITE_FIFO_B, (self.handle >> 32) as u32));
        }
        writes
    }
}
