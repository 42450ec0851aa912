//! Pool / ring direction.

/// Direction of a buffer pool or descriptor ring.
///
/// "Write" is hardware-writes-to-host (receive); "read" is host-writes-for-
/// hardware-to-read (transmit), matching the register names in `spec.md` §6
/// rather than a network-style rx/tx pairing, since the card's own register
/// map uses write-ring/read-ring terminology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Hardware writes into host memory (receive path).
    Write,
    /// Hardware reads from host memory (transmit path).
    Read,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Write => Self::Read,
            Self::Read => Self::Write,
        }
    }
}
