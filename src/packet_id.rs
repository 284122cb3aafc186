use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};

/// Sequence number of a packet within one sender's stream. The raw value is 32 bits wide and
///  wraps around, so 'earlier / later on the wire' is decided by [`PacketId::offset_from`]
///  rather than by comparing raw values.
///
/// NB: The derived `Ord` is plain numeric order. It exists so ids can key a `BTreeMap`; the
///  buffer code relies on numeric order plus explicit wraparound handling at the places where
///  the circular structure shows through.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct PacketId(u32);

impl Display for PacketId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PacketId {
    pub const ZERO: PacketId = PacketId(0);

    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    pub fn to_raw(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> PacketId {
        PacketId(self.0.wrapping_add(1))
    }

    pub fn prev(&self) -> PacketId {
        PacketId(self.0.wrapping_sub(1))
    }

    /// The number of increments that lead from `other` to `self` on the circular number line.
    pub fn offset_from(&self, other: PacketId) -> u32 {
        self.0.wrapping_sub(other.0)
    }
}

impl Add<u32> for PacketId {
    type Output = PacketId;

    fn add(self, rhs: u32) -> PacketId {
        PacketId(self.0.wrapping_add(rhs))
    }
}

impl Sub<u32> for PacketId {
    type Output = PacketId;

    fn sub(self, rhs: u32) -> PacketId {
        PacketId(self.0.wrapping_sub(rhs))
    }
}
