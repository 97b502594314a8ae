//! Visibility masks: per-channel bitsets restricting who may see what.

use std::fmt;
use std::ops::BitOr;

/// A visibility bitset.
///
/// Bit 0 is the universal baseline channel: an entity whose effective
/// mask contains it is visible to every viewer. Entities with no
/// explicit mask anywhere on their ancestor chain default to exactly
/// this baseline.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VisMask(u64);

impl VisMask {
    /// The empty mask (visible to nobody; only meaningful mid-composition).
    pub const NONE: Self = Self(0);

    /// The universal baseline bit: visible to all viewers.
    pub const ALWAYS: Self = Self(1);

    /// Creates a mask from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Creates a mask with the single channel `bit` set.
    ///
    /// Bits saturate at 63.
    #[must_use]
    pub const fn channel(bit: u8) -> Self {
        Self(1 << (bit as u64 & 63))
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns `true` if no bits are set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the baseline bit is set.
    #[must_use]
    pub const fn has_baseline(self) -> bool {
        self.0 & Self::ALWAYS.0 != 0
    }

    /// Decides whether an entity with this effective mask is visible to
    /// a viewer subscribed to `channels`.
    ///
    /// The baseline bit grants visibility on every channel: viewers
    /// cannot unsubscribe from it.
    #[must_use]
    pub const fn visible_to(self, channels: Self) -> bool {
        self.0 & (channels.0 | Self::ALWAYS.0) != 0
    }
}

impl BitOr for VisMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for VisMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VisMask({:#b})", self.0)
    }
}
