/// One electrical half-pulse: a level held for a duration.
///
/// Capture sources produce these in alternating polarity, high then low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EdgeTime {
    /// Line level during the half-pulse
    pub high: bool,
    pub duration_ns: u32,
}

impl EdgeTime {
    /// Create a new edge with the given level and duration.
    pub const fn new(high: bool, duration_ns: u32) -> Self {
        Self { high, duration_ns }
    }

    /// High half-pulse
    pub const fn high(duration_ns: u32) -> Self {
        Self::new(true, duration_ns)
    }

    /// Low half-pulse
    pub const fn low(duration_ns: u32) -> Self {
        Self::new(false, duration_ns)
    }
}
