//! Chipset timing model
//!
//! Single-wire LED chipsets are described by three phases per bit:
//!
//! ```text
//!        t1      t2       t3
//!     +------+ - - - +
//!     |      |       |          |
//! ----+      +-------+----------+----
//!      always  bit 1   always low
//!      high    only
//! ```
//!
//! A zero bit is high for `t1` and low for `t2 + t3`, a one bit is high for
//! `t1 + t2` and low for `t3`. The receive side classifies pulses against the
//! four duration bands derived here.

/// Default window used to bridge DMA-induced gaps between captured words.
pub const DEFAULT_GAP_TOLERANCE_NS: u32 = 150;

/// Nominal transmit timing of a chipset family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipsetTiming3Phase {
    /// Always-high lead, in nanoseconds
    pub t1_ns: u32,
    /// Bit-dependent high extension, in nanoseconds
    pub t2_ns: u32,
    /// Always-low tail, in nanoseconds
    pub t3_ns: u32,
    /// Minimum latch (reset) low period, in microseconds
    pub reset_us: u32,
    /// Chipset family name
    pub name: &'static str,
}

impl ChipsetTiming3Phase {
    pub const WS2812: Self = Self::new("WS2812", 250, 625, 375, 280);
    pub const WS2812B: Self = Self::new("WS2812B", 400, 450, 400, 280);
    pub const WS2811: Self = Self::new("WS2811", 320, 320, 640, 280);
    pub const WS2813: Self = Self::new("WS2813", 320, 320, 640, 300);
    pub const SK6812: Self = Self::new("SK6812", 300, 600, 300, 80);
    pub const TM1814: Self = Self::new("TM1814", 360, 600, 340, 200);
    pub const UCS1903: Self = Self::new("UCS1903", 500, 1500, 500, 24);

    /// Create a timing from its three phases and reset period.
    ///
    /// A zero bit sends high for `t1`, a one bit for `t1 + t2`; both bits
    /// last `t1 + t2 + t3`.
    pub const fn new(name: &'static str, t1_ns: u32, t2_ns: u32, t3_ns: u32, reset_us: u32) -> Self {
        Self {
            t1_ns,
            t2_ns,
            t3_ns,
            reset_us,
            name,
        }
    }

    /// High time of a zero bit
    pub const fn bit0_high_ns(&self) -> u32 {
        self.t1_ns
    }

    /// Low time of a zero bit
    pub const fn bit0_low_ns(&self) -> u32 {
        self.t2_ns + self.t3_ns
    }

    /// High time of a one bit
    pub const fn bit1_high_ns(&self) -> u32 {
        self.t1_ns + self.t2_ns
    }

    /// Low time of a one bit
    pub const fn bit1_low_ns(&self) -> u32 {
        self.t3_ns
    }

    /// Duration of a single bit on the wire
    pub const fn period_ns(&self) -> u32 {
        self.t1_ns + self.t2_ns + self.t3_ns
    }

    /// Reset period in nanoseconds
    pub const fn reset_ns(&self) -> u32 {
        self.reset_us.saturating_mul(1000)
    }

    /// Largest tolerance that keeps the derived bands apart.
    ///
    /// The high bands differ by `t2`, and so do the low bands, so any
    /// tolerance strictly below `t2 / 2` keeps them disjoint.
    pub const fn max_tolerance_ns(&self) -> u32 {
        self.t2_ns.saturating_sub(1) / 2
    }
}

/// Receive-side classification thresholds.
///
/// All bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipsetTiming4Phase {
    pub t0h_min_ns: u32,
    pub t0h_max_ns: u32,
    pub t0l_min_ns: u32,
    pub t0l_max_ns: u32,
    pub t1h_min_ns: u32,
    pub t1h_max_ns: u32,
    pub t1l_min_ns: u32,
    pub t1l_max_ns: u32,
    pub reset_min_us: u32,
    pub gap_tolerance_ns: u32,
}

impl ChipsetTiming4Phase {
    /// Derive decode thresholds using [`DEFAULT_GAP_TOLERANCE_NS`].
    pub const fn from_3phase(timing: &ChipsetTiming3Phase, tolerance_ns: u32) -> Self {
        Self::from_3phase_with_gap(timing, tolerance_ns, DEFAULT_GAP_TOLERANCE_NS)
    }

    /// Derive decode thresholds.
    ///
    /// The caller must keep `tolerance_ns` below
    /// [`ChipsetTiming3Phase::max_tolerance_ns`]; overlapping bands are not
    /// rejected here and make classification ambiguous.
    pub const fn from_3phase_with_gap(
        timing: &ChipsetTiming3Phase,
        tolerance_ns: u32,
        gap_tolerance_ns: u32,
    ) -> Self {
        let (t0h_min_ns, t0h_max_ns) = band(timing.bit0_high_ns(), tolerance_ns);
        let (t0l_min_ns, t0l_max_ns) = band(timing.bit0_low_ns(), tolerance_ns);
        let (t1h_min_ns, t1h_max_ns) = band(timing.bit1_high_ns(), tolerance_ns);
        let (t1l_min_ns, t1l_max_ns) = band(timing.bit1_low_ns(), tolerance_ns);

        Self {
            t0h_min_ns,
            t0h_max_ns,
            t0l_min_ns,
            t0l_max_ns,
            t1h_min_ns,
            t1h_max_ns,
            t1l_min_ns,
            t1l_max_ns,
            reset_min_us: timing.reset_us,
            gap_tolerance_ns,
        }
    }

    /// Minimum low duration that ends a frame
    pub const fn reset_min_ns(&self) -> u32 {
        self.reset_min_us.saturating_mul(1000)
    }

    /// Whether `ns` falls in the zero bit high band, bounds included.
    pub const fn is_bit0_high(&self, ns: u32) -> bool {
        ns >= self.t0h_min_ns && ns <= self.t0h_max_ns
    }

    /// Zero bit low band
    pub const fn is_bit0_low(&self, ns: u32) -> bool {
        ns >= self.t0l_min_ns && ns <= self.t0l_max_ns
    }

    /// One bit high band
    pub const fn is_bit1_high(&self, ns: u32) -> bool {
        ns >= self.t1h_min_ns && ns <= self.t1h_max_ns
    }

    /// One bit low band
    pub const fn is_bit1_low(&self, ns: u32) -> bool {
        ns >= self.t1l_min_ns && ns <= self.t1l_max_ns
    }

    /// Check the precondition callers are responsible for.
    ///
    /// Bands that merely touch (share a bound) are tolerated because the
    /// paired band on the other half still disambiguates the bit.
    pub const fn bands_overlap(&self) -> bool {
        strictly_overlaps(self.t0h_min_ns, self.t0h_max_ns, self.t1h_min_ns, self.t1h_max_ns)
            || strictly_overlaps(self.t0l_min_ns, self.t0l_max_ns, self.t1l_min_ns, self.t1l_max_ns)
    }
}

/// Derive decode thresholds from nominal timing.
///
/// Pure and deterministic: identical inputs always yield identical
/// thresholds. The gap tolerance is [`DEFAULT_GAP_TOLERANCE_NS`].
pub const fn derive_4phase(timing: &ChipsetTiming3Phase, tolerance_ns: u32) -> ChipsetTiming4Phase {
    ChipsetTiming4Phase::from_3phase(timing, tolerance_ns)
}

/// Same as [`derive_4phase`] with an explicit gap tolerance.
pub const fn derive_4phase_with_gap(
    timing: &ChipsetTiming3Phase,
    tolerance_ns: u32,
    gap_tolerance_ns: u32,
) -> ChipsetTiming4Phase {
    ChipsetTiming4Phase::from_3phase_with_gap(timing, tolerance_ns, gap_tolerance_ns)
}

const fn band(nominal: u32, tolerance: u32) -> (u32, u32) {
    (nominal.saturating_sub(tolerance), nominal.saturating_add(tolerance))
}

const fn strictly_overlaps(a_min: u32, a_max: u32, b_min: u32, b_max: u32) -> bool {
    a_min < b_max && b_min < a_max
}
