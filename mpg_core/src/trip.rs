//! Accumulator ("trip"): the raw pulse and cycle counters of one measurement scope.

/// Bytes in one persisted trip image: timestamp, eight counter words, signature.
pub const TRIP_IMAGE_LEN: usize = 4 + 8 * 4 + 1;
/// Trailing byte marking a valid persisted trip.
pub const TRIP_SIGNATURE: u8 = 0xB7;

/// Raw counter selector used by the `LdTripVar` opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TripVar {
    VssPulses = 0,
    InjectorPulses = 1,
    VssCycles = 2,
    InjectorCycles = 3,
    InjectorOpenCycles = 4,
}

impl TripVar {
    pub const ALL: [Self; 5] = [
        Self::VssPulses,
        Self::InjectorPulses,
        Self::VssCycles,
        Self::InjectorCycles,
        Self::InjectorOpenCycles,
    ];

    /// Cycle totals are double-width; pulse counts are single-width.
    #[must_use]
    pub const fn is_wide(self) -> bool {
        matches!(
            self,
            Self::VssCycles | Self::InjectorCycles | Self::InjectorOpenCycles
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::VssPulses => "vss_pulses",
            Self::InjectorPulses => "injector_pulses",
            Self::VssCycles => "vss_cycles",
            Self::InjectorCycles => "injector_cycles",
            Self::InjectorOpenCycles => "injector_open_cycles",
        }
    }
}

impl TryFrom<u8> for TripVar {
    type Error = u8;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(usize::from(v)).copied().ok_or(v)
    }
}

impl core::fmt::Display for TripVar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Trip {
    pub vss_pulses: u32,
    pub injector_pulses: u32,
    pub vss_cycles: u64,
    pub injector_cycles: u64,
    pub injector_open_cycles: u64,
}

impl Trip {
    pub const ZERO: Self = Self {
        vss_pulses: 0,
        injector_pulses: 0,
        vss_cycles: 0,
        injector_cycles: 0,
        injector_open_cycles: 0,
    };

    pub fn reset(&mut self) {
        *self = Self::ZERO;
    }

    /// Overwrite with `src`.
    pub fn transfer(&mut self, src: &Self) {
        *self = *src;
    }

    /// Add `src` into `self`. Counters wrap rather than trap.
    pub fn update(&mut self, src: &Self) {
        self.vss_pulses = self.vss_pulses.wrapping_add(src.vss_pulses);
        self.injector_pulses = self.injector_pulses.wrapping_add(src.injector_pulses);
        self.vss_cycles = self.vss_cycles.wrapping_add(src.vss_cycles);
        self.injector_cycles = self.injector_cycles.wrapping_add(src.injector_cycles);
        self.injector_open_cycles = self
            .injector_open_cycles
            .wrapping_add(src.injector_open_cycles);
    }

    /// Remove `src` from `self` (window filter eviction).
    pub fn subtract(&mut self, src: &Self) {
        self.vss_pulses = self.vss_pulses.wrapping_sub(src.vss_pulses);
        self.injector_pulses = self.injector_pulses.wrapping_sub(src.injector_pulses);
        self.vss_cycles = self.vss_cycles.wrapping_sub(src.vss_cycles);
        self.injector_cycles = self.injector_cycles.wrapping_sub(src.injector_cycles);
        self.injector_open_cycles = self
            .injector_open_cycles
            .wrapping_sub(src.injector_open_cycles);
    }

    /// Credit one road-speed pulse and the cycles since the previous one.
    #[inline]
    pub fn credit_vss(&mut self, cycles: u32) {
        self.vss_pulses = self.vss_pulses.wrapping_add(1);
        self.vss_cycles = self.vss_cycles.wrapping_add(u64::from(cycles));
    }

    /// Credit one injector event. A zero `open` (rejected duration) still credits
    /// the engine-cycle length but not the pulse or open time.
    #[inline]
    pub fn credit_injector(&mut self, open: u32, total: u32) {
        if open > 0 {
            self.injector_pulses = self.injector_pulses.wrapping_add(1);
            self.injector_open_cycles = self.injector_open_cycles.wrapping_add(u64::from(open));
        }
        self.injector_cycles = self.injector_cycles.wrapping_add(u64::from(total));
    }

    #[must_use]
    pub fn get(&self, var: TripVar) -> u64 {
        match var {
            TripVar::VssPulses => u64::from(self.vss_pulses),
            TripVar::InjectorPulses => u64::from(self.injector_pulses),
            TripVar::VssCycles => self.vss_cycles,
            TripVar::InjectorCycles => self.injector_cycles,
            TripVar::InjectorOpenCycles => self.injector_open_cycles,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::ZERO
    }

    /// The eight 32-bit words of the persisted form (wide counters split low, high).
    #[allow(clippy::cast_possible_truncation)]
    fn words(&self) -> [u32; 8] {
        let split = |v: u64| [v as u32, (v >> 32) as u32];
        let [vl, vh] = split(self.vss_cycles);
        let [il, ih] = split(self.injector_cycles);
        let [ol, oh] = split(self.injector_open_cycles);
        [self.vss_pulses, self.injector_pulses, vl, vh, il, ih, ol, oh]
    }

    fn from_words(w: [u32; 8]) -> Self {
        let join = |lo: u32, hi: u32| u64::from(lo) | (u64::from(hi) << 32);
        Self {
            vss_pulses: w[0],
            injector_pulses: w[1],
            vss_cycles: join(w[2], w[3]),
            injector_cycles: join(w[4], w[5]),
            injector_open_cycles: join(w[6], w[7]),
        }
    }

    /// Serialize as big-endian timestamp, counter words, then the signature byte.
    #[must_use]
    pub fn encode(&self, timestamp: u32) -> [u8; TRIP_IMAGE_LEN] {
        let mut out = [0u8; TRIP_IMAGE_LEN];
        out[..4].copy_from_slice(&timestamp.to_be_bytes());
        for (i, w) in self.words().iter().enumerate() {
            let at = 4 + i * 4;
            out[at..at + 4].copy_from_slice(&w.to_be_bytes());
        }
        out[TRIP_IMAGE_LEN - 1] = TRIP_SIGNATURE;
        out
    }

    /// Inverse of [`Trip::encode`]. `None` when the signature byte is wrong.
    #[must_use]
    pub fn decode(image: &[u8; TRIP_IMAGE_LEN]) -> Option<(u32, Self)> {
        if image[TRIP_IMAGE_LEN - 1] != TRIP_SIGNATURE {
            return None;
        }
        let word = |at: usize| {
            u32::from_be_bytes([image[at], image[at + 1], image[at + 2], image[at + 3]])
        };
        let mut w = [0u32; 8];
        for (i, slot) in w.iter_mut().enumerate() {
            *slot = word(4 + i * 4);
        }
        Some((word(0), Self::from_words(w)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Trip {
        Trip {
            vss_pulses: 5008,
            injector_pulses: 1234,
            vss_cycles: 0x1_2345_6789,
            injector_cycles: 42,
            injector_open_cycles: u64::MAX - 1,
        }
    }

    #[test]
    fn reset_twice_equals_reset_once() {
        let mut a = sample();
        a.reset();
        let once = a;
        a.reset();
        assert_eq!(a, once);
        assert!(a.is_empty());
    }

    #[test]
    fn update_then_subtract_restores() {
        let mut a = sample();
        let b = Trip {
            vss_pulses: 7,
            injector_pulses: 3,
            vss_cycles: 700,
            injector_cycles: 9000,
            injector_open_cycles: 5,
        };
        a.update(&b);
        assert_eq!(a.vss_pulses, 5015);
        a.subtract(&b);
        assert_eq!(a, sample());
    }

    #[test]
    fn rejected_injector_credits_only_cycle_length() {
        let mut t = Trip::default();
        t.credit_injector(0, 1000);
        assert_eq!(t.injector_pulses, 0);
        assert_eq!(t.injector_open_cycles, 0);
        assert_eq!(t.injector_cycles, 1000);
    }

    #[test]
    fn image_round_trip_preserves_wide_counters() {
        let t = sample();
        let img = t.encode(86_400);
        assert_eq!(img[TRIP_IMAGE_LEN - 1], TRIP_SIGNATURE);
        // vss_pulses is the first counter word, big-endian
        assert_eq!(&img[4..8], &5008u32.to_be_bytes());
        assert_eq!(Trip::decode(&img), Some((86_400, t)));
    }

    #[test]
    fn bad_signature_fails_closed() {
        let mut img = sample().encode(1);
        img[TRIP_IMAGE_LEN - 1] = 0xFF;
        assert_eq!(Trip::decode(&img), None);
    }

    #[test]
    fn trip_var_index_round_trip() {
        for v in TripVar::ALL {
            assert_eq!(TripVar::try_from(v as u8), Ok(v));
        }
        assert_eq!(TripVar::try_from(5), Err(5));
        assert!(TripVar::InjectorOpenCycles.is_wide());
        assert!(!TripVar::VssPulses.is_wide());
    }
}
