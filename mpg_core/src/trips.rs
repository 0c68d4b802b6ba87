//! The set of named trip instances the main loop maintains.
//!
//! Raw and raw-idle buffers live in the capture arena; everything here is owned by
//! the main loop and needs no interrupt masking.

use crate::trip::Trip;

/// Depth of the instant-value window filter.
pub const WINDOW_LEN: usize = 4;
/// Number of fuel-economy-versus-speed buckets.
pub const FE_SPEED_BUCKETS: usize = 15;
/// Total trip instances addressable by the engine's context index.
pub const TRIP_COUNT: usize = 8 + WINDOW_LEN + FE_SPEED_BUCKETS;

/// Element number below `N`; larger values cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot<const N: usize>(u8);

impl<const N: usize> Slot<N> {
    #[must_use]
    pub fn new(i: u8) -> Option<Self> {
        (usize::from(i) < N).then_some(Self(i))
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

pub type WindowSlot = Slot<WINDOW_LEN>;
pub type SpeedBucket = Slot<FE_SPEED_BUCKETS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripId {
    Instant,
    Current,
    Tank,
    IdleInstant,
    IdleCurrent,
    IdleTank,
    /// Fuel-economy-versus-time sampling period.
    Period,
    /// Running sum of the window filter elements.
    WindowSum,
    Window(WindowSlot),
    FeVsSpeed(SpeedBucket),
}

impl TripId {
    /// Trip instances a user can select for display.
    pub const SELECTABLE: [Self; 6] = [
        Self::Instant,
        Self::Current,
        Self::Tank,
        Self::IdleInstant,
        Self::IdleCurrent,
        Self::IdleTank,
    ];

    /// Context index used by the engine.
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Instant => 0,
            Self::Current => 1,
            Self::Tank => 2,
            Self::IdleInstant => 3,
            Self::IdleCurrent => 4,
            Self::IdleTank => 5,
            Self::Period => 6,
            Self::WindowSum => 7,
            Self::Window(i) => 8 + i.0,
            Self::FeVsSpeed(i) => 8 + WINDOW_LEN as u8 + i.0,
        }
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_index(i: u8) -> Option<Self> {
        const W: u8 = WINDOW_LEN as u8;
        const B: u8 = FE_SPEED_BUCKETS as u8;
        Some(match i {
            0 => Self::Instant,
            1 => Self::Current,
            2 => Self::Tank,
            3 => Self::IdleInstant,
            4 => Self::IdleCurrent,
            5 => Self::IdleTank,
            6 => Self::Period,
            7 => Self::WindowSum,
            _ if i < 8 + W => Self::Window(Slot(i - 8)),
            _ if i < 8 + W + B => Self::FeVsSpeed(Slot(i - 8 - W)),
            _ => return None,
        })
    }

    /// Parse a user-facing trip name (`instant`, `current`, `tank`, `idle-*`).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::SELECTABLE
            .into_iter()
            .find(|t| t.to_string().eq_ignore_ascii_case(name))
    }
}

impl core::fmt::Display for TripId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Instant => f.write_str("instant"),
            Self::Current => f.write_str("current"),
            Self::Tank => f.write_str("tank"),
            Self::IdleInstant => f.write_str("idle-instant"),
            Self::IdleCurrent => f.write_str("idle-current"),
            Self::IdleTank => f.write_str("idle-tank"),
            Self::Period => f.write_str("period"),
            Self::WindowSum => f.write_str("window-sum"),
            Self::Window(i) => write!(f, "window-{}", i.0),
            Self::FeVsSpeed(i) => write!(f, "fe-speed-{}", i.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TripStore {
    trips: [Trip; TRIP_COUNT],
    window_count: usize,
    window_next: usize,
}

impl Default for TripStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TripStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            trips: [Trip::ZERO; TRIP_COUNT],
            window_count: 0,
            window_next: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: TripId) -> &Trip {
        &self.trips[usize::from(id.index())]
    }

    #[inline]
    pub fn get_mut(&mut self, id: TripId) -> &mut Trip {
        &mut self.trips[usize::from(id.index())]
    }

    /// Lookup by engine context index.
    #[must_use]
    pub fn by_index(&self, i: u8) -> Option<&Trip> {
        self.trips.get(usize::from(i))
    }

    pub fn reset(&mut self, id: TripId) {
        self.get_mut(id).reset();
    }

    pub fn transfer(&mut self, dst: TripId, src: TripId) {
        let s = *self.get(src);
        self.get_mut(dst).transfer(&s);
    }

    pub fn update(&mut self, dst: TripId, src: TripId) {
        let s = *self.get(src);
        self.get_mut(dst).update(&s);
    }

    /// Clear the window filter (sum, elements, fill state).
    pub fn reset_window(&mut self) {
        self.reset(TripId::WindowSum);
        for i in 0..WINDOW_LEN {
            #[allow(clippy::cast_possible_truncation)]
            self.reset(TripId::Window(Slot(i as u8)));
        }
        self.window_count = 0;
        self.window_next = 0;
    }

    /// Fold the current instant trip into the window and replace it with the window sum.
    ///
    /// An instant trip with no injector open time (engine off or coasting) restarts the
    /// filter so stale samples do not bleed into the next acceleration.
    pub fn apply_window_filter(&mut self) {
        if self.get(TripId::Instant).injector_open_cycles == 0 {
            self.reset_window();
            return;
        }
        #[allow(clippy::cast_possible_truncation)]
        let slot = TripId::Window(Slot(self.window_next as u8));
        if self.window_count < WINDOW_LEN {
            self.window_count += 1;
        } else {
            let oldest = *self.get(slot);
            self.get_mut(TripId::WindowSum).subtract(&oldest);
        }
        self.update(TripId::WindowSum, TripId::Instant);
        self.transfer(slot, TripId::Instant);
        self.transfer(TripId::Instant, TripId::WindowSum);
        self.window_next = (self.window_next + 1) % WINDOW_LEN;
    }

    /// Number of samples currently held by the window filter.
    #[must_use]
    pub const fn window_fill(&self) -> usize {
        self.window_count
    }
}
