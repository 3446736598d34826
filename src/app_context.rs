//! Shared daemon state read by all modules.
//!
//! `AppState` is owned by the coordinator loop and lent mutably to the bus
//! for each dispatch. Every field has exactly one writer: `ac_state` belongs
//! to the upower module, `display_state` to the dimmer, `current_temp` to
//! gamma, the day-event bookkeeping to the daytime module. `current_bl_pct`
//! and `pm_inhibited` are owned by subsystems outside this daemon and are
//! mirrored by the coordinator when their updates arrive.

use std::env;
use std::fmt;

/// Whether the system runs on mains power or battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcState {
    OnAc,
    OnBattery,
    /// Not yet determined (power supply service unreachable at startup).
    Unknown,
}

impl AcState {
    pub fn from_on_battery(on_battery: bool) -> Self {
        if on_battery {
            AcState::OnBattery
        } else {
            AcState::OnAc
        }
    }
}

impl fmt::Display for AcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcState::OnAc => write!(f, "on AC"),
            AcState::OnBattery => write!(f, "on battery"),
            AcState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Day half-cycle the current wall-clock time falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayTime {
    Day,
    Night,
}

impl DayTime {
    pub fn opposite(self) -> Self {
        match self {
            DayTime::Day => DayTime::Night,
            DayTime::Night => DayTime::Day,
        }
    }
}

impl fmt::Display for DayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayTime::Day => write!(f, "day"),
            DayTime::Night => write!(f, "night"),
        }
    }
}

/// A sunrise or sunset boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayEvent {
    Sunrise,
    Sunset,
}

/// Today's day-event timestamps, unix seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayEvents {
    pub sunrise: i64,
    pub sunset: i64,
}

impl DayEvents {
    pub fn get(&self, event: DayEvent) -> i64 {
        match event {
            DayEvent::Sunrise => self.sunrise,
            DayEvent::Sunset => self.sunset,
        }
    }
}

/// Bitmask of display conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayFlags(u32);

impl DisplayFlags {
    /// Backlight is currently reduced due to inactivity.
    pub const DIMMED: DisplayFlags = DisplayFlags(1 << 0);

    pub fn insert(&mut self, flag: DisplayFlags) {
        self.0 |= flag.0;
    }

    pub fn remove(&mut self, flag: DisplayFlags) {
        self.0 &= !flag.0;
    }

    pub fn contains(&self, flag: DisplayFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// Process-wide state shared across modules.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Authoritative AC adapter state.
    pub ac_state: AcState,
    /// Display condition bitmask.
    pub display_state: DisplayFlags,
    /// Last applied backlight fraction in [0, 1].
    pub current_bl_pct: f64,
    /// Last applied color temperature in Kelvin.
    pub current_temp: i32,
    /// Current day half-cycle.
    pub day_time: DayTime,
    /// Whether the current time is inside a sunrise/sunset window.
    pub in_event: bool,
    /// 0 while approaching the next event, event duration once past it.
    pub event_time_range: i64,
    /// The upcoming day event.
    pub next_event: DayEvent,
    /// Today's event timestamps.
    pub day_events: DayEvents,
    /// True while something requests idle-detection suspension.
    pub pm_inhibited: bool,
    /// X display identifier, when a display session exists.
    pub display: Option<String>,
    /// X authority file, when a display session exists.
    pub xauthority: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            ac_state: AcState::Unknown,
            display_state: DisplayFlags::default(),
            current_bl_pct: 1.0,
            current_temp: 6500,
            day_time: DayTime::Day,
            in_event: false,
            event_time_range: 0,
            next_event: DayEvent::Sunrise,
            day_events: DayEvents::default(),
            pm_inhibited: false,
            display: None,
            xauthority: None,
        }
    }
}

impl AppState {
    /// State seeded with the session identity of the calling environment.
    pub fn from_env() -> Self {
        Self {
            display: env::var("DISPLAY").ok().filter(|d| !d.is_empty()),
            xauthority: env::var("XAUTHORITY").ok().filter(|x| !x.is_empty()),
            ..Self::default()
        }
    }

    /// Whether a display session is available for gamma control.
    pub fn has_display_session(&self) -> bool {
        self.display.is_some() && self.xauthority.is_some()
    }
}
