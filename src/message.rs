//! Typed messages routed by the module bus.

use crate::app_context::{AcState, DayTime, DisplayFlags};

/// Discriminant used as the subscription key for a message type.
///
/// Modules declare the kinds they want to receive; the bus routes each
/// published message to the subscribers of its kind, in subscription order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Coarse notification that some power-supply property changed.
    PowerChanged,
    /// Request to force a new AC state (also the debounced change path).
    AcRequest,
    /// Authoritative AC state change.
    AcUpdate,
    /// Idle-detection backend reported an idle/active transition.
    IdleChanged,
    /// Display condition bitmask changed.
    DisplayUpdate,
    /// Backlight level changed (fed by the external backlight tracker).
    BacklightUpdate,
    /// Request to change an idle timeout for a given power state.
    TimeoutRequest,
    /// Idle-detection inhibition toggled.
    InhibitUpdate,
    /// Request to change a color temperature for a given day phase.
    TempRequest,
    /// Color temperature was applied.
    TempUpdate,
    /// Day/night phase bookkeeping is (re)available.
    DaytimeUpdate,
    /// Periodic notice carrying updated sunrise/sunset timestamps.
    NextEventUpdate,
    /// Periodic wakeup for the daytime module.
    DaytimeTick,
}

/// Color-temperature change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempRequest {
    pub new: i32,
    pub daytime: DayTime,
    pub smooth: bool,
    pub step: i32,
    pub timeout_ms: u32,
}

impl TempRequest {
    /// Requests outside the displayable Kelvin range are dropped.
    pub fn is_valid(&self) -> bool {
        (1000..=10000).contains(&self.new)
    }
}

/// Color-temperature change that was actually applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempUpdate {
    pub old: i32,
    pub new: i32,
    pub smooth: bool,
    pub step: i32,
    pub timeout_ms: u32,
    pub daytime: DayTime,
}

/// Message payloads, one variant per [`MessageKind`].
#[derive(Debug, Clone)]
pub enum Payload {
    PowerChanged,
    AcRequest { old: AcState, new: AcState },
    AcUpdate { old: AcState, new: AcState },
    IdleChanged { idle: bool },
    DisplayUpdate { old: DisplayFlags, new: DisplayFlags },
    BacklightUpdate { old: f64, new: f64 },
    TimeoutRequest { state: AcState, new_secs: u32 },
    InhibitUpdate { inhibited: bool },
    TempRequest(TempRequest),
    TempUpdate(TempUpdate),
    DaytimeUpdate,
    NextEventUpdate { sunrise: i64, sunset: i64 },
    DaytimeTick,
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::PowerChanged => MessageKind::PowerChanged,
            Payload::AcRequest { .. } => MessageKind::AcRequest,
            Payload::AcUpdate { .. } => MessageKind::AcUpdate,
            Payload::IdleChanged { .. } => MessageKind::IdleChanged,
            Payload::DisplayUpdate { .. } => MessageKind::DisplayUpdate,
            Payload::BacklightUpdate { .. } => MessageKind::BacklightUpdate,
            Payload::TimeoutRequest { .. } => MessageKind::TimeoutRequest,
            Payload::InhibitUpdate { .. } => MessageKind::InhibitUpdate,
            Payload::TempRequest(_) => MessageKind::TempRequest,
            Payload::TempUpdate(_) => MessageKind::TempUpdate,
            Payload::DaytimeUpdate => MessageKind::DaytimeUpdate,
            Payload::NextEventUpdate { .. } => MessageKind::NextEventUpdate,
            Payload::DaytimeTick => MessageKind::DaytimeTick,
        }
    }
}

/// An immutable event routed by the bus.
///
/// `sender` is the name of the publishing module, or `None` for messages
/// originating outside the bus (signal forwarders, the D-Bus interface,
/// timers).
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: Option<&'static str>,
    pub payload: Payload,
}

impl Message {
    /// A message with no originating module.
    pub fn system(payload: Payload) -> Self {
        Self {
            sender: None,
            payload,
        }
    }

    pub fn from_module(sender: &'static str, payload: Payload) -> Self {
        Self {
            sender: Some(sender),
            payload,
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}
