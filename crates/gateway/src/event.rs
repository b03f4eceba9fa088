//! The canonical event model, replacing the source system's duck-typed
//! "event is a dict" with the tagged record type named in spec.md's
//! DESIGN NOTES.

use shared::TimeSpec;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Confirmed,
    Cancelled,
    Tentative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transparency {
    Opaque,
    Transparent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    NeedsAction,
    Declined,
    Tentative,
    Accepted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attendee {
    pub email: String,
    pub is_self: bool,
    pub response_status: ResponseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    pub email: Option<String>,
    pub is_self: bool,
}

/// A remote calendar event, independent of the wire shape used to fetch it.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub status: EventStatus,
    pub start: TimeSpec,
    pub end: TimeSpec,
    pub all_day: bool,
    pub recurrence: Vec<String>,
    pub recurring_event_id: Option<String>,
    pub original_start_time: Option<TimeSpec>,
    pub transparency: Transparency,
    pub extended_private: HashMap<String, String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<Attendee>,
    pub organizer: Option<Identity>,
    pub creator: Option<Identity>,
    pub guests_can_modify: bool,
    pub color_id: Option<String>,
}

impl Event {
    pub fn is_recurring(&self) -> bool {
        !self.recurrence.is_empty() || self.recurring_event_id.is_some()
    }

    /// Whether this event was declined by the calendar owner.
    pub fn is_declined_by_self(&self) -> bool {
        self.attendees
            .iter()
            .any(|a| a.is_self && a.response_status == ResponseStatus::Declined)
    }
}

/// Payload for creating/updating/patching an event on a remote calendar.
/// Distinct from [`Event`] because outbound writes never carry attendees,
/// organizer/creator identity, or status -- those are origin-only fields.
#[derive(Debug, Clone, Default)]
pub struct EventWrite {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<TimeSpec>,
    pub end: Option<TimeSpec>,
    pub transparency: Option<Transparency>,
    pub visibility_private: bool,
    pub recurrence: Vec<String>,
    pub color_id: Option<String>,
}
