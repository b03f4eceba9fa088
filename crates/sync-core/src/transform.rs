//! Pure event-shape transforms: no I/O, fully deterministic for a given
//! input. The Sync Engine drives these and owns everything that touches the
//! network or the database.

use gateway::{Event, EventWrite, ResponseStatus, Transparency};

use crate::config::SyncConfig;

/// Result of deciding whether a client/main event is worth propagating as a
/// busy block, per 4.3.b.
pub struct EventTransform;

impl EventTransform {
    /// Summary prefixed with the managed-event marker and a bracketed source
    /// label, truncated to 80 chars total for the label portion.
    pub fn managed_summary(config: &SyncConfig, source_label: &str, summary: &str) -> String {
        let label: String = source_label.chars().take(80).collect();
        let summary = summary;
        format!("{} [{}] {}", config.managed_event_marker, label, summary).trim_end().to_string()
    }

    /// True if the organizer/creator identity and `guests_can_modify` imply
    /// the authenticated user may edit this event from the main calendar.
    pub fn derive_user_can_edit(event: &Event) -> bool {
        let is_organizer_self = event.organizer.as_ref().map(|o| o.is_self).unwrap_or(false);
        let is_creator_self = event.creator.as_ref().map(|c| c.is_self).unwrap_or(false);
        is_organizer_self || is_creator_self || event.guests_can_modify
    }

    /// Flattens attendee emails into a description footer; real attendees
    /// are never propagated as first-class attendee data (4.3.a).
    pub fn attendee_footer(event: &Event) -> Option<String> {
        if event.attendees.is_empty() {
            return None;
        }
        let names: Vec<&str> = event
            .attendees
            .iter()
            .map(|a| a.email.as_str())
            .collect();
        Some(format!("Attendees: {}", names.join(", ")))
    }

    fn combined_description(event: &Event) -> Option<String> {
        match (event.description.as_ref(), Self::attendee_footer(event)) {
            (Some(desc), Some(footer)) => Some(format!("{}\n\n{}", desc, footer)),
            (Some(desc), None) => Some(desc.clone()),
            (None, Some(footer)) => Some(footer),
            (None, None) => None,
        }
    }

    /// Builds the full-detail copy written to the main calendar for a
    /// client-origin or personal-origin event.
    pub fn client_to_main(config: &SyncConfig, source_label: &str, event: &Event) -> EventWrite {
        EventWrite {
            summary: Some(Self::managed_summary(config, source_label, event.summary.as_deref().unwrap_or(""))),
            description: Self::combined_description(event),
            location: event.location.clone(),
            start: Some(event.start.clone()),
            end: Some(event.end.clone()),
            transparency: Some(event.transparency),
            visibility_private: true,
            recurrence: event.recurrence.clone(),
            color_id: event.color_id.clone(),
        }
    }

    /// True if a main-calendar event should occupy time on every client
    /// calendar (4.3.b step 2).
    pub fn is_busy_worthy(event: &Event) -> bool {
        if matches!(event.status, gateway::EventStatus::Cancelled) {
            return false;
        }
        if event.is_declined_by_self() {
            return false;
        }
        if event.all_day && matches!(event.transparency, Transparency::Transparent) {
            return false;
        }
        true
    }

    /// The opaque busy-block payload fanned out to client calendars.
    pub fn busy_block_payload(config: &SyncConfig, event: &Event) -> EventWrite {
        EventWrite {
            summary: Some(format!("{} {}", config.managed_event_marker, config.client_busy_block_title)),
            description: None,
            location: None,
            start: Some(event.start.clone()),
            end: Some(event.end.clone()),
            transparency: Some(Transparency::Opaque),
            visibility_private: true,
            recurrence: event.recurrence.clone(),
            color_id: None,
        }
    }

    /// The personal variant of the busy-block payload, with the distinct
    /// title suffix required by 4.3.c.
    pub fn personal_busy_block_payload(config: &SyncConfig, event: &Event) -> EventWrite {
        EventWrite {
            summary: Some(format!("{} {}", config.managed_event_marker, config.personal_busy_block_title)),
            description: None,
            location: None,
            start: Some(event.start.clone()),
            end: Some(event.end.clone()),
            transparency: Some(Transparency::Opaque),
            visibility_private: true,
            recurrence: event.recurrence.clone(),
            color_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gateway::{Attendee, Identity};
    use shared::TimeSpec;

    fn utc_event() -> Event {
        Event {
            id: "evt1".to_string(),
            status: gateway::EventStatus::Confirmed,
            start: TimeSpec::Utc(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()),
            end: TimeSpec::Utc(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()),
            all_day: false,
            recurrence: Vec::new(),
            recurring_event_id: None,
            original_start_time: None,
            transparency: Transparency::Opaque,
            extended_private: Default::default(),
            summary: Some("Planning sync".to_string()),
            description: None,
            location: None,
            attendees: Vec::new(),
            organizer: None,
            creator: None,
            guests_can_modify: false,
            color_id: None,
        }
    }

    #[test]
    fn managed_summary_wraps_label_in_brackets() {
        let config = SyncConfig::default();
        let label = EventTransform::managed_summary(&config, "alice@example.com", "Standup");
        assert_eq!(label, "[Synced] [alice@example.com] Standup");
    }

    #[test]
    fn cancelled_event_is_never_busy_worthy() {
        let mut event = utc_event();
        event.status = gateway::EventStatus::Cancelled;
        assert!(!EventTransform::is_busy_worthy(&event));
    }

    #[test]
    fn self_declined_event_is_not_busy_worthy() {
        let mut event = utc_event();
        event.attendees.push(Attendee {
            email: "me@example.com".to_string(),
            is_self: true,
            response_status: ResponseStatus::Declined,
        });
        assert!(!EventTransform::is_busy_worthy(&event));
    }

    #[test]
    fn transparent_all_day_event_is_not_busy_worthy() {
        let mut event = utc_event();
        event.all_day = true;
        event.transparency = Transparency::Transparent;
        assert!(!EventTransform::is_busy_worthy(&event));
    }

    #[test]
    fn transparent_timed_event_is_still_busy_worthy() {
        let mut event = utc_event();
        event.transparency = Transparency::Transparent;
        assert!(EventTransform::is_busy_worthy(&event));
    }

    #[test]
    fn organizer_self_implies_editable() {
        let mut event = utc_event();
        event.organizer = Some(Identity { email: "me@example.com".to_string(), is_self: true });
        assert!(EventTransform::derive_user_can_edit(&event));
    }

    #[test]
    fn guest_without_organizer_or_modify_rights_cannot_edit() {
        let mut event = utc_event();
        event.organizer = Some(Identity { email: "other@example.com".to_string(), is_self: false });
        assert!(!EventTransform::derive_user_can_edit(&event));
    }

    #[test]
    fn attendees_flatten_to_description_footer_not_first_class_fields() {
        let mut event = utc_event();
        event.attendees.push(Attendee {
            email: "bob@example.com".to_string(),
            is_self: false,
            response_status: ResponseStatus::Accepted,
        });
        let write = EventTransform::client_to_main(&SyncConfig::default(), "me@example.com", &event);
        assert!(write.description.unwrap().contains("bob@example.com"));
    }
}
