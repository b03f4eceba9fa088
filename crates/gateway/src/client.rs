use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GatewayError, GatewayResult, ListOutcome};
use crate::event::{Attendee, Event, EventStatus, EventWrite, Identity, ResponseStatus, Transparency};
use crate::timefmt::{from_wire, to_wire, WireTime};

pub const SYNC_TAG_KEY: &str = "app_managed_event";

/// True iff `e` carries the private-property tag this crate stamps on every
/// event it creates or updates (spec.md 4.1's `is_our_event` predicate).
pub fn is_our_event(e: &Event) -> bool {
    e.extended_private
        .get(SYNC_TAG_KEY)
        .map(|v| v == "true")
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct EventPage {
    pub events: Vec<Event>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub expires_in_secs: i64,
}

/// A narrow interface to one authenticated remote calendar account.
///
/// Implementations must honor the error classification in spec.md 4.1:
/// `Gone` on list surfaces as [`ListOutcome::TokenExpired`], `NotFound`/`Gone`
/// on delete is treated as success, and every other non-2xx or transport
/// failure propagates as a [`GatewayError`].
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait CalendarGateway: Send + Sync {
    async fn list_events(
        &self,
        calendar_id: &str,
        sync_token: Option<&str>,
    ) -> GatewayResult<ListOutcome<EventPage>>;

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> GatewayResult<Option<Event>>;

    async fn search_events(&self, calendar_id: &str, query: &str) -> GatewayResult<Vec<Event>>;

    async fn create_event(&self, calendar_id: &str, write: &EventWrite) -> GatewayResult<Event>;

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        write: &EventWrite,
    ) -> GatewayResult<Event>;

    async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        write: &EventWrite,
    ) -> GatewayResult<Event>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> GatewayResult<()>;
}

/// reqwest-backed [`CalendarGateway`] for one access-token-bearing account.
pub struct HttpCalendarGateway {
    client: Client,
    base_url: String,
    access_token: String,
}

impl HttpCalendarGateway {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            base_url: base_url.into(),
            access_token: access_token.into(),
        }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!("{}/calendars/{calendar_id}/events", self.base_url)
    }

    async fn classify_error(resp: reqwest::Response) -> GatewayError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        match status {
            StatusCode::FORBIDDEN => GatewayError::PermissionDenied(body),
            StatusCode::NOT_FOUND => GatewayError::NotFound(body),
            StatusCode::TOO_MANY_REQUESTS => {
                GatewayError::RateLimited { retry_after_secs: None }
            }
            s if s.is_server_error() => GatewayError::Unavailable(format!("{status}: {body}")),
            _ => GatewayError::UnexpectedResponse(format!("{status}: {body}")),
        }
    }

    fn build_write_payload(write: &EventWrite) -> WireEventWrite {
        let mut extended_private = HashMap::new();
        extended_private.insert(SYNC_TAG_KEY.to_string(), "true".to_string());
        WireEventWrite {
            summary: write.summary.clone(),
            description: write.description.clone(),
            location: write.location.clone(),
            start: write.start.as_ref().map(to_wire),
            end: write.end.as_ref().map(to_wire),
            transparency: write.transparency.map(|t| match t {
                Transparency::Opaque => "opaque".to_string(),
                Transparency::Transparent => "transparent".to_string(),
            }),
            visibility: if write.visibility_private {
                Some("private".to_string())
            } else {
                None
            },
            recurrence: write.recurrence.clone(),
            color_id: write.color_id.clone(),
            extended_properties: WireExtendedProperties { private: extended_private },
        }
    }
}

#[async_trait]
impl CalendarGateway for HttpCalendarGateway {
    async fn list_events(
        &self,
        calendar_id: &str,
        sync_token: Option<&str>,
    ) -> GatewayResult<ListOutcome<EventPage>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        let mut next_sync_token = None;

        loop {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(token) = sync_token {
                query.push(("syncToken", token.to_string()));
            } else {
                query.push(("timeMin", (chrono::Utc::now() - chrono::Duration::days(30)).to_rfc3339()));
                query.push(("timeMax", (chrono::Utc::now() + chrono::Duration::days(365)).to_rfc3339()));
            }
            if let Some(pt) = &page_token {
                query.push(("pageToken", pt.clone()));
            }

            let resp = self
                .client
                .get(self.events_url(calendar_id))
                .bearer_auth(&self.access_token)
                .query(&query)
                .send()
                .await?;

            if resp.status() == StatusCode::GONE {
                return Ok(ListOutcome::TokenExpired);
            }
            if !resp.status().is_success() {
                return Err(Self::classify_error(resp).await);
            }

            let page: WireEventPage = resp
                .json()
                .await
                .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;

            for item in page.items {
                match wire_to_event(item) {
                    Ok(e) => events.push(e),
                    Err(e) => warn!(error = %e, "skipping unparseable event in list page"),
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                next_sync_token = page.next_sync_token;
                break;
            }
        }

        Ok(ListOutcome::Ok(EventPage { events, next_sync_token }))
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> GatewayResult<Option<Event>> {
        let resp = self
            .client
            .get(format!("{}/{event_id}", self.events_url(calendar_id)))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND || resp.status() == StatusCode::GONE {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        let wire: WireEvent = resp
            .json()
            .await
            .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;
        Ok(Some(wire_to_event(wire)?))
    }

    async fn search_events(&self, calendar_id: &str, query: &str) -> GatewayResult<Vec<Event>> {
        let resp = self
            .client
            .get(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .query(&[("q", query)])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        let page: WireEventPage = resp
            .json()
            .await
            .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;
        page.items.into_iter().map(wire_to_event).collect()
    }

    async fn create_event(&self, calendar_id: &str, write: &EventWrite) -> GatewayResult<Event> {
        let payload = Self::build_write_payload(write);
        let resp = self
            .client
            .post(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        let wire: WireEvent = resp
            .json()
            .await
            .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;
        wire_to_event(wire)
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        write: &EventWrite,
    ) -> GatewayResult<Event> {
        // Full replacement: the sync tag is re-applied on every call via
        // build_write_payload, matching spec.md 4.1's re-stamp requirement.
        let payload = Self::build_write_payload(write);
        let resp = self
            .client
            .put(format!("{}/{event_id}", self.events_url(calendar_id)))
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        let wire: WireEvent = resp
            .json()
            .await
            .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;
        wire_to_event(wire)
    }

    async fn patch_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        write: &EventWrite,
    ) -> GatewayResult<Event> {
        let payload = Self::build_write_payload(write);
        let resp = self
            .client
            .patch(format!("{}/{event_id}", self.events_url(calendar_id)))
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        let wire: WireEvent = resp
            .json()
            .await
            .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;
        wire_to_event(wire)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> GatewayResult<()> {
        let resp = self
            .client
            .delete(format!("{}/{event_id}", self.events_url(calendar_id)))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        // 404/410 on delete is the desired post-condition, not a failure.
        if resp.status() == StatusCode::NOT_FOUND || resp.status() == StatusCode::GONE {
            return Ok(());
        }
        if !resp.status().is_success() {
            return Err(Self::classify_error(resp).await);
        }
        Ok(())
    }
}

/// Exchanges a refresh token for a fresh access token. `invalid_grant` is
/// permanent and surfaces as [`GatewayError::TokenRevoked`]; every other
/// failure is transient and left for the caller's retry/backoff schedule.
pub async fn refresh_access_token(
    client: &Client,
    token_endpoint: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> GatewayResult<TokenPair> {
    let resp = client
        .post(token_endpoint)
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
        ])
        .send()
        .await?;

    if !resp.status().is_success() {
        let body = resp.text().await.unwrap_or_default();
        if body.contains("invalid_grant") {
            return Err(GatewayError::TokenRevoked);
        }
        return Err(GatewayError::Unavailable(body));
    }

    let body: TokenRefreshResponse = resp
        .json()
        .await
        .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;
    Ok(TokenPair {
        access_token: body.access_token,
        expires_in_secs: body.expires_in,
    })
}

#[derive(Debug, Deserialize)]
struct TokenRefreshResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Serialize)]
struct WireEventWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<WireTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<WireTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transparency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    visibility: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recurrence: Vec<String>,
    #[serde(rename = "colorId", skip_serializing_if = "Option::is_none")]
    color_id: Option<String>,
    #[serde(rename = "extendedProperties")]
    extended_properties: WireExtendedProperties,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct WireExtendedProperties {
    #[serde(default)]
    private: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct WireEventPage {
    items: Vec<WireEvent>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "nextSyncToken")]
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: String,
    status: String,
    start: WireTime,
    end: WireTime,
    #[serde(default)]
    recurrence: Vec<String>,
    #[serde(rename = "recurringEventId")]
    recurring_event_id: Option<String>,
    #[serde(rename = "originalStartTime")]
    original_start_time: Option<WireTime>,
    #[serde(default)]
    transparency: Option<String>,
    #[serde(rename = "extendedProperties", default)]
    extended_properties: WireExtendedProperties,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    attendees: Vec<WireAttendee>,
    organizer: Option<WireIdentity>,
    creator: Option<WireIdentity>,
    #[serde(rename = "guestsCanModify", default)]
    guests_can_modify: bool,
    #[serde(rename = "colorId")]
    color_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireAttendee {
    email: String,
    #[serde(rename = "self", default)]
    is_self: bool,
    #[serde(rename = "responseStatus", default)]
    response_status: String,
}

#[derive(Debug, Deserialize)]
struct WireIdentity {
    email: Option<String>,
    #[serde(rename = "self", default)]
    is_self: bool,
}

fn wire_to_event(wire: WireEvent) -> GatewayResult<Event> {
    let status = match wire.status.as_str() {
        "cancelled" => EventStatus::Cancelled,
        "tentative" => EventStatus::Tentative,
        _ => EventStatus::Confirmed,
    };
    let transparency = match wire.transparency.as_deref() {
        Some("transparent") => Transparency::Transparent,
        _ => Transparency::Opaque,
    };
    let all_day = wire.start.date.is_some();
    let start = from_wire(&wire.start)?;
    let end = from_wire(&wire.end)?;
    let original_start_time = wire
        .original_start_time
        .as_ref()
        .map(from_wire)
        .transpose()?;

    let attendees = wire
        .attendees
        .into_iter()
        .map(|a| Attendee {
            email: a.email,
            is_self: a.is_self,
            response_status: match a.response_status.as_str() {
                "declined" => ResponseStatus::Declined,
                "tentative" => ResponseStatus::Tentative,
                "accepted" => ResponseStatus::Accepted,
                _ => ResponseStatus::NeedsAction,
            },
        })
        .collect();

    Ok(Event {
        id: wire.id,
        status,
        start,
        end,
        all_day,
        recurrence: wire.recurrence,
        recurring_event_id: wire.recurring_event_id,
        original_start_time,
        transparency,
        extended_private: wire.extended_properties.private,
        summary: wire.summary,
        description: wire.description,
        location: wire.location,
        attendees,
        organizer: wire.organizer.map(|o| Identity {
            email: o.email,
            is_self: o.is_self,
        }),
        creator: wire.creator.map(|c| Identity {
            email: c.email,
            is_self: c.is_self,
        }),
        guests_can_modify: wire.guests_can_modify,
        color_id: wire.color_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn our_event_requires_exact_tag_value() {
        let mut extended_private = HashMap::new();
        extended_private.insert(SYNC_TAG_KEY.to_string(), "true".to_string());
        let event = Event {
            id: "e1".into(),
            status: EventStatus::Confirmed,
            start: shared::TimeSpec::AllDay(chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
            end: shared::TimeSpec::AllDay(chrono::NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()),
            all_day: true,
            recurrence: vec![],
            recurring_event_id: None,
            original_start_time: None,
            transparency: Transparency::Opaque,
            extended_private,
            summary: None,
            description: None,
            location: None,
            attendees: vec![],
            organizer: None,
            creator: None,
            guests_can_modify: false,
            color_id: None,
        };
        assert!(is_our_event(&event));
    }

    #[test]
    fn build_write_payload_always_stamps_tag() {
        let write = EventWrite {
            summary: Some("busy".into()),
            ..Default::default()
        };
        let payload = HttpCalendarGateway::build_write_payload(&write);
        assert_eq!(
            payload.extended_properties.private.get(SYNC_TAG_KEY).map(String::as_str),
            Some("true")
        );
    }
}
