//! Change-Stream Ingestor. Pulls the batch of observed events for one
//! calendar using whatever sync token is on file, re-requesting a full
//! listing when the remote has invalidated that token.

use gateway::{CalendarGateway, Event, GatewayResult, ListOutcome};

/// A batch of events pulled from one calendar, plus the token to persist
/// once the Sync Engine has processed every event in the batch without
/// failure (4.2's deferred-persistence rule).
pub struct IngestBatch {
    pub events: Vec<Event>,
    pub next_sync_token: Option<String>,
    /// True if the stored token had expired and this batch is a full
    /// relisting rather than an incremental diff.
    pub was_full_resync: bool,
}

pub async fn ingest(
    gateway: &dyn CalendarGateway,
    calendar_id: &str,
    stored_token: Option<&str>,
) -> GatewayResult<IngestBatch> {
    match gateway.list_events(calendar_id, stored_token).await? {
        ListOutcome::Ok(page) => Ok(IngestBatch {
            events: page.events,
            next_sync_token: page.next_sync_token,
            was_full_resync: stored_token.is_none(),
        }),
        ListOutcome::TokenExpired => match gateway.list_events(calendar_id, None).await? {
            ListOutcome::Ok(page) => Ok(IngestBatch {
                events: page.events,
                next_sync_token: page.next_sync_token,
                was_full_resync: true,
            }),
            ListOutcome::TokenExpired => {
                // A full listing reporting its own token as expired would be
                // a gateway contract violation; treat as an empty resync
                // rather than looping.
                Ok(IngestBatch {
                    events: Vec::new(),
                    next_sync_token: None,
                    was_full_resync: true,
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway::{EventPage, GatewayError, MockCalendarGateway};

    #[tokio::test]
    async fn passes_through_incremental_page() {
        let mut mock = MockCalendarGateway::new();
        mock.expect_list_events()
            .withf(|cal, token| cal == "cal-1" && token == Some("tok-1"))
            .returning(|_, _| {
                Ok(ListOutcome::Ok(EventPage {
                    events: Vec::new(),
                    next_sync_token: Some("tok-2".to_string()),
                }))
            });

        let batch = ingest(&mock, "cal-1", Some("tok-1")).await.unwrap();
        assert_eq!(batch.next_sync_token.as_deref(), Some("tok-2"));
        assert!(!batch.was_full_resync);
    }

    #[tokio::test]
    async fn expired_token_triggers_full_relist() {
        let mut mock = MockCalendarGateway::new();
        mock.expect_list_events()
            .withf(|_, token| token.is_some())
            .returning(|_, _| Ok(ListOutcome::TokenExpired));
        mock.expect_list_events()
            .withf(|_, token| token.is_none())
            .returning(|_, _| {
                Ok(ListOutcome::Ok(EventPage {
                    events: Vec::new(),
                    next_sync_token: Some("tok-fresh".to_string()),
                }))
            });

        let batch = ingest(&mock, "cal-1", Some("stale")).await.unwrap();
        assert!(batch.was_full_resync);
        assert_eq!(batch.next_sync_token.as_deref(), Some("tok-fresh"));
    }

    #[tokio::test]
    async fn propagates_gateway_errors() {
        let mut mock = MockCalendarGateway::new();
        mock.expect_list_events()
            .returning(|_, _| Err(GatewayError::Unavailable("down".to_string())));

        let result = ingest(&mock, "cal-1", None).await;
        assert!(result.is_err());
    }
}
