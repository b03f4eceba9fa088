//! Push-notification receiver (spec 6). Every anomaly acknowledges with
//! 200 so the sender's retry policy never kicks in; only the dispatched
//! case does any work, and that work runs in the background so the
//! handler returns immediately.

use axum::{extract::State, http::HeaderMap, http::StatusCode};
use db::WebhookChannelRepository;
use shared::crypto::constant_time_eq;
use shared::OriginKind;
use sync_core::scheduler::{trigger_sync_for_calendar, trigger_sync_for_main_calendar};
use tracing::{info, warn};

use crate::metrics::record_webhook_anomaly;
use crate::state::AppState;

/// POST /webhooks/calendar
pub async fn receive_notification(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    let Some(channel_id) = header_str(&headers, "Channel-Id") else {
        warn!("webhook missing Channel-Id header");
        return StatusCode::OK;
    };
    let resource_state = header_str(&headers, "Resource-State").unwrap_or_default();

    if resource_state == "sync" {
        info!(channel_id, "webhook sync handshake, acknowledging");
        return StatusCode::OK;
    }

    let channel = match WebhookChannelRepository::find_by_channel_id(&state.ctx.pool, channel_id).await {
        Ok(Some(channel)) => channel,
        Ok(None) => {
            info!(channel_id, "webhook for unknown channel, acknowledging");
            record_webhook_anomaly("unknown_channel");
            return StatusCode::OK;
        }
        Err(err) => {
            warn!(channel_id, error = %err, "webhook lookup failed");
            return StatusCode::OK;
        }
    };

    if channel.expires_within(chrono::Duration::zero()) {
        info!(channel_id, "webhook channel expired, deleting and acknowledging");
        record_webhook_anomaly("expired_channel");
        let _ = WebhookChannelRepository::delete_by_channel_id(&state.ctx.pool, channel_id).await;
        return StatusCode::OK;
    }

    let Some(token) = header_str(&headers, "Channel-Token") else {
        warn!(channel_id, "webhook missing Channel-Token header");
        record_webhook_anomaly("token_mismatch");
        return StatusCode::OK;
    };
    if !constant_time_eq(token.as_bytes(), channel.token.as_bytes()) {
        warn!(channel_id, "webhook token mismatch");
        record_webhook_anomaly("token_mismatch");
        return StatusCode::OK;
    }

    let Some(resource_id) = header_str(&headers, "Resource-Id") else {
        warn!(channel_id, "webhook missing Resource-Id header");
        record_webhook_anomaly("resource_mismatch");
        return StatusCode::OK;
    };
    if resource_id != channel.resource_id {
        warn!(channel_id, expected = %channel.resource_id, got = resource_id, "webhook resource id mismatch");
        record_webhook_anomaly("resource_mismatch");
        return StatusCode::OK;
    }

    let ctx = state.ctx.clone();
    tokio::spawn(async move {
        let result = match (channel.calendar_kind, channel.attachment_id) {
            (OriginKind::Main, _) => trigger_sync_for_main_calendar(&ctx, channel.user_id).await,
            (_, Some(attachment_id)) => trigger_sync_for_calendar(&ctx, attachment_id).await,
            (_, None) => {
                warn!(channel_id = %channel.channel_id, "non-main webhook channel missing attachment_id");
                return;
            }
        };
        if let Err(err) = result {
            warn!(channel_id = %channel.channel_id, error = %err, "webhook-triggered sync failed");
        }
    });

    StatusCode::OK
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
