pub mod client;
pub mod error;
pub mod event;
pub mod instance_id;
pub mod timefmt;

pub use client::{is_our_event, refresh_access_token, CalendarGateway, EventPage, HttpCalendarGateway, TokenPair, SYNC_TAG_KEY};
#[cfg(feature = "mock")]
pub use client::MockCalendarGateway;
pub use error::{GatewayError, GatewayResult, ListOutcome};
pub use event::{Attendee, Event, EventStatus, EventWrite, Identity, ResponseStatus, Transparency};
pub use instance_id::derive_instance_id;
