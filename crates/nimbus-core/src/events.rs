//! Process-wide event bus for foreground/background coordination.
//!
//! The engine and the background scheduler publish [`WeatherEvent`]s here
//! instead of flipping global observables; any number of observers can
//! subscribe.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

/// Events emitted by the engine and the refresh scheduler.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum WeatherEvent {
    /// The background path fetched fresh weather for the device position.
    BackgroundRefresh {
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
    /// A foreground request was answered from a cache.
    ServedFromCache {
        location_name: String,
        #[serde(with = "time::serde::rfc3339")]
        fetched_at: OffsetDateTime,
    },
    /// A historical window was published.
    HistoryUpdated { location_query: String, days: usize },
    /// A scheduled refresh tick failed.
    RefreshFailed { error: String, will_retry: bool },
}

/// Sender for weather events.
pub type EventSender = broadcast::Sender<WeatherEvent>;

/// Receiver for weather events.
pub type EventReceiver = broadcast::Receiver<WeatherEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: WeatherEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn test_dispatch_to_subscribers() {
        let dispatcher = EventDispatcher::default();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        let event = WeatherEvent::BackgroundRefresh {
            at: datetime!(2024-03-01 10:00 UTC),
        };
        dispatcher.send(event.clone());

        assert_eq!(a.recv().await.unwrap(), event);
        assert_eq!(b.recv().await.unwrap(), event);
    }

    #[test]
    fn test_send_without_receivers_is_silent() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.send(WeatherEvent::RefreshFailed {
            error: "x".into(),
            will_retry: true,
        });
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = WeatherEvent::HistoryUpdated {
            location_query: "Oslo".into(),
            days: 7,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"history_updated","location_query":"Oslo","days":7}"#);
    }
}
