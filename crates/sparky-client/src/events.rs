//! Lifecycle notifications.
//!
//! The engine publishes an [`EngineEvent`] for every dispatch, response,
//! retry and backlog eviction on a broadcast channel. Publishing never waits:
//! with no subscriber the event is discarded, and a subscriber that falls
//! behind loses the oldest events (`RecvError::Lagged`) instead of slowing
//! requests down.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::scheduler::LaneKind;

/// Something that happened to a physical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A request was submitted to a lane.
    Request {
        lane: LaneKind,
        method: String,
        url: String,
    },
    /// A response arrived.
    Response {
        method: String,
        url: String,
        status: u16,
        /// Time since submission, including any queueing.
        elapsed: Duration,
    },
    /// A transient response will be resubmitted on the retry lane.
    Retry {
        method: String,
        url: String,
        status: u16,
        /// Retry number, starting at 1.
        attempt: u32,
        delay: Duration,
    },
    /// A queued request was evicted from a full backlog.
    Dropped {
        lane: LaneKind,
        method: String,
        url: String,
    },
}

/// Publishing side of the event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventSink {
    /// Creates a sink buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event without waiting.
    pub fn emit(&self, event: EngineEvent) {
        // An error only means nobody is listening.
        let _ = self.tx.send(event);
    }

    /// Returns a new receiver for subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn dropped(url: &str) -> EngineEvent {
        EngineEvent::Dropped {
            lane: LaneKind::Primary,
            method: "GET".into(),
            url: url.into(),
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let sink = EventSink::new(4);
        sink.emit(dropped("http://h/a"));
    }

    #[test]
    fn subscribers_see_events_in_order() {
        let sink = EventSink::new(4);
        let mut rx = sink.subscribe();
        sink.emit(dropped("http://h/a"));
        sink.emit(dropped("http://h/b"));

        assert_eq!(rx.try_recv().unwrap(), dropped("http://h/a"));
        assert_eq!(rx.try_recv().unwrap(), dropped("http://h/b"));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn slow_subscriber_lags_instead_of_blocking() {
        let sink = EventSink::new(2);
        let mut rx = sink.subscribe();
        for i in 0..5 {
            sink.emit(dropped(&format!("http://h/{i}")));
        }
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(_))));
        assert_eq!(rx.try_recv().unwrap(), dropped("http://h/3"));
    }
}
