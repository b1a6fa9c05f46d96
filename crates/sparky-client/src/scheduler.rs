//! Throttled dispatch lanes.
//!
//! Every physical request passes through a [`Lane`] before it reaches the
//! transport. A lane enforces three limits:
//!
//! - at most `max_concurrent` exchanges in flight
//! - at least `min_spacing` between two dispatches
//! - at most `queue_size` calls waiting; when a new call overflows the
//!   backlog the oldest waiting call is evicted and fails with
//!   [`EngineError::Dropped`]
//!
//! Waiting calls are served first-in first-out. The [`Scheduler`] owns the
//! primary lane for fresh traffic and the retry lane for requeued calls.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{LaneConfig, MAX_SPACING};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventSink};
use crate::transport::{Transport, TransportRequest, TransportResponse};

/// Identifies a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneKind {
    /// Fresh traffic.
    Primary,
    /// Calls resubmitted after a transient status.
    Retry,
}

impl LaneKind {
    /// Returns the lane name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Waiting {
    ticket: u64,
    method: &'static str,
    url: String,
    evict: oneshot::Sender<()>,
}

/// Proof of dispatch; holds one concurrency slot until dropped.
#[derive(Debug)]
pub struct LanePermit {
    _slot: OwnedSemaphorePermit,
}

/// One throttled queue.
pub struct Lane {
    kind: LaneKind,
    config: LaneConfig,
    slots: Arc<Semaphore>,
    next_dispatch: tokio::sync::Mutex<Option<Instant>>,
    backlog: Mutex<VecDeque<Waiting>>,
    next_ticket: AtomicU64,
    events: EventSink,
}

impl fmt::Debug for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lane")
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("backlog", &self.backlog_len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Lane {
    /// Creates a lane. Limits above what the lane can honour are clamped.
    pub fn new(kind: LaneKind, config: LaneConfig, events: EventSink) -> Self {
        let config = LaneConfig {
            max_concurrent: config.max_concurrent.min(Semaphore::MAX_PERMITS),
            min_spacing: config.min_spacing.min(MAX_SPACING),
            ..config
        };
        Self {
            kind,
            config,
            slots: Arc::new(Semaphore::new(config.max_concurrent)),
            next_dispatch: tokio::sync::Mutex::new(None),
            backlog: Mutex::new(VecDeque::new()),
            next_ticket: AtomicU64::new(0),
            events,
        }
    }

    /// Returns the lane identity.
    pub fn kind(&self) -> LaneKind {
        self.kind
    }

    /// Returns the lane limits.
    pub fn config(&self) -> &LaneConfig {
        &self.config
    }

    /// Number of calls waiting for dispatch.
    pub fn backlog_len(&self) -> usize {
        self.lock_backlog().len()
    }

    /// Number of exchanges currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.config
            .max_concurrent
            .saturating_sub(self.slots.available_permits())
    }

    /// Waits until `request` may be dispatched.
    ///
    /// Fails with [`EngineError::Dropped`] if the call is evicted from the
    /// backlog first. Dropping the returned future withdraws the call.
    pub async fn admit(&self, request: &TransportRequest) -> EngineResult<LanePermit> {
        let method = request.method.http_verb();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (evict, evicted) = oneshot::channel();

        self.enqueue(Waiting {
            ticket,
            method,
            url: request.url.clone(),
            evict,
        });
        let entry = BacklogEntry { lane: self, ticket };

        tokio::select! {
            biased;

            _ = evicted => Err(EngineError::dropped(self.kind, method, &request.url)),

            slot = self.dispatch_slot() => match slot {
                Some(slot) if entry.leave() => Ok(LanePermit { _slot: slot }),
                _ => Err(EngineError::dropped(self.kind, method, &request.url)),
            },
        }
    }

    fn enqueue(&self, waiting: Waiting) {
        let mut backlog = self.lock_backlog();
        backlog.push_back(waiting);

        while backlog.len() > self.config.queue_size {
            let Some(oldest) = backlog.pop_front() else {
                break;
            };
            warn!(
                lane = %self.kind,
                method = oldest.method,
                url = %oldest.url,
                queue_size = self.config.queue_size,
                "Lane backlog full, dropping oldest request"
            );
            self.events.emit(EngineEvent::Dropped {
                lane: self.kind,
                method: oldest.method.to_string(),
                url: oldest.url.clone(),
            });
            let _ = oldest.evict.send(());
        }
    }

    /// Takes a concurrency slot, then waits out the spacing gate.
    async fn dispatch_slot(&self) -> Option<OwnedSemaphorePermit> {
        let slot = self.slots.clone().acquire_owned().await.ok()?;

        let mut next = self.next_dispatch.lock().await;
        if let Some(at) = *next {
            tokio::time::sleep_until(at).await;
        }
        *next = Some(Instant::now() + self.config.min_spacing);
        Some(slot)
    }

    fn remove(&self, ticket: u64) -> bool {
        let mut backlog = self.lock_backlog();
        match backlog.iter().position(|w| w.ticket == ticket) {
            Some(index) => {
                backlog.remove(index);
                true
            }
            None => false,
        }
    }

    fn lock_backlog(&self) -> MutexGuard<'_, VecDeque<Waiting>> {
        self.backlog.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a call from the backlog when its wait ends, however it ends.
struct BacklogEntry<'a> {
    lane: &'a Lane,
    ticket: u64,
}

impl BacklogEntry<'_> {
    /// Returns false if the call was evicted in the meantime.
    fn leave(&self) -> bool {
        self.lane.remove(self.ticket)
    }
}

impl Drop for BacklogEntry<'_> {
    fn drop(&mut self) {
        self.lane.remove(self.ticket);
    }
}

/// The primary and retry lanes.
#[derive(Debug)]
pub struct Scheduler {
    primary: Lane,
    retry: Lane,
}

impl Scheduler {
    /// Creates both lanes, publishing evictions on `events`.
    pub fn new(primary: LaneConfig, retry: LaneConfig, events: EventSink) -> Self {
        Self {
            primary: Lane::new(LaneKind::Primary, primary, events.clone()),
            retry: Lane::new(LaneKind::Retry, retry, events),
        }
    }

    /// Returns the lane of the given kind.
    pub fn lane(&self, kind: LaneKind) -> &Lane {
        match kind {
            LaneKind::Primary => &self.primary,
            LaneKind::Retry => &self.retry,
        }
    }

    /// Runs one exchange through a lane.
    ///
    /// The concurrency slot is held until the transport returns.
    pub async fn schedule(
        &self,
        kind: LaneKind,
        request: &TransportRequest,
        transport: &dyn Transport,
    ) -> EngineResult<TransportResponse> {
        let _permit = self.lane(kind).admit(request).await?;
        debug!(lane = %kind, method = %request.method, url = %request.url, "Dispatching request");

        transport
            .execute(request)
            .await
            .map_err(|e| EngineError::transport(request.method.http_verb(), &request.url, e))
    }
}
