//! The request engine.
//!
//! [`Engine::perform`] turns one [`RequestSpec`] into one [`Outcome`]. On the
//! way it validates the spec, builds the HTTP request, runs it through the
//! primary lane, requeues transient failures on the retry lane and follows
//! pagination links until the collection or the caller's limit is exhausted.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sparky_core::{ContentFile, Method, Outcome, Payload, RawRequest, RequestSpec, Resource};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelHandle;
use crate::classifier::{Classified, Resolved, classify};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventSink};
use crate::paginator::{self, PageAccumulator};
use crate::scheduler::{LaneKind, Scheduler};
use crate::transport::{ReqwestTransport, RequestBody, Transport, TransportRequest};

/// One physical request and its retry state.
#[derive(Debug, Clone)]
struct QueuedCall {
    request: TransportRequest,
    record_id: Option<String>,
    lane: LaneKind,
    retries: u32,
}

impl QueuedCall {
    /// A GET of a continuation URL, sharing credentials with `self`.
    fn continuation(&self, url: String) -> Self {
        Self {
            request: TransportRequest {
                method: Method::Get,
                url,
                headers: self.request.headers.clone(),
                query: Vec::new(),
                body: RequestBody::Empty,
                timeout: self.request.timeout,
                binary: false,
            },
            record_id: None,
            lane: LaneKind::Primary,
            retries: 0,
        }
    }
}

/// Throttled, retrying, paginating API client.
///
/// An `Engine` is cheap to share behind an [`Arc`]; every method takes
/// `&self` and the lanes are shared by all concurrent callers.
pub struct Engine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    scheduler: Scheduler,
    events: EventSink,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("api_url", &self.config.api_url)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine talking HTTP through `reqwest`.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new().map_err(|e| {
            EngineError::Validation(sparky_core::ValidationError::config(e.to_string()))
        })?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates an engine over a custom transport.
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn Transport>) -> EngineResult<Self> {
        config.validate()?;
        let events = EventSink::new(config.event_capacity);
        let scheduler = Scheduler::new(config.primary_lane(), config.retry_lane(), events.clone());
        debug!(
            api_url = %config.api_url,
            max_concurrent = config.max_concurrent,
            min_time_ms = config.min_time.as_millis() as u64,
            "Engine ready"
        );
        Ok(Self {
            config,
            transport,
            scheduler,
            events,
        })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribes to lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Performs one logical request.
    pub async fn perform(&self, spec: RequestSpec) -> EngineResult<Outcome> {
        spec.validate()?;
        let call = self.prepare(&spec);

        let resolved = self.execute(call.clone()).await?;
        let outcome = match resolved {
            Resolved::Empty => Outcome::Empty,
            Resolved::Object(value) => Outcome::Object(value),
            Resolved::File(file) => Outcome::File(file),
            Resolved::Page { items, next } => {
                let mut acc = PageAccumulator::new(spec.max_results());
                acc.push_page(items);
                let items = paginator::follow(acc, next, |url| self.execute(call.continuation(url))).await?;
                Outcome::List(items)
            }
        };
        Ok(outcome)
    }

    /// Parses and performs a string-typed request.
    pub async fn perform_raw(&self, raw: RawRequest) -> EngineResult<Outcome> {
        let spec = RequestSpec::try_from(raw)?;
        self.perform(spec).await
    }

    /// Performs a request that `cancel` can abandon.
    ///
    /// A cancelled request resolves to [`EngineError::Cancelled`]; pages
    /// fetched so far are discarded.
    pub async fn perform_cancellable(
        &self,
        spec: RequestSpec,
        cancel: &CancelHandle,
    ) -> EngineResult<Outcome> {
        let signal = cancel.signal();
        tokio::select! {
            biased;
            _ = signal.wait() => {
                debug!(method = %spec.method(), resource = spec.resource().path(), "Request cancelled");
                Err(EngineError::Cancelled)
            }
            result = self.perform(spec.clone()) => result,
        }
    }

    /// Performs a request, giving up after `deadline`.
    pub async fn perform_with_deadline(
        &self,
        spec: RequestSpec,
        deadline: Duration,
    ) -> EngineResult<Outcome> {
        match tokio::time::timeout(deadline, self.perform(spec)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(deadline_ms = deadline.as_millis() as u64, "Request deadline elapsed");
                Err(EngineError::Cancelled)
            }
        }
    }

    /// Downloads a content file by id or by its full URL.
    pub async fn content(&self, id_or_url: &str) -> EngineResult<ContentFile> {
        let id = content_id(id_or_url);
        let spec = RequestSpec::get(Resource::Contents).with_id(id);
        match self.perform(spec).await? {
            Outcome::File(file) => Ok(file),
            _ => Err(EngineError::invalid_response(
                "GET",
                format!("{}{}/{}", self.config.api_url, Resource::Contents.path(), id),
                "could not retrieve file headers",
            )),
        }
    }

    fn prepare(&self, spec: &RequestSpec) -> QueuedCall {
        let mut url = format!("{}{}", self.config.api_url, spec.resource().path());
        if let Some(id) = spec.id() {
            url.push('/');
            url.push_str(&urlencoding::encode(id));
        }

        let token = self.config.token.as_deref().unwrap_or_default();
        let mut headers = vec![("Authorization".to_string(), format!("Bearer {token}"))];

        let mut query = Vec::new();
        let body = match spec.method() {
            Method::Get | Method::Delete => {
                query = query_pairs(spec.payload());
                RequestBody::Empty
            }
            Method::Post | Method::Put => RequestBody::Json(Value::Object(spec.payload().clone())),
            Method::Form => RequestBody::Multipart {
                fields: query_pairs(spec.payload()),
                attachment: spec.attachment().cloned(),
            },
        };
        if !matches!(body, RequestBody::Multipart { .. }) {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let binary = spec.resource().is_binary();
        if spec.method() == Method::Get
            && spec.id().is_none()
            && !binary
            && !spec.payload().contains_key("max")
        {
            query.push(("max".to_string(), self.config.max_page_items.to_string()));
        }

        QueuedCall {
            request: TransportRequest {
                method: spec.method(),
                url,
                headers,
                query,
                body,
                timeout: self.config.request_timeout,
                binary,
            },
            record_id: spec.id().map(String::from),
            lane: LaneKind::Primary,
            retries: 0,
        }
    }

    /// Runs one physical request to a non-transient conclusion.
    async fn execute(&self, mut call: QueuedCall) -> EngineResult<Resolved> {
        let method = call.request.method.http_verb();
        loop {
            self.events.emit(EngineEvent::Request {
                lane: call.lane,
                method: method.to_string(),
                url: call.request.url.clone(),
            });
            let submitted = Instant::now();

            let response = self
                .scheduler
                .schedule(call.lane, &call.request, self.transport.as_ref())
                .await?;

            let elapsed = submitted.elapsed();
            debug!(
                method,
                url = %call.request.url,
                status = response.status,
                elapsed_ms = elapsed.as_millis() as u64,
                "Received response"
            );
            self.events.emit(EngineEvent::Response {
                method: method.to_string(),
                url: call.request.url.clone(),
                status: response.status,
                elapsed,
            });

            match classify(&response, &call.request, call.record_id.as_deref(), &self.config) {
                Classified::Done(resolved) => return Ok(resolved),
                Classified::Transient { status, delay } => {
                    if call.retries >= self.config.requeue_max_retry {
                        warn!(
                            method,
                            url = %call.request.url,
                            status,
                            retries = call.retries,
                            "Retries exhausted"
                        );
                        return Err(EngineError::status(status, method, call.request.url));
                    }
                    call.retries += 1;
                    info!(
                        method,
                        url = %call.request.url,
                        status,
                        attempt = call.retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transient response, requeueing"
                    );
                    self.events.emit(EngineEvent::Retry {
                        method: method.to_string(),
                        url: call.request.url.clone(),
                        status,
                        attempt: call.retries,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                    call.lane = LaneKind::Retry;
                }
                Classified::Fatal { status } => {
                    warn!(method, url = %call.request.url, status, "Request failed");
                    return Err(EngineError::status(status, method, call.request.url));
                }
                Classified::Invalid(message) => {
                    warn!(method, url = %call.request.url, error = %message, "Unusable response");
                    return Err(EngineError::invalid_response(method, call.request.url, message));
                }
            }
        }
    }
}

/// Payload entries as string pairs; strings verbatim, other values as JSON.
fn query_pairs(payload: &Payload) -> Vec<(String, String)> {
    payload
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Reduces `https://host/v1/contents/<id>` to `<id>`.
fn content_id(id_or_url: &str) -> &str {
    let trimmed = id_or_url.trim_end_matches('/');
    if !trimmed.contains("://") {
        return trimmed;
    }
    let path = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    path.rsplit('/').next().unwrap_or(path)
}
