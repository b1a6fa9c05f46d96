//! Scripted transport for engine tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::error::TransportError;
use crate::transport::{BoxFuture, Transport, TransportRequest, TransportResponse};

/// One recorded exchange.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub request: TransportRequest,
    pub at: Instant,
}

/// Replays queued responses in order, recording every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    fallback: Option<TransportResponse>,
    calls: Mutex<Vec<RecordedCall>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response served once the script runs out.
    pub fn with_fallback(mut self, response: TransportResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Every exchange waits for a permit on `gate` before answering.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn respond(self, response: TransportResponse) -> Self {
        self.script.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, error: TransportError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn execute<'a>(
        &'a self,
        request: &'a TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(RecordedCall {
                request: request.clone(),
                at: Instant::now(),
            });
            if let Some(gate) = &self.gate {
                gate.acquire().await.unwrap().forget();
            }

            let next = self.script.lock().unwrap().pop_front();
            match (next, &self.fallback) {
                (Some(result), _) => result,
                (None, Some(fallback)) => Ok(fallback.clone()),
                (None, None) => Err(TransportError::Request("script exhausted".into())),
            }
        })
    }
}

/// A JSON response.
pub(crate) fn json(status: u16, body: Value) -> TransportResponse {
    TransportResponse::new(status, body.to_string()).with_header("content-type", "application/json")
}

/// A collection page with an optional continuation.
pub(crate) fn page(ids: &[&str], next: Option<&str>) -> TransportResponse {
    let items: Vec<Value> = ids.iter().map(|id| serde_json::json!({ "id": id })).collect();
    let response = json(200, serde_json::json!({ "items": items }));
    match next {
        Some(url) => response.with_header("link", format!("<{url}>; rel=\"next\"")),
        None => response,
    }
}
