//! Maps one HTTP response to what the engine does next.
//!
//! The order of the checks matters:
//!
//! 1. `204` resolves to [`Resolved::Empty`]
//! 2. `429` is transient, delayed by `Retry-After` seconds (15 if absent)
//! 3. any other configured requeue code is transient, delayed by the
//!    retry lane spacing
//! 4. any other non-2xx status is fatal
//! 5. a binary request answered with something other than JSON is a file
//! 6. a JSON object with an `items` array is a page, continued by the
//!    `Link` header
//! 7. any other JSON is a single object

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use sparky_core::{ContentFile, Record};

use crate::config::EngineConfig;
use crate::transport::{TransportRequest, TransportResponse};

/// Delay used when a 429 carries no usable `Retry-After`.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(15);

static LINK_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]*)>([^,]*)").expect("valid link regex"));

/// A successful response, decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// No content.
    Empty,
    /// A single JSON value.
    Object(Record),
    /// One page of a collection.
    Page {
        items: Vec<Record>,
        next: Option<String>,
    },
    /// A downloaded file.
    File(ContentFile),
}

/// Decision for one response.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// The exchange succeeded.
    Done(Resolved),
    /// Retry on the retry lane after `delay`.
    Transient { status: u16, delay: Duration },
    /// Give up with this status.
    Fatal { status: u16 },
    /// Success status, unusable content.
    Invalid(String),
}

/// Classifies a response to `request`.
///
/// `record_id` names the downloaded file for binary requests.
pub fn classify(
    response: &TransportResponse,
    request: &TransportRequest,
    record_id: Option<&str>,
    config: &EngineConfig,
) -> Classified {
    let status = response.status;

    if status == 204 {
        return Classified::Done(Resolved::Empty);
    }
    if status == 429 {
        return Classified::Transient {
            status,
            delay: retry_after(response),
        };
    }
    if config.is_requeue_code(status) {
        return Classified::Transient {
            status,
            delay: config.requeue_min_time,
        };
    }
    if !(200..300).contains(&status) {
        return Classified::Fatal { status };
    }

    if request.binary && !is_json(response) {
        return file(response, record_id);
    }
    decode_json(response)
}

/// Seconds from `Retry-After`, or [`DEFAULT_RETRY_AFTER`].
pub fn retry_after(response: &TransportResponse) -> Duration {
    response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Extracts the continuation URL from `Link` header values.
///
/// Prefers a `rel="next"` link. A bare link with no `rel` parameter is
/// accepted as the continuation when no `next` link exists.
pub fn continuation_link<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut bare = None;
    for value in values {
        for caps in LINK_VALUE.captures_iter(value) {
            let url = caps[1].trim();
            if url.is_empty() {
                continue;
            }
            let params = caps
                .get(2)
                .map_or(String::new(), |m| m.as_str().to_ascii_lowercase());
            if params.contains("rel=\"next\"") || params.contains("rel=next") {
                return Some(url.to_string());
            }
            if !params.contains("rel=") && bare.is_none() {
                bare = Some(url.to_string());
            }
        }
    }
    bare
}

fn is_json(response: &TransportResponse) -> bool {
    response
        .header("content-type")
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
}

fn file(response: &TransportResponse, record_id: Option<&str>) -> Classified {
    let disposition = match response.header("content-disposition") {
        Some(value) => value,
        None => return Classified::Invalid("could not retrieve file headers".to_string()),
    };
    match ContentFile::from_headers(
        record_id.unwrap_or_default(),
        disposition,
        response.header("content-type"),
        response.body.to_vec(),
    ) {
        Some(file) => Classified::Done(Resolved::File(file)),
        None => Classified::Invalid("could not retrieve file headers".to_string()),
    }
}

fn decode_json(response: &TransportResponse) -> Classified {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Classified::Done(Resolved::Empty);
    }

    let value: Value = match serde_json::from_slice(&response.body) {
        Ok(value) => value,
        Err(e) => return Classified::Invalid(format!("failed to parse response body: {e}")),
    };

    match value {
        Value::Object(mut map) if map.get("items").is_some_and(Value::is_array) => {
            let items = match map.remove("items") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            Classified::Done(Resolved::Page {
                items,
                next: continuation_link(response.header_values("link")),
            })
        }
        other => Classified::Done(Resolved::Object(other)),
    }
}
