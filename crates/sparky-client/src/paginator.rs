//! Follows `Link` continuations of collection reads.

use std::future::Future;

use sparky_core::Record;
use tracing::{debug, warn};

use crate::classifier::Resolved;
use crate::error::{EngineError, EngineResult};

/// Records collected across pages, capped by the caller's limit.
#[derive(Debug, Default)]
pub struct PageAccumulator {
    items: Vec<Record>,
    max_results: Option<usize>,
    pages: usize,
}

impl PageAccumulator {
    /// Creates an accumulator; `None` means unlimited.
    pub fn new(max_results: Option<usize>) -> Self {
        Self {
            items: Vec::new(),
            max_results,
            pages: 0,
        }
    }

    /// Appends one page of records.
    pub fn push_page(&mut self, items: Vec<Record>) {
        self.items.extend(items);
        self.pages += 1;
    }

    /// True once the limit is reached and no further page is needed.
    pub fn is_satisfied(&self) -> bool {
        self.max_results.is_some_and(|max| self.items.len() >= max)
    }

    /// Records collected so far.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Pages pushed so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Returns the records, truncated to the limit.
    pub fn finish(mut self) -> Vec<Record> {
        if let Some(max) = self.max_results {
            self.items.truncate(max);
        }
        self.items
    }
}

/// Fetches continuation pages until the chain ends or the limit is hit.
///
/// A continuation the server answered with a non-success status or an
/// unreadable body ends the walk and the records gathered so far are
/// returned. Transport failures and dropped calls are propagated. Cancellation
/// is not observed here: dropping the future discards everything.
pub async fn follow<F, Fut>(
    mut acc: PageAccumulator,
    mut next: Option<String>,
    mut fetch: F,
) -> EngineResult<Vec<Record>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = EngineResult<Resolved>>,
{
    while let Some(url) = next.take() {
        if acc.is_satisfied() {
            debug!(items = acc.len(), pages = acc.pages(), "Result limit reached, not following next page");
            break;
        }

        match fetch(url.clone()).await {
            Ok(Resolved::Page { items, next: following }) => {
                acc.push_page(items);
                if following.as_deref() == Some(url.as_str()) {
                    warn!(url = %url, "Next page link points to itself, stopping");
                } else {
                    next = following;
                }
            }
            Ok(_) => {
                warn!(url = %url, "Continuation did not return a page, stopping");
            }
            Err(err @ (EngineError::Status { .. } | EngineError::InvalidResponse { .. })) => {
                warn!(
                    url = %url,
                    error = %err,
                    items = acc.len(),
                    "Pagination stopped early, returning partial results"
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(acc.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use serde_json::json;

    use crate::error::TransportError;
    use crate::scheduler::LaneKind;

    fn page(ids: &[&str], next: Option<&str>) -> Resolved {
        Resolved::Page {
            items: ids.iter().map(|id| json!({ "id": id })).collect(),
            next: next.map(String::from),
        }
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    fn seeded(ids: &[&str], max: Option<usize>) -> PageAccumulator {
        let mut acc = PageAccumulator::new(max);
        acc.push_page(ids.iter().map(|id| json!({ "id": id })).collect());
        acc
    }

    #[test]
    fn accumulator_truncates_on_finish() {
        let acc = seeded(&["a", "b", "c", "d"], Some(3));
        assert!(acc.is_satisfied());
        assert_eq!(ids(&acc.finish()), vec!["a", "b", "c"]);
    }

    #[test]
    fn unlimited_accumulator_is_never_satisfied() {
        let acc = seeded(&["a"; 1000], None);
        assert!(!acc.is_satisfied());
        assert_eq!(acc.finish().len(), 1000);
    }

    #[tokio::test]
    async fn follows_until_no_link() {
        let requested = RefCell::new(Vec::new());
        let records = follow(seeded(&["a", "b"], None), Some("http://h/p2".into()), |url| {
            requested.borrow_mut().push(url.clone());
            async move {
                Ok::<_, EngineError>(match url.as_str() {
                    "http://h/p2" => page(&["c"], Some("http://h/p3")),
                    _ => page(&["d"], None),
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(ids(&records), vec!["a", "b", "c", "d"]);
        assert_eq!(*requested.borrow(), vec!["http://h/p2", "http://h/p3"]);
    }

    #[tokio::test]
    async fn stops_once_limit_reached() {
        let calls = RefCell::new(0);
        let records = follow(seeded(&["a", "b"], Some(3)), Some("http://h/p2".into()), |_| {
            *calls.borrow_mut() += 1;
            async { Ok::<_, EngineError>(page(&["c", "d"], Some("http://h/p3"))) }
        })
        .await
        .unwrap();

        assert_eq!(ids(&records), vec!["a", "b", "c"]);
        assert_eq!(*calls.borrow(), 1);
    }

    #[tokio::test]
    async fn first_page_at_limit_fetches_nothing() {
        let calls = RefCell::new(0);
        let records = follow(seeded(&["a", "b"], Some(2)), Some("http://h/p2".into()), |_| {
            *calls.borrow_mut() += 1;
            async { Ok::<_, EngineError>(page(&["c"], None)) }
        })
        .await
        .unwrap();
        assert_eq!(ids(&records), vec!["a", "b"]);
        assert_eq!(*calls.borrow(), 0);
    }

    #[tokio::test]
    async fn failed_continuation_returns_partial_results() {
        let records = follow(seeded(&["a", "b"], None), Some("http://h/p2".into()), |url| async move {
            Err::<Resolved, _>(EngineError::status(404, "GET", url))
        })
        .await
        .unwrap();
        assert_eq!(ids(&records), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn undecodable_continuation_returns_partial_results() {
        let records = follow(seeded(&["a"], None), Some("http://h/p2".into()), |url| async move {
            Err::<Resolved, _>(EngineError::invalid_response("GET", url, "expected value"))
        })
        .await
        .unwrap();
        assert_eq!(ids(&records), vec!["a"]);
    }

    #[tokio::test]
    async fn transport_failure_on_continuation_is_propagated() {
        let err = follow(seeded(&["a", "b"], None), Some("http://h/p2".into()), |url| async move {
            Err::<Resolved, _>(EngineError::transport(
                "GET",
                url,
                TransportError::Connect("refused".into()),
            ))
        })
        .await
        .unwrap_err();
        assert!(
            matches!(err, EngineError::Transport { source: TransportError::Connect(_), .. }),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn dropped_continuation_is_propagated() {
        let err = follow(seeded(&["a"], None), Some("http://h/p2".into()), |url| async move {
            Err::<Resolved, _>(EngineError::dropped(LaneKind::Primary, "GET", url))
        })
        .await
        .unwrap_err();
        assert!(err.is_dropped());
    }

    #[tokio::test]
    async fn self_referencing_link_terminates() {
        let records = follow(seeded(&["a"], None), Some("http://h/p2".into()), |_| async {
            Ok::<_, EngineError>(page(&["b"], Some("http://h/p2")))
        })
        .await
        .unwrap();
        assert_eq!(ids(&records), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn non_page_continuation_stops() {
        let records = follow(seeded(&["a"], None), Some("http://h/p2".into()), |_| async {
            Ok::<_, EngineError>(Resolved::Empty)
        })
        .await
        .unwrap();
        assert_eq!(ids(&records), vec!["a"]);
    }
}
