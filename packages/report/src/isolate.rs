//! Divide-and-conquer fault isolation for batched requests.
//!
//! A failing batch is narrowed down until every ID either succeeds or is
//! pinned with its own error:
//!
//! - an error that names IDs of the unit fails those IDs immediately and
//!   the rest of the unit is retried as a smaller batch;
//! - any other error is retried with backoff, and once retries run out a
//!   multi-ID unit is bisected while a single-ID unit becomes a hard
//!   per-ID error.
//!
//! Units are kept on an explicit stack, left half on top, so IDs resolve
//! in their original order.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::ApiError;
use crate::retry::{RetryPolicy, with_backoff};

/// Error text for an ID the API silently left out of a response.
pub const NO_DATA_RETURNED: &str = "No data returned";

/// Per-ID outcome: the payload or an error message.
pub type IdOutcome<P> = (String, Result<P, String>);

/// Fetches `ids` with isolation.
///
/// `fetch` reads one unit and returns a per-ID map; an ID may map to its
/// own error. IDs missing from a successful response resolve to
/// [`NO_DATA_RETURNED`]. Every input ID appears exactly once in the output.
///
/// # Errors
///
/// Returns [`ApiError::Cancelled`] if `cancel` fires. Nothing else is
/// returned as an error.
pub async fn fetch_isolated<P, F, Fut, N>(
    ids: Vec<String>,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut on_retry: N,
    mut fetch: F,
) -> Result<Vec<IdOutcome<P>>, ApiError>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<BTreeMap<String, Result<P, String>>, ApiError>>,
    N: FnMut(u32, Duration),
{
    let mut resolved = Vec::with_capacity(ids.len());
    let mut stack = vec![ids];

    while let Some(unit) = stack.pop() {
        if unit.is_empty() {
            continue;
        }
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let result = with_backoff(
            policy,
            cancel,
            |e| e.attributed_ids(&unit).is_empty(),
            &mut on_retry,
            || fetch(unit.clone()),
        )
        .await;

        match result {
            Ok(mut by_id) => {
                for id in unit {
                    let outcome = by_id
                        .remove(&id)
                        .unwrap_or_else(|| Err(NO_DATA_RETURNED.to_string()));
                    resolved.push((id, outcome));
                }
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                let named = e.attributed_ids(&unit);
                if !named.is_empty() {
                    log::warn!("Request failed for {} named ids: {e}", named.len());
                    let rest: Vec<String> = unit
                        .into_iter()
                        .filter(|id| !named.contains(id))
                        .collect();
                    resolved.extend(named.into_iter().map(|id| (id, Err(e.to_string()))));
                    stack.push(rest);
                } else if unit.len() > 1 {
                    let mut left = unit;
                    let right = left.split_off(left.len() / 2);
                    log::debug!(
                        "Bisecting failed unit into {} + {} ids: {e}",
                        left.len(),
                        right.len()
                    );
                    stack.push(right);
                    stack.push(left);
                } else {
                    log::warn!("Giving up on id {}: {e}", unit[0]);
                    resolved.extend(unit.into_iter().map(|id| (id, Err(e.to_string()))));
                }
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeSet;

    use super::*;

    const NO_DELAY: RetryPolicy = RetryPolicy {
        max_retries: 1,
        base_delay: Duration::ZERO,
    };

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn ok_map(unit: &[String]) -> BTreeMap<String, Result<String, String>> {
        unit.iter()
            .map(|id| (id.clone(), Ok(format!("payload-{id}"))))
            .collect()
    }

    #[tokio::test]
    async fn bisects_unattributed_failures_down_to_single_ids() {
        let bad: BTreeSet<&str> = ["2", "4"].into();
        let calls = Cell::new(0u32);
        let outcome = fetch_isolated(
            ids(&["1", "2", "3", "4"]),
            &NO_DELAY,
            &CancellationToken::new(),
            |_, _| {},
            |unit| {
                calls.set(calls.get() + 1);
                let failing = unit.iter().any(|id| bad.contains(id.as_str()));
                async move {
                    if failing {
                        Err(ApiError::Api {
                            code: Some(100),
                            message: "Invalid parameter".to_string(),
                        })
                    } else {
                        Ok(ok_map(&unit))
                    }
                }
            },
        )
        .await
        .unwrap();

        let order: Vec<&str> = outcome.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, ["1", "2", "3", "4"]);
        let errors: Vec<&str> = outcome
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(errors, ["2", "4"]);
        assert_eq!(outcome.iter().filter(|(_, r)| r.is_ok()).count(), 2);
    }

    #[tokio::test]
    async fn named_ids_are_isolated_without_retrying() {
        let units = RefCell::new(Vec::new());
        let outcome = fetch_isolated(
            ids(&["a1", "b2", "c3"]),
            &NO_DELAY,
            &CancellationToken::new(),
            |_, _| panic!("attributable errors are not retried"),
            |unit| {
                units.borrow_mut().push(unit.clone());
                async move {
                    if unit.iter().any(|id| id == "b2") {
                        Err(ApiError::Api {
                            code: Some(100),
                            message: "Unsupported get request. Object with ID 'b2' does not exist"
                                .to_string(),
                        })
                    } else {
                        Ok(ok_map(&unit))
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(*units.borrow(), [ids(&["a1", "b2", "c3"]), ids(&["a1", "c3"])]);
        let failed: Vec<&str> = outcome
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(failed, ["b2"]);
        assert_eq!(outcome.len(), 3);
    }

    #[tokio::test]
    async fn missing_ids_and_per_id_errors_pass_through() {
        let outcome = fetch_isolated(
            ids(&["x", "y", "z"]),
            &NO_DELAY,
            &CancellationToken::new(),
            |_, _| {},
            |_unit| async {
                let mut map = BTreeMap::new();
                map.insert("x".to_string(), Ok(1));
                map.insert("y".to_string(), Err("(#100) Unsupported".to_string()));
                Ok(map)
            },
        )
        .await
        .unwrap();

        assert_eq!(outcome[0], ("x".to_string(), Ok(1)));
        assert_eq!(outcome[1], ("y".to_string(), Err("(#100) Unsupported".to_string())));
        assert_eq!(outcome[2], ("z".to_string(), Err(NO_DATA_RETURNED.to_string())));
    }

    #[tokio::test]
    async fn exhausted_single_id_becomes_hard_error() {
        let attempts = Cell::new(0u32);
        let outcome = fetch_isolated::<(), _, _, _>(
            ids(&["only"]),
            &RetryPolicy {
                max_retries: 2,
                base_delay: Duration::ZERO,
            },
            &CancellationToken::new(),
            |_, _| {},
            |_unit| {
                attempts.set(attempts.get() + 1);
                async {
                    Err(ApiError::Status {
                        status: 500,
                        body: "oops".to_string(),
                    })
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(attempts.get(), 3);
        assert_eq!(outcome.len(), 1);
        assert!(outcome[0].1.as_ref().unwrap_err().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn always_failing_chunk_errors_every_id_within_the_retry_ceiling() {
        let attempts: RefCell<BTreeMap<Vec<String>, u32>> = RefCell::new(BTreeMap::new());
        let outcome = fetch_isolated::<(), _, _, _>(
            ids(&["1", "2", "3", "4"]),
            &RetryPolicy {
                max_retries: 2,
                base_delay: Duration::ZERO,
            },
            &CancellationToken::new(),
            |_, _| {},
            |unit| {
                *attempts.borrow_mut().entry(unit).or_insert(0) += 1;
                async {
                    Err(ApiError::Status {
                        status: 503,
                        body: "unavailable".to_string(),
                    })
                }
            },
        )
        .await
        .unwrap();

        let order: Vec<&str> = outcome.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, ["1", "2", "3", "4"]);
        assert!(outcome.iter().all(|(_, r)| r.is_err()));

        let attempts = attempts.borrow();
        assert_eq!(attempts.len(), 7);
        assert!(attempts.values().all(|&n| n == 3));
        assert_eq!(attempts.values().sum::<u32>(), 21);
    }

    #[tokio::test]
    async fn cancellation_is_returned_as_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = fetch_isolated::<(), _, _, _>(
            ids(&["a"]),
            &NO_DELAY,
            &cancel,
            |_, _| {},
            |_unit| async { Ok(BTreeMap::new()) },
        )
        .await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
    }
}
