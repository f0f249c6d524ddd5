//! Eventual-consistency verification of a derived read path.
//!
//! After a write to the system of record, the derived view is queried on an
//! interval until a record matching the predicate shows up or the deadline
//! passes. Absence at the deadline is a normal outcome, not an error.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::poll::{DeadlinePolicy, Observation, PollProgress, poll_until};

/// What a verification observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub matched: bool,
    #[serde(with = "crate::config::duration_str")]
    pub elapsed: Duration,
    /// Result set size at the final poll.
    pub observed: usize,
    pub polls: u32,
    /// Query error at the final poll, if it failed.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    count: usize,
    error: Option<String>,
}

/// Poll `query` until an item satisfies `predicate` or the deadline passes.
///
/// A failing query counts as "nothing yet" and polling continues.
pub async fn verify_eventually<Q, Fut, P>(
    label: &str,
    policy: &DeadlinePolicy,
    mut query: Q,
    predicate: P,
    on_progress: impl FnMut(&PollProgress<'_>),
) -> ConsistencyReport
where
    Q: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<Value>, String>>,
    P: Fn(&Value) -> bool,
{
    let predicate = &predicate;
    let outcome = poll_until(
        label,
        policy,
        move || {
            let fut = query();
            async move {
                match fut.await {
                    Ok(items) => {
                        let snapshot = Snapshot {
                            count: items.len(),
                            error: None,
                        };
                        if items.iter().any(predicate) {
                            Observation::Matched(snapshot)
                        } else {
                            debug!(target_check = label, results = items.len(), "No match yet");
                            Observation::Pending(snapshot)
                        }
                    }
                    Err(error) => {
                        debug!(target_check = label, error = %error, "Query failed");
                        Observation::Pending(Snapshot {
                            count: 0,
                            error: Some(error),
                        })
                    }
                }
            }
        },
        on_progress,
    )
    .await;

    let last = outcome.last.unwrap_or_default();
    ConsistencyReport {
        matched: outcome.matched,
        elapsed: outcome.elapsed,
        observed: last.count,
        polls: outcome.polls,
        last_error: last.error,
    }
}

/// Match on `key` equal to `expected`, tolerating numbers sent back as strings.
pub fn field_equals(item: &Value, key: &str, expected: &Value) -> bool {
    match (item.get(key), expected) {
        (Some(actual), _) if actual == expected => true,
        (Some(Value::String(actual)), Value::Number(n)) => *actual == n.to_string(),
        (Some(Value::Number(actual)), Value::String(s)) => actual.to_string() == *s,
        _ => false,
    }
}
