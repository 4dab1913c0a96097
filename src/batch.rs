//! Bounded-concurrency batch processing with per-item failure isolation.
//!
//! Items are submitted as an ordered list of independent tasks gated by a
//! counting semaphore and awaited as a group; the output array always
//! matches the input order and length. Any per-item failure is captured on
//! that item's record without affecting siblings.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::error::EngineError;
use crate::normalize::InputRecord;

/// Default number of simultaneous in-flight backend calls.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Successful outcome of one item's operation.
///
/// `warning` carries non-fatal diagnostics (for example a final-attempt
/// validation failure in extraction) that surface on the output record's
/// `error` field alongside the best-effort result.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    /// The produced value.
    pub value: Value,
    /// Optional non-fatal warning.
    pub warning: Option<String>,
}

impl ItemOutcome {
    /// A clean outcome with no warning.
    #[must_use]
    pub const fn ok(value: Value) -> Self {
        Self {
            value,
            warning: None,
        }
    }
}

/// One item's result. Exactly one is produced per input record, in input
/// order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRecord {
    /// The input record's id.
    pub id: Value,
    /// Produced value, or null when the item failed outright.
    pub result: Option<Value>,
    /// Failure or warning message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate statistics for one batch call. Derived, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    /// Number of input items.
    pub total: usize,
    /// Items whose record has no error.
    pub successful: usize,
    /// `total - successful`.
    pub failed: usize,
    /// Wall-clock span of the whole batch in milliseconds.
    pub processing_time_ms: u64,
}

/// Runs `operation` over every item with at most `max_concurrent` in flight.
///
/// Tasks are built as an ordered list and awaited as a group (join-all);
/// completion order across tasks is unconstrained but the returned records
/// match the input order. Each invocation is individually caught: an error
/// becomes `{id, result: null, error}` without affecting sibling items.
pub async fn process<F, Fut>(
    items: Vec<InputRecord>,
    operation: F,
    max_concurrent: usize,
) -> (Vec<OutputRecord>, BatchMetadata)
where
    F: Fn(InputRecord) -> Fut,
    Fut: Future<Output = Result<ItemOutcome, EngineError>>,
{
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let start = Instant::now();
    let total = items.len();
    let operation = &operation;

    let tasks = items.into_iter().map(|item| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            // The semaphore is never closed, so acquisition cannot fail.
            let _permit = semaphore.acquire().await.ok();
            let id = item.id.clone();
            match operation(item).await {
                Ok(outcome) => OutputRecord {
                    id,
                    result: Some(outcome.value),
                    error: outcome.warning,
                },
                Err(error) => OutputRecord {
                    id,
                    result: None,
                    error: Some(error.to_string()),
                },
            }
        }
    });

    let results = futures::future::join_all(tasks).await;

    let successful = results.iter().filter(|r| r.error.is_none()).count();
    let metadata = BatchMetadata {
        total,
        successful,
        failed: total - successful,
        processing_time_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
    };

    (results, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn records(n: usize) -> Vec<InputRecord> {
        (0..n)
            .map(|i| InputRecord {
                id: Value::from(i),
                data: json!(format!("item-{i}")),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_order_and_length_preserved() {
        let (results, metadata) = process(
            records(4),
            |item| async move { Ok(ItemOutcome::ok(item.data)) },
            2,
        )
        .await;

        assert_eq!(results.len(), 4);
        for (i, record) in results.iter().enumerate() {
            assert_eq!(record.id, Value::from(i));
            assert_eq!(record.result, Some(json!(format!("item-{i}"))));
        }
        assert_eq!(metadata.total, 4);
        assert_eq!(metadata.successful, 4);
        assert_eq!(metadata.failed, 0);
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let (results, metadata) = process(
            records(5),
            |item| async move {
                if item.id == Value::from(2_usize) {
                    Err(BackendError::Network("connection reset".to_string()).into())
                } else {
                    Ok(ItemOutcome::ok(item.data))
                }
            },
            3,
        )
        .await;

        assert_eq!(results.len(), 5);
        assert_eq!(metadata.failed, 1);
        assert_eq!(metadata.successful, 4);
        let failed = &results[2];
        assert!(failed.result.is_none());
        assert!(failed.error.as_deref().unwrap().contains("connection reset"));
        assert!(results[1].error.is_none());
        assert!(results[3].error.is_none());
    }

    #[tokio::test]
    async fn test_warning_surfaces_with_result() {
        let (results, metadata) = process(
            records(1),
            |item| async move {
                Ok(ItemOutcome {
                    value: item.data,
                    warning: Some("validation failed after retries".to_string()),
                })
            },
            1,
        )
        .await;

        assert!(results[0].result.is_some());
        assert!(results[0].error.is_some());
        // A warning still counts the item as failed in the aggregate.
        assert_eq!(metadata.failed, 1);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let in_flight_ref = Arc::clone(&in_flight);
        let peak_ref = Arc::clone(&peak);
        let (results, _) = process(
            records(16),
            move |item| {
                let in_flight = Arc::clone(&in_flight_ref);
                let peak = Arc::clone(&peak_ref);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(ItemOutcome::ok(item.data))
                }
            },
            3,
        )
        .await;

        assert_eq!(results.len(), 16);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let (results, metadata) = process(
            Vec::new(),
            |item| async move { Ok(ItemOutcome::ok(item.data)) },
            5,
        )
        .await;
        assert!(results.is_empty());
        assert_eq!(metadata.total, 0);
        assert_eq!(metadata.failed, 0);
    }
}
