use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Notify};
use tokio::time::MissedTickBehavior;

use crate::client::ClientInner;
use crate::error::{CallError, RemoteError};
use crate::types::{CorrelationId, Params};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[cfg(feature = "tracing")]
fn trace_warn(message: &'static str) {
    tracing::warn!(message);
}

#[cfg(not(feature = "tracing"))]
fn trace_warn(_message: &'static str) {}

pub(crate) type CallOutcome = Result<Value, CallError>;

/// A call waiting for its batch, FIFO.
pub(crate) struct QueuedCall {
    pub(crate) id: CorrelationId,
    pub(crate) method: String,
    pub(crate) params: Params,
}

/// Pending queue plus correlation table, owned exclusively by the flush
/// path behind one lock. Callers only ever hold the receiving half of
/// their own oneshot channel.
pub(crate) struct BatchQueue {
    pub(crate) pending: VecDeque<QueuedCall>,
    pub(crate) table: HashMap<CorrelationId, oneshot::Sender<CallOutcome>>,
    pub(crate) closed: bool,
}

impl BatchQueue {
    pub(crate) fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            table: HashMap::new(),
            closed: false,
        }
    }
}

/// Periodic flush driver. One batch per tick; a full queue drains over
/// consecutive ticks in submission order. Holding only a `Weak` lets the
/// task die with its client; `shutdown` wakes it out of the tick sleep.
pub(crate) async fn flush_loop(
    inner: Weak<ClientInner>,
    flush_interval: Duration,
    shutdown: Arc<Notify>,
) {
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.notified() => {}
        }

        let Some(inner) = inner.upgrade() else { break };
        if !inner.is_running.load(Ordering::SeqCst) {
            break;
        }

        flush_once(&inner).await;
    }
}

/// Drain up to one batch and execute it. Returns whether anything was
/// flushed, so shutdown can loop until the queue is dry.
pub(crate) async fn flush_once(inner: &ClientInner) -> bool {
    let batch: Vec<QueuedCall> = {
        let mut queue = inner.queue.lock().await;
        let take = queue.pending.len().min(inner.config.batch_size.max(1));
        queue.pending.drain(..take).collect()
    };

    if batch.is_empty() {
        return false;
    }

    let mut params = Params::new();
    params.insert(
        "code".to_string(),
        Value::String(build_execute_code(&batch)),
    );

    metric_inc("gateway.batch.flushed");

    match inner.call_direct("execute", params).await {
        Ok(envelope) => resolve_batch(inner, &batch, envelope).await,
        Err(error) => reject_batch(inner, &batch, error).await,
    }

    true
}

/// Assemble the server-side script: one ordered `[correlation_id, result]`
/// pair per call.
fn build_execute_code(batch: &[QueuedCall]) -> String {
    let mut calls = Vec::with_capacity(batch.len());
    for call in batch {
        let arguments = Value::Object(call.params.clone()).to_string();
        calls.push(format!(
            "[\"{}\",API.{}({})]",
            call.id.as_str(),
            call.method,
            arguments
        ));
    }
    format!("return [{}];", calls.join(","))
}

/// Route each pair back to its caller by correlation ID.
///
/// The platform signals an individual failure with a `false` sentinel and
/// queues the matching errors in `execute_errors`, ordered like the
/// failing items. Consumption is FIFO but defensive: an exhausted error
/// queue resolves the sentinel as-is instead of misattributing, and any
/// drained call the response never answered is rejected rather than left
/// dangling.
async fn resolve_batch(inner: &ClientInner, batch: &[QueuedCall], envelope: Value) {
    let results = envelope
        .get("response")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut errors: VecDeque<Value> = envelope
        .get("execute_errors")
        .and_then(Value::as_array)
        .map(|list| list.iter().cloned().collect())
        .unwrap_or_default();

    let mut queue = inner.queue.lock().await;

    for pair in results {
        let Some(pair) = pair.as_array() else {
            trace_warn("execute response carried a malformed pair");
            continue;
        };
        let (Some(id), Some(result)) = (pair.first().and_then(Value::as_str), pair.get(1))
        else {
            trace_warn("execute response carried a malformed pair");
            continue;
        };

        let Some(tx) = queue.table.remove(&CorrelationId::from(id)) else {
            // Unknown or already-resolved correlation ID.
            continue;
        };

        let outcome = if result == &Value::Bool(false) {
            match errors.pop_front() {
                Some(error) => {
                    metric_inc("gateway.batch.item_error");
                    Err(CallError::Remote(RemoteError::new(error)))
                }
                None => {
                    trace_warn("failure sentinel with exhausted error queue");
                    Ok(Value::Bool(false))
                }
            }
        } else {
            Ok(result.clone())
        };

        let _ = tx.send(outcome);
    }

    for call in batch {
        if let Some(tx) = queue.table.remove(&call.id) {
            metric_inc("gateway.batch.unmatched");
            let _ = tx.send(Err(CallError::Protocol(
                "execute response carried no result for this call".to_string(),
            )));
        }
    }
}

/// The whole batch failed before any per-item attribution was possible:
/// every included call gets the same classified error.
async fn reject_batch(inner: &ClientInner, batch: &[QueuedCall], error: CallError) {
    metric_inc("gateway.batch.rejected");

    let mut queue = inner.queue.lock().await;
    for call in batch {
        if let Some(tx) = queue.table.remove(&call.id) {
            let _ = tx.send(Err(error.clone()));
        }
    }
}
