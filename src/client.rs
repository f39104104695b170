use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::batch::{self, BatchQueue, QueuedCall};
use crate::error::{CallError, RemoteError};
use crate::transport::{HttpTransport, Transport};
use crate::types::{ClientConfig, CorrelationId, Params};

/// Outbound API client for one community.
///
/// `call` enqueues for batched execution through the platform's `execute`
/// meta-method; `call_direct` issues an immediate single request. Cloning
/// is cheap and all clones share one pending queue and one flush task.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) access_token: String,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) queue: Mutex<BatchQueue>,
    pub(crate) is_running: AtomicBool,
    shutdown_notify: Arc<Notify>,
    flush_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ApiClient {
    /// Create a client with the default HTTP transport and spawn its
    /// flush task. Must be called from within a tokio runtime.
    pub fn new(access_token: impl Into<String>, config: ClientConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(&config));
        Self::with_transport(access_token, config, transport)
    }

    /// Create a client over a caller-supplied transport.
    pub fn with_transport(
        access_token: impl Into<String>,
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let flush_interval = config.flush_interval;
        let shutdown_notify = Arc::new(Notify::new());
        let inner = Arc::new(ClientInner {
            config,
            access_token: access_token.into(),
            transport,
            queue: Mutex::new(BatchQueue::new()),
            is_running: AtomicBool::new(true),
            shutdown_notify: shutdown_notify.clone(),
            flush_handle: std::sync::Mutex::new(None),
        });

        let handle = tokio::spawn(batch::flush_loop(
            Arc::downgrade(&inner),
            flush_interval,
            shutdown_notify,
        ));
        if let Ok(mut guard) = inner.flush_handle.lock() {
            *guard = Some(handle);
        }

        Self { inner }
    }

    /// Enqueue a call for batched execution.
    ///
    /// Resolves with the per-call result once its batch has been flushed,
    /// or with a classified error. Submission order is preserved across
    /// batches.
    pub async fn call(
        &self,
        method: impl Into<String>,
        params: Params,
    ) -> Result<Value, CallError> {
        let (tx, rx) = oneshot::channel();
        let id = CorrelationId::generate();

        {
            let mut queue = self.inner.queue.lock().await;
            if queue.closed {
                return Err(CallError::Closed);
            }
            queue.table.insert(id.clone(), tx);
            queue.pending.push_back(QueuedCall {
                id,
                method: method.into(),
                params,
            });
        }

        // The sender side is dropped only when the queue is torn down.
        rx.await.unwrap_or(Err(CallError::Closed))
    }

    /// Issue an immediate single request, bypassing the batch.
    ///
    /// Use this for methods whose responses are too large for `execute`
    /// transport (> 5 MB). Protocol version and access token defaults are
    /// injected; explicit values in `params` always win.
    pub async fn call_direct(
        &self,
        method: &str,
        params: Params,
    ) -> Result<Value, CallError> {
        self.inner.call_direct(method, params).await
    }

    /// Flush the remaining queue to completion, then stop the flush task.
    ///
    /// After shutdown, `call` fails fast with [`CallError::Closed`].
    pub async fn shutdown(&self) {
        self.inner.is_running.store(false, Ordering::SeqCst);
        {
            let mut queue = self.inner.queue.lock().await;
            queue.closed = true;
        }

        while batch::flush_once(&self.inner).await {}

        // Wake the flush task out of its tick sleep so the join below
        // returns promptly. notify_one keeps a permit if the task is
        // mid-flush rather than parked.
        self.inner.shutdown_notify.notify_one();

        let handle = self
            .inner
            .flush_handle
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }
}

impl ClientInner {
    pub(crate) async fn call_direct(
        &self,
        method: &str,
        mut params: Params,
    ) -> Result<Value, CallError> {
        params
            .entry("v")
            .or_insert(Value::String(self.config.api_version.clone()));
        params
            .entry("access_token")
            .or_insert(Value::String(self.access_token.clone()));

        let url = format!(
            "{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            method
        );

        let envelope = self
            .transport
            .post_form(&url, &params)
            .await
            .map_err(CallError::Transport)?;

        if let Some(error) = envelope.get("error") {
            return Err(CallError::Remote(RemoteError::new(error.clone())));
        }

        // The flush loop needs the whole envelope: `response` and any
        // `execute_errors` travel together.
        if method == "execute" {
            return Ok(envelope);
        }

        match envelope.get("response") {
            Some(response) => Ok(response.clone()),
            None => Err(CallError::Protocol(
                "envelope carried neither response nor error".to_string(),
            )),
        }
    }
}
