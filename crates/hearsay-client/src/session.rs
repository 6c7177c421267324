use crate::transport::{HttpTransport, RecognitionTransport};
use hearsay_core::{AudioStream, ClientConfig, InitError, QueryError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type QueryResult = Result<String, QueryError>;

// ── PendingQuery ──────────────────────────────────────────────

/// Handle to one in-flight query. Resolves exactly once.
#[derive(Debug)]
pub struct PendingQuery {
    rx: oneshot::Receiver<QueryResult>,
}

impl PendingQuery {
    /// Wait for the outcome. Resolves to `QueryError::Cancelled` if the
    /// session was closed before the query completed.
    pub async fn wait(self) -> QueryResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Cancelled),
        }
    }
}

// ── Session ───────────────────────────────────────────────────

/// A handle to the recognition service. All methods take `&self`, so one
/// session can serve any number of concurrent queries.
///
/// `close` consumes the session: it cancels whatever is still in flight
/// and suppresses the associated callbacks. Dropping without `close` also
/// cancels, but does not wait for the worker tasks to wind down.
pub struct Session {
    transport: Arc<dyn RecognitionTransport>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    max_retries: u32,
    backoff: Duration,
}

impl Session {
    /// Validate the configuration and set up the HTTP transport.
    pub fn connect(config: &ClientConfig) -> Result<Self, InitError> {
        let transport = HttpTransport::new(&config.service)?;
        tracing::info!(endpoint = %config.service.endpoint, "session ready");
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a session over any transport. Tests use this with scripted
    /// transports; `connect` is the production path.
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn RecognitionTransport>,
    ) -> Self {
        Self {
            transport,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            max_retries: config.service.max_retries,
            backoff: Duration::from_millis(config.service.retry_backoff_ms),
        }
    }

    /// Submit a text utterance. Returns as soon as the query is queued;
    /// the outcome arrives through the returned handle.
    pub fn submit_text_query(&self, text: &str, token: &str) -> Result<PendingQuery, QueryError> {
        if text.trim().is_empty() {
            return Err(QueryError::EmptyText);
        }
        if token.trim().is_empty() {
            return Err(QueryError::EmptyToken);
        }

        let (done_tx, done_rx) = oneshot::channel();
        let transport = Arc::clone(&self.transport);
        let cancel = self.cancel.clone();
        let text = text.to_string();
        let token = token.to_string();
        let max_retries = self.max_retries;
        let backoff = self.backoff;

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    // Dropping done_tx unsent is what suppresses the completion
                    tracing::debug!("text query cancelled");
                }
                result = run_text_attempts(transport.as_ref(), &text, &token, max_retries, backoff) => {
                    if let Err(ref err) = result {
                        tracing::warn!("text query failed: {err}");
                    }
                    let _ = done_tx.send(result);
                }
            }
        });
        self.track(handle);

        Ok(PendingQuery { rx: done_rx })
    }

    /// Submit a spoken utterance. The audio feed is uploaded as it
    /// arrives; the query completes once the feed ends and the service
    /// responds. No retries: the feed is consumed by the attempt.
    pub fn submit_voice_query(
        &self,
        audio: AudioStream,
        token: &str,
    ) -> Result<PendingQuery, QueryError> {
        if token.trim().is_empty() {
            return Err(QueryError::EmptyToken);
        }

        let (done_tx, done_rx) = oneshot::channel();
        let transport = Arc::clone(&self.transport);
        let cancel = self.cancel.clone();
        let token = token.to_string();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("voice query cancelled");
                }
                result = transport.speech(audio, &token) => {
                    if let Err(ref err) = result {
                        tracing::warn!("voice query failed: {err}");
                    }
                    let _ = done_tx.send(result);
                }
            }
        });
        self.track(handle);

        Ok(PendingQuery { rx: done_rx })
    }

    /// Like `submit_text_query`, but delivers the outcome to a callback.
    /// The callback runs at most once, and not at all after `close`.
    pub fn submit_text_query_with<F>(
        &self,
        text: &str,
        token: &str,
        on_complete: F,
    ) -> Result<(), QueryError>
    where
        F: FnOnce(QueryResult) + Send + 'static,
    {
        let pending = self.submit_text_query(text, token)?;
        self.deliver(pending, on_complete);
        Ok(())
    }

    /// Like `submit_voice_query`, but delivers the outcome to a callback.
    pub fn submit_voice_query_with<F>(
        &self,
        audio: AudioStream,
        token: &str,
        on_complete: F,
    ) -> Result<(), QueryError>
    where
        F: FnOnce(QueryResult) + Send + 'static,
    {
        let pending = self.submit_voice_query(audio, token)?;
        self.deliver(pending, on_complete);
        Ok(())
    }

    /// Submit a text utterance and wait for the outcome in one call.
    pub async fn text_query(&self, text: &str, token: &str) -> QueryResult {
        self.submit_text_query(text, token)?.wait().await
    }

    /// Submit a spoken utterance and wait for the outcome in one call.
    pub async fn voice_query(&self, audio: AudioStream, token: &str) -> QueryResult {
        self.submit_voice_query(audio, token)?.wait().await
    }

    fn deliver<F>(&self, pending: PendingQuery, on_complete: F)
    where
        F: FnOnce(QueryResult) + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            // A dropped sender means the session closed first; stay silent
            if let Ok(result) = pending.rx.await {
                on_complete(result);
            }
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    /// Cancel everything still in flight and wait for the worker tasks to
    /// wind down. Callbacks for unfinished queries are never invoked;
    /// their `PendingQuery` handles resolve to `QueryError::Cancelled`.
    pub async fn close(self) {
        self.cancel.cancel();
        let handles = {
            let mut tasks = self.tasks.lock().unwrap();
            std::mem::take(&mut *tasks)
        };
        for handle in handles {
            let _ = handle.await;
        }
        tracing::debug!("session closed");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Cancel without waiting; worker tasks observe the token and exit
        self.cancel.cancel();
    }
}

async fn run_text_attempts(
    transport: &dyn RecognitionTransport,
    text: &str,
    token: &str,
    max_retries: u32,
    backoff: Duration,
) -> QueryResult {
    let mut attempt: u32 = 0;
    let mut delay = backoff;
    loop {
        match transport.message(text, token).await {
            Ok(body) => return Ok(body),
            Err(err) if err.is_transient() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(attempt, "transient failure, retrying in {:?}: {err}", delay);
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}
