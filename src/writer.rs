//! Buffered, batched delivery of log items to a store
//!
//! [`BatchWriter`] owns a single worker task fed through a bounded channel.
//! The worker writes a batch when `batch_size` items are buffered, when the
//! flush interval elapses, on an explicit flush and on close. A batch that
//! still fails after retrying is handed to the failure handler once and then
//! dropped; later batches are attempted as usual.

use async_trait::async_trait;
use log::{debug, trace, warn};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::WriterConfig;
use crate::error::{LogError, Result};
use crate::record::DurableLogItem;
use crate::retry::{RetryConfig, execute_with_retry};
use crate::storage::LogStore;

/// Called with the error of every batch that could not be written
pub type FailureHandler = Arc<dyn Fn(LogError) + Send + Sync>;

/// Interface the collector delivers normalized items through
#[async_trait]
pub trait LogWriter: Send + Sync + 'static {
    /// Buffer an item for writing. May wait for capacity.
    async fn add(&self, item: DurableLogItem, cancel: &CancellationToken) -> Result<()>;

    /// Write everything buffered so far and wait for the attempt to finish
    async fn flush(&self, cancel: &CancellationToken) -> Result<()>;

    /// Flush and stop accepting items
    async fn close(&self) -> Result<()>;
}

enum Command {
    Add(DurableLogItem),
    Flush(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

/// Handle to a background batching worker
pub struct BatchWriter {
    tx: mpsc::Sender<Command>,
}

impl BatchWriter {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn<S: LogStore>(
        store: Arc<S>,
        config: WriterConfig,
        retry: RetryConfig,
        on_failure: FailureHandler,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));

        debug!(
            "Starting batch writer for {} (batch size {}, interval {:?})",
            store.name(),
            config.batch_size,
            config.flush_interval()
        );

        let worker = BatchWorker {
            // batch_size comes from configuration; don't preallocate on its say-so
            buffer: Vec::with_capacity(config.batch_size.min(config.channel_capacity).max(1)),
            store,
            rx,
            config,
            retry,
            on_failure,
        };
        tokio::spawn(worker.run());

        Self { tx }
    }

    /// Send a command carrying an acknowledgement and wait for the worker to answer
    async fn request(
        &self,
        operation: &str,
        make: fn(oneshot::Sender<()>) -> Command,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LogError::Cancelled(operation.to_string())),
            sent = self.tx.send(make(ack_tx)) => sent.map_err(|_| LogError::WriterClosed)?,
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LogError::Cancelled(operation.to_string())),
            ack = ack_rx => ack.map_err(|_| LogError::WriterClosed),
        }
    }
}

#[async_trait]
impl LogWriter for BatchWriter {
    async fn add(&self, item: DurableLogItem, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LogError::Cancelled("add".to_string())),
            sent = self.tx.send(Command::Add(item)) => sent.map_err(|_| LogError::WriterClosed),
        }
    }

    async fn flush(&self, cancel: &CancellationToken) -> Result<()> {
        self.request("flush", Command::Flush, cancel).await
    }

    async fn close(&self) -> Result<()> {
        self.request("close", Command::Close, &CancellationToken::new()).await
    }
}

struct BatchWorker<S: LogStore> {
    store: Arc<S>,
    rx: mpsc::Receiver<Command>,
    buffer: Vec<DurableLogItem>,
    config: WriterConfig,
    retry: RetryConfig,
    on_failure: FailureHandler,
}

impl<S: LogStore> BatchWorker<S> {
    async fn run(mut self) {
        let mut ticker = time::interval(self.config.flush_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(Command::Add(item)) => {
                        self.buffer.push(item);
                        if self.buffer.len() >= self.config.batch_size {
                            self.write_buffered().await;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        self.write_all().await;
                        let _ = ack.send(());
                    }
                    Some(Command::Close(ack)) => {
                        self.drain().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.write_all().await;
                        break;
                    }
                },
                _ = ticker.tick() => self.write_all().await,
            }
        }

        debug!("Batch writer for {} stopped", self.store.name());
    }

    /// Stop intake, then write whatever was already queued
    async fn drain(&mut self) {
        self.rx.close();

        let mut waiting = Vec::new();
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Add(item) => self.buffer.push(item),
                Command::Flush(ack) | Command::Close(ack) => waiting.push(ack),
            }
        }

        self.write_all().await;

        for ack in waiting {
            let _ = ack.send(());
        }
    }

    /// Write up to one batch from the buffer
    async fn write_buffered(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let take = self.buffer.len().min(self.config.batch_size.max(1));
        let batch: Arc<Vec<DurableLogItem>> = Arc::new(self.buffer.drain(..take).collect());
        let store = &self.store;

        let result = execute_with_retry(
            || {
                let store = Arc::clone(store);
                let batch = Arc::clone(&batch);
                async move { store.write_batch(&batch).await }
            },
            &self.retry,
            "write_batch",
        )
        .await;

        match result {
            Ok(written) => trace!("Wrote batch of {} items to {}", written, self.store.name()),
            Err(err) => {
                warn!("Dropping batch of {} items for {}: {}", batch.len(), self.store.name(), err);
                (self.on_failure)(err);
            }
        }
    }

    /// Write the whole buffer, one batch at a time
    async fn write_all(&mut self) {
        while !self.buffer.is_empty() {
            self.write_buffered().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use uuid::Uuid;

    fn item(name: &str) -> DurableLogItem {
        DurableLogItem {
            instance_id: Uuid::new_v4(),
            function_name: name.to_string(),
            start_time: Utc::now(),
            end_time: None,
            trigger_reason: None,
            arguments: BTreeMap::new(),
            error_details: None,
            log_output: None,
            parent_id: None,
        }
    }

    fn config(batch_size: usize) -> WriterConfig {
        WriterConfig {
            batch_size,
            flush_interval_ms: 60_000,
            channel_capacity: 16,
            ..Default::default()
        }
    }

    fn recording_handler() -> (FailureHandler, Arc<Mutex<Vec<String>>>) {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&failures);
        let handler: FailureHandler = Arc::new(move |err: LogError| {
            captured.lock().unwrap().push(err.to_string());
        });
        (handler, failures)
    }

    #[tokio::test]
    async fn test_flush_writes_buffered_items() {
        let store = Arc::new(MemoryStore::new("memory"));
        let (handler, failures) = recording_handler();
        let writer = BatchWriter::spawn(
            Arc::clone(&store),
            config(100),
            RetryConfig::no_retry(),
            handler,
        );
        let cancel = CancellationToken::new();

        writer.add(item("a"), &cancel).await.unwrap();
        writer.add(item("b"), &cancel).await.unwrap();
        assert!(store.is_empty());

        writer.flush(&cancel).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.write_calls(), 1);
        assert!(failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flush_with_nothing_buffered_is_a_no_op() {
        let store = Arc::new(MemoryStore::new("memory"));
        store.fail_with(Some("unreachable")).unwrap();
        let (handler, failures) = recording_handler();
        let writer = BatchWriter::spawn(
            Arc::clone(&store),
            config(100),
            RetryConfig::no_retry(),
            handler,
        );
        let cancel = CancellationToken::new();

        writer.flush(&cancel).await.unwrap();
        writer.flush(&cancel).await.unwrap();

        assert_eq!(store.write_calls(), 0);
        assert!(failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_batch_is_written_without_flush() {
        let store = Arc::new(MemoryStore::new("memory"));
        let (handler, _) = recording_handler();
        let writer =
            BatchWriter::spawn(Arc::clone(&store), config(3), RetryConfig::no_retry(), handler);
        let cancel = CancellationToken::new();

        for name in ["a", "b", "c", "d"] {
            writer.add(item(name), &cancel).await.unwrap();
        }

        // The flush is queued behind every add, so the full batch went out first
        writer.flush(&cancel).await.unwrap();
        assert_eq!(store.write_calls(), 2);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_writes_idle_buffer() {
        let store = Arc::new(MemoryStore::new("memory"));
        let (handler, _) = recording_handler();
        let mut cfg = config(100);
        cfg.flush_interval_ms = 1_000;
        let writer = BatchWriter::spawn(Arc::clone(&store), cfg, RetryConfig::no_retry(), handler);

        writer.add(item("a"), &CancellationToken::new()).await.unwrap();
        time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_reported_once_and_later_batches_attempted() {
        let store = Arc::new(MemoryStore::new("memory"));
        store.fail_with(Some("connection refused")).unwrap();
        let (handler, failures) = recording_handler();
        let writer = BatchWriter::spawn(
            Arc::clone(&store),
            config(100),
            RetryConfig::no_retry(),
            handler,
        );
        let cancel = CancellationToken::new();

        writer.add(item("a"), &cancel).await.unwrap();
        writer.add(item("b"), &cancel).await.unwrap();
        writer.flush(&cancel).await.unwrap();

        {
            let failures = failures.lock().unwrap();
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("connection refused"));
        }

        store.fail_with(None).unwrap();
        writer.add(item("c"), &cancel).await.unwrap();
        writer.flush(&cancel).await.unwrap();

        assert_eq!(failures.lock().unwrap().len(), 1);
        assert_eq!(store.items().unwrap()[0].function_name, "c");
    }

    #[tokio::test]
    async fn test_each_failed_batch_reported_once_after_retries() {
        let store = Arc::new(MemoryStore::new("memory"));
        store.fail_with(Some("down")).unwrap();
        let (handler, failures) = recording_handler();
        let retry = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1,
            backoff_factor: 1.0,
            max_delay_ms: 1,
            jitter: false,
        };
        let writer = BatchWriter::spawn(Arc::clone(&store), config(2), retry, handler);
        let cancel = CancellationToken::new();

        for name in ["a", "b", "c", "d", "e"] {
            writer.add(item(name), &cancel).await.unwrap();
        }
        writer.flush(&cancel).await.unwrap();

        // Batches of 2, 2 and 1, each tried three times
        assert_eq!(store.write_calls(), 9);
        let failures = failures.lock().unwrap();
        assert_eq!(failures.len(), 3);
        for failure in failures.iter() {
            assert!(failure.contains("after 3 attempt(s)"), "{}", failure);
            assert!(failure.contains("down"), "{}", failure);
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_batch_size_does_not_preallocate() {
        let store = Arc::new(MemoryStore::new("memory"));
        let (handler, failures) = recording_handler();
        let writer = BatchWriter::spawn(
            Arc::clone(&store),
            config(usize::MAX),
            RetryConfig::no_retry(),
            handler,
        );
        let cancel = CancellationToken::new();

        writer.add(item("a"), &cancel).await.unwrap();
        writer.add(item("b"), &cancel).await.unwrap();
        writer.flush(&cancel).await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.write_calls(), 1);
        assert!(failures.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_drains_and_rejects_later_calls() {
        let store = Arc::new(MemoryStore::new("memory"));
        let (handler, _) = recording_handler();
        let writer =
            BatchWriter::spawn(Arc::clone(&store), config(2), RetryConfig::no_retry(), handler);
        let cancel = CancellationToken::new();

        for name in ["a", "b", "c", "d", "e"] {
            writer.add(item(name), &cancel).await.unwrap();
        }
        writer.close().await.unwrap();

        assert_eq!(store.len(), 5);
        assert!(matches!(writer.add(item("f"), &cancel).await, Err(LogError::WriterClosed)));
        assert!(matches!(writer.flush(&cancel).await, Err(LogError::WriterClosed)));
    }

    #[tokio::test]
    async fn test_cancelled_token_is_honoured() {
        let store = Arc::new(MemoryStore::new("memory"));
        let (handler, _) = recording_handler();
        let writer = BatchWriter::spawn(
            Arc::clone(&store),
            config(100),
            RetryConfig::no_retry(),
            handler,
        );

        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(writer.add(item("a"), &cancel).await, Err(LogError::Cancelled(_))));
        assert!(matches!(writer.flush(&cancel).await, Err(LogError::Cancelled(_))));
    }
}
