// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::buffer::LogBuffer;
use crate::config::Config;
use crate::entry::LogEntry;
use crate::error::StartupError;
use crate::shipper::{Shipper, ShipperConfig};
use crate::shutdown::ShutdownCoordinator;
use crate::sink::{LogSink, SinkClient};

/// Producer-side handle. Appending never blocks on the network.
#[derive(Debug, Clone)]
pub struct Logger {
    buffer: Arc<LogBuffer>,
}

impl Logger {
    #[must_use]
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }

    /// Records an entry. With `error` set the entry carries the error's
    /// message and `information` is ignored.
    pub fn log(&self, error: Option<&dyn std::error::Error>, context: &str, information: &str) {
        self.append(&LogEntry::from_parts(error, context, information));
    }

    pub fn info(&self, context: &str, information: &str) {
        self.append(&LogEntry::information(context, information));
    }

    pub fn error(&self, context: &str, error: &dyn std::error::Error) {
        self.append(&LogEntry::error(context, error.to_string()));
    }

    pub fn append(&self, entry: &LogEntry) {
        match entry.encode() {
            Ok(encoded) => self.buffer.append(encoded),
            Err(e) => error!("LOGGER | Failed to encode log entry: {e}"),
        }
    }
}

/// Owns the running shipper task.
#[derive(Debug)]
pub struct PipelineHandle {
    shutdown: ShutdownCoordinator,
    cancel: CancellationToken,
    shipper: JoinHandle<()>,
}

impl PipelineHandle {
    /// Declares that no further entries will be logged.
    pub fn producer_done(&self) {
        self.shutdown.mark_producer_done();
    }

    pub fn shutdown_state(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Resolves once the producer is done and the shipper has observed an
    /// empty buffer.
    pub async fn wait_terminal(&self) {
        self.shutdown.wait_terminal().await;
    }

    /// Marks the producer done, waits until everything buffered has been
    /// handled, then stops the shipper.
    pub async fn finish(self) {
        self.producer_done();
        self.wait_terminal().await;
        self.stop().await;
    }

    /// Stops the shipper after one last flush, without waiting for the
    /// terminal state.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.shipper.await {
            error!("PIPELINE | Shipper task failed: {e}");
        }
        debug!("PIPELINE | Stopped");
    }
}

pub struct Pipeline;

impl Pipeline {
    /// Ensures the log group exists, then spawns the shipper.
    ///
    /// Failing to ensure the group is fatal: no [`Logger`] is handed out.
    pub async fn start(
        config: &Config,
        sink: Arc<dyn LogSink>,
    ) -> Result<(Logger, PipelineHandle), StartupError> {
        let client = SinkClient::new(sink, config.retention_in_days);
        client
            .ensure_group_exists(&config.group_name)
            .await
            .map_err(|source| StartupError::LogGroup {
                group: config.group_name.clone(),
                source,
            })?;

        let buffer = Arc::new(LogBuffer::new());
        let shutdown = ShutdownCoordinator::new();
        let cancel = CancellationToken::new();

        let shipper = Shipper::new(ShipperConfig {
            buffer: Arc::clone(&buffer),
            client,
            shutdown: shutdown.clone(),
            group_name: config.group_name.clone(),
            stream_name: config.stream_name.clone(),
            flush_interval: config.flush_interval,
            failure_policy: config.failure_policy,
        });
        let shipper = tokio::spawn(shipper.run(cancel.clone()));

        info!(
            "PIPELINE | Shipping to log group {} every {:?}",
            config.group_name, config.flush_interval
        );

        Ok((
            Logger::new(buffer),
            PipelineHandle {
                shutdown,
                cancel,
                shipper,
            },
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::sink::memory::{InMemoryLogSink, Operation};
    use std::time::Duration;

    fn config() -> Config {
        Config {
            group_name: "app".to_string(),
            stream_name: Some("s".to_string()),
            flush_interval: Duration::from_millis(10),
            ..Config::default()
        }
    }

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    #[tokio::test]
    async fn test_logger_encodes_entries() {
        let buffer = Arc::new(LogBuffer::new());
        let logger = Logger::new(Arc::clone(&buffer));

        logger.log(None, "ctx", "hello");
        logger.log(Some(&Boom), "ctx", "ignored");
        logger.info("ctx", "world");
        logger.error("ctx", &Boom);

        let messages: Vec<String> = buffer.drain_all().into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages,
            vec![
                r#"{"Kontext":"ctx","LogContent":{"Information":"hello"}}"#,
                r#"{"Kontext":"ctx","LogContent":{"Error":true,"ErrorString":"boom"}}"#,
                r#"{"Kontext":"ctx","LogContent":{"Information":"world"}}"#,
                r#"{"Kontext":"ctx","LogContent":{"Error":true,"ErrorString":"boom"}}"#,
            ]
        );
    }

    #[tokio::test]
    async fn test_start_creates_group_with_retention() {
        let sink = Arc::new(InMemoryLogSink::new());
        let (_logger, handle) = Pipeline::start(&config(), Arc::clone(&sink) as Arc<dyn LogSink>)
            .await
            .unwrap();

        assert!(sink.has_group("app"));
        assert_eq!(sink.retention("app"), Some(14));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_start_fails_when_group_cannot_be_ensured() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.fail_next(
            Operation::DescribeLogGroups,
            SinkError::Unavailable("no route to host".to_string()),
        );

        let result = Pipeline::start(&config(), Arc::clone(&sink) as Arc<dyn LogSink>).await;

        assert!(matches!(result, Err(StartupError::LogGroup { .. })));
        assert_eq!(sink.call_count(Operation::CreateLogGroup), 0);
    }

    #[tokio::test]
    async fn test_finish_ships_everything_logged() {
        let sink = Arc::new(InMemoryLogSink::new());
        let (logger, handle) = Pipeline::start(&config(), Arc::clone(&sink) as Arc<dyn LogSink>)
            .await
            .unwrap();

        logger.info("ctx", "A");
        logger.info("ctx", "B");
        logger.info("ctx", "C");
        tokio::time::timeout(Duration::from_secs(5), handle.finish())
            .await
            .unwrap();

        let shipped: Vec<LogEntry> = sink
            .messages("app", "s")
            .iter()
            .map(|m| LogEntry::decode(m).unwrap())
            .collect();
        assert_eq!(
            shipped,
            vec![
                LogEntry::information("ctx", "A"),
                LogEntry::information("ctx", "B"),
                LogEntry::information("ctx", "C"),
            ]
        );
    }

    #[tokio::test]
    async fn test_finish_with_nothing_logged() {
        let sink = Arc::new(InMemoryLogSink::new());
        let (_logger, handle) = Pipeline::start(&config(), Arc::clone(&sink) as Arc<dyn LogSink>)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.finish())
            .await
            .unwrap();

        assert_eq!(sink.call_count(Operation::CreateLogStream), 0);
        assert_eq!(sink.call_count(Operation::PutLogEvents), 0);
    }
}
