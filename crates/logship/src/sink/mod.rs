// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote log sink: groups contain streams, streams hold ordered events.
//!
//! [`LogSink`] is the raw wire contract. [`SinkClient`] layers the protocol the
//! shipper relies on over it: idempotent group provisioning with retention,
//! stream creation with a generated name, and sequence-token handling with a
//! single retry on token mismatch.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entry::LogEvent;
use crate::error::SinkError;

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamDescription {
    pub name: String,
    pub upload_sequence_token: Option<String>,
}

/// Operations exposed by the remote sink.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Lists group names starting with `prefix`.
    async fn describe_log_groups(
        &self,
        prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>, SinkError>;

    async fn create_log_group(&self, group: &str) -> Result<(), SinkError>;

    async fn put_retention_policy(&self, group: &str, retention_in_days: u32)
        -> Result<(), SinkError>;

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), SinkError>;

    /// Lists streams of `group` whose name starts with `prefix`.
    async fn describe_log_streams(
        &self,
        group: &str,
        prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<LogStreamDescription>, SinkError>;

    /// Appends `events` to the stream. Returns the token the next call must supply.
    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<Option<String>, SinkError>;
}

#[derive(Clone)]
pub struct SinkClient {
    sink: Arc<dyn LogSink>,
    retention_in_days: u32,
}

impl std::fmt::Debug for SinkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkClient")
            .field("retention_in_days", &self.retention_in_days)
            .finish_non_exhaustive()
    }
}

impl SinkClient {
    pub fn new(sink: Arc<dyn LogSink>, retention_in_days: u32) -> Self {
        Self {
            sink,
            retention_in_days,
        }
    }

    /// Creates `name` with the configured retention unless it already exists.
    pub async fn ensure_group_exists(&self, name: &str) -> Result<(), SinkError> {
        if self.group_exists(name).await? {
            debug!("SINK | Log group {name} already exists");
            return Ok(());
        }

        match self.sink.create_log_group(name).await {
            Ok(()) => info!("SINK | Created log group {name}"),
            // Lost a race against another creator, the group is there either way.
            Err(SinkError::AlreadyExists(_)) => {
                debug!("SINK | Log group {name} was created concurrently");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.sink
            .put_retention_policy(name, self.retention_in_days)
            .await
    }

    async fn group_exists(&self, name: &str) -> Result<bool, SinkError> {
        let mut next_token = None;
        loop {
            let page = self.sink.describe_log_groups(name, next_token).await?;
            if page.items.iter().any(|group| group == name) {
                return Ok(true);
            }
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(false),
            }
        }
    }

    /// Creates a stream under `group`, named `name` or a fresh UUID.
    /// Returns the name actually used.
    pub async fn create_stream(
        &self,
        group: &str,
        name: Option<&str>,
    ) -> Result<String, SinkError> {
        let name = name.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

        match self.sink.create_log_stream(group, &name).await {
            Ok(()) => info!("SINK | Created log stream {group}/{name}"),
            Err(SinkError::AlreadyExists(_)) => {
                debug!("SINK | Reusing existing log stream {group}/{name}")
            }
            Err(e) => return Err(e),
        }
        Ok(name)
    }

    /// Submits `events` in order and returns the token for the next call.
    ///
    /// On a sequence token mismatch the current token is fetched (from the
    /// rejection when it carries one, otherwise from the stream description)
    /// and the call is retried once.
    pub async fn put_batch(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<Option<String>, SinkError> {
        let first = self
            .sink
            .put_log_events(group, stream, sequence_token, events)
            .await;
        match first {
            Err(SinkError::SequenceTokenMismatch { expected }) => {
                let token = match expected {
                    Some(token) => Some(token),
                    None => self.current_token(group, stream).await?,
                };
                warn!(
                    "SINK | Sequence token mismatch on {group}/{stream}, retrying with {:?}",
                    token
                );
                let retry = self
                    .sink
                    .put_log_events(group, stream, token.as_deref(), events)
                    .await;
                accept_duplicate(retry, group, stream, events.len())
            }
            result => accept_duplicate(result, group, stream, events.len()),
        }
    }

    /// Reads the upload sequence token the sink currently expects for `stream`.
    pub async fn current_token(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<String>, SinkError> {
        let mut next_token = None;
        loop {
            let page = self
                .sink
                .describe_log_streams(group, stream, next_token)
                .await?;
            if let Some(found) = page.items.into_iter().find(|s| s.name == stream) {
                return Ok(found.upload_sequence_token);
            }
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => return Err(SinkError::NotFound(format!("{group}/{stream}"))),
            }
        }
    }
}

/// A batch the sink already holds counts as shipped; the rejection carries
/// the token for the next call.
fn accept_duplicate(
    result: Result<Option<String>, SinkError>,
    group: &str,
    stream: &str,
    events: usize,
) -> Result<Option<String>, SinkError> {
    match result {
        Err(SinkError::DataAlreadyAccepted { expected }) => {
            warn!("SINK | {events} events were already accepted by {group}/{stream}");
            Ok(expected)
        }
        result => result,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::memory::{InMemoryLogSink, Operation};
    use super::*;

    fn client(sink: &Arc<InMemoryLogSink>) -> SinkClient {
        SinkClient::new(Arc::clone(sink) as Arc<dyn LogSink>, 14)
    }

    fn events(messages: &[&str]) -> Vec<LogEvent> {
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| LogEvent::new(1_000 + i as i64, *m))
            .collect()
    }

    #[tokio::test]
    async fn test_ensure_group_exists_creates_with_retention() {
        let sink = Arc::new(InMemoryLogSink::new());
        client(&sink).ensure_group_exists("X").await.unwrap();

        assert!(sink.has_group("X"));
        assert_eq!(sink.retention("X"), Some(14));
    }

    #[tokio::test]
    async fn test_ensure_group_exists_is_idempotent() {
        let sink = Arc::new(InMemoryLogSink::new());
        let client = client(&sink);

        client.ensure_group_exists("X").await.unwrap();
        client.ensure_group_exists("X").await.unwrap();

        assert_eq!(sink.group_names(), vec!["X".to_string()]);
        assert_eq!(sink.call_count(Operation::CreateLogGroup), 1);
        assert_eq!(sink.call_count(Operation::PutRetentionPolicy), 1);
    }

    #[tokio::test]
    async fn test_ensure_group_exists_matches_exact_name() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X-archive");

        client(&sink).ensure_group_exists("X").await.unwrap();

        assert!(sink.has_group("X"));
        assert_eq!(sink.call_count(Operation::CreateLogGroup), 1);
    }

    #[tokio::test]
    async fn test_ensure_group_exists_follows_pagination() {
        let sink = Arc::new(InMemoryLogSink::with_page_size(1));
        sink.add_group("X-1");
        sink.add_group("X-2");
        sink.add_group("X");

        client(&sink).ensure_group_exists("X").await.unwrap();

        assert_eq!(sink.call_count(Operation::CreateLogGroup), 0);
    }

    #[tokio::test]
    async fn test_ensure_group_exists_tolerates_concurrent_creation() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.fail_next(
            Operation::CreateLogGroup,
            SinkError::AlreadyExists("X".to_string()),
        );

        client(&sink).ensure_group_exists("X").await.unwrap();
        assert_eq!(sink.call_count(Operation::PutRetentionPolicy), 0);
    }

    #[tokio::test]
    async fn test_ensure_group_exists_propagates_failure() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.fail_next(
            Operation::DescribeLogGroups,
            SinkError::Unavailable("down".to_string()),
        );

        let result = client(&sink).ensure_group_exists("X").await;
        assert_eq!(result, Err(SinkError::Unavailable("down".to_string())));
        assert!(!sink.has_group("X"));
    }

    #[tokio::test]
    async fn test_create_stream_generates_name() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X");

        let name = client(&sink).create_stream("X", None).await.unwrap();
        assert!(Uuid::parse_str(&name).is_ok());
        assert_eq!(sink.stream_names("X"), vec![name]);
    }

    #[tokio::test]
    async fn test_create_stream_uses_configured_name() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X");

        let name = client(&sink).create_stream("X", Some("nightly")).await.unwrap();
        assert_eq!(name, "nightly");

        // Second creation with the same name reuses the stream.
        let name = client(&sink).create_stream("X", Some("nightly")).await.unwrap();
        assert_eq!(name, "nightly");
        assert_eq!(sink.stream_names("X").len(), 1);
    }

    #[tokio::test]
    async fn test_create_stream_unavailable() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X");
        sink.fail_next(
            Operation::CreateLogStream,
            SinkError::Unavailable("timeout".to_string()),
        );

        let result = client(&sink).create_stream("X", None).await;
        assert!(matches!(result, Err(SinkError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_put_batch_chains_tokens() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X");
        let client = client(&sink);
        let stream = client.create_stream("X", Some("s")).await.unwrap();

        let first = client
            .put_batch("X", &stream, None, &events(&["A"]))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = client
            .put_batch("X", &stream, first.as_deref(), &events(&["B"]))
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(sink.last_supplied_token("X", "s"), first);
        assert_eq!(sink.messages("X", "s"), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_put_batch_retries_once_on_mismatch() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X");
        let client = client(&sink);
        client.create_stream("X", Some("s")).await.unwrap();
        client
            .put_batch("X", "s", None, &events(&["A"]))
            .await
            .unwrap();

        let next = client
            .put_batch("X", "s", Some("stale"), &events(&["B"]))
            .await
            .unwrap();

        assert!(next.is_some());
        assert_eq!(sink.call_count(Operation::PutLogEvents), 3);
        assert_eq!(sink.messages("X", "s"), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_put_batch_refetches_token_when_rejection_has_none() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X");
        let client = client(&sink);
        client.create_stream("X", Some("s")).await.unwrap();
        let token = client
            .put_batch("X", "s", None, &events(&["A"]))
            .await
            .unwrap();

        sink.fail_next(
            Operation::PutLogEvents,
            SinkError::SequenceTokenMismatch { expected: None },
        );
        client
            .put_batch("X", "s", token.as_deref(), &events(&["B"]))
            .await
            .unwrap();

        assert_eq!(sink.call_count(Operation::DescribeLogStreams), 1);
        assert_eq!(sink.messages("X", "s"), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_put_batch_gives_up_after_one_retry() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X");
        let client = client(&sink);
        client.create_stream("X", Some("s")).await.unwrap();

        sink.fail_next(
            Operation::PutLogEvents,
            SinkError::SequenceTokenMismatch {
                expected: Some("1".to_string()),
            },
        );
        sink.fail_next(
            Operation::PutLogEvents,
            SinkError::SequenceTokenMismatch {
                expected: Some("2".to_string()),
            },
        );

        let result = client.put_batch("X", "s", None, &events(&["A"])).await;
        assert!(matches!(
            result,
            Err(SinkError::SequenceTokenMismatch { .. })
        ));
        assert_eq!(sink.call_count(Operation::PutLogEvents), 2);
        assert!(sink.messages("X", "s").is_empty());
    }

    #[tokio::test]
    async fn test_put_batch_already_accepted_returns_expected_token() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X");
        let client = client(&sink);
        client.create_stream("X", Some("s")).await.unwrap();

        sink.fail_next(
            Operation::PutLogEvents,
            SinkError::DataAlreadyAccepted {
                expected: Some("7".to_string()),
            },
        );
        let token = client
            .put_batch("X", "s", None, &events(&["A"]))
            .await
            .unwrap();

        assert_eq!(token, Some("7".to_string()));
        assert_eq!(sink.call_count(Operation::PutLogEvents), 1);
    }

    #[tokio::test]
    async fn test_put_batch_already_accepted_on_retry_returns_expected_token() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X");
        let client = client(&sink);
        client.create_stream("X", Some("s")).await.unwrap();

        sink.fail_next(
            Operation::PutLogEvents,
            SinkError::SequenceTokenMismatch {
                expected: Some("5".to_string()),
            },
        );
        sink.fail_next(
            Operation::PutLogEvents,
            SinkError::DataAlreadyAccepted {
                expected: Some("6".to_string()),
            },
        );
        let token = client
            .put_batch("X", "s", None, &events(&["A"]))
            .await
            .unwrap();

        assert_eq!(token, Some("6".to_string()));
        assert_eq!(sink.call_count(Operation::PutLogEvents), 2);
    }

    #[tokio::test]
    async fn test_current_token_missing_stream() {
        let sink = Arc::new(InMemoryLogSink::new());
        sink.add_group("X");

        let result = client(&sink).current_token("X", "absent").await;
        assert!(matches!(result, Err(SinkError::NotFound(_))));
    }
}
