// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process log sink following the same contract as the remote service.
//!
//! Used for tests and dry runs. Streams issue a new sequence token after
//! every accepted call and reject calls that supply any other token. Failures
//! can be queued per operation with [`InMemoryLogSink::fail_next`].

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::{LogSink, LogStreamDescription, Page};
use crate::entry::LogEvent;
use crate::error::SinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DescribeLogGroups,
    CreateLogGroup,
    PutRetentionPolicy,
    CreateLogStream,
    DescribeLogStreams,
    PutLogEvents,
}

#[derive(Debug, Default)]
struct Stream {
    name: String,
    events: Vec<LogEvent>,
    /// Token the next call must supply. `None` until the first accepted call.
    expected_token: Option<String>,
    last_supplied_token: Option<String>,
    issued: u64,
}

#[derive(Debug, Default)]
struct Group {
    name: String,
    retention_in_days: Option<u32>,
    streams: Vec<Stream>,
}

#[derive(Debug, Default)]
struct State {
    // Listed in insertion order.
    groups: Vec<Group>,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, VecDeque<SinkError>>,
}

impl State {
    fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn group_mut(&mut self, name: &str) -> Result<&mut Group, SinkError> {
        self.groups
            .iter_mut()
            .find(|g| g.name == name)
            .ok_or_else(|| SinkError::NotFound(name.to_string()))
    }

    fn stream(&self, group: &str, stream: &str) -> Option<&Stream> {
        self.group(group)?.streams.iter().find(|s| s.name == stream)
    }

    /// Counts the call and pops a queued failure for `operation`, if any.
    fn begin(&mut self, operation: Operation) -> Result<(), SinkError> {
        *self.calls.entry(operation).or_default() += 1;
        match self.failures.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct InMemoryLogSink {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for InMemoryLogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLogSink {
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(50)
    }

    /// Listings return at most `page_size` items per page.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: page_size.max(1),
        }
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }

    /// Makes the next call to `operation` fail with `error`. Queued failures
    /// are consumed in order.
    pub fn fail_next(&self, operation: Operation, error: SinkError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Registers a group without going through the API.
    pub fn add_group(&self, name: &str) {
        let mut state = self.lock();
        if state.group(name).is_none() {
            state.groups.push(Group {
                name: name.to_string(),
                ..Default::default()
            });
        }
    }

    /// Advances a stream's expected token as if another writer had submitted
    /// to it.
    pub fn advance_token(&self, group: &str, stream: &str) {
        let mut state = self.lock();
        if let Ok(group) = state.group_mut(group) {
            if let Some(stream) = group.streams.iter_mut().find(|s| s.name == stream) {
                stream.issued += 1;
                stream.expected_token = Some(stream.issued.to_string());
            }
        }
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or_default()
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.lock().group(name).is_some()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.lock().groups.iter().map(|g| g.name.clone()).collect()
    }

    pub fn retention(&self, group: &str) -> Option<u32> {
        self.lock().group(group).and_then(|g| g.retention_in_days)
    }

    pub fn stream_names(&self, group: &str) -> Vec<String> {
        self.lock()
            .group(group)
            .map(|g| g.streams.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn events(&self, group: &str, stream: &str) -> Vec<LogEvent> {
        self.lock()
            .stream(group, stream)
            .map(|s| s.events.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self, group: &str, stream: &str) -> Vec<String> {
        self.events(group, stream)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    /// Token supplied with the most recent accepted call.
    pub fn last_supplied_token(&self, group: &str, stream: &str) -> Option<String> {
        self.lock()
            .stream(group, stream)
            .and_then(|s| s.last_supplied_token.clone())
    }

    pub fn expected_token(&self, group: &str, stream: &str) -> Option<String> {
        self.lock()
            .stream(group, stream)
            .and_then(|s| s.expected_token.clone())
    }

    fn paginate<T: Clone>(&self, items: &[T], next_token: Option<String>) -> Page<T> {
        let start = next_token
            .and_then(|t| t.parse::<usize>().ok())
            .unwrap_or_default();
        let end = (start + self.page_size).min(items.len());
        Page {
            items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
            next_token: (end < items.len()).then(|| end.to_string()),
        }
    }
}

#[async_trait]
impl LogSink for InMemoryLogSink {
    async fn describe_log_groups(
        &self,
        prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>, SinkError> {
        let names: Vec<String> = {
            let mut state = self.lock();
            state.begin(Operation::DescribeLogGroups)?;
            state
                .groups
                .iter()
                .filter(|g| g.name.starts_with(prefix))
                .map(|g| g.name.clone())
                .collect()
        };
        Ok(self.paginate(&names, next_token))
    }

    async fn create_log_group(&self, group: &str) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.begin(Operation::CreateLogGroup)?;
        if state.group(group).is_some() {
            return Err(SinkError::AlreadyExists(group.to_string()));
        }
        state.groups.push(Group {
            name: group.to_string(),
            ..Default::default()
        });
        Ok(())
    }

    async fn put_retention_policy(
        &self,
        group: &str,
        retention_in_days: u32,
    ) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.begin(Operation::PutRetentionPolicy)?;
        state.group_mut(group)?.retention_in_days = Some(retention_in_days);
        Ok(())
    }

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), SinkError> {
        let mut state = self.lock();
        state.begin(Operation::CreateLogStream)?;
        let group = state.group_mut(group)?;
        if group.streams.iter().any(|s| s.name == stream) {
            return Err(SinkError::AlreadyExists(stream.to_string()));
        }
        group.streams.push(Stream {
            name: stream.to_string(),
            ..Default::default()
        });
        Ok(())
    }

    async fn describe_log_streams(
        &self,
        group: &str,
        prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<LogStreamDescription>, SinkError> {
        let streams: Vec<LogStreamDescription> = {
            let mut state = self.lock();
            state.begin(Operation::DescribeLogStreams)?;
            state
                .group_mut(group)?
                .streams
                .iter()
                .filter(|s| s.name.starts_with(prefix))
                .map(|s| LogStreamDescription {
                    name: s.name.clone(),
                    upload_sequence_token: s.expected_token.clone(),
                })
                .collect()
        };
        Ok(self.paginate(&streams, next_token))
    }

    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<Option<String>, SinkError> {
        let mut state = self.lock();
        state.begin(Operation::PutLogEvents)?;

        if events.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
            return Err(SinkError::Rejected {
                kind: "InvalidParameterException".to_string(),
                message: "Log events in a single PutLogEvents request must be in chronological order".to_string(),
            });
        }

        let target = state
            .group_mut(group)?
            .streams
            .iter_mut()
            .find(|s| s.name == stream)
            .ok_or_else(|| SinkError::NotFound(format!("{group}/{stream}")))?;

        if target.expected_token.as_deref() != sequence_token {
            return Err(SinkError::SequenceTokenMismatch {
                expected: target.expected_token.clone(),
            });
        }

        target.events.extend_from_slice(events);
        target.last_supplied_token = sequence_token.map(str::to_string);
        target.issued += 1;
        target.expected_token = Some(target.issued.to_string());
        Ok(target.expected_token.clone())
    }
}
