// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory FIFO of encoded log entries waiting to be shipped.
//!
//! One producer appends, one shipper drains. A single mutex guards the whole
//! queue so `append` and `drain_all` never interleave. Nothing here touches
//! the network, so the producer never waits on the sink.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::entry::LogEvent;

#[derive(Debug, Default)]
struct State {
    events: VecDeque<LogEvent>,
    /// Latest timestamp handed out, used to keep timestamps non-decreasing
    /// when the wall clock steps backwards.
    last_timestamp: i64,
}

#[derive(Debug, Default)]
pub struct LogBuffer {
    state: Mutex<State>,
}

impl LogBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an encoded entry stamped with the current time.
    pub fn append(&self, message: String) {
        self.append_at(message, now_millis());
    }

    /// Appends an encoded entry captured at `timestamp` (ms since epoch).
    /// Timestamps earlier than the last appended one are raised to it.
    pub fn append_at(&self, message: String, timestamp: i64) {
        let mut state = self.lock();
        let timestamp = timestamp.max(state.last_timestamp);
        state.last_timestamp = timestamp;
        state.events.push_back(LogEvent { timestamp, message });
    }

    /// Takes every buffered event, oldest first, leaving the buffer empty.
    pub fn drain_all(&self) -> Vec<LogEvent> {
        let mut state = self.lock();
        std::mem::take(&mut state.events).into()
    }

    /// Puts events that could not be shipped back in front of anything
    /// appended since they were drained, preserving their order.
    pub fn requeue_front(&self, events: Vec<LogEvent>) {
        if events.is_empty() {
            return;
        }
        let mut state = self.lock();
        for event in events.into_iter().rev() {
            state.events.push_front(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }
}

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
