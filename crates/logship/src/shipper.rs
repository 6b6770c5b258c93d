// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The background loop moving buffered entries to the sink.
//!
//! ```text
//!   Idle ──tick──> Draining ──non-empty──> Shipping ──> Idle
//!                     │                                  ^
//!                     └──────────────empty───────────────┘
//! ```
//!
//! Every tick drains the whole buffer. The stream is created on the first
//! non-empty tick and reused afterwards. Each accepted call returns the
//! sequence token the following call has to present. Shutdown eligibility is
//! recomputed at the end of every tick, shipped or not.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::buffer::LogBuffer;
use crate::config::ShipmentFailurePolicy;
use crate::constants::{
    EVENT_OVERHEAD_BYTES, MAX_BATCH_EVENTS, MAX_BATCH_SIZE_BYTES, MAX_EVENT_SIZE_BYTES,
};
use crate::entry::LogEvent;
use crate::error::ShipmentError;
use crate::shutdown::{ShutdownCoordinator, ShutdownState};
use crate::sink::SinkClient;

pub struct ShipperConfig {
    pub buffer: Arc<LogBuffer>,
    pub client: SinkClient,
    pub shutdown: ShutdownCoordinator,
    pub group_name: String,
    /// Name for the stream created on first shipment. Random when unset.
    pub stream_name: Option<String>,
    pub flush_interval: Duration,
    pub failure_policy: ShipmentFailurePolicy,
}

#[derive(Debug)]
pub struct Shipper {
    buffer: Arc<LogBuffer>,
    client: SinkClient,
    shutdown: ShutdownCoordinator,
    group_name: String,
    configured_stream_name: Option<String>,
    /// Set once, by the first successful stream creation.
    stream_name: Option<String>,
    /// Token returned by the last accepted call, presented on the next one.
    sequence_token: Option<String>,
    flush_interval: Duration,
    failure_policy: ShipmentFailurePolicy,
}

impl Shipper {
    #[must_use]
    pub fn new(config: ShipperConfig) -> Self {
        Self {
            buffer: config.buffer,
            client: config.client,
            shutdown: config.shutdown,
            group_name: config.group_name,
            configured_stream_name: config.stream_name,
            stream_name: None,
            sequence_token: None,
            flush_interval: config.flush_interval,
            failure_policy: config.failure_policy,
        }
    }

    pub fn stream_name(&self) -> Option<&str> {
        self.stream_name.as_deref()
    }

    pub fn sequence_token(&self) -> Option<&str> {
        self.sequence_token.as_deref()
    }

    /// Ticks every `flush_interval` until `cancel` fires, then runs one last
    /// tick so entries appended before cancellation still get a chance to ship.
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!("SHIPPER | Started, flushing every {:?}", self.flush_interval);

        let mut flush_interval = interval(self.flush_interval);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = flush_interval.tick() => {
                    if self.tick().await.is_terminal() {
                        debug!("SHIPPER | Producer finished and buffer drained");
                    }
                }
                () = cancel.cancelled() => {
                    self.tick().await;
                    break;
                }
            }
        }

        debug!("SHIPPER | Stopped");
    }

    /// Runs one Draining → Shipping cycle and recomputes shutdown eligibility.
    pub async fn tick(&mut self) -> ShutdownState {
        let events = self.buffer.drain_all();
        if events.is_empty() {
            debug!("SHIPPER | Nothing to ship");
        } else {
            let count = events.len();
            match self.ship(events).await {
                Ok(()) => debug!("SHIPPER | Shipped {count} log events"),
                Err((e, unsent)) => self.handle_failure(&e, unsent),
            }
        }
        self.shutdown.record_cycle(&self.buffer)
    }

    async fn ship(&mut self, events: Vec<LogEvent>) -> Result<(), (ShipmentError, Vec<LogEvent>)> {
        let stream = match &self.stream_name {
            Some(stream) => stream.clone(),
            None => {
                let created = self
                    .client
                    .create_stream(&self.group_name, self.configured_stream_name.as_deref())
                    .await;
                match created {
                    Ok(stream) => {
                        self.stream_name = Some(stream.clone());
                        stream
                    }
                    Err(e) => return Err((ShipmentError::CreateStream(e), events)),
                }
            }
        };

        let mut batches = split_batches(events).into_iter();
        while let Some(batch) = batches.next() {
            let result = self
                .client
                .put_batch(
                    &self.group_name,
                    &stream,
                    self.sequence_token.as_deref(),
                    &batch,
                )
                .await;
            match result {
                Ok(next_token) => self.sequence_token = next_token,
                Err(source) => {
                    let mut unsent = batch;
                    unsent.extend(batches.flatten());
                    return Err((
                        ShipmentError::PutBatch {
                            events: unsent.len(),
                            source,
                        },
                        unsent,
                    ));
                }
            }
        }
        Ok(())
    }

    fn handle_failure(&self, error: &ShipmentError, unsent: Vec<LogEvent>) {
        error!("SHIPPER | {error}");
        match self.failure_policy {
            ShipmentFailurePolicy::Requeue if !error.is_transient() => {
                error!(
                    "SHIPPER | Dropping {} log events rejected by the sink",
                    unsent.len()
                );
            }
            ShipmentFailurePolicy::Drop => {
                error!("SHIPPER | Dropping {} log events", unsent.len());
            }
            ShipmentFailurePolicy::Requeue => {
                warn!(
                    "SHIPPER | Requeueing {} log events for the next flush",
                    unsent.len()
                );
                self.buffer.requeue_front(unsent);
            }
        }
    }
}

/// Splits drained events into consecutive batches that each fit a single
/// `PutLogEvents` call. Oversized messages are truncated first.
pub fn split_batches(events: Vec<LogEvent>) -> Vec<Vec<LogEvent>> {
    let mut batches = Vec::new();
    let mut current: Vec<LogEvent> = Vec::new();
    let mut current_bytes = 0;

    for mut event in events {
        truncate_message(&mut event);
        let size = event.message.len() + EVENT_OVERHEAD_BYTES;
        if !current.is_empty()
            && (current.len() == MAX_BATCH_EVENTS || current_bytes + size > MAX_BATCH_SIZE_BYTES)
        {
            batches.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += size;
        current.push(event);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

fn truncate_message(event: &mut LogEvent) {
    let limit = MAX_EVENT_SIZE_BYTES - EVENT_OVERHEAD_BYTES;
    if event.message.len() <= limit {
        return;
    }
    let mut end = limit;
    while !event.message.is_char_boundary(end) {
        end -= 1;
    }
    warn!(
        "SHIPPER | Truncating log event of {} bytes to {end} bytes",
        event.message.len()
    );
    event.message.truncate(end);
}
