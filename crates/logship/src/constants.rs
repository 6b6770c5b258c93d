// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Limits and defaults of the log sink's `PutLogEvents` contract.
//!
//! A single call is rejected when it exceeds any of:
//! - [`MAX_BATCH_EVENTS`] events
//! - [`MAX_BATCH_SIZE_BYTES`] bytes, counting [`EVENT_OVERHEAD_BYTES`] per event
//! - [`MAX_EVENT_SIZE_BYTES`] bytes for one event, overhead included

/// Maximum number of events accepted by one `PutLogEvents` call.
pub const MAX_BATCH_EVENTS: usize = 10_000;

/// Maximum size of one `PutLogEvents` call.
///
/// Computed as the sum of all UTF-8 message lengths plus
/// [`EVENT_OVERHEAD_BYTES`] for each event.
pub const MAX_BATCH_SIZE_BYTES: usize = 1_048_576;

/// Fixed per-event cost the sink adds to every message when sizing a batch.
pub const EVENT_OVERHEAD_BYTES: usize = 26;

/// Maximum size of a single event, overhead included. Longer messages are
/// truncated before they are shipped.
pub const MAX_EVENT_SIZE_BYTES: usize = 262_144;

/// Retention applied to a log group the pipeline creates itself.
pub const DEFAULT_RETENTION_DAYS: u32 = 14;

/// Seconds between two shipper ticks.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;

pub const DEFAULT_REGION: &str = "eu-central-1";

pub const DEFAULT_GROUP_NAME: &str = "logship";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
