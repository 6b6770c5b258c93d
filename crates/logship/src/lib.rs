// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered log shipping to an append-only, sequence-token ordered log sink.
//!
//! ```text
//!   producer ──log()──> LogBuffer ──drain_all()──> Shipper ──put_batch()──> LogSink
//!                                                     │
//!                                                     v
//!                                          ShutdownCoordinator ──> supervisor
//! ```
//!
//! - **[`entry`]**: log entry model and its JSON encoding
//! - **[`buffer`]**: mutex-guarded FIFO of encoded entries
//! - **[`sink`]**: remote sink contract, HTTP and in-memory implementations, and
//!   the [`sink::SinkClient`] that owns the group/stream/token protocol
//! - **[`shipper`]**: the periodic drain-and-ship loop
//! - **[`shutdown`]**: two-phase shutdown state
//! - **[`pipeline`]**: wires the above together behind a [`pipeline::Logger`]
//!   and a [`pipeline::PipelineHandle`]

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod config;
pub mod constants;
pub mod entry;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod shipper;
pub mod shutdown;
pub mod sink;
