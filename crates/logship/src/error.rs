// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors returned by a [`crate::sink::LogSink`] operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Log sink unavailable: {0}")]
    Unavailable(String),

    /// The submitted sequence token is not the one the sink expects next.
    /// `expected` carries the sink's current token when the rejection includes it.
    #[error("Sequence token mismatch (expected: {expected:?})")]
    SequenceTokenMismatch { expected: Option<String> },

    /// The batch was accepted by an earlier call. `expected` is the token for
    /// the next submission.
    #[error("Data already accepted (expected: {expected:?})")]
    DataAlreadyAccepted { expected: Option<String> },

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid response from log sink: {0}")]
    InvalidResponse(String),

    #[error("Request rejected by log sink ({kind}): {message}")]
    Rejected { kind: String, message: String },
}

impl SinkError {
    /// Whether resubmitting the same request later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SinkError::Unavailable(_) | SinkError::SequenceTokenMismatch { .. }
        )
    }
}

/// Failure to bring up the pipeline. The process cannot continue without a
/// destination.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to ensure log group {group} exists: {source}")]
    LogGroup {
        group: String,
        #[source]
        source: SinkError,
    },

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure of a single shipping cycle.
#[derive(Debug, thiserror::Error)]
pub enum ShipmentError {
    #[error("Failed to create log stream: {0}")]
    CreateStream(#[source] SinkError),

    #[error("Failed to put {events} log events: {source}")]
    PutBatch {
        events: usize,
        #[source]
        source: SinkError,
    },
}

impl ShipmentError {
    pub fn is_transient(&self) -> bool {
        match self {
            ShipmentError::CreateStream(source) | ShipmentError::PutBatch { source, .. } => {
                source.is_transient()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}
