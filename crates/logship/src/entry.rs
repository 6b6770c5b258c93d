// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log entry model and its wire encoding.
//!
//! An entry is encoded as a single JSON object:
//!
//! ```json
//! {"Kontext":"import","LogContent":{"Error":true,"ErrorString":"row 12 rejected"}}
//! {"Kontext":"import","LogContent":{"Information":"42 rows repaired"}}
//! ```

use serde::{Deserialize, Serialize};

/// Payload of a log entry. Exactly one variant is ever populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "LogContentRepr", try_from = "LogContentRepr")]
pub enum LogContent {
    Error { message: String },
    Information(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum LogContentRepr {
    Error {
        #[serde(rename = "Error")]
        error: bool,
        #[serde(rename = "ErrorString")]
        error_string: String,
    },
    Information {
        #[serde(rename = "Information")]
        information: String,
    },
}

impl From<LogContent> for LogContentRepr {
    fn from(content: LogContent) -> Self {
        match content {
            LogContent::Error { message } => LogContentRepr::Error {
                error: true,
                error_string: message,
            },
            LogContent::Information(information) => LogContentRepr::Information { information },
        }
    }
}

impl TryFrom<LogContentRepr> for LogContent {
    type Error = String;

    fn try_from(repr: LogContentRepr) -> Result<Self, String> {
        match repr {
            LogContentRepr::Error {
                error: true,
                error_string,
            } => Ok(LogContent::Error {
                message: error_string,
            }),
            LogContentRepr::Error { error: false, .. } => {
                Err("error payload must carry \"Error\": true".to_string())
            }
            LogContentRepr::Information { information } => {
                Ok(LogContent::Information(information))
            }
        }
    }
}

/// A single structured log record produced by application code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "Kontext")]
    pub context: String,
    #[serde(rename = "LogContent")]
    pub content: LogContent,
}

impl LogEntry {
    pub fn information(context: impl Into<String>, information: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            content: LogContent::Information(information.into()),
        }
    }

    pub fn error(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            content: LogContent::Error {
                message: message.into(),
            },
        }
    }

    /// Builds the entry for `log(err, context, information)`: the error variant
    /// when an error is supplied, the information variant otherwise.
    pub fn from_parts(
        error: Option<&dyn std::error::Error>,
        context: impl Into<String>,
        information: impl Into<String>,
    ) -> Self {
        match error {
            Some(e) => Self::error(context, e.to_string()),
            None => Self::information(context, information),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.content, LogContent::Error { .. })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// An encoded entry paired with its capture time, as submitted to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
}

impl LogEvent {
    pub fn new(timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("Missing field: 'LastName'")]
    struct MissingField;

    #[test]
    fn test_encode_information() {
        let entry = LogEntry::information("Start Service", "");
        assert_eq!(
            entry.encode().unwrap(),
            r#"{"Kontext":"Start Service","LogContent":{"Information":""}}"#
        );
    }

    #[test]
    fn test_encode_error() {
        let entry = LogEntry::error("Reading service table", "connection refused");
        assert_eq!(
            entry.encode().unwrap(),
            r#"{"Kontext":"Reading service table","LogContent":{"Error":true,"ErrorString":"connection refused"}}"#
        );
    }

    #[test]
    fn test_from_parts_prefers_error() {
        let err = MissingField;
        let entry = LogEntry::from_parts(Some(&err), "user 17", "ignored");
        assert!(entry.is_error());
        assert_eq!(
            entry.content,
            LogContent::Error {
                message: "Missing field: 'LastName'".to_string()
            }
        );

        let entry = LogEntry::from_parts(None, "user 17", "repaired");
        assert!(!entry.is_error());
        assert_eq!(entry.content, LogContent::Information("repaired".to_string()));
    }

    #[test]
    fn test_decode_both_variants() {
        let entry =
            LogEntry::decode(r#"{"Kontext":"a","LogContent":{"Error":true,"ErrorString":"b"}}"#)
                .unwrap();
        assert_eq!(entry, LogEntry::error("a", "b"));

        let entry = LogEntry::decode(r#"{"Kontext":"a","LogContent":{"Information":"c"}}"#).unwrap();
        assert_eq!(entry, LogEntry::information("a", "c"));
    }

    #[test]
    fn test_decode_rejects_error_false() {
        let result =
            LogEntry::decode(r#"{"Kontext":"a","LogContent":{"Error":false,"ErrorString":"b"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_escapes_special_characters() {
        let entry = LogEntry::information("quote \" ctx", "line\nbreak");
        let encoded = entry.encode().unwrap();
        assert!(!encoded.contains('\n'));
        assert_eq!(LogEntry::decode(&encoded).unwrap(), entry);
    }
}
