// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`LogSink`] over the log service's JSON 1.1 HTTP protocol.
//!
//! Every operation is a `POST /` with the operation named in the
//! `X-Amz-Target` header:
//!
//! ```text
//! POST / HTTP/1.1
//! Content-Type: application/x-amz-json-1.1
//! X-Amz-Target: Logs_20140328.PutLogEvents
//!
//! {"logGroupName":"app","logStreamName":"…","sequenceToken":"…","logEvents":[…]}
//! ```
//!
//! Error replies carry a `__type` naming the exception, which is mapped onto
//! [`SinkError`]. Request signing is not performed here; deployments that
//! need it place a signing proxy in front and authenticate to it with the
//! optional API key.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{LogSink, LogStreamDescription, Page};
use crate::config::Config;
use crate::entry::LogEvent;
use crate::error::{SinkError, StartupError};

const TARGET_PREFIX: &str = "Logs_20140328";
const CONTENT_TYPE_JSON_1_1: &str = "application/x-amz-json-1.1";
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub proxy_https: Option<String>,
}

impl From<&Config> for HttpSinkConfig {
    fn from(config: &Config) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            timeout: config.request_timeout,
            proxy_https: config.proxy_https.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpLogSink {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl HttpLogSink {
    pub fn new(config: HttpSinkConfig) -> Result<Self, StartupError> {
        let client = get_client(&config);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON_1_1));
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(api_key)
                .map_err(|e| StartupError::HttpClient(format!("invalid API key: {e}")))?;
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(Self {
            client,
            endpoint: config.endpoint,
            headers,
        })
    }

    async fn call<Req, Resp>(&self, operation: &str, body: &Req) -> Result<Resp, SinkError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| SinkError::InvalidResponse(format!("failed to encode request: {e}")))?;

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{operation}"))
            .body(payload)
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(format!("{operation}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SinkError::Unavailable(format!("{operation}: {e}")))?;

        if status.is_success() {
            let text = if text.trim().is_empty() { "{}" } else { &text };
            return serde_json::from_str(text).map_err(|e| {
                SinkError::InvalidResponse(format!("{operation}: {e}"))
            });
        }

        let error = map_error(status, &text);
        debug!("SINK | {operation} failed with {status}: {error}");
        Err(error)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogGroupsRequest<'a> {
    log_group_name_prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogGroupsResponse {
    #[serde(default)]
    log_groups: Vec<LogGroupItem>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogGroupItem {
    log_group_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogGroupRequest<'a> {
    log_group_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutRetentionPolicyRequest<'a> {
    log_group_name: &'a str,
    retention_in_days: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name_prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsResponse {
    #[serde(default)]
    log_streams: Vec<LogStreamItem>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogStreamItem {
    log_stream_name: String,
    upload_sequence_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
    log_events: &'a [LogEvent],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsResponse {
    next_sequence_token: Option<String>,
    rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

// Only read through its Debug output.
#[allow(dead_code)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectedLogEventsInfo {
    too_new_log_event_start_index: Option<usize>,
    too_old_log_event_end_index: Option<usize>,
    expired_log_event_end_index: Option<usize>,
}

#[derive(Deserialize)]
struct Empty {}

#[derive(Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    kind: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
    #[serde(rename = "expectedSequenceToken")]
    expected_sequence_token: Option<String>,
}

fn map_error(status: reqwest::StatusCode, body: &str) -> SinkError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    // `__type` may be namespaced, e.g. "com.amazonaws.logs#ResourceNotFoundException".
    let kind = parsed
        .kind
        .as_deref()
        .map(|k| k.rsplit('#').next().unwrap_or(k).to_string());
    let message = parsed.message.unwrap_or_else(|| body.to_string());

    match kind.as_deref() {
        Some("InvalidSequenceTokenException") => SinkError::SequenceTokenMismatch {
            expected: parsed.expected_sequence_token,
        },
        Some("DataAlreadyAcceptedException") => SinkError::DataAlreadyAccepted {
            expected: parsed.expected_sequence_token,
        },
        Some("ResourceAlreadyExistsException") => SinkError::AlreadyExists(message),
        Some("ResourceNotFoundException") => SinkError::NotFound(message),
        Some("ServiceUnavailableException" | "ThrottlingException") => {
            SinkError::Unavailable(message)
        }
        _ if status.is_server_error() => SinkError::Unavailable(format!("{status}: {message}")),
        Some(kind) => SinkError::Rejected {
            kind: kind.to_string(),
            message,
        },
        None => SinkError::Rejected {
            kind: status.to_string(),
            message,
        },
    }
}

#[async_trait]
impl LogSink for HttpLogSink {
    async fn describe_log_groups(
        &self,
        prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<String>, SinkError> {
        let response: DescribeLogGroupsResponse = self
            .call(
                "DescribeLogGroups",
                &DescribeLogGroupsRequest {
                    log_group_name_prefix: prefix,
                    next_token,
                },
            )
            .await?;
        Ok(Page {
            items: response
                .log_groups
                .into_iter()
                .map(|g| g.log_group_name)
                .collect(),
            next_token: response.next_token,
        })
    }

    async fn create_log_group(&self, group: &str) -> Result<(), SinkError> {
        let _: Empty = self
            .call(
                "CreateLogGroup",
                &CreateLogGroupRequest {
                    log_group_name: group,
                },
            )
            .await?;
        Ok(())
    }

    async fn put_retention_policy(
        &self,
        group: &str,
        retention_in_days: u32,
    ) -> Result<(), SinkError> {
        let _: Empty = self
            .call(
                "PutRetentionPolicy",
                &PutRetentionPolicyRequest {
                    log_group_name: group,
                    retention_in_days,
                },
            )
            .await?;
        Ok(())
    }

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), SinkError> {
        let _: Empty = self
            .call(
                "CreateLogStream",
                &CreateLogStreamRequest {
                    log_group_name: group,
                    log_stream_name: stream,
                },
            )
            .await?;
        Ok(())
    }

    async fn describe_log_streams(
        &self,
        group: &str,
        prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<LogStreamDescription>, SinkError> {
        let response: DescribeLogStreamsResponse = self
            .call(
                "DescribeLogStreams",
                &DescribeLogStreamsRequest {
                    log_group_name: group,
                    log_stream_name_prefix: prefix,
                    next_token,
                },
            )
            .await?;
        Ok(Page {
            items: response
                .log_streams
                .into_iter()
                .map(|s| LogStreamDescription {
                    name: s.log_stream_name,
                    upload_sequence_token: s.upload_sequence_token,
                })
                .collect(),
            next_token: response.next_token,
        })
    }

    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<&str>,
        events: &[LogEvent],
    ) -> Result<Option<String>, SinkError> {
        let response: PutLogEventsResponse = self
            .call(
                "PutLogEvents",
                &PutLogEventsRequest {
                    log_group_name: group,
                    log_stream_name: stream,
                    sequence_token,
                    log_events: events,
                },
            )
            .await?;
        if let Some(rejected) = response.rejected_log_events_info {
            warn!("SINK | Some log events were rejected by {group}/{stream}: {rejected:?}");
        }
        Ok(response.next_sequence_token)
    }
}

/// Builds the HTTP client, falling back to a direct connection when the
/// proxy configuration cannot be used.
#[must_use]
pub fn get_client(config: &HttpSinkConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!("SINK | Unable to parse proxy configuration: {e}, falling back to direct connection");
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!("SINK | Failed to build HTTP client: {inner}, using reqwest defaults");
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &HttpSinkConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(config.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.proxy_https {
            client = client.proxy(reqwest::Proxy::https(https_uri.clone())?);
        }
    }

    Ok(client.build()?)
}
