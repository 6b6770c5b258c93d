// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_GROUP_NAME, DEFAULT_REGION, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_RETENTION_DAYS,
};
use crate::error::ConfigError;

/// What the shipper does with a batch the sink did not accept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShipmentFailurePolicy {
    /// Log the failure and discard the batch.
    #[default]
    Drop,
    /// Put the batch back at the head of the buffer for the next tick.
    Requeue,
}

impl FromStr for ShipmentFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "requeue" => Ok(Self::Requeue),
            other => Err(format!("unknown failure policy {other:?}, expected drop or requeue")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub group_name: String,
    /// Stream to write to. A random name is generated on first shipment when unset.
    pub stream_name: Option<String>,
    pub retention_in_days: u32,
    pub flush_interval: Duration,
    pub region: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
    pub failure_policy: ShipmentFailurePolicy,
    /// Context label given to entries read by the agent's stdin producer.
    pub context: String,
    pub log_level: String,
    pub proxy_https: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_name: DEFAULT_GROUP_NAME.to_string(),
            stream_name: None,
            retention_in_days: DEFAULT_RETENTION_DAYS,
            flush_interval: Duration::from_secs(DEFAULT_FLUSH_INTERVAL_SECS),
            region: DEFAULT_REGION.to_string(),
            endpoint: regional_endpoint(DEFAULT_REGION),
            api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            failure_policy: ShipmentFailurePolicy::default(),
            context: "stdin".to_string(),
            log_level: "info".to_string(),
            proxy_https: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let defaults = Config::default();

        let region = non_empty_var("LOGSHIP_REGION").unwrap_or(defaults.region);
        // LOGSHIP_ENDPOINT overrides the regional endpoint, mainly for local
        // emulators and signing proxies.
        let endpoint =
            non_empty_var("LOGSHIP_ENDPOINT").unwrap_or_else(|| regional_endpoint(&region));

        let flush_interval_secs: u64 =
            parse_var("LOGSHIP_FLUSH_INTERVAL_SECS")?.unwrap_or(DEFAULT_FLUSH_INTERVAL_SECS);
        if flush_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                name: "LOGSHIP_FLUSH_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Config {
            group_name: non_empty_var("LOGSHIP_GROUP_NAME").unwrap_or(defaults.group_name),
            stream_name: non_empty_var("LOGSHIP_STREAM_NAME"),
            retention_in_days: parse_var("LOGSHIP_RETENTION_DAYS")?
                .unwrap_or(defaults.retention_in_days),
            flush_interval: Duration::from_secs(flush_interval_secs),
            region,
            endpoint,
            api_key: non_empty_var("LOGSHIP_API_KEY"),
            request_timeout: Duration::from_secs(
                parse_var("LOGSHIP_REQUEST_TIMEOUT_SECS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            failure_policy: parse_var("LOGSHIP_FAILURE_POLICY")?
                .unwrap_or(defaults.failure_policy),
            context: non_empty_var("LOGSHIP_CONTEXT").unwrap_or(defaults.context),
            log_level: non_empty_var("LOGSHIP_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
            proxy_https: non_empty_var("LOGSHIP_PROXY_HTTPS")
                .or_else(|| non_empty_var("HTTPS_PROXY")),
        })
    }
}

fn regional_endpoint(region: &str) -> String {
    format!("https://logs.{region}.amazonaws.com")
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.trim().is_empty())
}

fn parse_var<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name,
                value,
                reason: e.to_string(),
            }),
    }
}
