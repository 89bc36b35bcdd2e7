// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_API_TIMEOUT_SECS, DEFAULT_API_URL, DEFAULT_FLUSH_INTERVAL_SECS,
    DEFAULT_FLUSH_MAX_BYTES, DEFAULT_METRIC_PREFIX, DEFAULT_SUBSCRIPTION_ID,
};
use crate::errors::ConfigError;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Nozzle configuration, read from a JSON file whose keys keep their
/// historical capitalization, then overridden by `NOZZLE_*` environment
/// variables.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NozzleConfig {
    #[serde(rename = "UAAURL")]
    pub uaa_url: String,
    #[serde(rename = "Client")]
    pub client: String,
    #[serde(rename = "ClientSecret")]
    pub client_secret: String,
    #[serde(rename = "TrafficControllerURL")]
    pub traffic_controller_url: String,
    #[serde(rename = "FirehoseSubscriptionID")]
    pub firehose_subscription_id: String,
    #[serde(rename = "DataDogURL")]
    pub datadog_url: String,
    #[serde(rename = "DataDogAPIKey")]
    pub datadog_api_key: String,
    #[serde(rename = "DataDogTimeoutSeconds")]
    pub datadog_timeout_seconds: u32,
    #[serde(rename = "FlushDurationSeconds")]
    pub flush_duration_seconds: u32,
    #[serde(rename = "FlushMaxBytes")]
    pub flush_max_bytes: u32,
    #[serde(rename = "InsecureSSLSkipVerify")]
    pub insecure_ssl_skip_verify: bool,
    #[serde(rename = "MetricPrefix")]
    pub metric_prefix: String,
    /// Deployment tag of this nozzle's own series.
    #[serde(rename = "Deployment")]
    pub deployment: String,
    /// Only envelopes from this deployment are forwarded. Empty forwards all.
    #[serde(rename = "DeploymentFilter")]
    pub deployment_filter: String,
    #[serde(rename = "DisableAccessControl")]
    pub disable_access_control: bool,
    /// Zero disables the firehose idle timeout.
    #[serde(rename = "IdleTimeoutSeconds")]
    pub idle_timeout_seconds: u32,
}

impl Default for NozzleConfig {
    fn default() -> Self {
        Self {
            uaa_url: String::new(),
            client: String::new(),
            client_secret: String::new(),
            traffic_controller_url: String::new(),
            firehose_subscription_id: DEFAULT_SUBSCRIPTION_ID.to_string(),
            datadog_url: DEFAULT_API_URL.to_string(),
            datadog_api_key: String::new(),
            datadog_timeout_seconds: DEFAULT_API_TIMEOUT_SECS,
            flush_duration_seconds: DEFAULT_FLUSH_INTERVAL_SECS,
            flush_max_bytes: DEFAULT_FLUSH_MAX_BYTES,
            insecure_ssl_skip_verify: false,
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            deployment: String::new(),
            deployment_filter: String::new(),
            disable_access_control: false,
            idle_timeout_seconds: 0,
        }
    }
}

// Secrets stay out of logs.
impl fmt::Debug for NozzleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NozzleConfig")
            .field("uaa_url", &self.uaa_url)
            .field("client", &self.client)
            .field("client_secret", &"<redacted>")
            .field("traffic_controller_url", &self.traffic_controller_url)
            .field("firehose_subscription_id", &self.firehose_subscription_id)
            .field("datadog_url", &self.datadog_url)
            .field("datadog_api_key", &"<redacted>")
            .field("datadog_timeout_seconds", &self.datadog_timeout_seconds)
            .field("flush_duration_seconds", &self.flush_duration_seconds)
            .field("flush_max_bytes", &self.flush_max_bytes)
            .field("insecure_ssl_skip_verify", &self.insecure_ssl_skip_verify)
            .field("metric_prefix", &self.metric_prefix)
            .field("deployment", &self.deployment)
            .field("deployment_filter", &self.deployment_filter)
            .field("disable_access_control", &self.disable_access_control)
            .field("idle_timeout_seconds", &self.idle_timeout_seconds)
            .finish()
    }
}

impl NozzleConfig {
    /// Reads `path` and applies the process environment on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |name| env::var(name).ok())
    }

    /// Like [`NozzleConfig::load`], with environment lookups going through `lookup`.
    pub fn load_with_env<F>(path: impl AsRef<Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.apply_env_overlay(lookup)?;
        config.apply_defaults();
        Ok(config)
    }

    /// Overrides fields with every non-empty `NOZZLE_*` variable.
    pub fn apply_env_overlay<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        for (name, field) in [
            ("NOZZLE_UAAURL", &mut self.uaa_url),
            ("NOZZLE_CLIENT", &mut self.client),
            ("NOZZLE_CLIENT_SECRET", &mut self.client_secret),
            ("NOZZLE_TRAFFICCONTROLLERURL", &mut self.traffic_controller_url),
            (
                "NOZZLE_FIREHOSESUBSCRIPTIONID",
                &mut self.firehose_subscription_id,
            ),
            ("NOZZLE_DATADOGURL", &mut self.datadog_url),
            ("NOZZLE_DATADOGAPIKEY", &mut self.datadog_api_key),
            ("NOZZLE_METRICPREFIX", &mut self.metric_prefix),
            ("NOZZLE_DEPLOYMENT", &mut self.deployment),
            ("NOZZLE_DEPLOYMENT_FILTER", &mut self.deployment_filter),
        ] {
            if let Some(value) = var(name) {
                *field = value;
            }
        }

        for (name, field) in [
            (
                "NOZZLE_DATADOGTIMEOUTSECONDS",
                &mut self.datadog_timeout_seconds,
            ),
            (
                "NOZZLE_FLUSHDURATIONSECONDS",
                &mut self.flush_duration_seconds,
            ),
            ("NOZZLE_FLUSHMAXBYTES", &mut self.flush_max_bytes),
            ("NOZZLE_IDLETIMEOUTSECONDS", &mut self.idle_timeout_seconds),
        ] {
            if let Some(value) = var(name) {
                *field = value.parse().map_err(|_| ConfigError::Env {
                    name,
                    value,
                    expected: "an unsigned 32-bit integer",
                })?;
            }
        }

        for (name, field) in [
            (
                "NOZZLE_INSECURESSLSKIPVERIFY",
                &mut self.insecure_ssl_skip_verify,
            ),
            (
                "NOZZLE_DISABLEACCESSCONTROL",
                &mut self.disable_access_control,
            ),
        ] {
            if let Some(value) = var(name) {
                *field = parse_bool(&value).ok_or(ConfigError::Env {
                    name,
                    value,
                    expected: "a boolean",
                })?;
            }
        }

        Ok(())
    }

    /// Fills in fields left empty by the file and the environment.
    pub fn apply_defaults(&mut self) {
        if self.metric_prefix.is_empty() {
            self.metric_prefix = DEFAULT_METRIC_PREFIX.to_string();
        }
        if self.firehose_subscription_id.is_empty() {
            self.firehose_subscription_id = DEFAULT_SUBSCRIPTION_ID.to_string();
        }
        if self.datadog_url.is_empty() {
            self.datadog_url = DEFAULT_API_URL.to_string();
        }
        if self.datadog_timeout_seconds == 0 {
            self.datadog_timeout_seconds = DEFAULT_API_TIMEOUT_SECS;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.datadog_api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "DataDogAPIKey cannot be empty".to_string(),
            ));
        }
        if self.traffic_controller_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "TrafficControllerURL cannot be empty".to_string(),
            ));
        }
        if self.flush_duration_seconds == 0 {
            return Err(ConfigError::Invalid(
                "FlushDurationSeconds must be greater than 0".to_string(),
            ));
        }
        if self.flush_max_bytes == 0 {
            return Err(ConfigError::Invalid(
                "FlushMaxBytes must be greater than 0".to_string(),
            ));
        }
        if !self.disable_access_control && self.uaa_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "UAAURL is required unless access control is disabled".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.flush_duration_seconds))
    }

    #[must_use]
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.datadog_timeout_seconds))
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.idle_timeout_seconds))
    }

    #[must_use]
    pub fn max_post_bytes(&self) -> usize {
        usize::try_from(self.flush_max_bytes).unwrap_or(usize::MAX)
    }

    #[must_use]
    pub fn deployment_filter(&self) -> Option<&str> {
        Some(self.deployment_filter.as_str()).filter(|d| !d.is_empty())
    }
}

/// Accepts the literals Go's `strconv.ParseBool` does.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
