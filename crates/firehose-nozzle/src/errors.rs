// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::time::Duration;

/// Failure delivering one chunk to the metrics API.
#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("datadog request returned HTTP response: {status}\nResponse Body: {body}")]
    Destination { status: StatusCode, body: String },

    #[error("datadog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to prepare payload: {0}")]
    Payload(String),
}

/// Terminal condition reported by the firehose transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("websocket: close {code} {reason}")]
    Closed { code: u16, reason: String },

    #[error("read from the firehose failed: i/o timeout after {0:?} without a message")]
    IdleTimeout(Duration),

    #[error("firehose connection lost without a close frame")]
    ConnectionLost,

    #[error("failed to connect to the firehose: {0}")]
    Connect(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("firehose consumer shut down")]
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("failed to build UAA client: {0}")]
    Client(String),

    #[error("UAA token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("UAA rejected the token request: {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Can not read config file [{path}]: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Can not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value {value:?} for {name}: expected {expected}")]
    Env {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failure building an HTTP client for the metrics API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid metrics API URL {url}: {reason}")]
    Url { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// Why the event loop stopped abnormally.
#[derive(Debug, thiserror::Error)]
pub enum NozzleError {
    #[error("Error while reading from the firehose: {0}")]
    Transport(#[from] TransportError),
}
