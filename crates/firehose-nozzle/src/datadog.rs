// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Datadog series API: wire types and chunk delivery.

use crate::errors::{ClientError, ShippingError};
use crate::metric::Point;
use datadog_fips::reqwest_adapter::create_reqwest_client_builder;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const SERIES_PATH: &str = "series";
const API_KEY_PARAM: &str = "api_key";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Body of one POST to the series endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub metric: String,
    pub points: Vec<Point>,
    #[serde(rename = "type")]
    pub metric_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// Borrowed view of a series, serialized exactly like [`Series`]. Lets the
/// formatter serialize halves of a batch without copying points.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SeriesRef<'a> {
    pub metric: &'a str,
    pub points: &'a [Point],
    #[serde(rename = "type")]
    pub metric_type: &'static str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PayloadRef<'a> {
    pub series: &'a [SeriesRef<'a>],
}

/// Client for the series endpoint of one Datadog API.
#[derive(Debug, Clone)]
pub struct DdApi {
    client: reqwest::Client,
    series_url: Url,
    max_post_bytes: usize,
}

impl DdApi {
    /// Builds the client. A malformed URL is an error so that it surfaces at
    /// startup instead of at the first flush.
    pub fn new(
        api_url: &str,
        api_key: &str,
        timeout: Duration,
        max_post_bytes: usize,
        accept_invalid_certs: bool,
    ) -> Result<Self, ClientError> {
        let series_url = build_series_url(api_url, api_key)?;
        let client = create_reqwest_client_builder(accept_invalid_certs)
            .map_err(|e| ClientError::Build(e.to_string()))?
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            client,
            series_url,
            max_post_bytes,
        })
    }

    #[must_use]
    pub fn max_post_bytes(&self) -> usize {
        self.max_post_bytes
    }

    /// Series URL without the API key, safe to log.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        let mut url = self.series_url.clone();
        url.set_query(None);
        url.to_string()
    }

    /// Posts every chunk in order. Chunks over the size ceiling are dropped.
    /// The first failing chunk aborts the rest; chunks already sent stay sent.
    pub async fn ship_chunks(&self, chunks: Vec<Vec<u8>>) -> Result<(), ShippingError> {
        for chunk in chunks {
            if chunk.len() > self.max_post_bytes {
                info!(
                    "Throwing out data chunk that exceeds {} bytes",
                    self.max_post_bytes
                );
                continue;
            }
            self.ship(chunk).await?;
        }
        Ok(())
    }

    async fn ship(&self, chunk: Vec<u8>) -> Result<(), ShippingError> {
        let size = chunk.len();
        let resp = self
            .client
            .post(self.series_url.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(chunk)
            .send()
            .await
            // the request url carries the api key
            .map_err(reqwest::Error::without_url)?;

        let status = resp.status();
        if status.is_success() {
            debug!("Posted {size} bytes to {}: {status}", self.redacted_url());
            return Ok(());
        }

        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "failed to read body".to_string());
        Err(ShippingError::Destination { status, body })
    }
}

fn build_series_url(api_url: &str, api_key: &str) -> Result<Url, ClientError> {
    let raw = format!("{}/{SERIES_PATH}", api_url.trim_end_matches('/'));
    let mut url = Url::parse(&raw).map_err(|e| ClientError::Url {
        url: api_url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::Url {
            url: api_url.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    url.query_pairs_mut().append_pair(API_KEY_PARAM, api_key);
    Ok(url)
}
