// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Firehose credentials from the Cloud Foundry UAA.

use crate::errors::TokenError;
use async_trait::async_trait;
use datadog_fips::reqwest_adapter::create_reqwest_client_builder;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const TOKEN_PATH: &str = "oauth/token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the `Authorization` header value for the firehose.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch_auth_token(&self) -> Result<String, TokenError>;
}

/// Client credentials grant against `{uaa_url}/oauth/token`.
#[derive(Debug, Clone)]
pub struct UaaTokenFetcher {
    client: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
}

impl UaaTokenFetcher {
    pub fn new(
        uaa_url: &str,
        client_id: &str,
        client_secret: &str,
        insecure_skip_verify: bool,
    ) -> Result<Self, TokenError> {
        let client = create_reqwest_client_builder(insecure_skip_verify)
            .map_err(|e| TokenError::Client(e.to_string()))?
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TokenError::Client(e.to_string()))?;

        Ok(Self {
            client,
            token_url: format!("{}/{TOKEN_PATH}", uaa_url.trim_end_matches('/')),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }
}

#[async_trait]
impl TokenFetcher for UaaTokenFetcher {
    async fn fetch_auth_token(&self) -> Result<String, TokenError> {
        debug!("Requesting firehose token from {}", self.token_url);
        let resp = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".to_string());
            return Err(TokenError::Rejected { status, body });
        }

        let token: TokenResponse = resp.json().await?;
        Ok(format!("{} {}", token.token_type, token.access_token))
    }
}

/// Used when access control is disabled: the firehose is reached without an
/// `Authorization` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

#[async_trait]
impl TokenFetcher for NoAuth {
    async fn fetch_auth_token(&self) -> Result<String, TokenError> {
        Ok(String::new())
    }
}
