// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{CLOSE_NO_STATUS, ENVELOPE_CHANNEL_CAPACITY};
use crate::envelope::Envelope;
use crate::errors::TransportError;
use crate::firehose::proto;
use futures_util::StreamExt;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    error::ProtocolError,
    http::{header::AUTHORIZATION, HeaderValue},
    protocol::{frame::CloseFrame, WebSocketConfig},
    Error as WsError, Message as WsMessage,
};
use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const FIREHOSE_PATH: &str = "firehose";
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

type FirehoseStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reads envelopes from the traffic controller's firehose endpoint.
///
/// The consumer runs on its own task. It forwards decoded envelopes in arrival
/// order and reports exactly one terminal error when the connection ends.
#[derive(Debug, Clone)]
pub struct FirehoseConsumer {
    url: String,
    subscription_id: String,
    auth_token: String,
    insecure_skip_verify: bool,
    idle_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl FirehoseConsumer {
    #[must_use]
    pub fn new(url: &str, subscription_id: &str, auth_token: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            subscription_id: subscription_id.to_string(),
            auth_token: auth_token.to_string(),
            insecure_skip_verify: false,
            idle_timeout: None,
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_insecure_skip_verify(mut self, insecure_skip_verify: bool) -> Self {
        self.insecure_skip_verify = insecure_skip_verify;
        self
    }

    /// Reports an idle timeout when no frame arrives for `idle_timeout`. Zero disables it.
    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = (!idle_timeout.is_zero()).then_some(idle_timeout);
        self
    }

    /// Cancelling the token closes the connection and reports
    /// [`TransportError::Shutdown`].
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn firehose_url(&self) -> String {
        format!("{}/{FIREHOSE_PATH}/{}", self.url, self.subscription_id)
    }

    /// Spawns the reader task.
    #[must_use]
    pub fn start(self) -> (mpsc::Receiver<Envelope>, oneshot::Receiver<TransportError>) {
        let (tx, rx) = mpsc::channel(ENVELOPE_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = oneshot::channel();
        tokio::spawn(async move {
            let err = self.consume(tx).await;
            debug!("Firehose consumer stopped: {err}");
            // receiver gone means the event loop already stopped
            let _ = err_tx.send(err);
        });
        (rx, err_rx)
    }

    async fn consume(&self, messages: mpsc::Sender<Envelope>) -> TransportError {
        let mut stream = tokio::select! {
            () = self.shutdown.cancelled() => return TransportError::Shutdown,
            connected = self.connect() => match connected {
                Ok(stream) => stream,
                Err(e) => return e,
            },
        };

        loop {
            let frame = tokio::select! {
                () = self.shutdown.cancelled() => {
                    let _ = stream.close(None).await;
                    return TransportError::Shutdown;
                }
                frame = self.next_frame(&mut stream) => frame,
            };

            let message = match frame {
                Err(e) => return e,
                Ok(None) => return TransportError::ConnectionLost,
                Ok(Some(Err(e))) => return map_ws_error(e),
                Ok(Some(Ok(message))) => message,
            };

            match message {
                WsMessage::Binary(bytes) => match proto::decode(&bytes) {
                    Ok(envelope) => {
                        if messages.send(envelope).await.is_err() {
                            let _ = stream.close(None).await;
                            return TransportError::Shutdown;
                        }
                    }
                    Err(e) => warn!("Failed to decode firehose envelope: {e}"),
                },
                WsMessage::Close(frame) => return closed(frame),
                // pings are answered by tungstenite
                WsMessage::Text(_) | WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
    }

    async fn connect(&self) -> Result<FirehoseStream, TransportError> {
        let url = self.firehose_url();
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        if !self.auth_token.is_empty() {
            let auth = HeaderValue::from_str(&self.auth_token)
                .map_err(|e| TransportError::Connect(format!("invalid auth token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, auth);
        }

        let connector = if self.insecure_skip_verify {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(MAX_FRAME_SIZE);
        config.max_frame_size = Some(MAX_FRAME_SIZE);

        let (stream, response) = connect_async_tls_with_config(request, Some(config), false, connector)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Connected to the firehose at {url}");
        debug!("Firehose handshake status: {}", response.status());
        Ok(stream)
    }

    async fn next_frame(
        &self,
        stream: &mut FirehoseStream,
    ) -> Result<Option<Result<WsMessage, WsError>>, TransportError> {
        match self.idle_timeout {
            Some(idle) => timeout(idle, stream.next())
                .await
                .map_err(|_| TransportError::IdleTimeout(idle)),
            None => Ok(stream.next().await),
        }
    }
}

fn closed(frame: Option<CloseFrame<'_>>) -> TransportError {
    match frame {
        Some(frame) => TransportError::Closed {
            code: u16::from(frame.code),
            reason: frame.reason.to_string(),
        },
        None => TransportError::Closed {
            code: CLOSE_NO_STATUS,
            reason: String::new(),
        },
    }
}

fn map_ws_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::ConnectionLost
        }
        WsError::Io(e)
            if matches!(
                e.kind(),
                ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
            ) =>
        {
            TransportError::ConnectionLost
        }
        other => TransportError::WebSocket(other.to_string()),
    }
}
