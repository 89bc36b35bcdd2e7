// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The nozzle's event loop.
//!
//! A single task owns the aggregator and multiplexes three inputs: the flush
//! ticker, envelopes from the firehose and the firehose's terminal error. Being
//! the only writer and the only reader of the aggregation table is what keeps it
//! lock free. A flush blocks ingestion until the POSTs complete.
//!
//! ```text
//!  Running --terminal error--> Draining --final flush--> Stopped
//!     ^  |
//!     +--+ tick: flush / envelope: add
//! ```

use crate::aggregator::Aggregator;
use crate::classifier;
use crate::envelope::Envelope;
use crate::errors::{NozzleError, TransportError};
use crate::flusher::Flusher;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    /// Terminal flush in progress.
    Draining,
    Stopped,
}

pub struct Nozzle {
    aggregator: Aggregator,
    flusher: Flusher,
    flush_interval: Duration,
    deployment_filter: Option<String>,
    state: State,
}

impl Nozzle {
    #[must_use]
    pub fn new(
        flusher: Flusher,
        flush_interval: Duration,
        deployment_filter: Option<String>,
    ) -> Self {
        Nozzle {
            aggregator: Aggregator::new(),
            flusher,
            flush_interval,
            deployment_filter: deployment_filter.filter(|d| !d.is_empty()),
            state: State::Running,
        }
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state
    }

    #[must_use]
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Runs until the transport reports its terminal error, then flushes one
    /// last time. Returns an error unless the transport closed normally.
    ///
    /// The transport only ever writes to `messages` and `errors`; dropping the
    /// error sender counts as a lost connection.
    pub async fn run(
        &mut self,
        mut messages: mpsc::Receiver<Envelope>,
        mut errors: oneshot::Receiver<TransportError>,
    ) -> Result<(), NozzleError> {
        self.state = State::Running;

        let mut ticker = interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // discard first tick, which is instantaneous

        let mut messages_open = true;
        let terminal = loop {
            tokio::select! {
                _ = ticker.tick() => self.flush().await,
                envelope = messages.recv(), if messages_open => match envelope {
                    Some(envelope) => self.ingest(&envelope),
                    None => {
                        debug!("Firehose message channel closed");
                        messages_open = false;
                    }
                },
                result = &mut errors => {
                    break result.unwrap_or(TransportError::ConnectionLost);
                }
            }
        };

        self.state = State::Draining;
        let disposition = classifier::observe_terminal(&terminal, &mut self.aggregator);

        // Envelopes read before the close are still part of this interval.
        while let Ok(envelope) = messages.try_recv() {
            self.ingest(&envelope);
        }
        self.flush().await;
        self.state = State::Stopped;

        if disposition.is_normal() {
            Ok(())
        } else {
            Err(NozzleError::Transport(terminal))
        }
    }

    fn ingest(&mut self, envelope: &Envelope) {
        if let Some(deployment) = &self.deployment_filter {
            if envelope.deployment != *deployment {
                trace!(
                    "Filtering out envelope from deployment {}",
                    envelope.deployment
                );
                return;
            }
        }
        classifier::observe_envelope(envelope, &mut self.aggregator);
        self.aggregator.add(envelope);
    }

    async fn flush(&mut self) {
        if let Err(e) = self.flusher.flush(&mut self.aggregator).await {
            error!("Failed to flush metrics: {e}");
        }
    }
}
