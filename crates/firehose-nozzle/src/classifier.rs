// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Slow consumer detection.
//!
//! Two signals mean the nozzle is falling behind the firehose: the traffic
//! controller closing the socket with a policy violation (trailing), and doppler
//! emitting its dropped-messages counter for our subscription (leading).

use crate::aggregator::Aggregator;
use crate::constants::{
    CLOSE_NORMAL, CLOSE_POLICY_VIOLATION, DROPPED_MESSAGES_MESSAGE, DROPPED_MESSAGES_NAME,
    DROPPED_MESSAGES_ORIGIN, SLOW_CONSUMER_CLOSE_MESSAGE,
};
use crate::envelope::{Envelope, EventKind};
use crate::errors::TransportError;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Expected close, e.g. shutdown or a normal close frame.
    Normal,
    /// The remote end dropped this consumer for being too slow.
    SlowConsumer,
    /// Anything else.
    Abnormal,
}

impl Disposition {
    #[must_use]
    pub fn is_normal(self) -> bool {
        self == Self::Normal
    }
}

#[must_use]
pub fn classify(err: &TransportError) -> Disposition {
    match err {
        TransportError::Shutdown => Disposition::Normal,
        TransportError::Closed { code, .. } if *code == CLOSE_NORMAL => Disposition::Normal,
        TransportError::Closed { code, .. } if *code == CLOSE_POLICY_VIOLATION => {
            Disposition::SlowConsumer
        }
        _ => Disposition::Abnormal,
    }
}

/// Classifies the terminal transport error, logs it and raises the alert when
/// the nozzle was dropped for being slow.
pub fn observe_terminal(err: &TransportError, aggregator: &mut Aggregator) -> Disposition {
    let disposition = classify(err);
    match disposition {
        Disposition::Normal => info!("Firehose connection closed: {err}"),
        Disposition::SlowConsumer => {
            error!("Error while reading from the firehose: {err}");
            error!("{SLOW_CONSUMER_CLOSE_MESSAGE}");
            aggregator.slow_consumer_alert();
        }
        Disposition::Abnormal => error!("Error while reading from the firehose: {err}"),
    }
    disposition
}

/// Whether `envelope` is doppler's counter of messages dropped upstream.
#[must_use]
pub fn is_dropped_messages(envelope: &Envelope) -> bool {
    envelope.kind() == EventKind::CounterEvent
        && envelope.origin == DROPPED_MESSAGES_ORIGIN
        && envelope.metric_name() == Some(DROPPED_MESSAGES_NAME)
}

/// Raises the alert when `envelope` reports upstream drops. Returns whether it did.
pub fn observe_envelope(envelope: &Envelope, aggregator: &mut Aggregator) -> bool {
    if !is_dropped_messages(envelope) {
        return false;
    }
    warn!("{DROPPED_MESSAGES_MESSAGE}");
    aggregator.slow_consumer_alert();
    true
}
