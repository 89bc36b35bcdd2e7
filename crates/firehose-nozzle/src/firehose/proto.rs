// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Loggregator (sonde) envelope wire format.
//!
//! Only the fields the nozzle reads are declared; prost skips the rest.

use crate::envelope::{Envelope, Event, EventKind};
use prost::Message;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EventType {
    HttpStartStop = 4,
    LogMessage = 5,
    ValueMetric = 6,
    CounterEvent = 7,
    Error = 8,
    ContainerMetric = 9,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireEnvelope {
    #[prost(string, required, tag = "1")]
    pub origin: String,
    #[prost(enumeration = "EventType", required, tag = "2")]
    pub event_type: i32,
    #[prost(int64, optional, tag = "6")]
    pub timestamp: Option<i64>,
    #[prost(message, optional, tag = "9")]
    pub value_metric: Option<WireValueMetric>,
    #[prost(message, optional, tag = "10")]
    pub counter_event: Option<WireCounterEvent>,
    #[prost(string, optional, tag = "13")]
    pub deployment: Option<String>,
    #[prost(string, optional, tag = "14")]
    pub job: Option<String>,
    #[prost(string, optional, tag = "15")]
    pub index: Option<String>,
    #[prost(string, optional, tag = "16")]
    pub ip: Option<String>,
    #[prost(map = "string, string", tag = "17")]
    pub tags: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireValueMetric {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(double, required, tag = "2")]
    pub value: f64,
    #[prost(string, required, tag = "3")]
    pub unit: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireCounterEvent {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(uint64, required, tag = "2")]
    pub delta: u64,
    #[prost(uint64, optional, tag = "3")]
    pub total: Option<u64>,
}

/// Decodes one firehose frame. Unknown event types, and numeric events that
/// lack their payload, decode to [`Event::Other`] so they are still counted.
pub fn decode(bytes: &[u8]) -> Result<Envelope, prost::DecodeError> {
    let wire = WireEnvelope::decode(bytes)?;
    Ok(wire.into_envelope())
}

/// Encodes `envelope` the way the traffic controller frames it.
#[must_use]
pub fn encode(envelope: &Envelope) -> Vec<u8> {
    WireEnvelope::from(envelope).encode_to_vec()
}

impl WireEnvelope {
    fn into_envelope(self) -> Envelope {
        let kind = EventKind::from_wire(self.event_type);
        let event = match (kind, self.value_metric, self.counter_event) {
            (EventKind::ValueMetric, Some(metric), _) => Event::ValueMetric {
                name: metric.name,
                value: metric.value,
                unit: metric.unit,
            },
            (EventKind::CounterEvent, _, Some(counter)) => Event::CounterEvent {
                name: counter.name,
                delta: counter.delta,
                total: counter.total.unwrap_or_default(),
            },
            (kind, _, _) => Event::Other(kind),
        };

        Envelope {
            origin: self.origin,
            timestamp: self.timestamp.unwrap_or_default(),
            deployment: self.deployment.unwrap_or_default(),
            job: self.job.unwrap_or_default(),
            index: self.index.unwrap_or_default(),
            ip: self.ip.unwrap_or_default(),
            tags: self.tags.into_iter().collect(),
            event,
        }
    }
}

impl From<&Envelope> for WireEnvelope {
    fn from(envelope: &Envelope) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        let (value_metric, counter_event) = match &envelope.event {
            Event::ValueMetric { name, value, unit } => (
                Some(WireValueMetric {
                    name: name.clone(),
                    value: *value,
                    unit: unit.clone(),
                }),
                None,
            ),
            Event::CounterEvent { name, delta, total } => (
                None,
                Some(WireCounterEvent {
                    name: name.clone(),
                    delta: *delta,
                    total: Some(*total),
                }),
            ),
            Event::Other(_) => (None, None),
        };

        WireEnvelope {
            origin: envelope.origin.clone(),
            event_type: envelope.kind().to_wire(),
            timestamp: Some(envelope.timestamp),
            value_metric,
            counter_event,
            deployment: non_empty(&envelope.deployment),
            job: non_empty(&envelope.job),
            index: non_empty(&envelope.index),
            ip: non_empty(&envelope.ip),
            tags: envelope
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}
