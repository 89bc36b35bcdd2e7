// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Firehose envelopes as seen by the aggregation core.
//!
//! The firehose carries many kinds of events; only value metrics and counter
//! events carry a number the nozzle forwards. Everything else is kept as a bare
//! [`EventKind`] so it can still be counted as received.

use std::collections::BTreeMap;

/// Kind of event carried by an envelope. Discriminants match the loggregator
/// `Envelope.EventType` protobuf enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    HttpStartStop,
    LogMessage,
    ValueMetric,
    CounterEvent,
    Error,
    ContainerMetric,
    /// An event type this nozzle doesn't know. Still counted as received.
    Unknown(i32),
}

impl EventKind {
    #[must_use]
    pub fn from_wire(value: i32) -> Self {
        match value {
            4 => Self::HttpStartStop,
            5 => Self::LogMessage,
            6 => Self::ValueMetric,
            7 => Self::CounterEvent,
            8 => Self::Error,
            9 => Self::ContainerMetric,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub fn to_wire(self) -> i32 {
        match self {
            Self::HttpStartStop => 4,
            Self::LogMessage => 5,
            Self::ValueMetric => 6,
            Self::CounterEvent => 7,
            Self::Error => 8,
            Self::ContainerMetric => 9,
            Self::Unknown(value) => value,
        }
    }

    /// Whether envelopes of this kind are aggregated into series.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::ValueMetric | Self::CounterEvent)
    }
}

/// Payload of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ValueMetric {
        name: String,
        value: f64,
        unit: String,
    },
    CounterEvent {
        name: String,
        delta: u64,
        total: u64,
    },
    /// Any other kind, or a numeric kind whose payload was missing. Nothing
    /// is forwarded for it.
    Other(EventKind),
}

/// One measurement event received from the firehose. Immutable once received.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub origin: String,
    /// Nanoseconds since the unix epoch.
    pub timestamp: i64,
    pub deployment: String,
    pub job: String,
    pub index: String,
    pub ip: String,
    /// Free-form tags. Ordered so rendered tag lists are stable.
    pub tags: BTreeMap<String, String>,
    pub event: Event,
}

impl Envelope {
    #[must_use]
    pub fn new(origin: impl Into<String>, timestamp: i64, event: Event) -> Self {
        Self {
            origin: origin.into(),
            timestamp,
            deployment: String::new(),
            job: String::new(),
            index: String::new(),
            ip: String::new(),
            tags: BTreeMap::new(),
            event,
        }
    }

    #[must_use]
    pub fn value_metric(
        origin: impl Into<String>,
        name: impl Into<String>,
        value: f64,
        timestamp: i64,
    ) -> Self {
        Self::new(
            origin,
            timestamp,
            Event::ValueMetric {
                name: name.into(),
                value,
                unit: String::new(),
            },
        )
    }

    #[must_use]
    pub fn counter_event(
        origin: impl Into<String>,
        name: impl Into<String>,
        delta: u64,
        total: u64,
        timestamp: i64,
    ) -> Self {
        Self::new(
            origin,
            timestamp,
            Event::CounterEvent {
                name: name.into(),
                delta,
                total,
            },
        )
    }

    #[must_use]
    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = deployment.into();
        self
    }

    #[must_use]
    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = job.into();
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        match &self.event {
            Event::ValueMetric { .. } => EventKind::ValueMetric,
            Event::CounterEvent { .. } => EventKind::CounterEvent,
            Event::Other(kind) => *kind,
        }
    }

    /// Name of the metric carried by a numeric envelope.
    #[must_use]
    pub fn metric_name(&self) -> Option<&str> {
        match &self.event {
            Event::ValueMetric { name, .. } | Event::CounterEvent { name, .. } => Some(name),
            Event::Other(_) => None,
        }
    }

    /// Value forwarded for a numeric envelope: the instantaneous value of a
    /// value metric, the running total of a counter.
    #[must_use]
    pub fn metric_value(&self) -> Option<f64> {
        match &self.event {
            Event::ValueMetric { value, .. } => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Event::CounterEvent { total, .. } => Some(*total as f64),
            Event::Other(_) => None,
        }
    }

    /// Timestamp truncated to whole seconds.
    #[must_use]
    pub fn timestamp_secs(&self) -> i64 {
        self.timestamp / 1_000_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_metric_accessors() {
        let envelope = Envelope::value_metric("origin", "metricName", 5.0, 1_500_000_000);
        assert_eq!(envelope.kind(), EventKind::ValueMetric);
        assert_eq!(envelope.metric_name(), Some("metricName"));
        assert_eq!(envelope.metric_value(), Some(5.0));
        assert_eq!(envelope.timestamp_secs(), 1);
    }

    #[test]
    fn counter_event_forwards_total_not_delta() {
        let envelope = Envelope::counter_event("origin", "counterName", 3, 15, 3_000_000_000);
        assert_eq!(envelope.kind(), EventKind::CounterEvent);
        assert_eq!(envelope.metric_value(), Some(15.0));
    }

    #[test]
    fn other_kinds_carry_no_metric() {
        let envelope = Envelope::new("origin", 0, Event::Other(EventKind::LogMessage));
        assert!(!envelope.kind().is_numeric());
        assert_eq!(envelope.metric_name(), None);
        assert_eq!(envelope.metric_value(), None);
    }

    #[test]
    fn wire_kinds() {
        assert_eq!(EventKind::from_wire(6), EventKind::ValueMetric);
        assert_eq!(EventKind::from_wire(7), EventKind::CounterEvent);
        assert_eq!(EventKind::from_wire(1), EventKind::Unknown(1));
        assert_eq!(EventKind::Unknown(42).to_wire(), 42);
        assert!(!EventKind::Unknown(42).is_numeric());
    }
}
