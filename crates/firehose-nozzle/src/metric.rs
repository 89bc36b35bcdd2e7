// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::envelope::{Envelope, EventKind};
use serde::{Deserialize, Serialize};

/// One sample of a series. Serialized as a two element array
/// `[unix_seconds, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(i64, f64)", into = "(i64, f64)")]
pub struct Point {
    pub timestamp: i64,
    pub value: f64,
}

impl Point {
    #[must_use]
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl From<(i64, f64)> for Point {
    fn from((timestamp, value): (i64, f64)) -> Self {
        Self { timestamp, value }
    }
}

impl From<Point> for (i64, f64) {
    fn from(point: Point) -> Self {
        (point.timestamp, point.value)
    }
}

/// Identity of one series within a flush interval. Exact match only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub kind: EventKind,
    /// `<origin>.<name>`, without the configured prefix.
    pub name: String,
    pub deployment: String,
    pub job: String,
    pub index: String,
    pub ip: String,
}

impl SeriesKey {
    /// Key of a numeric envelope, `None` for any other kind.
    #[must_use]
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        let name = envelope.metric_name()?;
        Some(Self {
            kind: envelope.kind(),
            name: format!("{}.{}", envelope.origin, name),
            deployment: envelope.deployment.clone(),
            job: envelope.job.clone(),
            index: envelope.index.clone(),
            ip: envelope.ip.clone(),
        })
    }
}

/// Accumulated state of one series: points in arrival order and the tags of
/// the most recent envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesValue {
    pub tags: Vec<String>,
    pub points: Vec<Point>,
}

pub type AggregationTable = hashbrown::HashMap<SeriesKey, SeriesValue, fnv::FnvBuildHasher>;

/// Renders the well-known dimensions followed by the free-form tags as
/// `key:value` strings. Empty values are skipped.
#[must_use]
pub fn envelope_tags(envelope: &Envelope) -> Vec<String> {
    let dimensions = [
        ("deployment", envelope.deployment.as_str()),
        ("job", envelope.job.as_str()),
        ("index", envelope.index.as_str()),
        ("ip", envelope.ip.as_str()),
    ];
    dimensions
        .into_iter()
        .chain(
            envelope
                .tags
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str())),
        )
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key}:{value}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_serializes_as_pair() {
        let json = serde_json::to_string(&Point::new(1, 5.5)).expect("serialize failed");
        assert_eq!(json, "[1,5.5]");

        let point: Point = serde_json::from_str("[2, 76]").expect("deserialize failed");
        assert_eq!(point, Point::new(2, 76.0));
    }

    #[test]
    fn key_qualifies_name_with_origin() {
        let envelope = Envelope::value_metric("gorouter", "latency", 1.0, 0).with_job("router");
        let key = SeriesKey::from_envelope(&envelope).expect("numeric envelope has a key");
        assert_eq!(key.name, "gorouter.latency");
        assert_eq!(key.job, "router");
        assert_eq!(key.kind, EventKind::ValueMetric);
    }

    #[test]
    fn tags_render_dimensions_then_free_form() {
        let envelope = Envelope::value_metric("origin", "m", 1.0, 0)
            .with_deployment("deployment-name")
            .with_job("doppler")
            .with_index("1")
            .with_ip("10.0.1.2")
            .with_tag("protocol", "http")
            .with_tag("empty", "");

        assert_eq!(
            envelope_tags(&envelope),
            vec![
                "deployment:deployment-name",
                "job:doppler",
                "index:1",
                "ip:10.0.1.2",
                "protocol:http",
            ]
        );
    }

    #[test]
    fn tags_skip_missing_dimensions() {
        let envelope = Envelope::value_metric("origin", "m", 1.0, 0).with_job("doppler");
        assert_eq!(envelope_tags(&envelope), vec!["job:doppler"]);
    }
}
