// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Serializes a flush's series into size-bounded JSON chunks.
//!
//! A batch that serializes over the ceiling is bisected: every series with
//! more than one point has its points split at the midpoint, and each half is
//! formatted on its own. Recursion stops once no series has more than one
//! point, so a batch of single-point series may still produce one oversized
//! chunk. The delivery stage drops those.

use crate::aggregator::InternalCounters;
use crate::constants::{
    GAUGE_TYPE, SLOW_CONSUMER_ALERT, TOTAL_MESSAGES_RECEIVED, TOTAL_METRICS_SENT,
};
use crate::datadog::{PayloadRef, SeriesRef};
use crate::errors::ShippingError;
use crate::metric::{AggregationTable, Point, SeriesValue};

#[derive(Debug, Clone)]
pub struct Formatter {
    prefix: String,
    max_chunk_bytes: usize,
    /// Tags of the internal series: this process's ip and deployment.
    internal_tags: Vec<String>,
}

impl Formatter {
    #[must_use]
    pub fn new(prefix: &str, max_chunk_bytes: usize, ip: &str, deployment: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            max_chunk_bytes,
            internal_tags: vec![format!("ip:{ip}"), format!("deployment:{deployment}")],
        }
    }

    /// Number of series [`Formatter::format`] emits for `table`.
    #[must_use]
    pub fn series_count(table: &AggregationTable) -> usize {
        table.len() + crate::constants::INTERNAL_SERIES_COUNT
    }

    /// Formats `table` plus the internal series into chunks. Chunks come out
    /// in no particular order; together they hold every point exactly once.
    pub fn format(
        &self,
        table: &AggregationTable,
        counters: InternalCounters,
        timestamp: i64,
    ) -> Result<Vec<Vec<u8>>, ShippingError> {
        let internal = self.internal_series(counters, timestamp);

        let named: Vec<(String, &SeriesValue)> = table
            .iter()
            .map(|(key, value)| (format!("{}{}", self.prefix, key.name), value))
            .chain(
                internal
                    .iter()
                    .map(|(name, value)| (format!("{}{name}", self.prefix), value)),
            )
            .collect();

        let batch: Vec<SeriesRef<'_>> = named
            .iter()
            .map(|(metric, value)| SeriesRef {
                metric,
                points: &value.points,
                metric_type: GAUGE_TYPE,
                tags: &value.tags,
                host: None,
            })
            .collect();

        let mut chunks = Vec::new();
        self.split_into(&batch, &mut chunks)?;
        Ok(chunks)
    }

    fn internal_series(
        &self,
        counters: InternalCounters,
        timestamp: i64,
    ) -> [(&'static str, SeriesValue); 3] {
        #[allow(clippy::cast_precision_loss)]
        let single = |value: u64| SeriesValue {
            tags: self.internal_tags.clone(),
            points: vec![Point::new(timestamp, value as f64)],
        };
        [
            (TOTAL_MESSAGES_RECEIVED, single(counters.received)),
            (TOTAL_METRICS_SENT, single(counters.sent)),
            (
                SLOW_CONSUMER_ALERT,
                single(u64::from(counters.slow_consumer_alert)),
            ),
        ]
    }

    fn split_into(
        &self,
        batch: &[SeriesRef<'_>],
        chunks: &mut Vec<Vec<u8>>,
    ) -> Result<(), ShippingError> {
        if batch.is_empty() {
            return Ok(());
        }

        let bytes = serde_json::to_vec(&PayloadRef { series: batch })
            .map_err(|e| ShippingError::Payload(e.to_string()))?;
        if bytes.len() <= self.max_chunk_bytes || !can_split(batch) {
            chunks.push(bytes);
            return Ok(());
        }

        let (first, second) = split_points(batch);
        self.split_into(&first, chunks)?;
        self.split_into(&second, chunks)
    }
}

fn can_split(batch: &[SeriesRef<'_>]) -> bool {
    batch.iter().any(|series| series.points.len() > 1)
}

/// Splits every series' points at the midpoint. Single-point series go whole
/// into the first half.
fn split_points<'a>(batch: &[SeriesRef<'a>]) -> (Vec<SeriesRef<'a>>, Vec<SeriesRef<'a>>) {
    let mut first = Vec::with_capacity(batch.len());
    let mut second = Vec::with_capacity(batch.len());
    for series in batch {
        let mid = series.points.len() / 2;
        if mid == 0 {
            first.push(series.clone());
            continue;
        }
        let (head, tail) = series.points.split_at(mid);
        first.push(SeriesRef {
            points: head,
            ..series.clone()
        });
        second.push(SeriesRef {
            points: tail,
            ..series.clone()
        });
    }
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datadog::Payload;
    use crate::envelope::EventKind;
    use crate::metric::SeriesKey;
    use proptest::prelude::*;

    const PREFIX: &str = "datadog.nozzle.";

    fn key(name: &str) -> SeriesKey {
        SeriesKey {
            kind: EventKind::ValueMetric,
            name: name.to_string(),
            deployment: "deployment-name".to_string(),
            job: "doppler".to_string(),
            index: String::new(),
            ip: String::new(),
        }
    }

    fn table_with(series: &[(&str, usize)]) -> AggregationTable {
        let mut table = AggregationTable::default();
        for (name, points) in series {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
            let points = (0..*points)
                .map(|i| Point::new(i as i64, i as f64))
                .collect();
            table.insert(
                key(name),
                SeriesValue {
                    tags: vec!["deployment:deployment-name".to_string()],
                    points,
                },
            );
        }
        table
    }

    fn decode(chunks: &[Vec<u8>]) -> Vec<Payload> {
        chunks
            .iter()
            .map(|chunk| serde_json::from_slice(chunk).expect("chunk is valid JSON"))
            .collect()
    }

    fn all_points(chunks: &[Vec<u8>]) -> Vec<(String, i64, u64)> {
        let mut points: Vec<(String, i64, u64)> = decode(chunks)
            .into_iter()
            .flat_map(|payload| payload.series)
            .flat_map(|series| {
                let metric = series.metric;
                series
                    .points
                    .into_iter()
                    .map(move |p| (metric.clone(), p.timestamp, p.value.to_bits()))
            })
            .collect();
        points.sort();
        points
    }

    fn counters(received: u64, sent: u64, alert: bool) -> InternalCounters {
        InternalCounters {
            received,
            sent,
            slow_consumer_alert: alert,
        }
    }

    #[test]
    fn small_batch_is_one_chunk_with_internal_series() {
        let formatter = Formatter::new(PREFIX, 10_240, "dummy-ip", "test-deployment");
        let table = table_with(&[("origin.metricName", 2)]);

        let chunks = formatter
            .format(&table, counters(2, 0, false), 1_700_000_000)
            .expect("format failed");
        assert_eq!(chunks.len(), 1);

        let payload = &decode(&chunks)[0];
        assert_eq!(payload.series.len(), 4);
        for series in &payload.series {
            assert_eq!(series.metric_type, "gauge");
            assert!(series.metric.starts_with(PREFIX));
        }

        let received = payload
            .series
            .iter()
            .find(|s| s.metric == "datadog.nozzle.totalMessagesReceived")
            .expect("received series present");
        assert_eq!(received.points, vec![Point::new(1_700_000_000, 2.0)]);
        assert_eq!(received.tags, vec!["ip:dummy-ip", "deployment:test-deployment"]);
    }

    #[test]
    fn empty_table_still_reports_internal_series() {
        let formatter = Formatter::new(PREFIX, 10_240, "dummy-ip", "test-deployment");
        let chunks = formatter
            .format(&AggregationTable::default(), counters(0, 0, false), 1)
            .expect("format failed");

        let payload = &decode(&chunks)[0];
        assert_eq!(payload.series.len(), 3);
        for series in &payload.series {
            assert_eq!(series.points[0].value, 0.0);
        }
    }

    #[test]
    fn alert_series_reads_one_when_raised() {
        let formatter = Formatter::new(PREFIX, 10_240, "ip", "deployment");
        let chunks = formatter
            .format(&AggregationTable::default(), counters(0, 0, true), 1)
            .expect("format failed");

        let alert = decode(&chunks)[0]
            .series
            .iter()
            .find(|s| s.metric == "datadog.nozzle.slowConsumerAlert")
            .cloned()
            .expect("alert series present");
        assert_eq!(alert.points[0].value, 1.0);
    }

    #[test]
    fn oversized_batch_splits_without_losing_points() {
        let formatter = Formatter::new(PREFIX, 1024, "ip", "deployment");
        let table = table_with(&[("origin.a", 1000), ("origin.b", 7), ("origin.c", 1)]);

        let chunks = formatter
            .format(&table, counters(0, 0, false), 1)
            .expect("format failed");
        assert!(chunks.len() > 1);

        let unsplit = Formatter::new(PREFIX, usize::MAX, "ip", "deployment")
            .format(&table, counters(0, 0, false), 1)
            .expect("format failed");
        assert_eq!(unsplit.len(), 1);
        assert_eq!(all_points(&chunks), all_points(&unsplit));
    }

    #[test]
    fn single_point_series_are_never_split() {
        let formatter = Formatter::new(PREFIX, 1, "ip", "deployment");
        let table = table_with(&[("a", 1)]);

        let chunks = formatter
            .format(&table, counters(0, 0, false), 1)
            .expect("format failed");
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].len() > 1);
    }

    #[test]
    fn split_keeps_identity_and_tags() {
        let points = [Point::new(1, 1.0), Point::new(2, 2.0), Point::new(3, 3.0)];
        let tags = vec!["job:doppler".to_string()];
        let series = SeriesRef {
            metric: "m",
            points: &points,
            metric_type: GAUGE_TYPE,
            tags: &tags,
            host: None,
        };

        let (first, second) = split_points(&[series]);
        assert_eq!(first[0].points, &points[..1]);
        assert_eq!(second[0].points, &points[1..]);
        assert_eq!(second[0].metric, "m");
        assert_eq!(second[0].tags, tags.as_slice());
    }

    proptest! {
        #[test]
        fn splitting_conserves_points(
            sizes in proptest::collection::vec(1usize..200, 1..8),
            max in 64usize..4096,
        ) {
            let names: Vec<String> = (0..sizes.len()).map(|i| format!("origin.m{i}")).collect();
            let layout: Vec<(&str, usize)> = names
                .iter()
                .map(String::as_str)
                .zip(sizes.iter().copied())
                .collect();
            let table = table_with(&layout);

            let chunks = Formatter::new(PREFIX, max, "ip", "deployment")
                .format(&table, counters(0, 0, false), 1)
                .expect("format failed");
            let unsplit = Formatter::new(PREFIX, usize::MAX, "ip", "deployment")
                .format(&table, counters(0, 0, false), 1)
                .expect("format failed");

            prop_assert_eq!(all_points(&chunks), all_points(&unsplit));
        }
    }
}
