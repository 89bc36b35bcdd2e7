// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-interval aggregation of firehose envelopes into series.
//!
//! The aggregator is owned by the event loop and never shared, so none of its
//! state needs a lock. Each flush drains the table and starts a fresh one.

use crate::envelope::Envelope;
use crate::metric::{envelope_tags, AggregationTable, Point, SeriesKey};
use tracing::trace;

/// Process-lifetime health counters reported as internal series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InternalCounters {
    /// Envelopes observed, whatever their kind.
    pub received: u64,
    /// Series handed to the formatter, counted before delivery is confirmed.
    pub sent: u64,
    /// Sticky "falling behind" flag, cleared once reported.
    pub slow_consumer_alert: bool,
}

#[derive(Debug, Default)]
pub struct Aggregator {
    table: AggregationTable,
    counters: InternalCounters,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates one envelope. Envelopes that aren't value metrics or counter
    /// events are counted and otherwise ignored.
    pub fn add(&mut self, envelope: &Envelope) {
        self.counters.received += 1;

        let (Some(key), Some(value)) = (SeriesKey::from_envelope(envelope), envelope.metric_value())
        else {
            trace!("Ignoring {:?} envelope from {}", envelope.kind(), envelope.origin);
            return;
        };

        let series = self.table.entry(key).or_default();
        // Tags follow the latest envelope; only points accumulate.
        series.tags = envelope_tags(envelope);
        series.points.push(Point::new(envelope.timestamp_secs(), value));
    }

    /// Returns the current table and starts an empty one.
    pub fn drain(&mut self) -> AggregationTable {
        std::mem::take(&mut self.table)
    }

    /// Raises the slow consumer alert. Idempotent.
    pub fn slow_consumer_alert(&mut self) {
        self.counters.slow_consumer_alert = true;
    }

    #[must_use]
    pub fn counters(&self) -> InternalCounters {
        self.counters
    }

    /// Snapshot of the counters for the batch being built. The alert is
    /// reported exactly once, so taking the snapshot clears it.
    pub fn take_counters(&mut self) -> InternalCounters {
        let snapshot = self.counters;
        self.counters.slow_consumer_alert = false;
        snapshot
    }

    pub fn record_sent(&mut self, series: usize) {
        self.counters.sent += series as u64;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
