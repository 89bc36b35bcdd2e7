// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::aggregator::Aggregator;
use crate::datadog::DdApi;
use crate::errors::ShippingError;
use crate::formatter::Formatter;
use tracing::{debug, info};

/// Drains the aggregator, formats the batch and ships it.
///
/// Delivery is at most once: the table is gone as soon as it is drained, and
/// `sent` counts the series before the API has accepted them. A failed flush
/// loses its interval.
#[derive(Debug, Clone)]
pub struct Flusher {
    formatter: Formatter,
    dd_api: DdApi,
}

impl Flusher {
    #[must_use]
    pub fn new(formatter: Formatter, dd_api: DdApi) -> Self {
        Flusher { formatter, dd_api }
    }

    pub async fn flush(&self, aggregator: &mut Aggregator) -> Result<(), ShippingError> {
        let counters = aggregator.take_counters();
        let table = aggregator.drain();

        let n_series = Formatter::series_count(&table);
        info!("Posting {n_series} metrics");
        aggregator.record_sent(n_series);

        let chunks = self.formatter.format(&table, counters, now_secs())?;
        debug!(
            "Shipping {} chunk(s) to {}",
            chunks.len(),
            self.dd_api.redacted_url()
        );
        self.dd_api.ship_chunks(chunks).await
    }
}

fn now_secs() -> i64 {
    std::time::UNIX_EPOCH
        .elapsed()
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
        .try_into()
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::datadog::Payload;
    use crate::envelope::Envelope;
    use mockito::{Matcher, Server, ServerGuard};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const PREFIX: &str = "datadog.nozzle.";

    async fn capturing_server(status: usize) -> (ServerGuard, Arc<Mutex<Vec<Vec<u8>>>>) {
        let mut server = Server::new_async().await;
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&bodies);
        server
            .mock("POST", "/series")
            .match_query(Matcher::Any)
            .with_status(status)
            .with_body_from_request(move |request| {
                captured.lock().unwrap().push(request.body().unwrap().clone());
                b"some-response-body".to_vec()
            })
            .create_async()
            .await;
        (server, bodies)
    }

    fn flusher(url: &str, max_post_bytes: usize) -> Flusher {
        let dd_api = DdApi::new(url, "dummykey", Duration::from_secs(1), max_post_bytes, false)
            .expect("failed to create client");
        Flusher::new(
            Formatter::new(PREFIX, max_post_bytes, "dummy-ip", "test-deployment"),
            dd_api,
        )
    }

    fn internal_value(payload: &Payload, name: &str) -> f64 {
        payload
            .series
            .iter()
            .find(|s| s.metric == format!("{PREFIX}{name}"))
            .map(|s| s.points[0].value)
            .expect("internal series present")
    }

    #[tokio::test]
    async fn idle_flushes_report_counters() {
        let (server, bodies) = capturing_server(200).await;
        let flusher = flusher(&server.url(), 10_240);
        let mut aggregator = Aggregator::new();

        flusher.flush(&mut aggregator).await.expect("flush failed");
        flusher.flush(&mut aggregator).await.expect("flush failed");

        let bodies = bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);

        let first: Payload = serde_json::from_slice(&bodies[0]).unwrap();
        assert_eq!(first.series.len(), 3);
        assert_eq!(internal_value(&first, "totalMessagesReceived"), 0.0);
        assert_eq!(internal_value(&first, "totalMetricsSent"), 0.0);

        let second: Payload = serde_json::from_slice(&bodies[1]).unwrap();
        assert_eq!(internal_value(&second, "totalMetricsSent"), 3.0);
    }

    #[tokio::test]
    async fn alert_is_cleared_after_one_batch() {
        let (server, bodies) = capturing_server(200).await;
        let flusher = flusher(&server.url(), 10_240);
        let mut aggregator = Aggregator::new();

        aggregator.slow_consumer_alert();
        flusher.flush(&mut aggregator).await.expect("flush failed");
        flusher.flush(&mut aggregator).await.expect("flush failed");

        let bodies = bodies.lock().unwrap();
        let first: Payload = serde_json::from_slice(&bodies[0]).unwrap();
        let second: Payload = serde_json::from_slice(&bodies[1]).unwrap();
        assert_eq!(internal_value(&first, "slowConsumerAlert"), 1.0);
        assert_eq!(internal_value(&second, "slowConsumerAlert"), 0.0);
    }

    #[tokio::test]
    async fn failed_flush_still_counts_and_discards() {
        let (server, _bodies) = capturing_server(500).await;
        let flusher = flusher(&server.url(), 10_240);
        let mut aggregator = Aggregator::new();
        aggregator.add(&Envelope::value_metric("origin", "m", 1.0, 0));

        let err = flusher.flush(&mut aggregator).await.expect_err("500 must fail");
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("some-response-body"));
        assert!(aggregator.is_empty());
        assert_eq!(aggregator.counters().sent, 4);
    }

    #[tokio::test]
    async fn large_flush_is_posted_in_several_chunks() {
        let (server, bodies) = capturing_server(200).await;
        let flusher = flusher(&server.url(), 1024);
        let mut aggregator = Aggregator::new();
        for i in 0..1000 {
            aggregator.add(
                &Envelope::value_metric("origin", "metricName", 5.0, 1_000_000_000 + i)
                    .with_deployment("deployment-name")
                    .with_job("doppler"),
            );
        }

        flusher.flush(&mut aggregator).await.expect("flush failed");
        assert!(bodies.lock().unwrap().len() > 1);
    }

    #[tokio::test]
    async fn unsplittable_oversized_flush_posts_nothing() {
        let (server, bodies) = capturing_server(200).await;
        let flusher = flusher(&server.url(), 1024);
        let mut aggregator = Aggregator::new();
        aggregator.add(
            &Envelope::value_metric("origin", "some-big-name".repeat(1000), 5.0, 1_000_000_000)
                .with_deployment("deployment-name")
                .with_job("doppler"),
        );

        flusher.flush(&mut aggregator).await.expect("dropping is not an error");
        assert!(bodies.lock().unwrap().is_empty());
    }
}
