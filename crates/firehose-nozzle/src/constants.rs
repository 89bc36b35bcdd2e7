// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Default base URL of the Datadog metrics API.
pub const DEFAULT_API_URL: &str = "https://app.datadoghq.com/api/v1";

/// Prefix prepended to every series name when none is configured.
pub const DEFAULT_METRIC_PREFIX: &str = "cloudfoundry.nozzle.";

pub const DEFAULT_SUBSCRIPTION_ID: &str = "datadog-nozzle";

pub const DEFAULT_FLUSH_INTERVAL_SECS: u32 = 15;

pub const DEFAULT_FLUSH_MAX_BYTES: u32 = 57_671_680;

pub const DEFAULT_API_TIMEOUT_SECS: u32 = 5;

/// Series type sent for every series, counters included.
pub const GAUGE_TYPE: &str = "gauge";

pub const TOTAL_MESSAGES_RECEIVED: &str = "totalMessagesReceived";
pub const TOTAL_METRICS_SENT: &str = "totalMetricsSent";
pub const SLOW_CONSUMER_ALERT: &str = "slowConsumerAlert";

/// Number of synthetic series appended to every batch.
pub const INTERNAL_SERIES_COUNT: usize = 3;

/// Origin of the envelope doppler emits when it drops messages for a slow subscriber.
pub const DROPPED_MESSAGES_ORIGIN: &str = "doppler";
pub const DROPPED_MESSAGES_NAME: &str = "TruncatingBuffer.DroppedMessages";

/// Websocket close code for a normal closure (RFC 6455 section 7.4.1).
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code the traffic controller uses when it drops a consumer that stopped
/// answering keep-alive pings, i.e. one that can't keep up.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Reserved code reported when a close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Capacity of the channel between the firehose reader and the event loop.
pub const ENVELOPE_CHANNEL_CAPACITY: usize = 1024;

pub const SLOW_CONSUMER_CLOSE_MESSAGE: &str =
    "Disconnected because nozzle couldn't keep up. Please try scaling up the nozzle.";

pub const DROPPED_MESSAGES_MESSAGE: &str = "We've intercepted an upstream message which indicates that the nozzle or the TrafficController is not keeping up. Please try scaling up the nozzle.";
