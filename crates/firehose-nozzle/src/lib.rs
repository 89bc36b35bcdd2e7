// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cloud Foundry firehose to Datadog bridge.
//!
//! Envelopes read from the loggregator firehose are aggregated per series for one
//! flush interval, formatted into size-bounded JSON batches and posted to the
//! Datadog series API. The nozzle reports its own health (messages received,
//! metrics sent, slow consumer alert) alongside the forwarded data.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod classifier;
pub mod config;
pub mod constants;
pub mod datadog;
pub mod envelope;
pub mod errors;
pub mod firehose;
pub mod flusher;
pub mod formatter;
pub mod metric;
pub mod nozzle;
pub mod uaa;
pub mod util;
