// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Loggregator firehose transport.

mod consumer;
pub mod proto;

pub use consumer::FirehoseConsumer;
