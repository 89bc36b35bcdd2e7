// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use clap::Parser;
use std::{env, error::Error, path::PathBuf, process::ExitCode};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use firehose_nozzle::{
    config::NozzleConfig,
    datadog::DdApi,
    firehose::FirehoseConsumer,
    flusher::Flusher,
    formatter::Formatter,
    nozzle::Nozzle,
    uaa::{NoAuth, TokenFetcher, UaaTokenFetcher},
    util::local_ip,
};

const DEFAULT_CONFIG_PATH: &str = "config/datadog-firehose-nozzle.json";

#[derive(Debug, Parser)]
#[command(
    name = "datadog-firehose-nozzle",
    about = "Forwards Cloud Foundry firehose metrics to Datadog"
)]
struct Cli {
    /// Location of the nozzle config json file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Disable access validation with UAA
    #[arg(long, alias = "disableAccessControl")]
    disable_access_control: bool,
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = env::var("NOZZLE_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,tungstenite=off,tokio_tungstenite=off,{log_level}"
    );

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse NOZZLE_LOG_LEVEL"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    match run(cli).await {
        Ok(()) => {
            info!("Nozzle stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Nozzle stopped: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = NozzleConfig::load(&cli.config)
        .map_err(|e| format!("Error parsing config: {e}"))?;
    config.disable_access_control |= cli.disable_access_control;
    config.validate()?;
    debug!("Loaded configuration: {config:?}");

    let token_fetcher: Box<dyn TokenFetcher> = if config.disable_access_control {
        info!("Access control disabled, connecting to the firehose without a token");
        Box::new(NoAuth)
    } else {
        Box::new(UaaTokenFetcher::new(
            &config.uaa_url,
            &config.client,
            &config.client_secret,
            config.insecure_ssl_skip_verify,
        )?)
    };
    let auth_token = token_fetcher.fetch_auth_token().await.map_err(|e| {
        format!("Error getting oauth token: {e}. Please check your username and password.")
    })?;

    let consumer = FirehoseConsumer::new(
        &config.traffic_controller_url,
        &config.firehose_subscription_id,
        &auth_token,
    )
    .with_insecure_skip_verify(config.insecure_ssl_skip_verify)
    .with_idle_timeout(config.idle_timeout());

    let shutdown = consumer.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, draining and shutting down");
            shutdown.cancel();
        }
    });

    let dd_api = DdApi::new(
        &config.datadog_url,
        &config.datadog_api_key,
        config.api_timeout(),
        config.max_post_bytes(),
        false,
    )?;
    info!("Posting metrics to {}", dd_api.redacted_url());

    let ip = local_ip();
    let formatter = Formatter::new(
        &config.metric_prefix,
        config.max_post_bytes(),
        &ip.to_string(),
        &config.deployment,
    );
    let mut nozzle = Nozzle::new(
        Flusher::new(formatter, dd_api),
        config.flush_interval(),
        config.deployment_filter().map(str::to_string),
    );

    info!(
        "Consuming firehose subscription {}",
        config.firehose_subscription_id
    );
    let (messages, errors) = consumer.start();
    nozzle.run(messages, errors).await?;
    Ok(())
}
