// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use log_forwarder::{
    aggregator_service::{AggregatorService, FlushSummary},
    config::Config,
    errors::{AggregatorError, IntakeError},
    flusher::Flusher,
    hostname::get_hostname,
    intake::HttpIntake,
    object_key::KeyGenerator,
    s3_store::S3Store,
};

type AggregatorTask = JoinHandle<Result<FlushSummary, AggregatorError>>;
type IntakeTask = JoinHandle<Result<(), IntakeError>>;

#[tokio::main]
pub async fn main() {
    let config = match Config::new() {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            error!("Invalid configuration: {e}");
            process::exit(1);
        }
    };
    init_logging(&config.log_level);
    debug!("Logging subsystem enabled");

    let host = get_hostname();
    let store = match S3Store::new(&config.s3_config()) {
        Ok(store) => store,
        Err(e) => {
            error!("Error creating S3 client: {e}");
            process::exit(1);
        }
    };
    info!(
        "Forwarding logs to s3://{}/{} from host {host}",
        config.bucket_name, config.key_prefix
    );

    let keys = match KeyGenerator::new(&config.key_prefix, host) {
        Ok(keys) => keys,
        Err(e) => {
            error!("Invalid object key layout: {e}");
            process::exit(1);
        }
    };
    let flusher = Flusher::new(Arc::new(store), keys);
    let (service, sink) =
        AggregatorService::new(config.flush_policy(), flusher, config.channel_capacity);
    let aggregator_cancel = service.cancel_token();
    let mut aggregator_task: AggregatorTask = tokio::spawn(service.run());

    let intake = match HttpIntake::bind(config.intake_config(), sink).await {
        Ok(intake) => intake,
        Err(e) => {
            error!("Error starting intake: {e}");
            aggregator_cancel.cancel();
            finish_aggregator(aggregator_task).await;
            process::exit(1);
        }
    };
    let intake_cancel = intake.cancel_token();
    let mut intake_task: IntakeTask = tokio::spawn(intake.serve());

    let mut aggregator_finished = None;
    let intake_ok = tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received, draining buffered logs");
            intake_cancel.cancel();
            report_intake((&mut intake_task).await)
        }
        finished = &mut intake_task => {
            report_intake(finished);
            aggregator_cancel.cancel();
            false
        }
        finished = &mut aggregator_task => {
            // The sink is closed, stop taking requests that cannot be buffered.
            aggregator_finished = Some(finished);
            intake_cancel.cancel();
            report_intake((&mut intake_task).await)
        }
    };

    // Once the intake is gone every sink handle is released and the aggregator drains.
    let aggregator_ok = match aggregator_finished {
        Some(finished) => report_aggregator(finished),
        None => finish_aggregator(aggregator_task).await,
    };
    if !(intake_ok && aggregator_ok) {
        process::exit(1);
    }
}

fn init_logging(log_level: &str) {
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
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
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn finish_aggregator(task: AggregatorTask) -> bool {
    report_aggregator(task.await)
}

fn report_aggregator(
    finished: Result<Result<FlushSummary, AggregatorError>, tokio::task::JoinError>,
) -> bool {
    match finished {
        Ok(Ok(summary)) => {
            info!(
                "Forwarded {} payloads in {} objects ({} bytes)",
                summary.payloads, summary.flushes, summary.bytes
            );
            true
        }
        Ok(Err(e)) => {
            error!("{e}");
            error!("{} bytes of logs were not written", e.unflushed.len());
            false
        }
        Err(e) => {
            error!("Aggregator task died: {e:?}");
            false
        }
    }
}

fn report_intake(finished: Result<Result<(), IntakeError>, tokio::task::JoinError>) -> bool {
    match finished {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("Intake failed: {e}");
            false
        }
        Err(e) => {
            error!("Intake task died: {e:?}");
            false
        }
    }
}
