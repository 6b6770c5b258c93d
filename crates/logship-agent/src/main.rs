// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::io::BufRead;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use logship::config::Config;
use logship::logger::{env_filter, Formatter};
use logship::pipeline::{Logger, Pipeline};
use logship::shutdown::ShutdownState;
use logship::sink::http::{HttpLogSink, HttpSinkConfig};

/// Exit status when interrupted before every entry was handled (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("LOGSHIP | ERROR | {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = match env_filter(&config.log_level) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("LOGSHIP | ERROR | could not parse log level {}: {e}", config.log_level);
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("LOGSHIP | ERROR | setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }
    debug!("AGENT | Logging subsystem enabled");

    let sink = match HttpLogSink::new(HttpSinkConfig::from(&config)) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("AGENT | {e}");
            return ExitCode::FAILURE;
        }
    };

    let (logger, handle) = match Pipeline::start(&config, sink).await {
        Ok(started) => started,
        Err(e) => {
            error!("AGENT | {e}");
            return ExitCode::FAILURE;
        }
    };

    let (input_closed_tx, input_closed_rx) = oneshot::channel();
    spawn_stdin_reader(logger, config.context.clone(), input_closed_tx);

    let input_closed = tokio::select! {
        _ = input_closed_rx => true,
        _ = tokio::signal::ctrl_c() => false,
    };

    if input_closed {
        info!("AGENT | Input closed, waiting for buffered entries to ship");
        handle.producer_done();
        tokio::select! {
            () = handle.wait_terminal() => debug!("AGENT | All entries handled"),
            _ = tokio::signal::ctrl_c() => warn!("AGENT | Interrupted while draining"),
        }
    } else {
        warn!("AGENT | Interrupted, flushing once before exit");
    }

    let shutdown = handle.shutdown_state().clone();
    handle.stop().await;
    ExitCode::from(exit_status(shutdown.state()))
}

/// 0 only once the producer finished and every buffered entry was handled.
fn exit_status(state: ShutdownState) -> u8 {
    if state.is_terminal() {
        0
    } else {
        EXIT_INTERRUPTED
    }
}

/// Reads stdin on its own thread so a pending read never holds up runtime
/// shutdown. `input_closed` fires at EOF.
fn spawn_stdin_reader(logger: Logger, context: String, input_closed: oneshot::Sender<()>) {
    std::thread::spawn(move || {
        forward_lines(std::io::stdin().lock(), &logger, &context);
        let _ = input_closed.send(());
    });
}

/// Logs each non-blank line as an information entry until EOF.
fn forward_lines(reader: impl BufRead, logger: &Logger, context: &str) {
    for line in reader.lines() {
        match line {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => logger.info(context, &line),
            Err(e) => {
                error!("AGENT | Failed to read stdin: {e}");
                return;
            }
        }
    }
}
