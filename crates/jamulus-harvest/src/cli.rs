// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared command-line plumbing for the harvest binaries.

use crate::config::{ConnectPolicy, HarvestConfig};
use crate::endpoint::EndpointSet;
use crate::harvester::{DoneReason, HarvestError, HarvestProfile, HarvestReport, Harvester};
use crate::session::TcpConnector;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Filter directive enabled by `--log-data`.
const LOG_DATA_DIRECTIVE: &str = "jamulus_harvest::session=trace";

/// Flags shared by `jamulus-clients` and `jamulus-servers`.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Local port number (0 = ephemeral)
    #[arg(long)]
    pub port: Option<u16>,

    /// Log protocol data
    #[arg(long)]
    pub log_data: bool,

    /// Connect timeout per endpoint, in seconds
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Stop after this many seconds without a message
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Skip endpoints that cannot be reached instead of aborting
    #[arg(long)]
    pub skip_unreachable: bool,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error, or a tracing directive)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl CommonArgs {
    /// Build the effective configuration: file (or defaults), then flags.
    pub fn to_config(&self) -> Result<HarvestConfig, HarvestError> {
        let mut config = match &self.config {
            Some(path) => HarvestConfig::from_file(path)?,
            None => HarvestConfig::default(),
        };

        if let Some(port) = self.port {
            config.local_port = port;
        }
        if self.log_data {
            config.log_data = true;
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout_ms = secs.saturating_mul(1000);
        }
        if self.skip_unreachable {
            config.connect_policy = ConnectPolicy::SkipUnreachable;
        }
        if self.no_color {
            config.color = false;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Build the log filter; diagnostics go to stderr, the report to stdout.
pub fn log_filter(level: &str, log_data: bool) -> EnvFilter {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    match (log_data, LOG_DATA_DIRECTIVE.parse()) {
        (true, Ok(directive)) => filter.add_directive(directive),
        _ => filter,
    }
}

fn init_logging(level: &str, log_data: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(level, log_data))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for both binaries.
pub async fn run(profile: HarvestProfile, targets: &[String], args: &CommonArgs) -> ExitCode {
    match execute(profile, targets, args).await {
        Ok(report) => {
            if report.reason == DoneReason::Interrupted {
                println!();
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(
    profile: HarvestProfile,
    targets: &[String],
    args: &CommonArgs,
) -> Result<HarvestReport, HarvestError> {
    let config = args.to_config()?;
    init_logging(&args.log_level, config.log_data);
    if !config.color {
        colored::control::set_override(false);
    }

    let endpoints = EndpointSet::parse_all(targets)?;
    info!(
        "Requesting {} from {} endpoint(s)",
        profile.request,
        endpoints.len()
    );
    debug!("Configuration: {:?}", config);

    let connector = TcpConnector::new(config.local_port, config.max_frame_size);
    let harvester = Harvester::new(profile, connector, &config);

    let shutdown = Arc::new(Notify::new());
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.notify_one();
        }
    });

    harvester
        .run(&endpoints, &mut std::io::stdout(), &shutdown)
        .await
}
