// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! jamulus-clients - Fetch connected-client lists from Jamulus servers
//!
//! ```bash
//! jamulus-clients --server jam.example.org 10.0.0.5:22124
//! ```

use clap::Parser;
use jamulus_harvest::cli::{self, CommonArgs};
use jamulus_harvest::HarvestProfile;
use std::process::ExitCode;

/// Fetch connected-client lists from Jamulus servers
#[derive(Parser, Debug)]
#[command(name = "jamulus-clients")]
#[command(version, about, long_about = None)]
struct Args {
    /// Servers for fetching client list (host[:port])
    #[arg(long = "server", required = true, num_args = 1..)]
    servers: Vec<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    cli::run(HarvestProfile::clients(), &args.servers, &args.common).await
}
