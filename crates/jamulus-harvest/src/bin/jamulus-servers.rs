// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! jamulus-servers - Collect server lists from Jamulus directories
//!
//! ```bash
//! jamulus-servers --directory anygenre1.jamulus.io anygenre2.jamulus.io
//! ```

use clap::Parser;
use jamulus_harvest::cli::{self, CommonArgs};
use jamulus_harvest::HarvestProfile;
use std::process::ExitCode;

/// Collect server lists from Jamulus directories
#[derive(Parser, Debug)]
#[command(name = "jamulus-servers")]
#[command(version, about, long_about = None)]
struct Args {
    /// Central servers for collecting server lists (host[:port])
    #[arg(long = "directory", required = true, num_args = 1..)]
    directories: Vec<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    cli::run(HarvestProfile::servers(), &args.directories, &args.common).await
}
