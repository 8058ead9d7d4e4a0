// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Jamulus directory harvesting
//!
//! Fans a single list request out to one or more Jamulus servers or
//! directories and prints every list that comes back, until the endpoints
//! go quiet.
//!
//! - `jamulus-clients` asks servers for their connected clients
//! - `jamulus-servers` asks directories for their registered servers
//!
//! # Usage
//!
//! ```bash
//! # Who is connected to these two servers?
//! jamulus-clients --server jam.example.org 10.0.0.5:22124
//!
//! # Everything registered with a directory, bound to local port 22134
//! jamulus-servers --directory anygenre1.jamulus.io:22124 --port 22134
//!
//! # Trace every frame
//! jamulus-servers --directory anygenre1.jamulus.io --log-data
//! ```
//!
//! # Library
//!
//! ```ignore
//! let config = HarvestConfig::default();
//! let connector = TcpConnector::new(config.local_port, config.max_frame_size);
//! let harvester = Harvester::new(HarvestProfile::servers(), connector, &config);
//! let endpoints = EndpointSet::parse_all(["anygenre1.jamulus.io"])?;
//! let report = harvester
//!     .run(&endpoints, &mut std::io::stdout(), &Notify::new())
//!     .await?;
//! ```

pub mod cli;
pub mod config;
pub mod display;
pub mod endpoint;
pub mod harvester;
pub mod protocol;
pub mod session;

pub use config::{ConfigError, ConnectPolicy, HarvestConfig};
pub use display::CodeTables;
pub use endpoint::{Endpoint, EndpointError, EndpointId, EndpointSet};
pub use harvester::{DoneReason, HarvestError, HarvestProfile, HarvestReport, Harvester, ListKind};
pub use protocol::{ClientRecord, Frame, Inbound, InboundMessage, MessageType, ServerRecord};
pub use session::{ConnectError, Connector, Session, TcpConnector};
