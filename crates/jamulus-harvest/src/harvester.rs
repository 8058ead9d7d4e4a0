// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Harvester core.
//!
//! A harvest runs in three phases:
//!
//! 1. open one session per endpoint, in set order
//! 2. send the profile's request to every session, in set order
//! 3. poll the shared inbound queue until it stays idle for the idle timeout
//!
//! The idle timeout is re-armed after every received message; there is no
//! closing handshake in the directory protocol, so silence is the only
//! "done" signal.

use crate::config::{ConnectPolicy, HarvestConfig};
use crate::display::{format_client, format_server, format_summary, CodeTables};
use crate::endpoint::{EndpointError, EndpointId, EndpointSet};
use crate::protocol::{Inbound, InboundMessage, MessageType};
use crate::session::{ConnectError, Connector, Session};
use colored::Colorize;
use std::collections::BTreeMap;
use std::io::Write;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Harvester errors.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("No endpoint could be reached ({0} attempted)")]
    NoReachableEndpoint(usize),

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Kind of list a response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Clients,
    Servers,
}

impl ListKind {
    fn noun(self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::Servers => "servers",
        }
    }
}

/// What a harvester asks for and which list responses it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestProfile {
    /// Request sent once to every endpoint.
    pub request: MessageType,
    /// List kinds that are reported; other lists are ignored.
    pub accepts: Vec<ListKind>,
}

impl HarvestProfile {
    /// Connected-client lists from servers. Server lists are reported too.
    pub fn clients() -> Self {
        Self {
            request: MessageType::ReqConnClientsList,
            accepts: vec![ListKind::Clients, ListKind::Servers],
        }
    }

    /// Server lists from directories.
    pub fn servers() -> Self {
        Self {
            request: MessageType::ReqServerList,
            accepts: vec![ListKind::Servers],
        }
    }

    pub fn accepts(&self, kind: ListKind) -> bool {
        self.accepts.contains(&kind)
    }
}

/// Why polling stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// No message within the idle timeout.
    Idle,
    /// Shutdown was requested.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Polling,
    Done(DoneReason),
}

/// Outcome of a harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub reason: DoneReason,
    pub endpoints_connected: usize,
    pub endpoints_skipped: usize,
    pub lists_received: usize,
    pub records_reported: usize,
    pub disconnects_sent: usize,
    pub messages_ignored: usize,
}

impl HarvestReport {
    fn new() -> Self {
        Self {
            reason: DoneReason::Idle,
            endpoints_connected: 0,
            endpoints_skipped: 0,
            lists_received: 0,
            records_reported: 0,
            disconnects_sent: 0,
            messages_ignored: 0,
        }
    }
}

/// Directory harvester, parameterized by a [`HarvestProfile`].
pub struct Harvester<C> {
    profile: HarvestProfile,
    connector: C,
    connect_timeout: Duration,
    idle_timeout: Duration,
    connect_policy: ConnectPolicy,
    tables: &'static CodeTables,
    color: bool,
}

impl<C: Connector> Harvester<C> {
    /// Create a harvester from a validated configuration.
    pub fn new(profile: HarvestProfile, connector: C, config: &HarvestConfig) -> Self {
        Self {
            profile,
            connector,
            connect_timeout: config.connect_timeout(),
            idle_timeout: config.idle_timeout(),
            connect_policy: config.connect_policy,
            tables: CodeTables::standard(),
            color: config.color,
        }
    }

    /// Use different code tables for rendering.
    pub fn with_tables(mut self, tables: &'static CodeTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn profile(&self) -> &HarvestProfile {
        &self.profile
    }

    /// Run one harvest, writing report lines to `out`.
    ///
    /// Completes when no message arrives for the idle timeout, or when
    /// `shutdown` is notified. Either way every report block is written
    /// whole.
    pub async fn run<W: Write>(
        &self,
        endpoints: &EndpointSet,
        out: &mut W,
        shutdown: &Notify,
    ) -> Result<HarvestReport, HarvestError> {
        let mut report = HarvestReport::new();

        // Held for the whole run: the queue never closes under the loop.
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();

        let Some(sessions) = self
            .open_sessions(endpoints, &inbound_tx, shutdown, &mut report)
            .await?
        else {
            report.reason = DoneReason::Interrupted;
            info!(
                "Harvest interrupted while connecting ({} of {} endpoint(s) open)",
                report.endpoints_connected,
                endpoints.len()
            );
            return Ok(report);
        };

        self.dispatch_requests(&sessions);

        let polled = self
            .poll(&sessions, &mut inbound_rx, out, shutdown, &mut report)
            .await;

        close_all(sessions).await;

        report.reason = polled?;
        info!(
            "Harvest done ({:?}): {} list(s), {} record(s), {} disconnect(s), {} ignored",
            report.reason,
            report.lists_received,
            report.records_reported,
            report.disconnects_sent,
            report.messages_ignored
        );
        Ok(report)
    }

    /// Open one session per endpoint, in set order.
    ///
    /// Returns `Ok(None)` if `shutdown` fires before every endpoint has been
    /// tried; sessions opened so far are closed and no request is sent.
    async fn open_sessions(
        &self,
        endpoints: &EndpointSet,
        inbound: &mpsc::UnboundedSender<InboundMessage>,
        shutdown: &Notify,
        report: &mut HarvestReport,
    ) -> Result<Option<BTreeMap<EndpointId, Session>>, HarvestError> {
        let mut sessions = BTreeMap::new();

        for (id, endpoint) in endpoints.iter() {
            let opened = tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    debug!("Interrupted while connecting to {}", endpoint);
                    close_all(sessions).await;
                    return Ok(None);
                }
                opened = self
                    .connector
                    .open(endpoint, id, inbound.clone(), self.connect_timeout) => opened,
            };

            match opened {
                Ok(session) => {
                    debug!("Session {} open to {}", id, endpoint);
                    sessions.insert(id, session);
                    report.endpoints_connected += 1;
                }
                Err(e) => match self.connect_policy {
                    ConnectPolicy::FailFast => {
                        close_all(sessions).await;
                        return Err(e.into());
                    }
                    ConnectPolicy::SkipUnreachable => {
                        warn!("Skipping {}: {}", endpoint, e);
                        report.endpoints_skipped += 1;
                    }
                },
            }
        }

        if sessions.is_empty() {
            return Err(HarvestError::NoReachableEndpoint(endpoints.len()));
        }
        Ok(Some(sessions))
    }

    fn dispatch_requests(&self, sessions: &BTreeMap<EndpointId, Session>) {
        for session in sessions.values() {
            debug!(
                "Requesting {} from {} ({})",
                self.profile.request,
                session.endpoint(),
                session.origin()
            );
            session.send(self.profile.request.clone());
        }
    }

    async fn poll<W: Write>(
        &self,
        sessions: &BTreeMap<EndpointId, Session>,
        inbound: &mut mpsc::UnboundedReceiver<InboundMessage>,
        out: &mut W,
        shutdown: &Notify,
        report: &mut HarvestReport,
    ) -> Result<DoneReason, HarvestError> {
        let mut state = LoopState::Polling;

        loop {
            state = match state {
                LoopState::Done(reason) => return Ok(reason),
                LoopState::Polling => tokio::select! {
                    biased;
                    _ = shutdown.notified() => LoopState::Done(DoneReason::Interrupted),
                    received = tokio::time::timeout(self.idle_timeout, inbound.recv()) => {
                        match received {
                            Ok(Some(msg)) => {
                                self.handle(msg, sessions, out, report)?;
                                LoopState::Polling
                            }
                            Ok(None) | Err(_) => LoopState::Done(DoneReason::Idle),
                        }
                    }
                },
            };
        }
    }

    fn handle<W: Write>(
        &self,
        msg: InboundMessage,
        sessions: &BTreeMap<EndpointId, Session>,
        out: &mut W,
        report: &mut HarvestReport,
    ) -> std::io::Result<()> {
        let Some(session) = sessions.get(&msg.origin) else {
            debug!("Dropping message from unknown origin {}", msg.origin);
            return Ok(());
        };

        match msg.body {
            Inbound::Audio => {
                // The peer took us for a joining client.
                info!("Audio from {}, disconnecting", session.endpoint());
                if session.send(MessageType::Disconnection) {
                    report.disconnects_sent += 1;
                }
            }
            Inbound::ClientList(clients) if self.profile.accepts(ListKind::Clients) => {
                debug!(
                    "Client list from {}: declared {}, received {}",
                    session.endpoint(),
                    msg.declared_count,
                    clients.len()
                );
                let lines = clients
                    .iter()
                    .map(|c| format_client(c, self.tables))
                    .collect();
                self.write_block(out, ListKind::Clients, lines, report)?;
            }
            Inbound::ServerList(servers) if self.profile.accepts(ListKind::Servers) => {
                debug!(
                    "Server list from {}: declared {}, received {}",
                    session.endpoint(),
                    msg.declared_count,
                    servers.len()
                );
                let now = SystemTime::now();
                let lines = servers
                    .iter()
                    .map(|s| format_server(s, self.tables, now))
                    .collect();
                self.write_block(out, ListKind::Servers, lines, report)?;
            }
            other => {
                debug!("Ignoring {} from {}", other.message_type(), session.endpoint());
                report.messages_ignored += 1;
            }
        }

        Ok(())
    }

    /// Write a summary line and its record lines in one go.
    fn write_block<W: Write>(
        &self,
        out: &mut W,
        kind: ListKind,
        lines: Vec<String>,
        report: &mut HarvestReport,
    ) -> std::io::Result<()> {
        let summary = format_summary(lines.len(), kind.noun());
        let mut block = if self.color {
            summary.green().bold().to_string()
        } else {
            summary
        };
        block.push('\n');
        for line in &lines {
            block.push_str(line);
            block.push('\n');
        }

        out.write_all(block.as_bytes())?;
        out.flush()?;

        report.lists_received += 1;
        report.records_reported += lines.len();
        Ok(())
    }
}

/// Close every session concurrently so slow writers share one grace period.
async fn close_all(sessions: BTreeMap<EndpointId, Session>) {
    let mut closing = JoinSet::new();
    for session in sessions.into_values() {
        closing.spawn(session.close());
    }
    while closing.join_next().await.is_some() {}
}
