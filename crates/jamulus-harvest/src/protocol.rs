// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory protocol message model.
//!
//! Messages are identified by their Jamulus protocol names (`CLM_SERVER_LIST`,
//! `CLM_REQ_CONN_CLIENTS_LIST`, ...). On the TCP transport each message is a
//! length-prefixed JSON frame:
//!
//! ```text
//! +----------------+--------------------------------------------+
//! | Length (4B BE) | {"type": NAME, "count": N, "values": [..]} |
//! +----------------+--------------------------------------------+
//! ```
//!
//! This framing is specific to the harvest tools and is not the native
//! Jamulus UDP encoding.

use crate::endpoint::EndpointId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default port of a Jamulus server or directory.
pub const DEFAULT_PORT: u16 = 22124;

/// Directory protocol message types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Audio stream data; the peer considers us a connected client.
    Audio,
    PingMs,
    PingMsWithNumClients,
    ServerFull,
    RegisterServer,
    UnregisterServer,
    /// List of registered servers (directory response).
    ServerList,
    /// Request the list of registered servers.
    ReqServerList,
    SendEmptyMessage,
    EmptyMessage,
    /// Ask the peer to drop us.
    Disconnection,
    VersionAndOs,
    ReqVersionAndOs,
    /// List of connected clients (server response).
    ConnClientsList,
    /// Request the list of connected clients.
    ReqConnClientsList,
    ChannelLevelList,
    RegisterServerResp,
    RegisterServerEx,
    RedServerList,
    /// Any name not known to this crate.
    Unknown(String),
}

impl MessageType {
    /// Protocol name of this message.
    pub fn name(&self) -> &str {
        match self {
            Self::Audio => "AUDIO",
            Self::PingMs => "CLM_PING_MS",
            Self::PingMsWithNumClients => "CLM_PING_MS_WITHNUMCLIENTS",
            Self::ServerFull => "CLM_SERVER_FULL",
            Self::RegisterServer => "CLM_REGISTER_SERVER",
            Self::UnregisterServer => "CLM_UNREGISTER_SERVER",
            Self::ServerList => "CLM_SERVER_LIST",
            Self::ReqServerList => "CLM_REQ_SERVER_LIST",
            Self::SendEmptyMessage => "CLM_SEND_EMPTY_MESSAGE",
            Self::EmptyMessage => "CLM_EMPTY_MESSAGE",
            Self::Disconnection => "CLM_DISCONNECTION",
            Self::VersionAndOs => "CLM_VERSION_AND_OS",
            Self::ReqVersionAndOs => "CLM_REQ_VERSION_AND_OS",
            Self::ConnClientsList => "CLM_CONN_CLIENTS_LIST",
            Self::ReqConnClientsList => "CLM_REQ_CONN_CLIENTS_LIST",
            Self::ChannelLevelList => "CLM_CHANNEL_LEVEL_LIST",
            Self::RegisterServerResp => "CLM_REGISTER_SERVER_RESP",
            Self::RegisterServerEx => "CLM_REGISTER_SERVER_EX",
            Self::RedServerList => "CLM_RED_SERVER_LIST",
            Self::Unknown(name) => name,
        }
    }

    /// Look up a message type by protocol name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "AUDIO" => Self::Audio,
            "CLM_PING_MS" => Self::PingMs,
            "CLM_PING_MS_WITHNUMCLIENTS" => Self::PingMsWithNumClients,
            "CLM_SERVER_FULL" => Self::ServerFull,
            "CLM_REGISTER_SERVER" => Self::RegisterServer,
            "CLM_UNREGISTER_SERVER" => Self::UnregisterServer,
            "CLM_SERVER_LIST" => Self::ServerList,
            "CLM_REQ_SERVER_LIST" => Self::ReqServerList,
            "CLM_SEND_EMPTY_MESSAGE" => Self::SendEmptyMessage,
            "CLM_EMPTY_MESSAGE" => Self::EmptyMessage,
            "CLM_DISCONNECTION" => Self::Disconnection,
            "CLM_VERSION_AND_OS" => Self::VersionAndOs,
            "CLM_REQ_VERSION_AND_OS" => Self::ReqVersionAndOs,
            "CLM_CONN_CLIENTS_LIST" => Self::ConnClientsList,
            "CLM_REQ_CONN_CLIENTS_LIST" => Self::ReqConnClientsList,
            "CLM_CHANNEL_LEVEL_LIST" => Self::ChannelLevelList,
            "CLM_REGISTER_SERVER_RESP" => Self::RegisterServerResp,
            "CLM_REGISTER_SERVER_EX" => Self::RegisterServerEx,
            "CLM_RED_SERVER_LIST" => Self::RedServerList,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for MessageType {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl From<MessageType> for String {
    fn from(message: MessageType) -> Self {
        message.name().to_string()
    }
}

/// One entry of a connected-client list.
///
/// Every field is optional; servers omit what they do not know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientRecord {
    pub id: Option<u32>,
    pub name: Option<String>,
    pub instrument: Option<u32>,
    pub skill: Option<u32>,
    pub city: Option<String>,
    pub country: Option<u32>,
}

/// One entry of a directory server list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerRecord {
    pub ip: Option<String>,
    pub port: Option<u16>,
    /// 1 for permanent (directory-pinned) servers
    pub permanent: Option<u8>,
    pub name: Option<String>,
    pub clients: Option<u32>,
    pub max_clients: Option<u32>,
    pub city: Option<String>,
    pub country_id: Option<u32>,
    pub os: Option<u32>,
    pub version: Option<String>,
    /// Unix time (seconds) of the last registration refresh
    pub time_updated: Option<f64>,
    pub internal_address: Option<String>,
}

/// Decoded body of an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Audio,
    ClientList(Vec<ClientRecord>),
    ServerList(Vec<ServerRecord>),
    /// Any message the harvester has no handler for.
    Other(MessageType),
}

impl Inbound {
    /// Message type this body was decoded from.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Audio => MessageType::Audio,
            Self::ClientList(_) => MessageType::ConnClientsList,
            Self::ServerList(_) => MessageType::ServerList,
            Self::Other(message) => message.clone(),
        }
    }

    /// Number of records carried (0 for non-list messages).
    pub fn len(&self) -> usize {
        match self {
            Self::ClientList(clients) => clients.len(),
            Self::ServerList(servers) => servers.len(),
            Self::Audio | Self::Other(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A typed message received from one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Endpoint the message arrived from.
    pub origin: EndpointId,
    /// Element count asserted by the peer; may differ from the payload length.
    pub declared_count: usize,
    pub body: Inbound,
}

impl InboundMessage {
    /// Build a message whose declared count matches its payload.
    pub fn new(origin: EndpointId, body: Inbound) -> Self {
        Self {
            origin,
            declared_count: body.len(),
            body,
        }
    }
}

/// Wire frame exchanged on the TCP transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub message: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<serde_json::Value>,
}

impl Frame {
    /// Frame carrying a bare named message (requests, disconnect).
    pub fn named(message: MessageType) -> Self {
        Self {
            message,
            count: None,
            values: Vec::new(),
        }
    }

    /// `CLM_CONN_CLIENTS_LIST` frame.
    pub fn client_list(clients: &[ClientRecord]) -> Result<Self, FrameError> {
        Self::list(MessageType::ConnClientsList, clients)
    }

    /// `CLM_SERVER_LIST` frame.
    pub fn server_list(servers: &[ServerRecord]) -> Result<Self, FrameError> {
        Self::list(MessageType::ServerList, servers)
    }

    fn list<T: Serialize>(message: MessageType, records: &[T]) -> Result<Self, FrameError> {
        let values = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            message,
            count: Some(values.len()),
            values,
        })
    }

    /// Decode the frame into a typed message from `origin`.
    pub fn into_inbound(self, origin: EndpointId) -> Result<InboundMessage, FrameError> {
        let declared_count = self.count.unwrap_or(self.values.len());
        let body = match self.message {
            MessageType::Audio => Inbound::Audio,
            MessageType::ConnClientsList => Inbound::ClientList(decode_records(self.values)?),
            MessageType::ServerList => Inbound::ServerList(decode_records(self.values)?),
            other => Inbound::Other(other),
        };

        Ok(InboundMessage {
            origin,
            declared_count,
            body,
        })
    }
}

fn decode_records<T: DeserializeOwned>(values: Vec<serde_json::Value>) -> Result<Vec<T>, FrameError> {
    values
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(FrameError::InvalidRecord))
        .collect()
}

/// Frame encoding/decoding errors.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty frame")]
    Empty,

    #[error("Frame too large: {len} > {max}")]
    TooLarge { len: usize, max: usize },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(#[source] serde_json::Error),
}

impl FrameError {
    /// Whether the stream is still aligned on a frame boundary after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Json(_) | Self::InvalidRecord(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_names() {
        assert_eq!(MessageType::ReqServerList.name(), "CLM_REQ_SERVER_LIST");
        assert_eq!(
            MessageType::from_name("CLM_CONN_CLIENTS_LIST"),
            MessageType::ConnClientsList
        );
        assert_eq!(MessageType::from_name("AUDIO"), MessageType::Audio);
        assert_eq!(
            MessageType::from_name("CLM_SOMETHING_NEW"),
            MessageType::Unknown("CLM_SOMETHING_NEW".into())
        );
        assert_eq!(
            MessageType::Unknown("CLM_SOMETHING_NEW".into()).to_string(),
            "CLM_SOMETHING_NEW"
        );
    }

    #[test]
    fn test_request_frame_serialize() {
        let frame = Frame::named(MessageType::ReqConnClientsList);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"CLM_REQ_CONN_CLIENTS_LIST"}"#);
    }

    #[test]
    fn test_client_list_partial_records() {
        let json = r#"{
            "type": "CLM_CONN_CLIENTS_LIST",
            "count": 2,
            "values": [
                {"id": 0, "name": "alice", "instrument": 3, "skill": 2, "city": "Bern", "country": 206},
                {"name": "bob"}
            ]
        }"#;

        let frame: Frame = serde_json::from_str(json).unwrap();
        let msg = frame.into_inbound(EndpointId(1)).unwrap();
        assert_eq!(msg.origin, EndpointId(1));
        assert_eq!(msg.declared_count, 2);

        match msg.body {
            Inbound::ClientList(clients) => {
                assert_eq!(clients.len(), 2);
                assert_eq!(clients[0].city.as_deref(), Some("Bern"));
                assert_eq!(clients[1].id, None);
                assert_eq!(clients[1].name.as_deref(), Some("bob"));
            }
            other => panic!("Wrong body: {:?}", other),
        }
    }

    #[test]
    fn test_declared_count_kept_separately() {
        let json = r#"{"type": "CLM_SERVER_LIST", "count": 5, "values": [{"name": "a"}]}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        let msg = frame.into_inbound(EndpointId(0)).unwrap();
        assert_eq!(msg.declared_count, 5);
        assert_eq!(msg.body.len(), 1);
    }

    #[test]
    fn test_missing_count_defaults_to_payload_length() {
        let json = r#"{"type": "CLM_SERVER_LIST", "values": [{}, {}]}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        let msg = frame.into_inbound(EndpointId(0)).unwrap();
        assert_eq!(msg.declared_count, 2);
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let json = r#"{"type": "CLM_VERSION_AND_OS", "values": [{"os": 2}]}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        let msg = frame.into_inbound(EndpointId(0)).unwrap();
        assert_eq!(msg.body, Inbound::Other(MessageType::VersionAndOs));
    }

    #[test]
    fn test_invalid_record_rejected() {
        let json = r#"{"type": "CLM_CONN_CLIENTS_LIST", "values": [{"id": "not-a-number"}]}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        let err = frame.into_inbound(EndpointId(0)).unwrap_err();
        assert!(matches!(err, FrameError::InvalidRecord(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_server_list_frame_builder() {
        let servers = vec![
            ServerRecord {
                name: Some("A".into()),
                ..Default::default()
            },
            ServerRecord {
                name: Some("B".into()),
                time_updated: Some(1_700_000_000.5),
                ..Default::default()
            },
        ];
        let frame = Frame::server_list(&servers).unwrap();
        assert_eq!(frame.count, Some(2));

        let msg = frame.into_inbound(EndpointId(3)).unwrap();
        assert_eq!(msg.body, Inbound::ServerList(servers));
    }
}
