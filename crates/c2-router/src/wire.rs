//! Wire formats exchanged with gateway relays
//!
//! Outbound frames are what the console hands to the transport: one frame per
//! fragment per gateway, or a stateless systems query. Inbound messages are
//! relay notifications, discovery replies and link presence changes. Both
//! directions are JSON; payload bytes travel base64-encoded.

use crate::command_types::{Operation, OperationId, OperationKind, OperationState, RequestId};
use crate::fragmenter::Fragment;
use crate::error::RouterResult;
use acomms_core::Coordinate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence position of a fragment on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentTag {
    pub operation: OperationId,
    pub index: usize,
    pub count: usize,
}

/// Frame sent to a gateway relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcousticFrame {
    /// One unit of an operation
    Operation {
        op: OperationKind,
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        /// Absent when the unit carries the whole payload
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fragment: Option<FragmentTag>,
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// Ask the relay which acoustic systems it knows
    SystemsQuery,
}

impl AcousticFrame {
    /// Frame carrying `unit` of `operation`
    pub fn for_unit(operation: &Operation, unit: &Fragment) -> Self {
        let fragment = (!unit.is_whole()).then(|| FragmentTag {
            operation: unit.parent_operation_id,
            index: unit.sequence_index,
            count: unit.sequence_count,
        });
        AcousticFrame::Operation {
            op: operation.kind,
            target: operation.target.clone(),
            request_id: operation.request_id,
            fragment,
            data: unit.bytes.clone(),
        }
    }

    pub fn encode(&self) -> RouterResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> RouterResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Op-code of a relay notification.
///
/// Relays name op-codes per command family (`RANGE_IP`, `MSG_DONE`, ...);
/// those names are accepted as aliases of the generic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpCode {
    #[serde(alias = "ABORT_ACKED")]
    Acked,
    #[serde(alias = "MSG_DONE")]
    Done,
    #[serde(alias = "MSG_QUEUED")]
    Queued,
    #[serde(alias = "RANGE_IP", alias = "ABORT_IP", alias = "MSG_IP")]
    InProgress,
    /// Intermediate range measurement
    #[serde(alias = "RANGE_RECVED")]
    RangeReceived,
    Busy,
    /// Relay has no transducer connected
    NoTxd,
    Unsupported,
    #[serde(alias = "RANGE_TIMEOUT", alias = "ABORT_TIMEOUT")]
    Timeout,
    #[serde(alias = "MSG_FAILURE")]
    Failure,
}

/// Effect of an op-code on the operation it refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Moves the operation to a terminal state
    Terminal(OperationState),
    /// Non-terminal progress update
    Progress(OperationState),
    /// Range sample; the operation state is unchanged
    RangeSample,
}

impl OpCode {
    pub fn disposition(self) -> Disposition {
        match self {
            OpCode::Acked | OpCode::Done => Disposition::Terminal(OperationState::Succeeded),
            OpCode::Busy | OpCode::NoTxd | OpCode::Unsupported => {
                Disposition::Terminal(OperationState::Rejected)
            }
            OpCode::Timeout => Disposition::Terminal(OperationState::TimedOut),
            OpCode::Failure => Disposition::Terminal(OperationState::Failed),
            OpCode::Queued => Disposition::Progress(OperationState::Queued),
            OpCode::InProgress => Disposition::Progress(OperationState::InProgress),
            OpCode::RangeReceived => Disposition::RangeSample,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpCode::Acked => "ACKED",
            OpCode::Done => "DONE",
            OpCode::Queued => "QUEUED",
            OpCode::InProgress => "IN_PROGRESS",
            OpCode::RangeReceived => "RANGE_RECEIVED",
            OpCode::Busy => "BUSY",
            OpCode::NoTxd => "NO_TXD",
            OpCode::Unsupported => "UNSUPPORTED",
            OpCode::Timeout => "TIMEOUT",
            OpCode::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asynchronous status report from a relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub op_code: OpCode,
    /// System the notification is about (usually the target vehicle)
    pub subject: String,
    /// Relay that sent the notification
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Numeric payload, the distance in meters for range samples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Notification {
    pub fn new(op_code: OpCode, subject: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            op_code,
            subject: subject.into(),
            source: source.into(),
            request_id: None,
            value: None,
            text: None,
        }
    }

    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Operator-facing description of the notification
    pub fn describe(&self) -> String {
        let subject = &self.subject;
        let relay = &self.source;
        let base = match self.op_code {
            OpCode::Acked => format!("{subject} has acknowledged the command"),
            OpCode::Done => format!("Command to {subject} has been sent successfully"),
            OpCode::Queued => format!("Command to {subject} has been queued in {relay}"),
            OpCode::InProgress => format!("Command to {subject} is in progress via {relay}"),
            OpCode::RangeReceived => match self.value {
                Some(distance) => format!("Distance to {subject} is {distance:.1} m"),
                None => format!("Range to {subject} received without a distance"),
            },
            OpCode::Busy => format!("{relay} is busy, try again in a few moments"),
            OpCode::NoTxd => format!("{relay} has no acoustic transducer connected"),
            OpCode::Unsupported => format!("The command is not supported by {relay}"),
            OpCode::Timeout => format!("{relay} timed out while commanding {subject}"),
            OpCode::Failure => format!("Failed to command {subject} via {relay}"),
        };
        match &self.text {
            Some(text) if !text.is_empty() => format!("{base} ({text})"),
            _ => base,
        }
    }
}

/// Reply to a systems query: a delimited list of names
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReply {
    pub source: String,
    pub list: String,
}

impl DiscoveryReply {
    pub fn new(source: impl Into<String>, list: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            list: list.into(),
        }
    }

    /// Names in the reply, trimmed, blanks skipped. Duplicates are kept.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Anything a relay or the local network layer can send to the console
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Notification(Notification),
    Systems(DiscoveryReply),
    /// A system announced itself on the network
    Presence {
        name: String,
        #[serde(default)]
        services: Vec<String>,
        #[serde(default)]
        location: Option<Coordinate>,
    },
    /// The network layer lost contact with a system
    LinkLost { name: String },
}

impl InboundMessage {
    pub fn decode(bytes: &[u8]) -> RouterResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
