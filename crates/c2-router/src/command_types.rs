//! Operation type definitions
//!
//! An operation is one command issued by the console toward a target vehicle,
//! relayed by one or more acoustic gateways. This module defines the kinds of
//! operation, their lifecycle states and the payload builders for each kind.

#![warn(missing_docs)]

use crate::resolver::GatewaySelector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the console to each submitted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Request id carried on the wire so relays can echo it back
pub type RequestId = u16;

/// Kind of acoustic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    /// Measure the acoustic range from the gateway to the target
    Range,
    /// Abort the target's current plan
    Abort,
    /// Deliver an arbitrary encoded message
    SendMessage,
    /// Start a mission plan, optionally carrying its definition
    StartPlan,
    /// Resume a plan from a given maneuver
    ResumePlan,
    /// Ask the target to range the gateways itself
    ReverseRange,
}

impl OperationKind {
    /// Whether the operation expects correlated replies from the relay.
    ///
    /// Reverse ranging produces range reports from the vehicle rather than
    /// replies to the request, so it is complete once accepted for transmission.
    pub fn expects_reply(self) -> bool {
        !matches!(self, OperationKind::ReverseRange)
    }

    /// Whether sends to several gateways must be spaced in time
    pub fn separates_gateways(self) -> bool {
        matches!(self, OperationKind::Range | OperationKind::ReverseRange)
    }

    /// Wire name of the kind
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Range => "RANGE",
            OperationKind::Abort => "ABORT",
            OperationKind::SendMessage => "SEND_MESSAGE",
            OperationKind::StartPlan => "START_PLAN",
            OperationKind::ResumePlan => "RESUME_PLAN",
            OperationKind::ReverseRange => "REVERSE_RANGE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    /// Submitted, not yet handed to the dispatcher
    Created,
    /// Fragments being sent to gateways
    Dispatching,
    /// Accepted by at least one gateway, no reply yet
    AwaitingReply,
    /// A relay queued the request
    Queued,
    /// A relay is working on the request
    InProgress,
    /// The relay confirmed completion
    Succeeded,
    /// The relay refused the request
    Rejected,
    /// No terminal reply within the allowed time
    TimedOut,
    /// Dispatch or remote execution failed
    Failed,
}

impl OperationState {
    /// Terminal states end tracking of the operation
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Succeeded
                | OperationState::Rejected
                | OperationState::TimedOut
                | OperationState::Failed
        )
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationState::Created => "CREATED",
            OperationState::Dispatching => "DISPATCHING",
            OperationState::AwaitingReply => "AWAITING_REPLY",
            OperationState::Queued => "QUEUED",
            OperationState::InProgress => "IN_PROGRESS",
            OperationState::Succeeded => "SUCCEEDED",
            OperationState::Rejected => "REJECTED",
            OperationState::TimedOut => "TIMED_OUT",
            OperationState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One issued command and its tracked lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Console-assigned identifier
    pub id: OperationId,
    /// Operation kind
    pub kind: OperationKind,
    /// Target vehicle name
    pub target: String,
    /// How gateways were chosen
    pub selector: GatewaySelector,
    /// Opaque command payload
    pub payload: Vec<u8>,
    /// Wire request id, for kinds that expect replies
    pub request_id: Option<RequestId>,
    /// Current state
    pub state: OperationState,
    /// Creation timestamp (ns)
    pub created_at_ns: u64,
    /// Last state change timestamp (ns)
    pub last_updated_ns: u64,
    /// Human-readable outcome or latest progress
    pub result_summary: Option<String>,
}

impl Operation {
    /// Create an operation in the `Created` state
    pub fn new(
        id: OperationId,
        kind: OperationKind,
        target: impl Into<String>,
        selector: GatewaySelector,
        payload: Vec<u8>,
        created_at_ns: u64,
    ) -> Self {
        Self {
            id,
            kind,
            target: target.into(),
            selector,
            payload,
            request_id: None,
            state: OperationState::Created,
            created_at_ns,
            last_updated_ns: created_at_ns,
            result_summary: None,
        }
    }
}

/// Typed command contents, encoded into an operation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandPayload {
    /// Range request, addressed by target only
    Range,
    /// Abort request, addressed by target only
    Abort,
    /// Reverse range request
    ReverseRange,
    /// Pre-encoded message bytes
    Message(Vec<u8>),
    /// Plan start
    StartPlan {
        /// Plan identifier on the vehicle
        plan_id: String,
        /// Keep executing when non-critical errors occur
        ignore_errors: bool,
        /// Skip the calibration phase
        skip_calibration: bool,
        /// Encoded plan definition, when the vehicle does not hold the plan
        definition: Option<Vec<u8>>,
    },
    /// Resume a plan from a maneuver
    ResumePlan {
        /// Plan identifier on the vehicle
        plan_id: String,
        /// Maneuver to resume from
        maneuver_id: String,
    },
}

impl CommandPayload {
    /// Operation kind carrying this payload
    pub fn kind(&self) -> OperationKind {
        match self {
            CommandPayload::Range => OperationKind::Range,
            CommandPayload::Abort => OperationKind::Abort,
            CommandPayload::ReverseRange => OperationKind::ReverseRange,
            CommandPayload::Message(_) => OperationKind::SendMessage,
            CommandPayload::StartPlan { .. } => OperationKind::StartPlan,
            CommandPayload::ResumePlan { .. } => OperationKind::ResumePlan,
        }
    }

    /// Encode into payload bytes
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            CommandPayload::Range | CommandPayload::Abort | CommandPayload::ReverseRange => {
                Ok(Vec::new())
            }
            CommandPayload::Message(bytes) => Ok(bytes.clone()),
            CommandPayload::StartPlan {
                plan_id,
                ignore_errors,
                skip_calibration,
                definition,
            } => serde_json::to_vec(&PlanStartBody {
                plan_id,
                ignore_errors: *ignore_errors,
                calibrate: !*skip_calibration,
                definition: definition.as_deref(),
            }),
            // Vehicles parse the resume command from plain text.
            CommandPayload::ResumePlan {
                plan_id,
                maneuver_id,
            } => Ok(format!("resume {} {}", plan_id.trim(), maneuver_id.trim()).into_bytes()),
        }
    }
}

#[derive(Serialize)]
struct PlanStartBody<'a> {
    plan_id: &'a str,
    ignore_errors: bool,
    calibrate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    definition: Option<&'a [u8]>,
}
