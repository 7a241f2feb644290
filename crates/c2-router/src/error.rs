//! Error types for acoustic command routing.
//!
//! Local failures (nothing resolved, nothing accepted by the transport) are
//! returned synchronously. Remote outcomes reach callers through the terminal
//! callback, carrying the `Display` text of these variants as the reason.

use thiserror::Error;

/// Errors raised while routing an operation.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The transport refused every send of the operation
    #[error("Transport rejected all {attempted} send attempt(s)")]
    TransportRejected {
        /// Sends attempted before giving up
        attempted: usize,
    },

    /// The selector resolved to no gateway
    #[error("No gateway available for {selector}")]
    NoGatewayAvailable {
        /// Selector description
        selector: String,
    },

    /// Some fragments reached no gateway, so the message is incomplete
    #[error("Only {delivered} of {total} fragments were accepted by any gateway")]
    PartialFragmentFailure {
        /// Fragments accepted by at least one gateway
        delivered: usize,
        /// Fragments in the message
        total: usize,
    },

    /// Relay refused the request (busy, no transducer, unsupported)
    #[error("Rejected by {source_relay}: {reason}")]
    RemoteRejected {
        /// Relay that reported the rejection
        source_relay: String,
        /// Reason reported by the relay
        reason: String,
    },

    /// Relay gave up waiting for the target
    #[error("Timed out: {0}")]
    RemoteTimeout(String),

    /// Relay reported a failure
    #[error("Remote failure: {0}")]
    RemoteFailure(String),

    /// Notification matched no live operation
    #[error("Unrecognized notification {op_code} about {subject}")]
    UnrecognizedNotification {
        /// Op-code of the notification
        op_code: String,
        /// Subject system of the notification
        subject: String,
    },

    /// Fragment size of zero was requested
    #[error("Invalid fragment size: {0}")]
    InvalidFragmentSize(usize),

    /// Operation was cancelled or the console shut down
    #[error("Operation cancelled")]
    Cancelled,

    /// Frame encoding or decoding failed
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result type for routing operations.
pub type RouterResult<T> = Result<T, RouterError>;
