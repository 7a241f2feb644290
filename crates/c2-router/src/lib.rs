//! Acoustic command routing
//!
//! This crate routes operator commands to underwater vehicles that are only
//! reachable through acoustic gateway modems. It handles:
//! - Registry of known systems and the services they declare
//! - Gateway resolution (a named relay, or every capable relay)
//! - Fragmentation of payloads into channel-sized units
//! - Dispatch with inter-gateway pacing on a shared channel
//! - Correlation of asynchronous relay notifications to operations
//! - Periodic discovery of acoustic systems
//!
//! # Architecture
//!
//! An operation flows through the following pipeline:
//! 1. Gateways resolved by `GatewayResolver`
//! 2. Payload split by `fragment`
//! 3. Operation registered with the `Correlator`, which assigns a request id
//! 4. Units sent by the `Dispatcher` through an `AcousticTransport`
//! 5. Relay notifications matched back by the `Correlator` until terminal
//!
//! `AcousticConsole` owns all of the above plus the background timeout sweep
//! and discovery tasks.
//!
//! # Operation kinds
//!
//! - **Range** / **ReverseRange**: acoustic ranging, paced across gateways
//! - **Abort**: stop the target's plan
//! - **SendMessage**: arbitrary encoded message, fragmented when large
//! - **StartPlan** / **ResumePlan**: mission plan control

pub mod command_types;
pub mod console;
pub mod correlator;
pub mod discovery;
pub mod dispatcher;
pub mod error;
pub mod fragmenter;
pub mod ranges;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod transport;
pub mod wire;

// Re-export commonly used types
pub use command_types::{
    CommandPayload, Operation, OperationId, OperationKind, OperationState, RequestId,
};
pub use console::AcousticConsole;
pub use correlator::{Correlation, Correlator, OperationHandle, TerminalReport};
pub use discovery::DiscoveryScheduler;
pub use dispatcher::{DispatchResult, Dispatcher, GatewayOutcome};
pub use error::{RouterError, RouterResult};
pub use fragmenter::{fragment, reassemble, Fragment, MAX_FRAGMENT_SIZE};
pub use ranges::{RangeLog, RangeSample};
pub use registry::{RemoteSystem, SystemRegistry};
pub use resolver::{GatewayResolver, GatewaySelector};
pub use session::OperationSession;
pub use transport::{AcousticTransport, RecordingTransport, SentFrame};
pub use wire::{AcousticFrame, DiscoveryReply, InboundMessage, Notification, OpCode};
