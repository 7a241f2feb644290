//! Test utilities for console integration tests

use acomms_c2_router::{
    AcousticConsole, AcousticFrame, OperationHandle, OperationState, RecordingTransport,
};
use acomms_core::{ConsoleConfig, RELAY_SERVICE};
use std::sync::Arc;
use std::time::Duration;

/// Config with discovery off and short correlator timings
pub fn test_config() -> ConsoleConfig {
    let mut config = ConsoleConfig::default_config();
    config.network.console_name = "ccu-test".to_string();
    config.discovery.enabled = false;
    config.correlator.operation_timeout_secs = 30;
    config.correlator.sweep_interval_secs = 5;
    config
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("acomms_c2_router=debug")
        .with_test_writer()
        .try_init();
}

/// A console wired to a recording transport
pub struct Harness {
    pub transport: Arc<RecordingTransport>,
    pub console: AcousticConsole,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ConsoleConfig) -> Self {
        init_tracing();
        let transport = Arc::new(RecordingTransport::new());
        let console = AcousticConsole::new(&config, transport.clone());
        Self { transport, console }
    }

    /// Register a relay gateway, optionally marking it active
    pub fn relay(&self, name: &str, active: bool) -> &Self {
        let services = vec![RELAY_SERVICE.to_string()];
        self.console.registry().observe(name, Some(&services), None);
        if active {
            self.console.registry().mark_active(name);
        }
        self
    }

    /// Decoded frames sent to `gateway`, in send order
    pub fn frames_to(&self, gateway: &str) -> Vec<AcousticFrame> {
        self.transport
            .sent_to(gateway)
            .iter()
            .map(|frame| AcousticFrame::decode(&frame.bytes).expect("frame decodes"))
            .collect()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until the operation's dispatch task has finished.
///
/// Sleeps rather than yields so a paused clock can auto-advance through
/// pacing waits.
pub async fn until_dispatched(handle: &OperationHandle) {
    while matches!(
        handle.state(),
        OperationState::Created | OperationState::Dispatching
    ) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
