//! Engine lifecycle state and diagnostics.

use serde::{Deserialize, Serialize};

use crate::priority::PortType;

/// Current state of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Started, backend not seen yet
    #[default]
    Initializing,
    /// Cold reconciliation in progress
    Reconciling,
    /// Normal operation
    Running,
    /// Backend went away, mirror torn down
    BackendDisconnected,
    /// Graceful shutdown in progress
    ShuttingDown,
}

impl EngineState {
    /// Whether the mirror is populated and events should be applied.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Reconciling | Self::Running)
    }
}

/// Sizes of the mirrored collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorCounts {
    pub cards: usize,
    pub sinks: usize,
    pub sources: usize,
    pub sink_inputs: usize,
}

/// Internal counters for troubleshooting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub state: EngineState,
    /// Number of cold initializations so far
    pub epoch: u64,
    pub mirror: MirrorCounts,
    pub output_auto_switch_count: u32,
    pub input_auto_switch_count: u32,
    pub output_priorities: Vec<PortType>,
    pub input_priorities: Vec<PortType>,
}
