//! Request and command protocol for the engine bridge
//!
//! The view layer talks to the engine through a single request channel.
//! Requests are request-reply pairs carrying a oneshot sender, so the
//! caller can await the answer with a bounded timeout; commands are
//! fire-and-forget and must be idempotent-safe to issue against a stale
//! local view (their effect is only observed via the next poll).

use tokio::sync::oneshot;

use crate::types::{GraphState, InputList, NodeKind};

// ============================================================================
// Requests (Request-Reply)
// ============================================================================

/// Requests sent to the engine bridge
///
/// Each request includes a oneshot sender for the reply. A bridge that
/// cannot answer drops the sender, which the client surfaces as
/// [`EngineError::NoReply`](crate::error::EngineError::NoReply).
pub enum EngineRequest {
    /// Full graph snapshot, polled every cycle
    GetGraphState {
        reply: oneshot::Sender<GraphState>,
    },

    /// Finalized waveform peaks for one node
    GetWaveform {
        id: String,
        resolution: usize,
        reply: oneshot::Sender<Vec<f32>>,
    },

    /// Available hardware inputs, fetched once on readiness
    GetInputList {
        reply: oneshot::Sender<InputList>,
    },

    /// Fire-and-forget command
    Command(EngineCommand),

    /// Shut down the serving bridge
    Shutdown,
}

// ============================================================================
// Commands (Fire-and-Forget)
// ============================================================================

/// Commands issued by user-input handlers
///
/// Results are never consumed by the view core; the effect shows up in a
/// later snapshot, or not at all if the target id is already gone.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// Create a new node of the given kind in the focused box
    CreateNode { kind: NodeKind },
    /// Move focus into a sub-box
    EnterBox { id: String },
    /// Return focus to the parent box
    ExitBox,
    /// Toggle global transport
    TogglePlayback,
    /// Arm recording on a node
    StartRecording { id: String },
    /// Request recording stop on a node
    StopRecording { id: String },
    ToggleMute { id: String },
    ToggleSolo { id: String },
    Rename { id: String, name: String },
    /// Select the hardware input channel feeding a node
    SetInput { id: String, channel: usize },
    /// Set the non-destructive loop points for a node
    SetLoopPoints { id: String, start: i64, end: i64 },
}
