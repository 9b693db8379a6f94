//! Async client for the engine bridge
//!
//! Wraps the request channel in typed calls. Every request is bounded by
//! a timeout so a stalled engine can never hang the poll loop; commands
//! are fire-and-forget. The serving side (native bridge in production, a
//! scripted thread in tests) consumes [`EngineRequest`]s from the paired
//! receiver.

use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use tokio::sync::oneshot;

use crate::error::{EngineError, EngineResult};
use crate::protocol::{EngineCommand, EngineRequest};
use crate::types::{GraphState, InputList};

/// Client handle for issuing engine requests and commands
///
/// Cheap to clone; all clones share the same request channel.
#[derive(Clone)]
pub struct EngineClient {
    request_tx: Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineClient {
    /// Create a client and the receiver a bridge must serve
    pub fn channel(timeout: Duration) -> (Self, Receiver<EngineRequest>) {
        let (request_tx, request_rx) = crossbeam::channel::unbounded();
        (
            Self {
                request_tx,
                timeout,
            },
            request_rx,
        )
    }

    /// Poll the full graph snapshot
    pub async fn graph_state(&self) -> EngineResult<GraphState> {
        let (tx, rx) = oneshot::channel();
        self.request(EngineRequest::GetGraphState { reply: tx }, rx)
            .await
    }

    /// Fetch finalized waveform peaks for one node
    pub async fn waveform(&self, id: &str, resolution: usize) -> EngineResult<Vec<f32>> {
        let (tx, rx) = oneshot::channel();
        self.request(
            EngineRequest::GetWaveform {
                id: id.to_string(),
                resolution,
                reply: tx,
            },
            rx,
        )
        .await
    }

    /// Fetch the hardware input list
    pub async fn input_list(&self) -> EngineResult<InputList> {
        let (tx, rx) = oneshot::channel();
        self.request(EngineRequest::GetInputList { reply: tx }, rx)
            .await
    }

    /// Issue a fire-and-forget command
    ///
    /// A disconnected bridge is logged, not surfaced: commands are safe to
    /// drop and the poll loop notices the disconnect on its own.
    pub fn command(&self, command: EngineCommand) {
        if self
            .request_tx
            .send(EngineRequest::Command(command))
            .is_err()
        {
            log::warn!("command dropped: engine bridge disconnected");
        }
    }

    /// Ask the serving bridge to shut down
    pub fn shutdown(&self) {
        let _ = self.request_tx.send(EngineRequest::Shutdown);
    }

    async fn request<T>(
        &self,
        request: EngineRequest,
        reply_rx: oneshot::Receiver<T>,
    ) -> EngineResult<T> {
        self.request_tx
            .send(request)
            .map_err(|_| EngineError::Disconnected)?;

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(EngineError::NoReply),
            Err(_) => Err(EngineError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}
