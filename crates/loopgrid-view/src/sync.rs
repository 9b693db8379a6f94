//! Engine snapshot reconciliation
//!
//! The loop polls the engine bridge on a fixed cadence and diffs every
//! complete snapshot against the persistent view model: create-or-update
//! each reported node, destroy nodes that vanished, then rebuild the
//! ephemeral ghosts and stack buttons from scratch. A failed poll skips
//! the whole apply phase - the previous complete view model stays up, so
//! a partial snapshot is never rendered.
//!
//! Finalized waveform fetches run as spawned tasks on the same
//! cooperative scheduler; their completions are drained at the start of
//! the next cycle and checked against liveness before applying, which is
//! all the cancellation the single-flight guard needs.

use std::time::Duration;

use tokio::sync::mpsc;

use loopgrid_core::client::EngineClient;
use loopgrid_core::error::EngineError;
use loopgrid_core::types::GraphState;

use crate::config::ViewConfig;
use crate::geometry::{self, QuantumGrid};
use crate::ghosts::{self, TileSpec};
use crate::model::{ViewModel, ViewNode};
use crate::peaks::{FetchRequest, WaveformAccumulator};
use crate::stacks::{self, StackEntry};

/// Outcome of one finalized-waveform fetch, funneled back to the cycle
type FetchOutcome = (String, Option<Vec<f32>>);

/// Polls the engine and maintains the view model
pub struct SyncLoop {
    client: EngineClient,
    config: ViewConfig,
    model: ViewModel,
    peaks: WaveformAccumulator,
    fetch_tx: mpsc::UnboundedSender<FetchOutcome>,
    fetch_rx: mpsc::UnboundedReceiver<FetchOutcome>,
    inputs_fetched: bool,
}

impl SyncLoop {
    pub fn new(client: EngineClient, config: ViewConfig) -> Self {
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        Self {
            client,
            config,
            model: ViewModel::new(),
            peaks: WaveformAccumulator::new(),
            fetch_tx,
            fetch_rx,
            inputs_fetched: false,
        }
    }

    /// The view model as of the last completed cycle
    pub fn model(&self) -> &ViewModel {
        &self.model
    }

    /// Peak sequence for one node, for the waveform surface
    pub fn waveform(&self, id: &str) -> Option<&[f32]> {
        self.peaks.peaks(id)
    }

    /// Run forever at the configured cadence
    ///
    /// Returns only when the engine bridge disconnects for good.
    pub async fn run(&mut self) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.sync.poll_interval_ms));
        // A slow engine round trip must not be followed by a burst of
        // catch-up polls
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        log::info!(
            "sync loop started (interval {}ms)",
            self.config.sync.poll_interval_ms
        );

        loop {
            ticker.tick().await;
            if !self.cycle().await {
                break;
            }
        }

        log::info!("sync loop stopped: engine bridge disconnected");
    }

    /// One fetch/apply cycle; false once the bridge is gone
    pub async fn cycle(&mut self) -> bool {
        match self.client.graph_state().await {
            Ok(state) => {
                self.apply(state);
            }
            Err(EngineError::Disconnected) => return false,
            Err(e) => {
                // Never partially apply a failed fetch; retry next interval
                log::warn!("graph state poll failed, skipping cycle: {}", e);
                return true;
            }
        }

        // Readiness: the first successful poll triggers the one-time
        // input list fetch (retried until it succeeds, then never again)
        if !self.inputs_fetched {
            match self.client.input_list().await {
                Ok(list) => {
                    log::info!("input list: {} channels", list.inputs.len());
                    self.model.inputs = list.inputs;
                    self.inputs_fetched = true;
                }
                Err(e) => log::warn!("input list fetch failed: {}", e),
            }
        }

        true
    }

    /// Diff one complete snapshot into the view model
    fn apply(&mut self, mut state: GraphState) {
        self.drain_fetches();

        for snapshot in &mut state.nodes {
            snapshot.sanitize();
        }

        let quantum_changed = self.derive_quantum(&state);
        self.derive_wrap_period(&state, quantum_changed);

        let grid = QuantumGrid {
            context_anchor: 0,
            effective_quantum: self.model.effective_quantum,
            wrap_period: self.model.wrap_period,
            base_width: self.config.display.base_quantum_width,
            snap_tolerance: self.config.display.snap_tolerance,
            wrap_fold_epsilon: self.config.display.wrap_fold_epsilon,
        };

        // Create-or-update pass; removals only happen after every
        // reported node has landed, so an id can never render twice
        for snapshot in &state.nodes {
            let was_arming = self
                .model
                .nodes
                .get(&snapshot.id)
                .map(|node| node.snapshot.is_recording || node.snapshot.is_pending_start)
                .unwrap_or(false);
            let now_arming = snapshot.is_recording || snapshot.is_pending_start;
            if now_arming && !was_arming {
                log::debug!("node {} armed for a new take", snapshot.id);
                self.peaks.reset(&snapshot.id);
            }

            if let Some(request) = self.peaks.observe(
                snapshot,
                self.config.display.live_resolution_per_quantum,
                self.config.display.waveform_resolution,
            ) {
                self.spawn_fetch(request);
            }

            let visual_x = geometry::visual_offset(snapshot.anchor_phase, &grid);
            let one_shot = snapshot.is_one_shot(self.model.effective_quantum);

            let node = self
                .model
                .nodes
                .entry(snapshot.id.clone())
                .or_insert_with(|| ViewNode::new(snapshot.clone()));
            node.snapshot = snapshot.clone();
            node.visual_x = visual_x;
            node.one_shot = one_shot;
        }

        // Removal pass: ids absent from this snapshot die, caches included
        let gone: Vec<String> = self
            .model
            .nodes
            .keys()
            .filter(|id| !state.nodes.iter().any(|node| &node.id == *id))
            .cloned()
            .collect();
        for id in gone {
            log::debug!("node {} removed", id);
            self.model.nodes.remove(&id);
            self.peaks.evict(&id);
        }

        self.model.is_playing = state.is_playing;
        self.model.master_pos = state.master_pos;
        self.model.soloed_id = state.soloed_id;

        self.rebuild_ghosts();
        self.rebuild_stacks();
    }

    /// Re-derive the session quantum; true if it changed illegally
    fn derive_quantum(&mut self, state: &GraphState) -> bool {
        let reported = state
            .nodes
            .iter()
            .map(|node| node.effective_quantum)
            .find(|&q| q > 0)
            .unwrap_or(0);

        let changed = self.model.effective_quantum > 0
            && reported > 0
            && reported != self.model.effective_quantum;
        if changed {
            // The quantum is supposed to be stable for the whole session;
            // re-derive everything rather than render a mixed grid
            log::warn!(
                "effective quantum changed {} -> {}; re-deriving wrap period",
                self.model.effective_quantum,
                reported
            );
        }
        if reported > 0 {
            self.model.effective_quantum = reported;
        }
        changed
    }

    /// Recompute the wrap period from the full known set
    ///
    /// Shrinking would retroactively move nodes already on screen, so a
    /// smaller recomputed value is discarded while any node displayed
    /// last cycle is still present. A quantum change lifts the guard.
    fn derive_wrap_period(&mut self, state: &GraphState, quantum_changed: bool) {
        if self.model.effective_quantum <= 0 {
            self.model.wrap_period = 0;
            return;
        }

        let anchors: Vec<i64> = state.nodes.iter().map(|node| node.anchor_phase).collect();
        let completed: Vec<i64> = state
            .nodes
            .iter()
            .filter(|node| !node.is_recording && node.duration > 0)
            .map(|node| node.duration)
            .collect();

        let recomputed = geometry::wrap_period(&anchors, &completed, self.model.effective_quantum);

        let survivors = state
            .nodes
            .iter()
            .any(|node| self.model.nodes.contains_key(&node.id));
        if !quantum_changed && survivors && recomputed < self.model.wrap_period {
            log::debug!(
                "wrap period recomputed smaller ({} < {}); keeping previous",
                recomputed,
                self.model.wrap_period
            );
            return;
        }

        self.model.wrap_period = recomputed;
    }

    fn spawn_fetch(&self, request: FetchRequest) {
        log::debug!(
            "fetching finalized waveform for {} ({} peaks)",
            request.id,
            request.resolution
        );

        let client = self.client.clone();
        let fetch_tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let outcome = match client.waveform(&request.id, request.resolution).await {
                Ok(peaks) => Some(peaks),
                Err(e) => {
                    log::warn!("waveform fetch for {} failed: {}", request.id, e);
                    None
                }
            };
            let _ = fetch_tx.send((request.id, outcome));
        });
    }

    fn drain_fetches(&mut self) {
        while let Ok((id, outcome)) = self.fetch_rx.try_recv() {
            self.peaks.apply_fetch(&id, outcome);
        }
    }

    fn rebuild_ghosts(&mut self) {
        let quantum = self.model.effective_quantum;
        let longest = self.model.longest_completed_duration();
        let display = &self.config.display;

        // The global cursor only exists while the transport runs
        let cursor_px = if self.model.is_playing && quantum > 0 && longest > 0 {
            Some(geometry::samples_to_px(
                geometry::floor_mod(self.model.master_pos, longest),
                quantum,
                display.base_quantum_width,
            ))
        } else {
            None
        };

        let mut tiles = Vec::new();
        for node in self.model.nodes.values_mut() {
            // A live counter is not a final length; no ghosts while recording
            if node.snapshot.is_recording {
                node.playhead_suppressed = false;
                continue;
            }

            let spec = TileSpec {
                id: &node.snapshot.id,
                visual_x: node.visual_x,
                y: node.snapshot.y,
                h: node.snapshot.h,
                duration: node.snapshot.duration,
            };
            let (mut node_tiles, suppressed) = ghosts::ghost_tiles(
                &spec,
                longest,
                quantum,
                display.base_quantum_width,
                display.ghost_limit,
                cursor_px,
            );
            node.playhead_suppressed = suppressed;
            tiles.append(&mut node_tiles);
        }
        self.model.ghosts = tiles;
    }

    fn rebuild_stacks(&mut self) {
        let entries: Vec<StackEntry> = self
            .model
            .nodes
            .values()
            .map(|node| StackEntry {
                id: node.snapshot.id.clone(),
                x: node.visual_x,
                y: node.snapshot.y,
                h: node.snapshot.h,
            })
            .collect();
        self.model.stack_buttons =
            stacks::stack_buttons(&entries, self.config.display.stack_tolerance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopgrid_core::protocol::EngineRequest;
    use loopgrid_core::types::{ClipSnapshot, InputList};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    const Q: i64 = 175_616;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap()
    }

    /// A bridge thread that replays a scripted sequence of snapshots,
    /// holding the last one once the script runs out
    struct ScriptedBridge {
        client: EngineClient,
        input_requests: Arc<AtomicUsize>,
    }

    fn spawn_bridge(
        states: Vec<GraphState>,
        waveforms: HashMap<String, Vec<f32>>,
    ) -> ScriptedBridge {
        let (client, request_rx) = EngineClient::channel(Duration::from_millis(200));
        let input_requests = Arc::new(AtomicUsize::new(0));
        let input_counter = input_requests.clone();

        thread::spawn(move || {
            let mut remaining = states.into_iter();
            let mut current = GraphState::default();
            while let Ok(request) = request_rx.recv() {
                match request {
                    EngineRequest::GetGraphState { reply } => {
                        if let Some(next) = remaining.next() {
                            current = next;
                        }
                        let _ = reply.send(current.clone());
                    }
                    EngineRequest::GetWaveform { id, reply, .. } => {
                        match waveforms.get(&id) {
                            Some(peaks) => {
                                let _ = reply.send(peaks.clone());
                            }
                            // No data: drop the reply, the client sees null
                            None => drop(reply),
                        }
                    }
                    EngineRequest::GetInputList { reply } => {
                        input_counter.fetch_add(1, Ordering::SeqCst);
                        let _ = reply.send(InputList {
                            inputs: vec!["Input 1".to_string()],
                        });
                    }
                    EngineRequest::Command(_) => {}
                    EngineRequest::Shutdown => break,
                }
            }
        });

        ScriptedBridge {
            client,
            input_requests,
        }
    }

    fn completed(id: &str, anchor: i64, duration: i64) -> ClipSnapshot {
        ClipSnapshot {
            id: id.to_string(),
            anchor_phase: anchor,
            duration,
            effective_quantum: Q,
            w: 200.0,
            h: 100.0,
            ..Default::default()
        }
    }

    fn recording(id: &str, anchor: i64, duration: i64, peak: f32) -> ClipSnapshot {
        ClipSnapshot {
            current_peak: peak,
            is_recording: true,
            ..completed(id, anchor, duration)
        }
    }

    fn graph(nodes: Vec<ClipSnapshot>) -> GraphState {
        GraphState {
            nodes,
            ..Default::default()
        }
    }

    fn sync_loop(bridge: &ScriptedBridge) -> SyncLoop {
        SyncLoop::new(bridge.client.clone(), ViewConfig::default())
    }

    #[test]
    fn test_node_lifecycle() {
        let bridge = spawn_bridge(
            vec![
                graph(vec![completed("a", 0, Q)]),
                graph(vec![completed("a", 0, Q), completed("b", 2 * Q, Q)]),
                graph(vec![completed("b", 2 * Q, Q)]),
            ],
            HashMap::new(),
        );
        let mut sync = sync_loop(&bridge);

        runtime().block_on(async {
            sync.cycle().await;
            assert_eq!(sync.model().nodes.len(), 1);

            sync.cycle().await;
            assert_eq!(sync.model().nodes.len(), 2);

            sync.cycle().await;
            assert_eq!(sync.model().nodes.len(), 1);
            assert!(sync.model().node("a").is_none());
            assert!(sync.model().node("b").is_some());
        });

        bridge.client.shutdown();
    }

    #[test]
    fn test_session_offsets_and_wrap_period() {
        // The logged three-clip session: anchors 0 / ~2Q / ~7Q
        let nodes = vec![
            completed("a", 0, Q),
            completed("b", 346_607, 526_848),
            completed("c", 1_224_687, 734_208),
        ];
        let bridge = spawn_bridge(vec![graph(nodes)], HashMap::new());
        let mut sync = sync_loop(&bridge);

        runtime().block_on(sync.cycle());

        let model = sync.model();
        assert_eq!(model.effective_quantum, Q);
        assert_eq!(model.wrap_period, 1_224_687 + Q);
        assert_eq!(model.node("a").unwrap().visual_x, 0.0);
        assert_eq!(model.node("b").unwrap().visual_x, 200.0);
        assert_eq!(model.node("c").unwrap().visual_x, 1200.0);

        bridge.client.shutdown();
    }

    #[test]
    fn test_wrap_period_never_shrinks_for_survivors() {
        let bridge = spawn_bridge(
            vec![
                // b's anchor at 7Q stretches the period to 8Q
                graph(vec![completed("a", 0, Q), completed("b", 7 * Q, Q)]),
                // b vanishes; a alone would recompute to 1Q, but a is
                // still anchored against the old period
                graph(vec![completed("a", 0, Q)]),
            ],
            HashMap::new(),
        );
        let mut sync = sync_loop(&bridge);

        runtime().block_on(async {
            sync.cycle().await;
            assert_eq!(sync.model().wrap_period, 8 * Q);

            sync.cycle().await;
            assert_eq!(sync.model().wrap_period, 8 * Q);
        });

        bridge.client.shutdown();
    }

    #[test]
    fn test_quantum_change_rederives_wrap_period() {
        let mut changed = completed("a", 0, 2 * Q);
        changed.effective_quantum = 2 * Q;

        let bridge = spawn_bridge(
            vec![
                graph(vec![completed("a", 0, Q), completed("b", 7 * Q, Q)]),
                graph(vec![changed]),
            ],
            HashMap::new(),
        );
        let mut sync = sync_loop(&bridge);

        runtime().block_on(async {
            sync.cycle().await;
            assert_eq!(sync.model().wrap_period, 8 * Q);

            // The reported quantum changed, so the shrink guard lifts
            sync.cycle().await;
            assert_eq!(sync.model().effective_quantum, 2 * Q);
            assert_eq!(sync.model().wrap_period, 2 * Q);
        });

        bridge.client.shutdown();
    }

    #[test]
    fn test_recording_then_finalized_fetch() {
        let mut waveforms = HashMap::new();
        waveforms.insert("a".to_string(), vec![0.6; 200]);

        let bridge = spawn_bridge(
            vec![
                graph(vec![recording("a", 0, 100, 0.9)]),
                graph(vec![completed("a", 0, Q)]),
                graph(vec![completed("a", 0, Q)]),
            ],
            waveforms,
        );
        let mut sync = sync_loop(&bridge);

        runtime().block_on(async {
            // Live accumulation
            sync.cycle().await;
            assert!(sync.waveform("a").unwrap().contains(&0.9));

            // Recording stopped: the fetch task is spawned this cycle...
            sync.cycle().await;
            tokio::time::sleep(Duration::from_millis(50)).await;

            // ...and its completion is drained at the next apply
            sync.cycle().await;
            let peaks = sync.waveform("a").unwrap();
            assert_eq!(peaks.len(), 200);
            assert!(peaks.iter().all(|&p| p == 0.6));
        });

        bridge.client.shutdown();
    }

    #[test]
    fn test_record_transition_resets_buffer() {
        let mut pending = completed("a", 0, Q);
        pending.is_pending_start = true;

        let bridge = spawn_bridge(
            vec![
                graph(vec![recording("a", 0, 100, 0.9)]),
                graph(vec![completed("a", 0, Q)]),
                graph(vec![pending]),
                graph(vec![recording("a", 0, 50, 0.1)]),
            ],
            HashMap::new(),
        );
        let mut sync = sync_loop(&bridge);

        runtime().block_on(async {
            sync.cycle().await;
            assert!(sync.waveform("a").unwrap().contains(&0.9));
            sync.cycle().await;

            // Arming for the new take discards the old peaks
            sync.cycle().await;
            sync.cycle().await;
            assert!(sync.waveform("a").unwrap().iter().all(|&p| p < 0.9));
        });

        bridge.client.shutdown();
    }

    #[test]
    fn test_ghosts_and_suppression_through_cycle() {
        let state = GraphState {
            is_playing: true,
            // Cursor at 2.5Q: inside a's second ghost
            master_pos: 5 * Q / 2,
            soloed_id: None,
            nodes: vec![completed("a", 0, Q), completed("b", 0, 3 * Q)],
        };
        let bridge = spawn_bridge(vec![state], HashMap::new());
        let mut sync = sync_loop(&bridge);

        runtime().block_on(sync.cycle());

        let model = sync.model();
        // a (1Q) tiles twice to fill b's 3Q extent; b itself gets none
        assert_eq!(model.ghosts.len(), 2);
        assert!(model.ghosts.iter().all(|ghost| ghost.source_id == "a"));
        assert!(model.ghosts[1].active);
        assert!(model.node("a").unwrap().playhead_suppressed);
        assert!(!model.node("b").unwrap().playhead_suppressed);

        bridge.client.shutdown();
    }

    #[test]
    fn test_stack_buttons_through_cycle() {
        let bridge = spawn_bridge(
            vec![graph(vec![
                completed("a", 0, Q),
                completed("b", 0, Q),
                completed("c", 5 * Q, Q),
            ])],
            HashMap::new(),
        );
        let mut sync = sync_loop(&bridge);

        runtime().block_on(sync.cycle());

        let buttons = &sync.model().stack_buttons;
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0].anchor_id, "a");
        assert_eq!(buttons[1].anchor_id, "c");

        bridge.client.shutdown();
    }

    #[test]
    fn test_input_list_fetched_once() {
        let bridge = spawn_bridge(vec![graph(vec![])], HashMap::new());
        let mut sync = sync_loop(&bridge);

        runtime().block_on(async {
            sync.cycle().await;
            sync.cycle().await;
            sync.cycle().await;
        });

        assert_eq!(bridge.input_requests.load(Ordering::SeqCst), 1);
        assert_eq!(sync.model().inputs, vec!["Input 1".to_string()]);

        bridge.client.shutdown();
    }

    #[test]
    fn test_failed_poll_keeps_previous_view() {
        let (client, request_rx) = EngineClient::channel(Duration::from_millis(200));

        // First poll succeeds, later polls return null
        thread::spawn(move || {
            let mut polled = false;
            while let Ok(request) = request_rx.recv() {
                match request {
                    EngineRequest::GetGraphState { reply } => {
                        if polled {
                            drop(reply);
                        } else {
                            polled = true;
                            let _ = reply.send(graph(vec![completed("a", 0, Q)]));
                        }
                    }
                    EngineRequest::GetInputList { reply } => {
                        let _ = reply.send(InputList::default());
                    }
                    EngineRequest::Shutdown => break,
                    _ => {}
                }
            }
        });

        let mut sync = SyncLoop::new(client.clone(), ViewConfig::default());
        runtime().block_on(async {
            sync.cycle().await;
            assert_eq!(sync.model().nodes.len(), 1);

            // The apply phase is skipped entirely; last good state stays
            assert!(sync.cycle().await);
            assert_eq!(sync.model().nodes.len(), 1);
        });

        client.shutdown();
    }

    #[test]
    fn test_disconnect_stops_the_loop() {
        let (client, request_rx) = EngineClient::channel(Duration::from_millis(200));
        drop(request_rx);

        let mut sync = SyncLoop::new(client, ViewConfig::default());
        assert!(!runtime().block_on(sync.cycle()));
    }
}
