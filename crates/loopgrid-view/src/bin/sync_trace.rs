//! Headless reconciliation trace
//!
//! Drives the sync loop against a scripted in-process engine bridge and
//! prints the resulting layout after each cycle. Useful for eyeballing
//! offset/wrap behavior without a real engine: the script replays a
//! three-clip session (anchors 0 / ~2Q / ~7Q from a real log) including
//! the live-recording phases in between.
//!
//! Run with: cargo run --bin sync-trace
//! Set RUST_LOG=debug for per-node reconciliation logging.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use loopgrid_core::client::EngineClient;
use loopgrid_core::protocol::EngineRequest;
use loopgrid_core::types::{ClipSnapshot, GraphState, InputList};
use loopgrid_view::config::ViewConfig;
use loopgrid_view::sync::SyncLoop;

/// Quantum established by the first clip (samples)
const Q: i64 = 175_616;

fn clip(id: &str, anchor: i64, duration: i64, recording: bool, peak: f32) -> ClipSnapshot {
    ClipSnapshot {
        id: id.to_string(),
        name: id.to_uppercase(),
        anchor_phase: anchor,
        duration,
        effective_quantum: if recording && anchor == 0 { 0 } else { Q },
        is_recording: recording,
        current_peak: peak,
        w: 200.0,
        h: 100.0,
        y: 80.0,
        ..Default::default()
    }
}

/// The scripted session, one snapshot per poll cycle
fn session_script() -> Vec<GraphState> {
    let mut states = Vec::new();

    // Clip A records from silence; the quantum doesn't exist yet
    for step in 1..=3i64 {
        states.push(GraphState {
            is_playing: true,
            master_pos: step * Q / 3,
            soloed_id: None,
            nodes: vec![clip("a", 0, step * Q / 3, true, 0.4)],
        });
    }

    // A completes at exactly one quantum; B starts near 2Q
    states.push(GraphState {
        is_playing: true,
        master_pos: 346_607,
        soloed_id: None,
        nodes: vec![clip("a", 0, Q, false, 0.0), clip("b", 346_607, 1000, true, 0.7)],
    });

    // B completes at 3Q; C starts near 7Q
    states.push(GraphState {
        is_playing: true,
        master_pos: 1_224_687,
        soloed_id: None,
        nodes: vec![
            clip("a", 0, Q, false, 0.0),
            clip("b", 346_607, 526_848, false, 0.0),
            clip("c", 1_224_687, 2000, true, 0.9),
        ],
    });

    // All three known and complete
    states.push(GraphState {
        is_playing: true,
        master_pos: 450_000,
        soloed_id: None,
        nodes: vec![
            clip("a", 0, Q, false, 0.0),
            clip("b", 346_607, 526_848, false, 0.0),
            clip("c", 1_224_687, 734_208, false, 0.0),
        ],
    });

    states
}

/// Serve the script from a background thread, holding the final state
fn spawn_scripted_bridge(states: Vec<GraphState>, timeout: Duration) -> EngineClient {
    let (client, request_rx) = EngineClient::channel(timeout);

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
                EngineRequest::GetWaveform { resolution, reply, .. } => {
                    // A plausible finalized peak set: a soft ramp
                    let peaks = (0..resolution)
                        .map(|i| 0.1 + 0.8 * (i as f32 / resolution as f32))
                        .collect();
                    let _ = reply.send(peaks);
                }
                EngineRequest::GetInputList { reply } => {
                    let _ = reply.send(InputList {
                        inputs: vec!["Input 1".to_string(), "Input 2".to_string()],
                    });
                }
                EngineRequest::Command(command) => {
                    log::info!("bridge: command {:?}", command);
                }
                EngineRequest::Shutdown => break,
            }
        }
    });

    client
}

fn print_cycle(cycle: usize, sync: &SyncLoop) {
    let model = sync.model();
    println!(
        "cycle {:2}  quantum={:7}  wrap={:8} ({:.2}Q)  nodes={}  ghosts={}  buttons={}",
        cycle,
        model.effective_quantum,
        model.wrap_period,
        if model.effective_quantum > 0 {
            model.wrap_period as f64 / model.effective_quantum as f64
        } else {
            0.0
        },
        model.nodes.len(),
        model.ghosts.len(),
        model.stack_buttons.len(),
    );

    for node in model.nodes.values() {
        let peaks = sync.waveform(&node.snapshot.id).map_or(0, |p| p.len());
        println!(
            "          {}  x={:6.1}px  dur={:7}  rec={}  one-shot={}  peaks={}",
            node.snapshot.id,
            node.visual_x,
            node.snapshot.duration,
            node.snapshot.is_recording,
            node.one_shot,
            peaks,
        );
    }
    for ghost in &model.ghosts {
        println!(
            "          ghost {}  x={:6.1}px  w={:.1}px  active={}",
            ghost.id, ghost.x, ghost.w, ghost.active
        );
    }
    for button in &model.stack_buttons {
        println!(
            "          button {}  x={}  y={}",
            button.id, button.x, button.y
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    println!("loopgrid sync-trace: scripted three-clip session (Q = {} samples)", Q);
    println!();

    let config = ViewConfig::default();
    let client = spawn_scripted_bridge(
        session_script(),
        Duration::from_millis(config.sync.request_timeout_ms),
    );
    let mut sync = SyncLoop::new(client.clone(), config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to build runtime")?;

    runtime.block_on(async {
        // A few extra cycles past the script so finalized waveform
        // fetches land and the layout settles
        for cycle in 1..=9 {
            if !sync.cycle().await {
                break;
            }
            print_cycle(cycle, &sync);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    client.shutdown();

    let model = sync.model();
    println!();
    println!(
        "final: wrap period {} samples, offsets {:?}",
        model.wrap_period,
        model
            .nodes
            .values()
            .map(|node| node.visual_x)
            .collect::<Vec<_>>(),
    );

    Ok(())
}
