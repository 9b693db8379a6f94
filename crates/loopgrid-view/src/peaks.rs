//! Live waveform peak accumulation
//!
//! One peak buffer per node id, owned exclusively here and mutated only
//! from the reconciliation cycle. While a node records, the sparse polled
//! `current_peak` samples accumulate into display buckets; once recording
//! stops, the coarse live buffer is replaced by a finalized peak set
//! fetched from the engine, guarded single-flight per id.

use std::collections::{HashMap, HashSet};

use loopgrid_core::ClipSnapshot;

/// Visibility floor so silent recordings still draw a baseline
pub const PEAK_FLOOR: f32 = 0.01;

/// A buffer shorter than this is still the coarse live-recording buffer,
/// not a real exported peak set
pub const MIN_EXPORTED_PEAKS: usize = 20;

/// A finalized-waveform fetch the caller must perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub id: String,
    pub resolution: usize,
}

/// Peak buffer cache keyed by node id
#[derive(Debug, Default)]
pub struct WaveformAccumulator {
    buffers: HashMap<String, Vec<f32>>,
    in_flight: HashSet<String>,
}

impl WaveformAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one polled snapshot into the cache
    ///
    /// Returns a [`FetchRequest`] when a finalized peak set should be
    /// fetched for this node; the caller performs the fetch and reports
    /// back through [`apply_fetch`](Self::apply_fetch). At most one fetch
    /// per id is requested at a time.
    pub fn observe(
        &mut self,
        snapshot: &ClipSnapshot,
        resolution_per_quantum: usize,
        waveform_resolution: usize,
    ) -> Option<FetchRequest> {
        if snapshot.is_recording {
            self.write_live(snapshot, resolution_per_quantum);
            return None;
        }

        if snapshot.duration > 0 {
            // A missing or implausibly short buffer means we only have the
            // coarse live data; fetch the exported peaks exactly once
            let plausible = self
                .buffers
                .get(&snapshot.id)
                .is_some_and(|buffer| buffer.len() >= MIN_EXPORTED_PEAKS);
            if !plausible && !self.in_flight.contains(&snapshot.id) {
                self.in_flight.insert(snapshot.id.clone());
                return Some(FetchRequest {
                    id: snapshot.id.clone(),
                    resolution: waveform_resolution,
                });
            }
        }

        // duration == 0: leave any existing buffer alone; reset() owns clearing
        None
    }

    fn write_live(&mut self, snapshot: &ClipSnapshot, resolution_per_quantum: usize) {
        let resolution = resolution_per_quantum.max(1);
        let buffer = self
            .buffers
            .entry(snapshot.id.clone())
            .or_insert_with(|| vec![PEAK_FLOOR; resolution]);

        let peak = snapshot.current_peak.max(PEAK_FLOOR);

        if snapshot.effective_quantum <= 0 {
            // The session's first recording has no quantum yet, so bucket
            // indexing is undefined; append one slot per observation
            buffer.push(peak);
            return;
        }

        let progress = snapshot.duration as f64 / snapshot.effective_quantum as f64;
        let index = (progress * resolution as f64).floor() as usize;

        // Grow, never shrink; new slots start at the floor
        if index >= buffer.len() {
            buffer.resize(index + 1, PEAK_FLOOR);
        }

        // Monotonic-max write: a louder burst within the same bucket is
        // never overwritten by a later quieter sample
        buffer[index] = buffer[index].max(peak);
    }

    /// Discard a node's buffer ahead of a new take
    ///
    /// Called on the not-recording to about-to-record transition, before
    /// the first observe of the new take. Also orphans any in-flight
    /// fetch so peaks from the previous take can't land in the new one.
    pub fn reset(&mut self, id: &str) {
        self.buffers.remove(id);
        self.in_flight.remove(id);
    }

    /// Drop all state for a node that left the snapshot
    pub fn evict(&mut self, id: &str) {
        self.buffers.remove(id);
        self.in_flight.remove(id);
    }

    /// Apply the outcome of a finalized-waveform fetch
    ///
    /// `None` means the fetch failed; the prior buffer stays and a later
    /// qualifying cycle may retry. Completions for ids that were evicted
    /// or reset in the meantime fail the in-flight check and are dropped.
    pub fn apply_fetch(&mut self, id: &str, peaks: Option<Vec<f32>>) {
        if !self.in_flight.remove(id) {
            log::debug!("apply_fetch: discarding stale waveform result for {}", id);
            return;
        }

        match peaks {
            Some(peaks) if !peaks.is_empty() => {
                log::debug!("apply_fetch: {} peaks for {}", peaks.len(), id);
                self.buffers.insert(id.to_string(), peaks);
            }
            _ => {
                // Keep whatever we had; the short buffer will trigger a retry
                log::warn!("apply_fetch: empty or failed waveform fetch for {}", id);
            }
        }
    }

    /// Read-only peak view for the render boundary
    pub fn peaks(&self, id: &str) -> Option<&[f32]> {
        self.buffers.get(id).map(Vec::as_slice)
    }

    /// True while a fetch for this id is outstanding
    pub fn fetch_in_flight(&self, id: &str) -> bool {
        self.in_flight.contains(id)
    }
}
