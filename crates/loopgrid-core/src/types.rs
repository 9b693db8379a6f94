//! Snapshot types reported by the audio engine
//!
//! These are the wire types the engine serializes each poll cycle. Field
//! names are camelCase on the wire to match the engine's JSON metadata,
//! so the structs carry serde renames rather than hand-written mapping.
//!
//! All numeric fields arrive from a real-time process and are treated as
//! untrusted: [`ClipSnapshot::sanitize`] applies the documented fallbacks
//! (clamp peaks, zero non-finite values) so nothing downstream has to
//! re-check for NaN or negative sample counts.

use serde::{Deserialize, Serialize};

/// Kinds of node the engine can report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A recorded (or recording) audio clip
    #[default]
    Clip,
    /// A container of other nodes, enterable via navigation
    Box,
}

/// One entity as reported by the engine in a poll cycle
///
/// `duration` is the live sample count while `is_recording` is set, and the
/// final recorded length afterwards. `anchor_phase` is the absolute sample
/// position where recording began and never changes for a given take.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClipSnapshot {
    /// Stable opaque identifier, lexically comparable
    pub id: String,
    /// User-visible name
    pub name: String,
    /// Node kind
    pub kind: NodeKind,
    /// Engine-assigned position and size (abstract pixel units)
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    /// Instantaneous amplitude, 0..1
    pub current_peak: f32,
    /// Recorded length in samples (live count while recording)
    pub duration: i64,
    /// Non-destructive loop points, sample offsets within `duration`
    pub loop_start: i64,
    pub loop_end: i64,
    /// Samples per quantum established by the session's first recording;
    /// 0 until a quantum exists
    pub effective_quantum: i64,
    /// Normalized playhead position within the clip, 0..1
    pub playhead: f64,
    pub is_recording: bool,
    /// Recording armed, waiting for the next quantum boundary
    pub is_pending_start: bool,
    /// Stop requested, waiting for the next quantum boundary
    pub is_awaiting_stop: bool,
    pub is_muted: bool,
    /// Absolute sample position where recording began
    pub anchor_phase: i64,
}

impl ClipSnapshot {
    /// Apply the documented fallbacks for invalid engine data
    ///
    /// Non-finite or negative peaks become 0 (clamped to 1), non-finite
    /// positions become 0, and negative sample counts become 0. Invalid
    /// data is recoverable by design: it is fixed and logged, never
    /// propagated as an error.
    pub fn sanitize(&mut self) {
        let mut fixed = false;

        if !self.current_peak.is_finite() || self.current_peak < 0.0 {
            self.current_peak = 0.0;
            fixed = true;
        } else if self.current_peak > 1.0 {
            self.current_peak = 1.0;
            fixed = true;
        }

        if !self.playhead.is_finite() || self.playhead < 0.0 {
            self.playhead = 0.0;
            fixed = true;
        } else if self.playhead > 1.0 {
            self.playhead = 1.0;
            fixed = true;
        }

        for value in [&mut self.x, &mut self.y] {
            if !value.is_finite() {
                *value = 0.0;
                fixed = true;
            }
        }
        for value in [&mut self.w, &mut self.h] {
            if !value.is_finite() || *value < 0.0 {
                *value = 0.0;
                fixed = true;
            }
        }

        for value in [
            &mut self.duration,
            &mut self.effective_quantum,
            &mut self.anchor_phase,
        ] {
            if *value < 0 {
                *value = 0;
                fixed = true;
            }
        }

        if fixed {
            log::debug!("sanitize: repaired invalid fields on node {}", self.id);
        }
    }

    /// Validated loop region, falling back to the full duration
    ///
    /// The engine occasionally reports an inverted or out-of-range pair
    /// while loop handles are being dragged; the view must keep rendering,
    /// so the fallback is `(0, duration)` rather than an error.
    pub fn loop_bounds(&self) -> (i64, i64) {
        let (start, end) = (self.loop_start, self.loop_end);
        if start >= 0 && end > start && end <= self.duration {
            (start, end)
        } else {
            (0, self.duration)
        }
    }

    /// A completed clip shorter than one quantum does not loop
    pub fn is_one_shot(&self, effective_quantum: i64) -> bool {
        effective_quantum > 0 && self.duration > 0 && self.duration < effective_quantum
    }
}

/// Full engine state returned by a poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GraphState {
    pub is_playing: bool,
    /// Global transport position in samples
    pub master_pos: i64,
    /// Currently soloed node, if any
    pub soloed_id: Option<String>,
    pub nodes: Vec<ClipSnapshot>,
}

/// Available hardware input channels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputList {
    pub inputs: Vec<String>,
}
