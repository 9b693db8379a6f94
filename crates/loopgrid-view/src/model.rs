//! Local view model kept faithful to the engine
//!
//! Pure data consumed by render code; all mutation happens inside the
//! reconciliation cycle. Nodes are keyed by id in a sorted map, so
//! iteration order is deterministic across cycles. Ghost tiles and stack
//! buttons hold no independent state and are rebuilt from scratch every
//! cycle.

use std::collections::BTreeMap;

use loopgrid_core::{ClipSnapshot, NodeKind};

use crate::ghosts::GhostTile;
use crate::stacks::StackButton;

/// The rendered representation of one engine node
#[derive(Debug, Clone, PartialEq)]
pub struct ViewNode {
    /// Last full snapshot, kept so interactive handles (loop-point
    /// dragging) have current data between polls
    pub snapshot: ClipSnapshot,
    /// Horizontal placement from the coordinate mapper, in pixels
    pub visual_x: f64,
    /// Completed clip shorter than one quantum; does not loop
    pub one_shot: bool,
    /// A ghost repeat currently carries the playhead instead
    pub playhead_suppressed: bool,
}

impl ViewNode {
    pub fn new(snapshot: ClipSnapshot) -> Self {
        Self {
            snapshot,
            visual_x: 0.0,
            one_shot: false,
            playhead_suppressed: false,
        }
    }

    /// Pixel-space geometry for the render boundary
    pub fn geometry(&self) -> NodeGeometry {
        NodeGeometry {
            x: self.visual_x,
            y: self.snapshot.y,
            w: self.snapshot.w,
            h: self.snapshot.h,
            // Boxes render as collapsed containers at this level
            collapsed: self.snapshot.kind == NodeKind::Box,
            one_shot: self.one_shot,
            playhead_suppressed: self.playhead_suppressed,
        }
    }
}

/// Per-entity geometry record exposed to rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeGeometry {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub collapsed: bool,
    pub one_shot: bool,
    pub playhead_suppressed: bool,
}

/// Everything the renderer reads after a cycle
#[derive(Debug, Default)]
pub struct ViewModel {
    /// Live nodes keyed by id
    pub nodes: BTreeMap<String, ViewNode>,
    /// Ghost repeats, rebuilt every cycle
    pub ghosts: Vec<GhostTile>,
    /// Stack creation buttons, rebuilt every cycle
    pub stack_buttons: Vec<StackButton>,
    /// Samples per quantum once the session established one, else 0
    pub effective_quantum: i64,
    /// Current reference period for anchor reduction, else 0
    pub wrap_period: i64,
    pub is_playing: bool,
    /// Global transport position in samples
    pub master_pos: i64,
    pub soloed_id: Option<String>,
    /// Hardware inputs, fetched once on readiness
    pub inputs: Vec<String>,
}

impl ViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&ViewNode> {
        self.nodes.get(id)
    }

    /// Longest completed duration among known nodes; the ghost timeline extent
    pub fn longest_completed_duration(&self) -> i64 {
        self.nodes
            .values()
            .filter(|node| !node.snapshot.is_recording)
            .map(|node| node.snapshot.duration)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_uses_mapped_x() {
        let mut node = ViewNode::new(ClipSnapshot {
            id: "a".to_string(),
            x: 999.0, // engine position; horizontal placement comes from the mapper
            y: 80.0,
            w: 200.0,
            h: 100.0,
            ..Default::default()
        });
        node.visual_x = 400.0;

        let geometry = node.geometry();
        assert_eq!(geometry.x, 400.0);
        assert_eq!(geometry.y, 80.0);
        assert!(!geometry.collapsed);
    }

    #[test]
    fn test_box_renders_collapsed() {
        let node = ViewNode::new(ClipSnapshot {
            kind: NodeKind::Box,
            ..Default::default()
        });
        assert!(node.geometry().collapsed);
    }

    #[test]
    fn test_longest_completed_ignores_live_recordings() {
        let mut model = ViewModel::new();
        model.nodes.insert(
            "a".to_string(),
            ViewNode::new(ClipSnapshot {
                duration: 1000,
                ..Default::default()
            }),
        );
        model.nodes.insert(
            "b".to_string(),
            ViewNode::new(ClipSnapshot {
                duration: 5000,
                is_recording: true,
                ..Default::default()
            }),
        );
        assert_eq!(model.longest_completed_duration(), 1000);
    }
}
