//! Ghost repetition tiling
//!
//! A clip shorter than the longest loop repeats visually to fill the
//! shared timeline, so the looped structure reads at a glance. Ghosts are
//! faded, non-interactive, and fully recomputed every cycle. Exactly one
//! playhead is visible per entity: when the global cursor falls inside a
//! ghost, the owner's primary playhead is suppressed.

use crate::geometry::samples_to_px;

/// Slack when counting repeats, so a repeat is only dropped if it would
/// overhang by more than a thousandth of a pixel
const REPEAT_EPSILON: f64 = 1e-3;

/// One faded repeat of a looping clip
#[derive(Debug, Clone, PartialEq)]
pub struct GhostTile {
    /// Derived id, stable for a given owner and repeat index
    pub id: String,
    /// Owning node id
    pub source_id: String,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    /// The global playhead currently runs through this repeat
    pub active: bool,
}

/// The clip being tiled, in pixel-timeline terms
#[derive(Debug, Clone, Copy)]
pub struct TileSpec<'a> {
    pub id: &'a str,
    pub visual_x: f64,
    pub y: f64,
    pub h: f64,
    /// Final recorded length in samples
    pub duration: i64,
}

/// Compute ghost repeats for one clip
///
/// `longest` is the longest completed duration among all known nodes and
/// defines the timeline extent; `cursor_px` is the global playhead
/// converted to pixels, `None` while the transport is stopped. Returns
/// the tiles plus whether the owner's primary playhead must be
/// suppressed (a ghost, not the main instance, contains the cursor).
///
/// One-shots (`duration < quantum`) do not loop and get no ghosts, nor
/// does a clip that already fills the timeline.
pub fn ghost_tiles(
    spec: &TileSpec,
    longest: i64,
    effective_quantum: i64,
    base_width: f64,
    ghost_limit: usize,
    cursor_px: Option<f64>,
) -> (Vec<GhostTile>, bool) {
    if effective_quantum <= 0 || longest <= 0 || spec.duration <= 0 {
        return (Vec::new(), false);
    }
    if spec.duration < effective_quantum || spec.duration >= longest {
        return (Vec::new(), false);
    }

    let clip_w = samples_to_px(spec.duration, effective_quantum, base_width);
    let timeline_w = samples_to_px(longest, effective_quantum, base_width);
    if clip_w <= 0.0 {
        return (Vec::new(), false);
    }

    let repeats = (((timeline_w - clip_w + REPEAT_EPSILON) / clip_w).floor() as usize)
        .min(ghost_limit);

    let mut suppress_playhead = false;
    let tiles = (1..=repeats)
        .map(|i| {
            let x = spec.visual_x + i as f64 * clip_w;
            let active = cursor_px.is_some_and(|cursor| cursor >= x && cursor < x + clip_w);
            if active {
                suppress_playhead = true;
            }
            GhostTile {
                id: format!("{}-ghost-{}", spec.id, i),
                source_id: spec.id.to_string(),
                x,
                y: spec.y,
                w: clip_w,
                h: spec.h,
                active,
            }
        })
        .collect();

    (tiles, suppress_playhead)
}
