//! Phase-to-pixel mapping for the quantum grid
//!
//! The core rule: a clip appears at the grid column where it was recorded
//! and NEVER moves afterwards. Anchors are reduced modulo the wrap period,
//! snapped onto the grid when within tolerance, then floored to their
//! quantum column. Position stability is enforced by callers never
//! shrinking the wrap period for nodes already on screen; the functions
//! here are pure.

/// Everything needed to place an anchor on the pixel grid
///
/// `context_anchor` is the phase of the containing context clip; 0 aligns
/// the grid globally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantumGrid {
    pub context_anchor: i64,
    pub effective_quantum: i64,
    pub wrap_period: i64,
    pub base_width: f64,
    pub snap_tolerance: f64,
    pub wrap_fold_epsilon: f64,
}

/// Floor-style modulo, correct for negative inputs
pub fn floor_mod(value: i64, modulus: i64) -> i64 {
    ((value % modulus) + modulus) % modulus
}

/// Fractional sample-to-pixel conversion
///
/// Used for clip widths and the playhead cursor; column placement goes
/// through [`visual_offset`] instead.
pub fn samples_to_px(samples: i64, effective_quantum: i64, base_width: f64) -> f64 {
    if effective_quantum <= 0 {
        return 0.0;
    }
    (samples as f64 / effective_quantum as f64) * base_width
}

/// Visual X offset in pixels for a clip anchored at `anchor_phase`
///
/// Returns 0 while the timeline is undefined (no quantum or wrap period
/// yet). The ratio snaps onto the nearest grid line when within tolerance
/// (inclusive) - a clip recorded a few samples ahead of its beat must
/// still land on that beat's column. A snap onto the wrap boundary folds
/// back to 0: visually it is the start of the next repetition of the same
/// period, not a new column. The final floor picks the containing column.
pub fn visual_offset(anchor_phase: i64, grid: &QuantumGrid) -> f64 {
    if grid.effective_quantum <= 0 || grid.wrap_period <= 0 {
        return 0.0;
    }

    let relative = anchor_phase - grid.context_anchor;
    let wrapped = floor_mod(relative, grid.wrap_period);

    let mut ratio = wrapped as f64 / grid.effective_quantum as f64;

    let nearest = ratio.round();
    if (ratio - nearest).abs() <= grid.snap_tolerance {
        ratio = nearest;

        // Snapped onto the end of the period: fold to the start
        let period_quanta = grid.wrap_period as f64 / grid.effective_quantum as f64;
        if (ratio - period_quanta).abs() < grid.wrap_fold_epsilon {
            ratio = 0.0;
        }
    }

    ratio.floor() * grid.base_width
}

/// Reference period against which all anchors are reduced
///
/// `max(maxAnchor + quantum, maxCompletedDuration)`, floored so a session
/// with a single clip still spans one quantum. Recomputed from the full
/// known set every cycle; the caller guards against shrinking while
/// anchored nodes are still displayed.
pub fn wrap_period(anchors: &[i64], completed_durations: &[i64], effective_quantum: i64) -> i64 {
    let max_anchor = anchors.iter().copied().max().unwrap_or(0).max(0);
    let max_duration = completed_durations
        .iter()
        .copied()
        .max()
        .unwrap_or(0)
        .max(effective_quantum);
    (max_anchor + effective_quantum).max(max_duration)
}
