//! Stack grouping for creation-button placement
//!
//! Nodes sharing a visual column get one "+" button beneath the lowest of
//! them. Grouping is greedy single-pass against each group's first member
//! (the anchor), not full transitive clustering, and the input is sorted
//! by id first so anchor selection - and therefore button identity and
//! position - is identical across polls regardless of arrival order.

/// One node's placement, as input to grouping
#[derive(Debug, Clone, PartialEq)]
pub struct StackEntry {
    pub id: String,
    /// Visual X from the coordinate mapper
    pub x: f64,
    pub y: f64,
    pub h: f64,
}

/// A creation button derived from one stack group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackButton {
    /// Stable id derived from the anchor node
    pub id: String,
    pub anchor_id: String,
    pub x: i64,
    /// Bottom edge of the lowest node in the column
    pub y: i64,
}

/// Partition entries into visual columns
///
/// An entry joins the first group whose anchor X is within `tolerance`
/// (strictly), else founds a new group. Entries are sorted by id before
/// grouping, so the partition is deterministic for a given set.
pub fn group_by_visual_x(entries: &[StackEntry], tolerance: f64) -> Vec<Vec<&StackEntry>> {
    let mut sorted: Vec<&StackEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut groups: Vec<Vec<&StackEntry>> = Vec::new();
    for entry in sorted {
        match groups
            .iter_mut()
            .find(|group| (entry.x - group[0].x).abs() < tolerance)
        {
            Some(group) => group.push(entry),
            None => groups.push(vec![entry]),
        }
    }
    groups
}

/// Button placement for one group: anchor's column, beneath the lowest node
pub fn button_for_group(group: &[&StackEntry]) -> StackButton {
    let anchor = group[0];
    let bottom = group
        .iter()
        .map(|entry| entry.y + entry.h)
        .fold(f64::NEG_INFINITY, f64::max);

    let short_id: String = anchor.id.chars().take(8).collect();
    StackButton {
        id: format!("stack-btn-{}", short_id),
        anchor_id: anchor.id.clone(),
        x: anchor.x.round() as i64,
        y: bottom.round() as i64,
    }
}

/// Grouping and placement in one pass, for the reconciliation cycle
pub fn stack_buttons(entries: &[StackEntry], tolerance: f64) -> Vec<StackButton> {
    group_by_visual_x(entries, tolerance)
        .iter()
        .map(|group| button_for_group(group))
        .collect()
}
