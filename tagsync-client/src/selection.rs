//! Tag selection discipline
//!
//! Single-select sets exactly the chosen tag; multi-select toggles it.
//! Clearing sets every tag false in both modes.

/// A reviewer's tag action on a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Select (single mode) or toggle (multi mode) the tag at this index
    Tag(usize),
    /// Mark every tag false
    Clear,
}

/// New label vector for one row
pub fn apply_selection(current: &[bool], selection: Selection, multiple: bool) -> Vec<bool> {
    match selection {
        Selection::Clear => vec![false; current.len()],
        Selection::Tag(tag) if multiple => {
            let mut next = current.to_vec();
            if let Some(v) = next.get_mut(tag) {
                *v = !*v;
            }
            next
        }
        Selection::Tag(tag) => (0..current.len()).map(|i| i == tag).collect(),
    }
}

/// Split `(row, labels)` pairs into maximal runs of consecutive rows with
/// identical labels, as `(begin, end_inclusive, labels)`
pub fn coalesce_ranges(rows: &[(u32, Vec<bool>)]) -> Vec<(u32, u32, Vec<bool>)> {
    let mut ranges: Vec<(u32, u32, Vec<bool>)> = Vec::new();
    for (row, labels) in rows {
        match ranges.last_mut() {
            Some((_, end, prev)) if *end + 1 == *row && prev == labels => *end = *row,
            _ => ranges.push((*row, *row, labels.clone())),
        }
    }
    ranges
}
