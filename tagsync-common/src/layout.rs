//! Clip segmentation and synchronized group layout
//!
//! A clip is a contiguous run of rows sharing a grouping key (one recording
//! session). Within a clip, rows are interleaved captures from `view_count`
//! synchronized cameras, so the clip is cut into consecutive groups of exactly
//! `view_count` rows. A group is the unit a reviewer labels.
//!
//! # view_count policy
//!
//! The candidate count is the number of distinct view values seen from the
//! clip's first row before the first repeat (the whole clip when nothing
//! repeats). The candidate is accepted only when every offset column
//! `o, o+n, o+2n, ...` holds a single view value and the clip length is a
//! multiple of it. In every other case (no view column, a mismatching offset
//! column, or a trailing partial group) the clip falls back to
//! `view_count = 1`, i.e. one row per group.

use std::collections::HashSet;
use std::hash::Hash;
use std::ops::Range;
use tracing::{debug, error, warn};

/// Contiguous half-open row range `[begin, end)` sharing one grouping key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clip {
    pub begin: u32,
    pub end: u32,
    pub view_count: u32,
}

impl Clip {
    pub fn new(begin: u32, end: u32, view_count: u32) -> Self {
        Self {
            begin,
            end,
            view_count,
        }
    }

    /// Number of rows in the clip
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.begin)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `view_count` partitions the clip into whole groups
    pub fn is_evenly_divisible(&self) -> bool {
        self.view_count != 0 && self.len() % self.view_count == 0
    }
}

/// Partition `row_count` rows into clips
///
/// `keys` is the grouping-key column and `views` the view-key column, both
/// indexed by row. Without a grouping column the whole table is a single clip
/// with one row per group.
pub fn segment_clips<K, V>(row_count: usize, keys: Option<&[K]>, views: Option<&[V]>) -> Vec<Clip>
where
    K: PartialEq,
    V: Eq + Hash,
{
    if row_count == 0 {
        return Vec::new();
    }

    let Some(keys) = keys else {
        debug!("No grouping column, treating all {} rows as one clip", row_count);
        return vec![Clip::new(0, row_count as u32, 1)];
    };

    let mut ranges = Vec::new();
    let mut begin = 0usize;
    for i in 1..row_count {
        if keys[i] != keys[begin] {
            ranges.push(begin..i);
            begin = i;
        }
    }
    ranges.push(begin..row_count);

    if views.is_none() {
        warn!("No view column, every clip uses one row per group");
    }

    let clips: Vec<Clip> = ranges
        .into_iter()
        .map(|range| {
            let view_count = match views {
                Some(views) => detect_view_count(&views[range.clone()], range.start),
                None => 1,
            };
            Clip::new(range.start as u32, range.end as u32, view_count)
        })
        .collect();

    debug!("{} clips detected", clips.len());
    clips
}

/// Detect the number of synchronized views in one clip's view-key values
///
/// `first_row` is only used for log messages.
pub fn detect_view_count<V: Eq + Hash>(views: &[V], first_row: usize) -> u32 {
    if views.is_empty() {
        return 1;
    }

    let mut seen = HashSet::new();
    let candidate = views
        .iter()
        .position(|v| !seen.insert(v))
        .unwrap_or(views.len());

    for offset in 0..candidate {
        let expected = &views[offset];
        if let Some(pos) = views[offset..]
            .iter()
            .step_by(candidate)
            .position(|v| v != expected)
        {
            warn!(
                "View mismatch at row {} in clip starting at row {}, falling back to 1 view",
                first_row + offset + pos * candidate,
                first_row
            );
            return 1;
        }
    }

    if views.len() % candidate != 0 {
        warn!(
            "Clip starting at row {} has {} rows, not a multiple of {} views, falling back to 1 view",
            first_row,
            views.len(),
            candidate
        );
        return 1;
    }

    candidate as u32
}

/// Check that each clip ends where the next one begins
///
/// A gap or overlap means the layout is corrupt. It is logged and reported but
/// the caller keeps going with whatever groups can be built.
pub fn verify_contiguous(clips: &[Clip]) -> bool {
    let mut ok = true;
    for (i, pair) in clips.windows(2).enumerate() {
        if pair[0].end != pair[1].begin {
            error!(
                "Broken clip data: clip {} ends at {}, clip {} begins at {}",
                i,
                pair[0].end,
                i + 1,
                pair[1].begin
            );
            ok = false;
        }
    }
    ok
}

/// Ordered groups plus the clip each group belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupLayout {
    groups: Vec<Vec<u32>>,
    group_clip: Vec<usize>,
    clip_groups: Vec<Range<usize>>,
}

impl GroupLayout {
    /// Cut every clip into groups of `view_count` rows
    pub fn build(clips: &[Clip]) -> Self {
        verify_contiguous(clips);

        let mut layout = Self::default();
        for (clip_idx, clip) in clips.iter().enumerate() {
            let view_count = if clip.is_evenly_divisible() {
                clip.view_count
            } else {
                warn!(
                    "Clip {} [{}, {}) cannot be split into groups of {}, using 1",
                    clip_idx, clip.begin, clip.end, clip.view_count
                );
                1
            };

            let first_group = layout.groups.len();
            let mut row = clip.begin;
            while row < clip.end {
                layout.groups.push((row..row + view_count).collect());
                layout.group_clip.push(clip_idx);
                row += view_count;
            }
            layout.clip_groups.push(first_group..layout.groups.len());
        }
        layout
    }

    pub fn groups(&self) -> &[Vec<u32>] {
        &self.groups
    }

    /// Row indices of one group
    pub fn group(&self, group: usize) -> Option<&[u32]> {
        self.groups.get(group).map(|g| g.as_slice())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn clip_count(&self) -> usize {
        self.clip_groups.len()
    }

    /// Index of the clip a group belongs to
    pub fn clip_of_group(&self, group: usize) -> Option<usize> {
        self.group_clip.get(group).copied()
    }

    /// Group indices belonging to one clip
    pub fn clip_group_range(&self, clip: usize) -> Option<Range<usize>> {
        self.clip_groups.get(clip).cloned()
    }

    /// Group containing `row`
    pub fn group_of_row(&self, row: u32) -> Option<usize> {
        let idx = self
            .groups
            .partition_point(|g| g.first().is_some_and(|first| *first <= row));
        let candidate = idx.checked_sub(1)?;
        self.groups[candidate].contains(&row).then_some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_grouping_column_is_single_clip() {
        let clips = segment_clips::<&str, &str>(4, None, None);
        assert_eq!(clips, vec![Clip::new(0, 4, 1)]);
    }

    #[test]
    fn test_empty_table_has_no_clips() {
        let keys: Vec<&str> = Vec::new();
        assert!(segment_clips::<_, &str>(0, Some(&keys[..]), None).is_empty());
    }

    #[test]
    fn test_indivisible_clip_falls_back_to_one_view() {
        let keys = ["A", "A", "A", "B", "B"];
        let views = ["c1", "c2", "c1", "c1", "c2"];

        let clips = segment_clips(5, Some(&keys[..]), Some(&views[..]));
        assert_eq!(clips, vec![Clip::new(0, 3, 1), Clip::new(3, 5, 2)]);

        let layout = GroupLayout::build(&clips);
        assert_eq!(layout.groups(), &[vec![0], vec![1], vec![2], vec![3, 4]]);
        assert_eq!(layout.clip_group_range(0), Some(0..3));
        assert_eq!(layout.clip_group_range(1), Some(3..4));
    }

    #[test]
    fn test_verified_views_form_groups() {
        let keys = ["s1"; 6];
        let views = ["left", "mid", "right", "left", "mid", "right"];

        let clips = segment_clips(6, Some(&keys[..]), Some(&views[..]));
        assert_eq!(clips, vec![Clip::new(0, 6, 3)]);

        let layout = GroupLayout::build(&clips);
        assert_eq!(layout.groups(), &[vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_view_mismatch_falls_back_to_one_view() {
        // Candidate 2 from [a, b, a], but offset 1 sees b then c
        let views = ["a", "b", "a", "c"];
        assert_eq!(detect_view_count(&views, 0), 1);
    }

    #[test]
    fn test_all_distinct_views_use_clip_length() {
        let views = ["a", "b", "c"];
        assert_eq!(detect_view_count(&views, 10), 3);
    }

    #[test]
    fn test_missing_view_column_uses_one_view() {
        let keys = [1, 1, 2];
        let clips = segment_clips::<_, &str>(3, Some(&keys[..]), None);
        assert_eq!(clips, vec![Clip::new(0, 2, 1), Clip::new(2, 3, 1)]);
    }

    #[test]
    fn test_last_row_belongs_to_last_clip() {
        let keys = ["x", "x", "y"];
        let clips = segment_clips::<_, &str>(3, Some(&keys[..]), None);
        assert_eq!(clips.last().unwrap().end, 3);
    }

    #[test]
    fn test_groups_partition_clip_ranges() {
        let clips = vec![Clip::new(0, 4, 2), Clip::new(4, 7, 3), Clip::new(7, 8, 1)];
        let layout = GroupLayout::build(&clips);

        let mut rows: Vec<u32> = layout.groups().iter().flatten().copied().collect();
        rows.sort_unstable();
        assert_eq!(rows, (0..8).collect::<Vec<_>>());
        for (g, group) in layout.groups().iter().enumerate() {
            let clip = clips[layout.clip_of_group(g).unwrap()];
            assert_eq!(group.len() as u32, clip.view_count);
        }
    }

    #[test]
    fn test_received_indivisible_clip_is_rebuilt_with_one_view() {
        let layout = GroupLayout::build(&[Clip::new(0, 3, 2)]);
        assert_eq!(layout.len(), 3);
    }

    #[test]
    fn test_group_of_row() {
        let layout = GroupLayout::build(&[Clip::new(0, 4, 2), Clip::new(4, 5, 1)]);
        assert_eq!(layout.group_of_row(0), Some(0));
        assert_eq!(layout.group_of_row(3), Some(1));
        assert_eq!(layout.group_of_row(4), Some(2));
        assert_eq!(layout.group_of_row(5), None);
    }

    #[test]
    fn test_verify_contiguous_detects_gap() {
        assert!(verify_contiguous(&[Clip::new(0, 2, 1), Clip::new(2, 4, 1)]));
        assert!(!verify_contiguous(&[Clip::new(0, 2, 1), Clip::new(3, 4, 1)]));
    }
}
