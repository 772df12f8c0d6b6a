//! Group-by-group navigation over a received clip layout

use std::ops::Range;
use tagsync_common::{Clip, GroupLayout};

/// Focused group plus the layout it indexes into
#[derive(Debug, Clone, Default)]
pub struct Navigator {
    layout: GroupLayout,
    current: usize,
}

impl Navigator {
    /// Rebuild groups from `clips`, keeping the focus in range
    pub fn set_clips(&mut self, clips: &[Clip]) {
        self.layout = GroupLayout::build(clips);
        self.current = self.current.min(self.layout.len().saturating_sub(1));
    }

    pub fn layout(&self) -> &GroupLayout {
        &self.layout
    }

    pub fn group_count(&self) -> usize {
        self.layout.len()
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Rows of the focused group
    pub fn current_rows(&self) -> &[u32] {
        self.layout.group(self.current).unwrap_or(&[])
    }

    pub fn is_focused(&self, row: u32) -> bool {
        self.current_rows().contains(&row)
    }

    /// Move focus; `false` when `group` does not exist
    pub fn goto(&mut self, group: usize) -> bool {
        if group < self.layout.len() {
            self.current = group;
            true
        } else {
            false
        }
    }

    pub fn next(&mut self) -> bool {
        self.goto(self.current + 1)
    }

    pub fn prev(&mut self) -> bool {
        match self.current.checked_sub(1) {
            Some(group) => self.goto(group),
            None => false,
        }
    }

    /// Clip index and its group range for the focused group
    pub fn current_clip(&self) -> Option<(usize, Range<usize>)> {
        let clip = self.layout.clip_of_group(self.current)?;
        Some((clip, self.layout.clip_group_range(clip)?))
    }

    pub fn group_of_row(&self, row: u32) -> Option<usize> {
        self.layout.group_of_row(row)
    }
}
