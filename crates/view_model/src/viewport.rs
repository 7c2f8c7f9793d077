//! Fixed-row-height windowing for long lists.

use std::ops::Range;

/// Decides which indices of a linear list must be materialized, given the
/// container's scroll offset and viewport height plus an over-scan margin.
/// Pure in its numeric inputs; the only retained state is the last scroll
/// offset used for the recompute threshold.
#[derive(Debug, Clone)]
pub struct ViewportWindow {
    item_count: usize,
    row_height: i64,
    overscan: i64,
    last_scroll_offset: Option<i64>,
}

impl ViewportWindow {
    pub fn new(item_count: usize, row_height: i64, overscan: i64) -> Self {
        Self {
            item_count,
            row_height,
            overscan,
            last_scroll_offset: None,
        }
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn set_item_count(&mut self, item_count: usize) {
        self.item_count = item_count;
    }

    /// Indices `i` satisfying `i*row > offset - overscan*row` and
    /// `(i+1)*row < offset + height + overscan*row`. Degenerate inputs
    /// (no items, non-positive heights) yield an empty range.
    pub fn compute_visible(&self, scroll_offset: i64, viewport_height: i64) -> Range<usize> {
        if self.item_count == 0 || self.row_height <= 0 || viewport_height <= 0 {
            return 0..0;
        }
        let row = self.row_height;
        let margin = self.overscan.max(0) * row;

        let low = scroll_offset - margin;
        let high = scroll_offset + viewport_height + margin;
        if high <= 0 {
            return 0..0;
        }

        // Smallest i with i*row > low.
        let first = if low < 0 { 0 } else { (low.div_euclid(row) + 1) as usize };
        // One past the largest i with (i+1)*row < high.
        let end = ((high - 1).div_euclid(row)).max(0) as usize;

        let end = end.min(self.item_count);
        let first = first.min(end);
        first..end
    }

    /// Debounce check: true when the offset moved by more than one row height
    /// since the last accepted offset (or none was recorded yet). Records the
    /// offset when it answers true.
    pub fn should_recompute(&mut self, scroll_offset: i64) -> bool {
        let threshold = self.row_height.max(1);
        match self.last_scroll_offset {
            Some(last) if (scroll_offset - last).abs() <= threshold => false,
            _ => {
                self.last_scroll_offset = Some(scroll_offset);
                true
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/viewport_tests.rs"]
mod tests;
