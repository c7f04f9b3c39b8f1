//! Tag storage.
//!
//! A tag is a named annotation (`"keyword"`, `"sel"`, `"diagnostic-error"`, ...) attached to a
//! half-open range of char offsets. Every range records the [`TagOwner`] that added it, and all
//! removal operations name an owner, so a highlighter retagging a line never disturbs tags that
//! belong to somebody else (selection, diagnostics).

/// Identifies the component that owns a set of tag ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagOwner(pub u32);

impl TagOwner {
    /// Create an owner id from a raw numeric identifier.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Per-line regex highlighting.
    pub const LINE_SYNTAX: Self = Self(1);

    /// Whole-buffer multiline string highlighting.
    pub const MULTILINE_SYNTAX: Self = Self(2);

    /// Selection highlighting maintained by the front end.
    pub const SELECTION: Self = Self(3);

    /// Language server diagnostics.
    pub const DIAGNOSTICS: Self = Self(4);
}

/// A tagged range of char offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRange {
    /// Start offset (chars)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
    /// Who added the range
    pub owner: TagOwner,
    /// Tag name
    pub tag: String,
}

impl TagRange {
    /// Create a new tag range.
    pub fn new(start: usize, end: usize, owner: TagOwner, tag: impl Into<String>) -> Self {
        Self {
            start,
            end,
            owner,
            tag: tag.into(),
        }
    }

    /// Check if the range contains a specific offset
    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Check if two ranges overlap
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }
}

/// A tagged span on a single line, in columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineSpan {
    /// Start column (0-based, chars)
    pub start: usize,
    /// End column (exclusive)
    pub end: usize,
    /// Tag name
    pub tag: String,
}

impl LineSpan {
    /// Create a new line span.
    pub fn new(start: usize, end: usize, tag: impl Into<String>) -> Self {
        Self {
            start,
            end,
            tag: tag.into(),
        }
    }
}

/// Tag ranges kept sorted by start offset.
///
/// Insertion order among ranges with the same start is preserved, which is also the visual
/// precedence order: a range added later is drawn above one added earlier.
#[derive(Debug, Clone, Default)]
pub struct TagStore {
    ranges: Vec<TagRange>,
    /// `prefix_max_end[i] = max(ranges[0..=i].end)`, used to prune range queries.
    prefix_max_end: Vec<usize>,
}

impl TagStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn rebuild_prefix_max_end_from(&mut self, start_idx: usize) {
        if self.ranges.is_empty() {
            self.prefix_max_end.clear();
            return;
        }

        if self.prefix_max_end.len() != self.ranges.len() {
            self.prefix_max_end.resize(self.ranges.len(), 0);
        }

        let mut max_end = if start_idx == 0 {
            0
        } else {
            self.prefix_max_end[start_idx - 1]
        };

        for (idx, range) in self.ranges.iter().enumerate().skip(start_idx) {
            max_end = max_end.max(range.end);
            self.prefix_max_end[idx] = max_end;
        }
    }

    fn rebuild_prefix_max_end(&mut self) {
        self.rebuild_prefix_max_end_from(0);
    }

    /// Add a range. Empty ranges are ignored.
    pub fn add(&mut self, range: TagRange) {
        if range.start >= range.end {
            return;
        }

        // Insert after every range with the same start to keep application order.
        let pos = self.ranges.partition_point(|r| r.start <= range.start);
        self.ranges.insert(pos, range);
        self.prefix_max_end.insert(pos, 0);
        self.rebuild_prefix_max_end_from(pos);
    }

    /// Remove every range of `owner`.
    pub fn remove_owner(&mut self, owner: TagOwner) -> usize {
        let before = self.ranges.len();
        self.ranges.retain(|r| r.owner != owner);
        self.rebuild_prefix_max_end();
        before - self.ranges.len()
    }

    /// Remove `owner`'s tags from `[start, end)`.
    ///
    /// Ranges that stick out of the cleared region are clipped rather than dropped, so the parts
    /// outside `[start, end)` stay tagged.
    pub fn remove_owner_in_range(&mut self, owner: TagOwner, start: usize, end: usize) {
        if start >= end {
            return;
        }

        let mut clipped = Vec::new();
        self.ranges.retain(|r| {
            if r.owner != owner || !r.overlaps(start, end) {
                return true;
            }
            if r.start < start {
                clipped.push(TagRange::new(r.start, start, owner, r.tag.clone()));
            }
            if r.end > end {
                clipped.push(TagRange::new(end, r.end, owner, r.tag.clone()));
            }
            false
        });
        self.rebuild_prefix_max_end();

        for range in clipped {
            self.add(range);
        }
    }

    /// Query all ranges overlapping `[start, end)`, in precedence order.
    pub fn query_range(&self, start: usize, end: usize) -> Vec<&TagRange> {
        if self.ranges.is_empty() || start >= end {
            return Vec::new();
        }

        // Every range that may overlap starts before `end`.
        let search_end = self.ranges.partition_point(|r| r.start < end);
        if search_end == 0 {
            return Vec::new();
        }

        let mut scan_start = self
            .ranges
            .partition_point(|r| r.start < start)
            .min(search_end);
        while scan_start > 0 && self.prefix_max_end[scan_start - 1] > start {
            scan_start -= 1;
        }

        self.ranges[scan_start..search_end]
            .iter()
            .filter(|r| r.overlaps(start, end))
            .collect()
    }

    /// Names of all tags active at `pos`, lowest precedence first.
    pub fn tags_at(&self, pos: usize) -> Vec<&str> {
        self.query_range(pos, pos.saturating_add(1))
            .into_iter()
            .map(|r| r.tag.as_str())
            .collect()
    }

    /// All ranges belonging to `owner`.
    pub fn ranges_for_owner(&self, owner: TagOwner) -> Vec<&TagRange> {
        self.ranges.iter().filter(|r| r.owner == owner).collect()
    }

    /// Iterate over all ranges.
    pub fn iter(&self) -> impl Iterator<Item = &TagRange> {
        self.ranges.iter()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.ranges.clear();
        self.prefix_max_end.clear();
    }

    /// Number of stored ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Shift ranges after `delta` chars were inserted at `pos`.
    ///
    /// A range starting at `pos` moves; a range strictly containing `pos` grows.
    pub fn update_for_insertion(&mut self, pos: usize, delta: usize) {
        if delta == 0 {
            return;
        }
        for range in &mut self.ranges {
            if range.start >= pos {
                range.start += delta;
                range.end += delta;
            } else if range.end > pos {
                range.end += delta;
            }
        }
        self.rebuild_prefix_max_end();
    }

    /// Shift and clamp ranges after `[start, end)` was deleted.
    pub fn update_for_deletion(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let delta = end - start;

        for range in &mut self.ranges {
            if range.end <= start {
                continue;
            }
            if range.start >= end {
                range.start -= delta;
                range.end -= delta;
            } else {
                let new_start = range.start.min(start);
                let new_end = if range.end > end {
                    range.end - delta
                } else {
                    start
                };
                range.start = new_start;
                range.end = new_end;
            }
        }
        self.ranges.retain(|r| r.start < r.end);

        // Clamping can move a start backwards past its neighbours.
        self.ranges.sort_by_key(|r| r.start);
        self.rebuild_prefix_max_end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(ranges: &[(usize, usize, TagOwner, &str)]) -> TagStore {
        let mut store = TagStore::new();
        for (start, end, owner, tag) in ranges {
            store.add(TagRange::new(*start, *end, *owner, *tag));
        }
        store
    }

    #[test]
    fn test_query_range_finds_long_range_starting_early() {
        let store = store_with(&[
            (0, 100, TagOwner::MULTILINE_SYNTAX, "multiline-string"),
            (10, 12, TagOwner::LINE_SYNTAX, "keyword"),
            (50, 55, TagOwner::LINE_SYNTAX, "builtin"),
        ]);

        let hits: Vec<_> = store.query_range(51, 52).iter().map(|r| r.tag.as_str()).collect();
        assert_eq!(hits, vec!["multiline-string", "builtin"]);
        assert!(store.query_range(200, 300).is_empty());
    }

    #[test]
    fn test_remove_owner_in_range_keeps_other_owners() {
        let mut store = store_with(&[
            (0, 5, TagOwner::LINE_SYNTAX, "keyword"),
            (0, 5, TagOwner::SELECTION, "sel"),
            (8, 12, TagOwner::LINE_SYNTAX, "string"),
        ]);

        store.remove_owner_in_range(TagOwner::LINE_SYNTAX, 0, 10);

        let remaining: Vec<_> = store
            .iter()
            .map(|r| (r.start, r.end, r.tag.as_str()))
            .collect();
        assert_eq!(remaining, vec![(0, 5, "sel"), (10, 12, "string")]);
    }

    #[test]
    fn test_same_start_keeps_insertion_order() {
        let store = store_with(&[
            (3, 6, TagOwner::LINE_SYNTAX, "builtin"),
            (3, 6, TagOwner::LINE_SYNTAX, "string"),
        ]);
        assert_eq!(store.tags_at(4), vec!["builtin", "string"]);
    }

    #[test]
    fn test_insertion_and_deletion_shift_ranges() {
        let mut store = store_with(&[
            (2, 4, TagOwner::LINE_SYNTAX, "a"),
            (6, 9, TagOwner::LINE_SYNTAX, "b"),
        ]);

        store.update_for_insertion(3, 2);
        let ranges: Vec<_> = store.iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(ranges, vec![(2, 6), (8, 11)]);

        store.update_for_deletion(1, 9);
        let ranges: Vec<_> = store.iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(ranges, vec![(1, 3)]);
    }
}
