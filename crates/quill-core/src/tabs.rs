//! Open tab bookkeeping.
//!
//! [`TabManager`] is an explicit, owned list of tabs. Each tab gets a [`TabId`] that stays valid
//! for the tab's lifetime and is never handed out again, so background results tagged with a
//! closed tab's id can be recognized and dropped.

/// Opaque identifier for an open tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TabId(u64);

impl TabId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Ordered collection of tabs with a current selection.
#[derive(Debug)]
pub struct TabManager<T> {
    tabs: Vec<(TabId, T)>,
    current: Option<usize>,
    next_id: u64,
}

impl<T> Default for TabManager<T> {
    fn default() -> Self {
        Self {
            tabs: Vec::new(),
            current: None,
            next_id: 1,
        }
    }
}

impl<T> TabManager<T> {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tab and select it.
    pub fn add(&mut self, tab: T) -> TabId {
        let id = TabId(self.next_id);
        self.next_id += 1;
        self.tabs.push((id, tab));
        self.current = Some(self.tabs.len() - 1);
        id
    }

    /// Remove a tab. The neighbour to the left (or the new first tab) becomes current.
    pub fn close(&mut self, id: TabId) -> Option<T> {
        let idx = self.index_of(id)?;
        let (_, tab) = self.tabs.remove(idx);

        self.current = match self.current {
            _ if self.tabs.is_empty() => None,
            Some(cur) if cur > idx => Some(cur - 1),
            Some(cur) if cur == idx => Some(idx.saturating_sub(1)),
            other => other,
        };
        Some(tab)
    }

    /// Id of the selected tab.
    pub fn current_id(&self) -> Option<TabId> {
        self.current.map(|idx| self.tabs[idx].0)
    }

    /// The selected tab.
    pub fn current(&self) -> Option<&T> {
        self.current.map(|idx| &self.tabs[idx].1)
    }

    /// The selected tab, mutably.
    pub fn current_mut(&mut self) -> Option<&mut T> {
        self.current.map(|idx| &mut self.tabs[idx].1)
    }

    /// Select a tab. Returns `false` if it does not exist.
    pub fn select(&mut self, id: TabId) -> bool {
        match self.index_of(id) {
            Some(idx) => {
                self.current = Some(idx);
                true
            }
            None => false,
        }
    }

    /// Select the next tab, wrapping around.
    pub fn select_next(&mut self) {
        if let Some(cur) = self.current {
            self.current = Some((cur + 1) % self.tabs.len());
        }
    }

    /// Select the previous tab, wrapping around.
    pub fn select_previous(&mut self) {
        if let Some(cur) = self.current {
            self.current = Some((cur + self.tabs.len() - 1) % self.tabs.len());
        }
    }

    /// Look up a tab.
    pub fn get(&self, id: TabId) -> Option<&T> {
        self.index_of(id).map(|idx| &self.tabs[idx].1)
    }

    /// Look up a tab mutably.
    pub fn get_mut(&mut self, id: TabId) -> Option<&mut T> {
        self.index_of(id).map(|idx| &mut self.tabs[idx].1)
    }

    /// Iterate over tabs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (TabId, &T)> {
        self.tabs.iter().map(|(id, tab)| (*id, tab))
    }

    /// Iterate mutably over tabs in display order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TabId, &mut T)> {
        self.tabs.iter_mut().map(|(id, tab)| (*id, tab))
    }

    /// Number of open tabs.
    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    /// Check if no tab is open.
    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    fn index_of(&self, id: TabId) -> Option<usize> {
        self.tabs.iter().position(|(tab_id, _)| *tab_id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_not_reused() {
        let mut tabs = TabManager::new();
        let a = tabs.add("a");
        tabs.close(a);
        let b = tabs.add("b");
        assert_ne!(a, b);
        assert!(tabs.get(a).is_none());
    }

    #[test]
    fn test_close_selects_left_neighbour() {
        let mut tabs = TabManager::new();
        let a = tabs.add("a");
        let b = tabs.add("b");
        let c = tabs.add("c");

        tabs.select(b);
        assert_eq!(tabs.close(b), Some("b"));
        assert_eq!(tabs.current_id(), Some(a));

        tabs.close(a);
        assert_eq!(tabs.current_id(), Some(c));
        tabs.close(c);
        assert_eq!(tabs.current_id(), None);
    }

    #[test]
    fn test_select_next_wraps() {
        let mut tabs = TabManager::new();
        let a = tabs.add(1);
        tabs.add(2);
        tabs.select_next();
        assert_eq!(tabs.current_id(), Some(a));
        tabs.select_previous();
        assert_eq!(tabs.current(), Some(&2));
    }
}
