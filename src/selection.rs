use std::collections::HashSet;

/// Result ids picked for bulk publication. Kept in step with the visible,
/// still-eligible records through `reconcile`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: HashSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the id is selected afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    pub fn select_all_visible<I, S>(&mut self, visible_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = visible_ids.into_iter().map(Into::into).collect();
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drops every id not in `new_visible_ids`; returns what was dropped, sorted.
    pub fn reconcile(&mut self, new_visible_ids: &HashSet<String>) -> Vec<String> {
        let mut dropped: Vec<String> = self
            .ids
            .iter()
            .filter(|id| !new_visible_ids.contains(*id))
            .cloned()
            .collect();
        self.ids.retain(|id| new_visible_ids.contains(id));
        dropped.sort();
        dropped
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut out: Vec<String> = self.ids.iter().cloned().collect();
        out.sort();
        out
    }
}
