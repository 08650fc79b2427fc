//! Row selection that outlives the loaded page.
//!
//! Selection is keyed by the row's stable numeric id, so rows selected on
//! page 1 stay selected while page 3 is shown or after a re-sort. Clearing it
//! when the table's identity changes (another view or collection) is up to
//! the caller.

use std::collections::BTreeSet;

use tessera_core::AssetId;

use crate::schema::Row;

/// Set of selected row ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionTracker {
    ids: BTreeSet<AssetId>,
}

impl SelectionTracker {
    /// Empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips an id. Returns whether it is now selected.
    pub fn toggle(&mut self, id: AssetId) -> bool {
        if self.ids.remove(&id) {
            false
        } else {
            self.ids.insert(id);
            true
        }
    }

    /// Flips a row. Returns `None` when the row carries no id.
    pub fn toggle_row(&mut self, row: &Row) -> Option<bool> {
        row.id().map(|id| self.toggle(id))
    }

    /// Sets an id's state. Returns true if it changed.
    pub fn set(&mut self, id: AssetId, selected: bool) -> bool {
        if selected {
            self.ids.insert(id)
        } else {
            self.ids.remove(&id)
        }
    }

    /// Selects or deselects every row that has an id. Returns how many changed.
    pub fn set_rows<'a>(&mut self, rows: impl IntoIterator<Item = &'a Row>, selected: bool) -> usize {
        rows.into_iter()
            .filter_map(Row::id)
            .filter(|id| self.set(*id, selected))
            .count()
    }

    /// True if `id` is selected.
    #[must_use]
    pub fn contains(&self, id: AssetId) -> bool {
        self.ids.contains(&id)
    }

    /// True if the row is selected.
    #[must_use]
    pub fn contains_row(&self, row: &Row) -> bool {
        row.id().is_some_and(|id| self.contains(id))
    }

    /// Selected ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = AssetId> + '_ {
        self.ids.iter().copied()
    }

    /// Number of selected rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Deselects everything. Returns true if anything was selected.
    pub fn clear(&mut self) -> bool {
        let had_any = !self.ids.is_empty();
        self.ids.clear();
        had_any
    }
}
