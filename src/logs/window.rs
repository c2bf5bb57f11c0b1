use serde::Serialize;
use std::collections::HashSet;

use crate::api::query::LogPage;
use crate::models::filter::FilterState;
use crate::models::log_record::{ItemId, LogRecord};

/// Records currently loaded for the active filter
#[derive(Debug, Clone, Default)]
pub struct LogWindow {
    items: Vec<LogRecord>,
    ids: HashSet<ItemId>,
    total: usize,
    has_more: bool,
    /// Offset the next page starts at, counted in backend rows
    next_offset: usize,
    /// Request generation that produced the current contents
    generation: u64,
    /// Filter the first page was queried with; offsets are only valid for it
    filter: Option<FilterState>,
}

/// Immutable copy of a window, handed to renderers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    pub items: Vec<LogRecord>,
    pub total: usize,
    pub has_more: bool,
    pub generation: u64,
}

impl LogWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[LogRecord] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn next_offset(&self) -> usize {
        self.next_offset
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.ids.contains(id)
    }

    /// Whether the loaded rows and offsets belong to `filter`
    pub fn built_for(&self, filter: &FilterState) -> bool {
        self.filter.as_ref() == Some(filter)
    }

    /// Swap in the first page of a fresh result set for `filter`
    pub fn replace(&mut self, page: LogPage, generation: u64, filter: &FilterState) {
        self.items.clear();
        self.ids.clear();
        self.next_offset = 0;
        self.filter = Some(filter.clone());
        self.append(page, generation);
    }

    /// Add the next page, skipping ids already loaded. Returns how many
    /// records were actually added.
    pub fn append(&mut self, page: LogPage, generation: u64) -> usize {
        let before = self.items.len();
        self.next_offset += page.items.len();

        for record in page.items {
            if self.ids.insert(record.id.clone()) {
                self.items.push(record);
            }
        }

        self.total = page.total;
        self.has_more = page.has_more;
        self.generation = generation;
        self.items.len() - before
    }

    /// Forget everything, e.g. after the backend logs were cleared
    pub fn clear(&mut self) {
        self.items.clear();
        self.ids.clear();
        self.total = 0;
        self.has_more = false;
        self.next_offset = 0;
        self.filter = None;
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            items: self.items.clone(),
            total: self.total,
            has_more: self.has_more,
            generation: self.generation,
        }
    }
}
