use std::collections::HashMap;

use parking_lot::RwLock;

use crate::{id::MenuId, menu_item::MenuItem};

/// Live menu items keyed by id. Separators never appear here.
#[derive(Default)]
pub struct Registry {
    items: RwLock<HashMap<MenuId, MenuItem>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the entry for `item.id()`.
    ///
    /// The write lock is released before returning, callers propagate to the
    /// platform afterwards.
    pub(crate) fn insert(&self, item: MenuItem) {
        self.items.write().insert(item.id(), item);
    }

    pub fn lookup(&self, id: MenuId) -> Option<MenuItem> {
        self.items.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}
