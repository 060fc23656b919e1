use std::{
    fmt,
    sync::{Arc, Weak},
};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::trace;

use crate::{
    event::{ClickEvent, Delivery},
    id::MenuId,
    tray::TrayCore,
};

/// Something menu items can be added to: the tray itself or a parent item.
pub trait MenuContainer {
    fn add_item(&self, title: &str, tooltip: &str) -> MenuItem;

    fn add_checkbox(&self, title: &str, tooltip: &str, checked: bool) -> MenuItem;
}

/// Read-only copy of an item's state, as handed to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItemSnapshot {
    pub id: MenuId,
    pub title: String,
    pub tooltip: String,
    pub disabled: bool,
    pub checked: bool,
    pub checkable: bool,
    pub parent: Option<MenuId>,
}

#[derive(Debug)]
struct ItemState {
    title: String,
    tooltip: String,
    disabled: bool,
    checked: bool,
}

struct ParentRef {
    id: MenuId,
    item: Weak<ItemInner>,
}

struct ItemInner {
    id: MenuId,
    checkable: bool,
    parent: Option<ParentRef>,
    state: Mutex<ItemState>,
    clicked_tx: Sender<ClickEvent>,
    clicked_rx: Receiver<ClickEvent>,
    core: Weak<TrayCore>,
}

/// Handle to one entry of the tray menu.
///
/// Cloning is cheap and every clone refers to the same item. All methods may
/// be called from any thread; setters on one item are serialized by a
/// per-item lock, so the platform always ends up with the state written by
/// the last setter to return.
#[derive(Clone)]
pub struct MenuItem {
    inner: Arc<ItemInner>,
}

impl MenuItem {
    /// Allocates an id, registers the item and propagates it.
    pub(crate) fn create(
        core: &Weak<TrayCore>,
        title: String,
        tooltip: String,
        parent: Option<&MenuItem>,
        checkbox: Option<bool>,
    ) -> MenuItem {
        // zero capacity: a send only succeeds while a receiver is blocked on it
        let (clicked_tx, clicked_rx) = crossbeam_channel::bounded(0);

        let id = core
            .upgrade()
            .map_or(MenuId::DETACHED, |core| core.allocate_id());

        let item = MenuItem {
            inner: Arc::new(ItemInner {
                id,
                checkable: checkbox.is_some(),
                parent: parent.map(|p| ParentRef {
                    id: p.id(),
                    item: Arc::downgrade(&p.inner),
                }),
                state: Mutex::new(ItemState {
                    title,
                    tooltip,
                    disabled: false,
                    checked: checkbox.unwrap_or(false),
                }),
                clicked_tx,
                clicked_rx,
                core: Weak::clone(core),
            }),
        };

        item.mutate(|_| {});
        item
    }

    pub fn id(&self) -> MenuId {
        self.inner.id
    }

    pub fn parent_id(&self) -> Option<MenuId> {
        self.inner.parent.as_ref().map(|p| p.id)
    }

    /// The parent item, if this is a sub-menu item and the parent is still alive.
    pub fn parent(&self) -> Option<MenuItem> {
        self.inner
            .parent
            .as_ref()
            .and_then(|p| p.item.upgrade())
            .map(|inner| MenuItem { inner })
    }

    /// Channel that yields one [`ClickEvent`] per click.
    ///
    /// Clicks are only delivered to a receiver that is blocked in `recv` (or a
    /// `select`) at the moment of the click. Clicks arriving while nobody
    /// waits are dropped.
    pub fn clicked(&self) -> Receiver<ClickEvent> {
        self.inner.clicked_rx.clone()
    }

    pub fn title(&self) -> String {
        self.inner.state.lock().title.clone()
    }

    pub fn tooltip(&self) -> String {
        self.inner.state.lock().tooltip.clone()
    }

    pub fn disabled(&self) -> bool {
        self.inner.state.lock().disabled
    }

    pub fn checked(&self) -> bool {
        self.inner.state.lock().checked
    }

    pub fn is_checkable(&self) -> bool {
        self.inner.checkable
    }

    pub fn snapshot(&self) -> MenuItemSnapshot {
        self.snapshot_of(&self.inner.state.lock())
    }

    pub fn set_title(&self, title: impl Into<String>) {
        let title = title.into();
        self.mutate(move |s| s.title = title);
    }

    pub fn set_tooltip(&self, tooltip: impl Into<String>) {
        let tooltip = tooltip.into();
        self.mutate(move |s| s.tooltip = tooltip);
    }

    pub fn enable(&self) {
        self.mutate(|s| s.disabled = false);
    }

    pub fn disable(&self) {
        self.mutate(|s| s.disabled = true);
    }

    pub fn check(&self) {
        self.mutate(|s| s.checked = true);
    }

    pub fn uncheck(&self) {
        self.mutate(|s| s.checked = false);
    }

    /// Removes the item from display. It stays registered and keeps its id.
    pub fn hide(&self) {
        if let Some(core) = self.inner.core.upgrade() {
            core.platform().hide_menu_item(self.id());
        }
    }

    pub fn show(&self) {
        if let Some(core) = self.inner.core.upgrade() {
            core.platform().show_menu_item(self.id());
        }
    }

    /// Sets the item's icon from encoded image bytes (PNG, ICO, ...).
    pub fn set_icon(&self, icon: &[u8]) {
        if let Some(core) = self.inner.core.upgrade() {
            core.platform().set_menu_item_icon(self.id(), icon);
        }
    }

    pub fn add_sub_menu_item(
        &self,
        title: impl Into<String>,
        tooltip: impl Into<String>,
    ) -> MenuItem {
        self.add_child(title.into(), tooltip.into(), None)
    }

    pub fn add_sub_menu_item_checkbox(
        &self,
        title: impl Into<String>,
        tooltip: impl Into<String>,
        checked: bool,
    ) -> MenuItem {
        self.add_child(title.into(), tooltip.into(), Some(checked))
    }

    fn add_child(&self, title: String, tooltip: String, checkbox: Option<bool>) -> MenuItem {
        MenuItem::create(&self.inner.core, title, tooltip, Some(self), checkbox)
    }

    /// Non-blocking publish of one click on this item's channel.
    pub(crate) fn try_deliver(&self) -> Delivery {
        match self.inner.clicked_tx.try_send(ClickEvent { id: self.id() }) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => Delivery::Dropped,
        }
    }

    /// Applies `f` and propagates the result while still holding the item lock.
    fn mutate(&self, f: impl FnOnce(&mut ItemState)) {
        let mut state = self.inner.state.lock();
        f(&mut state);

        let Some(core) = self.inner.core.upgrade() else {
            trace!(id = %self.id(), "tray dropped, update not propagated");
            return;
        };
        core.update(self, self.snapshot_of(&state));
    }

    fn snapshot_of(&self, state: &ItemState) -> MenuItemSnapshot {
        MenuItemSnapshot {
            id: self.inner.id,
            title: state.title.clone(),
            tooltip: state.tooltip.clone(),
            disabled: state.disabled,
            checked: state.checked,
            checkable: self.inner.checkable,
            parent: self.parent_id(),
        }
    }
}

impl MenuContainer for MenuItem {
    fn add_item(&self, title: &str, tooltip: &str) -> MenuItem {
        self.add_sub_menu_item(title, tooltip)
    }

    fn add_checkbox(&self, title: &str, tooltip: &str, checked: bool) -> MenuItem {
        self.add_sub_menu_item_checkbox(title, tooltip, checked)
    }
}

impl PartialEq for MenuItem {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for MenuItem {}

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.title();
        match self.parent_id() {
            None => write!(f, "MenuItem[{}, {:?}]", self.id(), title),
            Some(parent) => write!(f, "MenuItem[{}, parent {}, {:?}]", self.id(), parent, title),
        }
    }
}

impl fmt::Debug for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MenuItem").field(&self.snapshot()).finish()
    }
}
