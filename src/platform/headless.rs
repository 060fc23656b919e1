use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    err::{Result, SystrayError},
    event::{Delivery, Dispatcher},
    id::MenuId,
    lifecycle::{ExitHook, ReadySignal},
    menu_item::MenuItemSnapshot,
    platform::{Platform, PlatformHooks},
};

/// In-memory platform without a display.
///
/// Keeps the last state it was told about for every entry. Its
/// [`Platform::native_loop`] reports ready on entry and blocks until quit;
/// a quit that arrives before the loop starts makes the loop return right
/// away. [`HeadlessPlatform::click`] stands in for a user clicking.
///
/// Clones share the same state, so keep one to inspect what the tray sent.
#[derive(Clone)]
pub struct HeadlessPlatform {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<HeadlessState>,
    quit_tx: Sender<()>,
    quit_rx: Receiver<()>,
}

#[derive(Default)]
struct HeadlessState {
    dispatcher: Option<Dispatcher>,
    ready: Option<ReadySignal>,
    exit: Option<ExitHook>,
    items: HashMap<MenuId, MenuItemSnapshot>,
    separators: Vec<MenuId>,
    hidden: HashSet<MenuId>,
    item_icons: HashMap<MenuId, Vec<u8>>,
    icon: Option<Vec<u8>>,
    template_icon: Option<Vec<u8>>,
    title: Option<String>,
    tooltip: Option<String>,
    updates: usize,
    running: bool,
    quit_requested: bool,
}

impl HeadlessPlatform {
    pub fn new() -> Self {
        let (quit_tx, quit_rx) = crossbeam_channel::bounded(1);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(HeadlessState::default()),
                quit_tx,
                quit_rx,
            }),
        }
    }

    /// Reports a click on `id`, as the native loop would.
    pub fn click(&self, id: MenuId) -> Delivery {
        let dispatcher = self.inner.state.lock().dispatcher.clone();
        match dispatcher {
            Some(dispatcher) => dispatcher.dispatch_click(id),
            None => {
                warn!(%id, "click before the tray was registered");
                Delivery::UnknownItem
            }
        }
    }

    pub fn is_registered(&self) -> bool {
        self.inner.state.lock().dispatcher.is_some()
    }

    /// Last state propagated for `id`.
    pub fn item(&self, id: MenuId) -> Option<MenuItemSnapshot> {
        self.inner.state.lock().items.get(&id).cloned()
    }

    /// Number of add-or-update calls received so far.
    pub fn update_count(&self) -> usize {
        self.inner.state.lock().updates
    }

    pub fn separators(&self) -> Vec<MenuId> {
        self.inner.state.lock().separators.clone()
    }

    pub fn is_hidden(&self, id: MenuId) -> bool {
        self.inner.state.lock().hidden.contains(&id)
    }

    pub fn item_icon(&self, id: MenuId) -> Option<Vec<u8>> {
        self.inner.state.lock().item_icons.get(&id).cloned()
    }

    pub fn icon(&self) -> Option<Vec<u8>> {
        self.inner.state.lock().icon.clone()
    }

    /// Template icon from the last `set_template_icon`, cleared by `set_icon`.
    pub fn template_icon(&self) -> Option<Vec<u8>> {
        self.inner.state.lock().template_icon.clone()
    }

    pub fn title(&self) -> Option<String> {
        self.inner.state.lock().title.clone()
    }

    pub fn tooltip(&self) -> Option<String> {
        self.inner.state.lock().tooltip.clone()
    }

    fn teardown(&self) {
        let exit = {
            let mut state = self.inner.state.lock();
            state.running = false;
            state.ready = None;
            state.exit.take()
        };
        if let Some(exit) = exit {
            exit.run();
        }
    }
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HeadlessPlatform {
    fn register(&self, hooks: PlatformHooks) {
        let mut state = self.inner.state.lock();
        state.dispatcher = Some(hooks.dispatcher);
        state.ready = Some(hooks.ready);
        state.exit = Some(hooks.exit);
    }

    fn add_or_update_menu_item(&self, item: &MenuItemSnapshot) {
        let mut state = self.inner.state.lock();
        state.updates += 1;
        state.items.insert(item.id, item.clone());
    }

    fn add_separator(&self, id: MenuId) {
        self.inner.state.lock().separators.push(id);
    }

    fn hide_menu_item(&self, id: MenuId) {
        self.inner.state.lock().hidden.insert(id);
    }

    fn show_menu_item(&self, id: MenuId) {
        self.inner.state.lock().hidden.remove(&id);
    }

    fn set_menu_item_icon(&self, id: MenuId, icon: &[u8]) {
        self.inner.state.lock().item_icons.insert(id, icon.to_vec());
    }

    fn set_icon(&self, icon: &[u8]) {
        let mut state = self.inner.state.lock();
        state.icon = Some(icon.to_vec());
        state.template_icon = None;
    }

    fn set_template_icon(&self, template: &[u8], regular: &[u8]) {
        let mut state = self.inner.state.lock();
        state.icon = Some(regular.to_vec());
        state.template_icon = Some(template.to_vec());
    }

    fn set_title(&self, title: &str) {
        self.inner.state.lock().title = Some(title.to_string());
    }

    fn set_tooltip(&self, tooltip: &str) {
        self.inner.state.lock().tooltip = Some(tooltip.to_string());
    }

    fn native_loop(&self) -> Result<()> {
        let ready = {
            let mut state = self.inner.state.lock();
            if state.dispatcher.is_none() {
                return Err(SystrayError::NotRegistered);
            }
            if state.quit_requested {
                drop(state);
                self.teardown();
                return Ok(());
            }
            state.running = true;
            state.ready.take()
        };

        debug!("headless loop running");
        if let Some(ready) = ready {
            ready.fire();
        }

        let _ = self.inner.quit_rx.recv();
        self.teardown();
        Ok(())
    }

    fn quit(&self) {
        let running = {
            let mut state = self.inner.state.lock();
            state.quit_requested = true;
            state.running
        };

        // a loop that has not started yet sees the flag on entry
        if running {
            let _ = self.inner.quit_tx.try_send(());
        }
    }
}
