use std::sync::Arc;

use tracing::debug;

use crate::{
    config::{MenuLayout, TrayConfig},
    err::Result,
    event::Dispatcher,
    id::{IdAllocator, MenuId},
    lifecycle::{Callbacks, Lifecycle, LifecycleState},
    menu_item::{MenuContainer, MenuItem, MenuItemSnapshot},
    platform::{Platform, PlatformHooks},
    registry::Registry,
};

pub(crate) struct TrayCore {
    ids: IdAllocator,
    registry: Arc<Registry>,
    platform: Arc<dyn Platform>,
    lifecycle: Lifecycle,
}

impl TrayCore {
    pub(crate) fn allocate_id(&self) -> MenuId {
        self.ids.allocate()
    }

    pub(crate) fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    /// Writes the registry entry, then propagates outside the registry lock.
    pub(crate) fn update(&self, item: &MenuItem, snapshot: MenuItemSnapshot) {
        self.registry.insert(item.clone());
        self.platform.add_or_update_menu_item(&snapshot);
    }
}

/// A tray icon with its menu.
///
/// Cloning yields another handle to the same tray. Items may be created and
/// changed from any thread, before or after the tray is registered.
///
/// On platforms with a main-thread requirement (macOS), [`Systray::run`] must
/// be called from the main thread. This is not checked.
#[derive(Clone)]
pub struct Systray {
    core: Arc<TrayCore>,
}

impl Systray {
    pub fn new(platform: impl Platform) -> Self {
        Self::with_platform(Arc::new(platform))
    }

    pub fn with_platform(platform: Arc<dyn Platform>) -> Self {
        Self {
            core: Arc::new(TrayCore {
                ids: IdAllocator::new(),
                registry: Arc::new(Registry::new()),
                platform,
                lifecycle: Lifecycle::new(),
            }),
        }
    }

    /// Registers the callbacks with the platform without entering its loop.
    ///
    /// Use this when something else drives the native event loop.
    pub fn register(&self, callbacks: Callbacks) -> Result<()> {
        let (ready, exit) = self.core.lifecycle.register(callbacks)?;
        self.core.platform.register(PlatformHooks {
            ready,
            exit,
            dispatcher: self.dispatcher(),
        });
        Ok(())
    }

    /// Registers the callbacks and runs the native loop until [`Systray::quit`].
    pub fn run(&self, callbacks: Callbacks) -> Result<()> {
        self.register(callbacks)?;
        self.core.lifecycle.enter_loop();
        debug!("entering native loop");

        let result = self.core.platform.native_loop();
        self.core.lifecycle.loop_returned();
        result
    }

    /// Quits the tray. Safe from any thread, any number of times; only the
    /// first call after registration has an effect.
    pub fn quit(&self) {
        let platform = self.core.platform();
        self.core.lifecycle.quit(|| platform.quit());
    }

    pub fn state(&self) -> LifecycleState {
        self.core.lifecycle.state()
    }

    pub fn add_menu_item(&self, title: impl Into<String>, tooltip: impl Into<String>) -> MenuItem {
        MenuItem::create(
            &Arc::downgrade(&self.core),
            title.into(),
            tooltip.into(),
            None,
            None,
        )
    }

    pub fn add_menu_item_checkbox(
        &self,
        title: impl Into<String>,
        tooltip: impl Into<String>,
        checked: bool,
    ) -> MenuItem {
        MenuItem::create(
            &Arc::downgrade(&self.core),
            title.into(),
            tooltip.into(),
            None,
            Some(checked),
        )
    }

    /// Adds a separator bar. It takes an id but is never registered and
    /// never receives clicks.
    pub fn add_separator(&self) -> MenuId {
        let id = self.core.allocate_id();
        self.core.platform.add_separator(id);
        id
    }

    /// Sets the tray icon from encoded image bytes.
    pub fn set_icon(&self, icon: &[u8]) {
        self.core.platform.set_icon(icon);
    }

    /// Sets a template icon on macOS (tinted by the system to match the menu
    /// bar) and `regular` on other platforms.
    pub fn set_template_icon(&self, template: &[u8], regular: &[u8]) {
        self.core.platform.set_template_icon(template, regular);
    }

    pub fn set_title(&self, title: &str) {
        self.core.platform.set_title(title);
    }

    pub fn set_tooltip(&self, tooltip: &str) {
        self.core.platform.set_tooltip(tooltip);
    }

    pub fn lookup(&self, id: MenuId) -> Option<MenuItem> {
        self.core.registry.lookup(id)
    }

    pub fn registry(&self) -> &Registry {
        &self.core.registry
    }

    /// Handle platforms use to report clicks.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.core.registry))
    }

    /// Applies tray properties and builds the menu described by `config`.
    pub fn apply_config(&self, config: &TrayConfig) -> Result<MenuLayout> {
        config.apply(self)
    }
}

impl MenuContainer for Systray {
    fn add_item(&self, title: &str, tooltip: &str) -> MenuItem {
        self.add_menu_item(title, tooltip)
    }

    fn add_checkbox(&self, title: &str, tooltip: &str, checked: bool) -> MenuItem {
        self.add_menu_item_checkbox(title, tooltip, checked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::HeadlessPlatform;
    use pretty_assertions::assert_eq;

    #[test]
    fn update_then_lookup_matches_propagated_state() {
        let platform = HeadlessPlatform::new();
        let tray = Systray::new(platform.clone());

        let item = tray.add_menu_item("Open", "open the window");
        item.set_title("Open again");
        item.disable();

        let looked_up = tray.lookup(item.id()).unwrap();
        assert_eq!(Some(looked_up.snapshot()), platform.item(item.id()));
        assert_eq!(looked_up, item);
    }

    #[test]
    fn updates_overwrite_in_place() {
        let platform = HeadlessPlatform::new();
        let tray = Systray::new(platform.clone());

        let item = tray.add_menu_item_checkbox("Mute", "", false);
        item.check();
        item.uncheck();
        item.set_tooltip("silence notifications");

        assert_eq!(tray.registry().len(), 1);
        assert_eq!(platform.update_count(), 4);
        assert!(!platform.item(item.id()).unwrap().checked);
    }

    #[test]
    fn separators_take_ids_but_stay_unregistered() {
        let platform = HeadlessPlatform::new();
        let tray = Systray::new(platform.clone());

        let first = tray.add_menu_item("A", "");
        let sep = tray.add_separator();
        let second = tray.add_menu_item("B", "");

        assert!(first.id() < sep && sep < second.id());
        assert!(tray.lookup(sep).is_none());
        assert_eq!(platform.separators(), vec![sep]);
        assert_eq!(tray.registry().len(), 2);
    }

    #[test]
    fn hide_keeps_registry_entry() {
        let platform = HeadlessPlatform::new();
        let tray = Systray::new(platform.clone());

        let item = tray.add_menu_item("Status", "");
        item.hide();
        assert!(platform.is_hidden(item.id()));
        assert!(tray.lookup(item.id()).is_some());

        item.show();
        assert!(!platform.is_hidden(item.id()));
    }

    #[test]
    fn tray_properties_are_forwarded() {
        let platform = HeadlessPlatform::new();
        let tray = Systray::new(platform.clone());

        tray.set_title("cpu");
        tray.set_tooltip("cpu usage");
        tray.set_icon(&[1, 2, 3]);
        let item = tray.add_menu_item("Item", "");
        item.set_icon(&[4]);

        assert_eq!(platform.title().as_deref(), Some("cpu"));
        assert_eq!(platform.tooltip().as_deref(), Some("cpu usage"));
        assert_eq!(platform.icon(), Some(vec![1, 2, 3]));
        assert_eq!(platform.item_icon(item.id()), Some(vec![4]));
    }

    #[test]
    fn template_icon_keeps_regular_fallback() {
        let platform = HeadlessPlatform::new();
        let tray = Systray::new(platform.clone());

        tray.set_template_icon(&[9], &[1]);
        assert_eq!(platform.template_icon(), Some(vec![9]));
        assert_eq!(platform.icon(), Some(vec![1]));

        tray.set_icon(&[2]);
        assert_eq!(platform.template_icon(), None);
        assert_eq!(platform.icon(), Some(vec![2]));
    }

    #[test]
    fn items_outliving_the_tray_stop_propagating() {
        let platform = HeadlessPlatform::new();
        let tray = Systray::new(platform.clone());
        let item = tray.add_menu_item("Orphan", "");
        let updates = platform.update_count();
        drop(tray);

        item.set_title("still usable");
        let child = item.add_sub_menu_item("child", "");

        assert_eq!(item.title(), "still usable");
        assert_eq!(child.id(), MenuId::DETACHED);
        assert_eq!(platform.update_count(), updates);
    }
}
