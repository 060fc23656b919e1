//! tray-icon + winit backend.
//!
//! Menu objects are not thread safe, so they live on the thread that runs
//! [`NativePlatform::native_loop`]. Everything else talks to that thread by
//! sending [`NativeCommand`]s through the event loop proxy; commands sent
//! before the loop exists are queued and applied when it starts.
//!
//! Targets Windows and macOS. On macOS the loop must run on the main thread.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};
use tray_icon::{
    menu::{
        CheckMenuItem, Icon as MenuIcon, IconMenuItem, IsMenuItem, Menu, MenuEvent,
        MenuId as NativeMenuId, MenuItem as NativeMenuItem, PredefinedMenuItem, Submenu,
    },
    Icon, TrayIcon, TrayIconBuilder,
};
use winit::{
    application::ApplicationHandler,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopClosed, EventLoopProxy},
};

use crate::{
    err::{Result, SystrayError},
    event::Dispatcher,
    id::MenuId,
    lifecycle::{ExitHook, ReadySignal},
    menu_item::MenuItemSnapshot,
    platform::{Platform, PlatformHooks},
    util::{icon_from_bytes, menu_icon_from_bytes},
};

#[derive(Debug)]
pub(crate) enum NativeCommand {
    AddOrUpdate(MenuItemSnapshot),
    AddSeparator(MenuId),
    Hide(MenuId),
    Show(MenuId),
    SetItemIcon(MenuId, Vec<u8>),
    SetIcon(Vec<u8>),
    SetTemplateIcon { template: Vec<u8>, regular: Vec<u8> },
    SetTitle(String),
    SetTooltip(String),
    TrayMenuEvent(MenuEvent),
    Quit,
}

#[derive(Default)]
struct ProxySlot {
    proxy: Option<EventLoopProxy<NativeCommand>>,
    pending: Vec<NativeCommand>,
}

/// Renders the tray with the `tray-icon` crate and runs a `winit` event loop.
#[derive(Default)]
pub struct NativePlatform {
    hooks: Mutex<Option<PlatformHooks>>,
    proxy: Mutex<ProxySlot>,
}

impl NativePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn send(&self, command: NativeCommand) {
        let mut slot = self.proxy.lock();
        if let Some(proxy) = slot.proxy.as_ref() {
            if let Err(EventLoopClosed(command)) = proxy.send_event(command) {
                debug!(?command, "event loop closed, command dropped");
            }
            return;
        }
        slot.pending.push(command);
    }
}

impl Platform for NativePlatform {
    fn register(&self, hooks: PlatformHooks) {
        *self.hooks.lock() = Some(hooks);
    }

    fn add_or_update_menu_item(&self, item: &MenuItemSnapshot) {
        self.send(NativeCommand::AddOrUpdate(item.clone()));
    }

    fn add_separator(&self, id: MenuId) {
        self.send(NativeCommand::AddSeparator(id));
    }

    fn hide_menu_item(&self, id: MenuId) {
        self.send(NativeCommand::Hide(id));
    }

    fn show_menu_item(&self, id: MenuId) {
        self.send(NativeCommand::Show(id));
    }

    fn set_menu_item_icon(&self, id: MenuId, icon: &[u8]) {
        self.send(NativeCommand::SetItemIcon(id, icon.to_vec()));
    }

    fn set_icon(&self, icon: &[u8]) {
        self.send(NativeCommand::SetIcon(icon.to_vec()));
    }

    fn set_template_icon(&self, template: &[u8], regular: &[u8]) {
        self.send(NativeCommand::SetTemplateIcon {
            template: template.to_vec(),
            regular: regular.to_vec(),
        });
    }

    fn set_title(&self, title: &str) {
        self.send(NativeCommand::SetTitle(title.to_string()));
    }

    fn set_tooltip(&self, tooltip: &str) {
        self.send(NativeCommand::SetTooltip(tooltip.to_string()));
    }

    fn native_loop(&self) -> Result<()> {
        // winit allows one event loop per process, don't spend it on a missing registration
        let hooks = self.hooks.lock().take().ok_or(SystrayError::NotRegistered)?;

        let event_loop = match EventLoop::<NativeCommand>::with_user_event().build() {
            Ok(event_loop) => event_loop,
            Err(e) => {
                *self.hooks.lock() = Some(hooks);
                return Err(SystrayError::EventLoop(e.to_string()));
            }
        };

        let proxy = event_loop.create_proxy();
        let menu_proxy = Mutex::new(proxy.clone());
        MenuEvent::set_event_handler(Some(move |event| {
            if menu_proxy
                .lock()
                .send_event(NativeCommand::TrayMenuEvent(event))
                .is_err()
            {
                trace!("menu event after the event loop closed");
            }
        }));

        let backlog = {
            let mut slot = self.proxy.lock();
            slot.proxy = Some(proxy);
            std::mem::take(&mut slot.pending)
        };

        let mut app = NativeApp::new(hooks);
        for command in backlog {
            app.apply(command);
        }

        let result = event_loop
            .run_app(&mut app)
            .map_err(|e| SystrayError::EventLoop(e.to_string()));

        self.proxy.lock().proxy = None;
        MenuEvent::set_event_handler(None::<fn(MenuEvent)>);
        result
    }

    fn quit(&self) {
        self.send(NativeCommand::Quit);
    }
}

struct NativeApp {
    menu: NativeMenu,
    tray_icon: Option<TrayIcon>,
    icon: Option<Icon>,
    icon_as_template: bool,
    title: Option<String>,
    tooltip: Option<String>,
    ready: Option<ReadySignal>,
    exit: Option<ExitHook>,
    dispatcher: Dispatcher,
    quit_requested: bool,
}

impl NativeApp {
    fn new(hooks: PlatformHooks) -> Self {
        Self {
            menu: NativeMenu::new(),
            tray_icon: None,
            icon: None,
            icon_as_template: false,
            title: None,
            tooltip: None,
            ready: Some(hooks.ready),
            exit: Some(hooks.exit),
            dispatcher: hooks.dispatcher,
            quit_requested: false,
        }
    }

    fn apply(&mut self, command: NativeCommand) {
        match command {
            NativeCommand::AddOrUpdate(item) => self.menu.add_or_update(&item),
            NativeCommand::AddSeparator(id) => self.menu.add_separator(id),
            NativeCommand::Hide(id) => self.menu.hide(id),
            NativeCommand::Show(id) => self.menu.show(id),
            NativeCommand::SetItemIcon(id, bytes) => match menu_icon_from_bytes(&bytes) {
                Ok(icon) => self.menu.set_item_icon(id, icon),
                Err(e) => warn!(%id, %e, "ignoring menu item icon"),
            },
            NativeCommand::SetIcon(bytes) => self.set_icon(&bytes, false),
            NativeCommand::SetTemplateIcon { template, regular } => {
                if cfg!(target_os = "macos") {
                    self.set_icon(&template, true);
                } else {
                    self.set_icon(&regular, false);
                }
            }
            NativeCommand::SetTitle(title) => {
                if let Some(tray_icon) = self.tray_icon.as_ref() {
                    tray_icon.set_title(Some(&title));
                }
                self.title = Some(title);
            }
            NativeCommand::SetTooltip(tooltip) => {
                if let Some(tray_icon) = self.tray_icon.as_ref() {
                    if let Err(e) = tray_icon.set_tooltip(Some(&tooltip)) {
                        warn!(%e, "failed to set tray tooltip");
                    }
                }
                self.tooltip = Some(tooltip);
            }
            NativeCommand::TrayMenuEvent(event) => self.on_menu_event(event),
            NativeCommand::Quit => self.quit_requested = true,
        }
    }

    fn set_icon(&mut self, bytes: &[u8], as_template: bool) {
        let icon = match icon_from_bytes(bytes) {
            Ok(icon) => icon,
            Err(e) => {
                warn!(%e, "ignoring tray icon");
                return;
            }
        };

        if let Some(tray_icon) = self.tray_icon.as_ref() {
            if let Err(e) = tray_icon.set_icon(Some(icon.clone())) {
                warn!(%e, "failed to set tray icon");
            }
            tray_icon.set_icon_as_template(as_template);
        }
        self.icon = Some(icon);
        self.icon_as_template = as_template;
    }

    fn on_menu_event(&self, event: MenuEvent) {
        let Ok(id) = event.id().0.parse::<MenuId>() else {
            trace!(id = ?event.id(), "menu event for a foreign id");
            return;
        };
        self.menu.restore_check_state(id);
        self.dispatcher.dispatch_click(id);
    }

    fn build_tray_icon(&mut self) -> std::result::Result<(), tray_icon::Error> {
        let mut builder = TrayIconBuilder::new().with_menu(Box::new(self.menu.root.clone()));
        if let Some(icon) = self.icon.clone() {
            builder = builder
                .with_icon(icon)
                .with_icon_as_template(self.icon_as_template);
        }
        if let Some(title) = self.title.as_ref() {
            builder = builder.with_title(title);
        }
        if let Some(tooltip) = self.tooltip.as_ref() {
            builder = builder.with_tooltip(tooltip);
        }

        self.tray_icon = Some(builder.build()?);
        Ok(())
    }
}

impl ApplicationHandler<NativeCommand> for NativeApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        if self.quit_requested {
            event_loop.exit();
            return;
        }
        if self.tray_icon.is_some() {
            return;
        }

        if let Err(e) = self.build_tray_icon() {
            error!(%e, "failed to create tray icon");
            event_loop.exit();
            return;
        }
        if let Some(ready) = self.ready.take() {
            ready.fire();
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        _event: winit::event::WindowEvent,
    ) {
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, command: NativeCommand) {
        self.apply(command);
        if self.quit_requested {
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // an unfired ready signal is dropped here, so on_ready never runs
        self.ready = None;
        if let Some(exit) = self.exit.take() {
            exit.run();
        }
        self.tray_icon = None;
    }
}

enum NativeEntry {
    Item(NativeMenuItem),
    Icon(IconMenuItem),
    Check(CheckMenuItem),
    Submenu(Submenu),
    Separator(PredefinedMenuItem),
}

impl NativeEntry {
    fn as_native(&self) -> &dyn IsMenuItem {
        match self {
            NativeEntry::Item(item) => item,
            NativeEntry::Icon(item) => item,
            NativeEntry::Check(item) => item,
            NativeEntry::Submenu(item) => item,
            NativeEntry::Separator(item) => item,
        }
    }
}

/// The native menu tree plus the ordering needed to hide and re-show entries.
struct NativeMenu {
    root: Menu,
    entries: HashMap<MenuId, NativeEntry>,
    parents: HashMap<MenuId, Option<MenuId>>,
    children: HashMap<Option<MenuId>, Vec<MenuId>>,
    hidden: HashSet<MenuId>,
    /// Checked state last set by the application, per check item.
    checked: HashMap<MenuId, bool>,
}

impl NativeMenu {
    fn new() -> Self {
        Self {
            root: Menu::new(),
            entries: HashMap::new(),
            parents: HashMap::new(),
            children: HashMap::new(),
            hidden: HashSet::new(),
            checked: HashMap::new(),
        }
    }

    fn add_or_update(&mut self, item: &MenuItemSnapshot) {
        if item.checkable {
            self.checked.insert(item.id, item.checked);
        }
        if let Some(entry) = self.entries.get(&item.id) {
            update_entry(entry, item);
            return;
        }

        if let Some(parent) = item.parent {
            self.ensure_submenu(parent);
        }

        let native_id = NativeMenuId::new(item.id.to_string());
        let entry = if item.checkable {
            NativeEntry::Check(CheckMenuItem::with_id(
                native_id,
                &item.title,
                !item.disabled,
                item.checked,
                None,
            ))
        } else {
            NativeEntry::Item(NativeMenuItem::with_id(
                native_id,
                &item.title,
                !item.disabled,
                None,
            ))
        };

        self.insert_entry(item.id, item.parent, entry);
    }

    fn add_separator(&mut self, id: MenuId) {
        self.insert_entry(id, None, NativeEntry::Separator(PredefinedMenuItem::separator()));
    }

    fn insert_entry(&mut self, id: MenuId, parent: Option<MenuId>, entry: NativeEntry) {
        self.entries.insert(id, entry);
        self.parents.insert(id, parent);
        self.children.entry(parent).or_default().push(id);
        self.attach(parent, id);
    }

    fn hide(&mut self, id: MenuId) {
        if !self.entries.contains_key(&id) || self.hidden.contains(&id) {
            return;
        }
        self.detach(self.parent_of(id), id);
        self.hidden.insert(id);
    }

    fn show(&mut self, id: MenuId) {
        if !self.hidden.remove(&id) {
            return;
        }
        self.attach(self.parent_of(id), id);
    }

    /// muda flips check items on click; the application owns the checked state.
    fn restore_check_state(&self, id: MenuId) {
        if let (Some(NativeEntry::Check(item)), Some(checked)) =
            (self.entries.get(&id), self.checked.get(&id))
        {
            item.set_checked(*checked);
        }
    }

    /// Plain items are replaced by an icon item at the same position.
    fn set_item_icon(&mut self, id: MenuId, icon: MenuIcon) {
        let (text, enabled) = match self.entries.get(&id) {
            Some(NativeEntry::Icon(item)) => {
                item.set_icon(Some(icon));
                return;
            }
            Some(NativeEntry::Item(item)) => (item.text(), item.is_enabled()),
            Some(NativeEntry::Check(_)) | Some(NativeEntry::Submenu(_)) => {
                debug!(%id, "check items and submenus can't carry an icon");
                return;
            }
            Some(NativeEntry::Separator(_)) | None => {
                warn!(%id, "icon for an unknown menu item");
                return;
            }
        };

        let item = IconMenuItem::with_id(
            NativeMenuId::new(id.to_string()),
            text,
            enabled,
            Some(icon),
            None,
        );
        self.replace_entry(id, NativeEntry::Icon(item));
    }

    /// Native menus only nest under submenus, so a parent item that gains its
    /// first child is replaced by a submenu at the same position.
    fn ensure_submenu(&mut self, parent: MenuId) {
        let (text, enabled) = match self.entries.get(&parent) {
            Some(NativeEntry::Item(item)) => (item.text(), item.is_enabled()),
            Some(NativeEntry::Icon(item)) => (item.text(), item.is_enabled()),
            Some(NativeEntry::Check(item)) => (item.text(), item.is_enabled()),
            Some(NativeEntry::Submenu(_)) => return,
            Some(NativeEntry::Separator(_)) | None => {
                warn!(%parent, "parent is not a menu item");
                return;
            }
        };

        let submenu = Submenu::with_id(NativeMenuId::new(parent.to_string()), text, enabled);
        self.replace_entry(parent, NativeEntry::Submenu(submenu));
        debug!(%parent, "menu item became a submenu");
    }

    /// Swaps the native entry for `id`, keeping its place and visibility.
    fn replace_entry(&mut self, id: MenuId, entry: NativeEntry) {
        let parent = self.parent_of(id);
        let visible = !self.hidden.contains(&id);
        if visible {
            self.detach(parent, id);
        }
        self.entries.insert(id, entry);
        if visible {
            self.attach(parent, id);
        }
    }

    fn parent_of(&self, id: MenuId) -> Option<MenuId> {
        self.parents.get(&id).copied().flatten()
    }

    /// Index among the visible siblings that precede `id`.
    fn position(&self, parent: Option<MenuId>, id: MenuId) -> usize {
        self.children
            .get(&parent)
            .map(|siblings| {
                siblings
                    .iter()
                    .take_while(|sibling| **sibling != id)
                    .filter(|sibling| !self.hidden.contains(sibling))
                    .count()
            })
            .unwrap_or(0)
    }

    fn attach(&self, parent: Option<MenuId>, id: MenuId) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let position = self.position(parent, id);

        let result = match parent {
            None => self.root.insert(entry.as_native(), position),
            Some(parent) => match self.entries.get(&parent) {
                Some(NativeEntry::Submenu(submenu)) => submenu.insert(entry.as_native(), position),
                _ => {
                    warn!(%id, %parent, "parent has no submenu, entry not shown");
                    return;
                }
            },
        };
        if let Err(e) = result {
            warn!(%id, %e, "failed to insert menu entry");
        }
    }

    fn detach(&self, parent: Option<MenuId>, id: MenuId) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };

        let result = match parent {
            None => self.root.remove(entry.as_native()),
            Some(parent) => match self.entries.get(&parent) {
                Some(NativeEntry::Submenu(submenu)) => submenu.remove(entry.as_native()),
                _ => return,
            },
        };
        if let Err(e) = result {
            warn!(%id, %e, "failed to remove menu entry");
        }
    }
}

fn update_entry(entry: &NativeEntry, item: &MenuItemSnapshot) {
    match entry {
        NativeEntry::Item(native) => {
            native.set_text(&item.title);
            native.set_enabled(!item.disabled);
        }
        NativeEntry::Icon(native) => {
            native.set_text(&item.title);
            native.set_enabled(!item.disabled);
        }
        NativeEntry::Check(native) => {
            native.set_text(&item.title);
            native.set_enabled(!item.disabled);
            native.set_checked(item.checked);
        }
        NativeEntry::Submenu(native) => {
            native.set_text(&item.title);
            native.set_enabled(!item.disabled);
        }
        NativeEntry::Separator(_) => {}
    }
}
