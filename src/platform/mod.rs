//! The native side of the tray.
//!
//! A [`Platform`] renders the icon and menu and runs the event loop. The core
//! calls into it from arbitrary threads; implementations that are confined to
//! one UI thread forward those calls to their loop (see the `native` backend).

mod headless;
#[cfg(feature = "native")]
mod native;

pub use headless::HeadlessPlatform;
#[cfg(feature = "native")]
pub use native::NativePlatform;

use crate::{
    err::Result,
    event::Dispatcher,
    id::MenuId,
    lifecycle::{ExitHook, ReadySignal},
    menu_item::MenuItemSnapshot,
};

/// Everything the platform needs from the core, handed over once at
/// registration.
#[derive(Debug)]
pub struct PlatformHooks {
    /// Fire once native initialization is done.
    pub ready: ReadySignal,
    /// Run on the loop thread during teardown, before `native_loop` returns.
    pub exit: ExitHook,
    /// Report clicks here.
    pub dispatcher: Dispatcher,
}

pub trait Platform: Send + Sync + 'static {
    fn register(&self, hooks: PlatformHooks);

    /// Creates the visible entry for `item.id`, or updates it in place.
    fn add_or_update_menu_item(&self, item: &MenuItemSnapshot);

    fn add_separator(&self, id: MenuId);

    fn hide_menu_item(&self, id: MenuId);

    fn show_menu_item(&self, id: MenuId);

    fn set_menu_item_icon(&self, id: MenuId, icon: &[u8]);

    fn set_icon(&self, icon: &[u8]);

    /// Sets a template icon where the desktop supports them (macOS menu bar),
    /// `regular` everywhere else.
    fn set_template_icon(&self, template: &[u8], regular: &[u8]);

    fn set_title(&self, title: &str);

    fn set_tooltip(&self, tooltip: &str);

    /// Blocks the calling thread running the event loop until [`Platform::quit`].
    fn native_loop(&self) -> Result<()>;

    /// Starts teardown. Must eventually run the exit hook on the loop thread.
    fn quit(&self);
}
