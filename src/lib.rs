//! # systray
//!
//! Puts an icon in the notification area and attaches a hierarchical,
//! updatable menu to it. Every menu item owns a click channel; the native
//! loop reports clicks by id and they are handed to whoever is waiting on
//! that channel.
//!
//! ```no_run
//! use systray::{Callbacks, HeadlessPlatform, Systray};
//!
//! let tray = Systray::new(HeadlessPlatform::new());
//! let ready_tray = tray.clone();
//!
//! tray.run(
//!     Callbacks::new()
//!         .on_ready(move || {
//!             let quit = ready_tray.add_menu_item("Quit", "Quit the app");
//!             if quit.clicked().recv().is_ok() {
//!                 ready_tray.quit();
//!             }
//!         })
//!         .on_exit(|| println!("bye")),
//! )?;
//! # Ok::<(), systray::SystrayError>(())
//! ```
//!
//! Clicks are not buffered: a click is delivered only if a consumer is
//! blocked on the item's channel at that moment, otherwise it is dropped so
//! the native loop never waits on application code.
//!
//! With the `native` feature, [`NativePlatform`] renders the tray through
//! `tray-icon` and runs a `winit` event loop.

mod config;
mod err;
mod event;
mod id;
mod lifecycle;
mod menu_item;
mod platform;
mod registry;
mod tray;
pub mod util;

pub use crate::config::{MenuEntryConfig, MenuLayout, TrayConfig, CONFIG_PATH, ENV_PREFIX};
pub use err::{Result, SystrayError};
pub use event::{ClickEvent, Delivery, Dispatcher};
pub use id::{IdAllocator, MenuId};
pub use lifecycle::{Callbacks, ExitHook, LifecycleState, ReadySignal};
pub use menu_item::{MenuContainer, MenuItem, MenuItemSnapshot};
pub use platform::{HeadlessPlatform, Platform, PlatformHooks};
#[cfg(feature = "native")]
pub use platform::NativePlatform;
pub use registry::Registry;
pub use tray::Systray;
