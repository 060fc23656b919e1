use std::{fmt, sync::Arc};

use tracing::{trace, warn};

use crate::{id::MenuId, registry::Registry};

/// Sent on an item's click channel when the user activates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickEvent {
    pub id: MenuId,
}

/// Outcome of routing one click reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A consumer was blocked on the item's channel and received the click.
    Delivered,
    /// Nobody was waiting; the click is gone.
    Dropped,
    /// No registered item has this id (separator or stale id).
    UnknownItem,
}

/// Routes clicks from the native loop to item channels.
///
/// Never blocks: a click that finds no waiting receiver is dropped, it is not
/// queued for later.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub(crate) fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn dispatch_click(&self, id: MenuId) -> Delivery {
        let Some(item) = self.registry.lookup(id) else {
            warn!(%id, "no menu item with this id");
            return Delivery::UnknownItem;
        };

        let delivery = item.try_deliver();
        if delivery == Delivery::Dropped {
            trace!(%id, "click dropped, nobody is listening");
        }
        delivery
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("items", &self.registry.len())
            .finish()
    }
}
