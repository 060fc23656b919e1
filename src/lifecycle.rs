use std::{fmt, sync::Arc, thread};

use crossbeam_channel::Sender;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::err::{Result, SystrayError};

pub(crate) const READY_WORKER_NAME: &str = "systray-ready";

type Callback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Registered,
    Running,
    Quitting,
    Terminated,
}

/// Application callbacks passed to [`Systray::register`](crate::Systray::register)
/// and [`Systray::run`](crate::Systray::run).
///
/// `on_ready` runs on a dedicated worker thread once the platform reports that
/// it is initialized, never on the native loop thread. `on_exit` runs on the
/// native loop thread during teardown, before the loop returns.
#[derive(Default)]
pub struct Callbacks {
    on_ready: Option<Callback>,
    on_exit: Option<Callback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ready(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(f));
        self
    }

    pub fn on_exit(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_exit = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_ready", &self.on_ready.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

/// One-shot latch the platform fires once its own initialization completes.
///
/// Dropping it unfired tells the ready worker that the tray went away before
/// becoming ready; `on_ready` is then skipped.
pub struct ReadySignal {
    tx: Option<Sender<()>>,
}

impl ReadySignal {
    fn immediate() -> Self {
        Self { tx: None }
    }

    pub fn fire(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.try_send(());
        }
    }
}

impl fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadySignal")
            .field("deferred", &self.tx.is_some())
            .finish()
    }
}

/// Teardown step the platform must run on its loop thread before the loop
/// returns.
pub struct ExitHook(Callback);

impl ExitHook {
    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for ExitHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExitHook")
    }
}

pub(crate) struct Lifecycle {
    state: Arc<Mutex<LifecycleState>>,
    quit_once: OnceCell<()>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LifecycleState::Uninitialized)),
            quit_once: OnceCell::new(),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// `Uninitialized -> Registered`. Wires the ready worker and the exit hook.
    pub(crate) fn register(&self, callbacks: Callbacks) -> Result<(ReadySignal, ExitHook)> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Uninitialized {
                return Err(SystrayError::AlreadyRegistered);
            }
            *state = LifecycleState::Registered;
        }

        let ready = match callbacks.on_ready {
            None => ReadySignal::immediate(),
            Some(on_ready) => match spawn_ready_worker(on_ready) {
                Ok(ready) => ready,
                Err(e) => {
                    *self.state.lock() = LifecycleState::Uninitialized;
                    return Err(e);
                }
            },
        };

        let on_exit = callbacks.on_exit.unwrap_or_else(|| Box::new(|| {}));
        let state = Arc::clone(&self.state);
        let exit = ExitHook(Box::new(move || {
            on_exit();
            *state.lock() = LifecycleState::Terminated;
            debug!("tray terminated");
        }));

        debug!("tray registered");
        Ok((ready, exit))
    }

    /// `Registered -> Running`, unless a quit already raced ahead.
    pub(crate) fn enter_loop(&self) {
        let mut state = self.state.lock();
        if *state == LifecycleState::Registered {
            *state = LifecycleState::Running;
        }
    }

    pub(crate) fn loop_returned(&self) {
        *self.state.lock() = LifecycleState::Terminated;
    }

    /// Runs `teardown` for the first quit after registration only.
    pub(crate) fn quit(&self, teardown: impl FnOnce()) {
        if self.state() == LifecycleState::Uninitialized {
            warn!("quit requested before the tray was registered, ignoring");
            return;
        }
        if self.quit_once.set(()).is_err() {
            return;
        }

        {
            let mut state = self.state.lock();
            if matches!(*state, LifecycleState::Registered | LifecycleState::Running) {
                *state = LifecycleState::Quitting;
            }
        }
        debug!("tray quitting");
        teardown();
    }
}

fn spawn_ready_worker(on_ready: Callback) -> Result<ReadySignal> {
    let (tx, rx) = crossbeam_channel::bounded::<()>(1);

    thread::Builder::new()
        .name(READY_WORKER_NAME.to_string())
        .spawn(move || match rx.recv() {
            Ok(()) => on_ready(),
            Err(_) => debug!("tray torn down before it became ready"),
        })
        .map_err(|source| SystrayError::Spawn {
            name: READY_WORKER_NAME,
            source,
        })?;

    Ok(ReadySignal { tx: Some(tx) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[test]
    fn register_twice_is_rejected() {
        let lifecycle = Lifecycle::new();
        lifecycle.register(Callbacks::new()).unwrap();
        assert!(matches!(
            lifecycle.register(Callbacks::new()),
            Err(SystrayError::AlreadyRegistered)
        ));
        assert_eq!(lifecycle.state(), LifecycleState::Registered);
    }

    #[test]
    fn ready_callback_waits_for_signal() {
        let lifecycle = Lifecycle::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let (ready, _exit) = lifecycle
            .register(Callbacks::new().on_ready(move || tx.send(()).unwrap()))
            .unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        ready.fire();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn dropped_ready_signal_skips_callback() {
        let lifecycle = Lifecycle::new();
        let (tx, rx) = crossbeam_channel::unbounded::<()>();
        let (ready, _exit) = lifecycle
            .register(Callbacks::new().on_ready(move || tx.send(()).unwrap()))
            .unwrap();

        drop(ready);
        // the worker owned the only sender, so the channel disconnects without a message
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_err());
    }

    #[test]
    fn exit_hook_runs_callback_and_terminates() {
        let lifecycle = Lifecycle::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let (_ready, exit) = lifecycle
            .register(Callbacks::new().on_exit(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        exit.run();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), LifecycleState::Terminated);
    }

    #[test]
    fn quit_before_register_is_ignored() {
        let lifecycle = Lifecycle::new();
        let mut ran = false;
        lifecycle.quit(|| ran = true);
        assert!(!ran);
        assert_eq!(lifecycle.state(), LifecycleState::Uninitialized);
    }

    #[test]
    fn quit_tears_down_once() {
        let lifecycle = Lifecycle::new();
        lifecycle.register(Callbacks::new()).unwrap();
        lifecycle.enter_loop();

        let mut teardowns = 0;
        lifecycle.quit(|| teardowns += 1);
        lifecycle.quit(|| teardowns += 1);
        assert_eq!(teardowns, 1);
        assert_eq!(lifecycle.state(), LifecycleState::Quitting);
    }
}
