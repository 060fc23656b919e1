//! Tray icon showing live CPU usage.
//!
//! `cargo run --example cpu_tray --features native`
//!
//! The menu comes from `config/tray.toml` next to the executable when present
//! (see `demos/config/tray.toml`), otherwise from the built-in layout below.

use crossbeam_channel::select;
use sysinfo::System;
use systray::{Callbacks, MenuItem, NativePlatform, Systray, SystrayError, TrayConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LAYOUT: &str = include_str!("config/tray.toml");

async fn send_cpu_usage(usage: MenuItem, pause: MenuItem) {
    let mut sys = System::new();

    loop {
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        if pause.checked() {
            continue;
        }
        sys.refresh_cpu_usage();
        usage.set_title(format!("CPU: {:.1}%", sys.global_cpu_usage()));
    }
}

fn handle_clicks(tray: Systray, pause: MenuItem, quit: MenuItem) {
    let pause_clicked = pause.clicked();
    let quit_clicked = quit.clicked();

    loop {
        select! {
            recv(pause_clicked) -> _ => {
                if pause.checked() {
                    pause.uncheck();
                } else {
                    pause.check();
                }
            }
            recv(quit_clicked) -> _ => {
                tray.quit();
                return;
            }
        }
    }
}

#[tokio::main(worker_threads = 2)]
async fn main() -> Result<(), SystrayError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match TrayConfig::load_default()? {
        Some(config) => config,
        None => TrayConfig::from_toml_str(DEFAULT_LAYOUT)?,
    };

    let tray = Systray::new(NativePlatform::new());
    let layout = tray.apply_config(&config)?;
    let usage = layout.require("usage")?;
    let pause = layout.require("pause")?;
    let quit = layout.require("quit")?;

    let runtime = tokio::runtime::Handle::current();
    let ready_tray = tray.clone();

    // blocks the main thread, the native loop must own it on macOS
    tray.run(
        Callbacks::new()
            .on_ready(move || {
                info!("tray ready");
                runtime.spawn(send_cpu_usage(usage, pause.clone()));
                runtime.spawn_blocking(move || handle_clicks(ready_tray, pause, quit));
            })
            .on_exit(|| info!("tray exited")),
    )
}
