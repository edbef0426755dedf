use std::{sync::Arc, thread};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};

use window_bridge::{
    config::Config,
    events::{init_logging, EventEmitter},
    inject::TextInjector,
    intake::{Intake, IntakeAction},
    locator::{LocatorSettings, WindowLocator},
    notify::{Notifier, StdoutNotifier},
    os::{system_window_system, ArboardClipboard, EnigoKeyboard, SysinfoProcessTable, SystemClock},
    registry::WorkspaceRegistry,
    router::MessageRouter,
    spawner::ProcessSupervisor,
    store::BindingStore,
    types::InboundMessage,
};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let config = Config::parse();
    init_logging(&config.log_level)?;

    let workspaces = config.load_workspaces();
    if workspaces.is_empty() {
        tracing::warn!(target = "window_bridge::main", "no workspaces configured; set WORK_DIRS or WORK_DIR");
    }
    for (i, ws) in workspaces.iter().enumerate() {
        tracing::info!(target = "window_bridge::main", index = i + 1, name = %ws.name, path = %ws.path.display(), "workspace");
    }

    let store = BindingStore::new(&config.persist_file);
    let bindings = store.load();
    tracing::info!(target = "window_bridge::main", path = %store.path().display(), bindings = bindings.len(), "bindings loaded");

    let events = EventEmitter::new(config.json_events);
    let windows = system_window_system();
    let locator = WindowLocator::new(
        Arc::new(SysinfoProcessTable::new()),
        windows.clone(),
        LocatorSettings::for_process(&config.process_name),
    );
    let mut supervisor = ProcessSupervisor::new(&config.assistant_path, &config.skip_flag);
    if let Some(prefix) = config.terminal_prefix() {
        supervisor = supervisor.with_terminal_prefix(prefix);
    }

    let registry = Arc::new(
        WorkspaceRegistry::new(workspaces, locator, Arc::new(supervisor))
            .with_store(store)
            .with_events(events.clone()),
    );
    registry.load_bindings(bindings);

    if !registry.is_empty() {
        let current = registry.current_index();
        match registry.ensure_started(current) {
            Ok(handle) => {
                tracing::info!(target = "window_bridge::main", index = current, pid = ?handle.process_id, "assistant launched");
                let waited = registry.wait_for_window(
                    current,
                    config.startup_wait_attempts,
                    config.startup_wait_interval(),
                );
                if waited.is_none() {
                    tracing::warn!(target = "window_bridge::main", index = current, "assistant window not found at startup, continuing");
                }
            }
            Err(error) => {
                tracing::error!(target = "window_bridge::main", index = current, error = %error, "failed to launch assistant");
            }
        }
    }

    let notifier: Arc<dyn Notifier> = Arc::new(StdoutNotifier);
    let (tx, rx) = mpsc::unbounded_channel::<InboundMessage>();

    let router_registry = registry.clone();
    let router_notifier = notifier.clone();
    let router_settings = config.router_settings();
    let router = thread::Builder::new()
        .name("message-router".to_string())
        .spawn(move || {
            let injector = TextInjector::new(
                windows,
                Box::new(ArboardClipboard),
                Box::new(EnigoKeyboard::new()),
                Arc::new(SystemClock),
                events,
            );
            MessageRouter::new(router_registry, router_notifier, injector, router_settings).run(rx)
        })
        .context("failed to spawn router thread")?;

    let intake = Intake::new(registry.clone(), notifier, tx)
        .with_admin(config.admin_sender_id.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(target = "window_bridge::main", "interrupted, shutting down");
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if intake.handle_line(&line) == IntakeAction::Dropped {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!(target = "window_bridge::main", "stdin closed, shutting down");
                        break;
                    }
                    Err(error) => {
                        tracing::error!(target = "window_bridge::main", error = %error, "stdin read failed");
                        break;
                    }
                }
            }
        }
    }

    // Dropping the intake closes the queue; the router drains what is left.
    drop(intake);
    let processed = tokio::task::spawn_blocking(move || router.join())
        .await
        .context("router join task failed")?
        .map_err(|_| anyhow::anyhow!("router thread panicked"))?;
    tracing::info!(target = "window_bridge::main", processed, "router finished");

    registry.persist().context("failed to save bindings on shutdown")?;
    tracing::info!(target = "window_bridge::main", "bindings saved");
    Ok(())
}
