//! System coordinator owning the bus, the shared state and the main loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio::time::interval;
use zbus::Connection;

use crate::{
    app_context::AppState,
    bus::ModuleBus,
    config::Config,
    interface::{self, DBusInterface},
    message::{Message, Payload},
    modules::{DaytimeModule, DimmerModule, GammaModule, UpowerModule},
    services::{self, ClightdIdleMonitor, DisplayService, UPowerSupply},
    task_manager::TaskManager,
};

/// Builds the module set, wires the external services and runs the
/// cooperative dispatch loop.
///
/// The coordinator owns `AppState` and `Config` outright and lends them to
/// the bus for each dispatch; no locking is involved anywhere in the policy
/// core.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    bus: ModuleBus,
    state: AppState,
    config: Config,
    inbox_tx: mpsc::Sender<Message>,
    inbox_rx: Option<mpsc::Receiver<Message>>,
    /// Held so the control interface stays exported.
    #[allow(dead_code)]
    session: Option<Connection>,
}

impl SystemCoordinator {
    pub fn new(config: Config) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(64);
        Self {
            task_manager: TaskManager::new(),
            bus: ModuleBus::new(),
            state: AppState::from_env(),
            config,
            inbox_tx,
            inbox_rx: Some(inbox_rx),
            session: None,
        }
    }

    /// Connects the system bus, registers all modules and starts the signal
    /// forwarders. The control interface on the session bus is optional;
    /// everything else is required.
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing system coordinator...");

        let system = Connection::system()
            .await
            .context("Failed to connect to the system bus")?;

        let power = Arc::new(
            UPowerSupply::connect(&system)
                .await
                .context("Failed to set up the power supply proxy")?,
        );
        let display = Arc::new(
            DisplayService::connect(&system)
                .await
                .context("Failed to set up the display helper proxies")?,
        );
        let idle = Arc::new(ClightdIdleMonitor::new(system.clone()));

        self.bus
            .register(Box::new(UpowerModule::new(power)), &self.state, &self.config)?;
        self.bus
            .register(Box::new(DaytimeModule::new()), &self.state, &self.config)?;
        self.bus.register(
            Box::new(DimmerModule::new(idle.clone(), display.clone())),
            &self.state,
            &self.config,
        )?;
        self.bus.register(
            Box::new(GammaModule::new(display)),
            &self.state,
            &self.config,
        )?;

        let inbox = self.inbox_tx.clone();
        let conn = system.clone();
        self.task_manager
            .spawn_task("power-watcher".to_string(), move |token| {
                services::power::watch_power_changes(conn, inbox, token)
            })
            .await?;

        let inbox = self.inbox_tx.clone();
        self.task_manager
            .spawn_task("idle-watcher".to_string(), move |token| async move {
                idle.watch(inbox, token).await
            })
            .await?;

        self.serve_interface().await;

        info!("System coordinator initialized");
        Ok(())
    }

    async fn serve_interface(&mut self) {
        let session = match Connection::session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Session bus unavailable, control interface disabled: {e}");
                return;
            }
        };
        let iface = DBusInterface::new(
            self.inbox_tx.clone(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        let served: zbus::Result<()> = async {
            session
                .object_server()
                .at(interface::OBJECT_PATH, iface)
                .await?;
            session.request_name(interface::BUS_NAME).await?;
            Ok(())
        }
        .await;
        match served {
            Ok(()) => self.session = Some(session),
            Err(e) => warn!("Failed to serve the control interface: {e}"),
        }
    }

    /// Runs the cooperative dispatch loop until Ctrl-C.
    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut inbox = self
            .inbox_rx
            .take()
            .context("Main loop is already running")?;

        self.bus.start(&mut self.state, &mut self.config).await;
        info!("Starting main dispatch loop");

        let mut poll = interval(Duration::from_secs(u64::from(self.config.daytime.poll_secs)));

        let outcome = loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => {
                            info!("Received Ctrl+C, initiating graceful shutdown...");
                            break Ok(());
                        }
                        Err(e) => break Err(anyhow::anyhow!("Failed to listen for shutdown signal: {e}")),
                    }
                }

                _instant = poll.tick() => {
                    self.bus
                        .dispatch(Message::system(Payload::DaytimeTick), &mut self.state, &mut self.config)
                        .await;
                }

                msg = inbox.recv() => match msg {
                    Some(msg) => {
                        let msg = self.absorb(msg);
                        self.bus.dispatch(msg, &mut self.state, &mut self.config).await;
                    }
                    None => break Err(anyhow::anyhow!("Daemon inbox closed unexpectedly")),
                },
            }
        };

        self.inbox_rx = Some(inbox);
        self.shutdown().await;
        info!("Main dispatch loop terminated");
        outcome
    }

    /// Mirrors state fields owned by subsystems outside this core before
    /// their update messages hit the bus.
    fn absorb(&mut self, msg: Message) -> Message {
        match msg.payload {
            Payload::InhibitUpdate { inhibited } => {
                self.state.pm_inhibited = inhibited;
                msg
            }
            Payload::BacklightUpdate { new, .. } => {
                let new = new.clamp(0.0, 1.0);
                let old = self.state.current_bl_pct;
                self.state.current_bl_pct = new;
                Message {
                    sender: msg.sender,
                    payload: Payload::BacklightUpdate { old, new },
                }
            }
            _ => msg,
        }
    }

    async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");
        if let Err(e) = self.task_manager.shutdown_all().await {
            error!("Error during task shutdown: {e:#}");
        }
        self.bus.shutdown().await;
        info!("Shutdown complete");
    }

    /// The inbox feeding the dispatch loop, for tests and embedders.
    #[allow(dead_code)]
    pub fn inbox(&self) -> mpsc::Sender<Message> {
        self.inbox_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_context::DisplayFlags;
    use pretty_assertions::assert_eq;

    #[test]
    fn absorb_mirrors_inhibition() {
        let mut coordinator = SystemCoordinator::new(Config::default());
        assert!(!coordinator.state.pm_inhibited);

        let msg = coordinator.absorb(Message::system(Payload::InhibitUpdate { inhibited: true }));
        assert!(coordinator.state.pm_inhibited);
        assert!(matches!(
            msg.payload,
            Payload::InhibitUpdate { inhibited: true }
        ));
    }

    #[test]
    fn absorb_rewrites_backlight_old_value() {
        let mut coordinator = SystemCoordinator::new(Config::default());
        coordinator.state.current_bl_pct = 0.8;

        let msg = coordinator.absorb(Message::system(Payload::BacklightUpdate {
            old: 0.0,
            new: 0.3,
        }));
        match msg.payload {
            Payload::BacklightUpdate { old, new } => {
                assert_eq!(old, 0.8);
                assert_eq!(new, 0.3);
            }
            other => panic!("Expected BacklightUpdate, got {other:?}"),
        }
        assert_eq!(coordinator.state.current_bl_pct, 0.3);
    }

    #[test]
    fn absorb_clamps_backlight_range() {
        let mut coordinator = SystemCoordinator::new(Config::default());
        let msg = coordinator.absorb(Message::system(Payload::BacklightUpdate {
            old: 0.0,
            new: 1.7,
        }));
        assert!(matches!(
            msg.payload,
            Payload::BacklightUpdate { new, .. } if new == 1.0
        ));
    }

    #[test]
    fn absorb_passes_other_messages_through() {
        let mut coordinator = SystemCoordinator::new(Config::default());
        let before = coordinator.state.clone();
        let msg = coordinator.absorb(Message::system(Payload::DisplayUpdate {
            old: DisplayFlags::default(),
            new: DisplayFlags::DIMMED,
        }));
        assert!(matches!(msg.payload, Payload::DisplayUpdate { .. }));
        assert_eq!(coordinator.state.current_bl_pct, before.current_bl_pct);
        assert_eq!(coordinator.state.pm_inhibited, before.pm_inhibited);
    }
}
