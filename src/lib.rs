//! # lumid
//!
//! A Linux daemon for display power policy: AC-state tracking, idle
//! dimming, and adaptive color temperature.
//!
//! ## Features
//!
//! - **Async Architecture**: Built on Tokio
//! - **Event-Driven**: Loosely-coupled policy modules communicate via a
//!   publish/subscribe ModuleBus with lifecycle supervision
//! - **Power Awareness**: Debounced AC-adapter tracking through UPower
//! - **Idle Dimming**: Hysteresis-guarded backlight dimming with per-state
//!   idle timeouts
//! - **Adaptive Gamma**: Day/night and ambient-light driven color
//!   temperature, including slow whole-window transitions
//! - **D-Bus Interface**: External control over temperatures, timeouts and
//!   inhibition
//!
//! ## Architecture
//!
//! The daemon is a cooperative single-dispatch system:
//! - [`SystemCoordinator`](coordinator::SystemCoordinator) - owns state,
//!   config and the main loop
//! - [`ModuleBus`](bus::ModuleBus) - message routing and module lifecycle
//! - [`AppState`](app_context::AppState) - shared state, one writer per
//!   field
//! - Policy modules under [`modules`], external services under [`services`]
//!
//! ## Example
//!
//! ```no_run
//! use lumid::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod bus;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod interface;
pub mod message;
pub mod modules;
pub mod services;
pub mod task_manager;
