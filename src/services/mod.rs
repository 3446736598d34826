//! Collaborator interfaces for the external services the daemon drives.
//!
//! Modules only ever see these traits; the zbus-backed production
//! implementations live in the submodules, together with the signal
//! forwarders that translate D-Bus signals into bus messages.

pub mod display;
pub mod idle;
pub mod power;

use anyhow::Result;
use async_trait::async_trait;

pub use display::DisplayService;
pub use idle::ClightdIdleMonitor;
pub use power::UPowerSupply;

/// Read access to the system power supply.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PowerSupply: Send + Sync {
    /// Whether the system currently draws from the battery.
    async fn on_battery(&self) -> Result<bool>;
}

/// Idle-detection backend control.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdleMonitor: Send + Sync {
    async fn set_timeout(&self, secs: u32) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Physical backlight setter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BacklightControl: Send + Sync {
    async fn set_backlight(&self, pct: f64, smooth: bool, step: f64, timeout_ms: u32)
    -> Result<()>;
}

/// Physical gamma setter.
///
/// Returns whether the display service accepted the temperature; a `false`
/// reply means the call went through but nothing was applied.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GammaControl: Send + Sync {
    async fn set_gamma(
        &self,
        display: &str,
        xauthority: &str,
        temp: i32,
        smooth: bool,
        step: i32,
        timeout_ms: u32,
    ) -> Result<bool>;
}
