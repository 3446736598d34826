//! Backlight and gamma setters backed by the Clightd display helper.

use anyhow::Result;
use async_trait::async_trait;
use zbus::Connection;

use crate::services::{BacklightControl, GammaControl};

#[zbus::proxy(
    interface = "org.clightd.clightd.Backlight",
    default_service = "org.clightd.clightd",
    default_path = "/org/clightd/clightd/Backlight",
    gen_blocking = false
)]
trait Backlight {
    /// Sets all backlights to `target`, optionally ramping with
    /// `(smooth, step, timeout_ms)`.
    fn set(&self, target: f64, smooth: (bool, f64, u32)) -> zbus::Result<()>;
}

#[zbus::proxy(
    interface = "org.clightd.clightd.Gamma",
    default_service = "org.clightd.clightd",
    default_path = "/org/clightd/clightd/Gamma",
    gen_blocking = false
)]
trait Gamma {
    /// Sets the display color temperature, optionally ramping with
    /// `(smooth, step, timeout_ms)`. Replies whether anything was applied.
    fn set(
        &self,
        display: &str,
        xauthority: &str,
        temp: i32,
        smooth: (bool, u32, u32),
    ) -> zbus::Result<bool>;
}

/// Production backlight/gamma setter pair sharing one connection.
pub struct DisplayService {
    backlight: BacklightProxy<'static>,
    gamma: GammaProxy<'static>,
}

impl DisplayService {
    pub async fn connect(conn: &Connection) -> Result<Self> {
        Ok(Self {
            backlight: BacklightProxy::new(conn).await?,
            gamma: GammaProxy::new(conn).await?,
        })
    }
}

#[async_trait]
impl BacklightControl for DisplayService {
    async fn set_backlight(
        &self,
        pct: f64,
        smooth: bool,
        step: f64,
        timeout_ms: u32,
    ) -> Result<()> {
        self.backlight
            .set(pct, (smooth, step, timeout_ms))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl GammaControl for DisplayService {
    async fn set_gamma(
        &self,
        display: &str,
        xauthority: &str,
        temp: i32,
        smooth: bool,
        step: i32,
        timeout_ms: u32,
    ) -> Result<bool> {
        let step = u32::try_from(step.max(0)).unwrap_or(0);
        Ok(self
            .gamma
            .set(display, xauthority, temp, (smooth, step, timeout_ms))
            .await?)
    }
}
