//! Idle/dim controller.
//!
//! Owns `AppState::display_state`. Translates idle/active transitions into
//! backlight dimming and restoring, and keeps the idle-detection timeout in
//! step with the active power state.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error};

use crate::{
    app_context::{AcState, AppState, DisplayFlags},
    bus::{BusContext, InitOutcome, Module, Verdict},
    config::Config,
    message::{Message, MessageKind, Payload},
    services::{BacklightControl, IdleMonitor},
};

pub const NAME: &str = "dimmer";

const SUBSCRIPTIONS: &[MessageKind] = &[
    MessageKind::IdleChanged,
    MessageKind::AcUpdate,
    MessageKind::InhibitUpdate,
    MessageKind::TimeoutRequest,
];

pub struct DimmerModule {
    idle: Arc<dyn IdleMonitor>,
    backlight: Arc<dyn BacklightControl>,
    /// Backlight level recorded right before the last dim; restore target.
    pre_dim_pct: Option<f64>,
}

impl DimmerModule {
    pub fn new(idle: Arc<dyn IdleMonitor>, backlight: Arc<dyn BacklightControl>) -> Self {
        Self {
            idle,
            backlight,
            pre_dim_pct: None,
        }
    }

    async fn on_idle(&mut self, idle: bool, ctx: &mut BusContext<'_>) {
        let old = ctx.state.display_state;
        if idle {
            ctx.state.display_state.insert(DisplayFlags::DIMMED);
            debug!("Entering dimmed state");
            self.pre_dim_pct = Some(ctx.state.current_bl_pct);
            self.dim(ctx).await;
        } else if let Some(pct) = self.pre_dim_pct {
            ctx.state.display_state.remove(DisplayFlags::DIMMED);
            debug!("Leaving dimmed state");
            self.restore(pct, ctx).await;
        }
        let new = ctx.state.display_state;
        // Published even when the backlight request itself was suppressed,
        // so dependents always observe the transition.
        ctx.publish(Payload::DisplayUpdate { old, new });
    }

    async fn dim(&self, ctx: &mut BusContext<'_>) {
        let pct = ctx.config.dimmer.dim_pct;
        if pct >= ctx.state.current_bl_pct {
            debug!("Backlight already at or below the dim target, leaving it");
            return;
        }
        let t = ctx.config.dimmer.enter;
        if let Err(e) = self
            .backlight
            .set_backlight(pct, t.smooth, t.step, t.timeout_ms)
            .await
        {
            error!("Failed to dim backlight: {e:#}");
        }
    }

    async fn restore(&self, pct: f64, ctx: &mut BusContext<'_>) {
        let t = ctx.config.dimmer.exit;
        if let Err(e) = self
            .backlight
            .set_backlight(pct, t.smooth, t.step, t.timeout_ms)
            .await
        {
            error!("Failed to restore backlight: {e:#}");
        }
    }

    async fn apply_timeout(&self, ctx: &mut BusContext<'_>) {
        let secs = ctx.config.dimmer.timeout_for(ctx.state.ac_state);
        if let Err(e) = self.idle.set_timeout(secs).await {
            error!("Failed to update idle timeout: {e:#}");
        }
    }

    async fn on_inhibit(&self, ctx: &mut BusContext<'_>) {
        let result = if ctx.state.pm_inhibited {
            debug!("Idle detection paused");
            self.idle.stop().await
        } else {
            debug!("Idle detection resumed");
            self.idle.start().await
        };
        if let Err(e) = result {
            error!("Failed to toggle idle detection: {e:#}");
        }
    }
}

#[async_trait]
impl Module for DimmerModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn subscriptions(&self) -> &'static [MessageKind] {
        SUBSCRIPTIONS
    }

    fn evaluate(&self, state: &AppState, config: &Config) -> bool {
        !config.dimmer.disabled && state.ac_state != AcState::Unknown
    }

    async fn init(&mut self, ctx: &mut BusContext<'_>) -> Result<InitOutcome> {
        let secs = ctx.config.dimmer.timeout_for(ctx.state.ac_state);
        self.idle.set_timeout(secs).await?;
        self.idle.start().await?;
        Ok(InitOutcome::Ready)
    }

    async fn handle(&mut self, msg: &Message, ctx: &mut BusContext<'_>) -> Result<Verdict> {
        match msg.payload {
            Payload::IdleChanged { idle } => self.on_idle(idle, ctx).await,
            Payload::AcUpdate { .. } => self.apply_timeout(ctx).await,
            Payload::TimeoutRequest { state, new_secs } => {
                ctx.config.dimmer.set_timeout_for(state, new_secs);
                if state == ctx.state.ac_state {
                    self.apply_timeout(ctx).await;
                }
            }
            Payload::InhibitUpdate { .. } => self.on_inhibit(ctx).await,
            _ => {}
        }
        Ok(Verdict::Continue)
    }

    async fn destroy(&mut self) {
        let _ = self.idle.stop().await;
    }
}
