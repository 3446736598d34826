//! Adaptive gamma controller.
//!
//! Owns `AppState::current_temp`. Tracks the configured day/night
//! temperatures, ambient brightness, and external requests, and hands the
//! resulting target to the display helper. A phase change may engage a long
//! transition: instead of a short ramp, the change is spread over the whole
//! remaining sunrise/sunset window with one step every ten seconds.
//!
//! Until the daytime module has produced its first bookkeeping the
//! controller sits in an awaiting-phase state and ignores everything except
//! the readiness signal; gamma policy has no meaningful default without a
//! phase, so a dead phase provider takes this module down with it.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Local, Utc};
use log::{info, warn};

use crate::{
    app_context::AppState,
    bus::{BusContext, InitOutcome, Module, ModuleState, Verdict},
    config::Config,
    message::{Message, MessageKind, Payload, TempRequest, TempUpdate},
    modules::daytime,
    services::GammaControl,
};

pub const NAME: &str = "gamma";

/// Seconds between steps while long-transitioning.
const LONG_TRANSITION_TICK_SECS: i64 = 10;

const SUBSCRIPTIONS: &[MessageKind] = &[
    MessageKind::BacklightUpdate,
    MessageKind::TempRequest,
    MessageKind::DaytimeUpdate,
    MessageKind::NextEventUpdate,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingDaytime,
    Active,
}

pub struct GammaModule {
    gamma: Arc<dyn GammaControl>,
    phase: Phase,
    long_transitioning: bool,
    last_event_check: Option<DateTime<Local>>,
}

impl GammaModule {
    pub fn new(gamma: Arc<dyn GammaControl>) -> Self {
        Self {
            gamma,
            phase: Phase::AwaitingDaytime,
            long_transitioning: false,
            last_event_check: None,
        }
    }

    /// Applies a temperature through the display helper.
    ///
    /// With a timestamp supplied, long-transition mode enabled and the
    /// clock inside an event window, step and timeout are recomputed so a
    /// fixed ten-second tick ramps over the remaining window; otherwise a
    /// normal transition runs and the long flag clears.
    async fn apply(
        &mut self,
        mut temp: i32,
        now: Option<i64>,
        mut smooth: bool,
        mut step: i32,
        mut timeout_ms: u32,
        ctx: &mut BusContext<'_>,
    ) {
        if let (true, Some(now), true) =
            (ctx.config.gamma.long_transition, now, ctx.state.in_event)
        {
            smooth = true;
            let event_ts = ctx.state.day_events.get(ctx.state.next_event);
            let duration = i64::from(ctx.config.daytime.event_duration_secs);
            let remaining = if ctx.state.event_time_range == 0 {
                // First half: the rest of this half plus the second half,
                // aiming at the phase being transitioned toward.
                temp = ctx.config.gamma.temp_for(ctx.state.day_time.opposite());
                (event_ts - now) + duration
            } else {
                // Second half only.
                duration - (now - event_ts)
            }
            .max(1);
            let span = (ctx.config.gamma.day_temp - ctx.config.gamma.night_temp).abs();
            step = (f64::from(span) / (remaining as f64 / LONG_TRANSITION_TICK_SECS as f64))
                as i32;
            timeout_ms = (LONG_TRANSITION_TICK_SECS * 1000) as u32;
            self.long_transitioning = true;
        } else {
            self.long_transitioning = false;
        }

        let display = ctx.state.display.clone().unwrap_or_default();
        let xauthority = ctx.state.xauthority.clone().unwrap_or_default();
        match self
            .gamma
            .set_gamma(&display, &xauthority, temp, smooth, step, timeout_ms)
            .await
        {
            Ok(true) => {
                let old = ctx.state.current_temp;
                ctx.state.current_temp = temp;
                ctx.publish(Payload::TempUpdate(TempUpdate {
                    old,
                    new: temp,
                    smooth,
                    step,
                    timeout_ms,
                    daytime: ctx.state.day_time,
                }));
                if !self.long_transitioning && !smooth {
                    info!("Gamma temperature set to {temp}K");
                } else {
                    info!(
                        "{} transition to {temp}K started",
                        if self.long_transitioning {
                            "Long"
                        } else {
                            "Normal"
                        }
                    );
                }
            }
            Ok(false) => warn!("Display helper refused gamma temperature {temp}K"),
            Err(e) => warn!("Failed to set gamma temperature: {e:#}"),
        }
    }

    /// Backlight moved: in ambient mode the temperature follows it,
    /// interpolating between the night and day targets.
    async fn on_backlight(&mut self, ctx: &mut BusContext<'_>) {
        if !ctx.config.gamma.ambient {
            return;
        }
        // The targets are not constants (the bus API can move them), so the
        // interpolation is recomputed from config every time.
        let g = &ctx.config.gamma;
        let diff = (g.day_temp - g.night_temp).abs();
        let min_temp = g.day_temp.min(g.night_temp);
        let target = (f64::from(diff) * ctx.state.current_bl_pct) as i32 + min_temp;
        let (smooth, step, timeout_ms) = (g.smooth, g.step, g.timeout_ms);
        self.apply(target, None, smooth, step, timeout_ms, ctx).await;
    }

    /// Phase flip announced by the daytime module.
    async fn on_daytime_request(&mut self, now: i64, ctx: &mut BusContext<'_>) {
        if self.long_transitioning || ctx.config.gamma.ambient {
            return;
        }
        let g = &ctx.config.gamma;
        let (temp, smooth, step, timeout_ms) =
            (g.temp_for(ctx.state.day_time), g.smooth, g.step, g.timeout_ms);
        self.apply(temp, Some(now), smooth, step, timeout_ms, ctx).await;
    }

    /// Temperature override arriving from outside the daytime module.
    async fn on_external_request(&mut self, req: TempRequest, ctx: &mut BusContext<'_>) {
        if req.new == ctx.config.gamma.temp_for(req.daytime) {
            return;
        }
        ctx.config.gamma.set_temp_for(req.daytime, req.new);
        if !ctx.config.gamma.ambient && req.daytime == ctx.state.day_time {
            self.apply(req.new, None, req.smooth, req.step, req.timeout_ms, ctx)
                .await;
        }
    }

    /// Periodic next-event notice: a long transition must not survive into
    /// another day (or a resume that skipped one).
    fn on_next_event(&mut self, now: DateTime<Local>) {
        if self.long_transitioning {
            if let Some(last) = self.last_event_check {
                if now.ordinal() != last.ordinal() || now.year() != last.year() {
                    info!("Long transition ended");
                    self.long_transitioning = false;
                }
            }
        }
        self.last_event_check = Some(now);
    }
}

#[async_trait]
impl Module for GammaModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn subscriptions(&self) -> &'static [MessageKind] {
        SUBSCRIPTIONS
    }

    fn enabled(&self, state: &AppState, _config: &Config) -> bool {
        state.has_display_session()
    }

    fn evaluate(&self, _state: &AppState, config: &Config) -> bool {
        !config.gamma.disabled
    }

    async fn init(&mut self, _ctx: &mut BusContext<'_>) -> Result<InitOutcome> {
        Ok(InitOutcome::Ready)
    }

    async fn handle(&mut self, msg: &Message, ctx: &mut BusContext<'_>) -> Result<Verdict> {
        match self.phase {
            Phase::AwaitingDaytime => {
                if msg.kind() == MessageKind::DaytimeUpdate {
                    if ctx.module_state(daytime::NAME) == Some(ModuleState::Stopped) {
                        warn!("No day/night phase provider available, shutting gamma down");
                        return Ok(Verdict::Poison);
                    }
                    self.phase = Phase::Active;
                }
            }
            Phase::Active => match msg.payload {
                Payload::BacklightUpdate { .. } => self.on_backlight(ctx).await,
                Payload::TempRequest(req) if req.is_valid() => {
                    if msg.sender == Some(daytime::NAME) {
                        self.on_daytime_request(Utc::now().timestamp(), ctx).await;
                    } else {
                        self.on_external_request(req, ctx).await;
                    }
                }
                Payload::NextEventUpdate { .. } => self.on_next_event(Local::now()),
                _ => {}
            },
        }
        Ok(Verdict::Continue)
    }
}
