//! Power state tracker.
//!
//! Owns `AppState::ac_state`. Change notifications from the power supply are
//! coarse, so every notification triggers a fresh property read which is
//! compared against the last known value; only a real flip publishes an
//! update.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};

use crate::{
    app_context::AcState,
    bus::{BusContext, InitOutcome, Module, Verdict},
    message::{Message, MessageKind, Payload},
    services::PowerSupply,
};

pub const NAME: &str = "upower";

const SUBSCRIPTIONS: &[MessageKind] = &[MessageKind::PowerChanged, MessageKind::AcRequest];

pub struct UpowerModule {
    power: Arc<dyn PowerSupply>,
}

impl UpowerModule {
    pub fn new(power: Arc<dyn PowerSupply>) -> Self {
        Self { power }
    }
}

#[async_trait]
impl Module for UpowerModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn subscriptions(&self) -> &'static [MessageKind] {
        SUBSCRIPTIONS
    }

    async fn init(&mut self, ctx: &mut BusContext<'_>) -> Result<InitOutcome> {
        match self.power.on_battery().await {
            Ok(on_battery) => {
                ctx.state.ac_state = AcState::from_on_battery(on_battery);
                info!("Initial AC state: {}", ctx.state.ac_state);
                Ok(InitOutcome::Ready)
            }
            Err(_) => {
                // ON_AC is assumed until the power service can be read.
                if ctx.state.ac_state == AcState::Unknown {
                    ctx.state.ac_state = AcState::OnAc;
                    info!("Failed to retrieve AC state; fallback to connected");
                }
                Ok(InitOutcome::Deferred)
            }
        }
    }

    async fn handle(&mut self, msg: &Message, ctx: &mut BusContext<'_>) -> Result<Verdict> {
        match msg.payload {
            Payload::PowerChanged => {
                let old = ctx.state.ac_state;
                match self.power.on_battery().await {
                    Ok(on_battery) => {
                        let new = AcState::from_on_battery(on_battery);
                        if new != old {
                            ctx.publish(Payload::AcRequest { old, new });
                        }
                    }
                    Err(e) => warn!("Failed to re-read power supply state: {e:#}"),
                }
            }
            Payload::AcRequest { old, new } => {
                ctx.state.ac_state = new;
                info!(
                    "AC cable {}",
                    if new == AcState::OnAc {
                        "connected"
                    } else {
                        "disconnected"
                    }
                );
                ctx.publish(Payload::AcUpdate { old, new });
            }
            _ => {}
        }
        Ok(Verdict::Continue)
    }
}
