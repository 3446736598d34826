//! Bus modules implementing the daemon's control policies.

pub mod daytime;
pub mod dimmer;
pub mod gamma;
pub mod upower;

pub use daytime::DaytimeModule;
pub use dimmer::DimmerModule;
pub use gamma::GammaModule;
pub use upower::UpowerModule;

#[cfg(test)]
mod scenario_tests {
    //! End-to-end policy scenarios through a real bus with mock services.

    use std::sync::Arc;

    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    use crate::{
        app_context::{AcState, AppState, DisplayFlags},
        bus::ModuleBus,
        config::Config,
        message::{Message, Payload},
        services::{MockBacklightControl, MockIdleMonitor, MockPowerSupply},
    };

    use super::{DimmerModule, UpowerModule};

    /// Idle signal dims to the configured target, the following active
    /// signal restores the recorded pre-dim level; the dimmed bit tracks
    /// both transitions.
    #[tokio::test]
    async fn dim_then_restore_round_trip() {
        let mut state = AppState::default();
        let mut config = Config::default();
        state.current_bl_pct = 0.8;
        config.dimmer.dim_pct = 0.1;

        let mut power = MockPowerSupply::new();
        power.expect_on_battery().returning(|| Ok(false));

        let mut idle = MockIdleMonitor::new();
        idle.expect_set_timeout().returning(|_| Ok(()));
        idle.expect_start().returning(|| Ok(()));
        idle.expect_stop().returning(|| Ok(()));

        let mut backlight = MockBacklightControl::new();
        backlight
            .expect_set_backlight()
            .with(
                eq(0.1),
                eq(config.dimmer.enter.smooth),
                eq(config.dimmer.enter.step),
                eq(config.dimmer.enter.timeout_ms),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        backlight
            .expect_set_backlight()
            .with(
                eq(0.8),
                eq(config.dimmer.exit.smooth),
                eq(config.dimmer.exit.step),
                eq(config.dimmer.exit.timeout_ms),
            )
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        let mut bus = ModuleBus::new();
        bus.register(
            Box::new(UpowerModule::new(Arc::new(power))),
            &state,
            &config,
        )
        .unwrap();
        bus.register(
            Box::new(DimmerModule::new(Arc::new(idle), Arc::new(backlight))),
            &state,
            &config,
        )
        .unwrap();
        bus.start(&mut state, &mut config).await;
        assert_eq!(state.ac_state, AcState::OnAc);

        bus.dispatch(
            Message::system(Payload::IdleChanged { idle: true }),
            &mut state,
            &mut config,
        )
        .await;
        assert!(state.display_state.contains(DisplayFlags::DIMMED));

        bus.dispatch(
            Message::system(Payload::IdleChanged { idle: false }),
            &mut state,
            &mut config,
        )
        .await;
        assert!(!state.display_state.contains(DisplayFlags::DIMMED));
    }
}
