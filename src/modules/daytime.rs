//! Day/night phase provider.
//!
//! Owns the day-event bookkeeping in `AppState`: the current phase, today's
//! sunrise/sunset timestamps, the upcoming event and the position inside its
//! transition window. Phases flip at the event timestamp, which sits in the
//! middle of a window spanning `event_duration_secs` on either side.
//!
//! Without a usable sunrise/sunset schedule there is no phase to provide;
//! the module then announces itself once (so waiters can observe the
//! corpse) and swallows its poison pill.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Days, Local, LocalResult, NaiveDate, NaiveTime};
use log::info;

use crate::{
    app_context::{DayEvent, DayEvents, DayTime},
    bus::{BusContext, InitOutcome, Module, Verdict},
    config::parse_wall_clock,
    message::{Message, MessageKind, Payload, TempRequest},
};

pub const NAME: &str = "daytime";

const SUBSCRIPTIONS: &[MessageKind] = &[MessageKind::DaytimeTick];

pub struct DaytimeModule {
    sunrise: Option<NaiveTime>,
    sunset: Option<NaiveTime>,
    /// Readiness has been published at least once.
    announced: bool,
}

impl DaytimeModule {
    pub fn new() -> Self {
        Self {
            sunrise: None,
            sunset: None,
            announced: false,
        }
    }

    #[cfg(test)]
    fn with_schedule(sunrise: NaiveTime, sunset: NaiveTime) -> Self {
        Self {
            sunrise: Some(sunrise),
            sunset: Some(sunset),
            announced: true,
        }
    }

    /// Recomputes the event bookkeeping for `now` and publishes whatever
    /// changed: a next-event notice always, phase messages on a flip.
    fn recompute(&mut self, now: DateTime<Local>, ctx: &mut BusContext<'_>) {
        let (Some(sunrise), Some(sunset)) = (self.sunrise, self.sunset) else {
            return;
        };
        let today = now.date_naive();
        let t = now.timestamp();
        let duration = i64::from(ctx.config.daytime.event_duration_secs);

        let today_sunrise = local_ts(today, sunrise);
        let sunset_ts = local_ts(today, sunset);

        // The next event is the first one whose window has not closed yet;
        // past the sunset window it is tomorrow's sunrise.
        let (next_event, sunrise_ts) = if t <= today_sunrise + duration {
            (DayEvent::Sunrise, today_sunrise)
        } else if t <= sunset_ts + duration {
            (DayEvent::Sunset, today_sunrise)
        } else {
            (
                DayEvent::Sunrise,
                local_ts(today + Days::new(1), sunrise),
            )
        };
        let event_ts = match next_event {
            DayEvent::Sunrise => sunrise_ts,
            DayEvent::Sunset => sunset_ts,
        };

        let day_time = if t >= today_sunrise && t < sunset_ts {
            DayTime::Day
        } else {
            DayTime::Night
        };

        let phase_changed = ctx.state.day_time != day_time;
        ctx.state.day_time = day_time;
        ctx.state.in_event = (t - event_ts).abs() <= duration;
        ctx.state.event_time_range = if t < event_ts { 0 } else { duration };
        ctx.state.next_event = next_event;
        ctx.state.day_events = DayEvents {
            sunrise: sunrise_ts,
            sunset: sunset_ts,
        };

        ctx.publish(Payload::NextEventUpdate {
            sunrise: sunrise_ts,
            sunset: sunset_ts,
        });

        if phase_changed || !self.announced {
            self.announced = true;
            info!("Entering {day_time} time");
            ctx.publish(Payload::DaytimeUpdate);
            let g = &ctx.config.gamma;
            ctx.publish(Payload::TempRequest(TempRequest {
                new: g.temp_for(day_time),
                daytime: day_time,
                smooth: g.smooth,
                step: g.step,
                timeout_ms: g.timeout_ms,
            }));
        }
    }
}

impl Default for DaytimeModule {
    fn default() -> Self {
        Self::new()
    }
}

fn local_ts(date: NaiveDate, time: NaiveTime) -> i64 {
    match date.and_time(time).and_local_timezone(Local) {
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.timestamp(),
        LocalResult::None => date.and_time(time).and_utc().timestamp(),
    }
}

#[async_trait]
impl Module for DaytimeModule {
    fn name(&self) -> &'static str {
        NAME
    }

    fn subscriptions(&self) -> &'static [MessageKind] {
        SUBSCRIPTIONS
    }

    async fn init(&mut self, ctx: &mut BusContext<'_>) -> Result<InitOutcome> {
        let parsed = parse_wall_clock(&ctx.config.daytime.sunrise)
            .and_then(|sunrise| Ok((sunrise, parse_wall_clock(&ctx.config.daytime.sunset)?)));
        match parsed {
            Ok((sunrise, sunset)) => {
                self.sunrise = Some(sunrise);
                self.sunset = Some(sunset);
                self.recompute(Local::now(), ctx);
                Ok(InitOutcome::Ready)
            }
            Err(e) => {
                // Wake anyone waiting for a phase before going down.
                ctx.publish(Payload::DaytimeUpdate);
                Err(e).context("No usable sunrise/sunset schedule")
            }
        }
    }

    async fn handle(&mut self, msg: &Message, ctx: &mut BusContext<'_>) -> Result<Verdict> {
        if let Payload::DaytimeTick = msg.payload {
            self.recompute(Local::now(), ctx);
        }
        Ok(Verdict::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        app_context::AppState,
        bus::{ModuleBus, ModuleState},
        config::Config,
        modules::gamma::{self, GammaModule},
        services::MockGammaControl,
    };
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Arc;

    fn schedule() -> DaytimeModule {
        DaytimeModule::with_schedule(
            NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        )
    }

    fn at(hour: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 15, hour, min, 0).unwrap()
    }

    fn env() -> (AppState, Config) {
        let mut config = Config::default();
        config.daytime.event_duration_secs = 1800;
        (AppState::default(), config)
    }

    fn kinds(outbox: &VecDeque<Message>) -> Vec<MessageKind> {
        outbox.iter().map(|m| m.kind()).collect()
    }

    #[tokio::test]
    async fn before_sunrise_window_is_plain_night() {
        let (mut state, mut config) = env();
        state.day_time = DayTime::Night;
        let mut module = schedule();
        let mut outbox = VecDeque::new();
        let registry = [];
        let mut ctx = BusContext::detached(&mut state, &mut config, &mut outbox, &registry);

        module.recompute(at(5, 0), &mut ctx);

        assert_eq!(state.day_time, DayTime::Night);
        assert_eq!(state.next_event, DayEvent::Sunrise);
        assert!(!state.in_event);
        assert_eq!(state.event_time_range, 0);
        assert_eq!(kinds(&outbox), vec![MessageKind::NextEventUpdate]);
    }

    #[tokio::test]
    async fn first_half_of_sunrise_window_is_still_night() {
        let (mut state, mut config) = env();
        state.day_time = DayTime::Night;
        let mut module = schedule();
        let mut outbox = VecDeque::new();
        let registry = [];
        let mut ctx = BusContext::detached(&mut state, &mut config, &mut outbox, &registry);

        module.recompute(at(6, 45), &mut ctx);

        assert_eq!(state.day_time, DayTime::Night);
        assert!(state.in_event);
        assert_eq!(state.event_time_range, 0);
        assert_eq!(state.next_event, DayEvent::Sunrise);
    }

    #[tokio::test]
    async fn second_half_of_sunrise_window_has_flipped_to_day() {
        let (mut state, mut config) = env();
        state.day_time = DayTime::Night;
        let mut module = schedule();
        let mut outbox = VecDeque::new();
        let registry = [];
        let mut ctx = BusContext::detached(&mut state, &mut config, &mut outbox, &registry);

        module.recompute(at(7, 15), &mut ctx);

        assert_eq!(state.day_time, DayTime::Day);
        assert!(state.in_event);
        assert_eq!(state.event_time_range, 1800);
        assert_eq!(state.next_event, DayEvent::Sunrise);
        // The flip publishes the phase messages.
        assert_eq!(
            kinds(&outbox),
            vec![
                MessageKind::NextEventUpdate,
                MessageKind::DaytimeUpdate,
                MessageKind::TempRequest
            ]
        );
    }

    #[tokio::test]
    async fn midday_targets_sunset() {
        let (mut state, mut config) = env();
        state.day_time = DayTime::Day;
        let mut module = schedule();
        let mut outbox = VecDeque::new();
        let registry = [];
        let mut ctx = BusContext::detached(&mut state, &mut config, &mut outbox, &registry);

        module.recompute(at(12, 0), &mut ctx);

        assert_eq!(state.day_time, DayTime::Day);
        assert_eq!(state.next_event, DayEvent::Sunset);
        assert!(!state.in_event);
        assert_eq!(
            state.day_events.sunset - state.day_events.sunrise,
            12 * 3600
        );
    }

    #[tokio::test]
    async fn past_sunset_window_targets_tomorrows_sunrise() {
        let (mut state, mut config) = env();
        state.day_time = DayTime::Night;
        let mut module = schedule();
        let mut outbox = VecDeque::new();
        let registry = [];
        let mut ctx = BusContext::detached(&mut state, &mut config, &mut outbox, &registry);

        module.recompute(at(23, 0), &mut ctx);

        assert_eq!(state.day_time, DayTime::Night);
        assert_eq!(state.next_event, DayEvent::Sunrise);
        assert!(!state.in_event);
        // Tomorrow's sunrise: 8 hours past 23:00.
        let tomorrow_sunrise = at(23, 0).timestamp() + 8 * 3600;
        assert_eq!(state.day_events.sunrise, tomorrow_sunrise);
    }

    #[tokio::test]
    async fn phase_request_carries_configured_temperature() {
        let (mut state, mut config) = env();
        config.gamma.night_temp = 3600;
        state.day_time = DayTime::Day;
        let mut module = schedule();
        let mut outbox = VecDeque::new();
        let registry = [];
        let mut ctx = BusContext::detached(&mut state, &mut config, &mut outbox, &registry);

        // 20:00 is night: the flip away from day publishes a request.
        module.recompute(at(20, 0), &mut ctx);

        let req = outbox
            .iter()
            .find_map(|m| match m.payload {
                Payload::TempRequest(req) => Some(req),
                _ => None,
            })
            .expect("phase flip publishes a temperature request");
        assert_eq!(req.new, 3600);
        assert_eq!(req.daytime, DayTime::Night);
    }

    #[tokio::test]
    async fn unparsable_schedule_poisons_daytime_and_gamma() {
        let mut state = AppState::default();
        state.display = Some(":0".to_string());
        state.xauthority = Some("/tmp/xauth".to_string());
        let mut config = Config::default();
        config.daytime.sunrise = "not-a-time".to_string();

        let mut bus = ModuleBus::new();
        bus.register(Box::new(DaytimeModule::new()), &state, &config)
            .unwrap();
        bus.register(
            Box::new(GammaModule::new(Arc::new(MockGammaControl::new()))),
            &state,
            &config,
        )
        .unwrap();
        bus.start(&mut state, &mut config).await;

        assert_eq!(bus.module_state(NAME), Some(ModuleState::Stopped));
        assert_eq!(bus.module_state(gamma::NAME), Some(ModuleState::Stopped));
    }

    #[tokio::test]
    async fn startup_announces_readiness_once() {
        let (mut state, mut config) = env();
        let mut module = schedule();
        module.announced = false;
        let mut outbox = VecDeque::new();
        let registry = [];
        let mut ctx = BusContext::detached(&mut state, &mut config, &mut outbox, &registry);

        module.recompute(at(12, 0), &mut ctx);
        assert!(kinds(&outbox).contains(&MessageKind::DaytimeUpdate));
        outbox.clear();

        let mut ctx = BusContext::detached(&mut state, &mut config, &mut outbox, &registry);
        module.recompute(at(12, 5), &mut ctx);
        assert_eq!(kinds(&outbox), vec![MessageKind::NextEventUpdate]);
    }
}
