//! D-Bus control surface of the daemon.
//!
//! External requests enter the policy core as ordinary bus messages: the
//! interface only translates method calls into payloads and drops them into
//! the coordinator's inbox.

use log::warn;
use tokio::sync::mpsc;
use zbus::interface;

use crate::{
    app_context::{AcState, DayTime},
    message::{Message, Payload, TempRequest},
};

pub const BUS_NAME: &str = "io.github.lumid";
pub const OBJECT_PATH: &str = "/io/github/lumid";

pub struct DBusInterface {
    inbox: mpsc::Sender<Message>,
    version: String,
}

impl DBusInterface {
    pub fn new(inbox: mpsc::Sender<Message>, version: String) -> Self {
        Self { inbox, version }
    }

    async fn send(&self, payload: Payload) {
        if self.inbox.send(Message::system(payload)).await.is_err() {
            warn!("Daemon inbox closed, dropping external request");
        }
    }
}

#[interface(name = "io.github.lumid1")]
impl DBusInterface {
    /// Requests a color temperature for a phase ("day" or "night").
    async fn set_temperature(
        &self,
        daytime: String,
        temp: i32,
        smooth: bool,
        step: i32,
        timeout_ms: u32,
    ) -> zbus::fdo::Result<()> {
        let daytime = parse_daytime(&daytime)?;
        self.send(Payload::TempRequest(TempRequest {
            new: temp,
            daytime,
            smooth,
            step,
            timeout_ms,
        }))
        .await;
        Ok(())
    }

    /// Changes the idle timeout for one power state.
    async fn set_dimmer_timeout(&self, on_battery: bool, secs: u32) {
        let state = if on_battery {
            AcState::OnBattery
        } else {
            AcState::OnAc
        };
        self.send(Payload::TimeoutRequest {
            state,
            new_secs: secs,
        })
        .await;
    }

    /// Suspends or resumes idle detection.
    async fn inhibit(&self, inhibited: bool) {
        self.send(Payload::InhibitUpdate { inhibited }).await;
    }

    /// Reports a backlight change from the external backlight tracker. The
    /// coordinator fills in the previous level.
    async fn update_backlight(&self, pct: f64) {
        self.send(Payload::BacklightUpdate { old: 0.0, new: pct })
            .await;
    }

    #[zbus(property)]
    async fn version(&self) -> String {
        self.version.clone()
    }
}

fn parse_daytime(value: &str) -> zbus::fdo::Result<DayTime> {
    match value {
        "day" => Ok(DayTime::Day),
        "night" => Ok(DayTime::Night),
        other => Err(zbus::fdo::Error::InvalidArgs(format!(
            "unknown daytime '{other}', expected 'day' or 'night'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn requests_land_in_the_inbox() {
        let (tx, mut rx) = mpsc::channel(8);
        let iface = DBusInterface::new(tx, "0.0.0".to_string());

        iface
            .set_temperature("night".to_string(), 4000, true, 50, 300)
            .await
            .unwrap();
        iface.set_dimmer_timeout(true, 15).await;
        iface.inhibit(true).await;
        iface.update_backlight(0.6).await;

        let msg = rx.recv().await.unwrap();
        match msg.payload {
            Payload::TempRequest(req) => {
                assert_eq!(req.new, 4000);
                assert_eq!(req.daytime, DayTime::Night);
            }
            other => panic!("Expected TempRequest, got {other:?}"),
        }
        assert!(matches!(
            rx.recv().await.unwrap().payload,
            Payload::TimeoutRequest {
                state: AcState::OnBattery,
                new_secs: 15
            }
        ));
        assert!(matches!(
            rx.recv().await.unwrap().payload,
            Payload::InhibitUpdate { inhibited: true }
        ));
        assert!(matches!(
            rx.recv().await.unwrap().payload,
            Payload::BacklightUpdate { new, .. } if new == 0.6
        ));
    }

    #[tokio::test]
    async fn unknown_daytime_is_rejected() {
        let (tx, mut rx) = mpsc::channel(8);
        let iface = DBusInterface::new(tx, "0.0.0".to_string());

        let result = iface
            .set_temperature("dusk".to_string(), 4000, true, 50, 300)
            .await;
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }
}
