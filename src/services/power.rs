//! UPower-backed power supply collaborator.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use zbus::Connection;

use crate::{
    message::{Message, Payload},
    services::PowerSupply,
};

const UPOWER_SERVICE: &str = "org.freedesktop.UPower";
const UPOWER_PATH: &str = "/org/freedesktop/UPower";

#[zbus::proxy(
    interface = "org.freedesktop.UPower",
    default_service = "org.freedesktop.UPower",
    default_path = "/org/freedesktop/UPower",
    gen_blocking = false
)]
trait UPower {
    // Fetched fresh on every read; the change signal this property rides on
    // fires for unrelated properties too.
    #[zbus(property(emits_changed_signal = "false"))]
    fn on_battery(&self) -> zbus::Result<bool>;
}

/// Production [`PowerSupply`] talking to `org.freedesktop.UPower`.
pub struct UPowerSupply {
    proxy: UPowerProxy<'static>,
}

impl UPowerSupply {
    pub async fn connect(conn: &Connection) -> Result<Self> {
        Ok(Self {
            proxy: UPowerProxy::new(conn).await?,
        })
    }
}

#[async_trait]
impl PowerSupply for UPowerSupply {
    async fn on_battery(&self) -> Result<bool> {
        Ok(self.proxy.on_battery().await?)
    }
}

/// Forwards UPower `PropertiesChanged` notifications into the bus inbox.
///
/// The signal is coarse (it fires for lid state, daemon version and friends
/// just as well as for `OnBattery`), so only a bare notice is forwarded; the
/// upower module re-reads the property and debounces.
pub async fn watch_power_changes(
    conn: Connection,
    inbox: mpsc::Sender<Message>,
    token: CancellationToken,
) -> Result<()> {
    let props = zbus::fdo::PropertiesProxy::builder(&conn)
        .destination(UPOWER_SERVICE)?
        .path(UPOWER_PATH)?
        .build()
        .await?;
    let mut changes = props.receive_properties_changed().await?;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            change = changes.next() => match change {
                Some(_) => {
                    debug!("Power supply properties changed");
                    if inbox
                        .send(Message::system(Payload::PowerChanged))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    Ok(())
}
