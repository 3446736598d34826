//! Idle-detection client backed by the Clightd display helper.
//!
//! Clightd hands out per-consumer idle client objects; the client object is
//! requested lazily so that a missing helper service surfaces as an error on
//! the dimmer's first call (and poisons the dimmer) instead of taking the
//! whole daemon down at startup.

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use tokio::sync::{OnceCell, mpsc};
use tokio_util::sync::CancellationToken;
use zbus::Connection;
use zvariant::OwnedObjectPath;

use crate::{
    message::{Message, Payload},
    services::IdleMonitor,
};

#[zbus::proxy(
    interface = "org.clightd.clightd.Idle",
    default_service = "org.clightd.clightd",
    default_path = "/org/clightd/clightd/Idle",
    gen_blocking = false
)]
trait Idle {
    /// Allocates a dedicated idle client object for this consumer.
    fn get_client(&self) -> zbus::Result<OwnedObjectPath>;
}

#[zbus::proxy(
    interface = "org.clightd.clightd.Idle.Client",
    default_service = "org.clightd.clightd",
    gen_blocking = false
)]
trait IdleClient {
    fn start(&self) -> zbus::Result<()>;

    fn stop(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn timeout(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn set_timeout(&self, secs: u32) -> zbus::Result<()>;

    #[zbus(signal, name = "Idle")]
    fn idle_hint(&self, is_idle: bool) -> zbus::Result<()>;
}

/// Production [`IdleMonitor`] talking to the Clightd idle service.
pub struct ClightdIdleMonitor {
    conn: Connection,
    client: OnceCell<IdleClientProxy<'static>>,
}

impl ClightdIdleMonitor {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&IdleClientProxy<'static>> {
        self.client
            .get_or_try_init(|| async {
                let idle = IdleProxy::new(&self.conn).await?;
                let path = idle.get_client().await?;
                debug!("Idle client allocated at {path}");
                Ok(IdleClientProxy::builder(&self.conn)
                    .path(path)?
                    .build()
                    .await?)
            })
            .await
    }

    /// Forwards idle/active transitions into the bus inbox.
    pub async fn watch(
        &self,
        inbox: mpsc::Sender<Message>,
        token: CancellationToken,
    ) -> Result<()> {
        let client = self.client().await?;
        let mut hints = client.receive_idle_hint().await?;

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                hint = hints.next() => match hint {
                    Some(signal) => {
                        let idle = *signal.args()?.is_idle();
                        if inbox
                            .send(Message::system(Payload::IdleChanged { idle }))
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
}

#[async_trait]
impl IdleMonitor for ClightdIdleMonitor {
    async fn set_timeout(&self, secs: u32) -> Result<()> {
        self.client().await?.set_timeout(secs).await?;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.client().await?.start().await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.client().await?.stop().await?;
        Ok(())
    }
}
