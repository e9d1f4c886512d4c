//! # Cast Client
//!
//! Caller-level connection policy around [`Session`]. The client owns the
//! pieces that outlive any single connection: the handler registry, the
//! update reconciler, and the device identity. When a session drops and
//! reconnection is enabled, a supervisor task waits the configured delay
//! and builds an entirely fresh session against the same device.

use crate::config::SessionConfig;
use crate::error::{CastError, Result};
use crate::protocol::message::{
    EventSubscribeObject, PlayMessage, SeekMessage, SetPlaylistItemMessage, SetSpeedMessage,
    SetVolumeMessage, SubscribeEventMessage, UnsubscribeEventMessage,
};
use crate::protocol::{Dispatcher, Packet};
use crate::session::{Session, SessionState, UpdateReconciler};
use crate::transport::DeviceInfo;

use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

struct ClientInner {
    device: DeviceInfo,
    config: SessionConfig,
    dispatcher: Dispatcher,
    reconciler: Arc<StdMutex<UpdateReconciler>>,
    cancel: CancellationToken,
    session: RwLock<Option<Session>>,
}

/// Client handle for one device. Cheap to clone.
#[derive(Clone)]
pub struct CastClient {
    inner: Arc<ClientInner>,
}

impl CastClient {
    pub fn new(device: DeviceInfo, config: SessionConfig) -> Result<Self> {
        config.validate_strict()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                device,
                config,
                dispatcher: Dispatcher::new(),
                reconciler: Arc::new(StdMutex::new(UpdateReconciler::new())),
                cancel: CancellationToken::new(),
                session: RwLock::new(None),
            }),
        })
    }

    /// Handler registry shared across reconnects.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Update snapshots shared across reconnects.
    pub fn reconciler(&self) -> Arc<StdMutex<UpdateReconciler>> {
        Arc::clone(&self.inner.reconciler)
    }

    /// Connect and start the supervisor task. Errors from the first
    /// connection attempt surface here; later losses are retried in the
    /// background when `auto_reconnect` is set.
    #[instrument(skip_all, fields(device = %self.inner.device.name))]
    pub async fn start(&self) -> Result<()> {
        let session = self.establish().await?;
        *self.inner.session.write().await = Some(session.clone());

        let client = self.clone();
        tokio::spawn(async move {
            client.supervise(session).await;
        });
        Ok(())
    }

    async fn establish(&self) -> Result<Session> {
        Session::connect(
            &self.inner.device,
            self.inner.config.clone(),
            self.inner.dispatcher.clone(),
            Arc::clone(&self.inner.reconciler),
            self.inner.cancel.child_token(),
        )
        .await
    }

    async fn supervise(&self, first: Session) {
        let mut session = first;
        loop {
            match session.run().await {
                Ok(()) => info!("session ended"),
                Err(e) => warn!(error = %e, "session failed"),
            }
            *self.inner.session.write().await = None;

            if self.inner.cancel.is_cancelled() || !self.inner.config.auto_reconnect {
                break;
            }

            session = loop {
                tokio::time::sleep(self.inner.config.reconnect_delay).await;
                if self.inner.cancel.is_cancelled() {
                    return;
                }
                match self.establish().await {
                    Ok(session) => break session,
                    Err(e) => warn!(error = %e, "reconnect attempt failed"),
                }
            };
            *self.inner.session.write().await = Some(session.clone());
            info!("reconnected");
        }
    }

    /// Send a packet over the current session.
    pub async fn send(&self, packet: Packet) -> Result<()> {
        let guard = self.inner.session.read().await;
        match guard.as_ref() {
            Some(session) => session.send(packet).await,
            None => Err(CastError::Closed),
        }
    }

    /// State of the current session, `Disconnected` when between sessions.
    pub async fn state(&self) -> SessionState {
        let guard = self.inner.session.read().await;
        guard
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(SessionState::Disconnected)
    }

    /// Stop reconnecting and close the current session.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(session) = self.inner.session.write().await.take() {
            session.close().await;
        }
    }

    // Typed command helpers

    pub async fn play(&self, message: PlayMessage) -> Result<()> {
        self.send(Packet::Play(message)).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Packet::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(Packet::Resume).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(Packet::Stop).await
    }

    pub async fn seek(&self, time: f64) -> Result<()> {
        self.send(Packet::Seek(SeekMessage { time })).await
    }

    pub async fn set_volume(&self, volume: f64) -> Result<()> {
        self.send(Packet::SetVolume(SetVolumeMessage { volume }))
            .await
    }

    pub async fn set_speed(&self, speed: f64) -> Result<()> {
        self.send(Packet::SetSpeed(SetSpeedMessage { speed })).await
    }

    pub async fn set_playlist_item(&self, item_index: u64) -> Result<()> {
        self.send(Packet::SetPlaylistItem(SetPlaylistItemMessage { item_index }))
            .await
    }

    pub async fn subscribe_event(&self, event: EventSubscribeObject) -> Result<()> {
        self.send(Packet::SubscribeEvent(SubscribeEventMessage { event }))
            .await
    }

    pub async fn unsubscribe_event(&self, event: EventSubscribeObject) -> Result<()> {
        self.send(Packet::UnsubscribeEvent(UnsubscribeEventMessage { event }))
            .await
    }

    pub async fn ping(&self) -> Result<()> {
        self.send(Packet::Ping).await
    }
}

impl std::fmt::Debug for CastClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CastClient")
            .field("device", &self.inner.device.name)
            .finish()
    }
}
