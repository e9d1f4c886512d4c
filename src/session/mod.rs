//! # Session Orchestration
//!
//! A [`Session`] owns one connection end to end: it pumps transport chunks
//! through the reassembler, decodes frames into packets, answers liveness
//! probes, gates the secure channel, filters state updates through the
//! reconciler, and delivers what remains to the dispatcher.
//!
//! ## Concurrency
//! Exactly one task runs [`Session::run`] and with it the reassembler.
//! Any number of tasks may call [`Session::send`]; writes serialize
//! through one async lock so frames never interleave on the wire.
//!
//! ## Error containment
//! Malformed bodies and undecryptable envelopes are logged and dropped.
//! Only framing violations and transport failures end the loop.

pub mod reconciler;

pub use reconciler::UpdateReconciler;

use crate::config::{SessionConfig, ENCRYPTION_VERSION, PROTOCOL_VERSION};
use crate::core::frame::Frame;
use crate::core::reassembler::Reassembler;
use crate::crypto::dh::{KeyPair, SharedKey};
use crate::crypto::envelope;
use crate::error::{constants, CastError, Result};
use crate::protocol::message::{
    EncryptedEnvelope, InitialMessage, KeyExchangeMessage, VersionMessage,
};
use crate::protocol::opcode::Opcode;
use crate::protocol::packet::Packet;
use crate::protocol::Dispatcher;
use crate::transport::{self, DeviceInfo, TransportReader, TransportWriter};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    /// Secure variant only: waiting for the peer's public key.
    Handshaking,
    Ready,
    Disconnected,
}

/// Secure-channel state: our keypair, the derived key once the peer's
/// public key arrived, and envelopes that arrived too early.
struct SecureChannel {
    keypair: KeyPair,
    shared: Option<SharedKey>,
    queued: VecDeque<EncryptedEnvelope>,
}

impl SecureChannel {
    fn new() -> Self {
        Self {
            keypair: KeyPair::generate(),
            shared: None,
            queued: VecDeque::new(),
        }
    }
}

struct SessionInner {
    config: SessionConfig,
    state: StdMutex<SessionState>,
    writer: AsyncMutex<TransportWriter>,
    reader: StdMutex<Option<TransportReader>>,
    dispatcher: Dispatcher,
    reconciler: Arc<StdMutex<UpdateReconciler>>,
    secure: Option<StdMutex<SecureChannel>>,
    sent_initial: AtomicBool,
    cancel: CancellationToken,
}

/// One connection to a device. Cheap to clone; clones share the
/// connection.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

fn poisoned<T>(_: T) -> CastError {
    CastError::Transport("lock poisoned".to_string())
}

impl Session {
    /// Connect to a device and perform the opening sends: our public key
    /// on the secure variant, then our protocol version.
    ///
    /// The returned session is not reading yet; spawn [`Session::run`].
    #[instrument(skip_all, fields(device = %device.name))]
    pub async fn connect(
        device: &DeviceInfo,
        config: SessionConfig,
        dispatcher: Dispatcher,
        reconciler: Arc<StdMutex<UpdateReconciler>>,
        cancel: CancellationToken,
    ) -> Result<Session> {
        config.validate_strict()?;

        debug!("connecting");
        let (reader, writer) =
            transport::connect(device, config.connect_timeout, config.read_buffer_size).await?;

        let secure = device
            .protocol
            .is_secure()
            .then(|| StdMutex::new(SecureChannel::new()));

        let session = Session {
            inner: Arc::new(SessionInner {
                config,
                state: StdMutex::new(SessionState::Connecting),
                writer: AsyncMutex::new(writer),
                reader: StdMutex::new(Some(reader)),
                dispatcher,
                reconciler,
                secure,
                sent_initial: AtomicBool::new(false),
                cancel,
            }),
        };

        if let Some(secure) = &session.inner.secure {
            let public_key = {
                let channel = secure.lock().map_err(poisoned)?;
                channel.keypair.public_key_base64()
            };
            session
                .send(Packet::KeyExchange(KeyExchangeMessage {
                    version: ENCRYPTION_VERSION,
                    public_key,
                }))
                .await?;
            session.set_state(SessionState::Handshaking)?;
        } else {
            session.set_state(SessionState::Ready)?;
        }

        session
            .send(Packet::Version(VersionMessage {
                version: PROTOCOL_VERSION,
            }))
            .await?;

        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.inner
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(SessionState::Disconnected)
    }

    fn set_state(&self, next: SessionState) -> Result<()> {
        let mut state = self.inner.state.lock().map_err(poisoned)?;
        if *state != next {
            debug!(from = ?*state, to = ?next, "session state change");
            *state = next;
        }
        Ok(())
    }

    /// Send one packet. Encrypted automatically once the secure channel
    /// is established; serialized with concurrent senders.
    pub async fn send(&self, packet: Packet) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(CastError::Closed);
        }
        let frame = self.encode_outbound(&packet)?;
        self.write_frame(frame).await
    }

    /// Send a body-less packet by opcode (Ping, Pong, Pause, ...).
    pub async fn send_empty(&self, opcode: Opcode) -> Result<()> {
        self.send(Packet::decode(opcode, b"")?).await
    }

    fn encode_outbound(&self, packet: &Packet) -> Result<Frame> {
        if let Some(secure) = &self.inner.secure {
            let shared = secure.lock().map_err(poisoned)?.shared;
            if let Some(key) = shared {
                // the channel messages themselves always travel plaintext
                if !matches!(packet.opcode(), Opcode::KeyExchange | Opcode::Encrypted) {
                    let sealed = envelope::seal(&key, packet)?;
                    return Packet::Encrypted(sealed).to_frame();
                }
            }
        }
        packet.to_frame()
    }

    async fn write_frame(&self, frame: Frame) -> Result<()> {
        let mut writer = self.inner.writer.lock().await;
        writer.send(frame.encode()).await
    }

    /// Receive loop. Sole owner of the reassembler; runs until the peer
    /// closes, a fatal error occurs, or the session is cancelled.
    ///
    /// A graceful peer close returns `Ok(())`; framing violations and
    /// transport failures return the error after closing the session.
    #[instrument(skip_all)]
    pub async fn run(&self) -> Result<()> {
        let mut reader = self
            .inner
            .reader
            .lock()
            .map_err(poisoned)?
            .take()
            .ok_or_else(|| CastError::Transport(constants::ERR_READER_TAKEN.to_string()))?;

        let mut machine = Reassembler::new(self.inner.config.max_packet_length);

        let result = loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => {
                    debug!("session cancelled");
                    break Ok(());
                }
                chunk = reader.next_chunk() => match chunk {
                    Ok(Some(bytes)) => {
                        let frames = match machine.push(&bytes) {
                            Ok(frames) => frames,
                            Err(e) => {
                                warn!(error = %e, "unrecoverable framing error");
                                break Err(e);
                            }
                        };
                        let mut fatal = None;
                        for frame in frames {
                            if let Err(e) = self.handle_frame(frame).await {
                                fatal = Some(e);
                                break;
                            }
                        }
                        if let Some(e) = fatal {
                            break Err(e);
                        }
                    }
                    Ok(None) => {
                        info!("peer closed the connection");
                        break Ok(());
                    }
                    Err(e) => break Err(e),
                }
            }
        };

        self.close().await;
        result
    }

    /// Cancel the session and shut the transport down. Idempotent.
    pub async fn close(&self) {
        let was_closed = self.state() == SessionState::Disconnected;
        let _ = self.set_state(SessionState::Disconnected);
        self.inner.cancel.cancel();
        if !was_closed {
            self.inner.writer.lock().await.shutdown().await;
        }
    }

    async fn handle_frame(&self, frame: Frame) -> Result<()> {
        let packet = match Packet::from_frame(&frame) {
            Ok(packet) => packet,
            Err(e) if !e.is_fatal() => {
                warn!(opcode = frame.opcode.as_u8(), error = %e, "dropping malformed frame");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match packet {
            Packet::KeyExchange(msg) => self.handle_key_exchange(msg).await,
            Packet::Encrypted(sealed) => self.handle_encrypted(sealed).await,
            other => self.handle_plain(other).await,
        }
    }

    async fn handle_key_exchange(&self, msg: KeyExchangeMessage) -> Result<()> {
        let Some(secure) = &self.inner.secure else {
            warn!("key exchange on a plaintext session, ignoring");
            return Ok(());
        };
        if msg.version != ENCRYPTION_VERSION {
            warn!(
                version = msg.version,
                "{}", constants::ERR_KEY_EXCHANGE_VERSION
            );
            return Ok(());
        }

        let (key, replay) = {
            let mut channel = secure.lock().map_err(poisoned)?;
            let key = match channel.keypair.shared_secret_base64(&msg.public_key) {
                Ok(key) => key,
                Err(e) => {
                    warn!(error = %e, "{}", constants::ERR_PEER_KEY_INVALID);
                    return Ok(());
                }
            };
            channel.shared = Some(key);
            let replay: Vec<EncryptedEnvelope> = channel.queued.drain(..).collect();
            (key, replay)
        };

        self.set_state(SessionState::Ready)?;
        info!(replayed = replay.len(), "secure channel established");

        for sealed in replay {
            self.handle_sealed(&key, sealed).await?;
        }
        Ok(())
    }

    async fn handle_encrypted(&self, sealed: EncryptedEnvelope) -> Result<()> {
        let Some(secure) = &self.inner.secure else {
            warn!("encrypted envelope on a plaintext session, ignoring");
            return Ok(());
        };

        let shared = { secure.lock().map_err(poisoned)?.shared };
        match shared {
            Some(key) => self.handle_sealed(&key, sealed).await,
            None => {
                // key agreement still pending; hold the message back
                let mut channel = secure.lock().map_err(poisoned)?;
                if channel.queued.len() >= self.inner.config.queued_encrypted_limit {
                    warn!("encrypted queue full, dropping oldest message");
                    channel.queued.pop_front();
                }
                channel.queued.push_back(sealed);
                Ok(())
            }
        }
    }

    async fn handle_sealed(&self, key: &SharedKey, sealed: EncryptedEnvelope) -> Result<()> {
        let inner = match envelope::open(key, &sealed) {
            Ok(inner) => inner,
            Err(e) => {
                warn!(error = %e, "dropping undecryptable envelope");
                return Ok(());
            }
        };

        if matches!(
            Opcode::from(inner.opcode),
            Opcode::Encrypted | Opcode::KeyExchange
        ) {
            warn!(opcode = inner.opcode, "dropping nested channel message");
            return Ok(());
        }

        match envelope::unwrap_packet(&inner) {
            Ok(packet) => self.handle_plain(packet).await,
            Err(e) if !e.is_fatal() => {
                warn!(opcode = inner.opcode, error = %e, "dropping malformed inner message");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_plain(&self, packet: Packet) -> Result<()> {
        match &packet {
            // answer before anything else sees the probe
            Packet::Ping => self.send(Packet::Pong).await?,
            Packet::Version(version) => {
                debug!(version = version.version, "peer version received");
                if version.version >= PROTOCOL_VERSION && !self.inner.sent_initial.swap(true, Ordering::SeqCst)
                {
                    self.send(Packet::Initial(self.identity())).await?;
                }
            }
            Packet::PlaybackUpdate(update) => {
                let accepted = self
                    .inner
                    .reconciler
                    .lock()
                    .map_err(poisoned)?
                    .offer_playback(update.clone());
                if !accepted {
                    debug!(
                        generation = update.generation_time,
                        "discarding stale playback update"
                    );
                    return Ok(());
                }
            }
            Packet::VolumeUpdate(update) => {
                let accepted = self
                    .inner
                    .reconciler
                    .lock()
                    .map_err(poisoned)?
                    .offer_volume(*update);
                if !accepted {
                    debug!(
                        generation = update.generation_time,
                        "discarding stale volume update"
                    );
                    return Ok(());
                }
            }
            _ => {}
        }

        self.inner.dispatcher.dispatch(&packet)
    }

    fn identity(&self) -> InitialMessage {
        InitialMessage {
            display_name: self.inner.config.display_name.clone(),
            app_name: self.inner.config.app_name.clone(),
            app_version: self.inner.config.app_version.clone(),
            play_data: None,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("secure", &self.inner.secure.is_some())
            .finish()
    }
}
