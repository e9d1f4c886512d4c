//! End-to-end session tests over loopback TCP.
//!
//! A minimal in-test peer drives the other side of the socket with the
//! crate's own framing primitives, so these tests exercise the full
//! receive path: reassembly, decoding, liveness, the secure channel, and
//! update reconciliation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use cast_protocol::config::{SessionConfig, ENCRYPTION_VERSION};
use cast_protocol::core::{Frame, Reassembler};
use cast_protocol::crypto::{envelope, KeyPair};
use cast_protocol::protocol::message::{
    KeyExchangeMessage, PlaybackState, PlaybackUpdateMessage, VolumeUpdateMessage,
};
use cast_protocol::protocol::{Dispatcher, Opcode, Packet};
use cast_protocol::session::{Session, SessionState, UpdateReconciler};
use cast_protocol::transport::{DeviceInfo, ProtocolType};

use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

async fn loopback_device(protocol: ProtocolType) -> (TcpListener, DeviceInfo) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let device = DeviceInfo::new(
        "loopback",
        vec![IpAddr::V4(Ipv4Addr::LOCALHOST)],
        port,
        protocol,
    );
    (listener, device)
}

fn recording_dispatcher() -> (Dispatcher, Arc<Mutex<Vec<Packet>>>) {
    let dispatcher = Dispatcher::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    dispatcher
        .subscribe(move |packet| sink.lock().unwrap().push(packet.clone()))
        .unwrap();
    (dispatcher, seen)
}

async fn connect_session(
    device: &DeviceInfo,
    dispatcher: Dispatcher,
    reconciler: Arc<Mutex<UpdateReconciler>>,
) -> Session {
    Session::connect(
        device,
        SessionConfig::default(),
        dispatcher,
        reconciler,
        CancellationToken::new(),
    )
    .await
    .unwrap()
}

/// Read from the peer socket until `want` whole frames arrived.
async fn read_frames(server: &mut TcpStream, machine: &mut Reassembler, want: usize) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut buf = [0u8; 4096];
    while frames.len() < want {
        let n = server.read(&mut buf).await.unwrap();
        assert!(n > 0, "peer closed before {want} frames arrived");
        frames.extend(machine.push(&buf[..n]).unwrap());
    }
    frames
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn version_hello_is_sent_on_connect() {
    let (listener, device) = loopback_device(ProtocolType::Tcp).await;
    let (dispatcher, _) = recording_dispatcher();

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let session = connect_session(
        &device,
        dispatcher,
        Arc::new(Mutex::new(UpdateReconciler::new())),
    )
    .await;
    let mut server = accept.await.unwrap();

    let mut machine = Reassembler::default();
    let hello = read_frames(&mut server, &mut machine, 1).await;
    assert_eq!(hello[0].opcode, Opcode::Version);
    assert_eq!(hello[0].body_str(), Some(r#"{"version":3}"#));
    assert_eq!(session.state(), SessionState::Ready);

    session.close().await;
}

#[tokio::test]
async fn ping_is_answered_before_later_frames_dispatch() {
    let (listener, device) = loopback_device(ProtocolType::Tcp).await;
    let (dispatcher, seen) = recording_dispatcher();

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let session = connect_session(
        &device,
        dispatcher,
        Arc::new(Mutex::new(UpdateReconciler::new())),
    )
    .await;
    let mut server = accept.await.unwrap();

    let runner = {
        let session = session.clone();
        tokio::spawn(async move { session.run().await })
    };

    let mut machine = Reassembler::default();
    read_frames(&mut server, &mut machine, 1).await; // version hello

    // ping and pause delivered in a single write
    let mut bytes = Frame::empty(Opcode::Ping).encode().to_vec();
    bytes.extend_from_slice(&Frame::empty(Opcode::Pause).encode());
    server.write_all(&bytes).await.unwrap();

    let pong = read_frames(&mut server, &mut machine, 1).await;
    assert_eq!(pong[0].opcode, Opcode::Pong);
    assert!(pong[0].body.is_empty());

    wait_until(|| seen.lock().unwrap().len() >= 2).await;
    assert_eq!(
        seen.lock().unwrap().clone(),
        vec![Packet::Ping, Packet::Pause]
    );

    session.close().await;
    assert!(runner.await.unwrap().is_ok());
}

#[tokio::test]
async fn stale_volume_update_is_discarded() {
    let (listener, device) = loopback_device(ProtocolType::Tcp).await;
    let (dispatcher, seen) = recording_dispatcher();
    let reconciler = Arc::new(Mutex::new(UpdateReconciler::new()));

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let session = connect_session(&device, dispatcher, Arc::clone(&reconciler)).await;
    let mut server = accept.await.unwrap();

    let runner = {
        let session = session.clone();
        tokio::spawn(async move { session.run().await })
    };

    let fresh = Packet::VolumeUpdate(VolumeUpdateMessage {
        generation_time: 100,
        volume: 0.5,
    });
    let stale = Packet::VolumeUpdate(VolumeUpdateMessage {
        generation_time: 50,
        volume: 0.9,
    });
    // chase the stale one with a ping so its arrival is observable
    let mut bytes = fresh.to_frame().unwrap().encode().to_vec();
    bytes.extend_from_slice(&stale.to_frame().unwrap().encode());
    bytes.extend_from_slice(&Frame::empty(Opcode::Ping).encode());
    server.write_all(&bytes).await.unwrap();

    wait_until(|| {
        seen.lock()
            .unwrap()
            .iter()
            .any(|p| matches!(p, Packet::Ping))
    })
    .await;

    let updates: Vec<Packet> = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|p| matches!(p, Packet::VolumeUpdate(_)))
        .cloned()
        .collect();
    assert_eq!(updates, vec![fresh]);

    let snapshot = reconciler.lock().unwrap().volume().copied().unwrap();
    assert_eq!(snapshot.generation_time, 100);
    assert_eq!(snapshot.volume, 0.5);

    session.close().await;
    assert!(runner.await.unwrap().is_ok());
}

#[tokio::test]
async fn oversized_length_prefix_is_fatal_and_dispatches_nothing() {
    let (listener, device) = loopback_device(ProtocolType::Tcp).await;
    let (dispatcher, seen) = recording_dispatcher();

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let session = connect_session(
        &device,
        dispatcher,
        Arc::new(Mutex::new(UpdateReconciler::new())),
    )
    .await;
    let mut server = accept.await.unwrap();

    let runner = {
        let session = session.clone();
        tokio::spawn(async move { session.run().await })
    };

    let mut bytes = 40_000u32.to_le_bytes().to_vec();
    // a valid frame trapped behind the poisoned prefix
    bytes.extend_from_slice(&Frame::empty(Opcode::Pause).encode());
    server.write_all(&bytes).await.unwrap();

    let result = runner.await.unwrap();
    assert!(result.is_err());
    assert!(result.unwrap_err().is_fatal());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn peer_close_ends_the_loop_gracefully() {
    let (listener, device) = loopback_device(ProtocolType::Tcp).await;
    let (dispatcher, _) = recording_dispatcher();

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let session = connect_session(
        &device,
        dispatcher,
        Arc::new(Mutex::new(UpdateReconciler::new())),
    )
    .await;
    let mut server = accept.await.unwrap();

    let runner = {
        let session = session.clone();
        tokio::spawn(async move { session.run().await })
    };

    // drain the version hello first so closing sends FIN, not RST
    let mut machine = Reassembler::default();
    read_frames(&mut server, &mut machine, 1).await;
    drop(server);

    assert!(runner.await.unwrap().is_ok());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn secure_session_queues_early_envelopes_and_encrypts_sends() {
    let (listener, device) = loopback_device(ProtocolType::TcpSecure).await;
    let (dispatcher, seen) = recording_dispatcher();

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let session = connect_session(
        &device,
        dispatcher,
        Arc::new(Mutex::new(UpdateReconciler::new())),
    )
    .await;
    let mut server = accept.await.unwrap();

    let runner = {
        let session = session.clone();
        tokio::spawn(async move { session.run().await })
    };

    let mut machine = Reassembler::default();
    // client opens with its key, then the plaintext version hello
    let opening = read_frames(&mut server, &mut machine, 2).await;
    assert_eq!(opening[0].opcode, Opcode::KeyExchange);
    assert_eq!(opening[1].opcode, Opcode::Version);
    assert_eq!(session.state(), SessionState::Handshaking);

    let client_key: KeyExchangeMessage = serde_json::from_slice(&opening[0].body).unwrap();
    assert_eq!(client_key.version, ENCRYPTION_VERSION);

    let peer = KeyPair::generate();
    let shared = peer.shared_secret_base64(&client_key.public_key).unwrap();

    // an encrypted update sent before our key exchange must be queued
    let early = Packet::PlaybackUpdate(PlaybackUpdateMessage {
        generation_time: 10,
        state: PlaybackState::Playing,
        time: Some(1.0),
        duration: None,
        speed: None,
        item_index: None,
    });
    let sealed = Packet::Encrypted(envelope::seal(&shared, &early).unwrap());
    server
        .write_all(&sealed.to_frame().unwrap().encode())
        .await
        .unwrap();

    // now complete the handshake; the queued update replays
    let exchange = Packet::KeyExchange(KeyExchangeMessage {
        version: ENCRYPTION_VERSION,
        public_key: peer.public_key_base64(),
    });
    server
        .write_all(&exchange.to_frame().unwrap().encode())
        .await
        .unwrap();

    wait_until(|| !seen.lock().unwrap().is_empty()).await;
    assert_eq!(seen.lock().unwrap().clone(), vec![early]);
    assert_eq!(session.state(), SessionState::Ready);

    // sends now travel sealed and open under the shared key
    session.send(Packet::Pause).await.unwrap();
    let frames = read_frames(&mut server, &mut machine, 1).await;
    assert_eq!(frames[0].opcode, Opcode::Encrypted);

    let outer = match Packet::from_frame(&frames[0]).unwrap() {
        Packet::Encrypted(outer) => outer,
        other => panic!("expected encrypted frame, got {other:?}"),
    };
    let inner = envelope::open(&shared, &outer).unwrap();
    assert_eq!(envelope::unwrap_packet(&inner).unwrap(), Packet::Pause);

    session.close().await;
    assert!(runner.await.unwrap().is_ok());
}
