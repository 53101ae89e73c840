//! Integration tests for the Rotel client
//!
//! These tests run the full client stack (handle, device actor, I/O task)
//! against the virtual amplifier, over in-memory duplex streams and real
//! loopback TCP. They cover:
//! - Startup handshake and the resulting snapshot
//! - Control intents reaching the amplifier and state following its reports
//! - Reports split across arbitrary reads
//! - Ambiguous values and the re-query path
//! - Connection loss and local close

use std::time::Duration;

use rotel_client::{
    AmplifierHandle, ClientError, CloseCause, ConnectionState, DeviceConfig, DeviceEvent,
    DeviceSnapshot,
};
use rotel_protocol::{PowerState, Query};
use rotel_sim::{run_virtual_amp_task, serve, VirtualAmpCommand, VirtualAmplifier};
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub const TIMEOUT: Duration = Duration::from_secs(2);

    pub struct Bench {
        pub amp: AmplifierHandle,
        pub events: mpsc::Receiver<DeviceEvent>,
        pub sim: mpsc::Sender<VirtualAmpCommand>,
    }

    /// Client attached to a virtual amplifier over a duplex stream
    pub fn bench() -> Bench {
        bench_with(DeviceConfig::new("sim"))
    }

    pub fn bench_with(config: DeviceConfig) -> Bench {
        let (client_io, amp_io) = tokio::io::duplex(4096);
        let (sim_tx, sim_rx) = mpsc::channel(32);
        let (state_tx, _) = broadcast::channel(32);

        let virtual_amp = VirtualAmplifier::new("sim", "A14");
        tokio::spawn(run_virtual_amp_task(amp_io, virtual_amp, sim_rx, state_tx));

        let (amp, events) = AmplifierHandle::attach(&config, client_io).unwrap();
        Bench {
            amp,
            events,
            sim: sim_tx,
        }
    }

    /// Wait for an event matching `pred`, skipping everything else
    pub async fn wait_for<F>(events: &mut mpsc::Receiver<DeviceEvent>, mut pred: F) -> DeviceEvent
    where
        F: FnMut(&DeviceEvent) -> bool,
    {
        tokio::time::timeout(TIMEOUT, async {
            loop {
                let event = events.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Wait for a state notification whose snapshot matches `pred`
    pub async fn wait_for_state<F>(
        events: &mut mpsc::Receiver<DeviceEvent>,
        mut pred: F,
    ) -> DeviceSnapshot
    where
        F: FnMut(&DeviceSnapshot) -> bool,
    {
        match wait_for(events, |e| matches!(e, DeviceEvent::StateChanged(s) if pred(s))).await {
            DeviceEvent::StateChanged(snapshot) => snapshot,
            _ => unreachable!(),
        }
    }

    /// Wait until the handshake replies have been applied
    pub async fn wait_for_handshake(events: &mut mpsc::Receiver<DeviceEvent>) -> DeviceSnapshot {
        wait_for_state(events, |s| s.model.is_some() && s.frequency.is_some()).await
    }

    /// Collect whatever events arrive within `window`
    pub async fn drain_for(
        events: &mut mpsc::Receiver<DeviceEvent>,
        window: Duration,
    ) -> Vec<DeviceEvent> {
        let mut out = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
            out.push(event);
        }
        out
    }

    pub fn state_changes(events: &[DeviceEvent]) -> Vec<&DeviceSnapshot> {
        events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

use helpers::*;

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_handshake_populates_snapshot() {
    let mut b = bench();

    let connected = wait_for(&mut b.events, |e| matches!(e, DeviceEvent::Connected { .. })).await;
    assert_eq!(
        connected,
        DeviceEvent::Connected {
            addr: "sim:9590".into()
        }
    );

    let out = wait_for(&mut b.events, |e| matches!(e, DeviceEvent::DataOut { .. })).await;
    assert_eq!(
        out,
        DeviceEvent::DataOut {
            data: b"model?power?volume?mute?source?freq?".to_vec()
        }
    );

    let snap = wait_for_handshake(&mut b.events).await;
    assert_eq!(snap.name, "Rotel");
    assert!(snap.available);
    assert_eq!(snap.connection, ConnectionState::Connected);
    assert_eq!(snap.model.as_deref(), Some("A14"));
    assert_eq!(snap.power, Some(PowerState::Standby));
    assert_eq!(snap.volume_level, Some(0.3));
    assert_eq!(snap.muted, Some(false));
    assert_eq!(snap.source.as_deref(), Some("CD"));
    assert_eq!(snap.frequency.as_deref(), Some("off"));
    assert_eq!(snap.source_list.len(), 12);
}

#[tokio::test]
async fn test_greeting_noise_never_notifies_alone() {
    let mut b = bench();
    let snap = wait_for_handshake(&mut b.events).await;
    assert_eq!(snap.power, Some(PowerState::Standby));

    // A noise-only read applies nothing
    b.sim
        .send(VirtualAmpCommand::Inject(b"network_status=connected$".to_vec()))
        .await
        .unwrap();
    let events = drain_for(&mut b.events, Duration::from_millis(200)).await;
    assert!(events.iter().any(|e| matches!(e, DeviceEvent::DataIn { .. })));
    assert!(state_changes(&events).is_empty());
}

// ============================================================================
// Control
// ============================================================================

#[tokio::test]
async fn test_control_round_trip() {
    let mut b = bench();
    wait_for_handshake(&mut b.events).await;

    b.amp.turn_on();
    wait_for_state(&mut b.events, |s| s.power == Some(PowerState::On)).await;

    b.amp.set_volume_level(0.43);
    wait_for_state(&mut b.events, |s| s.volume_level == Some(0.43)).await;

    b.amp.volume_up();
    wait_for_state(&mut b.events, |s| s.volume_level == Some(0.44)).await;

    b.amp.volume_down();
    b.amp.volume_down();
    wait_for_state(&mut b.events, |s| s.volume_level == Some(0.42)).await;

    b.amp.select_source("Optical 1");
    wait_for_state(&mut b.events, |s| s.source.as_deref() == Some("Optical 1")).await;

    b.amp.mute(true);
    wait_for_state(&mut b.events, |s| s.muted == Some(true)).await;

    b.amp.turn_off();
    let snap = wait_for_state(&mut b.events, |s| s.power == Some(PowerState::Standby)).await;
    // Standby is still a known state
    assert!(snap.available);
}

#[tokio::test]
async fn test_full_volume_encodes_three_digits() {
    let mut b = bench();
    wait_for_handshake(&mut b.events).await;
    b.amp.turn_on();
    wait_for_state(&mut b.events, |s| s.power == Some(PowerState::On)).await;

    b.amp.set_volume_level(1.5);
    let out = wait_for(&mut b.events, |e| {
        matches!(e, DeviceEvent::DataOut { data } if data.starts_with(b"vol_"))
    })
    .await;
    assert_eq!(
        out,
        DeviceEvent::DataOut {
            data: b"vol_100!".to_vec()
        }
    );
    wait_for_state(&mut b.events, |s| s.volume_level == Some(1.0)).await;
}

#[tokio::test]
async fn test_unknown_source_label_sends_nothing() {
    let mut b = bench();
    wait_for_handshake(&mut b.events).await;

    b.amp.select_source("Cassette");
    let err = wait_for(&mut b.events, |e| matches!(e, DeviceEvent::Error { .. })).await;
    match err {
        DeviceEvent::Error { message, .. } => assert!(message.contains("Cassette")),
        _ => unreachable!(),
    }

    let events = drain_for(&mut b.events, Duration::from_millis(100)).await;
    assert!(!events.iter().any(|e| matches!(e, DeviceEvent::DataOut { .. })));
}

#[tokio::test]
async fn test_custom_source_table() {
    let mut config = DeviceConfig::new("sim");
    config.display_name = "Living Room".into();
    config.sources = Some(
        [("cd", "Compact Disc"), ("opt1", "TV")]
            .into_iter()
            .map(|(c, l)| (c.to_string(), l.to_string()))
            .collect(),
    );
    let mut b = bench_with(config);

    let snap = wait_for_handshake(&mut b.events).await;
    assert_eq!(snap.name, "Living Room");
    assert_eq!(snap.source.as_deref(), Some("Compact Disc"));
    assert_eq!(snap.source_list, vec!["Compact Disc", "TV"]);

    b.amp.turn_on();
    b.amp.select_source("TV");
    wait_for_state(&mut b.events, |s| s.source.as_deref() == Some("TV")).await;
}

// ============================================================================
// Framing
// ============================================================================

#[tokio::test]
async fn test_byte_at_a_time_delivery() {
    let mut b = bench();
    wait_for_handshake(&mut b.events).await;

    b.sim
        .send(VirtualAmpCommand::SetChunkSize(Some(1)))
        .await
        .unwrap();
    b.sim
        .send(VirtualAmpCommand::Inject(b"power=on$volume=55$".to_vec()))
        .await
        .unwrap();

    let snap = wait_for_state(&mut b.events, |s| s.volume_level == Some(0.55)).await;
    assert_eq!(snap.power, Some(PowerState::On));
}

#[tokio::test]
async fn test_one_notification_per_read_at_most() {
    let mut b = bench();
    wait_for_handshake(&mut b.events).await;

    b.sim
        .send(VirtualAmpCommand::Inject(
            b"power=on$volume=20$mute=on$source=tuner$".to_vec(),
        ))
        .await
        .unwrap();

    let events = drain_for(&mut b.events, Duration::from_millis(300)).await;
    let reads = events
        .iter()
        .filter(|e| matches!(e, DeviceEvent::DataIn { .. }))
        .count();
    let changes = state_changes(&events);

    assert!(!changes.is_empty());
    assert!(changes.len() <= reads);

    let last = changes[changes.len() - 1];
    assert_eq!(last.power, Some(PowerState::On));
    assert_eq!(last.volume_level, Some(0.2));
    assert_eq!(last.muted, Some(true));
    assert_eq!(last.source.as_deref(), Some("Tuner"));
}

#[tokio::test]
async fn test_bad_frames_are_isolated() {
    let mut b = bench();
    wait_for_handshake(&mut b.events).await;

    b.sim
        .send(VirtualAmpCommand::Inject(
            b"garbage$volume=abc$source=cassette$volume=64$".to_vec(),
        ))
        .await
        .unwrap();

    let snap = wait_for_state(&mut b.events, |s| s.volume_level == Some(0.64)).await;
    assert_eq!(snap.source.as_deref(), Some("CD"));
}

// ============================================================================
// Ambiguous values
// ============================================================================

#[tokio::test]
async fn test_ambiguous_power_is_requeried() {
    let mut b = bench();
    wait_for_handshake(&mut b.events).await;

    b.sim
        .send(VirtualAmpCommand::Inject(b"power=unexpected$".to_vec()))
        .await
        .unwrap();

    wait_for(&mut b.events, |e| {
        matches!(e, DeviceEvent::DataOut { data } if data == b"power?")
    })
    .await;

    // The virtual amplifier answers the re-query with its real state
    let snap = wait_for_state(&mut b.events, |s| s.power.is_some()).await;
    assert_eq!(snap.power, Some(PowerState::Standby));
}

#[tokio::test]
async fn test_requery_budget_resets_on_clean_value() {
    let mut config = DeviceConfig::new("sim");
    config.max_requeries = Some(1);
    let mut b = bench_with(config);
    wait_for_handshake(&mut b.events).await;

    b.sim
        .send(VirtualAmpCommand::Inject(b"mute=maybe$".to_vec()))
        .await
        .unwrap();
    wait_for(&mut b.events, |e| {
        matches!(e, DeviceEvent::DataOut { data } if data == b"mute?")
    })
    .await;
    wait_for_state(&mut b.events, |s| s.muted == Some(false)).await;

    // A clean value resets the budget
    b.sim
        .send(VirtualAmpCommand::Inject(b"mute=maybe$".to_vec()))
        .await
        .unwrap();
    wait_for(&mut b.events, |e| {
        matches!(e, DeviceEvent::DataOut { data } if data == b"mute?")
    })
    .await;
    wait_for_state(&mut b.events, |s| s.muted == Some(false)).await;

    b.amp.query(Query::Power);
    wait_for(&mut b.events, |e| {
        matches!(e, DeviceEvent::DataOut { data } if data == b"power?")
    })
    .await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_peer_close_keeps_state() {
    let mut b = bench();
    wait_for_handshake(&mut b.events).await;

    b.sim.send(VirtualAmpCommand::Shutdown).await.unwrap();
    let lost = wait_for(&mut b.events, |e| {
        matches!(e, DeviceEvent::ConnectionLost { .. })
    })
    .await;
    assert_eq!(
        lost,
        DeviceEvent::ConnectionLost {
            cause: CloseCause::PeerClosed
        }
    );

    let snap = b.amp.snapshot().await.unwrap();
    assert!(!snap.available);
    assert_eq!(snap.connection, ConnectionState::Disconnected);
    assert_eq!(snap.power, Some(PowerState::Standby));
    assert_eq!(snap.model.as_deref(), Some("A14"));

    // Writes without a connection are dropped quietly
    b.amp.turn_on();
    let events = drain_for(&mut b.events, Duration::from_millis(100)).await;
    assert!(events.is_empty());
    assert!(b.amp.is_running());
}

#[tokio::test]
async fn test_local_close_and_shutdown() {
    let mut b = bench();
    wait_for_handshake(&mut b.events).await;

    b.amp.close();
    let lost = wait_for(&mut b.events, |e| {
        matches!(e, DeviceEvent::ConnectionLost { .. })
    })
    .await;
    assert_eq!(
        lost,
        DeviceEvent::ConnectionLost {
            cause: CloseCause::Local
        }
    );
    assert!(b.amp.is_running());

    b.amp.shutdown();
    tokio::time::timeout(TIMEOUT, async {
        while b.amp.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(b.amp.snapshot().await.is_none());
}

// ============================================================================
// TCP
// ============================================================================

#[tokio::test]
async fn test_tcp_session_against_simulator() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (sim_tx, sim_rx) = mpsc::channel(8);
    let (state_tx, mut sim_state) = broadcast::channel(32);
    let server = tokio::spawn(serve(
        listener,
        VirtualAmplifier::new("tcp", "RA-1572"),
        sim_rx,
        state_tx,
    ));

    let mut config = DeviceConfig::new("127.0.0.1");
    config.port = port;
    let (amp, mut events) = AmplifierHandle::connect(&config).await.unwrap();

    let snap = wait_for_handshake(&mut events).await;
    assert_eq!(snap.model.as_deref(), Some("RA-1572"));

    amp.turn_on();
    amp.select_source("Bluetooth");
    let snap = wait_for_state(&mut events, |s| s.source.as_deref() == Some("Bluetooth")).await;
    assert_eq!(snap.power, Some(PowerState::On));

    let sim_snapshot = tokio::time::timeout(TIMEOUT, async {
        loop {
            let state = sim_state.recv().await.unwrap();
            if state.source == "bluetooth" {
                return state;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(sim_snapshot.power, PowerState::On);

    amp.shutdown();
    sim_tx.send(VirtualAmpCommand::Shutdown).await.unwrap();
    tokio::time::timeout(TIMEOUT, server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = DeviceConfig::new("127.0.0.1");
    config.port = port;
    let result = AmplifierHandle::connect(&config).await;
    assert!(matches!(result, Err(ClientError::Connect { .. })));
}
