//! Session lifecycle against an in-memory transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{appliance_services, discovered, service, MockTransport, NOTIFY, PERIPHERAL, WRITE};
use fanlight_protocol::{build_poll, to_hex, CommandType, FormatError, LightMode};
use fanlight_session::{
    bluetooth_uuid, EventLog, Heartbeat, PeripheralId, SessionConfig, SessionController,
    SessionError, SessionEvent, SessionState, Transport, TransportError, TransportEvent,
};
use tokio::sync::watch;

fn controller(transport: &Arc<MockTransport>) -> SessionController {
    SessionController::new(transport.clone(), SessionConfig::default())
}

fn peripheral() -> PeripheralId {
    PeripheralId::from(PERIPHERAL)
}

fn poll_count(transport: &MockTransport) -> usize {
    let poll = build_poll().into_bytes();
    transport.writes().iter().filter(|w| w.bytes == poll).count()
}

async fn pump_one(session: &mut SessionController) {
    let event = session.next_event().await.expect("transport event");
    session.handle_event(event).await;
}

#[tokio::test(start_paused = true)]
async fn connect_prefers_primary_write_service() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);

    session.connect(&peripheral()).await.unwrap();

    assert_eq!(session.state(), SessionState::Connected);
    let selection = session.selection();
    assert_eq!(selection.write.as_ref().unwrap().uuid, bluetooth_uuid(0xFFE9));
    assert_eq!(selection.notify.as_ref().unwrap().uuid, bluetooth_uuid(0xFFE4));
    assert_eq!(transport.notify_enabled(), vec![bluetooth_uuid(0xFFE4)]);
    assert!(session.heartbeat_running());
}

#[tokio::test(start_paused = true)]
async fn heartbeat_polls_every_second() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(poll_count(&transport), 0);

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(poll_count(&transport), 3);

    let write = &transport.writes()[0];
    assert_eq!(write.characteristic, bluetooth_uuid(0xFFE9));
    assert!(write.without_response);
}

#[tokio::test(start_paused = true)]
async fn explicit_disconnect_resets_session() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    session.disconnect().await.unwrap();

    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.selection().is_empty());
    assert!(!session.heartbeat_running());
    assert_eq!(transport.disconnects(), vec![peripheral()]);

    let polls = poll_count(&transport);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(poll_count(&transport), polls);

    // Idempotent
    session.disconnect().await.unwrap();
    session.reset();
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn link_loss_resets_session() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();

    transport.emit(TransportEvent::ConnectionChanged {
        peripheral: peripheral(),
        connected: false,
    });
    pump_one(&mut session).await;

    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.selection().is_empty());
    assert!(!session.heartbeat_running());
    assert!(session.connected_peripheral().is_none());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(poll_count(&transport), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_ignores_disconnect_from_previous_link() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();
    session.disconnect().await.unwrap();

    // Backend reports the explicit disconnect after the fact
    transport.emit(TransportEvent::ConnectionChanged {
        peripheral: peripheral(),
        connected: false,
    });
    session.connect(&peripheral()).await.unwrap();

    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_millis(100), session.next_event()).await
    {
        session.handle_event(event).await;
    }

    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.heartbeat_running());
    assert_eq!(session.connected_peripheral(), Some(&peripheral()));
}

#[tokio::test(start_paused = true)]
async fn link_loss_of_other_peripheral_is_ignored() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();

    transport.emit(TransportEvent::ConnectionChanged {
        peripheral: PeripheralId::from("00:00:00:00:00:00"),
        connected: false,
    });
    pump_one(&mut session).await;

    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.heartbeat_running());
}

#[tokio::test(start_paused = true)]
async fn dropping_controller_stops_heartbeat() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(poll_count(&transport), 1);

    drop(session);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(poll_count(&transport), 1);
}

#[tokio::test(start_paused = true)]
async fn stopped_heartbeat_sends_nothing_while_gate_is_open() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let write = service(0xFFE5, &[(0xFFE9, WRITE)]).characteristics[0].clone();
    let (_gate, gate_rx) = watch::channel(Some(write));
    let backend: Arc<dyn Transport> = transport.clone();

    let heartbeat = Heartbeat::spawn(backend, gate_rx, Duration::from_secs(1), EventLog::new());
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(poll_count(&transport), 1);

    heartbeat.stop();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(poll_count(&transport), 1);
}

#[tokio::test(start_paused = true)]
async fn send_without_write_characteristic_fails() {
    let transport = Arc::new(MockTransport::new(vec![service(0xFFE0, &[(0xFFE4, NOTIFY)])]));
    let mut session = controller(&transport);

    // Disconnected: nothing selected yet
    assert!(matches!(
        session.send_poll().await,
        Err(SessionError::NoWriteCharacteristic)
    ));

    session.connect(&peripheral()).await.unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.selection().write.is_none());
    assert!(!session.heartbeat_running());

    assert!(matches!(
        session.set_power(true).await,
        Err(SessionError::NoWriteCharacteristic)
    ));
    assert!(matches!(
        session.set_brightness(20).await,
        Err(SessionError::NoWriteCharacteristic)
    ));
    assert_eq!(session.state(), SessionState::Connected);
    assert!(transport.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_send_keeps_remembered_settings() {
    let transport = Arc::new(MockTransport::new(vec![service(0xFFE0, &[(0xFFE4, NOTIFY)])]));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();
    let before = *session.settings();

    assert!(session.set_speed(80).await.is_err());
    assert!(session.set_brightness(10).await.is_err());
    assert!(session.set_white(6500).await.is_err());
    assert!(session.set_effect(LightMode::Lightning, Some(3)).await.is_err());

    assert_eq!(*session.settings(), before);
}

#[tokio::test(start_paused = true)]
async fn transport_write_error_keeps_remembered_settings() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();
    session.set_brightness(30).await.unwrap();

    transport.fail_writes(TransportError::Write("gatt busy".into()));
    assert!(session.set_brightness(90).await.is_err());
    assert_eq!(session.settings().intensity, 30);
}

#[tokio::test(start_paused = true)]
async fn notify_failure_is_reported_in_status() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    transport.fail_notify(TransportError::Notify("cccd write rejected".into()));
    let mut session = controller(&transport);

    session.connect(&peripheral()).await.unwrap();

    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.heartbeat_running());
    assert!(
        session.status().contains("notifications unavailable"),
        "status: {}",
        session.status()
    );
}

#[tokio::test(start_paused = true)]
async fn connect_failure_returns_to_disconnected() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    transport.fail_connect(TransportError::Connect("refused".into()));
    let mut session = controller(&transport);
    let mut events = session.subscribe();

    let err = session.connect(&peripheral()).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transport(TransportError::Connect(_))
    ));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.status().starts_with("Connect failed"));

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::StateChanged(state) = event {
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![
            SessionState::Connecting,
            SessionState::Error,
            SessionState::Disconnected
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn connect_times_out() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    transport.delay_connect(Duration::from_secs(60));
    let mut session = controller(&transport);

    let err = session.connect(&peripheral()).await.unwrap_err();
    assert!(matches!(err, SessionError::Transport(TransportError::Timeout)));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn discovery_failure_disconnects() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    transport.fail_discovery(TransportError::Discovery("gatt".into()));
    let mut session = controller(&transport);

    assert!(session.connect(&peripheral()).await.is_err());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(transport.disconnects(), vec![peripheral()]);
    assert!(session.connected_peripheral().is_none());
}

#[tokio::test(start_paused = true)]
async fn scan_collects_peripherals_then_stops() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);

    // Ignored outside a scan
    transport.emit(TransportEvent::PeripheralDiscovered(discovered(
        "AA:AA",
        None,
        -80,
    )));
    pump_one(&mut session).await;
    assert!(session.peripherals().is_empty());

    let emitter = transport.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        emitter.emit(TransportEvent::PeripheralDiscovered(discovered(
            PERIPHERAL,
            Some("FanLight-01"),
            -50,
        )));
        emitter.emit(TransportEvent::PeripheralDiscovered(discovered(
            PERIPHERAL,
            Some("FanLight-01"),
            -45,
        )));
    });

    let found = session.scan(Duration::from_secs(2)).await.unwrap().to_vec();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!transport.is_scanning());

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].rssi, Some(-45));
    assert_eq!(
        session.find_peripheral("fanlight").map(|p| p.id.clone()),
        Some(peripheral())
    );
}

#[tokio::test(start_paused = true)]
async fn scanning_and_connecting_are_exclusive() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);

    session.start_scan().await.unwrap();
    assert!(matches!(
        session.connect(&peripheral()).await,
        Err(SessionError::InvalidState {
            state: SessionState::Scanning,
            ..
        })
    ));
    assert!(matches!(
        session.start_scan().await,
        Err(SessionError::InvalidState { .. })
    ));

    session.stop_scan().await.unwrap();
    session.connect(&peripheral()).await.unwrap();
    assert!(matches!(
        session.start_scan().await,
        Err(SessionError::InvalidState {
            state: SessionState::Connected,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn notifications_are_surfaced() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();
    let mut events = session.subscribe();

    let frame = build_poll().into_bytes();
    transport.emit(TransportEvent::Notification {
        characteristic: bluetooth_uuid(0xFFE4),
        value: frame.clone(),
    });
    pump_one(&mut session).await;

    match events.recv().await.unwrap() {
        SessionEvent::Notification { hex, frame: parsed } => {
            assert_eq!(hex, to_hex(&frame));
            let parsed = parsed.unwrap();
            assert_eq!(parsed.command_type(), Some(CommandType::Poll));
            assert_eq!(parsed.length, 2);
        }
        other => panic!("unexpected event {other:?}"),
    }

    transport.emit(TransportEvent::Notification {
        characteristic: bluetooth_uuid(0xFFE4),
        value: vec![0x01, 0x02],
    });
    pump_one(&mut session).await;
    match events.recv().await.unwrap() {
        SessionEvent::Notification { hex, frame } => {
            assert_eq!(hex, "0102");
            assert!(frame.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }

    let received: Vec<_> = session
        .log()
        .into_iter()
        .filter(|e| e.kind == fanlight_session::LogKind::Receive)
        .collect();
    assert_eq!(received.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_raw_hex_never_reaches_transport() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();

    assert!(matches!(
        session.send_raw_hex("20003").await,
        Err(SessionError::MalformedInput(FormatError::OddLength(5)))
    ));
    assert!(matches!(
        session.send_raw_hex("zz").await,
        Err(SessionError::MalformedInput(FormatError::InvalidCharacter(0)))
    ));
    assert!(matches!(
        session.send_raw_hex("   ").await,
        Err(SessionError::MalformedInput(FormatError::Empty))
    ));
    assert!(transport.writes().is_empty());

    session.send_raw_hex("20 00 3a 26 A2 02 62 fa 26 02 0d 0a").await.unwrap();
    assert_eq!(transport.writes()[0].bytes, build_poll().into_bytes());
}

#[tokio::test(start_paused = true)]
async fn intents_map_to_frames() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();

    session.set_brightness(2).await.unwrap();
    session.set_effect(LightMode::Lightning, Some(12)).await.unwrap();
    session.set_speed(100).await.unwrap();
    session.set_power(false).await.unwrap();

    let writes = transport.writes();
    assert_eq!(
        to_hex(&writes[0].bytes),
        "20003a26a30d62fa0100ff02800cffffffff08c4070d0a"
    );
    // Effect keeps the remembered intensity, frequency clamped
    assert_eq!(&writes[1].bytes[8..12], &[0x01, 0x02, 0x05, 0x02]);
    assert_eq!(writes[1].bytes[17], 10);
    // Raw fan control at full speed
    assert_eq!(&writes[2].bytes[12..14], &[0x19, 0x64]);
    // Legacy power off
    assert_eq!(writes[3].bytes[8], 0x00);
    assert_eq!(&writes[3].bytes[10..12], &[0x15, 0x18]);

    assert_eq!(session.settings().light_mode, LightMode::Lightning);
    assert_eq!(session.settings().frequency, 10);
}

#[tokio::test(start_paused = true)]
async fn write_with_response_when_required() {
    let transport = Arc::new(MockTransport::new(vec![service(0xFFE5, &[(0xFFE9, WRITE)])]));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();

    session.set_light(true).await.unwrap();
    assert!(!transport.writes()[0].without_response);
}

#[tokio::test(start_paused = true)]
async fn write_failure_keeps_connection() {
    let transport = Arc::new(MockTransport::new(appliance_services()));
    let mut session = controller(&transport);
    session.connect(&peripheral()).await.unwrap();
    transport.fail_writes(TransportError::Write("gatt busy".into()));

    assert!(matches!(
        session.set_fan(true).await,
        Err(SessionError::Transport(TransportError::Write(_)))
    ));
    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.status().starts_with("Write failed"));
}
