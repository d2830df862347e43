//! Session controller: connection lifecycle, characteristic selection,
//! heartbeat ownership and notification dispatch.

use std::sync::Arc;
use std::time::Duration;

use fanlight_protocol::{
    build_poll, build_raw_control, from_hex, parse_notification, to_hex, FormatError, Frame,
    LightMode, ParsedFrame,
};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::error::{SessionError, TransportError};
use crate::heartbeat::Heartbeat;
use crate::log::{EventLog, LogEntry};
use crate::selection::{select_characteristics, CharacteristicSelection};
use crate::settings::{DeviceSettings, SessionConfig};
use crate::state::SessionState;
use crate::transport::{
    CharacteristicRef, DiscoveredPeripheral, PeripheralId, Transport, TransportEvent,
};

/// Broadcast channel capacity for session events
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Activity surfaced to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Status(String),
    PeripheralDiscovered(DiscoveredPeripheral),
    Notification {
        hex: String,
        frame: Option<ParsedFrame>,
    },
}

/// Owns one connection attempt at a time and everything scoped to it
pub struct SessionController {
    transport: Arc<dyn Transport>,
    transport_events: broadcast::Receiver<TransportEvent>,
    config: SessionConfig,
    state: SessionState,
    status: String,
    peripherals: Vec<DiscoveredPeripheral>,
    connected: Option<PeripheralId>,
    selection: CharacteristicSelection,
    settings: DeviceSettings,
    heartbeat: Option<Heartbeat>,
    gate: watch::Sender<Option<CharacteristicRef>>,
    log: EventLog,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        let transport_events = transport.subscribe();
        let (gate, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            transport_events,
            config,
            state: SessionState::Disconnected,
            status: "idle".to_string(),
            peripherals: Vec::new(),
            connected: None,
            selection: CharacteristicSelection::default(),
            settings: DeviceSettings::default(),
            heartbeat: None,
            gate,
            log: EventLog::new(),
            events,
        }
    }

    // =========================================================================
    // Observer surface
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn peripherals(&self) -> &[DiscoveredPeripheral] {
        &self.peripherals
    }

    pub fn connected_peripheral(&self) -> Option<&PeripheralId> {
        self.connected.as_ref()
    }

    pub fn selection(&self) -> &CharacteristicSelection {
        &self.selection
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    pub fn log(&self) -> Vec<LogEntry> {
        self.log.snapshot()
    }

    /// True while a heartbeat task is alive
    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// First discovered peripheral whose name or id contains `query` (case-insensitive)
    pub fn find_peripheral(&self, query: &str) -> Option<&DiscoveredPeripheral> {
        let query = query.to_lowercase();
        self.peripherals.iter().find(|p| {
            p.id.0.to_lowercase().contains(&query)
                || p.name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&query))
        })
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("Session state {} -> {}", self.state, state);
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        info!("{}", self.status);
        self.log.info(self.status.clone());
        self.emit(SessionEvent::Status(self.status.clone()));
    }

    fn require_idle(&self, operation: &'static str) -> Result<(), SessionError> {
        if self.state == SessionState::Disconnected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    pub async fn start_scan(&mut self) -> Result<(), SessionError> {
        self.require_idle("scan")?;
        self.peripherals.clear();
        if let Err(e) = self.transport.start_scan().await {
            self.log.error(format!("scan: {e}"));
            self.set_status(format!("Scan failed: {e}"));
            return Err(e.into());
        }
        self.set_state(SessionState::Scanning);
        self.set_status("Scanning");
        Ok(())
    }

    /// Stop an active scan. No-op in any other state.
    pub async fn stop_scan(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Scanning {
            return Ok(());
        }
        let result = self.transport.stop_scan().await;
        self.set_state(SessionState::Disconnected);
        match result {
            Ok(()) => {
                self.set_status(format!("Scan stopped, {} found", self.peripherals.len()));
                Ok(())
            }
            Err(e) => {
                self.log.error(format!("stop scan: {e}"));
                Err(e.into())
            }
        }
    }

    /// Scan for `duration`, processing discoveries, then stop
    pub async fn scan(
        &mut self,
        duration: Duration,
    ) -> Result<&[DiscoveredPeripheral], SessionError> {
        self.start_scan().await?;
        let deadline = tokio::time::Instant::now() + duration;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.next_event()).await {
            self.handle_event(event).await;
        }
        self.stop_scan().await?;
        Ok(&self.peripherals)
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    pub async fn connect(&mut self, peripheral: &PeripheralId) -> Result<(), SessionError> {
        self.require_idle("connect")?;
        // Events queued from an earlier link must not reach this one
        self.transport_events = self.transport.subscribe();
        self.set_state(SessionState::Connecting);
        self.set_status(format!("Connecting to {peripheral}"));

        let timeout = self.config.connect_timeout;
        let attempt = self.transport.connect(peripheral, timeout);
        let connected = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        };
        if let Err(e) = connected {
            return Err(self.fail_connect(e));
        }
        self.connected = Some(peripheral.clone());

        let services = match self.transport.discover_services(peripheral).await {
            Ok(services) => services,
            Err(e) => {
                if let Err(de) = self.transport.disconnect(peripheral).await {
                    debug!("Disconnect after failed discovery: {}", de);
                }
                return Err(self.fail_connect(e));
            }
        };
        debug!("Discovered {} services", services.len());

        self.selection = select_characteristics(&services, &self.config.service_tags);
        self.set_state(SessionState::Connected);

        let mut caveats = Vec::new();
        if let Some(notify) = self.selection.notify.clone() {
            match self.transport.set_notify(&notify, true).await {
                Ok(()) => self.log.info(format!("notifications on {}", notify.uuid)),
                Err(e) => {
                    warn!("Enabling notifications on {} failed: {}", notify.uuid, e);
                    self.log.error(format!("notify: {e}"));
                    caveats.push(format!("notifications unavailable: {e}"));
                }
            }
        }

        match self.selection.write.clone() {
            Some(write) => {
                self.log.info(format!("write via {}", write.uuid));
                self.gate.send_replace(Some(write));
                self.heartbeat = Some(Heartbeat::spawn(
                    Arc::clone(&self.transport),
                    self.gate.subscribe(),
                    self.config.heartbeat_period,
                    self.log.clone(),
                ));
            }
            None => {
                error!("No writable characteristic on {}", peripheral);
                self.log.error("no write characteristic");
                caveats.push("no write characteristic".to_string());
            }
        }

        if caveats.is_empty() {
            self.set_status(format!("Connected to {peripheral}"));
        } else {
            self.set_status(format!("Connected to {peripheral} ({})", caveats.join("; ")));
        }
        Ok(())
    }

    /// Surface a failed connect attempt, then return to `Disconnected`
    fn fail_connect(&mut self, e: TransportError) -> SessionError {
        self.set_state(SessionState::Error);
        self.log.error(format!("connect: {e}"));
        self.set_status(format!("Connect failed: {e}"));
        self.reset();
        e.into()
    }

    /// Explicit disconnect. Always ends in `Disconnected`.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Scanning {
            return self.stop_scan().await;
        }
        let result = match self.connected.clone() {
            Some(peripheral) => self.transport.disconnect(&peripheral).await,
            None => Ok(()),
        };
        if let Err(e) = &result {
            warn!("Disconnect failed: {}", e);
            self.log.error(format!("disconnect: {e}"));
        }
        let was_connected = self.connected.is_some();
        self.reset();
        if was_connected {
            self.set_status("Disconnected");
        }
        result.map_err(Into::into)
    }

    /// Drop everything scoped to the current connection. Idempotent.
    pub fn reset(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        self.gate.send_replace(None);
        self.selection = CharacteristicSelection::default();
        self.connected = None;
        self.set_state(SessionState::Disconnected);
    }

    // =========================================================================
    // Transport events
    // =========================================================================

    /// Wait for the next transport event. Cancel-safe.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.transport_events.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} transport events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeripheralDiscovered(peripheral) => {
                if self.state != SessionState::Scanning {
                    return;
                }
                match self.peripherals.iter_mut().find(|p| p.id == peripheral.id) {
                    Some(known) => {
                        if peripheral.name.is_some() {
                            known.name = peripheral.name.clone();
                        }
                        known.rssi = peripheral.rssi.or(known.rssi);
                    }
                    None => {
                        debug!("Discovered {} ({})", peripheral.id, peripheral.display_name());
                        self.peripherals.push(peripheral.clone());
                        self.emit(SessionEvent::PeripheralDiscovered(peripheral));
                    }
                }
            }
            TransportEvent::ConnectionChanged {
                peripheral,
                connected: false,
            } => {
                if self.connected.as_ref() == Some(&peripheral) {
                    warn!("Link to {} lost", peripheral);
                    self.log.error(format!("link lost: {peripheral}"));
                    self.reset();
                    self.set_status("Disconnected (link lost)");
                }
            }
            TransportEvent::ConnectionChanged {
                peripheral,
                connected: true,
            } => {
                debug!("Transport reports {} connected", peripheral);
            }
            TransportEvent::Notification {
                characteristic,
                value,
            } => {
                let hex = to_hex(&value);
                let frame = parse_notification(&value);
                match &frame {
                    Some(f) => {
                        debug!(
                            "Notification on {}: cmd=0x{:02X} len={}",
                            characteristic, f.command, f.length
                        );
                        self.log
                            .receive(format!("{hex} (cmd 0x{:02x}, len {})", f.command, f.length));
                    }
                    None => {
                        debug!("Unparsed notification on {}: {}", characteristic, hex);
                        self.log.receive(hex.clone());
                    }
                }
                self.emit(SessionEvent::Notification { hex, frame });
            }
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    async fn write_frame(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        let Some(characteristic) = self.selection.write.clone() else {
            warn!("Send dropped: no write characteristic");
            self.log.error("send: no write characteristic");
            return Err(SessionError::NoWriteCharacteristic);
        };
        let hex = to_hex(bytes);
        let without_response = characteristic.props.write_without_response;
        match self
            .transport
            .write(&characteristic, bytes, without_response)
            .await
        {
            Ok(()) => {
                debug!("TX {}", hex);
                self.log.send(hex);
                Ok(())
            }
            Err(e) => {
                self.log.error(format!("write {hex}: {e}"));
                self.set_status(format!("Write failed: {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn send_poll(&mut self) -> Result<(), SessionError> {
        self.write_frame(build_poll().as_bytes()).await
    }

    /// Legacy power toggle with the remembered fan speed and daylight
    pub async fn set_power(&mut self, on: bool) -> Result<(), SessionError> {
        let frame = self.settings.power_frame(on);
        self.write_frame(frame.as_bytes()).await
    }

    pub async fn set_fan(&mut self, on: bool) -> Result<(), SessionError> {
        let frame = self.settings.fan_frame(on);
        self.write_frame(frame.as_bytes()).await
    }

    pub async fn set_light(&mut self, on: bool) -> Result<(), SessionError> {
        let frame = self.settings.light_frame(on);
        self.write_frame(frame.as_bytes()).await
    }

    /// Fan speed in percent; turns the fan on
    pub async fn set_speed(&mut self, percent: u32) -> Result<(), SessionError> {
        let next = DeviceSettings {
            speed: percent.min(100),
            ..self.settings
        };
        let frame = next.fan_frame(true);
        self.commit(next, &frame).await
    }

    /// Light intensity in percent; turns the light on
    pub async fn set_brightness(&mut self, percent: u32) -> Result<(), SessionError> {
        let next = DeviceSettings {
            intensity: percent.min(100),
            ..self.settings
        };
        let frame = next.light_frame(true);
        self.commit(next, &frame).await
    }

    /// Static white at the given daylight temperature
    pub async fn set_white(&mut self, kelvin: u32) -> Result<(), SessionError> {
        let next = DeviceSettings {
            light_mode: LightMode::White,
            kelvin,
            ..self.settings
        };
        let frame = next.light_frame(true);
        self.commit(next, &frame).await
    }

    /// Animated effect, optionally changing the effect frequency
    pub async fn set_effect(
        &mut self,
        mode: LightMode,
        frequency: Option<u8>,
    ) -> Result<(), SessionError> {
        let mut next = DeviceSettings {
            light_mode: mode,
            ..self.settings
        };
        if let Some(frequency) = frequency {
            next.frequency = fanlight_protocol::mapping::clamp_frequency(frequency);
        }
        let frame = next.light_frame(true);
        self.commit(next, &frame).await
    }

    /// Write `frame`; remember `next` only if the write went out
    async fn commit(&mut self, next: DeviceSettings, frame: &Frame) -> Result<(), SessionError> {
        self.write_frame(frame.as_bytes()).await?;
        self.settings = next;
        Ok(())
    }

    pub async fn send_raw_control(
        &mut self,
        enabled: bool,
        mode: u8,
        sub_mode: u8,
        param: u8,
        value1: u16,
        value2: u32,
    ) -> Result<(), SessionError> {
        let frame = build_raw_control(enabled, mode, sub_mode, param, value1, value2);
        self.write_frame(frame.as_bytes()).await
    }

    /// Send operator-supplied hex verbatim. Whitespace is ignored.
    pub async fn send_raw_hex(&mut self, input: &str) -> Result<(), SessionError> {
        let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(FormatError::Empty.into());
        }
        let bytes = from_hex(&compact)?;
        self.write_frame(&bytes).await
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.reset();
    }
}
