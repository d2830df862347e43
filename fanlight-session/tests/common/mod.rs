//! In-memory transport for driving the session controller in tests.

#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use fanlight_session::{
    bluetooth_uuid, CharProps, CharacteristicRef, DiscoveredPeripheral, PeripheralId, Service,
    Transport, TransportError, TransportEvent,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const PERIPHERAL: &str = "C0:FF:EE:00:00:01";

/// A write observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub characteristic: Uuid,
    pub bytes: Vec<u8>,
    pub without_response: bool,
}

#[derive(Default)]
struct Inner {
    services: Vec<Service>,
    writes: Vec<Write>,
    notify: Vec<Uuid>,
    disconnects: Vec<PeripheralId>,
    scanning: bool,
    connect_error: Option<TransportError>,
    connect_delay: Option<Duration>,
    discovery_error: Option<TransportError>,
    write_error: Option<TransportError>,
    notify_error: Option<TransportError>,
}

pub struct MockTransport {
    events: broadcast::Sender<TransportEvent>,
    inner: Mutex<Inner>,
}

impl MockTransport {
    pub fn new(services: Vec<Service>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            inner: Mutex::new(Inner {
                services,
                ..Default::default()
            }),
        }
    }

    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn fail_connect(&self, error: TransportError) {
        self.inner.lock().connect_error = Some(error);
    }

    pub fn delay_connect(&self, delay: Duration) {
        self.inner.lock().connect_delay = Some(delay);
    }

    pub fn fail_discovery(&self, error: TransportError) {
        self.inner.lock().discovery_error = Some(error);
    }

    pub fn fail_writes(&self, error: TransportError) {
        self.inner.lock().write_error = Some(error);
    }

    pub fn fail_notify(&self, error: TransportError) {
        self.inner.lock().notify_error = Some(error);
    }

    pub fn writes(&self) -> Vec<Write> {
        self.inner.lock().writes.clone()
    }

    pub fn notify_enabled(&self) -> Vec<Uuid> {
        self.inner.lock().notify.clone()
    }

    pub fn disconnects(&self) -> Vec<PeripheralId> {
        self.inner.lock().disconnects.clone()
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.lock().scanning
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start_scan(&self) -> Result<(), TransportError> {
        self.inner.lock().scanning = true;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.inner.lock().scanning = false;
        Ok(())
    }

    async fn connect(
        &self,
        _peripheral: &PeripheralId,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let (delay, error) = {
            let inner = self.inner.lock();
            (inner.connect_delay, inner.connect_error.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn discover_services(
        &self,
        _peripheral: &PeripheralId,
    ) -> Result<Vec<Service>, TransportError> {
        let inner = self.inner.lock();
        match &inner.discovery_error {
            Some(e) => Err(e.clone()),
            None => Ok(inner.services.clone()),
        }
    }

    async fn write(
        &self,
        characteristic: &CharacteristicRef,
        bytes: &[u8],
        without_response: bool,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if let Some(e) = &inner.write_error {
            return Err(e.clone());
        }
        inner.writes.push(Write {
            characteristic: characteristic.uuid,
            bytes: bytes.to_vec(),
            without_response,
        });
        Ok(())
    }

    async fn set_notify(
        &self,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if let Some(e) = &inner.notify_error {
            return Err(e.clone());
        }
        if enabled {
            inner.notify.push(characteristic.uuid);
        } else {
            inner.notify.retain(|u| *u != characteristic.uuid);
        }
        Ok(())
    }

    async fn disconnect(&self, peripheral: &PeripheralId) -> Result<(), TransportError> {
        self.inner.lock().disconnects.push(peripheral.clone());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

pub const WRITE: CharProps = CharProps {
    read: false,
    write: true,
    write_without_response: false,
    notify: false,
    indicate: false,
};

pub const WRITE_NR: CharProps = CharProps {
    read: false,
    write: true,
    write_without_response: true,
    notify: false,
    indicate: false,
};

pub const NOTIFY: CharProps = CharProps {
    read: true,
    write: false,
    write_without_response: false,
    notify: true,
    indicate: false,
};

pub fn service(short: u16, characteristics: &[(u16, CharProps)]) -> Service {
    let uuid = bluetooth_uuid(short);
    Service {
        uuid,
        characteristics: characteristics
            .iter()
            .map(|&(c, props)| CharacteristicRef {
                peripheral: PeripheralId::from(PERIPHERAL),
                service: uuid,
                uuid: bluetooth_uuid(c),
                props,
            })
            .collect(),
    }
}

/// Layout seen on the appliance: generic access, a vendor service with a
/// writable characteristic, the notify service and the primary write service
pub fn appliance_services() -> Vec<Service> {
    vec![
        service(0x1800, &[(0x2A00, WRITE)]),
        service(0xFFF0, &[(0xFFF2, WRITE)]),
        service(0xFFE0, &[(0xFFE4, NOTIFY)]),
        service(0xFFE5, &[(0xFFE9, WRITE_NR)]),
    ]
}

pub fn discovered(id: &str, name: Option<&str>, rssi: i16) -> DiscoveredPeripheral {
    DiscoveredPeripheral {
        id: PeripheralId::from(id),
        name: name.map(str::to_string),
        rssi: Some(rssi),
    }
}
