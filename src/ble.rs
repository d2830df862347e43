//! btleplug binding of the session [`Transport`] contract
//!
//! Peripherals are keyed by their Bluetooth address string. Central events
//! (discoveries, connection changes) and the connected peripheral's
//! notification stream are forwarded onto one broadcast channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central as _, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId as BtPeripheralId};
use fanlight_session::{
    CharProps, CharacteristicRef, DiscoveredPeripheral, PeripheralId, Service, Transport,
    TransportError, TransportEvent,
};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Broadcast channel capacity for transport events
const EVENT_CHANNEL_CAPACITY: usize = 256;

type PeripheralMap = Arc<Mutex<HashMap<String, Peripheral>>>;

fn backend(e: btleplug::Error) -> TransportError {
    TransportError::Backend(e.to_string())
}

fn char_props(flags: CharPropFlags) -> CharProps {
    CharProps {
        read: flags.contains(CharPropFlags::READ),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

/// BLE transport on the first system adapter
pub struct BleTransport {
    adapter: Adapter,
    peripherals: PeripheralMap,
    events: broadcast::Sender<TransportEvent>,
    central_task: JoinHandle<()>,
    notification_task: Mutex<Option<JoinHandle<()>>>,
}

impl BleTransport {
    /// Open the first Bluetooth adapter and start forwarding its events
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await.map_err(backend)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(backend)?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;
        if let Ok(info) = adapter.adapter_info().await {
            info!("Using Bluetooth adapter {}", info);
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let peripherals: PeripheralMap = Arc::default();
        let central_events = adapter.events().await.map_err(backend)?;
        let central_task = tokio::spawn(forward_central_events(
            adapter.clone(),
            central_events,
            Arc::clone(&peripherals),
            events.clone(),
        ));

        Ok(Self {
            adapter,
            peripherals,
            events,
            central_task,
            notification_task: Mutex::new(None),
        })
    }

    fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral, TransportError> {
        self.peripherals
            .lock()
            .get(&id.0)
            .cloned()
            .ok_or_else(|| TransportError::PeripheralNotFound(id.0.clone()))
    }

    fn characteristic(
        &self,
        characteristic: &CharacteristicRef,
    ) -> Result<(Peripheral, Characteristic), TransportError> {
        let peripheral = self.peripheral(&characteristic.peripheral)?;
        let found = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic.uuid && c.service_uuid == characteristic.service)
            .ok_or_else(|| {
                TransportError::CharacteristicNotFound(characteristic.uuid.to_string())
            })?;
        Ok((peripheral, found))
    }

    fn stop_notifications(&self) {
        if let Some(task) = self.notification_task.lock().take() {
            task.abort();
        }
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.central_task.abort();
        self.stop_notifications();
    }
}

async fn lookup_address(adapter: &Adapter, id: &BtPeripheralId) -> Option<(String, Peripheral)> {
    match adapter.peripheral(id).await {
        Ok(p) => Some((p.address().to_string(), p)),
        Err(e) => {
            trace!("Peripheral {:?} vanished: {}", id, e);
            None
        }
    }
}

async fn forward_central_events(
    adapter: Adapter,
    mut central_events: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
    peripherals: PeripheralMap,
    tx: broadcast::Sender<TransportEvent>,
) {
    while let Some(event) = central_events.next().await {
        match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                let Some((address, peripheral)) = lookup_address(&adapter, &id).await else {
                    continue;
                };
                let props = peripheral.properties().await.ok().flatten();
                peripherals.lock().insert(address.clone(), peripheral);
                let discovered = DiscoveredPeripheral {
                    id: PeripheralId(address),
                    name: props.as_ref().and_then(|p| p.local_name.clone()),
                    rssi: props.as_ref().and_then(|p| p.rssi),
                };
                let _ = tx.send(TransportEvent::PeripheralDiscovered(discovered));
            }
            CentralEvent::DeviceConnected(id) => {
                if let Some((address, _)) = lookup_address(&adapter, &id).await {
                    let _ = tx.send(TransportEvent::ConnectionChanged {
                        peripheral: PeripheralId(address),
                        connected: true,
                    });
                }
            }
            CentralEvent::DeviceDisconnected(id) => {
                if let Some((address, _)) = lookup_address(&adapter, &id).await {
                    debug!("{} disconnected", address);
                    let _ = tx.send(TransportEvent::ConnectionChanged {
                        peripheral: PeripheralId(address),
                        connected: false,
                    });
                }
            }
            _ => {}
        }
    }
    debug!("Central event stream ended");
}

#[async_trait]
impl Transport for BleTransport {
    async fn start_scan(&self) -> Result<(), TransportError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(backend)
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.adapter.stop_scan().await.map_err(backend)
    }

    async fn connect(&self, id: &PeripheralId, timeout: Duration) -> Result<(), TransportError> {
        let peripheral = self.peripheral(id)?;
        match tokio::time::timeout(timeout, peripheral.connect()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(TransportError::Connect(e.to_string())),
            Err(_) => return Err(TransportError::Timeout),
        }

        let mut notifications = peripheral.notifications().await.map_err(backend)?;
        let tx = self.events.clone();
        let task = tokio::spawn(async move {
            while let Some(n) = notifications.next().await {
                let _ = tx.send(TransportEvent::Notification {
                    characteristic: n.uuid,
                    value: n.value,
                });
            }
        });
        if let Some(old) = self.notification_task.lock().replace(task) {
            old.abort();
        }
        Ok(())
    }

    async fn discover_services(&self, id: &PeripheralId) -> Result<Vec<Service>, TransportError> {
        let peripheral = self.peripheral(id)?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| TransportError::Discovery(e.to_string()))?;

        let services = peripheral
            .services()
            .into_iter()
            .map(|s| Service {
                uuid: s.uuid,
                characteristics: s
                    .characteristics
                    .into_iter()
                    .map(|c| CharacteristicRef {
                        peripheral: id.clone(),
                        service: c.service_uuid,
                        uuid: c.uuid,
                        props: char_props(c.properties),
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();
        for service in &services {
            debug!("Service {}", service.uuid);
            for c in &service.characteristics {
                debug!("  {} [{}]", c.uuid, c.props);
            }
        }
        Ok(services)
    }

    async fn write(
        &self,
        characteristic: &CharacteristicRef,
        bytes: &[u8],
        without_response: bool,
    ) -> Result<(), TransportError> {
        let (peripheral, found) = self.characteristic(characteristic)?;
        let write_type = if without_response {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };
        peripheral
            .write(&found, bytes, write_type)
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }

    async fn set_notify(
        &self,
        characteristic: &CharacteristicRef,
        enabled: bool,
    ) -> Result<(), TransportError> {
        let (peripheral, found) = self.characteristic(characteristic)?;
        let result = if enabled {
            peripheral.subscribe(&found).await
        } else {
            peripheral.unsubscribe(&found).await
        };
        result.map_err(|e| TransportError::Notify(e.to_string()))
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        self.stop_notifications();
        let peripheral = self.peripheral(id)?;
        if let Err(e) = peripheral.disconnect().await {
            warn!("Disconnect from {} failed: {}", id, e);
            return Err(backend(e));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
