//! btleplug-backed BLE transport
//!
//! Real central implementation of [`BleTransport`]: scans for the
//! adapter by advertised name, connects, resolves the vendor UART
//! service by trying hint sets in order, and forwards notification
//! payloads into the session's event channel.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::adapter::UartProfile;
use super::error::ObdError;
use super::transport::BleTransport;

/// Buffered notification payloads before backpressure kicks in.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 32;

/// BLE central driving a single OBD adapter peripheral.
pub struct BlePeripheralTransport {
    central: Adapter,
    peripheral: Option<Peripheral>,
    write_char: Option<Characteristic>,
    write_type: WriteType,
}

impl BlePeripheralTransport {
    /// Create a transport on the host's first Bluetooth adapter.
    pub async fn new() -> Result<Self, ObdError> {
        let manager = Manager::new().await?;
        let central = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(ObdError::NoBleAdapter)?;
        Ok(Self {
            central,
            peripheral: None,
            write_char: None,
            write_type: WriteType::WithoutResponse,
        })
    }

    /// Pick a write/notify pair from one hint set, preferring the hinted
    /// UUIDs but accepting any characteristic in the hinted service with
    /// the right capability.
    fn resolve_pair(
        characteristics: &[Characteristic],
        candidate: &UartProfile,
    ) -> Option<(Characteristic, Characteristic)> {
        let in_service: Vec<&Characteristic> = characteristics
            .iter()
            .filter(|c| c.service_uuid == candidate.service)
            .collect();
        if in_service.is_empty() {
            return None;
        }

        let writable =
            |c: &Characteristic| c.properties.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE);
        let notifying =
            |c: &Characteristic| c.properties.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE);

        let write = in_service
            .iter()
            .find(|c| c.uuid == candidate.write && writable(c))
            .or_else(|| in_service.iter().find(|c| writable(c)))?;
        let notify = in_service
            .iter()
            .find(|c| c.uuid == candidate.notify && notifying(c))
            .or_else(|| in_service.iter().find(|c| notifying(c)))?;

        Some(((*write).clone(), (*notify).clone()))
    }
}

#[async_trait]
impl BleTransport for BlePeripheralTransport {
    async fn find_adapter(&mut self, name_fragment: &str) -> Result<(), ObdError> {
        let fragment = name_fragment.to_ascii_uppercase();
        let mut events = self.central.events().await?;
        self.central.start_scan(ScanFilter::default()).await?;
        info!(fragment = %name_fragment, "scanning for OBD adapter");

        while let Some(event) = events.next().await {
            let id = match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
                _ => continue,
            };
            let peripheral = match self.central.peripheral(&id).await {
                Ok(p) => p,
                Err(e) => {
                    debug!(error = %e, "discovered peripheral vanished");
                    continue;
                }
            };
            let name = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .and_then(|props| props.local_name);
            let Some(name) = name else { continue };
            if name.to_ascii_uppercase().contains(&fragment) {
                info!(%name, "matching adapter discovered");
                if let Err(e) = self.central.stop_scan().await {
                    warn!(error = %e, "failed to stop scan");
                }
                self.peripheral = Some(peripheral);
                return Ok(());
            }
            debug!(%name, "ignoring non-matching peripheral");
        }

        // Event stream ended without a match; treat like a failed scan.
        let _ = self.central.stop_scan().await;
        Err(ObdError::ScanTimeout)
    }

    async fn stop_scan(&mut self) -> Result<(), ObdError> {
        self.central.stop_scan().await?;
        Ok(())
    }

    async fn connect(&mut self) -> Result<(), ObdError> {
        let peripheral = self.peripheral.as_ref().ok_or(ObdError::NotConnected)?;
        peripheral.connect().await?;
        info!("connected to adapter");
        Ok(())
    }

    async fn open_channel(
        &mut self,
        candidates: &[UartProfile],
    ) -> Result<mpsc::Receiver<Vec<u8>>, ObdError> {
        let peripheral = self.peripheral.as_ref().ok_or(ObdError::NotConnected)?;
        peripheral.discover_services().await?;
        let characteristics: Vec<Characteristic> =
            peripheral.characteristics().into_iter().collect();

        let (write, notify) = candidates
            .iter()
            .find_map(|candidate| Self::resolve_pair(&characteristics, candidate))
            .ok_or(ObdError::CharacteristicNotFound)?;

        info!(
            service = %write.service_uuid,
            write = %write.uuid,
            notify = %notify.uuid,
            "UART channel resolved"
        );

        self.write_type = if write
            .properties
            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
        {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };

        peripheral.subscribe(&notify).await?;
        let mut notifications = peripheral.notifications().await?;
        let notify_uuid = notify.uuid;
        let (tx, rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != notify_uuid {
                    continue;
                }
                if tx.send(notification.value).await.is_err() {
                    // session gone, stop forwarding
                    break;
                }
            }
            debug!("notification stream ended");
        });

        self.write_char = Some(write);
        Ok(rx)
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), ObdError> {
        let peripheral = self.peripheral.as_ref().ok_or(ObdError::NotConnected)?;
        let write_char = self.write_char.as_ref().ok_or(ObdError::NotConnected)?;
        peripheral.write(write_char, payload, self.write_type).await?;
        Ok(())
    }
}
