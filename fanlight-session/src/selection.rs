//! Characteristic selection over an unknown GATT layout
//!
//! The appliance firmware has shipped with several GATT layouts, so the
//! write and notify characteristics are picked by a ranked scan over the
//! discovered services rather than by fixed UUIDs.

use serde::Serialize;
use tracing::debug;

use crate::transport::{short_alias, CharacteristicRef, Service};

/// Generic Access, Generic Attribute, Device Information
pub const HOUSEKEEPING_SERVICES: [u16; 3] = [0x1800, 0x1801, 0x180A];

/// 16-bit service tags the heuristic prefers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceTags {
    /// Preferred service for the write characteristic
    pub write_service: u16,
    /// Service usually carrying the notify characteristic
    pub notify_service: u16,
    /// Secondary vendor service
    pub vendor_service: u16,
}

impl Default for ServiceTags {
    fn default() -> Self {
        Self {
            write_service: 0xFFE5,
            notify_service: 0xFFE0,
            vendor_service: 0xFFF0,
        }
    }
}

impl ServiceTags {
    fn matches_any(&self, alias: Option<u16>) -> bool {
        alias.is_some_and(|a| {
            a == self.write_service || a == self.notify_service || a == self.vendor_service
        })
    }
}

fn is_housekeeping(alias: Option<u16>) -> bool {
    alias.is_some_and(|a| HOUSEKEEPING_SERVICES.contains(&a))
}

/// Write and notify characteristics chosen for one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacteristicSelection {
    pub write: Option<CharacteristicRef>,
    pub notify: Option<CharacteristicRef>,
}

impl CharacteristicSelection {
    pub fn is_empty(&self) -> bool {
        self.write.is_none() && self.notify.is_none()
    }
}

/// Rank of a write candidate; higher wins. Ties keep the earlier candidate,
/// except on the primary tag where each new candidate replaces the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum WriteRank {
    /// Any writable characteristic, used only when nothing else qualifies
    Fallback,
    /// Tagged or non-housekeeping service
    Eligible,
    /// Primary write-service tag
    Primary,
}

fn write_rank(service: &Service, tags: &ServiceTags) -> WriteRank {
    let alias = short_alias(&service.uuid);
    if alias == Some(tags.write_service) {
        WriteRank::Primary
    } else if tags.matches_any(alias) || !is_housekeeping(alias) {
        WriteRank::Eligible
    } else {
        WriteRank::Fallback
    }
}

/// Pick the write and notify characteristics from services in discovery order
pub fn select_characteristics(services: &[Service], tags: &ServiceTags) -> CharacteristicSelection {
    let mut write: Option<(WriteRank, &CharacteristicRef)> = None;
    let mut notify: Option<&CharacteristicRef> = None;

    for service in services {
        let rank = write_rank(service, tags);
        let housekeeping = is_housekeeping(short_alias(&service.uuid));

        for characteristic in &service.characteristics {
            let better = write.map_or(true, |(best, _)| {
                rank > best || (rank == WriteRank::Primary && best == WriteRank::Primary)
            });
            if characteristic.props.can_write() && better {
                debug!(
                    "Write candidate {} on {} ({:?})",
                    characteristic.uuid, service.uuid, rank
                );
                write = Some((rank, characteristic));
            }
            if notify.is_none() && !housekeeping && characteristic.props.can_notify() {
                notify = Some(characteristic);
            }
        }
    }

    CharacteristicSelection {
        write: write.map(|(_, c)| c.clone()),
        notify: notify.cloned(),
    }
}
