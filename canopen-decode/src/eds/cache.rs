//! COB-ID lookup tables derived from the communication parameter objects.

use std::collections::BTreeMap;

use log::debug;

use super::DictObject;

const SSDO_PARAMETER: u16 = 0x1200;
const RPDO_COMMUNICATION: std::ops::RangeInclusive<u16> = 0x1400..=0x15FF;
const TPDO_COMMUNICATION: std::ops::RangeInclusive<u16> = 0x1800..=0x19FF;
/// Distance from a PDO communication object to its mapping object.
const MAPPING_OFFSET: u16 = 0x200;

const COB_ID_INVALID: u32 = 0x8000_0000;
const COB_ID_EXTENDED: u32 = 0x2000_0000;

/// Transfer direction as seen from the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// Active COB-IDs of a dictionary, rebuilt as a whole on load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CobIdCache {
    pdo_rx: BTreeMap<u32, u16>,
    pdo_tx: BTreeMap<u32, u16>,
    sdo_rx: u32,
    sdo_tx: u32,
}

/// COB-ID with its control bits removed, `None` when marked invalid.
fn active_cob_id(raw: i128) -> Option<u32> {
    let raw = u32::try_from(raw).ok()?;
    if raw & COB_ID_INVALID != 0 {
        return None;
    }
    if raw & COB_ID_EXTENDED != 0 {
        Some(raw & 0x1FFF_FFFF)
    } else {
        Some(raw & 0x7FF)
    }
}

fn sub_cob_id(object: &DictObject, sub: u8) -> Option<u32> {
    let value = object.sub(sub)?.default_value()?;
    active_cob_id(value.as_integer()?)
}

impl CobIdCache {
    pub fn build<'a>(objects: impl IntoIterator<Item = (u16, &'a DictObject)>) -> Self {
        let mut cache = CobIdCache::default();
        for (index, object) in objects {
            if index == SSDO_PARAMETER {
                if let Some(cob_id) = sub_cob_id(object, 1) {
                    cache.sdo_rx = cob_id;
                }
                if let Some(cob_id) = sub_cob_id(object, 2) {
                    cache.sdo_tx = cob_id;
                }
            } else if RPDO_COMMUNICATION.contains(&index) {
                if let Some(cob_id) = sub_cob_id(object, 1) {
                    cache.pdo_rx.insert(cob_id, index + MAPPING_OFFSET);
                }
            } else if TPDO_COMMUNICATION.contains(&index) {
                if let Some(cob_id) = sub_cob_id(object, 1) {
                    cache.pdo_tx.insert(cob_id, index + MAPPING_OFFSET);
                }
            }
        }
        debug!(
            "COB-ID cache: {} RPDO, {} TPDO, SDO rx 0x{:03X} tx 0x{:03X}",
            cache.pdo_rx.len(),
            cache.pdo_tx.len(),
            cache.sdo_rx,
            cache.sdo_tx
        );
        cache
    }

    /// Mapping parameter index owning `cob_id`.
    pub fn pdo_mapping(&self, direction: Direction, cob_id: u32) -> Option<u16> {
        match direction {
            Direction::Rx => self.pdo_rx.get(&cob_id).copied(),
            Direction::Tx => self.pdo_tx.get(&cob_id).copied(),
        }
    }

    /// Configured SDO COB-ID, `None` while unset.
    pub fn sdo(&self, direction: Direction) -> Option<u32> {
        let cob_id = match direction {
            Direction::Rx => self.sdo_rx,
            Direction::Tx => self.sdo_tx,
        };
        (cob_id != 0).then_some(cob_id)
    }
}
