//! Predefined connection set: which service a COB-ID belongs to.

use crate::eds::{CobIdCache, Direction};

pub const NMT: u32 = 0x000;
pub const SYNC: u32 = 0x080;
pub const EMERGENCY: u32 = 0x080;
pub const TIME: u32 = 0x100;
pub const TSDO: u32 = 0x580;
pub const RSDO: u32 = 0x600;
pub const RESERVED_2: u32 = 0x680;
pub const HEARTBEAT: u32 = 0x700;
pub const RESERVED_3: u32 = 0x780;

pub const TPDO: [u32; 4] = [0x180, 0x280, 0x380, 0x480];
pub const RPDO: [u32; 4] = [0x200, 0x300, 0x400, 0x500];
pub const TPDO_MAPPING: u16 = 0x1A00;
pub const RPDO_MAPPING: u16 = 0x1600;

pub const NODE_ID_MASK: u32 = 0x7F;

/// Service class of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Nmt,
    Reserved,
    Sync,
    Emergency,
    Time,
    Pdo { direction: Direction, mapping: u16 },
    Tsdo,
    Rsdo,
    Heartbeat,
    Unknown,
}

/// Mapping parameter of a default PDO COB-ID (0x180 -> 0x1A00).
fn ladder_mapping(ladder: &[u32; 4], first_mapping: u16, base: u32) -> Option<u16> {
    ladder.contains(&base).then(|| {
        let number = ((base - SYNC) / 0x100) as u16;
        first_mapping + number - 1
    })
}

/// Splits a COB-ID into its function base and node id.
pub fn split(cob_id: u32) -> (u32, u32) {
    let node = cob_id & NODE_ID_MASK;
    (cob_id - node, node)
}

/// Classifies a COB-ID, using the dictionary cache when there is one.
pub fn classify(cob_id: u32, cache: Option<&CobIdCache>) -> ServiceKind {
    let (base, node) = split(cob_id);
    let sdo = |direction, default| {
        let configured = cache.and_then(|c| c.sdo(direction));
        node != 0 && (base == default || Some(base) == configured)
    };

    if base == NMT {
        return if node == 0 { ServiceKind::Nmt } else { ServiceKind::Reserved };
    }
    if base == SYNC {
        return if node == 0 { ServiceKind::Sync } else { ServiceKind::Emergency };
    }
    if base == TIME && node != 0 {
        return ServiceKind::Time;
    }

    let cached = |direction| cache.and_then(|c| c.pdo_mapping(direction, base));
    if let Some(mapping) = cached(Direction::Tx).or_else(|| ladder_mapping(&TPDO, TPDO_MAPPING, base)) {
        return ServiceKind::Pdo {
            direction: Direction::Tx,
            mapping,
        };
    }
    if let Some(mapping) = cached(Direction::Rx).or_else(|| ladder_mapping(&RPDO, RPDO_MAPPING, base)) {
        return ServiceKind::Pdo {
            direction: Direction::Rx,
            mapping,
        };
    }

    if sdo(Direction::Tx, TSDO) {
        ServiceKind::Tsdo
    } else if sdo(Direction::Rx, RSDO) {
        ServiceKind::Rsdo
    } else if base == RESERVED_2 || base == RESERVED_3 {
        ServiceKind::Reserved
    } else if base == HEARTBEAT && node != 0 {
        ServiceKind::Heartbeat
    } else {
        ServiceKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_connection_set() {
        assert_eq!(classify(0x000, None), ServiceKind::Nmt);
        assert_eq!(classify(0x005, None), ServiceKind::Reserved);
        assert_eq!(classify(0x080, None), ServiceKind::Sync);
        assert_eq!(classify(0x081, None), ServiceKind::Emergency);
        assert_eq!(classify(0x105, None), ServiceKind::Time);
        assert_eq!(classify(0x585, None), ServiceKind::Tsdo);
        assert_eq!(classify(0x605, None), ServiceKind::Rsdo);
        assert_eq!(classify(0x685, None), ServiceKind::Reserved);
        assert_eq!(classify(0x705, None), ServiceKind::Heartbeat);
        assert_eq!(classify(0x785, None), ServiceKind::Reserved);
        assert_eq!(classify(0x100, None), ServiceKind::Unknown);
        assert_eq!(classify(0x580, None), ServiceKind::Unknown);
    }

    #[test]
    fn test_pdo_ladder() {
        assert_eq!(
            classify(0x181, None),
            ServiceKind::Pdo { direction: Direction::Tx, mapping: 0x1A00 }
        );
        assert_eq!(
            classify(0x4FF, None),
            ServiceKind::Pdo { direction: Direction::Tx, mapping: 0x1A03 }
        );
        assert_eq!(
            classify(0x201, None),
            ServiceKind::Pdo { direction: Direction::Rx, mapping: 0x1600 }
        );
        assert_eq!(
            classify(0x50A, None),
            ServiceKind::Pdo { direction: Direction::Rx, mapping: 0x1603 }
        );
    }
}
