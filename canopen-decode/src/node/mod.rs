//! # Node protocol
//!
//! Per-node CANopen service state machine. Every frame is classified by
//! COB-ID, checked against the rules of its service and either turned into
//! a [`ServiceEvent`] (the frame is stored) or rejected with a
//! [`ProtocolViolation`] (the frame is logged and dropped).
//!
//! Decoded PDO and SDO data lands in the node's [`ObjectStore`], typed with
//! the attached [`ObjectDictionary`] when there is one.

pub mod emcy;
pub mod nmt;
pub mod pdo;
pub mod sdo;
pub mod services;
pub mod store;
pub mod time;

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, error, info, log, trace, warn};

use crate::codec::value_from_bytes;
use crate::eds::{Attribute, Direction, ObjectDictionary, SubKey};
use crate::error::ProtocolViolation;
use crate::types::{Timestamp, Value};

use emcy::Emergency;
use nmt::{HeartbeatState, NmtCommand, NmtMachine, NmtState};
use pdo::MappingEntry;
use sdo::{SdoEvent, SdoTracker, SegmentedTransfer};
use services::ServiceKind;
use store::{ObjectSlot, ObjectStore};
use time::TimeOfDay;

const NMT_DLC: usize = 2;
const SYNC_DLC: usize = 0;
const EMCY_DLC: usize = 8;
const TIME_DLC: usize = 8;
const SDO_DLC: usize = 8;
const HEARTBEAT_DLC: usize = 1;

/// A frame the node accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    Nmt { command: NmtCommand, state: NmtState },
    Sync,
    Emergency(Emergency),
    Time(TimeOfDay),
    /// `values` is the number of mapped objects stored from the payload.
    Pdo {
        direction: Direction,
        mapping: u16,
        values: usize,
    },
    Sdo(SdoEvent),
    Heartbeat { state: HeartbeatState, toggle: bool },
}

/// A stored frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub cob_id: u32,
    pub data: Vec<u8>,
}

fn expect_dlc(service: &'static str, payload: &[u8], expected: usize) -> Result<(), ProtocolViolation> {
    if payload.len() != expected {
        return Err(ProtocolViolation::DlcMismatch {
            service,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn full_frame(service: &'static str, payload: &[u8]) -> Result<[u8; 8], ProtocolViolation> {
    <[u8; 8]>::try_from(payload).map_err(|_| ProtocolViolation::DlcMismatch {
        service,
        expected: 8,
        actual: payload.len(),
    })
}

/// Runtime state of one node on one channel.
#[derive(Debug, Clone)]
pub struct NodeProtocol {
    node_id: u8,
    dictionary: Option<Arc<ObjectDictionary>>,
    objects: ObjectStore,
    frames: BTreeMap<Timestamp, RawFrame>,
    nmt: NmtMachine,
    sdo: SdoTracker,
    last_time: Option<TimeOfDay>,
}

impl NodeProtocol {
    pub fn new(node_id: u8) -> Self {
        Self {
            node_id,
            dictionary: None,
            objects: ObjectStore::default(),
            frames: BTreeMap::new(),
            nmt: NmtMachine::default(),
            sdo: SdoTracker::default(),
            last_time: None,
        }
    }

    pub fn node_id(&self) -> u8 {
        self.node_id
    }

    /// Attaches a dictionary. Its configured values seed the object store
    /// when the store is still empty, or always with `reseed`.
    pub fn attach_dictionary(&mut self, dictionary: Arc<ObjectDictionary>, reseed: bool) {
        if reseed || self.objects.is_empty() {
            self.seed(&dictionary);
        }
        info!("Node {}: using {}", self.node_id, dictionary.name());
        self.dictionary = Some(dictionary);
    }

    fn seed(&mut self, dictionary: &ObjectDictionary) {
        for (index, object) in dictionary.objects() {
            for (key, entry) in object.entries() {
                let Some(value) = entry.value() else {
                    continue;
                };
                let sub = match key {
                    SubKey::Object => 0,
                    SubKey::Sub(sub) => sub,
                };
                self.objects.record(index, sub, value, 0.0);
            }
        }
    }

    pub fn dictionary(&self) -> Option<&ObjectDictionary> {
        self.dictionary.as_deref()
    }

    pub fn nmt_state(&self) -> Option<NmtState> {
        self.nmt.state()
    }

    pub fn last_time(&self) -> Option<TimeOfDay> {
        self.last_time
    }

    pub fn segmented_transfer(&self) -> Option<&SegmentedTransfer> {
        self.sdo.transfer()
    }

    pub fn objects(&self) -> &ObjectStore {
        &self.objects
    }

    pub fn lookup(&self, index: u16, sub: u8) -> Option<&ObjectSlot> {
        self.objects.get(index, sub)
    }

    /// Stored frames in timestamp order.
    pub fn raw_frames(&self) -> impl Iterator<Item = (f64, &RawFrame)> {
        self.frames.iter().map(|(t, frame)| (t.seconds(), frame))
    }

    /// Runs one frame through the state machine. `Ok` frames are stored.
    pub fn process_frame(
        &mut self,
        timestamp: f64,
        cob_id: u32,
        payload: &[u8],
    ) -> Result<ServiceEvent, ProtocolViolation> {
        let result = self.decode(timestamp, cob_id, payload);
        match &result {
            Ok(event) => {
                trace!("Node {}: {:.6} 0x{:03X} {:?}", self.node_id, timestamp, cob_id, event);
                // Same timestamp twice keeps the later frame
                self.frames.insert(
                    Timestamp(timestamp),
                    RawFrame {
                        cob_id,
                        data: payload.to_vec(),
                    },
                );
            }
            Err(violation) => log!(
                violation.level(),
                "Node {}: {:.6} 0x{:03X}: {}",
                self.node_id,
                timestamp,
                cob_id,
                violation
            ),
        }
        result
    }

    fn decode(&mut self, timestamp: f64, cob_id: u32, payload: &[u8]) -> Result<ServiceEvent, ProtocolViolation> {
        let kind = services::classify(cob_id, self.dictionary.as_deref().map(|d| d.cache()));
        match kind {
            ServiceKind::Nmt => self.on_nmt(payload),
            ServiceKind::Sync => {
                expect_dlc("SYNC", payload, SYNC_DLC)?;
                Ok(ServiceEvent::Sync)
            }
            ServiceKind::Emergency => self.on_emergency(payload),
            ServiceKind::Time => self.on_time(payload),
            ServiceKind::Pdo { direction, mapping } => Ok(self.on_pdo(direction, mapping, payload, timestamp)),
            ServiceKind::Tsdo => {
                let frame = full_frame("TSDO", payload)?;
                let event = self.sdo.server_frame(&frame)?;
                Ok(self.on_sdo(event, timestamp))
            }
            ServiceKind::Rsdo => {
                let frame = full_frame("RSDO", payload)?;
                let event = self.sdo.client_frame(&frame)?;
                Ok(self.on_sdo(event, timestamp))
            }
            ServiceKind::Heartbeat => self.on_heartbeat(payload),
            ServiceKind::Reserved => Err(ProtocolViolation::ReservedCobId(cob_id)),
            ServiceKind::Unknown => Err(ProtocolViolation::UnknownCobId(cob_id)),
        }
    }

    fn on_nmt(&mut self, payload: &[u8]) -> Result<ServiceEvent, ProtocolViolation> {
        expect_dlc("NMT", payload, NMT_DLC)?;
        let command = NmtCommand::from_byte(payload[0]).ok_or(ProtocolViolation::UnknownNmtCommand(payload[0]))?;
        let state = self.nmt.apply(command)?;
        info!("Node {}: NMT {:?} -> {:?}", self.node_id, command, state);
        Ok(ServiceEvent::Nmt { command, state })
    }

    fn on_emergency(&mut self, payload: &[u8]) -> Result<ServiceEvent, ProtocolViolation> {
        expect_dlc("EMCY", payload, EMCY_DLC)?;
        let emergency = Emergency::parse(&full_frame("EMCY", payload)?);
        warn!(
            "Node {}: EMCY 0x{:04X} ({}), register 0x{:02X}, vendor {:02X?}",
            self.node_id,
            emergency.error_code,
            emergency.class(),
            emergency.error_register,
            emergency.vendor
        );
        Ok(ServiceEvent::Emergency(emergency))
    }

    fn on_time(&mut self, payload: &[u8]) -> Result<ServiceEvent, ProtocolViolation> {
        expect_dlc("TIME", payload, TIME_DLC)?;
        let (time, trailing) = TimeOfDay::parse(&full_frame("TIME", payload)?);
        if trailing != 0 {
            warn!("Node {}: TIME trailing bytes 0x{:04X}", self.node_id, trailing);
        }
        match time.date_time() {
            Some(date_time) => info!("Node {}: TIME {}", self.node_id, date_time.format("%Y-%m-%d %H:%M:%S%.3f")),
            None => warn!("Node {}: TIME out of range {:?}", self.node_id, time),
        }
        self.last_time = Some(time);
        Ok(ServiceEvent::Time(time))
    }

    fn on_heartbeat(&mut self, payload: &[u8]) -> Result<ServiceEvent, ProtocolViolation> {
        expect_dlc("HEARTBEAT", payload, HEARTBEAT_DLC)?;
        let (state, toggle) = HeartbeatState::from_byte(payload[0]).ok_or(ProtocolViolation::UnknownCommand {
            service: "HEARTBEAT",
            command: payload[0],
        })?;
        // Observed only, the NMT state is driven by NMT frames alone
        warn!("Node {}: heartbeat {:?}", self.node_id, state);
        Ok(ServiceEvent::Heartbeat { state, toggle })
    }

    fn on_sdo(&mut self, event: SdoEvent, timestamp: f64) -> ServiceEvent {
        if let Some((index, sub, data)) = event.payload() {
            let value = self.store_value(index, sub, data, timestamp);
            debug!("Node {}: SDO 0x{:04X}:{:02X} = {}", self.node_id, index, sub, value);
        }
        ServiceEvent::Sdo(event)
    }

    fn on_pdo(&mut self, direction: Direction, mapping: u16, payload: &[u8], timestamp: f64) -> ServiceEvent {
        let values = match self.dictionary.clone() {
            Some(dictionary) => self.dispatch_pdo(&dictionary, mapping, payload, timestamp),
            None => {
                debug!("Node {}: no dictionary, PDO 0x{:04X} kept raw", self.node_id, mapping);
                0
            }
        };
        ServiceEvent::Pdo {
            direction,
            mapping,
            values,
        }
    }

    /// Unpacks a PDO along the mapping currently held in the store.
    fn dispatch_pdo(&mut self, dictionary: &ObjectDictionary, mapping: u16, payload: &[u8], timestamp: f64) -> usize {
        let node = self.node_id;
        let sub_number = dictionary
            .object(mapping)
            .and_then(|o| o.header())
            .and_then(|h| h.integer(Attribute::SubNumber));
        match sub_number {
            None => {
                error!("Node {}: PDO mapping 0x{:04X} SubNumber unknown", node, mapping);
                return 0;
            }
            Some(n) if n <= 0 => {
                error!("Node {}: PDO mapping 0x{:04X} SubNumber zero", node, mapping);
                return 0;
            }
            Some(_) => {}
        }

        let Some(populated) = self.objects.subs(mapping).map(|subs| subs.len().saturating_sub(1)) else {
            error!("Node {}: PDO mapping 0x{:04X} has no values", node, mapping);
            return 0;
        };
        let count = match self.objects.get(mapping, 0).and_then(|slot| slot.last().as_integer()) {
            Some(count) if count > 0 => count.min(i128::from(u8::MAX)) as usize,
            _ => {
                error!("Node {}: PDO mapping 0x{:04X} maps nothing", node, mapping);
                return 0;
            }
        };
        if count > populated {
            error!(
                "Node {}: PDO mapping 0x{:04X} inconsistent, {} mapped but {} entries",
                node, mapping, count, populated
            );
        }

        let entries: Vec<MappingEntry> = (1..=count as u8)
            .filter_map(|sub| {
                let descriptor = self.objects.get(mapping, sub).and_then(|slot| slot.last().as_integer());
                match descriptor {
                    Some(descriptor) => Some(MappingEntry::from_descriptor(descriptor as u32)),
                    None => {
                        error!("Node {}: PDO mapping 0x{:04X}:{:02X} missing", node, mapping, sub);
                        None
                    }
                }
            })
            .collect();

        let (fields, remaining) = pdo::unpack(payload, &entries);
        if remaining < 0 {
            error!(
                "Node {}: PDO mapping 0x{:04X} overshoots payload by {} bits",
                node, mapping, -remaining
            );
        }
        for (entry, bytes) in &fields {
            self.store_value(entry.index, entry.sub, bytes, timestamp);
        }
        fields.len()
    }

    /// Decodes `bytes` with the dictionary type of `index:sub` and records
    /// it. Raw bytes are kept when no type applies.
    pub fn store_value(&mut self, index: u16, sub: u8, bytes: &[u8], timestamp: f64) -> Value {
        let raw = || Value::Bytes(bytes.to_vec());
        let value = match self.dictionary.as_deref() {
            None => raw(),
            Some(dictionary) => match dictionary.entry(index, sub) {
                None => {
                    warn!(
                        "Node {}: 0x{:04X}:{:02X} not in {}",
                        self.node_id,
                        index,
                        sub,
                        dictionary.name()
                    );
                    raw()
                }
                Some(entry) => match entry.data_type() {
                    None => {
                        error!("Node {}: 0x{:04X}:{:02X} DataType unknown", self.node_id, index, sub);
                        raw()
                    }
                    Some(data_type) => value_from_bytes(data_type, bytes).unwrap_or_else(|e| {
                        warn!("Node {}: 0x{:04X}:{:02X} {}", self.node_id, index, sub, e);
                        raw()
                    }),
                },
            },
        };
        self.objects.record(index, sub, value.clone(), timestamp);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRIVE_EDS: &str = "\
[1018]
ParameterName=Identity
ObjectType=0x9
SubNumber=2

[1018sub0]
ParameterName=Highest sub-index
DataType=0x0005
DefaultValue=1

[1018sub1]
ParameterName=Vendor-ID
DataType=0x0007
DefaultValue=0x0000029C

[1A00]
ParameterName=TPDO1 mapping
ObjectType=0x9
SubNumber=3

[1A00sub0]
DataType=0x0005
DefaultValue=2

[1A00sub1]
DataType=0x0007
DefaultValue=0x20000110

[1A00sub2]
DataType=0x0007
DefaultValue=0x20010208

[2000]
ParameterName=Speed
ObjectType=0x8
SubNumber=2

[2000sub0]
DataType=0x0005
DefaultValue=1

[2000sub1]
DataType=0x0006
DefaultValue=0

[2001sub2]
DataType=0x0005
DefaultValue=0
";

    fn configured_node() -> NodeProtocol {
        let dictionary = ObjectDictionary::load_from_str("drive.eds", DRIVE_EDS).unwrap();
        let mut node = NodeProtocol::new(5);
        node.attach_dictionary(Arc::new(dictionary), false);
        node
    }

    #[test]
    fn test_seeded_from_dictionary() {
        let node = configured_node();
        assert_eq!(node.lookup(0x1018, 1).unwrap().last(), &Value::Integer(0x29C));
        assert_eq!(node.lookup(0x1A00, 0).unwrap().history(), &[(0.0, Value::Integer(2))]);
    }

    #[test]
    fn test_pdo_dispatch() {
        let mut node = configured_node();
        let event = node.process_frame(1.0, 0x185, &[0x12, 0x34, 0x56]).unwrap();
        assert_eq!(
            event,
            ServiceEvent::Pdo {
                direction: Direction::Tx,
                mapping: 0x1A00,
                values: 2
            }
        );
        assert_eq!(node.lookup(0x2000, 1).unwrap().last(), &Value::Integer(0x3412));
        assert_eq!(node.lookup(0x2001, 2).unwrap().last(), &Value::Integer(0x56));
        assert_eq!(node.raw_frames().count(), 1);
    }

    #[test]
    fn test_pdo_without_dictionary_is_stored_raw() {
        let mut node = NodeProtocol::new(5);
        let event = node.process_frame(1.0, 0x285, &[1, 2]).unwrap();
        assert_eq!(
            event,
            ServiceEvent::Pdo {
                direction: Direction::Tx,
                mapping: 0x1A01,
                values: 0
            }
        );
        assert_eq!(node.raw_frames().count(), 1);
    }

    #[test]
    fn test_sdo_write_changes_mapping() {
        let mut node = configured_node();
        // map only 0x2001:02 (8 bits)
        node.process_frame(1.0, 0x605, &[0x2F, 0x00, 0x1A, 0x00, 0x01, 0, 0, 0]).unwrap();
        node.process_frame(1.1, 0x605, &[0x23, 0x00, 0x1A, 0x01, 0x08, 0x02, 0x01, 0x20]).unwrap();
        node.process_frame(2.0, 0x185, &[0x77]).unwrap();
        assert_eq!(node.lookup(0x2001, 2).unwrap().last(), &Value::Integer(0x77));
        assert!(node.lookup(0x2000, 1).unwrap().history().iter().all(|(t, _)| *t == 0.0));
    }

    #[test]
    fn test_expedited_checksum() {
        let mut node = configured_node();
        let rejected = node.process_frame(1.0, 0x585, &[0x4B, 0x00, 0x20, 0x01, 0x10, 0x00, 0x01, 0x00]);
        assert!(matches!(rejected, Err(ProtocolViolation::ChecksumMismatch { .. })));
        assert_eq!(node.raw_frames().count(), 0);

        node.process_frame(1.5, 0x585, &[0x4B, 0x00, 0x20, 0x01, 0x10, 0x00, 0x00, 0x00])
            .unwrap();
        assert_eq!(node.raw_frames().count(), 1);
        assert_eq!(node.lookup(0x2000, 1).unwrap().last(), &Value::Integer(0x10));
    }

    #[test]
    fn test_segmented_upload_stored() {
        let mut node = NodeProtocol::new(5);
        node.process_frame(1.0, 0x585, &[0x41, 0x08, 0x10, 0x00, 10, 0, 0, 0]).unwrap();
        node.process_frame(1.1, 0x585, &[0x00, b'M', b'o', b't', b'o', b'r', b' ', b'd']).unwrap();
        assert!(node.segmented_transfer().is_some());
        node.process_frame(1.2, 0x585, &[0x01, b'r', b'v', b'3', 0, 0, 0, 0]).unwrap();
        assert!(node.segmented_transfer().is_none());
        assert_eq!(
            node.lookup(0x1008, 0).unwrap().last(),
            &Value::Bytes(b"Motor drv3".to_vec())
        );
    }

    #[test]
    fn test_nmt_and_dlc() {
        let mut node = NodeProtocol::new(5);
        assert!(node.process_frame(0.1, 0x000, &[0x01, 0x05]).is_ok());
        assert_eq!(node.nmt_state(), Some(NmtState::Operational));
        assert_eq!(
            node.process_frame(0.2, 0x000, &[0x01, 0x05]),
            Err(ProtocolViolation::NmtSameState(NmtState::Operational))
        );
        assert_eq!(
            node.process_frame(0.3, 0x000, &[0x01]),
            Err(ProtocolViolation::DlcMismatch {
                service: "NMT",
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            node.process_frame(0.4, 0x000, &[0x42, 0x05]),
            Err(ProtocolViolation::UnknownNmtCommand(0x42))
        );
        assert_eq!(node.raw_frames().count(), 1);
    }

    #[test]
    fn test_heartbeat_does_not_drive_nmt() {
        let mut node = NodeProtocol::new(5);
        let event = node.process_frame(0.1, 0x705, &[0x05]).unwrap();
        assert_eq!(
            event,
            ServiceEvent::Heartbeat {
                state: HeartbeatState::Operational,
                toggle: false
            }
        );
        assert_eq!(node.nmt_state(), None);
    }

    #[test]
    fn test_emcy_time_and_sync() {
        let mut node = NodeProtocol::new(5);
        assert!(matches!(
            node.process_frame(0.1, 0x085, &[0x00, 0x81, 0x11, 0, 0, 0, 0, 0]),
            Ok(ServiceEvent::Emergency(_))
        ));
        assert!(node.process_frame(0.2, 0x080, &[]).is_ok());
        assert!(node.process_frame(0.3, 0x080, &[1]).is_err());
        assert!(node.process_frame(0.4, 0x105, &[0, 0, 0, 0, 1, 0, 0, 0]).is_ok());
        assert_eq!(node.last_time(), Some(TimeOfDay { milliseconds: 0, days: 1 }));
    }

    #[test]
    fn test_reserved_and_unknown() {
        let mut node = NodeProtocol::new(5);
        assert_eq!(
            node.process_frame(0.1, 0x685, &[0; 8]),
            Err(ProtocolViolation::ReservedCobId(0x685))
        );
        assert_eq!(
            node.process_frame(0.2, 0x7E5, &[0; 8]),
            Err(ProtocolViolation::ReservedCobId(0x7E5))
        );
        assert_eq!(node.raw_frames().count(), 0);
    }
}
