//! One CAN channel: frame routing to its nodes and the channel-wide raw log.

use std::collections::BTreeMap;

use log::{debug, error};

use crate::error::ProtocolViolation;
use crate::node::services::{NMT, NODE_ID_MASK, SYNC};
use crate::node::{NodeProtocol, ServiceEvent};

const NMT_DLC: usize = 2;
const MAX_NODE_ID: u32 = 127;

/// Where a frame went.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// NMT or SYNC fanned out to every node of the channel.
    Broadcast { reached: usize, accepted: usize },
    Node {
        node_id: u8,
        outcome: Result<ServiceEvent, ProtocolViolation>,
    },
    Rejected(ProtocolViolation),
}

impl Routed {
    /// Whether the frame made it into the channel log.
    pub fn stored(&self) -> bool {
        match self {
            Routed::Broadcast { accepted, .. } => *accepted > 0,
            Routed::Node { outcome, .. } => outcome.is_ok(),
            Routed::Rejected(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Channel {
    id: u32,
    node_mask: u32,
    nodes: BTreeMap<u8, NodeProtocol>,
    frames: BTreeMap<u32, Vec<(f64, Vec<u8>)>>,
    last_cob_id: Option<u32>,
}

impl Channel {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            node_mask: NODE_ID_MASK,
            nodes: BTreeMap::new(),
            frames: BTreeMap::new(),
            last_cob_id: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Bits of the COB-ID read as the node id, 0x7F unless changed.
    pub fn set_node_mask(&mut self, mask: u32) {
        self.node_mask = mask;
    }

    pub fn node(&self, node_id: u8) -> Option<&NodeProtocol> {
        self.nodes.get(&node_id)
    }

    pub fn node_mut(&mut self, node_id: u8) -> Option<&mut NodeProtocol> {
        self.nodes.get_mut(&node_id)
    }

    /// The node with `node_id`, created without a dictionary if unseen.
    pub fn node_entry(&mut self, node_id: u8) -> &mut NodeProtocol {
        let channel = self.id;
        self.nodes.entry(node_id).or_insert_with(|| {
            debug!("Channel {}: new node {}", channel, node_id);
            NodeProtocol::new(node_id)
        })
    }

    pub fn node_ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.nodes.keys().copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeProtocol> {
        self.nodes.values()
    }

    /// Stored `(timestamp, payload)` pairs of one COB-ID.
    pub fn raw_frames(&self, cob_id: u32) -> &[(f64, Vec<u8>)] {
        self.frames.get(&cob_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cob_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.frames.keys().copied()
    }

    pub fn last_cob_id(&self) -> Option<u32> {
        self.last_cob_id
    }

    /// Routes a frame to its node, or to every node for NMT and SYNC.
    pub fn route_frame(&mut self, timestamp: f64, cob_id: u32, data: &[u8]) -> Routed {
        let broadcast = (cob_id == NMT && data.len() == NMT_DLC) || (cob_id == SYNC && data.is_empty());

        let routed = if broadcast {
            // The node id inside an NMT payload is not looked at
            let reached = self.nodes.len();
            let accepted = self
                .nodes
                .values_mut()
                .map(|node| node.process_frame(timestamp, cob_id, data))
                .filter(Result::is_ok)
                .count();
            Routed::Broadcast { reached, accepted }
        } else {
            let node_id = cob_id & self.node_mask;
            match u8::try_from(node_id).ok().filter(|id| u32::from(*id) <= MAX_NODE_ID) {
                Some(node_id) => Routed::Node {
                    node_id,
                    outcome: self.node_entry(node_id).process_frame(timestamp, cob_id, data),
                },
                None => {
                    let violation = ProtocolViolation::ImpossibleNodeId(node_id);
                    error!("Channel {}: 0x{:03X}: {}", self.id, cob_id, violation);
                    Routed::Rejected(violation)
                }
            }
        };

        if routed.stored() {
            self.frames.entry(cob_id).or_default().push((timestamp, data.to_vec()));
            self.last_cob_id = Some(cob_id);
        }
        routed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::nmt::NmtState;

    #[test]
    fn test_nmt_broadcast_ignores_payload_node() {
        let mut channel = Channel::new(1);
        channel.node_entry(3);
        channel.node_entry(4);
        let routed = channel.route_frame(0.5, 0x000, &[0x01, 0x03]);
        assert_eq!(routed, Routed::Broadcast { reached: 2, accepted: 2 });
        assert_eq!(channel.node(3).unwrap().nmt_state(), Some(NmtState::Operational));
        assert_eq!(channel.node(4).unwrap().nmt_state(), Some(NmtState::Operational));
        assert_eq!(channel.raw_frames(0x000).len(), 1);
        assert_eq!(channel.last_cob_id(), Some(0x000));
    }

    #[test]
    fn test_sync_broadcast() {
        let mut channel = Channel::new(1);
        channel.node_entry(7);
        assert!(channel.route_frame(0.1, 0x080, &[]).stored());
        assert_eq!(channel.node(7).unwrap().raw_frames().count(), 1);
    }

    #[test]
    fn test_broadcast_without_nodes_not_stored() {
        let mut channel = Channel::new(1);
        let routed = channel.route_frame(0.1, 0x000, &[0x01, 0x00]);
        assert_eq!(routed, Routed::Broadcast { reached: 0, accepted: 0 });
        assert!(channel.raw_frames(0x000).is_empty());
    }

    #[test]
    fn test_node_created_on_demand() {
        let mut channel = Channel::new(2);
        let routed = channel.route_frame(0.1, 0x70A, &[0x7F]);
        assert!(routed.stored());
        assert_eq!(channel.node_ids().collect::<Vec<_>>(), vec![10]);
        assert_eq!(channel.raw_frames(0x70A), &[(0.1, vec![0x7F])]);
    }

    #[test]
    fn test_rejected_frame_not_logged() {
        let mut channel = Channel::new(2);
        let routed = channel.route_frame(0.1, 0x70A, &[0x7F, 0x00]);
        assert!(!routed.stored());
        assert!(channel.raw_frames(0x70A).is_empty());
        assert_eq!(channel.last_cob_id(), None);
    }

    #[test]
    fn test_impossible_node_id() {
        let mut channel = Channel::new(2);
        channel.set_node_mask(0xFF);
        assert_eq!(
            channel.route_frame(0.1, 0x1F0, &[]),
            Routed::Rejected(ProtocolViolation::ImpossibleNodeId(0xF0))
        );
    }
}
