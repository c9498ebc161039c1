//! Network management state machine and heartbeat states.

use crate::error::ProtocolViolation;

/// NMT command specifiers (byte 0 of a COB-ID 0x000 frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NmtCommand {
    Start = 0x01,
    Stop = 0x02,
    EnterPreOperational = 0x80,
    ResetNode = 0x81,
    ResetCommunication = 0x82,
}

impl NmtCommand {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Start),
            0x02 => Some(Self::Stop),
            0x80 => Some(Self::EnterPreOperational),
            0x81 => Some(Self::ResetNode),
            0x82 => Some(Self::ResetCommunication),
            _ => None,
        }
    }

    /// State the node ends up in once the command is applied.
    pub fn target_state(self) -> NmtState {
        match self {
            Self::Start => NmtState::Operational,
            Self::Stop => NmtState::Stopped,
            Self::EnterPreOperational => NmtState::PreOperational,
            Self::ResetNode => NmtState::ResetNode,
            Self::ResetCommunication => NmtState::ResetCommunication,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NmtState {
    Operational,
    Stopped,
    PreOperational,
    ResetNode,
    ResetCommunication,
}

impl NmtState {
    /// Transition table. Resets only move forward to pre-operational.
    pub fn allows(self, to: NmtState) -> bool {
        use NmtState::*;
        match self {
            Operational | Stopped | PreOperational => to != self,
            ResetNode => to == ResetCommunication,
            ResetCommunication => to == PreOperational,
        }
    }
}

/// NMT state of one node, uninitialized until the first command.
#[derive(Debug, Clone, Default)]
pub struct NmtMachine {
    state: Option<NmtState>,
}

impl NmtMachine {
    pub fn state(&self) -> Option<NmtState> {
        self.state
    }

    pub fn apply(&mut self, command: NmtCommand) -> Result<NmtState, ProtocolViolation> {
        let target = command.target_state();
        match self.state {
            None => {}
            Some(current) if current == target => {
                return Err(ProtocolViolation::NmtSameState(current));
            }
            Some(current) if !current.allows(target) => {
                return Err(ProtocolViolation::NmtTransition {
                    from: current,
                    to: target,
                });
            }
            Some(_) => {}
        }
        self.state = Some(target);
        Ok(target)
    }
}

/// State reported in a heartbeat (error control) frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeartbeatState {
    BootUp = 0x00,
    Stopped = 0x04,
    Operational = 0x05,
    PreOperational = 0x7F,
}

impl HeartbeatState {
    /// Decodes byte 0 with the toggle bit masked off.
    pub fn from_byte(byte: u8) -> Option<(Self, bool)> {
        let toggle = byte & 0x80 != 0;
        let state = match byte & 0x7F {
            0x00 => Self::BootUp,
            0x04 => Self::Stopped,
            0x05 => Self::Operational,
            0x7F => Self::PreOperational,
            _ => return None,
        };
        Some((state, toggle))
    }
}
