//! SDO traffic tracking: expedited transfers, segmented upload reassembly
//! and abort decoding, seen from a passive observer.

use crate::error::ProtocolViolation;

/// Server (TSDO) command specifiers.
pub mod server {
    pub const INITIATE_SEGMENTED: u8 = 0x41;
    pub const EXPEDITED_4: u8 = 0x43;
    pub const EXPEDITED_3: u8 = 0x47;
    pub const EXPEDITED_2: u8 = 0x4B;
    pub const EXPEDITED_1: u8 = 0x4F;
    pub const DOWNLOAD_ACK: u8 = 0x60;
    pub const ABORT: u8 = 0x80;
    /// Highest command byte read as a segment continuation.
    pub const LAST_SEGMENT_COMMAND: u8 = 0x1F;
}

/// Client (RSDO) command specifiers.
pub mod client {
    pub const EXPEDITED_4: u8 = 0x23;
    pub const EXPEDITED_3: u8 = 0x27;
    pub const EXPEDITED_2: u8 = 0x2B;
    pub const EXPEDITED_1: u8 = 0x2F;
    pub const UPLOAD_REQUEST: u8 = 0x40;
    pub const SEGMENT_REQUEST: u8 = 0x60;
    pub const SEGMENT_REQUEST_TOGGLED: u8 = 0x70;
    pub const ABORT: u8 = 0x80;
}

const SEGMENT_BYTES: u32 = 7;
const SEQUENCE_MASK: u8 = 0x1F;

/// What a recognized SDO frame did.
#[derive(Debug, Clone, PartialEq)]
pub enum SdoEvent {
    /// Expedited upload response or download request carrying data.
    Expedited { index: u16, sub: u8, data: Vec<u8> },
    SegmentedStarted { index: u16, sub: u8, size: u32 },
    Segment { sequence: u8, remaining: u32 },
    SegmentedCompleted { index: u16, sub: u8, data: Vec<u8> },
    DownloadAcknowledged { index: u16, sub: u8 },
    UploadRequested { index: u16, sub: u8 },
    SegmentRequested { command: u8 },
}

impl SdoEvent {
    /// Data to record in the object store, if the frame completed a value.
    pub fn payload(&self) -> Option<(u16, u8, &[u8])> {
        match self {
            SdoEvent::Expedited { index, sub, data }
            | SdoEvent::SegmentedCompleted { index, sub, data } => Some((*index, *sub, data)),
            _ => None,
        }
    }
}

/// An upload in progress between initiate and its last segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedTransfer {
    pub index: u16,
    pub sub: u8,
    pub size: u32,
    pub remaining: u32,
    pub sequence: u8,
    pub buffer: Vec<u8>,
}

impl SegmentedTransfer {
    fn new(index: u16, sub: u8, size: u32) -> Self {
        Self {
            index,
            sub,
            size,
            remaining: size,
            sequence: 0,
            buffer: Vec::with_capacity(size as usize),
        }
    }

    fn restart(&mut self) {
        self.remaining = self.size;
        self.sequence = 0;
        self.buffer.clear();
    }
}

fn address(frame: &[u8; 8]) -> (u16, u8) {
    (u16::from_le_bytes([frame[1], frame[2]]), frame[3])
}

fn data_word(frame: &[u8; 8]) -> u32 {
    u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]])
}

/// Data bytes of an expedited frame, padding required to be zero.
fn expedited_data(
    service: &'static str,
    frame: &[u8; 8],
    length: usize,
) -> Result<Vec<u8>, ProtocolViolation> {
    let (data, padding) = frame[4..].split_at(length);
    if padding.iter().any(|b| *b != 0) {
        return Err(ProtocolViolation::ChecksumMismatch {
            service,
            command: frame[0],
        });
    }
    Ok(data.to_vec())
}

fn zero_data_word(service: &'static str, frame: &[u8; 8]) -> Result<(), ProtocolViolation> {
    if data_word(frame) != 0 {
        return Err(ProtocolViolation::ChecksumMismatch {
            service,
            command: frame[0],
        });
    }
    Ok(())
}

/// SDO state of one node.
#[derive(Debug, Clone, Default)]
pub struct SdoTracker {
    transfer: Option<SegmentedTransfer>,
}

impl SdoTracker {
    pub fn transfer(&self) -> Option<&SegmentedTransfer> {
        self.transfer.as_ref()
    }

    fn abort(&mut self, frame: &[u8; 8]) -> ProtocolViolation {
        let (index, sub) = address(frame);
        let code = data_word(frame);
        self.transfer = None;
        ProtocolViolation::SdoAbort {
            index,
            sub,
            code,
            description: abort_code_description(code).to_string(),
        }
    }

    /// Server to client frame (COB-ID 0x580 + node).
    pub fn server_frame(&mut self, frame: &[u8; 8]) -> Result<SdoEvent, ProtocolViolation> {
        const SERVICE: &str = "TSDO";
        let command = frame[0];
        let (index, sub) = address(frame);

        match command {
            server::INITIATE_SEGMENTED => match self.transfer.take() {
                None => {
                    let size = data_word(frame);
                    self.transfer = Some(SegmentedTransfer::new(index, sub, size));
                    Ok(SdoEvent::SegmentedStarted { index, sub, size })
                }
                Some(pending) => Err(ProtocolViolation::UnfinishedTransfer {
                    index: pending.index,
                    sub: pending.sub,
                    remaining: pending.remaining,
                }),
            },
            server::EXPEDITED_4 | server::EXPEDITED_3 | server::EXPEDITED_2 | server::EXPEDITED_1 => {
                let length = 4 - usize::from((command >> 2) & 0x03);
                let data = expedited_data(SERVICE, frame, length)?;
                Ok(SdoEvent::Expedited { index, sub, data })
            }
            server::DOWNLOAD_ACK => {
                zero_data_word(SERVICE, frame)?;
                Ok(SdoEvent::DownloadAcknowledged { index, sub })
            }
            server::ABORT => Err(self.abort(frame)),
            command if command <= server::LAST_SEGMENT_COMMAND => self.segment(frame),
            command => Err(ProtocolViolation::UnknownCommand {
                service: SERVICE,
                command,
            }),
        }
    }

    fn segment(&mut self, frame: &[u8; 8]) -> Result<SdoEvent, ProtocolViolation> {
        let command = frame[0];
        let Some(transfer) = self.transfer.as_mut() else {
            return Err(ProtocolViolation::OrphanSegment(command));
        };

        // 0 out of turn restarts the upload, in turn it is the wrapped sequence
        if command == 0 && transfer.sequence != 0 {
            transfer.restart();
        }
        let expected = transfer.sequence;
        if command != expected {
            return Err(ProtocolViolation::UnorderedSegment {
                expected,
                got: command,
            });
        }

        let take = transfer.remaining.min(SEGMENT_BYTES);
        transfer.buffer.extend_from_slice(&frame[1..1 + take as usize]);
        transfer.remaining -= take;
        transfer.sequence = (transfer.sequence + 1) & SEQUENCE_MASK;

        if transfer.remaining > 0 {
            return Ok(SdoEvent::Segment {
                sequence: command,
                remaining: transfer.remaining,
            });
        }
        match self.transfer.take() {
            Some(done) => Ok(SdoEvent::SegmentedCompleted {
                index: done.index,
                sub: done.sub,
                data: done.buffer,
            }),
            None => Err(ProtocolViolation::OrphanSegment(command)),
        }
    }

    /// Client to server frame (COB-ID 0x600 + node).
    pub fn client_frame(&mut self, frame: &[u8; 8]) -> Result<SdoEvent, ProtocolViolation> {
        const SERVICE: &str = "RSDO";
        let command = frame[0];
        let (index, sub) = address(frame);

        match command {
            client::EXPEDITED_4 | client::EXPEDITED_3 | client::EXPEDITED_2 | client::EXPEDITED_1 => {
                let length = 4 - usize::from((command >> 2) & 0x03);
                let data = expedited_data(SERVICE, frame, length)?;
                Ok(SdoEvent::Expedited { index, sub, data })
            }
            client::UPLOAD_REQUEST => {
                zero_data_word(SERVICE, frame)?;
                Ok(SdoEvent::UploadRequested { index, sub })
            }
            client::SEGMENT_REQUEST | client::SEGMENT_REQUEST_TOGGLED => {
                zero_data_word(SERVICE, frame)?;
                Ok(SdoEvent::SegmentRequested { command })
            }
            client::ABORT => Err(self.abort(frame)),
            command => Err(ProtocolViolation::UnknownCommand {
                service: SERVICE,
                command,
            }),
        }
    }
}

/// Human-readable description of an SDO abort code (CiA 301 table 22).
pub fn abort_code_description(code: u32) -> &'static str {
    match code {
        0x0503_0000 => "Toggle bit not alternated",
        0x0504_0000 => "SDO protocol timed out",
        0x0504_0001 => "Client/server command specifier not valid or unknown",
        0x0504_0002 => "Invalid block size",
        0x0504_0003 => "Invalid sequence number",
        0x0504_0004 => "CRC error",
        0x0504_0005 => "Out of memory",
        0x0601_0000 => "Unsupported access to an object",
        0x0601_0001 => "Attempt to read a write only object",
        0x0601_0002 => "Attempt to write a read only object",
        0x0602_0000 => "Object does not exist in the object dictionary",
        0x0604_0041 => "Object cannot be mapped to the PDO",
        0x0604_0042 => "The number and length of the objects to be mapped would exceed PDO length",
        0x0604_0043 => "General parameter incompatibility reason",
        0x0604_0047 => "General internal incompatibility in the device",
        0x0606_0000 => "Access failed due to a hardware error",
        0x0607_0010 => "Data type does not match, length of service parameter does not match",
        0x0607_0012 => "Data type does not match, length of service parameter too high",
        0x0607_0013 => "Data type does not match, length of service parameter too low",
        0x0609_0011 => "Sub-index does not exist",
        0x0609_0030 => "Value range of parameter exceeded (only for write access)",
        0x0609_0031 => "Value of parameter written too high",
        0x0609_0032 => "Value of parameter written too low",
        0x0609_0036 => "Maximum value is less than minimum value",
        0x060A_0023 => "Resource not available: SDO connection",
        0x0800_0000 => "General error",
        0x0800_0020 => "Data cannot be transferred or stored to the application",
        0x0800_0021 => "Data cannot be transferred or stored to the application because of local control",
        0x0800_0022 => "Data cannot be transferred or stored to the application because of the present device state",
        0x0800_0023 => "Object dictionary dynamic generation fails or no object dictionary is present",
        0x0800_0024 => "No data available",
        _ => "Unknown abort code",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(sequence: u8, bytes: &[u8]) -> [u8; 8] {
        let mut frame = [0u8; 8];
        frame[0] = sequence;
        frame[1..1 + bytes.len()].copy_from_slice(bytes);
        frame
    }

    fn initiate(size: u32) -> [u8; 8] {
        let s = size.to_le_bytes();
        [0x41, 0x08, 0x10, 0x00, s[0], s[1], s[2], s[3]]
    }

    #[test]
    fn test_segmented_reassembly() {
        let mut tracker = SdoTracker::default();
        assert_eq!(
            tracker.server_frame(&initiate(16)),
            Ok(SdoEvent::SegmentedStarted { index: 0x1008, sub: 0, size: 16 })
        );
        assert_eq!(
            tracker.server_frame(&segment(0, b"CANopen")),
            Ok(SdoEvent::Segment { sequence: 0, remaining: 9 })
        );
        assert_eq!(
            tracker.server_frame(&segment(1, b" drive ")),
            Ok(SdoEvent::Segment { sequence: 1, remaining: 2 })
        );
        assert_eq!(
            tracker.server_frame(&segment(2, b"X1\0\0\0\0\0")),
            Ok(SdoEvent::SegmentedCompleted {
                index: 0x1008,
                sub: 0,
                data: b"CANopen drive X1".to_vec(),
            })
        );
        assert!(tracker.transfer().is_none());
    }

    #[test]
    fn test_sequence_wraps_after_32_segments() {
        let data: Vec<u8> = (0..250u32).map(|i| i as u8).collect();
        let mut tracker = SdoTracker::default();
        tracker.server_frame(&initiate(250)).unwrap();

        let chunks: Vec<&[u8]> = data.chunks(7).collect();
        let (last, body) = chunks.split_last().unwrap();
        for (i, chunk) in body.iter().enumerate() {
            let sequence = (i % 32) as u8;
            assert!(matches!(
                tracker.server_frame(&segment(sequence, chunk)),
                Ok(SdoEvent::Segment { .. })
            ));
        }
        let sequence = (body.len() % 32) as u8;
        assert_eq!(
            tracker.server_frame(&segment(sequence, last)),
            Ok(SdoEvent::SegmentedCompleted { index: 0x1008, sub: 0, data: data.clone() })
        );
        assert!(tracker.transfer().is_none());
    }

    #[test]
    fn test_zero_out_of_turn_restarts() {
        let mut tracker = SdoTracker::default();
        tracker.server_frame(&initiate(10)).unwrap();
        tracker.server_frame(&segment(0, b"garbage")).unwrap();
        assert_eq!(
            tracker.server_frame(&segment(0, b"0123456")),
            Ok(SdoEvent::Segment { sequence: 0, remaining: 3 })
        );
        assert_eq!(tracker.transfer().unwrap().buffer, b"0123456");
    }

    #[test]
    fn test_unordered_segment_keeps_accumulator() {
        let mut tracker = SdoTracker::default();
        tracker.server_frame(&initiate(16)).unwrap();
        tracker.server_frame(&segment(0, b"1234567")).unwrap();
        assert_eq!(
            tracker.server_frame(&segment(2, b"abcdefg")),
            Err(ProtocolViolation::UnorderedSegment { expected: 1, got: 2 })
        );
        let pending = tracker.transfer().unwrap();
        assert_eq!(pending.remaining, 9);
        assert_eq!(pending.buffer, b"1234567");
    }

    #[test]
    fn test_second_initiate_aborts_pending() {
        let mut tracker = SdoTracker::default();
        tracker.server_frame(&initiate(20)).unwrap();
        assert_eq!(
            tracker.server_frame(&initiate(4)),
            Err(ProtocolViolation::UnfinishedTransfer { index: 0x1008, sub: 0, remaining: 20 })
        );
        assert!(tracker.transfer().is_none());
    }

    #[test]
    fn test_orphan_segment() {
        let mut tracker = SdoTracker::default();
        assert_eq!(
            tracker.server_frame(&segment(0, b"abc")),
            Err(ProtocolViolation::OrphanSegment(0))
        );
    }

    #[test]
    fn test_expedited_padding() {
        let mut tracker = SdoTracker::default();
        let frame = [0x4B, 0x00, 0x20, 0x01, 0x34, 0x12, 0x00, 0x00];
        assert_eq!(
            tracker.server_frame(&frame),
            Ok(SdoEvent::Expedited { index: 0x2000, sub: 1, data: vec![0x34, 0x12] })
        );
        let frame = [0x4B, 0x00, 0x20, 0x01, 0x34, 0x12, 0xFF, 0x00];
        assert_eq!(
            tracker.server_frame(&frame),
            Err(ProtocolViolation::ChecksumMismatch { service: "TSDO", command: 0x4B })
        );
        let frame = [0x2F, 0x00, 0x20, 0x02, 0x07, 0x00, 0x00, 0x00];
        assert_eq!(
            tracker.client_frame(&frame),
            Ok(SdoEvent::Expedited { index: 0x2000, sub: 2, data: vec![0x07] })
        );
    }

    #[test]
    fn test_abort_and_unlisted() {
        let mut tracker = SdoTracker::default();
        let frame = [0x80, 0x00, 0x20, 0x01, 0x00, 0x00, 0x02, 0x06];
        match tracker.client_frame(&frame) {
            Err(ProtocolViolation::SdoAbort { code, description, .. }) => {
                assert_eq!(code, 0x0602_0000);
                assert_eq!(description, "Object does not exist in the object dictionary");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            tracker.client_frame(&[0x21, 0, 0, 0, 0, 0, 0, 0]),
            Err(ProtocolViolation::UnknownCommand { service: "RSDO", command: 0x21 })
        );
        assert_eq!(
            tracker.server_frame(&[0x42, 0, 0, 0, 0, 0, 0, 0]),
            Err(ProtocolViolation::UnknownCommand { service: "TSDO", command: 0x42 })
        );
    }
}
