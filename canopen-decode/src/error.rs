//! Error taxonomy of the decode pipeline.
//!
//! Only `ConfigError`, `TraceError` and `AdapterError` ever leave the
//! library as `Err`. Protocol violations and dictionary integrity problems
//! are reported as values, logged by whoever observed them, and processing
//! carries on with the next frame or section.

use std::io;
use std::path::PathBuf;

use crate::node::nmt::NmtState;
use crate::types::DataType;

/// Value conversion failures. They abort one conversion only; callers keep
/// the raw text or bytes instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("value {value} does not fit in {data_type}")]
    EncodeOverflow { data_type: DataType, value: String },
    #[error("{data_type} needs {expected} bytes, got {actual}")]
    SizeMismatch {
        data_type: DataType,
        expected: usize,
        actual: usize,
    },
    #[error("cannot read {text:?} as {data_type}")]
    InvalidText { data_type: DataType, text: String },
    #[error("value {value} cannot be encoded as {data_type}")]
    TypeMismatch { data_type: DataType, value: String },
}

/// Failures loading an EDS/DCF file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported configuration file extension: {0}")]
    UnsupportedExtension(PathBuf),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse {name}: {reason}")]
    Syntax { name: String, reason: String },
}

/// Object dictionary consistency problems found after loading an object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityWarning {
    #[error("0x{index:04X}: SubNumber {declared} but {actual} subindexes")]
    SubNumberMismatch { index: u16, declared: u64, actual: usize },
    #[error("0x{index:04X}: SubNumber is zero")]
    SubNumberZero { index: u16 },
    #[error("0x{index:04X}: sub 0 declares {declared} entries but {populated} are populated")]
    MappedCountMismatch {
        index: u16,
        declared: i128,
        populated: usize,
    },
    #[error("0x{index:04X}: sub 0 uses {declared} of {populated} populated entries")]
    MappedCountUnused {
        index: u16,
        declared: i128,
        populated: usize,
    },
    #[error("0x{index:04X}: sub 0 holds no entry count")]
    MappedCountUnknown { index: u16 },
    #[error("0x{index:04X}: NrOfEntries {entries} differs from CompactSubObj {compact}")]
    CompactEntriesMismatch { index: u16, entries: i128, compact: i128 },
}

/// A frame the node state machine refuses to store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("{service} expects DLC {expected}, got {actual}")]
    DlcMismatch {
        service: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("unknown NMT command 0x{0:02X}")]
    UnknownNmtCommand(u8),
    #[error("NMT already in {0:?}")]
    NmtSameState(NmtState),
    #[error("NMT transition {from:?} -> {to:?} not allowed")]
    NmtTransition { from: NmtState, to: NmtState },
    #[error("reserved COB-ID 0x{0:03X}")]
    ReservedCobId(u32),
    #[error("unknown COB-ID 0x{0:03X}")]
    UnknownCobId(u32),
    #[error("{service} command 0x{command:02X} unlisted")]
    UnknownCommand { service: &'static str, command: u8 },
    #[error("{service} command 0x{command:02X} has non-zero padding")]
    ChecksumMismatch { service: &'static str, command: u8 },
    #[error("segment 0x{got:02X} out of order, expected 0x{expected:02X}")]
    UnorderedSegment { expected: u8, got: u8 },
    #[error("segmented transfer 0x{index:04X}:{sub:02X} unfinished, {remaining} bytes missing")]
    UnfinishedTransfer { index: u16, sub: u8, remaining: u32 },
    #[error("segment 0x{0:02X} without initiated transfer")]
    OrphanSegment(u8),
    #[error("SDO abort 0x{index:04X}:{sub:02X} code 0x{code:08X}: {description}")]
    SdoAbort {
        index: u16,
        sub: u8,
        code: u32,
        description: String,
    },
    #[error("node id {0} impossible")]
    ImpossibleNodeId(u32),
}

impl ProtocolViolation {
    /// Log level the violation is reported at.
    pub fn level(&self) -> log::Level {
        match self {
            ProtocolViolation::ReservedCobId(cob_id) if *cob_id < 0x080 => log::Level::Info,
            _ => log::Level::Error,
        }
    }
}

/// Trace file reading failures.
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("cannot read trace {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
}

/// Live adapter failures.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("unsupported adapter {0}")]
    Unsupported(String),
    #[error("cannot connect to {bus}: {source}")]
    Connection {
        bus: String,
        #[source]
        source: io::Error,
    },
    #[error("read error: {0}")]
    Io(#[from] io::Error),
}
