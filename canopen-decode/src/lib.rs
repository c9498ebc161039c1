//! # CANopen decoding library
//!
//! Passive decoder for CANopen (CiA 301) traffic, fed from a recorded trace
//! or a live adapter.
//!
//! This library provides:
//! - Object dictionaries loaded from EDS/DCF files
//! - Per-node NMT, SDO, PDO, EMCY, TIME and heartbeat decoding
//! - Channel routing and a bus manager for replay and live capture
//! - Value encoding/decoding for every CiA 301 data type

pub mod adapter;
pub mod bus;
pub mod channel;
pub mod codec;
pub mod eds;
pub mod error;
pub mod node;
pub mod trace;
pub mod types;

pub use adapter::{open_adapter, FrameSource, SocketCanSource};
pub use bus::{BusManager, DictionaryCache, ReplayStats};
pub use channel::{Channel, Routed};
pub use codec::{bytes_from_value, value_from_bytes, value_from_text};
pub use eds::ObjectDictionary;
pub use error::{AdapterError, CodecError, ConfigError, IntegrityWarning, ProtocolViolation, TraceError};
pub use node::{NodeProtocol, ServiceEvent};
pub use trace::{TraceFormat, TraceReader};
pub use types::{BusFrame, DataType, Value};
