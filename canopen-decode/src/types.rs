//! CANopen data model shared by the codec, the dictionary loader and the
//! node state machines.

use std::cmp::Ordering;
use std::fmt;

/// CANopen basic and structured data types (CiA 301 table 44).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum DataType {
    Boolean = 0x01,
    Integer8 = 0x02,
    Integer16 = 0x03,
    Integer32 = 0x04,
    Unsigned8 = 0x05,
    Unsigned16 = 0x06,
    Unsigned32 = 0x07,
    Real32 = 0x08,
    VisibleString = 0x09,
    OctetString = 0x0A,
    UnicodeString = 0x0B,
    TimeOfDay = 0x0C,
    TimeDifference = 0x0D,
    Domain = 0x0F,
    Integer24 = 0x10,
    Real64 = 0x11,
    Integer40 = 0x12,
    Integer48 = 0x13,
    Integer56 = 0x14,
    Integer64 = 0x15,
    Unsigned24 = 0x16,
    Unsigned40 = 0x18,
    Unsigned48 = 0x19,
    Unsigned56 = 0x1A,
    Unsigned64 = 0x1B,
    PdoCommParam = 0x20,
    PdoMapParam = 0x21,
    SdoParam = 0x22,
    Identity = 0x23,
}

impl DataType {
    /// Maps the numeric code found in `DataType=` EDS keys.
    pub fn from_code(code: u16) -> Option<Self> {
        use DataType::*;
        let data_type = match code {
            0x01 => Boolean,
            0x02 => Integer8,
            0x03 => Integer16,
            0x04 => Integer32,
            0x05 => Unsigned8,
            0x06 => Unsigned16,
            0x07 => Unsigned32,
            0x08 => Real32,
            0x09 => VisibleString,
            0x0A => OctetString,
            0x0B => UnicodeString,
            0x0C => TimeOfDay,
            0x0D => TimeDifference,
            0x0F => Domain,
            0x10 => Integer24,
            0x11 => Real64,
            0x12 => Integer40,
            0x13 => Integer48,
            0x14 => Integer56,
            0x15 => Integer64,
            0x16 => Unsigned24,
            0x18 => Unsigned40,
            0x19 => Unsigned48,
            0x1A => Unsigned56,
            0x1B => Unsigned64,
            0x20 => PdoCommParam,
            0x21 => PdoMapParam,
            0x22 => SdoParam,
            0x23 => Identity,
            _ => return None,
        };
        Some(data_type)
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    /// Encoded size in bytes, `None` for types that consume the remaining bytes.
    pub fn size(self) -> Option<usize> {
        use DataType::*;
        match self {
            Boolean | Integer8 | Unsigned8 => Some(1),
            Integer16 | Unsigned16 => Some(2),
            Integer24 | Unsigned24 => Some(3),
            Integer32 | Unsigned32 | Real32 => Some(4),
            Integer40 | Unsigned40 => Some(5),
            Integer48 | Unsigned48 | TimeOfDay | TimeDifference => Some(6),
            Integer56 | Unsigned56 => Some(7),
            Integer64 | Unsigned64 | Real64 => Some(8),
            VisibleString | OctetString | UnicodeString | Domain => None,
            PdoCommParam | PdoMapParam | SdoParam | Identity => None,
        }
    }

    pub fn is_boolean(self) -> bool {
        self == DataType::Boolean
    }

    pub fn is_integer(self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub fn is_signed(self) -> bool {
        use DataType::*;
        matches!(
            self,
            Integer8 | Integer16 | Integer24 | Integer32 | Integer40 | Integer48 | Integer56 | Integer64
        )
    }

    pub fn is_unsigned(self) -> bool {
        use DataType::*;
        matches!(
            self,
            Unsigned8
                | Unsigned16
                | Unsigned24
                | Unsigned32
                | Unsigned40
                | Unsigned48
                | Unsigned56
                | Unsigned64
        )
    }

    pub fn is_real(self) -> bool {
        matches!(self, DataType::Real32 | DataType::Real64)
    }

    /// VisibleString, OctetString and UnicodeString.
    pub fn is_string(self) -> bool {
        matches!(
            self,
            DataType::VisibleString | DataType::OctetString | DataType::UnicodeString
        )
    }

    pub fn is_time(self) -> bool {
        matches!(self, DataType::TimeOfDay | DataType::TimeDifference)
    }

    /// Every type the codec knows, in code order.
    pub fn all() -> impl Iterator<Item = DataType> {
        (0u16..=0x23).filter_map(DataType::from_code)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Object access rights as written in `AccessType=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    Const,
    ReadOnly,
    ReadWrite,
    ReadWriteRead,
    ReadWriteWrite,
    WriteOnly,
}

impl AccessType {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "const" => Some(Self::Const),
            "ro" => Some(Self::ReadOnly),
            "rw" => Some(Self::ReadWrite),
            "rwr" => Some(Self::ReadWriteRead),
            "rww" => Some(Self::ReadWriteWrite),
            "wo" => Some(Self::WriteOnly),
            _ => None,
        }
    }
}

/// Object code as written in `ObjectType=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Null = 0x0,
    Domain = 0x2,
    Deftype = 0x5,
    Defstruct = 0x6,
    Var = 0x7,
    Array = 0x8,
    Record = 0x9,
}

impl ObjectType {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x0 => Some(Self::Null),
            0x2 => Some(Self::Domain),
            0x5 => Some(Self::Deftype),
            0x6 => Some(Self::Defstruct),
            0x7 => Some(Self::Var),
            0x8 => Some(Self::Array),
            0x9 => Some(Self::Record),
            _ => None,
        }
    }
}

/// A decoded CANopen value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    /// Wide enough for every signed and unsigned integer type up to 64 bits.
    Integer(i128),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Boolean(b) => Some(i128::from(*b)),
            Value::Bytes(bytes) if !bytes.is_empty() && bytes.len() <= 16 => {
                let mut buf = [0u8; 16];
                buf[..bytes.len()].copy_from_slice(bytes);
                Some(u128::from_le_bytes(buf) as i128)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "{:02X?}", v),
        }
    }
}

/// Frame timestamp in seconds, totally ordered so it can key a map.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp(pub f64);

impl Timestamp {
    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl From<f64> for Timestamp {
    fn from(seconds: f64) -> Self {
        Timestamp(seconds)
    }
}

/// One frame as seen on the bus or read back from a trace.
#[derive(Debug, Clone, PartialEq)]
pub struct BusFrame {
    pub timestamp: f64,
    pub channel: u32,
    pub cob_id: u32,
    pub data: Vec<u8>,
}
