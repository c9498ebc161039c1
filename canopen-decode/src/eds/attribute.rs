//! EDS/DCF key vocabulary and typed attribute values.

use std::fmt;

use log::warn;

use crate::codec::{parse_integer, value_from_text};
use crate::types::{AccessType, DataType, ObjectType, Value};

macro_rules! attributes {
    ($($variant:ident => $key:literal : $data_type:ident,)*) => {
        /// Every key the loader understands, matched case-insensitively.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Attribute {
            $($variant,)*
            /// Values collected from unnamed keys of a parameter section.
            List,
        }

        impl Attribute {
            pub fn from_key(key: &str) -> Option<Self> {
                let key = key.trim();
                $(if key.eq_ignore_ascii_case($key) {
                    return Some(Attribute::$variant);
                })*
                None
            }

            pub fn key(self) -> &'static str {
                match self {
                    $(Attribute::$variant => $key,)*
                    Attribute::List => "List",
                }
            }

            /// Type the raw text of this key is read as.
            pub fn value_type(self) -> DataType {
                match self {
                    $(Attribute::$variant => DataType::$data_type,)*
                    Attribute::List => DataType::VisibleString,
                }
            }
        }
    };
}

attributes! {
    AccessType => "AccessType": VisibleString,
    BaudRate10 => "BaudRate_10": Boolean,
    BaudRate20 => "BaudRate_20": Boolean,
    BaudRate50 => "BaudRate_50": Boolean,
    BaudRate125 => "BaudRate_125": Boolean,
    BaudRate250 => "BaudRate_250": Boolean,
    BaudRate500 => "BaudRate_500": Boolean,
    BaudRate800 => "BaudRate_800": Boolean,
    BaudRate1000 => "BaudRate_1000": Boolean,
    Baudrate => "Baudrate": Unsigned16,
    CanopenManager => "CANopenManager": Unsigned16,
    CompactPdo => "CompactPDO": Unsigned16,
    CompactSubObj => "CompactSubObj": Unsigned8,
    CreatedBy => "CreatedBy": VisibleString,
    CreationDate => "CreationDate": VisibleString,
    CreationTime => "CreationTime": VisibleString,
    DataType => "DataType": Unsigned16,
    DefaultValue => "DefaultValue": VisibleString,
    Description => "Description": VisibleString,
    DynamicChannelsSupported => "DynamicChannelsSupported": Unsigned8,
    EdsVersion => "EDSVersion": Real32,
    FileName => "FileName": VisibleString,
    FileRevision => "FileRevision": Unsigned16,
    FileVersion => "FileVersion": Unsigned16,
    Granularity => "Granularity": Unsigned8,
    GroupMessaging => "GroupMessaging": Unsigned8,
    HighLimit => "HighLimit": Unsigned32,
    LssSerialNumber => "LSS_SerialNumber": Unsigned8,
    LssSupported => "LSS_Supported": Unsigned8,
    LastEds => "LastEDS": VisibleString,
    Lines => "Lines": Unsigned16,
    LowLimit => "LowLimit": Unsigned32,
    ModificationDate => "ModificationDate": VisibleString,
    ModificationTime => "ModificationTime": VisibleString,
    ModifiedBy => "ModifiedBy": VisibleString,
    NetNumber => "NetNumber": Unsigned8,
    NodeId => "NodeID": Unsigned8,
    NodeName => "NodeName": VisibleString,
    NrOfEntries => "NrOfEntries": Unsigned8,
    NrOfRxPdo => "NrOfRXPDO": Unsigned8,
    NrOfTxPdo => "NrOfTXPDO": Unsigned8,
    ObjFlags => "ObjFlags": Unsigned32,
    ObjectType => "ObjectType": Unsigned8,
    OrderCode => "OrderCode": VisibleString,
    PdoMapping => "PDOMapping": Unsigned8,
    ParameterName => "ParameterName": VisibleString,
    ParameterValue => "ParameterValue": VisibleString,
    ProductName => "ProductName": VisibleString,
    ProductNumber => "ProductNumber": Unsigned32,
    RevisionNumber => "RevisionNumber": Unsigned16,
    SimpleBootUpMaster => "SimpleBootUpMaster": Boolean,
    SimpleBootUpSlave => "SimpleBootUpSlave": Boolean,
    SubNumber => "SubNumber": Unsigned16,
    SupportedObjects => "SupportedObjects": Unsigned8,
    VendorName => "VendorName": VisibleString,
    VendorNumber => "VendorNumber": Unsigned32,
}

impl Attribute {
    /// Keys whose text is typed by the entry's own `DataType`.
    pub fn is_value(self) -> bool {
        matches!(self, Attribute::DefaultValue | Attribute::ParameterValue)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Typed value of one attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Value(Value),
    /// Text kept as written until its type is known.
    Raw(String),
    Access(AccessType),
    DataType(DataType),
    ObjectType(ObjectType),
    List(Vec<Value>),
}

impl AttrValue {
    /// Converts `text` following the attribute's own type.
    pub fn convert(attribute: Attribute, text: &str) -> AttrValue {
        match attribute {
            Attribute::AccessType => match AccessType::parse(text) {
                Some(access) => AttrValue::Access(access),
                None => {
                    warn!("{}: unknown access type {:?}", attribute, text);
                    AttrValue::Raw(text.to_string())
                }
            },
            Attribute::DataType => {
                match parse_integer(text)
                    .and_then(|code| u16::try_from(code).ok())
                    .and_then(DataType::from_code)
                {
                    Some(data_type) => AttrValue::DataType(data_type),
                    None => {
                        warn!("{}: unknown data type {:?}", attribute, text);
                        AttrValue::Raw(text.to_string())
                    }
                }
            }
            Attribute::ObjectType => {
                match parse_integer(text)
                    .and_then(|code| u8::try_from(code).ok())
                    .and_then(ObjectType::from_code)
                {
                    Some(object_type) => AttrValue::ObjectType(object_type),
                    None => {
                        warn!("{}: unknown object type {:?}", attribute, text);
                        AttrValue::Raw(text.to_string())
                    }
                }
            }
            _ => match value_from_text(attribute.value_type(), text) {
                Ok(value) => AttrValue::Value(value),
                Err(e) => {
                    warn!("{}: {}", attribute, e);
                    AttrValue::Raw(text.to_string())
                }
            },
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            AttrValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i128> {
        self.as_value().and_then(Value::as_integer)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Value(Value::Text(text)) | AttrValue::Raw(text) => Some(text),
            _ => None,
        }
    }
}
