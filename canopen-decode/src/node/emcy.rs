//! Emergency object decoding.

/// Payload of an EMCY frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emergency {
    pub error_code: u16,
    /// Copy of object 0x1001.
    pub error_register: u8,
    pub vendor: [u8; 5],
}

impl Emergency {
    pub fn parse(frame: &[u8; 8]) -> Self {
        Self {
            error_code: u16::from_le_bytes([frame[0], frame[1]]),
            error_register: frame[2],
            vendor: [frame[3], frame[4], frame[5], frame[6], frame[7]],
        }
    }

    pub fn class(&self) -> &'static str {
        error_class(self.error_code)
    }
}

/// Error class of an emergency error code, from its high byte.
pub fn error_class(code: u16) -> &'static str {
    let high = (code >> 8) as u8;
    match high {
        0x00 => "no error or reset",
        0x10 => "generic error",
        0x20 => "current",
        0x21 => "current, device input side",
        0x22 => "current inside the device",
        0x23 => "current, device output side",
        0x30 => "voltage",
        0x31 => "mains voltage",
        0x32 => "voltage inside the device",
        0x33 => "output voltage",
        0x40 => "temperature",
        0x41 => "ambient temperature",
        0x42 => "device temperature",
        0x50 => "device hardware",
        0x60 => "device software",
        0x61 => "internal software",
        0x62 => "user software",
        0x63 => "data set",
        0x70 => "additional modules",
        0x80 => "monitoring",
        0x81 => "communication",
        0x82 => "protocol error",
        0x90 => "external error",
        0xF0 => "additional functions",
        0xFF => "device specific",
        _ if high & 0x0F != 0 => error_class(u16::from(high & 0xF0) << 8),
        _ => "unknown error class",
    }
}
