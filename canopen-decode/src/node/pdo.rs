//! Bit-level unpacking of PDO payloads.

/// One `index:sub:bits` descriptor from a PDO mapping parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingEntry {
    pub index: u16,
    pub sub: u8,
    pub bits: u8,
}

impl MappingEntry {
    /// Decodes `index << 16 | sub << 8 | bits`.
    pub fn from_descriptor(descriptor: u32) -> Self {
        Self {
            index: (descriptor >> 16) as u16,
            sub: (descriptor >> 8) as u8,
            bits: descriptor as u8,
        }
    }

    pub fn descriptor(self) -> u32 {
        (u32::from(self.index) << 16) | (u32::from(self.sub) << 8) | u32::from(self.bits)
    }

    /// Whole bytes the field occupies once repacked.
    pub fn byte_len(self) -> usize {
        usize::from(self.bits).div_ceil(8).max(1)
    }
}

/// Reads a payload as one little-endian bitstream, lowest bit first.
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Next `bits` bits as little-endian bytes. Bits past the payload read as zero.
    pub fn read(&mut self, bits: usize, byte_len: usize) -> Vec<u8> {
        let mut out = vec![0u8; byte_len];
        for i in 0..bits {
            let bit = self.position + i;
            let byte = self.data.get(bit / 8).copied().unwrap_or(0);
            if (byte >> (bit % 8)) & 1 == 1 {
                out[i / 8] |= 1 << (i % 8);
            }
        }
        self.position += bits;
        out
    }

    /// Payload bits not consumed yet, negative after reading past the end.
    pub fn remaining(&self) -> isize {
        (self.data.len() * 8) as isize - self.position as isize
    }
}

/// Splits `payload` along `entries`, returning each field's bytes and the
/// leftover bit count.
pub fn unpack(payload: &[u8], entries: &[MappingEntry]) -> (Vec<(MappingEntry, Vec<u8>)>, isize) {
    let mut reader = BitReader::new(payload);
    let fields = entries
        .iter()
        .map(|entry| (*entry, reader.read(usize::from(entry.bits), entry.byte_len())))
        .collect();
    (fields, reader.remaining())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        let entry = MappingEntry::from_descriptor(0x6064_0020);
        assert_eq!(entry, MappingEntry { index: 0x6064, sub: 0, bits: 32 });
        assert_eq!(entry.descriptor(), 0x6064_0020);
        assert_eq!(MappingEntry::from_descriptor(0x2000_0101).byte_len(), 1);
        assert_eq!(MappingEntry::from_descriptor(0x2000_010C).byte_len(), 2);
    }

    #[test]
    fn test_byte_aligned_fields() {
        let entries = [
            MappingEntry { index: 0x2000, sub: 1, bits: 16 },
            MappingEntry { index: 0x2001, sub: 2, bits: 8 },
        ];
        let (fields, remaining) = unpack(&[0x12, 0x34, 0x56], &entries);
        assert_eq!(fields[0].1, vec![0x12, 0x34]);
        assert_eq!(fields[1].1, vec![0x56]);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_bit_fields() {
        // 0b1011_0110: 3 bits 110, 1 bit 0, 4 bits 1011
        let entries = [
            MappingEntry { index: 0x2100, sub: 1, bits: 3 },
            MappingEntry { index: 0x2100, sub: 2, bits: 1 },
            MappingEntry { index: 0x2100, sub: 3, bits: 4 },
            MappingEntry { index: 0x2100, sub: 4, bits: 12 },
        ];
        let (fields, remaining) = unpack(&[0b1011_0110, 0xCD, 0xAB], &entries);
        assert_eq!(fields[0].1, vec![0b110]);
        assert_eq!(fields[1].1, vec![0]);
        assert_eq!(fields[2].1, vec![0b1011]);
        assert_eq!(fields[3].1, vec![0xCD, 0x0B]);
        assert_eq!(remaining, 4);
    }

    #[test]
    fn test_overshoot() {
        let entries = [MappingEntry { index: 0x2000, sub: 1, bits: 32 }];
        let (fields, remaining) = unpack(&[0xFF, 0xFF], &entries);
        assert_eq!(fields[0].1, vec![0xFF, 0xFF, 0x00, 0x00]);
        assert_eq!(remaining, -16);
    }
}
