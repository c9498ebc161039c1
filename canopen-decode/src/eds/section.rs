//! Section name classification.
//!
//! Matchers run in a fixed order: `<hex>sub<hex>`, then `<hex>value`, then a
//! bare hex index. A name that hex-parses is an object even when it was
//! meant as a named section.

/// What an EDS section describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// `[1018sub2]`
    SubObject { index: u16, sub: u8 },
    /// `[1003Value]`, positional values of a compact object.
    CompactValue { index: u16 },
    /// `[1018]`, object-level metadata.
    Object { index: u16 },
    /// `[FileInfo]`, `[Comments]`, `[MandatoryObjects]`...
    Parameter,
}

impl SectionKind {
    pub fn index(self) -> Option<u16> {
        match self {
            SectionKind::SubObject { index, .. }
            | SectionKind::CompactValue { index }
            | SectionKind::Object { index } => Some(index),
            SectionKind::Parameter => None,
        }
    }
}

fn hex_u16(text: &str) -> Option<u16> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(text, 16).ok()
}

fn hex_u8(text: &str) -> Option<u8> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(text, 16).ok()
}

fn sub_object(name: &str) -> Option<SectionKind> {
    let (index, sub) = name.split_once("sub")?;
    Some(SectionKind::SubObject {
        index: hex_u16(index)?,
        sub: hex_u8(sub)?,
    })
}

fn compact_value(name: &str) -> Option<SectionKind> {
    let index = name.strip_suffix("value")?;
    Some(SectionKind::CompactValue {
        index: hex_u16(index)?,
    })
}

fn bare_object(name: &str) -> Option<SectionKind> {
    Some(SectionKind::Object {
        index: hex_u16(name)?,
    })
}

/// Classifies a section name, falling back to a named parameter section.
pub fn classify(name: &str) -> SectionKind {
    let name = name.trim().to_ascii_lowercase();
    let matchers: [fn(&str) -> Option<SectionKind>; 3] = [sub_object, compact_value, bare_object];
    matchers
        .iter()
        .find_map(|matcher| matcher(&name))
        .unwrap_or(SectionKind::Parameter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_objects() {
        assert_eq!(classify("1018sub0"), SectionKind::SubObject { index: 0x1018, sub: 0 });
        assert_eq!(classify("1A00Sub1F"), SectionKind::SubObject { index: 0x1A00, sub: 0x1F });
        assert_eq!(classify("1003Value"), SectionKind::CompactValue { index: 0x1003 });
        assert_eq!(classify("6064"), SectionKind::Object { index: 0x6064 });
    }

    #[test]
    fn test_classify_parameters() {
        assert_eq!(classify("FileInfo"), SectionKind::Parameter);
        assert_eq!(classify("Comments"), SectionKind::Parameter);
        assert_eq!(classify("MandatoryObjects"), SectionKind::Parameter);
        // sub part not hex
        assert_eq!(classify("1018subx"), SectionKind::Parameter);
        // index too wide
        assert_eq!(classify("123456"), SectionKind::Parameter);
    }

    #[test]
    fn test_hex_names_are_objects() {
        assert_eq!(classify("ADD"), SectionKind::Object { index: 0x0ADD });
    }
}
