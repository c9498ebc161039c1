//! Section-by-section EDS/DCF loading.

use log::{debug, error, warn};

use super::attribute::{AttrValue, Attribute};
use super::cache::CobIdCache;
use super::section::{classify, SectionKind};
use super::{strip_node_id, DictObject, ObjectDictionary, SubEntry, SubKey};
use crate::codec::{parse_integer, value_from_text};
use crate::error::IntegrityWarning;
use crate::types::{DataType, Value};

pub(crate) type Sections = Vec<(String, Vec<(String, String)>)>;

/// Object-level attributes not carried over to synthesized compact subs.
const OBJECT_ONLY: [Attribute; 4] = [
    Attribute::CompactSubObj,
    Attribute::NrOfEntries,
    Attribute::SubNumber,
    Attribute::ObjectType,
];

pub(crate) fn parse(name: &str, sections: Sections) -> ObjectDictionary {
    let mut loader = Loader {
        dictionary: ObjectDictionary {
            name: name.to_string(),
            ..ObjectDictionary::default()
        },
        last_index: None,
    };

    for (section, properties) in &sections {
        match classify(section) {
            SectionKind::Parameter => loader.load_parameter(section, properties),
            kind => loader.load_object(section, kind, properties),
        }
    }
    if let Some(index) = loader.last_index {
        loader.check(index);
    }

    let mut dictionary = loader.dictionary;
    dictionary.cache = CobIdCache::build(dictionary.objects.iter().map(|(k, v)| (*k, v)));
    dictionary
}

struct Loader {
    dictionary: ObjectDictionary,
    last_index: Option<u16>,
}

/// Converts a `DefaultValue`/`ParameterValue`, keeping the text when the
/// type is not known yet.
fn convert_value(data_type: Option<DataType>, text: &str) -> AttrValue {
    let Some(data_type) = data_type else {
        return AttrValue::Raw(text.to_string());
    };
    match value_from_text(data_type, strip_node_id(text)) {
        Ok(value) => AttrValue::Value(value),
        Err(e) => {
            warn!("{}", e);
            AttrValue::Raw(text.to_string())
        }
    }
}

impl Loader {
    fn load_parameter(&mut self, section: &str, properties: &[(String, String)]) {
        let comments = section.eq_ignore_ascii_case("comments");
        let (count_attribute, item_type) = if comments {
            (Attribute::Lines, DataType::VisibleString)
        } else {
            (Attribute::SupportedObjects, DataType::Unsigned16)
        };

        let mut entry = SubEntry::default();
        let mut items: Vec<Value> = Vec::new();
        let mut listing = false;

        for (key, text) in properties {
            if !listing {
                if let Some(attribute) = Attribute::from_key(key) {
                    entry.insert(attribute, AttrValue::convert(attribute, text));
                    continue;
                }
            }

            let Some(count) = entry.integer(count_attribute) else {
                error!("[{}] {}: unknown key", section, key);
                continue;
            };
            listing = true;
            if (items.len() as i128) < count {
                let item = value_from_text(item_type, text).unwrap_or_else(|_| Value::Text(text.clone()));
                items.push(item);
            } else {
                error!(
                    "[{}] {}: list overshoot, {} declared by {}",
                    section, key, count, count_attribute
                );
            }
        }

        if listing {
            if let Some(count) = entry.integer(count_attribute) {
                if (items.len() as i128) < count {
                    warn!("[{}] list holds {} of {} items", section, items.len(), count);
                }
            }
            entry.insert(Attribute::List, AttrValue::List(items));
        }
        self.dictionary.parameters.insert(section.to_string(), entry);
    }

    fn load_object(&mut self, section: &str, kind: SectionKind, properties: &[(String, String)]) {
        let (index, key, compact) = match kind {
            SectionKind::SubObject { index, sub } => (index, SubKey::Sub(sub), false),
            SectionKind::CompactValue { index } => (index, SubKey::Object, true),
            SectionKind::Object { index } => (index, SubKey::Object, false),
            SectionKind::Parameter => return,
        };

        if let Some(previous) = self.last_index {
            if previous != index {
                self.check(previous);
            }
        }
        self.last_index = Some(index);

        let object = self.dictionary.objects.entry(index).or_default();
        object.entry_mut(key);

        let compact_count = if compact {
            let count = object.header().and_then(|h| h.integer(Attribute::CompactSubObj));
            if count.is_none() {
                error!("[{}] CompactSubObj unknown (possible orphan?)", section);
            }
            count
        } else {
            None
        };

        for (name, text) in properties {
            match Attribute::from_key(name) {
                Some(attribute) => {
                    let entry = object.entry_mut(key);
                    let value = if attribute.is_value() {
                        convert_value(entry.data_type(), text)
                    } else {
                        AttrValue::convert(attribute, text)
                    };

                    if compact && attribute == Attribute::NrOfEntries {
                        if let (Some(entries), Some(count)) = (value.as_integer(), compact_count) {
                            if entries != count {
                                let warning = IntegrityWarning::CompactEntriesMismatch {
                                    index,
                                    entries,
                                    compact: count,
                                };
                                error!("{}", warning);
                                self.dictionary.warnings.push(warning);
                            }
                        }
                    }
                    entry.insert(attribute, value);
                }
                None if compact => synthesize_compact_sub(object, section, name, text),
                None => debug!("[{}] {}: ignored key", section, name),
            }
        }
    }

    fn check(&mut self, index: u16) {
        let Some(object) = self.dictionary.objects.get(&index) else {
            return;
        };
        for warning in check_object_integrity(index, object) {
            match warning {
                IntegrityWarning::MappedCountUnused { .. } => warn!("{}", warning),
                _ => error!("{}", warning),
            }
            self.dictionary.warnings.push(warning);
        }
    }
}

/// Adds subindex `key` to a compact object from a `[xxxxValue]` line.
fn synthesize_compact_sub(object: &mut DictObject, section: &str, key: &str, text: &str) {
    let Some(sub) = parse_integer(key).and_then(|n| u8::try_from(n).ok()) else {
        error!("[{}] {}: not a subindex", section, key);
        return;
    };
    let Some(mut template) = object.header().cloned() else {
        debug!("[{}] no object template for sub {}", section, sub);
        return;
    };
    for attribute in OBJECT_ONLY {
        template.remove(attribute);
    }

    let value = match template.data_type() {
        Some(data_type) => convert_value(Some(data_type), text),
        None => {
            error!("[{}] {}: DataType missing on compact template", section, key);
            AttrValue::Raw(text.to_string())
        }
    };
    template.insert(Attribute::ParameterValue, value);
    object.insert(SubKey::Sub(sub), template);
}

/// Checks SubNumber and the sub 0 entry count of one object.
pub fn check_object_integrity(index: u16, object: &DictObject) -> Vec<IntegrityWarning> {
    let mut warnings = Vec::new();
    let Some(declared) = object.header().and_then(|h| h.integer(Attribute::SubNumber)) else {
        return warnings;
    };
    if declared <= 0 {
        warnings.push(IntegrityWarning::SubNumberZero { index });
        return warnings;
    }

    let mut populated = object.sub_count();
    if declared != populated as i128 {
        warnings.push(IntegrityWarning::SubNumberMismatch {
            index,
            declared: declared as u64,
            actual: populated,
        });
    }

    match object.sub(0).and_then(|e| e.value()).and_then(|v| v.as_integer()) {
        Some(mapped) if mapped > 0 => {
            // sub 0 counts the others, not itself
            populated = populated.saturating_sub(1);
            if mapped < populated as i128 {
                warnings.push(IntegrityWarning::MappedCountUnused {
                    index,
                    declared: mapped,
                    populated,
                });
            } else if mapped != populated as i128 {
                warnings.push(IntegrityWarning::MappedCountMismatch {
                    index,
                    declared: mapped,
                    populated,
                });
            }
        }
        Some(_) => {}
        None => warnings.push(IntegrityWarning::MappedCountUnknown { index }),
    }
    warnings
}
