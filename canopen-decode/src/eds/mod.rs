//! # Object dictionary
//!
//! Static object dictionary built from an EDS or DCF file. Sections are
//! parsed with `configparser`, classified by name and loaded into typed
//! sub-entries; PDO/SDO COB-ID caches are derived once loading is done.
//! A dictionary never changes after it is built and is shared read-only
//! between every node configured with the same file.

pub mod attribute;
pub mod cache;
mod loader;
pub mod section;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use configparser::ini::Ini;
use log::info;

use crate::codec::value_from_text;
use crate::error::{ConfigError, IntegrityWarning};
use crate::types::{DataType, Value};

pub use attribute::{AttrValue, Attribute};
pub use cache::{CobIdCache, Direction};
pub use loader::check_object_integrity;
pub use section::{classify, SectionKind};

/// Key of a sub-entry inside one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubKey {
    /// Whole-object metadata from a bare `[1018]` section.
    Object,
    Sub(u8),
}

/// Attributes of one subindex (or of the whole object).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubEntry {
    attributes: BTreeMap<Attribute, AttrValue>,
}

impl SubEntry {
    pub fn get(&self, attribute: Attribute) -> Option<&AttrValue> {
        self.attributes.get(&attribute)
    }

    pub fn insert(&mut self, attribute: Attribute, value: AttrValue) {
        self.attributes.insert(attribute, value);
    }

    pub fn remove(&mut self, attribute: Attribute) -> Option<AttrValue> {
        self.attributes.remove(&attribute)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (Attribute, &AttrValue)> {
        self.attributes.iter().map(|(k, v)| (*k, v))
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self.get(Attribute::DataType)? {
            AttrValue::DataType(data_type) => Some(*data_type),
            _ => None,
        }
    }

    pub fn parameter_name(&self) -> Option<&str> {
        self.get(Attribute::ParameterName)?.as_text()
    }

    pub fn integer(&self, attribute: Attribute) -> Option<i128> {
        self.get(attribute)?.as_integer()
    }

    /// `DefaultValue` or `ParameterValue`, converting text still held raw.
    pub fn resolve(&self, attribute: Attribute) -> Option<Value> {
        match self.get(attribute)? {
            AttrValue::Value(value) => Some(value.clone()),
            AttrValue::Raw(text) => value_from_text(self.data_type()?, strip_node_id(text)).ok(),
            _ => None,
        }
    }

    pub fn default_value(&self) -> Option<Value> {
        self.resolve(Attribute::DefaultValue)
    }

    /// Configured value: `ParameterValue` first, then `DefaultValue`.
    pub fn value(&self) -> Option<Value> {
        self.resolve(Attribute::ParameterValue)
            .or_else(|| self.default_value())
    }
}

/// Drops the `$NODEID+` prefix of node-relative defaults.
pub(crate) fn strip_node_id(text: &str) -> &str {
    const TOKEN: &str = "$NODEID+";
    let trimmed = text.trim();
    match trimmed.get(..TOKEN.len()) {
        Some(head) if head.eq_ignore_ascii_case(TOKEN) => trimmed[TOKEN.len()..].trim(),
        _ => trimmed,
    }
}

/// All sub-entries of one index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DictObject {
    entries: BTreeMap<SubKey, SubEntry>,
}

impl DictObject {
    pub fn header(&self) -> Option<&SubEntry> {
        self.entries.get(&SubKey::Object)
    }

    pub fn sub(&self, sub: u8) -> Option<&SubEntry> {
        self.entries.get(&SubKey::Sub(sub))
    }

    /// Exact subindex entry, else the object-level template.
    pub fn entry_for(&self, sub: u8) -> Option<&SubEntry> {
        self.sub(sub).or_else(|| self.header())
    }

    pub fn entries(&self) -> impl Iterator<Item = (SubKey, &SubEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn subs(&self) -> impl Iterator<Item = (u8, &SubEntry)> {
        self.entries.iter().filter_map(|(k, v)| match k {
            SubKey::Sub(sub) => Some((*sub, v)),
            SubKey::Object => None,
        })
    }

    /// Number of concrete subindex entries.
    pub fn sub_count(&self) -> usize {
        self.subs().count()
    }

    pub(crate) fn entry_mut(&mut self, key: SubKey) -> &mut SubEntry {
        self.entries.entry(key).or_default()
    }

    pub(crate) fn insert(&mut self, key: SubKey, entry: SubEntry) {
        self.entries.insert(key, entry);
    }
}

/// A loaded EDS/DCF file.
#[derive(Debug, Clone, Default)]
pub struct ObjectDictionary {
    name: String,
    parameters: BTreeMap<String, SubEntry>,
    objects: BTreeMap<u16, DictObject>,
    cache: CobIdCache,
    warnings: Vec<IntegrityWarning>,
}

impl ObjectDictionary {
    /// Loads an `.eds` or `.dcf` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if !matches!(extension.as_deref(), Some("eds") | Some("dcf")) {
            return Err(ConfigError::UnsupportedExtension(path.to_path_buf()));
        }

        let bytes = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        // EDS files in the wild are often Latin-1
        let text = String::from_utf8_lossy(&bytes);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::load_from_str(&name, &text)
    }

    /// Parses EDS/DCF text already in memory.
    pub fn load_from_str(name: &str, text: &str) -> Result<Self, ConfigError> {
        let mut ini = Ini::new_cs();
        let map = ini
            .read(text.to_string())
            .map_err(|reason| ConfigError::Syntax {
                name: name.to_string(),
                reason,
            })?;

        let sections = map
            .into_iter()
            .map(|(section, properties)| {
                let properties: Vec<(String, String)> = properties
                    .into_iter()
                    .filter_map(|(key, value)| value.map(|v| (key, v)))
                    .collect();
                (section, properties)
            })
            .collect();

        let dictionary = loader::parse(name, sections);
        info!(
            "Loaded {}: {} objects, {} integrity warnings",
            name,
            dictionary.objects.len(),
            dictionary.warnings.len()
        );
        Ok(dictionary)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object(&self, index: u16) -> Option<&DictObject> {
        self.objects.get(&index)
    }

    /// Entry describing `index:sub`, falling back to the object template.
    pub fn entry(&self, index: u16, sub: u8) -> Option<&SubEntry> {
        self.object(index)?.entry_for(sub)
    }

    pub fn objects(&self) -> impl Iterator<Item = (u16, &DictObject)> {
        self.objects.iter().map(|(k, v)| (*k, v))
    }

    pub fn indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.objects.keys().copied()
    }

    /// Named section such as `FileInfo` or `DeviceInfo`.
    pub fn parameter(&self, section: &str) -> Option<&SubEntry> {
        self.parameters
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(section))
            .map(|(_, entry)| entry)
    }

    pub fn cache(&self) -> &CobIdCache {
        &self.cache
    }

    pub fn warnings(&self) -> &[IntegrityWarning] {
        &self.warnings
    }
}
