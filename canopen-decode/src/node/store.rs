//! Runtime values of a node, with their full history.

use std::collections::BTreeMap;

use crate::types::Value;

/// Last value of one subindex and every value it ever had.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSlot {
    last: Value,
    history: Vec<(f64, Value)>,
}

impl ObjectSlot {
    pub fn last(&self) -> &Value {
        &self.last
    }

    /// `(timestamp, value)` pairs in arrival order.
    pub fn history(&self) -> &[(f64, Value)] {
        &self.history
    }
}

/// Append-only store keyed by index then subindex.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: BTreeMap<u16, BTreeMap<u8, ObjectSlot>>,
}

impl ObjectStore {
    pub fn record(&mut self, index: u16, sub: u8, value: Value, timestamp: f64) {
        let subs = self.objects.entry(index).or_default();
        match subs.get_mut(&sub) {
            Some(slot) => {
                slot.history.push((timestamp, value.clone()));
                slot.last = value;
            }
            None => {
                subs.insert(
                    sub,
                    ObjectSlot {
                        history: vec![(timestamp, value.clone())],
                        last: value,
                    },
                );
            }
        }
    }

    pub fn get(&self, index: u16, sub: u8) -> Option<&ObjectSlot> {
        self.objects.get(&index)?.get(&sub)
    }

    pub fn subs(&self, index: u16) -> Option<&BTreeMap<u8, ObjectSlot>> {
        self.objects.get(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.objects.keys().copied()
    }

    /// Every slot as `(index, sub, slot)`.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u8, &ObjectSlot)> {
        self.objects
            .iter()
            .flat_map(|(index, subs)| subs.iter().map(move |(sub, slot)| (*index, *sub, slot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_grows() {
        let mut store = ObjectStore::default();
        store.record(0x6064, 0, Value::Integer(1), 0.5);
        store.record(0x6064, 0, Value::Integer(2), 0.75);
        let slot = store.get(0x6064, 0).unwrap();
        assert_eq!(slot.last(), &Value::Integer(2));
        assert_eq!(
            slot.history(),
            &[(0.5, Value::Integer(1)), (0.75, Value::Integer(2))]
        );
        assert!(store.get(0x6064, 1).is_none());
        assert_eq!(store.iter().count(), 1);
    }
}
