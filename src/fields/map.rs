//! C5: a key -> value CRDT with per-key last-writer-wins and a history
//! chain identical in spirit to the register field's (C3), just keyed.

use std::collections::BTreeMap;

use crate::change::FieldChange;
use crate::fields::Direction;
use crate::patch::{MapKey, MapPatchEntry};
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
struct HistoryLink {
    /// `None` is the deleted sentinel.
    value: Option<Value>,
    clock: u64,
    store_id: u32,
}

#[inline]
fn order_key(clock: u64, store_id: u32) -> (u64, u32) {
    (clock, store_id)
}

#[derive(Clone, Debug, Default)]
pub struct MapField {
    /// Newest-first per-key history chain. A key absent from this map has
    /// never been written and is simply absent (no seeded link is needed:
    /// unlike the register, there is no schema default to fall back to).
    history: BTreeMap<MapKey, Vec<HistoryLink>>,
}

impl MapField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.history.get(key).and_then(|chain| chain[0].value.as_ref())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.history.iter().filter(|(_, chain)| chain[0].value.is_some()).map(|(k, _)| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.history.values().filter(|chain| chain[0].value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Local `set`/`delete` (pass `value = None` to delete). No-op (returns
    /// `None`) when deleting a key that is already absent.
    pub fn set(
        &mut self,
        key: &str,
        value: Option<Value>,
        clock: u64,
        store_id: u32,
        undoable: bool,
    ) -> Option<(MapPatchEntry, FieldChange)> {
        let previous = self.get(key).cloned();
        if value.is_none() && previous.is_none() {
            return None;
        }

        let chain = self.history.entry(MapKey::from(key)).or_default();
        if chain.is_empty() {
            chain.push(HistoryLink { value: value.clone(), clock, store_id });
        } else if !undoable {
            chain[0] = HistoryLink { value: value.clone(), clock, store_id };
        } else if chain[0].clock == clock && chain[0].store_id == store_id {
            chain[0].value = value.clone();
        } else {
            chain.insert(0, HistoryLink { value: value.clone(), clock, store_id });
        }

        Some((
            MapPatchEntry { value: value.clone(), clock, store_id },
            FieldChange::MapChange { key: MapKey::from(key), previous, current: value },
        ))
    }

    pub fn delete(&mut self, key: &str, clock: u64, store_id: u32, undoable: bool) -> Option<(MapPatchEntry, FieldChange)> {
        self.set(key, None, clock, store_id, undoable)
    }

    /// LWW insert of one remote (or redo) key write. A no-op (returns
    /// `None`, chain untouched) if a link with this exact `(clock,
    /// store_id)` is already present - same redelivery guard as the
    /// register field's `apply_lww`, needed for the same reason: a
    /// duplicate link would leave a later `revert_one_lww` of it removing
    /// only one copy and corrupting the chain.
    fn apply_one_lww(&mut self, key: &str, value: Option<Value>, clock: u64, store_id: u32) -> Option<FieldChange> {
        let chain = self.history.entry(MapKey::from(key)).or_default();
        if chain.iter().any(|l| l.clock == clock && l.store_id == store_id) {
            return None;
        }
        let incoming = order_key(clock, store_id);
        let pos = chain.iter().position(|l| order_key(l.clock, l.store_id) <= incoming).unwrap_or(chain.len());

        let previous = chain.first().and_then(|l| l.value.clone());
        chain.insert(pos, HistoryLink { value: value.clone(), clock, store_id });

        if pos == 0 {
            Some(FieldChange::MapChange { key: MapKey::from(key), previous, current: value })
        } else {
            None
        }
    }

    /// Inverse of [`Self::apply_one_lww`] for undo: removes the single link
    /// exactly matching `(clock, store_id)`.
    fn revert_one_lww(&mut self, key: &str, clock: u64, store_id: u32) -> Option<FieldChange> {
        let chain = self.history.get_mut(key)?;
        let pos = chain.iter().position(|l| l.clock == clock && l.store_id == store_id)?;
        let was_head = pos == 0;
        let previous = chain[pos].value.clone();
        chain.remove(pos);

        if was_head {
            let current = chain.first().and_then(|l| l.value.clone());
            Some(FieldChange::MapChange { key: MapKey::from(key), previous, current })
        } else {
            None
        }
    }

    pub fn apply(&mut self, entries: &BTreeMap<MapKey, MapPatchEntry>, direction: Direction) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        for (key, entry) in entries {
            let change = match direction {
                Direction::Forward => self.apply_one_lww(key, entry.value.clone(), entry.clock, entry.store_id),
                Direction::Inverse => self.revert_one_lww(key, entry.clock, entry.store_id),
            };
            changes.extend(change);
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_roundtrips() {
        let mut m = MapField::new();
        m.set("a", Some(json!(1)), 1, 1, true);
        assert_eq!(m.get("a"), Some(&json!(1)));
    }

    #[test]
    fn delete_on_missing_key_is_noop() {
        let mut m = MapField::new();
        assert!(m.delete("missing", 1, 1, true).is_none());
    }

    #[test]
    fn remote_delete_beats_earlier_local_set() {
        let mut m = MapField::new();
        m.set("a", Some(json!(1)), 1, 1, true);
        // A later remote delete with a higher (clock, store) wins.
        m.apply_one_lww("a", None, 2, 1);
        assert_eq!(m.get("a"), None);
    }

    #[test]
    fn later_local_set_beats_earlier_remote_delete() {
        let mut m = MapField::new();
        m.apply_one_lww("a", None, 1, 1);
        m.set("a", Some(json!("x")), 2, 1, true);
        assert_eq!(m.get("a"), Some(&json!("x")));
    }

    #[test]
    fn redelivery_of_the_same_write_is_idempotent() {
        let mut m = MapField::new();
        m.apply_one_lww("a", Some(json!("x")), 5, 1);
        m.apply_one_lww("a", Some(json!("x")), 5, 1);
        assert_eq!(m.get("a"), Some(&json!("x")));
        // Undo removes exactly one link; a corrupted double-insert would
        // leave the stale value behind instead of reverting to absent.
        m.revert_one_lww("a", 5, 1);
        assert_eq!(m.get("a"), None);
    }

    #[test]
    fn clear_removes_every_visible_key() {
        let mut m = MapField::new();
        m.set("a", Some(json!(1)), 1, 1, true);
        m.set("b", Some(json!(2)), 1, 1, true);
        let keys: Vec<String> = m.keys().iter().map(|s| s.to_string()).collect();
        for k in keys {
            m.delete(&k, 2, 1, true);
        }
        assert!(m.is_empty());
    }
}
