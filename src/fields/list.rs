//! C4: a sequence CRDT. Per-element fractional identifier, tombstone
//! cemetery, splice-based mutation.

use std::collections::BTreeMap;

use crate::change::FieldChange;
use crate::fields::Direction;
use crate::identifier::{self, Identifier};
use crate::ordered_map::OrderedIndexedMap;
use crate::patch::FieldPatch;
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct ListField {
    entries: OrderedIndexedMap<Identifier, Value>,
    /// Deletion-degree per identifier not currently in `entries`, so a
    /// late-arriving concurrent insert of an already-deleted id is
    /// suppressed instead of resurrecting it.
    cemetery: BTreeMap<Identifier, u32>,
    /// Per-field logical clock, fed into `makeTriplex` as the identifier's
    /// clock component. Distinct from the store's transaction `version`.
    clock: u64,
    store_id: u32,
}

fn wrap_and_clamp_index(index: isize, len: usize) -> usize {
    let i = if index < 0 { (len as isize + index).max(0) as usize } else { index as usize };
    i.min(len)
}

impl ListField {
    pub fn new(store_id: u32) -> Self {
        ListField { entries: OrderedIndexedMap::new(), cemetery: BTreeMap::new(), clock: 0, store_id }
    }

    pub fn len(&self) -> usize {
        self.entries.size()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn get(&self, index: isize) -> Option<&Value> {
        self.entries.value_at(index)
    }

    /// Removes `count` elements starting at `index`, then inserts `values`
    /// at that same position. Returns the net `FieldPatch` and the ordered
    /// user changes (removals first, in the order they vacated the list,
    /// then insertions).
    pub fn splice(&mut self, index: isize, count: usize, values: Vec<Value>) -> (FieldPatch, Vec<FieldChange>) {
        let len = self.entries.size();
        let mut index = wrap_and_clamp_index(index, len);
        let count = count.min(len - index);

        let mut removed = BTreeMap::new();
        let mut changes = Vec::new();

        for _ in 0..count {
            let (id, value) = {
                let (k, v) = self.entries.at(index as isize).expect("index in bounds");
                (k.clone(), v.clone())
            };
            self.entries.delete(&id);
            removed.insert(id, value.clone());
            changes.push(FieldChange::ListRemove { index, value });
        }

        let mut lower = if index == 0 {
            Identifier::empty()
        } else {
            self.entries.key_at((index - 1) as isize).cloned().unwrap_or_else(Identifier::empty)
        };
        let upper = self.entries.key_at(index as isize).cloned().unwrap_or_else(Identifier::empty);

        let mut inserted = BTreeMap::new();
        for value in values {
            self.clock += 1;
            let id = identifier::make_triplex(self.clock, self.store_id, &lower, &upper);
            self.entries.set(id.clone(), value.clone());
            inserted.insert(id.clone(), value.clone());
            changes.push(FieldChange::ListInsert { index, value });
            lower = id;
            index += 1;
        }

        (FieldPatch::List { clock: self.clock, removed, inserted }, changes)
    }

    pub fn push(&mut self, value: Value) -> (FieldPatch, Vec<FieldChange>) {
        self.splice(self.entries.size() as isize, 0, vec![value])
    }

    pub fn insert(&mut self, index: isize, value: Value) -> (FieldPatch, Vec<FieldChange>) {
        self.splice(index, 0, vec![value])
    }

    pub fn remove(&mut self, index: isize) -> (FieldPatch, Vec<FieldChange>) {
        self.splice(index, 1, vec![])
    }

    pub fn set(&mut self, index: isize, value: Value) -> (FieldPatch, Vec<FieldChange>) {
        self.splice(index, 1, vec![value])
    }

    pub fn clear(&mut self) -> (FieldPatch, Vec<FieldChange>) {
        let len = self.entries.size();
        self.splice(0, len, vec![])
    }

    pub fn assign(&mut self, values: Vec<Value>) -> (FieldPatch, Vec<FieldChange>) {
        let len = self.entries.size();
        self.splice(0, len, values)
    }

    /// Applies a received list patch. Forward covers both a fresh remote
    /// transaction and a redo; inverse (undo) swaps the roles of `removed`
    /// and `inserted`, which the cemetery bookkeeping keeps safe even if
    /// other peers have intervened since.
    pub fn apply(
        &mut self,
        clock: u64,
        removed: &BTreeMap<Identifier, Value>,
        inserted: &BTreeMap<Identifier, Value>,
        direction: Direction,
    ) -> Vec<FieldChange> {
        let (removed, inserted) = match direction {
            Direction::Forward => (removed, inserted),
            Direction::Inverse => (inserted, removed),
        };

        self.clock = self.clock.max(clock);
        let mut changes = Vec::new();

        for (id, _value) in removed {
            let before = self.entries.index_of(id);
            if before < 0 {
                *self.cemetery.entry(id.clone()).or_insert(0) += 1;
                continue;
            }
            // Positional index *before* removal, per §4.4.
            let index = before as usize;
            let value = self.entries.delete(id).expect("index_of confirmed presence");
            changes.push(FieldChange::ListRemove { index, value });
        }

        for (id, value) in inserted {
            if let Some(degree) = self.cemetery.get_mut(id) {
                *degree -= 1;
                if *degree == 0 {
                    self.cemetery.remove(id);
                }
                continue;
            }
            if self.entries.has(id) {
                continue;
            }
            let neg_index = self.entries.index_of(id);
            let index = crate::ordered_map::decode_missing_index(neg_index);
            self.entries.set(id.clone(), value.clone());
            changes.push(FieldChange::ListInsert { index, value: value.clone() });
        }

        changes
    }

    /// For any id, exactly one of "present in the map" or "cemetery degree >
    /// 0" holds - the invariant property-tested alongside convergence.
    #[cfg(test)]
    fn cemetery_invariant_holds(&self) -> bool {
        for (id, degree) in &self.cemetery {
            if self.entries.has(id) || *degree == 0 {
                return false;
            }
        }
        true
    }
}
