//! C6: collaborative text as a character-level list CRDT (`spec.md` Open
//! Question 2). Each surviving character is a single-codepoint entry keyed
//! by its own fractional identifier, so the algorithm is exactly C4's;
//! splices expand to per-character inserts/removes on the wire, while the
//! local API and observer-facing change coalesce a whole edit into one run.

use std::collections::BTreeMap;

use smartstring::alias::String as SmartString;

use crate::change::FieldChange;
use crate::fields::Direction;
use crate::identifier::{self, Identifier};
use crate::ordered_map::OrderedIndexedMap;
use crate::patch::FieldPatch;

#[derive(Clone, Debug)]
pub struct TextField {
    entries: OrderedIndexedMap<Identifier, char>,
    /// Deletion-degree per identifier not currently present, same role as
    /// the list field's cemetery.
    cemetery: BTreeMap<Identifier, u32>,
    clock: u64,
    store_id: u32,
}

fn wrap_and_clamp_index(index: isize, len: usize) -> usize {
    let i = if index < 0 { (len as isize + index).max(0) as usize } else { index as usize };
    i.min(len)
}

impl TextField {
    pub fn new(store_id: u32) -> Self {
        TextField { entries: OrderedIndexedMap::new(), cemetery: BTreeMap::new(), clock: 0, store_id }
    }

    pub fn len(&self) -> usize {
        self.entries.size()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Coalesces the surviving per-character entries into one run, in
    /// identifier order, for display. The CRDT still tracks each character
    /// under its own identifier; this is read-only projection.
    pub fn text(&self) -> String {
        self.entries.iter().map(|(_, c)| *c).collect()
    }

    /// Removes `remove_count` characters starting at `index`, then inserts
    /// `insert` at that position. Returns the wire patch (per-character
    /// removed/inserted id maps) and a single coalesced `TextSplice` change,
    /// mirroring the `{index, removed, inserted}` shape of the text patch
    /// on the wire (spec.md §4.6/§6).
    pub fn splice(&mut self, index: isize, remove_count: usize, insert: &str) -> (FieldPatch, Vec<FieldChange>) {
        let len = self.entries.size();
        let mut index = wrap_and_clamp_index(index, len);
        let remove_count = remove_count.min(len - index);

        let mut removed_ids = BTreeMap::new();
        let mut removed_text = String::new();
        for _ in 0..remove_count {
            let (id, ch) = {
                let (k, v) = self.entries.at(index as isize).expect("index in bounds");
                (k.clone(), *v)
            };
            self.entries.delete(&id);
            removed_ids.insert(id, ch);
            removed_text.push(ch);
        }

        let mut lower = if index == 0 {
            Identifier::empty()
        } else {
            self.entries.key_at((index - 1) as isize).cloned().unwrap_or_else(Identifier::empty)
        };
        let upper = self.entries.key_at(index as isize).cloned().unwrap_or_else(Identifier::empty);

        let mut inserted_ids = BTreeMap::new();
        let mut inserted_text = String::new();
        for ch in insert.chars() {
            self.clock += 1;
            let id = identifier::make_triplex(self.clock, self.store_id, &lower, &upper);
            self.entries.set(id.clone(), ch);
            inserted_ids.insert(id.clone(), ch);
            inserted_text.push(ch);
            lower = id;
        }

        let change = FieldChange::TextSplice {
            index,
            removed: SmartString::from(removed_text),
            inserted: SmartString::from(inserted_text),
        };
        (FieldPatch::Text { clock: self.clock, removed: removed_ids, inserted: inserted_ids }, vec![change])
    }

    /// Applies a received text patch: a fresh remote transaction, a redo
    /// (`Direction::Forward`), or an undo (`Direction::Inverse`, which swaps
    /// `removed`/`inserted` exactly as the list field does). Emits one
    /// `TextSplice` per surviving character edit rather than the single
    /// coalesced change `splice` produces locally, since a remote patch's id
    /// sets need not be contiguous.
    pub fn apply(
        &mut self,
        clock: u64,
        removed: &BTreeMap<Identifier, char>,
        inserted: &BTreeMap<Identifier, char>,
        direction: Direction,
    ) -> Vec<FieldChange> {
        let (removed, inserted) = match direction {
            Direction::Forward => (removed, inserted),
            Direction::Inverse => (inserted, removed),
        };

        self.clock = self.clock.max(clock);
        let mut changes = Vec::new();

        for (id, _ch) in removed {
            let before = self.entries.index_of(id);
            if before < 0 {
                *self.cemetery.entry(id.clone()).or_insert(0) += 1;
                continue;
            }
            let index = before as usize;
            let ch = self.entries.delete(id).expect("index_of confirmed presence");
            changes.push(FieldChange::TextSplice {
                index,
                removed: SmartString::from(ch.to_string()),
                inserted: SmartString::new(),
            });
        }

        for (id, ch) in inserted {
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
            self.entries.set(id.clone(), *ch);
            changes.push(FieldChange::TextSplice {
                index,
                removed: SmartString::new(),
                inserted: SmartString::from(ch.to_string()),
            });
        }

        changes
    }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splice_inserts_and_reports_one_coalesced_change() {
        let mut t = TextField::new(1);
        let (_, changes) = t.splice(0, 0, "hello");
        assert_eq!(t.text(), "hello");
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0],
            FieldChange::TextSplice { index: 0, removed: SmartString::new(), inserted: SmartString::from("hello") }
        );
    }

    #[test]
    fn sequential_convergence_two_stores() {
        let mut a = TextField::new(1);
        let (patch, _) = a.splice(0, 0, "hi");

        let mut b = TextField::new(2);
        if let FieldPatch::Text { clock, removed, inserted } = &patch {
            b.apply(*clock, removed, inserted, Direction::Forward);
        }

        assert_eq!(a.text(), "hi");
        assert_eq!(b.text(), "hi");
    }

    #[test]
    fn splice_idempotence_under_redelivery() {
        let mut a = TextField::new(1);
        let (patch, _) = a.splice(0, 0, "abc");

        let mut b = TextField::new(2);
        if let FieldPatch::Text { clock, removed, inserted } = &patch {
            b.apply(*clock, removed, inserted, Direction::Forward);
            b.apply(*clock, removed, inserted, Direction::Forward);
        }

        assert_eq!(b.text(), "abc");
    }

    #[test]
    fn undo_then_redo_restores_text() {
        let mut a = TextField::new(1);
        let (p1, _) = a.splice(0, 0, "ab");
        let (p2, _) = a.splice(2, 0, "cd");
        assert_eq!(a.text(), "abcd");

        if let FieldPatch::Text { clock, removed, inserted } = &p2 {
            a.apply(*clock, removed, inserted, Direction::Inverse);
        }
        assert_eq!(a.text(), "ab");

        if let FieldPatch::Text { clock, removed, inserted } = &p2 {
            a.apply(*clock, removed, inserted, Direction::Forward);
        }
        assert_eq!(a.text(), "abcd");
        let _ = p1;
    }

    #[test]
    fn cemetery_invariant_after_concurrent_delete_and_insert() {
        let mut a = TextField::new(1);
        let (p1, _) = a.splice(0, 0, "ab");
        let mut b = TextField::new(2);
        if let FieldPatch::Text { clock, removed, inserted } = &p1 {
            b.apply(*clock, removed, inserted, Direction::Forward);
        }

        let (p2, _) = a.splice(0, 1, "");
        if let FieldPatch::Text { clock, removed, inserted } = &p2 {
            b.apply(*clock, removed, inserted, Direction::Forward);
            b.apply(*clock, removed, inserted, Direction::Forward);
        }
        assert!(b.cemetery_invariant_holds());
        assert_eq!(b.text(), "b");
    }
}
