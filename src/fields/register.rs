//! C3: a last-writer-wins scalar with a history chain for undo.

use crate::change::FieldChange;
use crate::fields::Direction;
use crate::patch::FieldPatch;
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
struct HistoryLink {
    value: Value,
    clock: u64,
    store_id: u32,
}

/// `(clock, store_id)` compared lexicographically, clock first - the tie-break
/// order the whole register/map LWW story is built on.
#[inline]
fn order_key(clock: u64, store_id: u32) -> (u64, u32) {
    (clock, store_id)
}

#[derive(Clone, Debug)]
pub struct RegisterField {
    /// Newest first. Always non-empty: the seeded default link at
    /// `(clock=0, store_id=0)` is never removed by ordinary operation.
    history: Vec<HistoryLink>,
    undoable: bool,
}

impl RegisterField {
    /// Seeds the history chain with the schema-declared `default` at
    /// `(clock=0, store_id=0)` - the data model's documented sentinel that
    /// any legitimate write strictly dominates.
    pub fn new(default: Value, undoable: bool) -> Self {
        RegisterField {
            history: vec![HistoryLink { value: default, clock: 0, store_id: 0 }],
            undoable,
        }
    }

    pub fn get(&self) -> &Value {
        &self.history[0].value
    }

    /// Local `set`. `clock`/`store_id` are the committing store's current
    /// `(version, storeId)`. Returns the `(FieldPatch, FieldChange)` pair to
    /// fold into the active transaction.
    pub fn set(&mut self, value: Value, clock: u64, store_id: u32) -> (FieldPatch, FieldChange) {
        let previous = self.history[0].value.clone();
        if !self.undoable {
            self.history[0] = HistoryLink { value: value.clone(), clock, store_id };
        } else if self.history[0].clock == clock && self.history[0].store_id == store_id {
            // Same local transaction writing again: replace the head in
            // place but keep its existing `next` link untouched.
            self.history[0].value = value.clone();
        } else {
            self.history.insert(0, HistoryLink { value: value.clone(), clock, store_id });
        }

        (
            FieldPatch::Register { value: value.clone(), clock, store_id },
            FieldChange::Register { previous, current: value },
        )
    }

    /// LWW insert of a remote (or redo) write: walks the chain to the first
    /// link with `(clock, store_id) <=` the incoming pair (in that
    /// lexicographic order) and inserts just before it. Returns a user
    /// change only if the head - the observable value - changed. A no-op
    /// (returns `None`, chain untouched) if a link with this exact
    /// `(clock, store_id)` is already present - redelivery of the same
    /// write must not duplicate its link, or a later `revert_lww` of it
    /// would remove only one of the copies and corrupt the chain.
    pub fn apply_lww(&mut self, clock: u64, store_id: u32, value: Value) -> Option<FieldChange> {
        if self.history.iter().any(|l| l.clock == clock && l.store_id == store_id) {
            return None;
        }
        let incoming = order_key(clock, store_id);
        let pos = self
            .history
            .iter()
            .position(|l| order_key(l.clock, l.store_id) <= incoming)
            .unwrap_or(self.history.len());

        let previous = self.history[0].value.clone();
        self.history.insert(pos, HistoryLink { value: value.clone(), clock, store_id });

        if pos == 0 {
            Some(FieldChange::Register { previous, current: value })
        } else {
            None
        }
    }

    /// Removes the single link that exactly matches `(clock, store_id)` -
    /// the inverse of [`Self::apply_lww`], used for undo. The seed link at
    /// `(0, 0)` is never a match for any legitimate write, so the chain
    /// never empties.
    pub fn revert_lww(&mut self, clock: u64, store_id: u32) -> Option<FieldChange> {
        let pos = self.history.iter().position(|l| l.clock == clock && l.store_id == store_id)?;
        let was_head = pos == 0;
        let previous = self.history[pos].value.clone();
        self.history.remove(pos);

        if was_head {
            let current = self.history[0].value.clone();
            Some(FieldChange::Register { previous, current })
        } else {
            None
        }
    }

    /// Dispatches a received `FieldPatch::Register` in `direction`: forward
    /// is [`Self::apply_lww`] (covers both a fresh remote transaction and a
    /// redo of a local one); inverse is [`Self::revert_lww`] (undo).
    pub fn apply(&mut self, clock: u64, store_id: u32, value: Value, direction: Direction) -> Vec<FieldChange> {
        let change = match direction {
            Direction::Forward => self.apply_lww(clock, store_id, value),
            Direction::Inverse => self.revert_lww(clock, store_id),
        };
        change.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_replaces_head_and_reports_previous() {
        let mut r = RegisterField::new(json!(0), true);
        let (_, change) = r.set(json!(1), 5, 1);
        assert_eq!(r.get(), &json!(1));
        assert_eq!(change, FieldChange::Register { previous: json!(0), current: json!(1) });
    }

    #[test]
    fn same_transaction_second_write_collapses_into_one_link() {
        let mut r = RegisterField::new(json!(0), true);
        r.set(json!(1), 5, 1);
        r.set(json!(2), 5, 1);
        assert_eq!(r.get(), &json!(2));
        // Undo of the (5, 1) write removes the whole collapsed link.
        let change = r.revert_lww(5, 1).unwrap();
        assert_eq!(change, FieldChange::Register { previous: json!(2), current: json!(0) });
    }

    #[test]
    fn non_undoable_register_discards_history() {
        let mut r = RegisterField::new(json!(0), false);
        r.set(json!(1), 1, 1);
        r.set(json!(2), 2, 1);
        // No history to undo against past the seed link.
        assert!(r.revert_lww(1, 1).is_none());
        assert_eq!(r.get(), &json!(2));
    }

    #[test]
    fn three_peer_tie_break_prefers_greater_store_id_at_equal_clock() {
        // A sets r=1 at (clock=5, store=1); B sets r=2 at (clock=5, store=2);
        // C receives them in order [B, A]. Greater storeId wins the tie.
        let mut c = RegisterField::new(json!(0), true);
        c.apply_lww(5, 2, json!(2));
        c.apply_lww(5, 1, json!(1));
        assert_eq!(c.get(), &json!(2));
    }

    #[test]
    fn redelivery_of_the_same_write_is_idempotent() {
        let mut r = RegisterField::new(json!(0), true);
        r.apply_lww(5, 1, json!("a"));
        r.apply_lww(5, 1, json!("a"));
        assert_eq!(r.get(), &json!("a"));
        // Undo removes exactly one link; a corrupted double-insert would
        // leave the stale value behind instead of reverting to the seed.
        r.revert_lww(5, 1);
        assert_eq!(r.get(), &json!(0));
    }

    #[test]
    fn redo_after_undo_restores_value() {
        let mut r = RegisterField::new(json!(0), true);
        r.set(json!("a"), 1, 1);
        r.set(json!("b"), 2, 1);
        assert_eq!(r.get(), &json!("b"));
        r.revert_lww(2, 1);
        assert_eq!(r.get(), &json!("a"));
        r.apply_lww(2, 1, json!("b"));
        assert_eq!(r.get(), &json!("b"));
    }
}
