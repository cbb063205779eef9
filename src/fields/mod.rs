//! Per-field CRDT algorithms: C3 (register), C4 (list), C5 (map) and C6
//! (text). Each field type exposes local mutators that return the
//! `(FieldPatch, Vec<FieldChange>)` pair for the caller (a [`crate::record`])
//! to stamp with `(schemaId, recordId, fieldName)` and fold into the active
//! transaction, plus a remote/undo/redo applicator used by
//! [`crate::table::Table::patch`].

pub mod list;
pub mod map;
pub mod register;
pub mod text;

pub use list::ListField;
pub use map::MapField;
pub use register::RegisterField;
pub use text::TextField;

use crate::change::FieldChange;
use crate::patch::FieldPatch;

/// Direction a field patch is being replayed in: straight through (a fresh
/// remote transaction, or a redo), or inverted (an undo).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

/// Applies `patch` to one field, in the given `direction`, returning the
/// observer-facing changes it produced. `Direction::Inverse` is only ever
/// used by [`crate::store::Store::undo`]; everything else (remote apply,
/// redo) is `Direction::Forward`.
pub trait ApplyFieldPatch {
    fn apply_patch(&mut self, patch: &FieldPatch, direction: Direction) -> Vec<FieldChange>;
}

/// One record's field storage: either a mutable register, or one of the
/// readonly (list/map/text) CRDTs, matching C7's "readonly fields are
/// created once; register fields are mutable through the record".
#[derive(Clone, Debug)]
pub enum Field {
    Register(RegisterField),
    List(ListField),
    Map(MapField),
    Text(TextField),
}

impl Field {
    pub fn as_register(&self) -> Option<&RegisterField> {
        match self {
            Field::Register(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_register_mut(&mut self) -> Option<&mut RegisterField> {
        match self {
            Field::Register(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListField> {
        match self {
            Field::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut ListField> {
        match self {
            Field::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapField> {
        match self {
            Field::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut MapField> {
        match self {
            Field::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextField> {
        match self {
            Field::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextField> {
        match self {
            Field::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl ApplyFieldPatch for Field {
    fn apply_patch(&mut self, patch: &FieldPatch, direction: Direction) -> Vec<FieldChange> {
        match (self, patch) {
            (Field::Register(r), FieldPatch::Register { value, clock, store_id }) => {
                r.apply(*clock, *store_id, value.clone(), direction)
            }
            (Field::List(l), FieldPatch::List { clock, removed, inserted }) => {
                l.apply(*clock, removed, inserted, direction)
            }
            (Field::Map(m), FieldPatch::Map { entries }) => m.apply(entries, direction),
            (Field::Text(t), FieldPatch::Text { clock, removed, inserted }) => {
                t.apply(*clock, removed, inserted, direction)
            }
            _ => panic!("field patch variant does not match field type"),
        }
    }
}
