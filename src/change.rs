//! The observer ("user change") payload: semantically equivalent to a
//! [`crate::patch::Patch`] but structurally friendlier - indices instead of
//! identifiers, and one entry per logical edit rather than a deduplicated
//! id set.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smartstring::alias::String as SmartString;

use crate::patch::{FieldName, MapKey, RecordId, SchemaId};
use crate::value::Value;

/// One observable edit to a single field. Several may accumulate against
/// the same field within one transaction (e.g. two `push`es against a list
/// produce two `ListInsert` entries) - unlike the wire `FieldPatch`, this is
/// not deduplicated, so observers see the edit sequence, not just the net
/// identifier set.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FieldChange {
    Register {
        previous: Value,
        current: Value,
    },
    ListInsert {
        index: usize,
        value: Value,
    },
    ListRemove {
        index: usize,
        value: Value,
    },
    MapChange {
        key: MapKey,
        previous: Option<Value>,
        current: Option<Value>,
    },
    /// Friendlier than the wire `Text` patch's id maps, per the text field's
    /// documented `{index, removed, inserted}` change shape.
    TextSplice {
        index: usize,
        removed: SmartString,
        inserted: SmartString,
    },
}

pub type RecordChange = BTreeMap<FieldName, Vec<FieldChange>>;
pub type TableChange = BTreeMap<RecordId, RecordChange>;
/// `change = { [schemaId]: { [recordId]: { [fieldName]: [FieldChange] } } }`
pub type Change = BTreeMap<SchemaId, TableChange>;

pub fn record_change(
    change: &mut Change,
    schema_id: &str,
    record_id: &str,
    field_name: &str,
    entry: FieldChange,
) {
    change
        .entry(SchemaId::from(schema_id))
        .or_default()
        .entry(RecordId::from(record_id))
        .or_default()
        .entry(FieldName::from(field_name))
        .or_default()
        .push(entry);
}

/// The kind of transaction that produced a [`ChangeEvent`]: a freshly
/// committed local/remote transaction, or a replayed undo/redo of an
/// earlier one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChangeKind {
    Transaction,
    Undo,
    Redo,
}

/// `{ type, storeId, transactionId, change }`, delivered asynchronously
/// relative to the mutation call site (§5).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub store_id: u32,
    pub transaction_id: crate::identifier::Identifier,
    pub change: Change,
}
