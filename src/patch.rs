//! The patch wire format (§6): `{ [schemaId]: { [recordId]: { [fieldName]:
//! FieldPatch } } }`, plus the transaction envelope that wraps it for
//! broadcast.
//!
//! `BTreeMap` gives the nested nesting a deterministic iteration order,
//! which keeps replayed/undo patches byte-stable for a given logical
//! content, and happens to key on exactly the types (`SmartString`,
//! `Identifier`) that already implement `Ord`.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smartstring::alias::String as SmartString;

use crate::identifier::Identifier;
use crate::value::Value;

pub type SchemaId = SmartString;
pub type RecordId = SmartString;
pub type FieldName = SmartString;
pub type MapKey = SmartString;

pub type RecordPatch = BTreeMap<FieldName, FieldPatch>;
pub type TablePatch = BTreeMap<RecordId, RecordPatch>;
/// `patch = { [schemaId]: { [recordId]: { [fieldName]: FieldPatch } } }`
pub type Patch = BTreeMap<SchemaId, TablePatch>;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MapPatchEntry {
    /// `None` encodes the wire "deleted" sentinel.
    pub value: Option<Value>,
    pub clock: u64,
    pub store_id: u32,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind"))]
pub enum FieldPatch {
    Register {
        value: Value,
        clock: u64,
        store_id: u32,
    },
    List {
        clock: u64,
        removed: BTreeMap<Identifier, Value>,
        inserted: BTreeMap<Identifier, Value>,
    },
    Map {
        entries: BTreeMap<MapKey, MapPatchEntry>,
    },
    Text {
        clock: u64,
        removed: BTreeMap<Identifier, char>,
        inserted: BTreeMap<Identifier, char>,
    },
}

/// `{ id: DuplexId, storeId, patch }`: the payload handed to the broadcast
/// sink and to [`crate::store::Store::apply_transaction`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transaction {
    pub id: Identifier,
    pub store_id: u32,
    pub patch: Patch,
}

/// Merges `entry` into `patch[schema_id][record_id][field_name]`.
///
/// A field touched more than once in the same transaction must still
/// produce exactly one `FieldPatch` on the wire (the shape in §6 has no
/// room for a sequence), so repeated writes to the same field are folded
/// together here rather than overwriting one another:
/// - `Register`: last write wins (matches the in-memory history chain,
///   which already collapses same-transaction writes to one head update).
/// - `List`/`Text`: `removed`/`inserted` id sets are unioned. An id that was
///   both inserted and removed within this same transaction never needs to
///   leave the process, so it is dropped from both sides instead of either
///   telling a peer about an id it can never otherwise learn of, or
///   reporting its own insert as removed.
/// - `Map`: per-key entries are unioned, last write per key wins.
pub fn record_patch(
    patch: &mut Patch,
    schema_id: &str,
    record_id: &str,
    field_name: &str,
    entry: FieldPatch,
) {
    let slot = patch
        .entry(SchemaId::from(schema_id))
        .or_default()
        .entry(RecordId::from(record_id))
        .or_default()
        .entry(FieldName::from(field_name));

    slot.and_modify(|existing| merge_field_patch(existing, &entry))
        .or_insert(entry);
}

fn merge_field_patch(existing: &mut FieldPatch, incoming: &FieldPatch) {
    match (existing, incoming) {
        (FieldPatch::Register { value, clock, store_id }, FieldPatch::Register { value: v2, clock: c2, store_id: s2 }) => {
            *value = v2.clone();
            *clock = *c2;
            *store_id = *s2;
        }
        (
            FieldPatch::List { clock, removed, inserted },
            FieldPatch::List { clock: c2, removed: r2, inserted: i2 },
        ) => {
            *clock = (*clock).max(*c2);
            for (id, value) in r2.clone() {
                if inserted.remove(&id).is_none() {
                    removed.insert(id, value);
                }
            }
            for (id, value) in i2.clone() {
                if removed.remove(&id).is_none() {
                    inserted.insert(id, value);
                }
            }
        }
        (
            FieldPatch::Text { clock, removed, inserted },
            FieldPatch::Text { clock: c2, removed: r2, inserted: i2 },
        ) => {
            *clock = (*clock).max(*c2);
            for (id, ch) in r2.clone() {
                if inserted.remove(&id).is_none() {
                    removed.insert(id, ch);
                }
            }
            for (id, ch) in i2.clone() {
                if removed.remove(&id).is_none() {
                    inserted.insert(id, ch);
                }
            }
        }
        (FieldPatch::Map { entries }, FieldPatch::Map { entries: e2 }) => {
            for (k, v) in e2.clone() {
                entries.insert(k, v);
            }
        }
        _ => unreachable!("a field's patches always share one variant within a transaction"),
    }
}
