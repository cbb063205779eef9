//! C8: an ordered collection of records sharing one schema. The store owns
//! one table per schema id (§3 Data Model); a table owns its records
//! outright, and applies remote/undo/redo sub-patches by routing each
//! `(recordId, recordPatch)` to the matching record.

use crate::change::{record_change, Change};
use crate::fields::Direction;
use crate::ordered_map::OrderedIndexedMap;
use crate::patch::{RecordId, TablePatch};
use crate::record::Record;
use crate::schema::Schema;

pub struct Table {
    schema: Schema,
    records: OrderedIndexedMap<RecordId, Record>,
}

impl Table {
    pub(crate) fn new(schema: Schema) -> Self {
        Table { schema, records: OrderedIndexedMap::new() }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.records.size()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(&RecordId::from(id))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Record> {
        self.records.get_mut(&RecordId::from(id))
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&RecordId, &Record)> {
        self.records.iter()
    }

    /// Attaches a record produced by this store to the table. Panics if the
    /// record was produced by a different store, or already has a parent
    /// (§3 invariant 4, §4.8) - both are caller contract violations, not
    /// conditions a peer's remote data can trigger, so they are not part of
    /// [`crate::error::Error`].
    pub(crate) fn insert(&mut self, store_id: u32, mut record: Record) {
        assert_eq!(record.owner_store_id(), store_id, "record was produced by a different store");
        assert!(!record.is_attached(), "record already belongs to a table");
        record.mark_attached();
        self.records.set(record.id().clone(), record);
    }

    pub(crate) fn delete(&mut self, id: &str) -> Option<Record> {
        self.records.delete(&RecordId::from(id))
    }

    /// Applies every `(recordId, recordPatch)` entry of an incoming table
    /// patch, in `direction`, folding the resulting field changes into
    /// `change`. An id with no matching record logs the `UnknownRecord`
    /// warning and is skipped rather than failing the whole transaction
    /// (§7).
    pub(crate) fn apply_patch(
        &mut self,
        schema_id: &str,
        table_patch: &TablePatch,
        direction: Direction,
        change: &mut Change,
    ) {
        for (record_id, record_patch) in table_patch {
            let Some(record) = self.records.get_mut(record_id) else {
                log::warn!("UnknownRecord: schema {:?} has no record {:?}; skipping patch entry", schema_id, record_id);
                continue;
            };
            for (field_name, field_patch) in record_patch {
                let changes = record.apply_field_patch(field_name, field_patch, direction);
                for c in changes {
                    record_change(change, schema_id, record_id, field_name, c);
                }
            }
        }
    }
}
