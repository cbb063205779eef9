//! C7 (record half): one object's field storage. A record's fields are
//! created once, from its schema, at construction time; register fields are
//! then mutable through the record, readonly (list/map/text) fields are
//! value-semantic views over storage that never gets replaced wholesale
//! (§3 Data Model, §4.7).
//!
//! Per the design note on cyclic back-references, a record does not hold an
//! owning or shared-owning pointer to its parent table or store: it tracks
//! only the lightweight facts a table needs to enforce the "no re-parenting"
//! invariant (§3 invariant 4) - the id of the store that produced it, and
//! whether it has already been attached to a table.

use std::collections::BTreeMap;

use crate::fields::{ApplyFieldPatch, Direction, Field, ListField, MapField, RegisterField, TextField};
use crate::patch::{FieldName, FieldPatch, RecordId, SchemaId};
use crate::schema::{FieldKind, Schema};
use crate::value::Value;

#[derive(Clone, Debug)]
pub struct Record {
    id: RecordId,
    schema_id: SchemaId,
    owner_store_id: u32,
    attached: bool,
    fields: BTreeMap<FieldName, Field>,
}

impl Record {
    /// Builds a fresh, unattached record from `schema`, tagged as produced
    /// by `owner_store_id`. Not `pub`: records only ever come from
    /// [`crate::store::Store::new_record`], which is the one place that
    /// knows the schema and the owning store's id.
    pub(crate) fn new(schema: &Schema, id: impl Into<RecordId>, owner_store_id: u32) -> Self {
        let fields = schema
            .fields()
            .map(|f| {
                let field = match &f.kind {
                    FieldKind::Register { default } => Field::Register(RegisterField::new(default.clone(), f.undoable)),
                    FieldKind::List => Field::List(ListField::new(owner_store_id)),
                    FieldKind::Map => Field::Map(MapField::new()),
                    FieldKind::Text => Field::Text(TextField::new(owner_store_id)),
                };
                (f.name.clone(), field)
            })
            .collect();
        Record { id: id.into(), schema_id: schema.id.clone(), owner_store_id, attached: false, fields }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn schema_id(&self) -> &SchemaId {
        &self.schema_id
    }

    pub(crate) fn owner_store_id(&self) -> u32 {
        self.owner_store_id
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.attached
    }

    pub(crate) fn mark_attached(&mut self) {
        self.attached = true;
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.get_mut(name)
    }

    pub fn register(&self, name: &str) -> Option<&Value> {
        self.field(name).and_then(Field::as_register).map(RegisterField::get)
    }

    pub fn list(&self, name: &str) -> Option<&ListField> {
        self.field(name).and_then(Field::as_list)
    }

    pub fn map(&self, name: &str) -> Option<&MapField> {
        self.field(name).and_then(Field::as_map)
    }

    pub fn text(&self, name: &str) -> Option<&TextField> {
        self.field(name).and_then(Field::as_text)
    }

    /// Dispatches one field's incoming patch, in `direction`, to the
    /// matching field storage. Used by [`crate::table::Table::apply_patch`]
    /// for remote transactions, undo, and redo alike.
    pub(crate) fn apply_field_patch(
        &mut self,
        field_name: &str,
        patch: &FieldPatch,
        direction: Direction,
    ) -> Vec<crate::change::FieldChange> {
        match self.field_mut(field_name) {
            Some(field) => field.apply_patch(patch, direction),
            None => {
                log::warn!(
                    "record {:?} (schema {:?}) has no field named {:?}; skipping patch entry",
                    self.id,
                    self.schema_id,
                    field_name
                );
                Vec::new()
            }
        }
    }
}
