//! C7 (schema half): the static, immutable field layout a table's records
//! share. Schemas never mutate once a store is constructed (§3 Lifecycles).

use crate::patch::{FieldName, SchemaId};
use crate::value::Value;

/// One field's static declaration: its CRDT kind and whether its history is
/// kept for undo (§3's `undoable` flag). Registers additionally carry the
/// default value seeded into every new record's history chain (§4.3).
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    Register { default: Value },
    List,
    Map,
    Text,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldSchema {
    pub name: FieldName,
    pub kind: FieldKind,
    pub undoable: bool,
}

impl FieldSchema {
    pub fn register(name: impl Into<FieldName>, default: Value, undoable: bool) -> Self {
        FieldSchema { name: name.into(), kind: FieldKind::Register { default }, undoable }
    }

    pub fn list(name: impl Into<FieldName>, undoable: bool) -> Self {
        FieldSchema { name: name.into(), kind: FieldKind::List, undoable }
    }

    pub fn map(name: impl Into<FieldName>, undoable: bool) -> Self {
        FieldSchema { name: name.into(), kind: FieldKind::Map, undoable }
    }

    pub fn text(name: impl Into<FieldName>, undoable: bool) -> Self {
        FieldSchema { name: name.into(), kind: FieldKind::Text, undoable }
    }

    /// Field names starting with `$` or `@` are reserved (§4.7); used by
    /// [`Schema::new`] to collect the offending names [`crate::store::Store::create`]
    /// reports atomically across every schema it is given.
    fn is_forbidden(&self) -> bool {
        self.name.starts_with('$') || self.name.starts_with('@')
    }
}

/// An immutable descriptor of one table's record layout: a string id and a
/// set of named fields (§3 Data Model).
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    pub id: SchemaId,
    fields: Vec<FieldSchema>,
}

impl Schema {
    /// Validates field names (leading `$`/`@` rejected) and builds the
    /// schema. `Err` carries every offending field name, not just the
    /// first, so [`crate::store::Store::create`] can aggregate errors
    /// across all the schemas it is given into one `InvalidSchema` (§7,
    /// end-to-end scenario 6).
    pub fn new(id: impl Into<SchemaId>, fields: Vec<FieldSchema>) -> Result<Schema, Vec<String>> {
        let offending: Vec<String> =
            fields.iter().filter(|f| f.is_forbidden()).map(|f| f.name.to_string()).collect();
        if !offending.is_empty() {
            return Err(offending);
        }
        Ok(Schema { id: id.into(), fields })
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn forbidden_field_names_are_rejected() {
        let err = Schema::new(
            "widget",
            vec![FieldSchema::register("$id", json!(0), false), FieldSchema::list("@hidden", false)],
        )
        .unwrap_err();
        assert_eq!(err, vec!["$id".to_string(), "@hidden".to_string()]);
    }

    #[test]
    fn ordinary_fields_are_accepted() {
        let schema = Schema::new("widget", vec![FieldSchema::register("label", json!(""), true)]).unwrap();
        assert!(schema.field("label").is_some());
        assert!(schema.field("missing").is_none());
    }
}
