//! C9: the transaction engine. Owns every table, the currently open
//! transaction (if any), the broadcast sink, the observer event queue, and
//! the undo/redo log. This is the one piece of the design allowed a
//! process-wide-looking flag (`tx`), and even that is confined to one store
//! instance (§9 design note).

use std::collections::BTreeMap;

use crate::change::{Change, ChangeEvent, ChangeKind};
use crate::error::{Error, Result};
use crate::fields::{Direction, Field};
use crate::identifier::{self, Identifier};
use crate::patch::{self, FieldPatch, Patch, RecordId, SchemaId, Transaction};
use crate::record::Record;
use crate::schema::{FieldSchema, Schema};
use crate::sink::{BroadcastSink, NullSink, Observer, QueuedObserver};
use crate::table::Table;
use crate::value::Value;

/// One schema's raw definition, as handed to [`Store::create`]. Kept
/// separate from [`Schema`] itself so `Store::create` can validate every
/// schema it is given and aggregate all of their offending field names into
/// one `Error::InvalidSchema`, rather than failing on the first bad schema
/// and hiding the rest (§7, end-to-end scenario 6).
pub struct SchemaDef {
    pub id: SchemaId,
    pub fields: Vec<FieldSchema>,
}

impl SchemaDef {
    pub fn new(id: impl Into<SchemaId>, fields: Vec<FieldSchema>) -> Self {
        SchemaDef { id: id.into(), fields }
    }
}

/// State of the one transaction a store may have open at a time. Not
/// exposed: callers only see [`Store::begin`]'s returned transaction id.
struct TransactionState {
    id: Identifier,
    change: Change,
    patch: Patch,
}

pub struct Store {
    store_id: u32,
    version: u64,
    tables: BTreeMap<SchemaId, Table>,
    tx: Option<TransactionState>,
    sink: Box<dyn BroadcastSink>,
    events: QueuedObserver,
    /// Append-only log of committed `(transactionId, patch)` pairs, keyed
    /// for `undo`/`redo` lookup (§4.9).
    undo_log: Vec<(Identifier, Patch)>,
}

impl Store {
    /// Builds a store with one table per schema. Fails atomically with
    /// `Error::InvalidSchema` carrying every offending field name across
    /// every schema def given, if any schema declares a field name starting
    /// with `$` or `@` (§4.7, §7).
    pub fn create(store_id: u32, schema_defs: Vec<SchemaDef>, sink: Box<dyn BroadcastSink>) -> Result<Store> {
        let mut schemas = Vec::with_capacity(schema_defs.len());
        let mut offending = Vec::new();
        for def in schema_defs {
            match Schema::new(def.id, def.fields) {
                Ok(schema) => schemas.push(schema),
                Err(bad) => offending.extend(bad),
            }
        }
        if !offending.is_empty() {
            return Err(Error::InvalidSchema { offending_fields: offending });
        }

        let tables = schemas.into_iter().map(|s| (s.id.clone(), Table::new(s))).collect();
        Ok(Store { store_id, version: 0, tables, tx: None, sink, events: QueuedObserver::new(), undo_log: Vec::new() })
    }

    /// A store with no broadcast sink attached yet; patches are simply
    /// dropped by [`NullSink`] until the host swaps in a real one isn't
    /// supported (the sink is fixed at construction) - use this only for
    /// stores that genuinely have no peers.
    pub fn create_isolated(store_id: u32, schema_defs: Vec<SchemaDef>) -> Result<Store> {
        Self::create(store_id, schema_defs, Box::new(NullSink))
    }

    pub fn store_id(&self) -> u32 {
        self.store_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub fn table(&self, schema_id: &str) -> Option<&Table> {
        self.tables.get(schema_id)
    }

    pub fn table_mut(&mut self, schema_id: &str) -> Option<&mut Table> {
        self.tables.get_mut(schema_id)
    }

    /// Drains every change event queued since the last drain, oldest
    /// (earliest-committed) first. This is the asynchronous observer
    /// delivery contract of §5/§10: the host polls this on its own
    /// schedule, the store never calls back into it inline.
    pub fn drain_events(&mut self) -> Vec<ChangeEvent> {
        self.events.drain()
    }

    fn assert_mutations_allowed(&self) -> Result<()> {
        if self.tx.is_none() {
            Err(Error::NotInTransaction)
        } else {
            Ok(())
        }
    }

    /// Opens a transaction. Fails with `AlreadyInTransaction` if one is
    /// already open.
    pub fn begin(&mut self) -> Result<Identifier> {
        if self.tx.is_some() {
            return Err(Error::AlreadyInTransaction);
        }
        let id = identifier::make_duplex(self.version, self.store_id);
        self.tx = Some(TransactionState { id: id.clone(), change: Change::new(), patch: Patch::new() });
        Ok(id)
    }

    /// Commits the open transaction: bumps `version`, and - if anything was
    /// mutated - records it in the undo log, posts the patch to the
    /// broadcast sink, and queues a `"transaction"` change event.
    pub fn end(&mut self) -> Result<()> {
        let tx = self.tx.take().ok_or(Error::NotInTransaction)?;
        self.version += 1;

        if !tx.patch.is_empty() {
            self.undo_log.push((tx.id.clone(), tx.patch.clone()));
            self.sink.post(&Transaction { id: tx.id.clone(), store_id: self.store_id, patch: tx.patch });
        }
        if !tx.change.is_empty() {
            self.events.notify(ChangeEvent {
                kind: ChangeKind::Transaction,
                store_id: self.store_id,
                transaction_id: tx.id,
                change: tx.change,
            });
        }
        Ok(())
    }

    /// Folds one field's patch/change pair into the open transaction.
    /// Panics (rather than returning an `Error`) if no transaction is open:
    /// every call site below already runs `assert_mutations_allowed` first,
    /// so reaching here with `tx == None` is this module's own bug.
    fn record_mutation(
        &mut self,
        schema_id: &str,
        record_id: &str,
        field_name: &str,
        field_patch: FieldPatch,
        changes: impl IntoIterator<Item = crate::change::FieldChange>,
    ) {
        let tx = self.tx.as_mut().expect("record_mutation called outside a transaction");
        patch::record_patch(&mut tx.patch, schema_id, record_id, field_name, field_patch);
        for c in changes {
            crate::change::record_change(&mut tx.change, schema_id, record_id, field_name, c);
        }
    }

    fn record_mut(&mut self, schema_id: &str, record_id: &str) -> &mut Record {
        self.tables
            .get_mut(schema_id)
            .unwrap_or_else(|| panic!("unknown schema id {schema_id:?}"))
            .get_mut(record_id)
            .unwrap_or_else(|| panic!("unknown record id {record_id:?} in schema {schema_id:?}"))
    }

    /// Builds a fresh, unattached record from `schema_id`'s layout. The
    /// record belongs to no table until [`Store::insert_record`] attaches
    /// it - mirroring C7's "record factory" and C8's separate `insert`
    /// (§4.7, §4.8).
    pub fn new_record(&self, schema_id: &str, record_id: impl Into<RecordId>) -> Record {
        let schema = self.tables.get(schema_id).unwrap_or_else(|| panic!("unknown schema id {schema_id:?}")).schema();
        Record::new(schema, record_id, self.store_id)
    }

    /// Attaches a record this store produced to its schema's table. Records
    /// are only ever created inside a transaction (§3 Lifecycles); panics
    /// (see [`crate::table::Table::insert`]) if the record belongs to a
    /// different store or already has a parent.
    pub fn insert_record(&mut self, record: Record) -> Result<()> {
        self.assert_mutations_allowed()?;
        let schema_id = record.schema_id().clone();
        let store_id = self.store_id;
        self.tables.get_mut(schema_id.as_str()).unwrap_or_else(|| panic!("unknown schema id {schema_id:?}")).insert(store_id, record);
        Ok(())
    }

    pub fn delete_record(&mut self, schema_id: &str, record_id: &str) -> Result<()> {
        self.assert_mutations_allowed()?;
        self.tables.get_mut(schema_id).unwrap_or_else(|| panic!("unknown schema id {schema_id:?}")).delete(record_id);
        Ok(())
    }

    // -- Register field -----------------------------------------------

    pub fn set_register(&mut self, schema_id: &str, record_id: &str, field_name: &str, value: Value) -> Result<()> {
        self.assert_mutations_allowed()?;
        let clock = self.version;
        let store_id = self.store_id;
        let record = self.record_mut(schema_id, record_id);
        let field = record.field_mut(field_name).and_then(Field::as_register_mut).unwrap_or_else(|| {
            panic!("field {field_name:?} on schema {schema_id:?} is not a register")
        });
        let (field_patch, change) = field.set(value, clock, store_id);
        self.record_mutation(schema_id, record_id, field_name, field_patch, std::iter::once(change));
        Ok(())
    }

    // -- List field -----------------------------------------------------

    pub fn list_splice(
        &mut self,
        schema_id: &str,
        record_id: &str,
        field_name: &str,
        index: isize,
        count: usize,
        values: Vec<Value>,
    ) -> Result<()> {
        self.assert_mutations_allowed()?;
        let record = self.record_mut(schema_id, record_id);
        let field = record
            .field_mut(field_name)
            .and_then(Field::as_list_mut)
            .unwrap_or_else(|| panic!("field {field_name:?} on schema {schema_id:?} is not a list"));
        let (field_patch, changes) = field.splice(index, count, values);
        self.record_mutation(schema_id, record_id, field_name, field_patch, changes);
        Ok(())
    }

    pub fn list_push(&mut self, schema_id: &str, record_id: &str, field_name: &str, value: Value) -> Result<()> {
        let len = self.record_mut(schema_id, record_id).list(field_name).map(|l| l.len()).unwrap_or(0);
        self.list_splice(schema_id, record_id, field_name, len as isize, 0, vec![value])
    }

    pub fn list_insert(
        &mut self,
        schema_id: &str,
        record_id: &str,
        field_name: &str,
        index: isize,
        value: Value,
    ) -> Result<()> {
        self.list_splice(schema_id, record_id, field_name, index, 0, vec![value])
    }

    pub fn list_remove(&mut self, schema_id: &str, record_id: &str, field_name: &str, index: isize) -> Result<()> {
        self.list_splice(schema_id, record_id, field_name, index, 1, vec![])
    }

    pub fn list_set(
        &mut self,
        schema_id: &str,
        record_id: &str,
        field_name: &str,
        index: isize,
        value: Value,
    ) -> Result<()> {
        self.list_splice(schema_id, record_id, field_name, index, 1, vec![value])
    }

    pub fn list_clear(&mut self, schema_id: &str, record_id: &str, field_name: &str) -> Result<()> {
        let len = self.record_mut(schema_id, record_id).list(field_name).map(|l| l.len()).unwrap_or(0);
        self.list_splice(schema_id, record_id, field_name, 0, len, vec![])
    }

    pub fn list_assign(
        &mut self,
        schema_id: &str,
        record_id: &str,
        field_name: &str,
        values: Vec<Value>,
    ) -> Result<()> {
        let len = self.record_mut(schema_id, record_id).list(field_name).map(|l| l.len()).unwrap_or(0);
        self.list_splice(schema_id, record_id, field_name, 0, len, values)
    }

    // -- Map field --------------------------------------------------------

    pub fn map_set(
        &mut self,
        schema_id: &str,
        record_id: &str,
        field_name: &str,
        key: &str,
        value: Option<Value>,
    ) -> Result<()> {
        self.assert_mutations_allowed()?;
        let clock = self.version;
        let store_id = self.store_id;
        let undoable = self
            .tables
            .get(schema_id)
            .unwrap_or_else(|| panic!("unknown schema id {schema_id:?}"))
            .schema()
            .field(field_name)
            .unwrap_or_else(|| panic!("unknown field {field_name:?} on schema {schema_id:?}"))
            .undoable;

        let record = self.record_mut(schema_id, record_id);
        let field = record
            .field_mut(field_name)
            .and_then(Field::as_map_mut)
            .unwrap_or_else(|| panic!("field {field_name:?} on schema {schema_id:?} is not a map"));

        if let Some((entry, change)) = field.set(key, value, clock, store_id, undoable) {
            let field_patch = FieldPatch::Map { entries: BTreeMap::from([(crate::patch::MapKey::from(key), entry)]) };
            self.record_mutation(schema_id, record_id, field_name, field_patch, std::iter::once(change));
        }
        Ok(())
    }

    pub fn map_delete(&mut self, schema_id: &str, record_id: &str, field_name: &str, key: &str) -> Result<()> {
        self.map_set(schema_id, record_id, field_name, key, None)
    }

    pub fn map_clear(&mut self, schema_id: &str, record_id: &str, field_name: &str) -> Result<()> {
        let keys: Vec<String> = self
            .record_mut(schema_id, record_id)
            .map(field_name)
            .map(|m| m.keys().iter().map(|k| k.to_string()).collect())
            .unwrap_or_default();
        for key in keys {
            self.map_delete(schema_id, record_id, field_name, &key)?;
        }
        Ok(())
    }

    // -- Text field -------------------------------------------------------

    pub fn text_splice(
        &mut self,
        schema_id: &str,
        record_id: &str,
        field_name: &str,
        index: isize,
        remove_count: usize,
        insert: &str,
    ) -> Result<()> {
        self.assert_mutations_allowed()?;
        let record = self.record_mut(schema_id, record_id);
        let field = record
            .field_mut(field_name)
            .and_then(Field::as_text_mut)
            .unwrap_or_else(|| panic!("field {field_name:?} on schema {schema_id:?} is not text"));
        let (field_patch, changes) = field.splice(index, remove_count, insert);
        self.record_mutation(schema_id, record_id, field_name, field_patch, changes);
        Ok(())
    }

    // -- Remote / undo / redo --------------------------------------------

    /// Applies a patch received from a peer. Refuses with `MutationConflict`
    /// if a local transaction is in progress. Fast-forwards `version` to
    /// `max(local, remote) + 1` (§3 invariant 3) and emits one
    /// `"transaction"` change event if anything was actually mutated.
    /// Unknown schema ids are logged and skipped rather than failing the
    /// whole apply (§7).
    pub fn apply_transaction(&mut self, remote: Transaction) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::MutationConflict);
        }

        let mut change = Change::new();
        for (schema_id, table_patch) in &remote.patch {
            match self.tables.get_mut(schema_id.as_str()) {
                Some(table) => table.apply_patch(schema_id, table_patch, Direction::Forward, &mut change),
                None => log::warn!(
                    "UnknownSchema: remote transaction {} from store {} references unknown schema {:?}; skipping",
                    remote.id,
                    remote.store_id,
                    schema_id
                ),
            }
        }

        self.version = self.version.max(remote.id.duplex_version()) + 1;

        if !remote.patch.is_empty() {
            self.undo_log.push((remote.id.clone(), remote.patch.clone()));
        }
        if !change.is_empty() {
            self.events.notify(ChangeEvent {
                kind: ChangeKind::Transaction,
                store_id: remote.store_id,
                transaction_id: remote.id,
                change,
            });
        }
        Ok(())
    }

    /// Re-applies a previously committed transaction's patch with every
    /// field's removals/insertions swapped (`undo`), or as-is (`redo`).
    /// Refuses with `MutationConflict` while a local transaction is open.
    /// An id with no undo-log entry (already undone past, or never
    /// committed here) is a no-op.
    pub fn undo(&mut self, id: &Identifier) -> Result<()> {
        self.replay(id, Direction::Inverse, ChangeKind::Undo)
    }

    pub fn redo(&mut self, id: &Identifier) -> Result<()> {
        self.replay(id, Direction::Forward, ChangeKind::Redo)
    }

    fn replay(&mut self, id: &Identifier, direction: Direction, kind: ChangeKind) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::MutationConflict);
        }
        let Some(patch) = self.undo_log.iter().find(|(tid, _)| tid == id).map(|(_, p)| p.clone()) else {
            log::warn!("no undo-log entry for transaction {id}; undo/redo is a no-op");
            return Ok(());
        };

        let mut change = Change::new();
        for (schema_id, table_patch) in &patch {
            if let Some(table) = self.tables.get_mut(schema_id.as_str()) {
                table.apply_patch(schema_id, table_patch, direction, &mut change);
            }
        }

        self.version += 1;
        if !change.is_empty() {
            self.events.notify(ChangeEvent { kind, store_id: self.store_id, transaction_id: id.clone(), change });
        }
        Ok(())
    }
}
