//! A schema-driven, in-memory collaborative object store: tables of
//! records whose fields are conflict-free replicated data types (last-writer
//! -wins registers, ordered lists, ordered maps, collaborative text).
//!
//! This crate is the replication engine only (transaction lifecycle,
//! per-field CRDT algorithms, the fractional position-identifier scheme,
//! the schema/record model, and the patch wire format). Transport,
//! persistence, and observer delivery scheduling are the host's job: the
//! crate exposes [`sink::BroadcastSink`] and [`sink::Observer`] as the seam.

pub mod change;
pub mod error;
pub mod fields;
pub mod identifier;
pub mod ordered_map;
pub mod patch;
pub mod record;
pub mod schema;
pub mod sink;
pub mod store;
pub mod table;
pub mod value;

pub use change::{Change, ChangeEvent, ChangeKind, FieldChange};
pub use error::{Error, Result};
pub use fields::{Direction, Field};
pub use identifier::Identifier;
pub use patch::{FieldPatch, Patch, Transaction};
pub use record::Record;
pub use schema::{FieldKind, FieldSchema, Schema};
pub use sink::{BroadcastSink, NullObserver, NullSink, Observer, QueuedObserver};
pub use store::{SchemaDef, Store};
pub use table::Table;
pub use value::Value;

#[cfg(test)]
mod tests {
    // As per smartstring's own documentation: validates that this build's
    // pointer width/endianness matches smartstring's inline-string layout
    // assumptions.
    #[test]
    fn validate_smartstring() {
        smartstring::validate();
    }
}
