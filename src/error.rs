use thiserror::Error;

/// Fatal errors surfaced to the caller.
///
/// The two non-fatal conditions described by the wire protocol -
/// `UnknownSchema` and `UnknownRecord` - are not represented here. They are
/// logged (`log::warn!`) and the offending patch entry is skipped; see
/// [`crate::store::Store::apply_transaction`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Raised by [`crate::store::Store::create`] when one or more schemas
    /// declare a field name beginning with `$` or `@`.
    #[error("invalid schema: offending field names {offending_fields:?}")]
    InvalidSchema { offending_fields: Vec<String> },

    /// `begin()` called while a transaction is already open.
    #[error("a transaction is already open on this store")]
    AlreadyInTransaction,

    /// A mutation, or `end()`, was attempted with no open transaction.
    #[error("no transaction is open on this store")]
    NotInTransaction,

    /// `apply_transaction` was called while a local transaction was open.
    #[error("cannot apply a remote transaction while a local transaction is open")]
    MutationConflict,
}

pub type Result<T> = std::result::Result<T, Error>;
