//! The JSON value type stored in register, list and map fields.
//!
//! Field values are "readonly JSON" per the data model: `serde_json::Value`
//! already gives a cheap-to-clone, structurally-comparable, serializable
//! dynamic value with exactly those properties, so it is used directly
//! rather than inventing a parallel enum.
pub type Value = serde_json::Value;
