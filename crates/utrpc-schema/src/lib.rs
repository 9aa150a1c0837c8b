//! JSON Schema validation for utrpc method contracts.
//!
//! Implements the [`Validator`] capability from `utrpc-wire` on top of
//! JSON Schema 2020-12, plus a directory loader for method-keyed schema
//! files. This crate is optional — methods without validators pass
//! everything through, and hosts may bring their own `Validator`
//! implementations instead.

pub mod config;
pub mod error;
pub mod schema;
pub mod set;

pub use config::ValidationConfig;
pub use error::{Result, SchemaError};
pub use schema::JsonSchema;
pub use set::{Bound, SchemaSet};
pub use utrpc_wire::Validator;
