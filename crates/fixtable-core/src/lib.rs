//! Core types for Fixtable.
//!
//! This crate provides the foundational abstractions the datum engine is
//! built on:
//!
//! - `Value` for dynamically-typed field values
//! - `TableDef`/`ColumnDef`/`Metadata` for runtime table metadata
//! - `EntityDef`/`EntityRegistry` for the external mapped-entity boundary
//! - the `Error` taxonomy shared by every fixture operation

pub mod entity;
pub mod error;
pub mod table;
pub mod value;

pub use entity::{EntityDef, EntityRegistry, RelationshipDef, RelationshipKind};
pub use error::{Error, Result};
pub use table::{ColumnDef, ColumnDefault, Metadata, TableDef};
pub use value::Value;
