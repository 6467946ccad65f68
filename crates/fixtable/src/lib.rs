//! Fixtable - relational test fixtures in Rust.
//!
//! Fixtable lets a test author describe one prospective row per table as a
//! lightweight datum, with fields that may be plain values, deferred
//! computations, or references to other datums standing for foreign-key
//! relationships. References resolve into concrete key values once the
//! whole fixture graph exists, so construction order — including cycles —
//! never matters. When an external mapped-entity layer is present, datums
//! are specialized so that layer's introspection recognizes them.
//!
//! # Quick Start
//!
//! ```
//! use fixtable::prelude::*;
//!
//! let mut metadata = Metadata::new();
//! metadata.add_table(TableDef::new(
//!     "teams",
//!     vec![
//!         ColumnDef::new("id").primary_key(true).auto_increment(true),
//!         ColumnDef::new("name"),
//!     ],
//! ));
//! metadata.add_table(TableDef::new(
//!     "heroes",
//!     vec![
//!         ColumnDef::new("id").primary_key(true).auto_increment(true),
//!         ColumnDef::new("name"),
//!         ColumnDef::new("team_id"),
//!     ],
//! ));
//!
//! let factory = DatumFactory::new(metadata);
//!
//! let team = factory.datum("teams").unwrap();
//! team.set("name", "Minutemen").unwrap();
//!
//! let hero = factory.datum("heroes").unwrap();
//! hero.set("name", "Nite Owl").unwrap();
//! // Assigning a datum is an implicit many-to-one reference.
//! hero.set("team_id", &team).unwrap();
//!
//! hero.fixate().unwrap();
//! assert!(hero.identity().is_auto());
//! ```
//!
//! # Two-phase construction
//!
//! Datums are built in two phases: **construction** (fields assigned and
//! classified, declaration mismatches failing fast) and **fixation**
//! (deferred and relationship fields settled once every participant
//! exists). Between the phases, datums may freely reference each other in
//! any order.

pub mod binding;
pub mod datum;
pub mod declarations;
pub mod identity;

pub use binding::{EntityBinding, cleanup, specialize};
pub use datum::{Datum, DatumFactory, RESERVED_PREFIX, Resolved, SchemaRef};
pub use declarations::{
    FieldInput, FieldKind, FieldSite, FieldValue, Lazy, LazyFn, ManyToMany, ManyToOne, OneToMany,
    lazy,
};
pub use identity::IdentityFields;

// Re-export the core types so callers need only one crate.
pub use fixtable_core::{
    ColumnDef, ColumnDefault, EntityDef, EntityRegistry, Error, Metadata, RelationshipDef,
    RelationshipKind, Result, TableDef, Value,
};

/// Everything a fixture module usually needs.
pub mod prelude {
    pub use crate::binding::{cleanup, specialize};
    pub use crate::datum::{Datum, DatumFactory, Resolved, SchemaRef};
    pub use crate::declarations::{FieldInput, FieldKind, FieldValue, lazy};
    pub use crate::identity::IdentityFields;
    pub use fixtable_core::{
        ColumnDef, ColumnDefault, EntityDef, EntityRegistry, Error, Metadata, RelationshipDef,
        RelationshipKind, Result, TableDef, Value,
    };
}
