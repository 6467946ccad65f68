//! Error types for fixture construction.

use std::fmt;

/// The primary error type for all fixture operations.
///
/// Every variant is a programmer or configuration error surfaced at the
/// point of detection — construction or assignment time, never fixation.
/// There is no I/O in this system, so there is nothing to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A table name has no matching entry in the metadata.
    SchemaNotFound {
        /// The name that failed to resolve
        schema: String,
    },
    /// The schema argument is not a usable schema reference.
    TypeMismatch {
        /// What the construction site accepts
        expected: &'static str,
        /// What was actually passed
        actual: String,
    },
    /// A table has no corresponding entity class in the external registry.
    EntityNotRegistered {
        /// The table whose entity lookup failed
        table: String,
    },
    /// Caller-supplied identity fields do not match the declared primary key.
    IdentityMismatch {
        /// The field names the caller supplied, in order
        supplied: Vec<String>,
        /// The primary-key column names the table declares, in order
        declared: Vec<String>,
    },
    /// An assigned field name is not declared in the table or the mapped
    /// entity's property set.
    UndeclaredField {
        /// The schema the assignment targeted
        schema: String,
        /// The offending field name
        field: String,
    },
    /// A read of a field name that was never assigned.
    UnresolvedAttribute {
        /// The schema the read targeted
        schema: String,
        /// The missing field name
        field: String,
    },
}

/// Result type alias for fixture operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Is this a declaration mismatch (wrong name, wrong identity, wrong
    /// schema reference) as opposed to a missing-lookup error?
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            Error::TypeMismatch { .. }
                | Error::IdentityMismatch { .. }
                | Error::UndeclaredField { .. }
        )
    }

    /// Is this a failed lookup against the metadata or the entity registry?
    pub fn is_lookup_error(&self) -> bool {
        matches!(
            self,
            Error::SchemaNotFound { .. }
                | Error::EntityNotRegistered { .. }
                | Error::UnresolvedAttribute { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SchemaNotFound { schema } => {
                write!(f, "{schema} is not defined in the metadata")
            }
            Error::TypeMismatch { expected, actual } => {
                write!(f, "schema must be {expected}, got {actual}")
            }
            Error::EntityNotRegistered { table } => {
                write!(f, "entity class for {table} is not in the class registry")
            }
            Error::IdentityMismatch { supplied, declared } => {
                write!(
                    f,
                    "id_fields does not match the table definition ([{}] != [{}])",
                    supplied.join(","),
                    declared.join(",")
                )
            }
            Error::UndeclaredField { schema, field } => {
                write!(
                    f,
                    "{field} is not declared in the table definition or entity configuration of {schema}"
                )
            }
            Error::UnresolvedAttribute { schema, field } => {
                write!(f, "no such attribute {schema}.{field}")
            }
        }
    }
}

impl std::error::Error for Error {}
