//! Identity (primary-key) field resolution.

use fixtable_core::{Error, Result, TableDef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The field names that constitute a datum's logical primary key.
///
/// Resolved once at construction and immutable afterwards. The `Auto`
/// variant marks an identity the caller never supplies: a single
/// auto-incrementing column whose value is produced by the persistence
/// layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityFields {
    /// Auto-generated identity wrapping the auto-increment column name.
    Auto(String),
    /// Explicit or schema-derived key columns, in primary-key order.
    Keys(Vec<String>),
}

impl IdentityFields {
    /// Derive a datum's identity fields from the table's declared primary
    /// key and an optional caller-supplied override.
    ///
    /// A supplied override must equal the primary-key sequence exactly and
    /// in order; any permutation or subset is an `IdentityMismatch`. With
    /// no override, a lone auto-increment key column becomes the `Auto`
    /// marker and everything else takes the primary-key sequence verbatim.
    pub fn resolve(table: &TableDef, supplied: Option<&[&str]>) -> Result<Self> {
        let declared: Vec<String> = table
            .primary_key()
            .iter()
            .map(|s| (*s).to_string())
            .collect();

        if let Some(names) = supplied {
            let supplied: Vec<String> = names.iter().map(|s| (*s).to_string()).collect();
            if supplied != declared {
                return Err(Error::IdentityMismatch { supplied, declared });
            }
            return Ok(IdentityFields::Keys(supplied));
        }

        if let [only] = declared.as_slice() {
            if table.column(only).is_some_and(|c| c.auto_increment) {
                return Ok(IdentityFields::Auto(only.clone()));
            }
        }
        Ok(IdentityFields::Keys(declared))
    }

    /// Whether the identity is produced by the persistence layer.
    pub fn is_auto(&self) -> bool {
        matches!(self, IdentityFields::Auto(_))
    }

    /// The identity column names, in order.
    pub fn field_names(&self) -> Vec<&str> {
        match self {
            IdentityFields::Auto(name) => vec![name.as_str()],
            IdentityFields::Keys(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for IdentityFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityFields::Auto(name) => write!(f, "auto({name})"),
            IdentityFields::Keys(names) => write!(f, "[{}]", names.join(",")),
        }
    }
}
