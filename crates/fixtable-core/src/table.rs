//! Runtime table metadata.
//!
//! Fixtures are built against a schema description that exists at run time,
//! not against derived model structs: test authors routinely point a fixture
//! set at tables owned by other systems. `TableDef` carries exactly what
//! datum construction needs — column names, default-value descriptors, and
//! primary-key/autoincrement flags — and `Metadata` is the registry that
//! resolves table names to definitions.

use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A column's declared default value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    /// A plain scalar default, reproducible as a fixture field value.
    Scalar(Value),
    /// A server-side or expression default (e.g. `now()`), which a fixture
    /// cannot reproduce in memory.
    Expression(String),
}

/// Metadata about a single table column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Whether this column is part of the primary key
    pub primary_key: bool,
    /// Whether this column auto-increments
    pub auto_increment: bool,
    /// Declared default value, if any
    pub default: Option<ColumnDefault>,
}

impl ColumnDef {
    /// Create a new column with no flags set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: false,
            auto_increment: false,
            default: None,
        }
    }

    /// Set the primary-key flag.
    pub fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set the auto-increment flag.
    pub fn auto_increment(mut self, value: bool) -> Self {
        self.auto_increment = value;
        self
    }

    /// Set a scalar default value.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(ColumnDefault::Scalar(value.into()));
        self
    }

    /// Set a server-side/expression default.
    pub fn default_expression(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Expression(expr.into()));
        self
    }

    /// Extract the default usable as a fixture field value.
    ///
    /// Scalar defaults produce their value. Expression defaults cannot be
    /// reproduced in memory; they degrade to "no default" with a warning,
    /// since fixtures commonly override defaults anyway.
    pub fn default_value(&self) -> Option<Value> {
        match &self.default {
            None => None,
            Some(ColumnDefault::Scalar(v)) => Some(v.clone()),
            Some(ColumnDefault::Expression(expr)) => {
                tracing::warn!(
                    column = %self.name,
                    expression = %expr,
                    "non-scalar default value is not supported"
                );
                None
            }
        }
    }
}

/// A table definition: the column/key description one datum is built against.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    name: String,
    columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Create a table definition from its columns.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// The table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All columns, in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check whether a column is declared.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Primary-key column names, in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

impl fmt::Display for TableDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} columns)", self.name, self.columns.len())
    }
}

/// The schema registry: table name → table definition.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    tables: HashMap<String, Arc<TableDef>>,
}

impl Metadata {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    /// Add a table definition, returning the shared handle.
    ///
    /// Re-adding a name replaces the previous definition; datums already
    /// constructed against the old definition keep it.
    pub fn add_table(&mut self, table: TableDef) -> Arc<TableDef> {
        let table = Arc::new(table);
        self.tables.insert(table.name().to_string(), table.clone());
        table
    }

    /// Look up a table by name.
    pub fn table(&self, name: &str) -> Option<Arc<TableDef>> {
        self.tables.get(name).cloned()
    }

    /// All registered table names.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }
}
