//! Datum construction and the set/get/fixate contract.
//!
//! A `Datum` is an in-memory prototype of one table row. Fields are
//! assigned through `set`, which classifies each value into its field kind
//! and validates the name against the schema at assignment time; reads go
//! through `get`, which returns resolved values. Relationship and deferred
//! fields resolve against the rest of the fixture graph, so datums may
//! reference each other in any construction order — including cycles —
//! with `fixate` as the phase that settles everything once the whole graph
//! exists.

use crate::binding::{self, EntityBinding};
use crate::declarations::{FieldInput, FieldKind, FieldValue};
use crate::identity::IdentityFields;
use fixtable_core::{EntityDef, EntityRegistry, Error, Metadata, Result, TableDef, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Reserved marker for a datum's own bookkeeping entries.
///
/// Names starting with this prefix bypass classification and schema
/// validation; they are not row fields.
pub const RESERVED_PREFIX: char = '_';

/// A schema reference: what a datum can be constructed against.
#[derive(Debug, Clone)]
pub enum SchemaRef {
    /// A table name, resolved against the factory's metadata.
    Name(String),
    /// A table definition, used directly.
    Table(Arc<TableDef>),
    /// A mapped entity class; only usable when the factory carries an
    /// entity registry.
    Entity(Arc<EntityDef>),
}

impl From<&str> for SchemaRef {
    fn from(name: &str) -> Self {
        SchemaRef::Name(name.to_string())
    }
}

impl From<String> for SchemaRef {
    fn from(name: String) -> Self {
        SchemaRef::Name(name)
    }
}

impl From<Arc<TableDef>> for SchemaRef {
    fn from(table: Arc<TableDef>) -> Self {
        SchemaRef::Table(table)
    }
}

impl From<&Arc<TableDef>> for SchemaRef {
    fn from(table: &Arc<TableDef>) -> Self {
        SchemaRef::Table(table.clone())
    }
}

impl From<Arc<EntityDef>> for SchemaRef {
    fn from(entity: Arc<EntityDef>) -> Self {
        SchemaRef::Entity(entity)
    }
}

impl From<&Arc<EntityDef>> for SchemaRef {
    fn from(entity: &Arc<EntityDef>) -> Self {
        SchemaRef::Entity(entity.clone())
    }
}

/// A resolved field value: what `get` returns.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// A plain scalar.
    Scalar(Value),
    /// The value tuple of a composite identity.
    Tuple(Vec<Value>),
    /// A related datum, exposed through the mapped layer's semantics.
    One(Datum),
    /// A related collection.
    Many(Vec<Datum>),
}

impl Resolved {
    /// The scalar value, if this resolved to one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// The related datum, if this resolved to one.
    pub fn as_datum(&self) -> Option<&Datum> {
        match self {
            Resolved::One(d) => Some(d),
            _ => None,
        }
    }

    /// The related collection, if this resolved to one.
    pub fn as_data(&self) -> Option<&[Datum]> {
        match self {
            Resolved::Many(ds) => Some(ds),
            _ => None,
        }
    }

    /// Collapse to a scalar. Composite tuples yield their first value;
    /// instance and collection forms have no scalar rendering and yield
    /// NULL.
    pub fn into_value(self) -> Value {
        match self {
            Resolved::Scalar(v) => v,
            Resolved::Tuple(vs) => vs.into_iter().next().unwrap_or(Value::Null),
            Resolved::One(_) | Resolved::Many(_) => Value::Null,
        }
    }
}

impl PartialEq for Resolved {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Resolved::Scalar(a), Resolved::Scalar(b)) => a == b,
            (Resolved::Tuple(a), Resolved::Tuple(b)) => a == b,
            (Resolved::One(a), Resolved::One(b)) => a.ptr_eq(b),
            (Resolved::Many(a), Resolved::Many(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.ptr_eq(y))
            }
            _ => false,
        }
    }
}

/// Constructs datums against one metadata scope and, optionally, one
/// external entity registry.
#[derive(Debug, Clone)]
pub struct DatumFactory {
    metadata: Arc<Metadata>,
    registry: Option<Arc<EntityRegistry>>,
}

impl DatumFactory {
    /// Create a factory over a metadata scope, with no entity interop.
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata: Arc::new(metadata),
            registry: None,
        }
    }

    /// Attach an external entity registry. Every datum built afterwards is
    /// specialized against the entity class mapping its table.
    pub fn with_registry(mut self, registry: Arc<EntityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The metadata scope this factory resolves table names against.
    pub fn metadata(&self) -> &Arc<Metadata> {
        &self.metadata
    }

    /// The attached entity registry, if any.
    pub fn registry(&self) -> Option<&Arc<EntityRegistry>> {
        self.registry.as_ref()
    }

    /// Construct a datum with schema-derived identity and default fields.
    pub fn datum(&self, schema: impl Into<SchemaRef>) -> Result<Datum> {
        self.build(schema.into(), None, Vec::new())
    }

    /// Construct a datum with explicit identity fields.
    ///
    /// The supplied names must equal the table's primary-key sequence
    /// exactly and in order.
    pub fn datum_with_ids(
        &self,
        schema: impl Into<SchemaRef>,
        id_fields: &[&str],
    ) -> Result<Datum> {
        self.build(schema.into(), Some(id_fields), Vec::new())
    }

    /// Construct a datum and assign initial fields in one call.
    pub fn datum_with_fields(
        &self,
        schema: impl Into<SchemaRef>,
        fields: Vec<(&str, FieldInput)>,
    ) -> Result<Datum> {
        self.build(schema.into(), None, fields)
    }

    fn build(
        &self,
        schema: SchemaRef,
        id_fields: Option<&[&str]>,
        fields: Vec<(&str, FieldInput)>,
    ) -> Result<Datum> {
        let (table, mut entity) = match schema {
            SchemaRef::Name(name) => {
                let table = self
                    .metadata
                    .table(&name)
                    .ok_or(Error::SchemaNotFound { schema: name })?;
                (table, None)
            }
            SchemaRef::Table(table) => (table, None),
            SchemaRef::Entity(entity) => {
                if self.registry.is_none() {
                    return Err(Error::TypeMismatch {
                        expected: "a table name or a table definition",
                        actual: format!("entity class {}", entity.name()),
                    });
                }
                (entity.table().clone(), Some(entity))
            }
        };

        // With a registry attached, every datum must interoperate with the
        // mapped layer, so a raw name/table still resolves to its entity.
        if let Some(registry) = &self.registry {
            if entity.is_none() {
                entity = Some(registry.by_table(table.name()).ok_or_else(|| {
                    Error::EntityNotRegistered {
                        table: table.name().to_string(),
                    }
                })?);
            }
        }

        let binding = match (&self.registry, &entity) {
            (Some(registry), Some(entity)) => Some(binding::specialize(registry, entity)),
            _ => None,
        };

        let identity = IdentityFields::resolve(&table, id_fields)?;
        let datum = Datum {
            inner: Rc::new(RefCell::new(DatumInner {
                table: table.clone(),
                identity,
                binding,
                fields: Vec::new(),
                mapped: Vec::new(),
                reserved: Vec::new(),
            })),
        };

        // Seed every column with its declared default so unassigned fields
        // read as their defaults.
        for column in table.columns() {
            let default = column.default_value().unwrap_or(Value::Null);
            datum.set(&column.name, FieldInput::Scalar(default))?;
        }
        for (name, input) in fields {
            datum.set(name, input)?;
        }
        Ok(datum)
    }
}

struct DatumInner {
    table: Arc<TableDef>,
    identity: IdentityFields,
    binding: Option<Arc<EntityBinding>>,
    fields: Vec<(String, FieldValue)>,
    mapped: Vec<(String, Resolved)>,
    reserved: Vec<(String, FieldValue)>,
}

impl DatumInner {
    fn is_declared(&self, name: &str) -> bool {
        self.table.has_column(name)
            || self
                .binding
                .as_ref()
                .is_some_and(|b| b.has_property(name))
    }

    fn check_declared(&self, name: &str) -> Result<()> {
        if self.is_declared(name) {
            return Ok(());
        }
        Err(Error::UndeclaredField {
            schema: self.table.name().to_string(),
            field: name.to_string(),
        })
    }

    fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn put_field(&mut self, name: &str, value: FieldValue) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            // Reassignment replaces the field value wholesale.
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    fn mapped(&self, name: &str) -> Option<&Resolved> {
        self.mapped
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn put_mapped(&mut self, name: &str, value: Resolved) {
        match self.mapped.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.mapped.push((name.to_string(), value)),
        }
    }

    fn reserved(&self, name: &str) -> Option<&FieldValue> {
        self.reserved
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    fn put_reserved(&mut self, name: &str, value: FieldValue) {
        match self.reserved.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => *slot = value,
            None => self.reserved.push((name.to_string(), value)),
        }
    }
}

/// An in-memory prototype of one table row.
///
/// `Datum` is a cheap-clone handle; clones share the same underlying
/// record, which is what makes cross-references and cycles representable.
/// Instances are single-threaded: assignment and fixation must be
/// sequenced per instance by the caller.
#[derive(Clone)]
pub struct Datum {
    inner: Rc<RefCell<DatumInner>>,
}

impl Datum {
    /// The schema (table) name this datum is built against.
    pub fn schema_name(&self) -> String {
        self.inner.borrow().table.name().to_string()
    }

    /// The table definition this datum is built against.
    pub fn table(&self) -> Arc<TableDef> {
        self.inner.borrow().table.clone()
    }

    /// The resolved identity fields.
    pub fn identity(&self) -> IdentityFields {
        self.inner.borrow().identity.clone()
    }

    /// The entity binding, when the datum interoperates with a mapped
    /// layer.
    pub fn binding(&self) -> Option<Arc<EntityBinding>> {
        self.inner.borrow().binding.clone()
    }

    /// Whether an entity binding is active.
    pub fn is_bound(&self) -> bool {
        self.inner.borrow().binding.is_some()
    }

    /// Whether two handles refer to the same record.
    pub fn ptr_eq(&self, other: &Datum) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Field names in assignment order.
    pub fn field_names(&self) -> Vec<String> {
        self.inner
            .borrow()
            .fields
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// The kind a field was classified as, if assigned.
    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.inner.borrow().field(name).map(FieldValue::kind)
    }

    /// The stored declaration for a field, if assigned.
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        self.inner.borrow().field(name).cloned()
    }

    /// Names currently visible to the mapped layer's own accessors.
    pub fn mapped_names(&self) -> Vec<String> {
        self.inner
            .borrow()
            .mapped
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Assign a field.
    ///
    /// The value is classified into its field kind, bound to this datum,
    /// and validated against the schema — all at assignment time. When an
    /// entity binding is active, every non-lazy value is resolved
    /// immediately and written through the mapped layer's own set path;
    /// lazy values stay deferred until fixation because their computation
    /// may depend on sibling fields not yet assigned.
    pub fn set(&self, name: &str, value: impl Into<FieldInput>) -> Result<()> {
        let input = value.into();
        if name.starts_with(RESERVED_PREFIX) {
            let declared = FieldValue::classify(name, input);
            self.inner.borrow_mut().put_reserved(name, declared);
            return Ok(());
        }

        let declared = FieldValue::classify(name, input);
        declared.bind(&self.schema_name(), name);
        self.check_assignment(name, &declared)?;

        let binding = {
            let mut inner = self.inner.borrow_mut();
            inner.put_field(name, declared.clone());
            inner.binding.clone()
        };

        if let Some(binding) = binding {
            if declared.kind() != FieldKind::Lazy {
                let resolved = self.value_of(name, &declared)?;
                self.write_mapped(&binding, name, resolved)?;
            }
        }
        Ok(())
    }

    /// Read a field's resolved value.
    ///
    /// Without an entity binding the value is resolved from the internal
    /// field map, unwrapping deferred computations on first read (they are
    /// still evaluated at most once). With a binding active, reads pass
    /// straight through to the mapped layer's own store; a deferred
    /// assignment leaves that store untouched until fixation, so the read
    /// yields whatever the store last saw for that name.
    pub fn get(&self, name: &str) -> Result<Resolved> {
        if name.starts_with(RESERVED_PREFIX) {
            let value = self.inner.borrow().reserved(name).cloned();
            let value = value.ok_or_else(|| self.unresolved(name))?;
            return self.value_of(name, &value);
        }

        if self.is_bound() {
            let mapped = self.inner.borrow().mapped(name).cloned();
            return mapped.ok_or_else(|| self.unresolved(name));
        }

        let field = self.inner.borrow().field(name).cloned();
        let field = field.ok_or_else(|| self.unresolved(name))?;
        self.value_of(name, &field)
    }

    /// Read a field collapsed to a scalar (`get` + `Resolved::into_value`).
    pub fn get_value(&self, name: &str) -> Result<Value> {
        Ok(self.get(name)?.into_value())
    }

    /// Resolve a field value in the context of this datum.
    pub fn value_of(&self, name: &str, value: &FieldValue) -> Result<Resolved> {
        match value {
            FieldValue::Scalar(v) => Ok(Resolved::Scalar(v.clone())),
            FieldValue::Lazy(lazy) => Ok(Resolved::Scalar(lazy.force())),
            FieldValue::ManyToOne(rel) => {
                if let Some(binding) = self.binding() {
                    if let Some(prop) = binding.relationship(name) {
                        if prop.uselist {
                            // Multi-valued property: the collection form.
                            return Ok(Resolved::Many(vec![rel.target().clone()]));
                        }
                        return Ok(Resolved::One(rel.target().clone()));
                    }
                }
                // Plain foreign-key resolution: the target's identity
                // value(s).
                let values = rel
                    .referred_fields()
                    .field_names()
                    .iter()
                    .map(|n| rel.target().scalar_of(n))
                    .collect::<Result<Vec<Value>>>()?;
                if values.len() == 1 {
                    let value = values.into_iter().next().unwrap_or(Value::Null);
                    Ok(Resolved::Scalar(value))
                } else {
                    Ok(Resolved::Tuple(values))
                }
            }
            FieldValue::OneToMany(rel) => self.resolve_collection(name, rel.members()),
            FieldValue::ManyToMany(rel) => self.resolve_collection(name, rel.members()),
        }
    }

    /// Resolve this datum's identity column values.
    pub fn identity_values(&self) -> Result<Vec<Value>> {
        let identity = self.identity();
        identity
            .field_names()
            .iter()
            .map(|n| self.scalar_of(n))
            .collect()
    }

    /// Resolve every deferred field through the mapped layer.
    ///
    /// Idempotent and callable any number of times: deferred computations
    /// are memoized, so repeated fixation rewrites the same values. Without
    /// an entity binding this is a no-op — there is no external store to
    /// reconcile, and `get` already unwraps deferred values on read.
    pub fn fixate(&self) -> Result<()> {
        let Some(binding) = self.binding() else {
            return Ok(());
        };
        let deferred: Vec<(String, FieldValue)> = {
            let inner = self.inner.borrow();
            inner
                .fields
                .iter()
                .filter(|(_, v)| v.kind() == FieldKind::Lazy)
                .cloned()
                .collect()
        };
        for (name, value) in deferred {
            let resolved = self.value_of(&name, &value)?;
            self.write_mapped(&binding, &name, resolved)?;
        }
        Ok(())
    }

    fn resolve_collection(&self, name: &str, members: &[Datum]) -> Result<Resolved> {
        if let Some(binding) = self.binding() {
            if let Some(prop) = binding.relationship(name) {
                if !prop.uselist {
                    // Single-valued property over a collection: the first
                    // element, or NULL when the collection is empty.
                    return Ok(members
                        .first()
                        .map_or(Resolved::Scalar(Value::Null), |d| Resolved::One(d.clone())));
                }
            }
        }
        Ok(Resolved::Many(members.to_vec()))
    }

    /// Resolve a single field down to a scalar (identity resolution path).
    pub(crate) fn scalar_of(&self, name: &str) -> Result<Value> {
        let field = self.inner.borrow().field(name).cloned();
        let field = field.ok_or_else(|| self.unresolved(name))?;
        Ok(self.value_of(name, &field)?.into_value())
    }

    fn check_assignment(&self, name: &str, value: &FieldValue) -> Result<()> {
        let inner = self.inner.borrow();
        inner.check_declared(name)?;
        match value {
            FieldValue::ManyToOne(rel) => {
                for field in rel.this_side_fields() {
                    inner.check_declared(field)?;
                }
            }
            FieldValue::OneToMany(rel) => {
                if let Some(referred) = rel.referred_fields() {
                    for field in referred {
                        inner.check_declared(field)?;
                    }
                }
            }
            FieldValue::ManyToMany(rel) => {
                if let Some(referred) = rel.referred_fields() {
                    for field in referred {
                        inner.check_declared(field)?;
                    }
                }
            }
            FieldValue::Scalar(_) | FieldValue::Lazy(_) => {}
        }
        Ok(())
    }

    /// Write a resolved value through the mapped layer's own set path.
    fn write_mapped(
        &self,
        binding: &Arc<EntityBinding>,
        name: &str,
        resolved: Resolved,
    ) -> Result<()> {
        // Collection writes back-populate the members' foreign keys when
        // the relationship declares the remote column.
        if let Some(prop) = binding.relationship(name) {
            if let Some(remote_key) = prop.remote_key.clone() {
                let members: Vec<Datum> = match &resolved {
                    Resolved::Many(members) => members.clone(),
                    Resolved::One(member) => vec![member.clone()],
                    _ => Vec::new(),
                };
                for member in members {
                    if !member.ptr_eq(self) {
                        member.set(
                            &remote_key,
                            FieldInput::Declared(FieldValue::many_to_one(
                                self,
                                &[remote_key.as_str()],
                            )),
                        )?;
                    }
                }
            }
        }
        self.inner.borrow_mut().put_mapped(name, resolved);
        Ok(())
    }

    fn unresolved(&self, name: &str) -> Error {
        Error::UnresolvedAttribute {
            schema: self.schema_name(),
            field: name.to_string(),
        }
    }
}

impl fmt::Debug for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Datum")
                .field("schema", &inner.table.name())
                .field("identity", &inner.identity)
                .field("fields", &inner.fields.len())
                .field("bound", &inner.binding.is_some())
                .finish(),
            Err(_) => f.write_str("Datum(<in use>)"),
        }
    }
}
