//! Field declarations and the field-kind classifier.
//!
//! Every value assigned to a datum field is classified into one of a closed
//! set of kinds: a plain scalar, a deferred computation, or a relationship
//! reference to other datums. The relationship variants carry enough
//! metadata to resolve themselves into concrete field values once the whole
//! fixture graph exists.

use crate::datum::Datum;
use crate::identity::IdentityFields;
use fixtable_core::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A zero-argument deferred computation.
pub type LazyFn = Box<dyn Fn() -> Value>;

/// Where a declaration is attached: the owning schema and field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSite {
    /// Schema (table) name of the owning datum
    pub schema: String,
    /// Field name the declaration was assigned to
    pub field: String,
}

impl fmt::Display for FieldSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.field)
    }
}

type SiteCell = Rc<RefCell<Option<FieldSite>>>;

fn unbound_site() -> SiteCell {
    Rc::new(RefCell::new(None))
}

/// The closed set of field kinds a classified value can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// An opaque, already-final value.
    Scalar,
    /// A deferred computation, evaluated exactly once.
    Lazy,
    /// A reference to one other datum.
    ManyToOne,
    /// A collection of datums referencing back to this one.
    OneToMany,
    /// A collection joined through an association table.
    ManyToMany,
}

impl FieldKind {
    /// Human-readable kind name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Scalar => "scalar",
            FieldKind::Lazy => "lazy",
            FieldKind::ManyToOne => "many-to-one",
            FieldKind::OneToMany => "one-to-many",
            FieldKind::ManyToMany => "many-to-many",
        }
    }
}

/// A deferred field value.
///
/// The computation runs at most once; the result is memoized and every
/// clone of the handle shares it.
#[derive(Clone)]
pub struct Lazy {
    inner: Rc<LazyInner>,
}

struct LazyInner {
    state: RefCell<LazyState>,
    site: RefCell<Option<FieldSite>>,
}

enum LazyState {
    Pending(LazyFn),
    Done(Value),
}

impl Lazy {
    /// Wrap a deferred computation.
    pub fn new(f: impl Fn() -> Value + 'static) -> Self {
        Self::from_boxed(Box::new(f))
    }

    pub(crate) fn from_boxed(f: LazyFn) -> Self {
        Self {
            inner: Rc::new(LazyInner {
                state: RefCell::new(LazyState::Pending(f)),
                site: RefCell::new(None),
            }),
        }
    }

    /// Evaluate the computation, memoizing the result.
    ///
    /// The computation may read sibling fields through datum handles it
    /// captured; no borrow of this cell is held mutably across the call.
    pub fn force(&self) -> Value {
        if let LazyState::Done(v) = &*self.inner.state.borrow() {
            return v.clone();
        }
        let value = match &*self.inner.state.borrow() {
            LazyState::Pending(f) => f(),
            LazyState::Done(v) => v.clone(),
        };
        *self.inner.state.borrow_mut() = LazyState::Done(value.clone());
        value
    }

    /// Whether the computation has already run.
    pub fn is_forced(&self) -> bool {
        matches!(&*self.inner.state.borrow(), LazyState::Done(_))
    }

    /// The site this declaration is attached to, once assigned.
    pub fn site(&self) -> Option<FieldSite> {
        self.inner.site.borrow().clone()
    }

    fn bind(&self, site: FieldSite) {
        *self.inner.site.borrow_mut() = Some(site);
    }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_forced() { "forced" } else { "pending" };
        f.debug_struct("Lazy")
            .field("state", &state)
            .field("site", &self.site())
            .finish()
    }
}

impl PartialEq for Lazy {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

/// "This record references `target`."
///
/// Resolution without a mapped-entity binding yields the target's identity
/// value(s) — the this-side foreign-key scalar(s). With a binding, the
/// target datum itself is handed to the mapped layer.
#[derive(Debug, Clone)]
pub struct ManyToOne {
    target: Datum,
    this_side_fields: Vec<String>,
    referred_fields: IdentityFields,
    site: SiteCell,
}

impl ManyToOne {
    /// Reference `target` through the given this-side field names.
    pub fn new(target: &Datum, this_side_fields: &[&str]) -> Self {
        Self {
            referred_fields: target.identity(),
            target: target.clone(),
            this_side_fields: this_side_fields.iter().map(|s| (*s).to_string()).collect(),
            site: unbound_site(),
        }
    }

    /// The referenced datum.
    pub fn target(&self) -> &Datum {
        &self.target
    }

    /// The field names on the owning datum this reference populates.
    pub fn this_side_fields(&self) -> &[String] {
        &self.this_side_fields
    }

    /// The target's identity fields, captured at wrap time.
    pub fn referred_fields(&self) -> &IdentityFields {
        &self.referred_fields
    }

    /// The site this declaration is attached to, once assigned.
    pub fn site(&self) -> Option<FieldSite> {
        self.site.borrow().clone()
    }
}

impl PartialEq for ManyToOne {
    fn eq(&self, other: &Self) -> bool {
        self.target.ptr_eq(&other.target)
            && self.this_side_fields == other.this_side_fields
            && self.referred_fields == other.referred_fields
    }
}

/// "These records reference back to this one."
///
/// Resolution yields the member collection; propagating foreign keys onto
/// the members is a side effect of the mapped layer, not of this field.
#[derive(Debug, Clone)]
pub struct OneToMany {
    members: Vec<Datum>,
    referred_fields: Option<Vec<String>>,
    site: SiteCell,
}

impl OneToMany {
    /// Collect `members` under the owning datum.
    pub fn new(members: Vec<Datum>, referred_fields: Option<Vec<String>>) -> Self {
        Self {
            members,
            referred_fields,
            site: unbound_site(),
        }
    }

    /// The member datums.
    pub fn members(&self) -> &[Datum] {
        &self.members
    }

    /// Owner-side columns the members refer to, when declared explicitly.
    pub fn referred_fields(&self) -> Option<&[String]> {
        self.referred_fields.as_deref()
    }

    /// The site this declaration is attached to, once assigned.
    pub fn site(&self) -> Option<FieldSite> {
        self.site.borrow().clone()
    }
}

impl PartialEq for OneToMany {
    fn eq(&self, other: &Self) -> bool {
        self.members.len() == other.members.len()
            && self
                .members
                .iter()
                .zip(&other.members)
                .all(|(a, b)| a.ptr_eq(b))
            && self.referred_fields == other.referred_fields
    }
}

/// Association-table variant of a collection reference.
#[derive(Debug, Clone)]
pub struct ManyToMany {
    members: Vec<Datum>,
    link_table: String,
    referred_fields: Option<Vec<String>>,
    site: SiteCell,
}

impl ManyToMany {
    /// Collect `members` joined through `link_table`.
    pub fn new(
        members: Vec<Datum>,
        link_table: impl Into<String>,
        referred_fields: Option<Vec<String>>,
    ) -> Self {
        Self {
            members,
            link_table: link_table.into(),
            referred_fields,
            site: unbound_site(),
        }
    }

    /// The member datums.
    pub fn members(&self) -> &[Datum] {
        &self.members
    }

    /// The association (junction) table name.
    pub fn link_table(&self) -> &str {
        &self.link_table
    }

    /// Owner-side columns the members refer to, when declared explicitly.
    pub fn referred_fields(&self) -> Option<&[String]> {
        self.referred_fields.as_deref()
    }

    /// The site this declaration is attached to, once assigned.
    pub fn site(&self) -> Option<FieldSite> {
        self.site.borrow().clone()
    }
}

impl PartialEq for ManyToMany {
    fn eq(&self, other: &Self) -> bool {
        self.link_table == other.link_table
            && self.members.len() == other.members.len()
            && self
                .members
                .iter()
                .zip(&other.members)
                .all(|(a, b)| a.ptr_eq(b))
            && self.referred_fields == other.referred_fields
    }
}

/// A classified field value.
///
/// A field's kind is fixed for the lifetime of one assignment; reassigning
/// the same name replaces the value wholesale.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// An opaque, already-final value.
    Scalar(Value),
    /// A deferred computation.
    Lazy(Lazy),
    /// A reference to one other datum.
    ManyToOne(ManyToOne),
    /// A collection of datums referencing back to this one.
    OneToMany(OneToMany),
    /// A collection joined through an association table.
    ManyToMany(ManyToMany),
}

impl FieldValue {
    /// Declare a deferred field value.
    pub fn lazy(f: impl Fn() -> Value + 'static) -> Self {
        FieldValue::Lazy(Lazy::new(f))
    }

    /// Declare a many-to-one reference to `target`'s identity fields.
    pub fn many_to_one(target: &Datum, this_side_fields: &[&str]) -> Self {
        FieldValue::ManyToOne(ManyToOne::new(target, this_side_fields))
    }

    /// Declare a one-to-many collection.
    pub fn one_to_many(members: Vec<Datum>, referred_fields: Option<Vec<String>>) -> Self {
        FieldValue::OneToMany(OneToMany::new(members, referred_fields))
    }

    /// Declare a many-to-many collection through `link_table`.
    pub fn many_to_many(members: Vec<Datum>, link_table: impl Into<String>) -> Self {
        FieldValue::ManyToMany(ManyToMany::new(members, link_table, None))
    }

    /// The kind of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Scalar(_) => FieldKind::Scalar,
            FieldValue::Lazy(_) => FieldKind::Lazy,
            FieldValue::ManyToOne(_) => FieldKind::ManyToOne,
            FieldValue::OneToMany(_) => FieldKind::OneToMany,
            FieldValue::ManyToMany(_) => FieldKind::ManyToMany,
        }
    }

    /// Classify an assigned value into its field kind.
    ///
    /// Scalars pass through, deferred computations wrap as `Lazy`,
    /// assigning a datum means "this field references that record"
    /// (implicit many-to-one), assigning a datum collection means "those
    /// records reference this one" (implicit one-to-many), and an
    /// already-declared value is left as-is.
    pub fn classify(name: &str, input: FieldInput) -> FieldValue {
        match input {
            FieldInput::Scalar(v) => FieldValue::Scalar(v),
            FieldInput::Deferred(f) => FieldValue::Lazy(Lazy::from_boxed(f)),
            FieldInput::Datum(d) => FieldValue::many_to_one(&d, &[name]),
            FieldInput::Data(members) => FieldValue::one_to_many(members, None),
            FieldInput::Declared(value) => value,
        }
    }

    /// Attach a relationship- or lazy-typed value to its owning site so the
    /// value knows where it lives when it later resolves.
    pub(crate) fn bind(&self, schema: &str, field: &str) {
        let site = FieldSite {
            schema: schema.to_string(),
            field: field.to_string(),
        };
        match self {
            FieldValue::Scalar(_) => {}
            FieldValue::Lazy(v) => v.bind(site),
            FieldValue::ManyToOne(v) => *v.site.borrow_mut() = Some(site),
            FieldValue::OneToMany(v) => *v.site.borrow_mut() = Some(site),
            FieldValue::ManyToMany(v) => *v.site.borrow_mut() = Some(site),
        }
    }
}

/// The classifier's input: everything `Datum::set` accepts.
pub enum FieldInput {
    /// A plain scalar.
    Scalar(Value),
    /// A zero-argument deferred computation.
    Deferred(LazyFn),
    /// Another datum (implicit many-to-one).
    Datum(Datum),
    /// A collection of datums (implicit one-to-many).
    Data(Vec<Datum>),
    /// An explicitly declared field value, stored as-is.
    Declared(FieldValue),
}

/// Shorthand for a deferred field input.
pub fn lazy(f: impl Fn() -> Value + 'static) -> FieldInput {
    FieldInput::Deferred(Box::new(f))
}

impl fmt::Debug for FieldInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldInput::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
            FieldInput::Deferred(_) => f.write_str("Deferred(..)"),
            FieldInput::Datum(d) => f.debug_tuple("Datum").field(d).finish(),
            FieldInput::Data(ds) => f.debug_tuple("Data").field(&ds.len()).finish(),
            FieldInput::Declared(v) => f.debug_tuple("Declared").field(v).finish(),
        }
    }
}

impl From<Value> for FieldInput {
    fn from(v: Value) -> Self {
        FieldInput::Scalar(v)
    }
}

impl From<bool> for FieldInput {
    fn from(v: bool) -> Self {
        FieldInput::Scalar(Value::Bool(v))
    }
}

impl From<i32> for FieldInput {
    fn from(v: i32) -> Self {
        FieldInput::Scalar(Value::Int(i64::from(v)))
    }
}

impl From<i64> for FieldInput {
    fn from(v: i64) -> Self {
        FieldInput::Scalar(Value::Int(v))
    }
}

impl From<f64> for FieldInput {
    fn from(v: f64) -> Self {
        FieldInput::Scalar(Value::Float(v))
    }
}

impl From<&str> for FieldInput {
    fn from(v: &str) -> Self {
        FieldInput::Scalar(Value::Text(v.to_string()))
    }
}

impl From<String> for FieldInput {
    fn from(v: String) -> Self {
        FieldInput::Scalar(Value::Text(v))
    }
}

impl From<Datum> for FieldInput {
    fn from(d: Datum) -> Self {
        FieldInput::Datum(d)
    }
}

impl From<&Datum> for FieldInput {
    fn from(d: &Datum) -> Self {
        FieldInput::Datum(d.clone())
    }
}

impl From<Vec<Datum>> for FieldInput {
    fn from(ds: Vec<Datum>) -> Self {
        FieldInput::Data(ds)
    }
}

impl From<&[Datum]> for FieldInput {
    fn from(ds: &[Datum]) -> Self {
        FieldInput::Data(ds.to_vec())
    }
}

impl From<FieldValue> for FieldInput {
    fn from(v: FieldValue) -> Self {
        FieldInput::Declared(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::DatumFactory;
    use fixtable_core::{ColumnDef, Metadata, TableDef};
    use std::cell::Cell;
    use std::rc::Rc;

    fn factory() -> DatumFactory {
        let mut metadata = Metadata::new();
        metadata.add_table(TableDef::new(
            "heroes",
            vec![
                ColumnDef::new("id").primary_key(true).auto_increment(true),
                ColumnDef::new("name"),
                ColumnDef::new("team_id"),
            ],
        ));
        DatumFactory::new(metadata)
    }

    #[test]
    fn test_lazy_forces_at_most_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let lazy = Lazy::new(move || {
            counter.set(counter.get() + 1);
            Value::Int(i64::from(counter.get()))
        });

        assert!(!lazy.is_forced());
        assert_eq!(lazy.force(), Value::Int(1));
        assert_eq!(lazy.force(), Value::Int(1));
        assert!(lazy.is_forced());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_lazy_clones_share_memoized_state() {
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let lazy = Lazy::new(move || {
            counter.set(counter.get() + 1);
            Value::Int(99)
        });
        let clone = lazy.clone();

        assert_eq!(lazy.force(), Value::Int(99));
        assert_eq!(clone.force(), Value::Int(99));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_classify_scalar_and_deferred() {
        let scalar = FieldValue::classify("name", FieldInput::from("Nite Owl"));
        assert_eq!(scalar.kind(), FieldKind::Scalar);

        let deferred = FieldValue::classify("name", lazy(|| Value::Int(1)));
        assert_eq!(deferred.kind(), FieldKind::Lazy);
    }

    #[test]
    fn test_classify_datum_is_implicit_many_to_one() {
        let factory = factory();
        let team = factory.datum("heroes").unwrap();

        let classified = FieldValue::classify("team_id", FieldInput::from(&team));
        let FieldValue::ManyToOne(rel) = &classified else {
            panic!("expected many-to-one, got {:?}", classified.kind());
        };
        assert!(rel.target().ptr_eq(&team));
        assert_eq!(rel.this_side_fields(), ["team_id".to_string()]);
        assert_eq!(*rel.referred_fields(), team.identity());
    }

    #[test]
    fn test_classify_collection_is_implicit_one_to_many() {
        let factory = factory();
        let a = factory.datum("heroes").unwrap();
        let b = factory.datum("heroes").unwrap();

        let classified = FieldValue::classify("members", FieldInput::from(vec![a.clone(), b]));
        let FieldValue::OneToMany(rel) = &classified else {
            panic!("expected one-to-many, got {:?}", classified.kind());
        };
        assert_eq!(rel.members().len(), 2);
        assert!(rel.members()[0].ptr_eq(&a));
        assert!(rel.referred_fields().is_none());
    }

    #[test]
    fn test_classify_declared_value_is_left_unchanged() {
        let factory = factory();
        let team = factory.datum("heroes").unwrap();
        let declared = FieldValue::many_to_one(&team, &["team_id"]);

        let reclassified =
            FieldValue::classify("somewhere_else", FieldInput::Declared(declared.clone()));
        assert_eq!(reclassified, declared);
    }

    #[test]
    fn test_bind_records_the_owning_site() {
        let value = FieldValue::lazy(|| Value::Null);
        value.bind("heroes", "name");
        let FieldValue::Lazy(lazy) = &value else {
            unreachable!()
        };
        let site = lazy.site().unwrap();
        assert_eq!(site.to_string(), "heroes.name");
    }
}
