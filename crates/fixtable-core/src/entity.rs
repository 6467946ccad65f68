//! The mapped-entity interface.
//!
//! Fixtures optionally interoperate with an external object-relational
//! layer. That layer is out of scope here; this module describes it at the
//! boundary: `EntityDef` is one externally mapped class (its table, its
//! relationship properties), and `EntityRegistry` is the layer's own class
//! registry, which datum construction consults when it is handed a raw
//! table and still has to produce entity-compatible instances.

use crate::table::TableDef;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// The type of relationship between two mapped entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationshipKind {
    /// One-to-one: `Hero` has one `Profile`.
    OneToOne,
    /// Many-to-one: many `Hero`s belong to one `Team`.
    #[default]
    ManyToOne,
    /// One-to-many: one `Team` has many `Hero`s.
    OneToMany,
    /// Many-to-many: `Hero`s have many `Power`s via a link table.
    ManyToMany,
}

/// A relationship property declared on a mapped entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipDef {
    /// Name of the relationship property.
    pub name: String,

    /// The related entity's table name.
    pub related_table: String,

    /// Kind of relationship.
    pub kind: RelationshipKind,

    /// Whether the property is multi-valued (a collection).
    pub uselist: bool,

    /// Foreign-key column on the related table pointing back at this
    /// entity (for OneToMany).
    pub remote_key: Option<String>,

    /// Whether the external layer's strict target-identity check is active
    /// for this property. Datum specialization copies the property with
    /// this turned off so a datum can stand in for a real mapped instance.
    pub typechecks: bool,
}

impl RelationshipDef {
    /// Create a new relationship property.
    pub fn new(
        name: impl Into<String>,
        related_table: impl Into<String>,
        kind: RelationshipKind,
    ) -> Self {
        let uselist = matches!(
            kind,
            RelationshipKind::OneToMany | RelationshipKind::ManyToMany
        );
        Self {
            name: name.into(),
            related_table: related_table.into(),
            kind,
            uselist,
            remote_key: None,
            typechecks: true,
        }
    }

    /// Force list or single (override the kind-derived default).
    pub fn uselist(mut self, value: bool) -> Self {
        self.uselist = value;
        self
    }

    /// Set the remote foreign-key column (OneToMany).
    pub fn remote_key(mut self, key: impl Into<String>) -> Self {
        self.remote_key = Some(key.into());
        self
    }

    /// Copy of this property with target-identity typechecks disabled.
    pub fn without_typechecks(&self) -> Self {
        let mut copy = self.clone();
        copy.typechecks = false;
        copy
    }
}

/// One externally mapped entity class.
#[derive(Debug, Clone)]
pub struct EntityDef {
    name: String,
    table: Arc<TableDef>,
    relationships: Vec<RelationshipDef>,
}

impl EntityDef {
    /// Create an entity definition for a table.
    pub fn new(
        name: impl Into<String>,
        table: Arc<TableDef>,
        relationships: Vec<RelationshipDef>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            relationships,
        }
    }

    /// The entity class name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying table definition.
    pub fn table(&self) -> &Arc<TableDef> {
        &self.table
    }

    /// The declared relationship properties.
    pub fn relationships(&self) -> &[RelationshipDef] {
        &self.relationships
    }

    /// Look up a relationship property by name.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Check whether a name is in this entity's property set — a mapped
    /// column or a relationship property.
    pub fn has_property(&self, name: &str) -> bool {
        self.table.has_column(name) || self.relationship(name).is_some()
    }
}

impl fmt::Display for EntityDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.name, self.table.name())
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_name: BTreeMap<String, Arc<EntityDef>>,
    by_table: BTreeMap<String, String>,
    /// Entries planted by datum specialization, keyed by specialized class
    /// name. Removed wholesale by the cleanup hook.
    specialized: BTreeMap<String, Arc<EntityDef>>,
}

/// The external layer's class registry: entity name → entity definition.
///
/// Lookup-or-create sequences against this registry happen under one lock;
/// the registry may be shared across threads in a concurrent host.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    inner: Mutex<RegistryInner>,
}

impl EntityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            // Mutex was poisoned - recover by taking the lock anyway
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register a mapped entity class.
    pub fn register(&self, entity: Arc<EntityDef>) {
        let mut inner = self.lock();
        inner
            .by_table
            .insert(entity.table().name().to_string(), entity.name().to_string());
        inner.by_name.insert(entity.name().to_string(), entity);
    }

    /// Look up an entity class by name.
    pub fn get(&self, name: &str) -> Option<Arc<EntityDef>> {
        self.lock().by_name.get(name).cloned()
    }

    /// Resolve the entity class that maps a table.
    pub fn by_table(&self, table: &str) -> Option<Arc<EntityDef>> {
        let inner = self.lock();
        let name = inner.by_table.get(table)?;
        inner.by_name.get(name).cloned()
    }

    /// All registered entity class names.
    pub fn entity_names(&self) -> Vec<String> {
        self.lock().by_name.keys().cloned().collect()
    }

    /// Plant a specialized-class entry (used by datum specialization).
    pub fn insert_specialized(&self, class_name: impl Into<String>, entity: Arc<EntityDef>) {
        self.lock().specialized.insert(class_name.into(), entity);
    }

    /// Remove a specialized-class entry by class name (used by the cleanup
    /// hook). Returns whether an entry was present.
    pub fn remove_specialized(&self, class_name: &str) -> bool {
        self.lock().specialized.remove(class_name).is_some()
    }

    /// Names of the specialized-class entries currently planted here.
    pub fn specialized_names(&self) -> Vec<String> {
        self.lock().specialized.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnDef;

    fn teams_entity() -> Arc<EntityDef> {
        let table = Arc::new(TableDef::new(
            "teams",
            vec![
                ColumnDef::new("id").primary_key(true).auto_increment(true),
                ColumnDef::new("name"),
            ],
        ));
        Arc::new(EntityDef::new(
            "Team",
            table,
            vec![
                RelationshipDef::new("heroes", "heroes", RelationshipKind::OneToMany)
                    .remote_key("team_id"),
            ],
        ))
    }

    #[test]
    fn test_relationship_uselist_follows_kind() {
        assert!(RelationshipDef::new("heroes", "heroes", RelationshipKind::OneToMany).uselist);
        assert!(!RelationshipDef::new("team", "teams", RelationshipKind::ManyToOne).uselist);
    }

    #[test]
    fn test_without_typechecks_copies() {
        let prop = RelationshipDef::new("team", "teams", RelationshipKind::ManyToOne);
        assert!(prop.typechecks);
        let relaxed = prop.without_typechecks();
        assert!(!relaxed.typechecks);
        assert!(prop.typechecks);
    }

    #[test]
    fn test_entity_property_set_spans_columns_and_relationships() {
        let entity = teams_entity();
        assert!(entity.has_property("name"));
        assert!(entity.has_property("heroes"));
        assert!(!entity.has_property("sidekicks"));
    }

    #[test]
    fn test_registry_lookup_by_name_and_table() {
        let registry = EntityRegistry::new();
        let entity = teams_entity();
        registry.register(entity.clone());

        assert!(Arc::ptr_eq(&registry.get("Team").unwrap(), &entity));
        assert!(Arc::ptr_eq(&registry.by_table("teams").unwrap(), &entity));
        assert!(registry.by_table("heroes").is_none());
    }

    #[test]
    fn test_specialized_entries_are_tracked_separately() {
        let registry = EntityRegistry::new();
        let entity = teams_entity();
        registry.register(entity.clone());
        registry.insert_specialized("Datum#Team", entity);

        assert_eq!(registry.specialized_names(), vec!["Datum#Team".to_string()]);
        assert!(registry.remove_specialized("Datum#Team"));
        assert!(!registry.remove_specialized("Datum#Team"));
        // The host's own entries are untouched.
        assert!(registry.get("Team").is_some());
    }
}
