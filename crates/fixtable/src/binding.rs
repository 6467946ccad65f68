//! Entity binding: datum specialization for mapped-entity interop.
//!
//! When a datum is constructed for a table that an external mapped-entity
//! layer also knows about, the datum must be recognizable by that layer's
//! introspection. `EntityBinding` is the specialization descriptor: it
//! carries the entity's structure with the layer's strict target-identity
//! typechecks turned off, so a datum can stand in for a real mapped
//! instance. Bindings are cached process-wide per entity class, so repeated
//! construction is cheap and every datum of one entity shares the identical
//! binding.

use fixtable_core::{EntityDef, EntityRegistry, RelationshipDef};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// The specialization descriptor binding datums of one entity class.
#[derive(Debug)]
pub struct EntityBinding {
    entity: Arc<EntityDef>,
    class_name: String,
    registry_id: usize,
    relationships: Vec<RelationshipDef>,
}

impl EntityBinding {
    fn new(registry: &Arc<EntityRegistry>, entity: &Arc<EntityDef>) -> Self {
        // Fixture objects are deliberately not fully-typed instances of the
        // mapped graph; the relationship properties are carried with their
        // target-identity typechecks turned off.
        let relationships = entity
            .relationships()
            .iter()
            .map(RelationshipDef::without_typechecks)
            .collect();
        Self {
            entity: entity.clone(),
            class_name: format!("Datum#{}", entity.name()),
            registry_id: Arc::as_ptr(registry) as usize,
            relationships,
        }
    }

    /// The bound entity class.
    pub fn entity(&self) -> &Arc<EntityDef> {
        &self.entity
    }

    /// The specialized class name registered with the external layer.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The relationship properties, typechecks suppressed.
    pub fn relationships(&self) -> &[RelationshipDef] {
        &self.relationships
    }

    /// Look up a relationship property by name.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Check whether a name is in the bound entity's property set.
    pub fn has_property(&self, name: &str) -> bool {
        self.entity.table().has_column(name) || self.relationship(name).is_some()
    }
}

type BindingCache = Mutex<HashMap<usize, Arc<EntityBinding>>>;

static BINDING_CACHE: OnceLock<BindingCache> = OnceLock::new();

fn lock_cache() -> MutexGuard<'static, HashMap<usize, Arc<EntityBinding>>> {
    let cache = BINDING_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    match cache.lock() {
        Ok(guard) => guard,
        // Mutex was poisoned - recover by taking the lock anyway
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Resolve the specialized binding for an entity class, creating and
/// caching it on first use.
///
/// The lookup-or-create runs under a single lock, so two threads racing on
/// the same entity class always end up with the identical binding. The
/// specialized class name is planted in the external registry so the
/// cleanup hook can remove it later.
pub fn specialize(registry: &Arc<EntityRegistry>, entity: &Arc<EntityDef>) -> Arc<EntityBinding> {
    let key = Arc::as_ptr(entity) as usize;
    let mut cache = lock_cache();
    if let Some(binding) = cache.get(&key) {
        return binding.clone();
    }

    let binding = Arc::new(EntityBinding::new(registry, entity));
    registry.insert_specialized(binding.class_name().to_string(), entity.clone());
    tracing::debug!(
        entity = %entity.name(),
        class = %binding.class_name(),
        "specialized datum binding created"
    );
    cache.insert(key, binding.clone());
    binding
}

/// Remove every specialized class this system registered inside the given
/// registry, and drop the corresponding cache entries.
///
/// Intended to run once the registry (or the metadata scope) is torn down,
/// so repeated test setups do not accumulate stale entries. Datums already
/// constructed keep their bindings and are unaffected.
pub fn cleanup(registry: &Arc<EntityRegistry>) {
    let registry_id = Arc::as_ptr(registry) as usize;
    let mut cache = lock_cache();
    cache.retain(|_, binding| {
        if binding.registry_id == registry_id {
            registry.remove_specialized(binding.class_name());
            tracing::debug!(class = %binding.class_name(), "specialized datum binding removed");
            false
        } else {
            true
        }
    });
}
