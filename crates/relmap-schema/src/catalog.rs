//! The collaborators the model builder consumes: which entity types take
//! part in the schema, and what query text backs each view.

use crate::{PgType, TypeDescriptor, TypeKey, TypeRef};
use std::collections::HashMap;

/// Enumerates the entity types that make up the schema.
pub trait TypeCatalog {
    fn types(&self) -> Vec<TypeRef>;
}

/// A catalog over an explicit list of types.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    types: Vec<TypeRef>,
}

impl StaticCatalog {
    pub fn new(types: impl IntoIterator<Item = TypeRef>) -> Self {
        Self {
            types: types.into_iter().collect(),
        }
    }
}

impl TypeCatalog for StaticCatalog {
    fn types(&self) -> Vec<TypeRef> {
        self.types.clone()
    }
}

/// Registration of an entity type for [`RegisteredCatalog`].
///
/// Submit one per table or view type:
///
/// ```ignore
/// inventory::submit!(relmap_schema::EntityRegistration::new(TypeRef::new(blog)));
/// ```
pub struct EntityRegistration {
    pub ty: TypeRef,
}

impl EntityRegistration {
    pub const fn new(ty: TypeRef) -> Self {
        Self { ty }
    }
}

inventory::collect!(EntityRegistration);

/// A catalog over every [`EntityRegistration`] linked into the binary.
///
/// Registrations are sorted by identity so the catalog does not depend on
/// link order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegisteredCatalog;

impl TypeCatalog for RegisteredCatalog {
    fn types(&self) -> Vec<TypeRef> {
        let mut types: Vec<TypeRef> = inventory::iter::<EntityRegistration>
            .into_iter()
            .map(|reg| reg.ty)
            .collect();
        types.sort_by_key(|ty| ty.id());
        types.dedup();
        types
    }
}

/// Resolves the defining query of a view type.
pub trait ViewQuerySource {
    /// Query text for `view`, whose primary key is of type `key_type`.
    fn view_query(&self, view: &TypeDescriptor, key_type: PgType) -> Option<String>;
}

/// For models with no views.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoViewQueries;

impl ViewQuerySource for NoViewQueries {
    fn view_query(&self, _view: &TypeDescriptor, _key_type: PgType) -> Option<String> {
        None
    }
}

/// View queries registered up front, by view type.
#[derive(Debug, Clone, Default)]
pub struct StaticViewQueries {
    queries: HashMap<TypeKey, String>,
}

impl StaticViewQueries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, view: TypeRef, query: impl Into<String>) -> Self {
        self.queries.insert(view.key(), query.into());
        self
    }
}

impl ViewQuerySource for StaticViewQueries {
    fn view_query(&self, view: &TypeDescriptor, _key_type: PgType) -> Option<String> {
        self.queries.get(&view.key()).cloned()
    }
}
