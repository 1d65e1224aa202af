//! Static entity declarations.
//!
//! Entities are described with `static` [`TypeDescriptor`]s instead of being
//! discovered at runtime. A descriptor lists the type's properties, its base
//! type (if it inherits properties) and the indexes declared on it.
//!
//! ```
//! use relmap_schema::{IndexAttr, PropertyDescriptor, TypeDescriptor, TypeKind, TypeRef};
//!
//! fn entity() -> &'static TypeDescriptor { &ENTITY }
//! fn blog() -> &'static TypeDescriptor { &BLOG }
//!
//! static ENTITY: TypeDescriptor = TypeDescriptor::new("blogging::model", "Entity", TypeKind::Plain)
//!     .with_properties(&[
//!         PropertyDescriptor::scalar::<uuid::Uuid>("PrimaryKey"),
//!         PropertyDescriptor::scalar::<i64>("Version"),
//!     ]);
//!
//! static BLOG: TypeDescriptor = TypeDescriptor::new("blogging::model", "Blog", TypeKind::Table)
//!     .with_base(TypeRef::new(entity))
//!     .with_properties(&[PropertyDescriptor::scalar::<String>("Title")])
//!     .with_indexes(&[IndexAttr::new(&["Title"]).unique()]);
//!
//! assert_eq!(blog().schema_name(), "blogging");
//! assert_eq!(blog().properties().unwrap().len(), 3);
//! ```

use crate::{ColumnProperty, ModelError, PgType, SqlScalar};
use std::fmt;

/// Name of the identity property every table and view declares.
pub const PRIMARY_KEY: &str = "PrimaryKey";

/// What a declared type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// An identified entity stored in its own table.
    Table,
    /// An identified entity backed by a query.
    View,
    /// A value container whose properties are flattened onto the owner's table.
    Inlined,
    /// Anything else: abstract bases, DTOs. Never mapped directly.
    Plain,
}

/// A lazily resolved reference to a type descriptor.
///
/// Resolution goes through a function so that descriptors may reference each
/// other cyclically (`Blog` has posts, `Post` has a blog).
#[derive(Clone, Copy)]
pub struct TypeRef(fn() -> &'static TypeDescriptor);

impl TypeRef {
    pub const fn new(get: fn() -> &'static TypeDescriptor) -> Self {
        Self(get)
    }

    pub fn get(&self) -> &'static TypeDescriptor {
        (self.0)()
    }

    /// Identity of the referenced type, `(module, name)`.
    pub fn id(&self) -> (&'static str, &'static str) {
        let ty = self.get();
        (ty.module, ty.name)
    }

    pub fn key(&self) -> TypeKey {
        self.get().key()
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TypeRef {}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (module, name) = self.id();
        write!(f, "TypeRef({}::{})", module, name)
    }
}

/// Owned identity of a type: the module it comes from and its name.
///
/// Synthesized join tables get a key too, with their schema as the module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey {
    pub module: String,
    pub name: String,
}

impl TypeKey {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// Schema the type's table lives in.
    pub fn schema_name(&self) -> &str {
        schema_of_module(&self.module)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

/// The schema a module maps to: the first segment of its path.
pub fn schema_of_module(module: &str) -> &str {
    module.split("::").next().unwrap_or(module)
}

/// The shape of a declared property.
#[derive(Debug, Clone, Copy)]
pub enum PropertyType {
    /// A value stored in one column.
    Scalar(PgType),
    /// Another declared type: an entity (relation) or an inlined object.
    Object(TypeRef),
    /// A read-only collection of items.
    Collection(&'static PropertyType),
    /// A type with no column mapping, named for diagnostics.
    Opaque(&'static str),
}

impl PropertyType {
    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> String {
        match self {
            PropertyType::Scalar(pg) => pg.to_string(),
            PropertyType::Object(ty) => ty.get().name.to_string(),
            PropertyType::Collection(item) => format!("[{}]", item.type_name()),
            PropertyType::Opaque(name) => name.to_string(),
        }
    }
}

/// A declared property.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub ty: PropertyType,
    pub nullable: bool,
}

impl PropertyDescriptor {
    pub const fn new(name: &'static str, ty: PropertyType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
        }
    }

    /// A scalar property typed after a Rust value type.
    ///
    /// `Option<T>` declares a nullable property.
    pub const fn scalar<T: SqlScalar>(name: &'static str) -> Self {
        Self {
            name,
            ty: PropertyType::Scalar(T::PG_TYPE),
            nullable: T::NULLABLE,
        }
    }

    /// A property holding another declared type.
    pub const fn object(name: &'static str, ty: TypeRef) -> Self {
        Self::new(name, PropertyType::Object(ty))
    }

    /// A read-only collection property.
    pub const fn collection(name: &'static str, item: &'static PropertyType) -> Self {
        Self::new(name, PropertyType::Collection(item))
    }

    pub const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }
}

/// An index declared on a type, by flattened column names.
#[derive(Debug, Clone, Copy)]
pub struct IndexAttr {
    pub columns: &'static [&'static str],
    pub unique: bool,
    /// Partial index predicate.
    pub predicate: Option<&'static str>,
    /// Covering columns (`INCLUDE (...)`).
    pub include: &'static [&'static str],
}

impl IndexAttr {
    pub const fn new(columns: &'static [&'static str]) -> Self {
        Self {
            columns,
            unique: false,
            predicate: None,
            include: &[],
        }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    pub const fn with_predicate(self, predicate: &'static str) -> Self {
        Self {
            predicate: Some(predicate),
            ..self
        }
    }

    pub const fn with_include(self, include: &'static [&'static str]) -> Self {
        Self { include, ..self }
    }
}

/// Static description of a domain type.
#[derive(Debug)]
pub struct TypeDescriptor {
    /// Module path the type is declared in; its first segment names the schema.
    pub module: &'static str,
    pub name: &'static str,
    pub kind: TypeKind,
    pub base: Option<TypeRef>,
    pub properties: &'static [PropertyDescriptor],
    pub indexes: &'static [IndexAttr],
}

impl TypeDescriptor {
    pub const fn new(module: &'static str, name: &'static str, kind: TypeKind) -> Self {
        Self {
            module,
            name,
            kind,
            base: None,
            properties: &[],
            indexes: &[],
        }
    }

    pub const fn with_base(self, base: TypeRef) -> Self {
        Self {
            base: Some(base),
            ..self
        }
    }

    pub const fn with_properties(self, properties: &'static [PropertyDescriptor]) -> Self {
        Self { properties, ..self }
    }

    pub const fn with_indexes(self, indexes: &'static [IndexAttr]) -> Self {
        Self { indexes, ..self }
    }

    pub fn key(&self) -> TypeKey {
        TypeKey::new(self.module, self.name)
    }

    pub fn schema_name(&self) -> &'static str {
        schema_of_module(self.module)
    }

    pub fn table_name(&self) -> &'static str {
        self.name
    }

    /// Tables and views are identified; everything else is not.
    pub fn is_entity(&self) -> bool {
        matches!(self.kind, TypeKind::Table | TypeKind::View)
    }

    /// All properties, base types first, with overrides applied.
    ///
    /// A property redeclared by a derived type keeps its position and its
    /// declaring type; the redeclaration becomes the reflected property.
    pub fn properties(&'static self) -> Result<Vec<ColumnProperty>, ModelError> {
        let mut lineage: Vec<&'static TypeDescriptor> = vec![self];
        let mut current = self.base;
        while let Some(base) = current {
            let base = base.get();
            if lineage
                .iter()
                .any(|seen| (seen.module, seen.name) == (base.module, base.name))
            {
                return Err(ModelError::CyclicBaseType {
                    type_name: self.key().to_string(),
                });
            }
            lineage.push(base);
            current = base.base;
        }

        let reflected_type = self.key();
        let mut properties: Vec<ColumnProperty> = Vec::new();
        for ty in lineage.iter().rev() {
            for prop in ty.properties {
                match properties.iter_mut().find(|p| p.name() == prop.name) {
                    Some(existing) => existing.override_with(*prop),
                    None => properties.push(ColumnProperty::new(
                        ty.key(),
                        reflected_type.clone(),
                        *prop,
                        *prop,
                    )),
                }
            }
        }

        Ok(properties)
    }

    /// The identity property, if declared (case-insensitive match).
    pub fn primary_key(&'static self) -> Result<Option<ColumnProperty>, ModelError> {
        Ok(self
            .properties()?
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(PRIMARY_KEY)))
    }

    /// The identity property, failing if the type has none.
    pub fn require_primary_key(&'static self) -> Result<ColumnProperty, ModelError> {
        self.primary_key()?
            .ok_or_else(|| ModelError::MissingPrimaryKey {
                type_name: self.key().to_string(),
            })
    }
}
