//! Relational schema derivation for relmap.
//!
//! Entity types are declared with static [`TypeDescriptor`]s. This crate
//! classifies and flattens their properties into columns, resolves declared
//! indexes, synthesizes join tables for many-to-many relations and groups the
//! result into [`SchemaInfo`]s.
//!
//! The derived metadata is plain immutable data with structural equality:
//! two models built from the same type graph compare (and hash) equal.

mod builder;
mod catalog;
mod column;
mod descriptor;
mod error;
pub mod flatten;
mod index;
mod table;
mod types;

pub use builder::{Schemas, build_model};
pub use catalog::{
    EntityRegistration, NoViewQueries, RegisteredCatalog, StaticCatalog, StaticViewQueries,
    TypeCatalog, ViewQuerySource,
};
pub use column::{ColumnConstraint, ColumnInfo, ColumnKind, ColumnProperty, Relation};
pub use descriptor::{
    IndexAttr, PRIMARY_KEY, PropertyDescriptor, PropertyType, TypeDescriptor, TypeKey, TypeKind,
    TypeRef, schema_of_module,
};
pub use error::ModelError;
pub use flatten::PropertyClass;
pub use index::IndexInfo;
pub use table::{
    LEFT_COLUMN, MtmTableInfo, ObjectModelInfo, RIGHT_COLUMN, SchemaInfo, TableInfo, ViewInfo,
    mtm_schema_name,
};
pub use types::{PgType, SqlScalar};

// Re-export so registrations can be submitted without a direct dependency.
pub use inventory;
