//! Schema migration planning for Postgres, driven by entity descriptors.
//!
//! This crate provides:
//! - A relational model derived from statically declared entity types
//!   (see [`relmap_schema`])
//! - Snapshots of the expected (code) and actual (database) schema
//! - A comparator producing atomic [`Change`]s between two snapshots
//! - A solver that orders those changes and validates the plan
//!
//! # Naming Convention
//!
//! Every module root maps to a Postgres schema and every entity type to a
//! table of the same name: `blogging::model::Post` lives in
//! `"blogging"."Post"`. Properties of inlined objects and relations flatten to
//! `_`-joined column names (`Value_Assembly`, `Blog_PrimaryKey`). Join tables
//! for many-to-many relations are named `<Left>_<Right>` and hold `Left` and
//! `Right` columns.
//!
//! # Planning a migration
//!
//! ```ignore
//! let (config, _) = relmap::config::load()?;
//! let provider = ModelProvider::registered();
//! let expected = provider.expected(&config, "blog")?;
//! let actual = PgCatalogReader::new(&client, &expected.name).read().await?;
//! let plan = ModelComparator::from_config(&config).plan(&actual, &expected)?;
//! println!("{}", plan_to_sql(&plan));
//! ```

pub mod config;
mod diff;
mod error;
mod introspect;
mod provider;
pub mod snapshot;
pub mod solver;

pub use diff::{Change, ChangeKind, ModelComparator, extract_diff, plan_to_sql};
pub use error::Error;
pub use introspect::{
    CatalogReader, CatalogRows, ColumnRow, IndexRow, KeyKind, KeyRow, PgCatalogReader, TableRow,
    ViewRow, assemble_snapshot,
};
pub use provider::{Model, ModelProvider};
pub use snapshot::{
    ColumnNode, DatabaseNode, DatabaseSnapshot, IndexNode, SchemaNode, TableNode, ViewNode,
};
pub use solver::{SortError, VirtualDatabase, sort_changes};

// Re-export the model layer so entity crates need a single dependency.
pub use relmap_schema::*;

/// Result type for relmap operations.
pub type Result<T> = std::result::Result<T, Error>;
