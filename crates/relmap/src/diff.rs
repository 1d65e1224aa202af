//! Schema diffing: compare the live database against the code model.
//!
//! [`ModelComparator::extract_diff`] walks both snapshots and produces an
//! unordered set of atomic [`Change`]s. Ordering them into something that can
//! be executed is the job of the [`solver`](crate::solver).
//!
//! ## Comparison rules
//!
//! - Schemas, tables, views and columns match by case-insensitive name.
//! - Columns are equal only when type and the full constraint set match. A
//!   change to either is a drop followed by a create, never an alter.
//! - Indexes match by definition (columns, uniqueness, predicate, included
//!   columns), not by name: the server may have truncated the name.
//! - Views match by normalized query text; a different query is a drop
//!   followed by a create.
//!
//! ```text
//! blogging:
//!   + table Post
//!   + column Post.Blog_PrimaryKey UUID not null references "blogging"."Blog" ("PrimaryKey")
//!   - index Blog.Blog__Title
//! ```

use crate::snapshot::{
    ColumnNode, DatabaseNode, DatabaseSnapshot, IndexNode, SchemaNode, TableNode, ViewNode, fold,
};
use crate::solver::{SortError, VirtualDatabase, sort_changes};
use relmap_config::Config;
use relmap_sql::{Ident, normalize_sql, qualified_name, quote_ident};
use std::collections::BTreeSet;

/// A single schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    CreateDatabase {
        database: String,
    },
    CreateSchema {
        schema: String,
    },
    DropSchema {
        schema: String,
    },
    CreateTable {
        schema: String,
        table: String,
    },
    /// Carries the dropped table so the solver knows what it referenced.
    DropTable {
        schema: String,
        table: TableNode,
    },
    CreateColumn {
        schema: String,
        table: String,
        column: ColumnNode,
    },
    DropColumn {
        schema: String,
        table: String,
        column: ColumnNode,
    },
    CreateIndex {
        schema: String,
        table: String,
        index: IndexNode,
    },
    DropIndex {
        schema: String,
        table: String,
        index: IndexNode,
    },
    CreateView {
        schema: String,
        view: ViewNode,
    },
    DropView {
        schema: String,
        view: ViewNode,
    },
}

/// Change kinds, in the order the solver prefers among independent changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    CreateDatabase,
    DropView,
    DropIndex,
    DropColumn,
    DropTable,
    DropSchema,
    CreateSchema,
    CreateTable,
    CreateColumn,
    CreateIndex,
    CreateView,
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::CreateDatabase { .. } => ChangeKind::CreateDatabase,
            Change::CreateSchema { .. } => ChangeKind::CreateSchema,
            Change::DropSchema { .. } => ChangeKind::DropSchema,
            Change::CreateTable { .. } => ChangeKind::CreateTable,
            Change::DropTable { .. } => ChangeKind::DropTable,
            Change::CreateColumn { .. } => ChangeKind::CreateColumn,
            Change::DropColumn { .. } => ChangeKind::DropColumn,
            Change::CreateIndex { .. } => ChangeKind::CreateIndex,
            Change::DropIndex { .. } => ChangeKind::DropIndex,
            Change::CreateView { .. } => ChangeKind::CreateView,
            Change::DropView { .. } => ChangeKind::DropView,
        }
    }

    /// Schema the change applies to. Empty for [`Change::CreateDatabase`].
    pub fn schema(&self) -> &str {
        match self {
            Change::CreateDatabase { .. } => "",
            Change::CreateSchema { schema }
            | Change::DropSchema { schema }
            | Change::CreateTable { schema, .. }
            | Change::DropTable { schema, .. }
            | Change::CreateColumn { schema, .. }
            | Change::DropColumn { schema, .. }
            | Change::CreateIndex { schema, .. }
            | Change::DropIndex { schema, .. }
            | Change::CreateView { schema, .. }
            | Change::DropView { schema, .. } => schema,
        }
    }

    /// Table (or view) the change applies to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            Change::CreateTable { table, .. }
            | Change::CreateColumn { table, .. }
            | Change::DropColumn { table, .. }
            | Change::CreateIndex { table, .. }
            | Change::DropIndex { table, .. } => Some(table),
            Change::DropTable { table, .. } => Some(&table.name),
            Change::CreateView { view, .. } | Change::DropView { view, .. } => Some(&view.name),
            Change::CreateDatabase { .. } | Change::CreateSchema { .. } | Change::DropSchema { .. } => {
                None
            }
        }
    }

    /// Column or index the change applies to, if any.
    pub fn item(&self) -> Option<&str> {
        match self {
            Change::CreateColumn { column, .. } | Change::DropColumn { column, .. } => {
                Some(&column.name)
            }
            Change::CreateIndex { index, .. } | Change::DropIndex { index, .. } => {
                Some(&index.name)
            }
            _ => None,
        }
    }

    /// Postgres DDL for this change.
    pub fn to_sql(&self) -> String {
        match self {
            Change::CreateDatabase { database } => {
                format!("CREATE DATABASE {};", quote_ident(database))
            }
            Change::CreateSchema { schema } => format!("CREATE SCHEMA {};", quote_ident(schema)),
            Change::DropSchema { schema } => format!("DROP SCHEMA {};", quote_ident(schema)),
            Change::CreateTable { schema, table } => {
                format!("CREATE TABLE {} ();", qualified_name(schema, table))
            }
            Change::DropTable { schema, table } => {
                format!("DROP TABLE {};", qualified_name(schema, &table.name))
            }
            Change::CreateColumn {
                schema,
                table,
                column,
            } => {
                let clause = column.constraint_clause();
                let clause = if clause.is_empty() {
                    String::new()
                } else {
                    format!(" {}", clause)
                };
                format!(
                    "ALTER TABLE {} ADD COLUMN {} {}{};",
                    qualified_name(schema, table),
                    quote_ident(&column.name),
                    column.data_type,
                    clause
                )
            }
            Change::DropColumn {
                schema,
                table,
                column,
            } => format!(
                "ALTER TABLE {} DROP COLUMN {};",
                qualified_name(schema, table),
                quote_ident(&column.name)
            ),
            Change::CreateIndex {
                schema,
                table,
                index,
            } => {
                let unique = if index.unique { "UNIQUE " } else { "" };
                let mut sql = format!(
                    "CREATE {}INDEX {} ON {} ({})",
                    unique,
                    quote_ident(&index.name),
                    qualified_name(schema, table),
                    ident_list(&index.columns)
                );
                if !index.include.is_empty() {
                    sql.push_str(&format!(" INCLUDE ({})", ident_list(&index.include)));
                }
                if let Some(predicate) = &index.predicate {
                    sql.push_str(&format!(" WHERE {}", predicate));
                }
                sql.push(';');
                sql
            }
            Change::DropIndex { schema, index, .. } => {
                format!("DROP INDEX {};", qualified_name(schema, &index.name))
            }
            Change::CreateView { schema, view } => format!(
                "CREATE VIEW {} AS {};",
                qualified_name(schema, &view.name),
                view.query.trim().trim_end_matches(';')
            ),
            Change::DropView { schema, view } => {
                format!("DROP VIEW {};", qualified_name(schema, &view.name))
            }
        }
    }
}

fn ident_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| Ident(n).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::CreateDatabase { database } => write!(f, "+ database {}", database),
            Change::CreateSchema { schema } => write!(f, "+ schema {}", schema),
            Change::DropSchema { schema } => write!(f, "- schema {}", schema),
            Change::CreateTable { schema, table } => write!(f, "+ table {}.{}", schema, table),
            Change::DropTable { schema, table } => write!(f, "- table {}.{}", schema, table.name),
            Change::CreateColumn {
                schema,
                table,
                column,
            } => {
                let clause = column.constraint_clause();
                let sep = if clause.is_empty() { "" } else { " " };
                write!(
                    f,
                    "+ column {}.{}.{} {}{}{}",
                    schema, table, column.name, column.data_type, sep, clause
                )
            }
            Change::DropColumn {
                schema,
                table,
                column,
            } => write!(f, "- column {}.{}.{}", schema, table, column.name),
            Change::CreateIndex {
                schema,
                table,
                index,
            } => {
                let unique = if index.unique { "unique " } else { "" };
                write!(
                    f,
                    "+ {}index {}.{}.{} ({})",
                    unique,
                    schema,
                    table,
                    index.name,
                    index.columns.join(", ")
                )
            }
            Change::DropIndex {
                schema,
                table,
                index,
            } => write!(f, "- index {}.{}.{}", schema, table, index.name),
            Change::CreateView { schema, view } => write!(f, "+ view {}.{}", schema, view.name),
            Change::DropView { schema, view } => write!(f, "- view {}.{}", schema, view.name),
        }
    }
}

/// Render an ordered plan as one SQL script.
pub fn plan_to_sql(changes: &[Change]) -> String {
    let mut sql = String::new();
    for change in changes {
        sql.push_str(&change.to_sql());
        sql.push('\n');
    }
    sql
}

/// Compares an actual snapshot against the expected one.
#[derive(Debug, Clone)]
pub struct ModelComparator {
    ignored_schemas: BTreeSet<String>,
}

impl Default for ModelComparator {
    fn default() -> Self {
        Self::new(["public"])
    }
}

impl ModelComparator {
    /// A comparator that never drops the given schemas.
    pub fn new<S: AsRef<str>>(ignored_schemas: impl IntoIterator<Item = S>) -> Self {
        Self {
            ignored_schemas: ignored_schemas
                .into_iter()
                .map(|s| fold(s.as_ref()))
                .collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        if config.ignored_schemas.is_empty() {
            Self::default()
        } else {
            Self::new(&config.ignored_schemas)
        }
    }

    fn is_ignored(&self, schema: &str) -> bool {
        self.ignored_schemas.contains(&fold(schema))
    }

    /// Unordered changes that turn `actual` into `expected`.
    ///
    /// An absent database yields `CreateDatabase` followed by everything
    /// needed to create `expected` from scratch.
    pub fn extract_diff(&self, actual: &DatabaseSnapshot, expected: &DatabaseNode) -> Vec<Change> {
        let _span = tracing::debug_span!("extract_diff", database = %expected.name).entered();

        let mut changes = Vec::new();
        let empty;
        let actual = match actual {
            DatabaseSnapshot::Present(db) => db,
            DatabaseSnapshot::Absent => {
                tracing::debug!("database does not exist");
                changes.push(Change::CreateDatabase {
                    database: expected.name.clone(),
                });
                empty = DatabaseNode::new(&expected.name);
                &empty
            }
        };

        for (key, schema) in &expected.schemas {
            match actual.schemas.get(key) {
                None => create_schema(schema, &mut changes),
                Some(existing) => diff_schema(existing, schema, &mut changes),
            }
        }

        for (key, schema) in &actual.schemas {
            if expected.schemas.contains_key(key) {
                continue;
            }
            if self.is_ignored(&schema.name) {
                tracing::trace!(schema = %schema.name, "ignored schema");
                continue;
            }
            drop_schema(schema, &mut changes);
        }

        tracing::debug!(changes = changes.len(), "extracted diff");
        changes
    }

    /// Extract, order and validate the changes for `actual` → `expected`.
    pub fn plan(
        &self,
        actual: &DatabaseSnapshot,
        expected: &DatabaseNode,
    ) -> Result<Vec<Change>, SortError> {
        let changes = sort_changes(self.extract_diff(actual, expected))?;
        VirtualDatabase::from_snapshot(actual).validate(&changes)?;
        Ok(changes)
    }
}

/// [`ModelComparator::extract_diff`] with the default ignored schemas.
pub fn extract_diff(actual: &DatabaseSnapshot, expected: &DatabaseNode) -> Vec<Change> {
    ModelComparator::default().extract_diff(actual, expected)
}

fn create_schema(schema: &SchemaNode, changes: &mut Vec<Change>) {
    changes.push(Change::CreateSchema {
        schema: schema.name.clone(),
    });
    for table in schema.tables.values() {
        create_table(&schema.name, table, changes);
    }
    for view in schema.views.values() {
        changes.push(Change::CreateView {
            schema: schema.name.clone(),
            view: view.clone(),
        });
    }
}

fn create_table(schema: &str, table: &TableNode, changes: &mut Vec<Change>) {
    changes.push(Change::CreateTable {
        schema: schema.to_string(),
        table: table.name.clone(),
    });
    for column in table.columns.values() {
        changes.push(Change::CreateColumn {
            schema: schema.to_string(),
            table: table.name.clone(),
            column: column.clone(),
        });
    }
    for index in table.indexes.values() {
        changes.push(Change::CreateIndex {
            schema: schema.to_string(),
            table: table.name.clone(),
            index: index.clone(),
        });
    }
}

/// Dropping a schema drops its contents first, one change each, so the
/// solver can order them against other tables' references.
fn drop_schema(schema: &SchemaNode, changes: &mut Vec<Change>) {
    for view in schema.views.values() {
        changes.push(Change::DropView {
            schema: schema.name.clone(),
            view: view.clone(),
        });
    }
    for table in schema.tables.values() {
        changes.push(Change::DropTable {
            schema: schema.name.clone(),
            table: table.clone(),
        });
    }
    changes.push(Change::DropSchema {
        schema: schema.name.clone(),
    });
}

fn diff_schema(actual: &SchemaNode, expected: &SchemaNode, changes: &mut Vec<Change>) {
    // Changes use the expected spelling where both sides exist.
    let schema = &expected.name;

    for (key, table) in &expected.tables {
        match actual.tables.get(key) {
            None => create_table(schema, table, changes),
            Some(existing) => diff_table(schema, existing, table, changes),
        }
    }
    for (key, table) in &actual.tables {
        if !expected.tables.contains_key(key) {
            changes.push(Change::DropTable {
                schema: actual.name.clone(),
                table: table.clone(),
            });
        }
    }

    for (key, view) in &expected.views {
        match actual.views.get(key) {
            None => changes.push(Change::CreateView {
                schema: schema.clone(),
                view: view.clone(),
            }),
            Some(existing) if normalize_sql(&existing.query) != normalize_sql(&view.query) => {
                tracing::debug!(view = %view.name, "view query changed");
                changes.push(Change::DropView {
                    schema: actual.name.clone(),
                    view: existing.clone(),
                });
                changes.push(Change::CreateView {
                    schema: schema.clone(),
                    view: view.clone(),
                });
            }
            Some(_) => {}
        }
    }
    for (key, view) in &actual.views {
        if !expected.views.contains_key(key) {
            changes.push(Change::DropView {
                schema: actual.name.clone(),
                view: view.clone(),
            });
        }
    }
}

fn diff_table(schema: &str, actual: &TableNode, expected: &TableNode, changes: &mut Vec<Change>) {
    let table = &expected.name;
    // Columns that will be dropped; indexes covering them go with them.
    let mut replaced = BTreeSet::new();

    for (key, column) in &expected.columns {
        match actual.columns.get(key) {
            Some(existing) if existing.signature() == column.signature() => {}
            Some(existing) => {
                replaced.insert(key.clone());
                tracing::debug!(
                    table = %table,
                    column = %column.name,
                    from = %existing.constraint_clause(),
                    to = %column.constraint_clause(),
                    "column definition changed"
                );
                changes.push(Change::DropColumn {
                    schema: schema.to_string(),
                    table: table.clone(),
                    column: existing.clone(),
                });
                changes.push(Change::CreateColumn {
                    schema: schema.to_string(),
                    table: table.clone(),
                    column: column.clone(),
                });
            }
            None => changes.push(Change::CreateColumn {
                schema: schema.to_string(),
                table: table.clone(),
                column: column.clone(),
            }),
        }
    }
    for (key, column) in &actual.columns {
        if !expected.columns.contains_key(key) {
            replaced.insert(key.clone());
            changes.push(Change::DropColumn {
                schema: schema.to_string(),
                table: table.clone(),
                column: column.clone(),
            });
        }
    }

    let actual_defs: Vec<_> = actual.indexes.values().map(IndexNode::definition).collect();
    let expected_defs: Vec<_> = expected
        .indexes
        .values()
        .map(IndexNode::definition)
        .collect();

    let covers_replaced = |index: &IndexNode| {
        index
            .columns
            .iter()
            .chain(&index.include)
            .any(|c| replaced.contains(&fold(c)))
    };

    for index in expected.indexes.values() {
        if !actual_defs.contains(&index.definition()) || covers_replaced(index) {
            changes.push(Change::CreateIndex {
                schema: schema.to_string(),
                table: table.clone(),
                index: index.clone(),
            });
        }
    }
    for index in actual.indexes.values() {
        if !expected_defs.contains(&index.definition()) || covers_replaced(index) {
            changes.push(Change::DropIndex {
                schema: schema.to_string(),
                table: table.clone(),
                index: index.clone(),
            });
        }
    }
}
