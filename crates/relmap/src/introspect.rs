//! Reading the actual schema from a live Postgres database.
//!
//! [`PgCatalogReader`] queries the system catalogs and hands the rows to
//! [`assemble_snapshot`], which turns them into snapshot nodes. Only what the
//! code model can express is read: base tables, their columns, single-column
//! primary and foreign keys, secondary indexes and views.

use crate::snapshot::{
    ColumnNode, DatabaseNode, DatabaseSnapshot, IndexNode, TableNode, ViewNode, fold,
};
use crate::{Error, Result};
use relmap_schema::{ColumnConstraint, PgType};
use std::collections::BTreeMap;
use std::future::Future;
use tokio_postgres::Client;
use tracing::Instrument;

/// Supplies the actual side of a diff.
pub trait CatalogReader {
    fn read(&self) -> impl Future<Output = Result<DatabaseSnapshot>> + Send;
}

/// Excludes system schemas.
const USER_SCHEMAS: &str =
    "n.nspname NOT IN ('pg_catalog', 'information_schema') AND n.nspname NOT LIKE 'pg\\_%'";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub schema: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub schema: String,
    pub table: String,
    pub column: String,
    /// As printed by `format_type`, e.g. `timestamp with time zone`.
    pub type_name: String,
    pub not_null: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyKind {
    Primary,
    Foreign {
        schema: String,
        table: String,
        column: String,
    },
}

/// A single-column primary or foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRow {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub kind: KeyKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRow {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
    pub include: Vec<String>,
    pub predicate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRow {
    pub schema: String,
    pub name: String,
    pub query: String,
}

/// Everything read from the catalogs, before assembly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRows {
    pub schemas: Vec<String>,
    pub tables: Vec<TableRow>,
    pub columns: Vec<ColumnRow>,
    pub keys: Vec<KeyRow>,
    pub indexes: Vec<IndexRow>,
    pub views: Vec<ViewRow>,
}

/// Build a database node from catalog rows.
///
/// Rows for tables that were not listed are ignored. A column whose type has
/// no [`PgType`] is an error: the comparator could not reason about it.
pub fn assemble_snapshot(database: &str, rows: CatalogRows) -> Result<DatabaseNode> {
    let mut constraints: BTreeMap<(String, String, String), Vec<ColumnConstraint>> =
        BTreeMap::new();
    for key in rows.keys {
        let constraint = match key.kind {
            KeyKind::Primary => ColumnConstraint::PrimaryKey,
            KeyKind::Foreign {
                schema,
                table,
                column,
            } => ColumnConstraint::References {
                schema,
                table,
                column,
            },
        };
        constraints
            .entry((fold(&key.schema), fold(&key.table), fold(&key.column)))
            .or_default()
            .push(constraint);
    }

    let mut tables: BTreeMap<(String, String), TableNode> = rows
        .tables
        .into_iter()
        .map(|t| ((fold(&t.schema), fold(&t.table)), TableNode::new(t.schema, t.table)))
        .collect();

    for row in rows.columns {
        let table_key = (fold(&row.schema), fold(&row.table));
        let Some(table) = tables.remove(&table_key) else {
            tracing::trace!(schema = %row.schema, table = %row.table, "column of unlisted table");
            continue;
        };
        let Some(data_type) = PgType::from_catalog_name(&row.type_name) else {
            return Err(Error::UnsupportedCatalogType {
                schema: row.schema,
                table: row.table,
                column: row.column,
                type_name: row.type_name,
            });
        };
        let mut column_constraints = constraints
            .remove(&(table_key.0.clone(), table_key.1.clone(), fold(&row.column)))
            .unwrap_or_default();
        if row.not_null {
            column_constraints.push(ColumnConstraint::NotNull);
        }
        let column = ColumnNode::new(row.column, data_type, column_constraints);
        tables.insert(table_key, table.with_column(column));
    }

    for row in rows.indexes {
        let table_key = (fold(&row.schema), fold(&row.table));
        let Some(table) = tables.remove(&table_key) else {
            continue;
        };
        let mut index = IndexNode::new(row.name, row.columns, row.unique).with_include(row.include);
        if let Some(predicate) = row.predicate {
            index = index.with_predicate(predicate);
        }
        tables.insert(table_key, table.with_index(index));
    }

    let mut db = DatabaseNode::new(database);
    for schema in &rows.schemas {
        db.schema_mut(schema);
    }
    for table in tables.into_values() {
        let schema = table.schema.clone();
        db.schema_mut(&schema).add_table(table);
    }
    for view in rows.views {
        db.schema_mut(&view.schema)
            .add_view(ViewNode::new(view.name, view.query));
    }

    tracing::debug!(
        schemas = db.schemas.len(),
        tables = db.table_count(),
        "assembled snapshot"
    );
    Ok(db)
}

/// Reads the catalogs over a `tokio_postgres` connection.
///
/// The client must be connected to `database` when it exists; its absence is
/// reported as [`DatabaseSnapshot::Absent`].
pub struct PgCatalogReader<'a> {
    client: &'a Client,
    database: String,
}

impl<'a> PgCatalogReader<'a> {
    pub fn new(client: &'a Client, database: impl Into<String>) -> Self {
        Self {
            client,
            database: database.into(),
        }
    }

    async fn database_exists(&self) -> Result<bool> {
        let rows = self
            .client
            .query(
                "SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1",
                &[&self.database],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn read_rows(&self) -> Result<CatalogRows> {
        let connected: String = self
            .client
            .query_one("SELECT current_database()::text", &[])
            .await?
            .try_get(0)?;
        if connected != self.database {
            return Err(Error::WrongDatabase {
                expected: self.database.clone(),
                connected,
            });
        }

        let mut rows = CatalogRows::default();

        let sql = format!(
            "SELECT n.nspname::text AS schema FROM pg_catalog.pg_namespace n WHERE {}",
            USER_SCHEMAS
        );
        for row in self.query(&sql).await? {
            rows.schemas.push(row.try_get("schema")?);
        }

        let sql = format!(
            "SELECT n.nspname::text AS schema, c.relname::text AS table
             FROM pg_catalog.pg_class c
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             WHERE c.relkind = 'r' AND {}",
            USER_SCHEMAS
        );
        for row in self.query(&sql).await? {
            rows.tables.push(TableRow {
                schema: row.try_get("schema")?,
                table: row.try_get("table")?,
            });
        }

        let sql = format!(
            "SELECT n.nspname::text AS schema, c.relname::text AS table, a.attname::text AS column,
                    pg_catalog.format_type(a.atttypid, NULL) AS type_name, a.attnotnull AS not_null
             FROM pg_catalog.pg_attribute a
             JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             WHERE c.relkind = 'r' AND a.attnum > 0 AND NOT a.attisdropped AND {}
             ORDER BY n.nspname, c.relname, a.attnum",
            USER_SCHEMAS
        );
        for row in self.query(&sql).await? {
            rows.columns.push(ColumnRow {
                schema: row.try_get("schema")?,
                table: row.try_get("table")?,
                column: row.try_get("column")?,
                type_name: row.try_get("type_name")?,
                not_null: row.try_get("not_null")?,
            });
        }

        let sql = format!(
            "SELECT n.nspname::text AS schema, c.relname::text AS table, a.attname::text AS column,
                    con.contype::text AS kind, fn.nspname::text AS ref_schema,
                    fc.relname::text AS ref_table, fa.attname::text AS ref_column
             FROM pg_catalog.pg_constraint con
             JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = con.conkey[1]
             LEFT JOIN pg_catalog.pg_class fc ON fc.oid = con.confrelid
             LEFT JOIN pg_catalog.pg_namespace fn ON fn.oid = fc.relnamespace
             LEFT JOIN pg_catalog.pg_attribute fa
                ON fa.attrelid = con.confrelid AND fa.attnum = con.confkey[1]
             WHERE con.contype IN ('p', 'f') AND array_length(con.conkey, 1) = 1 AND {}",
            USER_SCHEMAS
        );
        for row in self.query(&sql).await? {
            let kind: String = row.try_get("kind")?;
            let kind = if kind == "p" {
                KeyKind::Primary
            } else {
                let ref_schema: Option<String> = row.try_get("ref_schema")?;
                let ref_table: Option<String> = row.try_get("ref_table")?;
                let ref_column: Option<String> = row.try_get("ref_column")?;
                let (Some(schema), Some(table), Some(column)) = (ref_schema, ref_table, ref_column)
                else {
                    continue;
                };
                KeyKind::Foreign {
                    schema,
                    table,
                    column,
                }
            };
            rows.keys.push(KeyRow {
                schema: row.try_get("schema")?,
                table: row.try_get("table")?,
                column: row.try_get("column")?,
                kind,
            });
        }

        let sql = format!(
            "SELECT n.nspname::text AS schema, c.relname::text AS table, i.relname::text AS name,
                    x.indisunique AS unique,
                    ARRAY(SELECT a.attname::text
                          FROM generate_series(0, x.indnkeyatts - 1) AS k
                          JOIN pg_catalog.pg_attribute a
                            ON a.attrelid = x.indrelid AND a.attnum = x.indkey[k]
                          ORDER BY k) AS columns,
                    ARRAY(SELECT a.attname::text
                          FROM generate_series(x.indnkeyatts, x.indnatts - 1) AS k
                          JOIN pg_catalog.pg_attribute a
                            ON a.attrelid = x.indrelid AND a.attnum = x.indkey[k]
                          ORDER BY k) AS include,
                    pg_catalog.pg_get_expr(x.indpred, x.indrelid) AS predicate
             FROM pg_catalog.pg_index x
             JOIN pg_catalog.pg_class c ON c.oid = x.indrelid
             JOIN pg_catalog.pg_class i ON i.oid = x.indexrelid
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             WHERE NOT x.indisprimary AND c.relkind = 'r' AND {}",
            USER_SCHEMAS
        );
        for row in self.query(&sql).await? {
            rows.indexes.push(IndexRow {
                schema: row.try_get("schema")?,
                table: row.try_get("table")?,
                name: row.try_get("name")?,
                unique: row.try_get("unique")?,
                columns: row.try_get("columns")?,
                include: row.try_get("include")?,
                predicate: row.try_get("predicate")?,
            });
        }

        let sql = format!(
            "SELECT n.nspname::text AS schema, c.relname::text AS name,
                    pg_catalog.pg_get_viewdef(c.oid, true) AS query
             FROM pg_catalog.pg_class c
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
             WHERE c.relkind = 'v' AND {}",
            USER_SCHEMAS
        );
        for row in self.query(&sql).await? {
            rows.views.push(ViewRow {
                schema: row.try_get("schema")?,
                name: row.try_get("name")?,
                query: row.try_get("query")?,
            });
        }

        Ok(rows)
    }

    async fn query(&self, sql: &str) -> Result<Vec<tokio_postgres::Row>> {
        tracing::debug!(sql = %sql.split_whitespace().collect::<Vec<_>>().join(" "), "catalog query");
        Ok(self.client.query(sql, &[]).await?)
    }
}

impl CatalogReader for PgCatalogReader<'_> {
    async fn read(&self) -> Result<DatabaseSnapshot> {
        let span = tracing::debug_span!("read_catalog", database = %self.database);
        async {
            if !self.database_exists().await? {
                tracing::debug!("database does not exist");
                return Ok(DatabaseSnapshot::Absent);
            }
            let rows = self.read_rows().await?;
            Ok(DatabaseSnapshot::Present(assemble_snapshot(
                &self.database,
                rows,
            )?))
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(table: &str, column: &str, type_name: &str, not_null: bool) -> ColumnRow {
        ColumnRow {
            schema: "blogging".into(),
            table: table.into(),
            column: column.into(),
            type_name: type_name.into(),
            not_null,
        }
    }

    fn table(table: &str) -> TableRow {
        TableRow {
            schema: "blogging".into(),
            table: table.into(),
        }
    }

    fn blog_rows() -> CatalogRows {
        CatalogRows {
            schemas: vec!["blogging".into(), "public".into()],
            tables: vec![table("Blog"), table("Post")],
            columns: vec![
                column("Blog", "PrimaryKey", "uuid", true),
                column("Blog", "Title", "text", true),
                column("Post", "PrimaryKey", "uuid", true),
                column("Post", "Blog_PrimaryKey", "uuid", true),
                column("Post", "Published", "timestamp with time zone", false),
            ],
            keys: vec![
                KeyRow {
                    schema: "blogging".into(),
                    table: "Blog".into(),
                    column: "PrimaryKey".into(),
                    kind: KeyKind::Primary,
                },
                KeyRow {
                    schema: "blogging".into(),
                    table: "Post".into(),
                    column: "PrimaryKey".into(),
                    kind: KeyKind::Primary,
                },
                KeyRow {
                    schema: "blogging".into(),
                    table: "Post".into(),
                    column: "Blog_PrimaryKey".into(),
                    kind: KeyKind::Foreign {
                        schema: "blogging".into(),
                        table: "Blog".into(),
                        column: "PrimaryKey".into(),
                    },
                },
            ],
            indexes: vec![IndexRow {
                schema: "blogging".into(),
                table: "Blog".into(),
                name: "Blog__Title".into(),
                unique: true,
                columns: vec!["Title".into()],
                include: vec![],
                predicate: None,
            }],
            views: vec![ViewRow {
                schema: "blogging".into(),
                name: "BlogSummary".into(),
                query: " SELECT 1;".into(),
            }],
        }
    }

    #[test]
    fn test_assemble_columns_and_keys() {
        let db = assemble_snapshot("app", blog_rows()).unwrap();

        let post = db.table("blogging", "Post").unwrap();
        let fk = &post.columns["blog_primarykey"];
        assert_eq!(fk.data_type, PgType::Uuid);
        assert_eq!(
            fk.constraint_clause(),
            r#"not null references "blogging"."Blog" ("PrimaryKey")"#
        );
        assert_eq!(
            post.columns["primarykey"].constraint_clause(),
            "not null primary key"
        );
        assert!(post.columns["published"].is_nullable());
        assert_eq!(post.columns["published"].data_type, PgType::Timestamptz);

        let blog = db.table("blogging", "Blog").unwrap();
        assert!(blog.indexes["blog__title"].unique);
    }

    #[test]
    fn test_assemble_keeps_empty_schemas_and_views() {
        let db = assemble_snapshot("app", blog_rows()).unwrap();
        assert!(db.schema("public").is_some_and(|s| s.is_empty()));
        assert!(db.schema("blogging").unwrap().views.contains_key("blogsummary"));
    }

    #[test]
    fn test_assemble_rejects_unknown_type() {
        let mut rows = blog_rows();
        rows.columns.push(column("Blog", "Tags", "text[]", false));
        let err = assemble_snapshot("app", rows).unwrap_err();
        assert_eq!(
            err.to_string(),
            "column blogging.Blog.Tags has unsupported type 'text[]'"
        );
    }

    #[test]
    fn test_code_snapshot_matches_assembled_catalog() {
        // What the database would report for a freshly created Blog table.
        let rows = CatalogRows {
            schemas: vec!["blogging".into()],
            tables: vec![table("Blog")],
            columns: vec![column("Blog", "PrimaryKey", "uuid", true)],
            keys: vec![KeyRow {
                schema: "blogging".into(),
                table: "Blog".into(),
                column: "PrimaryKey".into(),
                kind: KeyKind::Primary,
            }],
            ..Default::default()
        };
        let actual = assemble_snapshot("app", rows).unwrap();

        let mut expected = DatabaseNode::new("app");
        expected.schema_mut("blogging").add_table(
            TableNode::new("blogging", "Blog").with_column(ColumnNode::new(
                "PrimaryKey",
                PgType::Uuid,
                [ColumnConstraint::PrimaryKey, ColumnConstraint::NotNull],
            )),
        );
        assert!(
            crate::extract_diff(&DatabaseSnapshot::Present(actual), &expected).is_empty()
        );
    }
}
