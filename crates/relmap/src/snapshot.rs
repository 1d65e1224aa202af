//! Schema snapshots.
//!
//! Both sides of a diff are expressed as a [`DatabaseNode`]: the code model
//! renders into one, and the catalog reader assembles one from the live
//! database. Map keys are case-folded; nodes keep their original spelling.

use relmap_schema::{ColumnConstraint, PgType};
use std::collections::BTreeMap;

/// Case-folded map key.
pub fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// A database as seen by the comparator. `Absent` means the database does
/// not exist at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseSnapshot {
    Absent,
    Present(DatabaseNode),
}

impl DatabaseSnapshot {
    pub fn as_present(&self) -> Option<&DatabaseNode> {
        match self {
            DatabaseSnapshot::Absent => None,
            DatabaseSnapshot::Present(db) => Some(db),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseNode {
    pub name: String,
    pub schemas: BTreeMap<String, SchemaNode>,
}

impl DatabaseNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schemas: BTreeMap::new(),
        }
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaNode> {
        self.schemas.get(&fold(name))
    }

    /// Get or create the schema node for `name`.
    pub fn schema_mut(&mut self, name: &str) -> &mut SchemaNode {
        self.schemas
            .entry(fold(name))
            .or_insert_with(|| SchemaNode::new(name))
    }

    pub fn table(&self, schema: &str, table: &str) -> Option<&TableNode> {
        self.schema(schema)?.tables.get(&fold(table))
    }

    /// Total number of tables across schemas.
    pub fn table_count(&self) -> usize {
        self.schemas.values().map(|s| s.tables.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaNode {
    pub name: String,
    pub tables: BTreeMap<String, TableNode>,
    pub views: BTreeMap<String, ViewNode>,
}

impl SchemaNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: BTreeMap::new(),
            views: BTreeMap::new(),
        }
    }

    pub fn add_table(&mut self, table: TableNode) {
        self.tables.insert(fold(&table.name), table);
    }

    pub fn add_view(&mut self, view: ViewNode) {
        self.views.insert(fold(&view.name), view);
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.views.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNode {
    pub schema: String,
    pub name: String,
    pub columns: BTreeMap<String, ColumnNode>,
    pub indexes: BTreeMap<String, IndexNode>,
}

impl TableNode {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            columns: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnNode) -> Self {
        self.columns.insert(fold(&column.name), column);
        self
    }

    pub fn with_index(mut self, index: IndexNode) -> Self {
        self.indexes.insert(fold(&index.name), index);
        self
    }

    /// Tables this table's columns reference, as `(schema, table)`.
    pub fn references(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.values().filter_map(ColumnNode::references)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNode {
    pub name: String,
    pub data_type: PgType,
    /// Sorted.
    pub constraints: Vec<ColumnConstraint>,
}

impl ColumnNode {
    pub fn new(
        name: impl Into<String>,
        data_type: PgType,
        constraints: impl IntoIterator<Item = ColumnConstraint>,
    ) -> Self {
        let mut constraints: Vec<_> = constraints.into_iter().collect();
        constraints.sort();
        constraints.dedup();
        Self {
            name: name.into(),
            data_type,
            constraints,
        }
    }

    pub fn is_nullable(&self) -> bool {
        !self.constraints.contains(&ColumnConstraint::NotNull)
    }

    /// Referenced `(schema, table)`, if this column is a foreign key.
    pub fn references(&self) -> Option<(&str, &str)> {
        self.constraints.iter().find_map(|c| match c {
            ColumnConstraint::References { schema, table, .. } => {
                Some((schema.as_str(), table.as_str()))
            }
            _ => None,
        })
    }

    /// Constraints rendered as one clause.
    pub fn constraint_clause(&self) -> String {
        self.constraints
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Comparison key: name, type and constraints, all case-folded.
    pub(crate) fn signature(&self) -> (String, PgType, Vec<String>) {
        (
            fold(&self.name),
            self.data_type,
            self.constraints
                .iter()
                .map(|c| c.to_string().to_lowercase())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNode {
    pub name: String,
    /// Sorted by name.
    pub columns: Vec<String>,
    pub unique: bool,
    pub predicate: Option<String>,
    /// Sorted by name.
    pub include: Vec<String>,
}

impl IndexNode {
    pub fn new(name: impl Into<String>, columns: Vec<String>, unique: bool) -> Self {
        let mut columns = columns;
        columns.sort();
        Self {
            name: name.into(),
            columns,
            unique,
            predicate: None,
            include: Vec::new(),
        }
    }

    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    pub fn with_include(mut self, mut include: Vec<String>) -> Self {
        include.sort();
        self.include = include;
        self
    }

    /// Comparison key: the index definition without its name.
    pub(crate) fn definition(&self) -> (Vec<String>, bool, Option<String>, Vec<String>) {
        (
            self.columns.iter().map(|c| fold(c)).collect(),
            self.unique,
            self.predicate
                .as_deref()
                .map(|p| strip_outer_parens(&relmap_sql::normalize_sql(p)).to_string()),
            self.include.iter().map(|c| fold(c)).collect(),
        )
    }
}

/// Postgres reports index predicates wrapped in parentheses; declarations
/// usually are not.
fn strip_outer_parens(mut expr: &str) -> &str {
    while expr.starts_with('(') && expr.ends_with(')') && wraps_whole(expr) {
        expr = expr[1..expr.len() - 1].trim();
    }
    expr
}

/// Whether the opening parenthesis at the start closes at the very end.
fn wraps_whole(expr: &str) -> bool {
    let mut depth = 0usize;
    for (i, ch) in expr.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == expr.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewNode {
    pub name: String,
    pub query: String,
}

impl ViewNode {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_parens_are_ignored() {
        let declared = IndexNode::new("T__A", vec!["A".into()], false).with_predicate("\"A\" > 0");
        let reported =
            IndexNode::new("T__A", vec!["A".into()], false).with_predicate("((\"A\" > 0))");
        assert_eq!(declared.definition(), reported.definition());

        let different =
            IndexNode::new("T__A", vec!["A".into()], false).with_predicate("(\"A\" > 0) AND (true)");
        assert_ne!(declared.definition(), different.definition());
    }

    #[test]
    fn test_keys_are_case_folded() {
        let mut db = DatabaseNode::new("app");
        db.schema_mut("Blogging")
            .add_table(TableNode::new("Blogging", "Blog"));
        assert!(db.table("blogging", "BLOG").is_some());
        assert_eq!(db.schema("BLOGGING").map(|s| s.name.as_str()), Some("Blogging"));
    }
}
