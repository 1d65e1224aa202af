//! Migration solver: orders and validates schema changes.
//!
//! [`sort_changes`] builds a dependency graph over an unordered change set
//! and emits a topological order:
//!
//! - the database before everything, a schema before its contents;
//! - a table before its columns, a column after the table and column it
//!   references, and a referenced table before any table referencing it (join
//!   tables therefore come after both participants). Nullable references
//!   yield to non-null ones when the two disagree;
//! - an index after its columns, views after all tables and columns;
//! - a drop before the create of the same object;
//! - drops in reverse dependency order: views first, referencing tables and
//!   columns before what they reference, a schema after its contents.
//!
//! Independent changes are ordered by kind, then schema, table and item name,
//! so the output is deterministic.
//!
//! [`VirtualDatabase`] replays an ordered plan against a snapshot and reports
//! the first change whose preconditions do not hold.
//!
//! ## Example Problem
//!
//! ```text
//! -- This fails:
//! ALTER TABLE "blogging"."Post" ADD COLUMN "Blog_PrimaryKey" UUID not null references "blogging"."Blog" ("PrimaryKey");
//! CREATE TABLE "blogging"."Blog" ();
//!
//! -- This works:
//! CREATE TABLE "blogging"."Blog" ();
//! ALTER TABLE "blogging"."Blog" ADD COLUMN "PrimaryKey" UUID not null primary key;
//! ALTER TABLE "blogging"."Post" ADD COLUMN "Blog_PrimaryKey" UUID not null references "blogging"."Blog" ("PrimaryKey");
//! ```

use crate::diff::{Change, ChangeKind};
use crate::snapshot::{DatabaseSnapshot, fold};
use relmap_schema::ColumnConstraint;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

/// Error when a migration cannot be ordered or executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SortError {
    #[error("changes form a dependency cycle: {}", changes.join("; "))]
    CycleDetected { changes: Vec<String> },

    #[error("{change}: database does not exist")]
    DatabaseNotFound { change: String },

    #[error("{change}: database already exists")]
    DatabaseAlreadyExists { change: String },

    #[error("{change}: schema '{schema}' does not exist")]
    SchemaNotFound { change: String, schema: String },

    #[error("{change}: schema '{schema}' already exists")]
    SchemaAlreadyExists { change: String, schema: String },

    #[error("{change}: schema '{schema}' is not empty")]
    SchemaNotEmpty { change: String, schema: String },

    #[error("{change}: table '{table}' does not exist")]
    TableNotFound { change: String, table: String },

    #[error("{change}: table '{table}' already exists")]
    TableAlreadyExists { change: String, table: String },

    #[error("{change}: column '{table}.{column}' does not exist")]
    ColumnNotFound {
        change: String,
        table: String,
        column: String,
    },

    #[error("{change}: column '{table}.{column}' already exists")]
    ColumnAlreadyExists {
        change: String,
        table: String,
        column: String,
    },

    #[error("{change}: index '{index}' does not exist")]
    IndexNotFound { change: String, index: String },

    #[error("{change}: index '{index}' already exists")]
    IndexAlreadyExists { change: String, index: String },

    #[error("{change}: view '{view}' does not exist")]
    ViewNotFound { change: String, view: String },

    #[error("{change}: view '{view}' already exists")]
    ViewAlreadyExists { change: String, view: String },

    #[error("{change}: referenced column '{target}' does not exist")]
    ReferenceTargetNotFound { change: String, target: String },

    #[error("{change}: '{target}' is still referenced by '{by}'")]
    StillReferenced {
        change: String,
        target: String,
        by: String,
    },
}

/// `(schema, table, column)`, case-folded.
type ColumnRef = (String, String, String);

fn reference_of(constraints: &[ColumnConstraint]) -> Option<ColumnRef> {
    constraints.iter().find_map(|c| match c {
        ColumnConstraint::References {
            schema,
            table,
            column,
        } => Some((fold(schema), fold(table), fold(column))),
        _ => None,
    })
}

/// Folded facts about one change, used to derive edges.
struct Node {
    kind: ChangeKind,
    schema: String,
    table: String,
    item: String,
    /// Column changes: what the column references.
    reference: Option<ColumnRef>,
    not_null: bool,
    /// DropTable: what the dropped table's columns reference.
    table_references: Vec<ColumnRef>,
    /// Index changes: key and included columns.
    index_columns: Vec<String>,
}

impl Node {
    fn new(change: &Change) -> Self {
        let mut node = Node {
            kind: change.kind(),
            schema: fold(change.schema()),
            table: change.table().map(fold).unwrap_or_default(),
            item: change.item().map(fold).unwrap_or_default(),
            reference: None,
            not_null: false,
            table_references: Vec::new(),
            index_columns: Vec::new(),
        };
        match change {
            Change::CreateColumn { column, .. } | Change::DropColumn { column, .. } => {
                node.reference = reference_of(&column.constraints);
                node.not_null = !column.is_nullable();
            }
            Change::DropTable { table, .. } => {
                node.table_references = table
                    .columns
                    .values()
                    .filter_map(|c| reference_of(&c.constraints))
                    .collect();
            }
            Change::CreateIndex { index, .. } | Change::DropIndex { index, .. } => {
                node.index_columns = index
                    .columns
                    .iter()
                    .chain(&index.include)
                    .map(|c| fold(c))
                    .collect();
            }
            _ => {}
        }
        node
    }

    fn table_key(&self) -> (String, String) {
        (self.schema.clone(), self.table.clone())
    }

    fn item_key(&self) -> ColumnRef {
        (self.schema.clone(), self.table.clone(), self.item.clone())
    }
}

/// Where each kind of change sits, for edge lookups.
#[derive(Default)]
struct Lookup {
    create_schema: HashMap<String, usize>,
    drop_schema: HashMap<String, usize>,
    create_table: HashMap<(String, String), usize>,
    drop_table: HashMap<(String, String), usize>,
    create_column: HashMap<ColumnRef, usize>,
    drop_column: HashMap<ColumnRef, usize>,
    drop_index: HashMap<ColumnRef, usize>,
    drop_view: HashMap<(String, String), usize>,
}

impl Lookup {
    fn new(nodes: &[Node]) -> Self {
        let mut lookup = Lookup::default();
        for (i, node) in nodes.iter().enumerate() {
            match node.kind {
                ChangeKind::CreateSchema => {
                    lookup.create_schema.insert(node.schema.clone(), i);
                }
                ChangeKind::DropSchema => {
                    lookup.drop_schema.insert(node.schema.clone(), i);
                }
                ChangeKind::CreateTable => {
                    lookup.create_table.insert(node.table_key(), i);
                }
                ChangeKind::DropTable => {
                    lookup.drop_table.insert(node.table_key(), i);
                }
                ChangeKind::CreateColumn => {
                    lookup.create_column.insert(node.item_key(), i);
                }
                ChangeKind::DropColumn => {
                    lookup.drop_column.insert(node.item_key(), i);
                }
                ChangeKind::DropIndex => {
                    lookup.drop_index.insert(node.item_key(), i);
                }
                ChangeKind::DropView => {
                    lookup.drop_view.insert(node.table_key(), i);
                }
                ChangeKind::CreateDatabase | ChangeKind::CreateIndex | ChangeKind::CreateView => {}
            }
        }
        lookup
    }
}

struct Graph {
    successors: Vec<BTreeSet<usize>>,
    in_degree: Vec<usize>,
}

impl Graph {
    fn new(len: usize) -> Self {
        Self {
            successors: vec![BTreeSet::new(); len],
            in_degree: vec![0; len],
        }
    }

    /// `from` must run before `to`.
    fn edge(&mut self, from: Option<&usize>, to: usize) {
        if let Some(&from) = from
            && from != to
            && self.successors[from].insert(to)
        {
            self.in_degree[to] += 1;
        }
    }

    /// Whether `to` is reachable from `from`.
    fn reaches(&self, from: usize, to: usize) -> bool {
        let mut seen = BTreeSet::new();
        let mut stack = vec![from];
        while let Some(i) = stack.pop() {
            if i == to {
                return true;
            }
            if seen.insert(i) {
                stack.extend(self.successors[i].iter().copied());
            }
        }
        false
    }
}

fn build_graph(nodes: &[Node]) -> Graph {
    let lookup = Lookup::new(nodes);
    let mut graph = Graph::new(nodes.len());

    let of_kind = |kinds: &[ChangeKind]| -> Vec<usize> {
        nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| kinds.contains(&n.kind))
            .map(|(i, _)| i)
            .collect()
    };
    let table_creates = of_kind(&[ChangeKind::CreateTable, ChangeKind::CreateColumn]);
    let table_drops = of_kind(&[ChangeKind::DropTable, ChangeKind::DropColumn]);
    // Table-level edges from nullable references, keyed by (referenced, referencing).
    let mut optional: BTreeMap<((String, String), (String, String)), (usize, usize)> =
        BTreeMap::new();

    for (i, node) in nodes.iter().enumerate() {
        let schema = &node.schema;
        let table = node.table_key();
        match node.kind {
            ChangeKind::CreateDatabase => {
                for j in 0..nodes.len() {
                    graph.edge(Some(&i), j);
                }
            }
            ChangeKind::CreateSchema => {
                graph.edge(lookup.drop_schema.get(schema), i);
            }
            ChangeKind::CreateTable => {
                graph.edge(lookup.create_schema.get(schema), i);
                graph.edge(lookup.drop_table.get(&table), i);
            }
            ChangeKind::CreateColumn => {
                graph.edge(lookup.create_schema.get(schema), i);
                graph.edge(lookup.create_table.get(&table), i);
                graph.edge(lookup.drop_column.get(&node.item_key()), i);
                if let Some((ref_schema, ref_table, ref_column)) = &node.reference {
                    let target = (ref_schema.clone(), ref_table.clone());
                    graph.edge(lookup.create_table.get(&target), i);
                    graph.edge(
                        lookup
                            .create_column
                            .get(&(ref_schema.clone(), ref_table.clone(), ref_column.clone())),
                        i,
                    );
                    if target != table
                        && let Some(&own) = lookup.create_table.get(&table)
                        && let Some(&referenced) = lookup.create_table.get(&target)
                    {
                        if node.not_null {
                            graph.edge(Some(&referenced), own);
                        } else {
                            optional.insert((target, table.clone()), (referenced, own));
                        }
                    }
                }
            }
            ChangeKind::CreateIndex => {
                graph.edge(lookup.create_schema.get(schema), i);
                graph.edge(lookup.create_table.get(&table), i);
                graph.edge(lookup.drop_index.get(&node.item_key()), i);
                for column in &node.index_columns {
                    let key = (node.schema.clone(), node.table.clone(), column.clone());
                    graph.edge(lookup.create_column.get(&key), i);
                }
            }
            ChangeKind::CreateView => {
                graph.edge(lookup.create_schema.get(schema), i);
                graph.edge(lookup.drop_view.get(&table), i);
                for j in &table_creates {
                    graph.edge(Some(j), i);
                }
            }
            ChangeKind::DropView => {
                if let Some(&to) = lookup.drop_schema.get(schema) {
                    graph.edge(Some(&i), to);
                }
                for &j in &table_drops {
                    graph.edge(Some(&i), j);
                }
            }
            ChangeKind::DropIndex => {
                let before = [
                    lookup.drop_table.get(&table),
                    lookup.drop_schema.get(schema),
                ];
                for to in before.into_iter().flatten() {
                    graph.edge(Some(&i), *to);
                }
                for column in &node.index_columns {
                    let key = (node.schema.clone(), node.table.clone(), column.clone());
                    if let Some(&to) = lookup.drop_column.get(&key) {
                        graph.edge(Some(&i), to);
                    }
                }
            }
            ChangeKind::DropColumn => {
                let mut before = vec![
                    lookup.drop_table.get(&table),
                    lookup.drop_schema.get(schema),
                ];
                if let Some(reference) = &node.reference {
                    let target = (reference.0.clone(), reference.1.clone());
                    if target != table {
                        before.push(lookup.drop_table.get(&target));
                    }
                    before.push(lookup.drop_column.get(reference));
                }
                for to in before.into_iter().flatten() {
                    graph.edge(Some(&i), *to);
                }
            }
            ChangeKind::DropTable => {
                let mut before = vec![lookup.drop_schema.get(schema)];
                for reference in &node.table_references {
                    let target = (reference.0.clone(), reference.1.clone());
                    if target == table {
                        continue;
                    }
                    before.push(lookup.drop_table.get(&target));
                    before.push(lookup.drop_column.get(reference));
                }
                for to in before.into_iter().flatten() {
                    graph.edge(Some(&i), *to);
                }
            }
            ChangeKind::DropSchema => {}
        }
    }

    // Nullable references order tables too, unless that would close a cycle:
    // such a column can still be added once both tables exist.
    for ((referenced, referencing), (from, to)) in optional {
        if graph.reaches(to, from) {
            tracing::debug!(
                ?referenced,
                ?referencing,
                "skipping table order of optional reference"
            );
            continue;
        }
        graph.edge(Some(&from), to);
    }

    graph
}

/// Order changes so every change's dependencies come first.
///
/// Returns [`SortError::CycleDetected`] with the changes that could not be
/// placed when the dependencies are circular.
pub fn sort_changes(changes: Vec<Change>) -> Result<Vec<Change>, SortError> {
    let _span = tracing::debug_span!("sort_changes", changes = changes.len()).entered();

    let nodes: Vec<Node> = changes.iter().map(Node::new).collect();
    let Graph {
        successors,
        mut in_degree,
    } = build_graph(&nodes);

    let sort_key = |i: usize| {
        let node = &nodes[i];
        (
            node.kind,
            node.schema.clone(),
            node.table.clone(),
            node.item.clone(),
            i,
        )
    };

    let mut ready: BTreeSet<_> = (0..nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .map(sort_key)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some((.., i)) = ready.pop_first() {
        order.push(i);
        for &next in &successors[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(sort_key(next));
            }
        }
    }

    if order.len() < nodes.len() {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let stuck: Vec<String> = changes
            .iter()
            .enumerate()
            .filter(|(i, _)| !placed.contains(i))
            .map(|(_, c)| c.to_string())
            .collect();
        tracing::warn!(stuck = stuck.len(), "dependency cycle between changes");
        return Err(SortError::CycleDetected { changes: stuck });
    }

    let mut slots: Vec<Option<Change>> = changes.into_iter().map(Some).collect();
    let sorted: Vec<Change> = order.into_iter().filter_map(|i| slots[i].take()).collect();
    tracing::debug!(changes = sorted.len(), "sorted changes");
    Ok(sorted)
}

#[derive(Debug, Clone, Default)]
struct VirtualTable {
    /// Columns by folded name, with what each references.
    columns: BTreeMap<String, Option<ColumnRef>>,
    /// Indexes by folded name, with the folded columns they cover.
    indexes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default)]
struct VirtualSchema {
    tables: BTreeMap<String, VirtualTable>,
    views: BTreeSet<String>,
}

/// Database state for simulating a migration.
///
/// Tracks only what the solver's preconditions need: which objects exist and
/// which columns reference which.
#[derive(Debug, Clone, Default)]
pub struct VirtualDatabase {
    exists: bool,
    schemas: BTreeMap<String, VirtualSchema>,
}

fn index_columns(columns: &[String], include: &[String]) -> Vec<String> {
    columns.iter().chain(include).map(|c| fold(c)).collect()
}

impl VirtualDatabase {
    /// Initialize from actual database state.
    pub fn from_snapshot(snapshot: &DatabaseSnapshot) -> Self {
        let Some(db) = snapshot.as_present() else {
            return Self::default();
        };

        let schemas = db
            .schemas
            .iter()
            .map(|(key, schema)| {
                let tables = schema
                    .tables
                    .iter()
                    .map(|(key, table)| {
                        let columns = table
                            .columns
                            .iter()
                            .map(|(key, c)| (key.clone(), reference_of(&c.constraints)))
                            .collect();
                        let indexes = table
                            .indexes
                            .values()
                            .map(|i| (fold(&i.name), index_columns(&i.columns, &i.include)))
                            .collect();
                        (key.clone(), VirtualTable { columns, indexes })
                    })
                    .collect();
                let views = schema.views.keys().cloned().collect();
                (key.clone(), VirtualSchema { tables, views })
            })
            .collect();

        Self {
            exists: true,
            schemas,
        }
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn table_exists(&self, schema: &str, table: &str) -> bool {
        self.table(&fold(schema), &fold(table)).is_some()
    }

    pub fn column_exists(&self, schema: &str, table: &str, column: &str) -> bool {
        self.table(&fold(schema), &fold(table))
            .is_some_and(|t| t.columns.contains_key(&fold(column)))
    }

    fn table(&self, schema: &str, table: &str) -> Option<&VirtualTable> {
        self.schemas.get(schema)?.tables.get(table)
    }

    fn table_mut(&mut self, schema: &str, table: &str) -> Option<&mut VirtualTable> {
        self.schemas.get_mut(schema)?.tables.get_mut(table)
    }

    /// Columns referencing `schema.table` (or one column of it).
    fn referrers(&self, schema: &str, table: &str, column: Option<&str>) -> Vec<ColumnRef> {
        let mut found = Vec::new();
        for (s, vs) in &self.schemas {
            for (t, vt) in &vs.tables {
                for (c, reference) in &vt.columns {
                    if let Some((rs, rt, rc)) = reference
                        && rs == schema
                        && rt == table
                        && column.is_none_or(|col| rc == col)
                    {
                        found.push((s.clone(), t.clone(), c.clone()));
                    }
                }
            }
        }
        found
    }

    /// Apply a change, validating its preconditions.
    pub fn apply(&mut self, change: &Change) -> Result<(), SortError> {
        let desc = change.to_string();

        if let Change::CreateDatabase { .. } = change {
            if self.exists {
                return Err(SortError::DatabaseAlreadyExists { change: desc });
            }
            self.exists = true;
            return Ok(());
        }
        if !self.exists {
            return Err(SortError::DatabaseNotFound { change: desc });
        }

        let schema = fold(change.schema());
        let schema_missing = || SortError::SchemaNotFound {
            change: change.to_string(),
            schema: change.schema().to_string(),
        };
        let table_missing = || SortError::TableNotFound {
            change: change.to_string(),
            table: format!("{}.{}", change.schema(), change.table().unwrap_or_default()),
        };

        match change {
            Change::CreateDatabase { .. } => {}
            Change::CreateSchema { schema: name } => {
                if self.schemas.contains_key(&schema) {
                    return Err(SortError::SchemaAlreadyExists {
                        change: desc,
                        schema: name.clone(),
                    });
                }
                self.schemas.insert(schema, VirtualSchema::default());
            }
            Change::DropSchema { schema: name } => {
                let vs = self.schemas.get(&schema).ok_or_else(schema_missing)?;
                if !vs.tables.is_empty() || !vs.views.is_empty() {
                    return Err(SortError::SchemaNotEmpty {
                        change: desc,
                        schema: name.clone(),
                    });
                }
                self.schemas.remove(&schema);
            }
            Change::CreateTable { table, .. } => {
                let vs = self.schemas.get_mut(&schema).ok_or_else(schema_missing)?;
                if vs.tables.contains_key(&fold(table)) {
                    return Err(SortError::TableAlreadyExists {
                        change: desc,
                        table: table.clone(),
                    });
                }
                vs.tables.insert(fold(table), VirtualTable::default());
            }
            Change::DropTable { table, .. } => {
                let table_key = fold(&table.name);
                if self.table(&schema, &table_key).is_none() {
                    return Err(table_missing());
                }
                // Self-references go away with the table.
                let outside = self
                    .referrers(&schema, &table_key, None)
                    .into_iter()
                    .find(|(s, t, _)| *s != schema || *t != table_key);
                if let Some((s, t, c)) = outside {
                    return Err(SortError::StillReferenced {
                        change: desc,
                        target: table.name.clone(),
                        by: format!("{}.{}.{}", s, t, c),
                    });
                }
                if let Some(vs) = self.schemas.get_mut(&schema) {
                    vs.tables.remove(&table_key);
                }
            }
            Change::CreateColumn { table, column, .. } => {
                let table_key = fold(table);
                let column_key = fold(&column.name);
                let reference = reference_of(&column.constraints);
                if let Some((rs, rt, rc)) = &reference {
                    let target_exists = self
                        .table(rs, rt)
                        .is_some_and(|t| t.columns.contains_key(rc));
                    if !target_exists {
                        return Err(SortError::ReferenceTargetNotFound {
                            change: desc,
                            target: format!("{}.{}.{}", rs, rt, rc),
                        });
                    }
                }
                let vt = self
                    .table_mut(&schema, &table_key)
                    .ok_or_else(table_missing)?;
                if vt.columns.contains_key(&column_key) {
                    return Err(SortError::ColumnAlreadyExists {
                        change: desc,
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                }
                vt.columns.insert(column_key, reference);
            }
            Change::DropColumn { table, column, .. } => {
                let table_key = fold(table);
                let column_key = fold(&column.name);
                let exists = self
                    .table(&schema, &table_key)
                    .ok_or_else(table_missing)?
                    .columns
                    .contains_key(&column_key);
                if !exists {
                    return Err(SortError::ColumnNotFound {
                        change: desc,
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                }
                let here = (schema.clone(), table_key.clone(), column_key.clone());
                let other = self
                    .referrers(&schema, &table_key, Some(&column_key))
                    .into_iter()
                    .find(|r| *r != here);
                if let Some((s, t, c)) = other {
                    return Err(SortError::StillReferenced {
                        change: desc,
                        target: format!("{}.{}", table, column.name),
                        by: format!("{}.{}.{}", s, t, c),
                    });
                }
                if let Some(vt) = self.table_mut(&schema, &table_key) {
                    vt.columns.remove(&column_key);
                    // Postgres drops indexes on a dropped column with it.
                    vt.indexes.retain(|_, cols| !cols.contains(&column_key));
                }
            }
            Change::CreateIndex { table, index, .. } => {
                let vt = self
                    .table_mut(&schema, &fold(table))
                    .ok_or_else(table_missing)?;
                let covered = index_columns(&index.columns, &index.include);
                if let Some(missing) = covered.iter().find(|c| !vt.columns.contains_key(*c)) {
                    return Err(SortError::ColumnNotFound {
                        change: desc,
                        table: table.clone(),
                        column: missing.clone(),
                    });
                }
                if vt.indexes.contains_key(&fold(&index.name)) {
                    return Err(SortError::IndexAlreadyExists {
                        change: desc,
                        index: index.name.clone(),
                    });
                }
                vt.indexes.insert(fold(&index.name), covered);
            }
            Change::DropIndex { table, index, .. } => {
                let vt = self
                    .table_mut(&schema, &fold(table))
                    .ok_or_else(table_missing)?;
                if vt.indexes.remove(&fold(&index.name)).is_none() {
                    return Err(SortError::IndexNotFound {
                        change: desc,
                        index: index.name.clone(),
                    });
                }
            }
            Change::CreateView { view, .. } => {
                let vs = self.schemas.get_mut(&schema).ok_or_else(schema_missing)?;
                if !vs.views.insert(fold(&view.name)) {
                    return Err(SortError::ViewAlreadyExists {
                        change: desc,
                        view: view.name.clone(),
                    });
                }
            }
            Change::DropView { view, .. } => {
                let vs = self.schemas.get_mut(&schema).ok_or_else(schema_missing)?;
                if !vs.views.remove(&fold(&view.name)) {
                    return Err(SortError::ViewNotFound {
                        change: desc,
                        view: view.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Check if a change can be applied without error.
    pub fn can_apply(&self, change: &Change) -> bool {
        self.clone().apply(change).is_ok()
    }

    /// Replay `changes` in order on a copy of this state.
    pub fn validate(&self, changes: &[Change]) -> Result<(), SortError> {
        let mut db = self.clone();
        for change in changes {
            db.apply(change)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ColumnNode, DatabaseNode, IndexNode, TableNode, ViewNode};
    use relmap_schema::PgType;

    fn pk_column() -> ColumnNode {
        ColumnNode::new(
            "PrimaryKey",
            PgType::Uuid,
            [ColumnConstraint::NotNull, ColumnConstraint::PrimaryKey],
        )
    }

    fn fk_column(name: &str, target: &str, nullable: bool) -> ColumnNode {
        let mut constraints = vec![ColumnConstraint::References {
            schema: "app".into(),
            table: target.into(),
            column: "PrimaryKey".into(),
        }];
        if !nullable {
            constraints.push(ColumnConstraint::NotNull);
        }
        ColumnNode::new(name, PgType::Uuid, constraints)
    }

    fn create_table(name: &str) -> Change {
        Change::CreateTable {
            schema: "app".into(),
            table: name.into(),
        }
    }

    fn create_column(table: &str, column: ColumnNode) -> Change {
        Change::CreateColumn {
            schema: "app".into(),
            table: table.into(),
            column,
        }
    }

    fn make_table(name: &str, columns: Vec<ColumnNode>) -> TableNode {
        columns
            .into_iter()
            .fold(TableNode::new("app", name), TableNode::with_column)
    }

    fn make_snapshot(tables: Vec<TableNode>) -> DatabaseSnapshot {
        let mut db = DatabaseNode::new("app");
        let schema = db.schema_mut("app");
        for table in tables {
            schema.add_table(table);
        }
        DatabaseSnapshot::Present(db)
    }

    fn rendered(changes: &[Change]) -> Vec<String> {
        changes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_referenced_table_created_first() {
        // Shuffled on purpose: Post comes before Blog.
        let changes = vec![
            create_column("Post", fk_column("Blog_PrimaryKey", "Blog", false)),
            create_table("Post"),
            create_column("Post", pk_column()),
            create_column("Blog", pk_column()),
            create_table("Blog"),
            Change::CreateSchema {
                schema: "app".into(),
            },
        ];
        let sorted = sort_changes(changes).unwrap();
        assert_eq!(
            rendered(&sorted),
            [
                "+ schema app",
                "+ table app.Blog",
                "+ table app.Post",
                "+ column app.Blog.PrimaryKey UUID not null primary key",
                "+ column app.Post.Blog_PrimaryKey UUID not null references \"app\".\"Blog\" (\"PrimaryKey\")",
                "+ column app.Post.PrimaryKey UUID not null primary key",
            ]
        );
    }

    #[test]
    fn test_sort_is_deterministic() {
        let changes = vec![
            create_table("B"),
            create_table("A"),
            create_column("B", pk_column()),
            create_column("A", pk_column()),
        ];
        let mut reversed = changes.clone();
        reversed.reverse();
        assert_eq!(
            sort_changes(changes).unwrap(),
            sort_changes(reversed).unwrap()
        );
    }

    #[test]
    fn test_drop_before_create_of_same_column() {
        let old = ColumnNode::new("Email", PgType::Text, []);
        let new = ColumnNode::new("Email", PgType::Text, [ColumnConstraint::NotNull]);
        let changes = vec![
            create_column("User", new),
            Change::DropColumn {
                schema: "app".into(),
                table: "User".into(),
                column: old,
            },
        ];
        let sorted = sort_changes(changes).unwrap();
        assert_eq!(sorted[0].kind(), ChangeKind::DropColumn);
        assert_eq!(sorted[1].kind(), ChangeKind::CreateColumn);
    }

    #[test]
    fn test_referencing_table_dropped_first() {
        let blog = make_table("Blog", vec![pk_column()]);
        let post = make_table(
            "Post",
            vec![pk_column(), fk_column("Blog_PrimaryKey", "Blog", false)],
        );
        let snapshot = make_snapshot(vec![blog.clone(), post.clone()]);
        let changes = vec![
            Change::DropTable {
                schema: "app".into(),
                table: blog,
            },
            Change::DropTable {
                schema: "app".into(),
                table: post,
            },
        ];
        let sorted = sort_changes(changes).unwrap();
        assert_eq!(rendered(&sorted), ["- table app.Post", "- table app.Blog"]);
        VirtualDatabase::from_snapshot(&snapshot)
            .validate(&sorted)
            .unwrap();
    }

    #[test]
    fn test_view_created_after_tables_and_dropped_first() {
        let view = ViewNode::new("Active", "SELECT 1");
        let changes = vec![
            Change::CreateView {
                schema: "app".into(),
                view: view.clone(),
            },
            create_column("User", pk_column()),
            create_table("User"),
        ];
        let sorted = sort_changes(changes).unwrap();
        assert_eq!(sorted.last().map(Change::kind), Some(ChangeKind::CreateView));

        let changes = vec![
            Change::DropTable {
                schema: "app".into(),
                table: make_table("User", vec![pk_column()]),
            },
            Change::DropView {
                schema: "app".into(),
                view,
            },
        ];
        let sorted = sort_changes(changes).unwrap();
        assert_eq!(sorted[0].kind(), ChangeKind::DropView);
    }

    #[test]
    fn test_index_after_its_columns() {
        let changes = vec![
            Change::CreateIndex {
                schema: "app".into(),
                table: "User".into(),
                index: IndexNode::new("User__Email", vec!["Email".into()], true),
            },
            create_column("User", ColumnNode::new("Email", PgType::Text, [])),
            create_table("User"),
        ];
        let kinds: Vec<_> = sort_changes(changes)
            .unwrap()
            .iter()
            .map(Change::kind)
            .collect();
        assert_eq!(
            kinds,
            [
                ChangeKind::CreateTable,
                ChangeKind::CreateColumn,
                ChangeKind::CreateIndex
            ]
        );
    }

    #[test]
    fn test_mutual_required_references_are_a_cycle() {
        let changes = vec![
            create_table("A"),
            create_table("B"),
            create_column("A", pk_column()),
            create_column("B", pk_column()),
            create_column("A", fk_column("B_PrimaryKey", "B", false)),
            create_column("B", fk_column("A_PrimaryKey", "A", false)),
        ];
        let SortError::CycleDetected { changes } = sort_changes(changes).unwrap_err() else {
            panic!("expected a cycle");
        };
        assert!(changes.contains(&"+ table app.A".to_string()));
        assert!(changes.contains(&"+ table app.B".to_string()));
    }

    #[test]
    fn test_mutual_optional_references_sort() {
        let changes = vec![
            create_table("A"),
            create_table("B"),
            create_column("A", pk_column()),
            create_column("B", pk_column()),
            create_column("A", fk_column("B_PrimaryKey", "B", true)),
            create_column("B", fk_column("A_PrimaryKey", "A", true)),
        ];
        let sorted = sort_changes(changes).unwrap();
        VirtualDatabase::from_snapshot(&make_snapshot(vec![]))
            .validate(&sorted)
            .unwrap();
    }

    #[test]
    fn test_optional_reference_still_orders_tables() {
        let changes = vec![
            create_table("Blog"),
            create_table("Article"),
            create_column("Blog", pk_column()),
            create_column("Article", pk_column()),
            create_column("Article", fk_column("Blog_PrimaryKey", "Blog", true)),
        ];
        let sorted = sort_changes(changes).unwrap();
        assert_eq!(
            rendered(&sorted)[..2],
            ["+ table app.Blog", "+ table app.Article"]
        );
    }

    #[test]
    fn test_virtual_rejects_missing_reference_target() {
        let mut db = VirtualDatabase::from_snapshot(&make_snapshot(vec![]));
        db.apply(&create_table("Post")).unwrap();
        let err = db
            .apply(&create_column("Post", fk_column("Blog_PrimaryKey", "Blog", false)))
            .unwrap_err();
        assert!(matches!(err, SortError::ReferenceTargetNotFound { .. }));
    }

    #[test]
    fn test_virtual_rejects_dropping_referenced_table() {
        let blog = make_table("Blog", vec![pk_column()]);
        let post = make_table(
            "Post",
            vec![pk_column(), fk_column("Blog_PrimaryKey", "Blog", true)],
        );
        let mut db = VirtualDatabase::from_snapshot(&make_snapshot(vec![blog.clone(), post]));
        let err = db
            .apply(&Change::DropTable {
                schema: "app".into(),
                table: blog,
            })
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "- table app.Blog: 'Blog' is still referenced by 'app.post.blog_primarykey'"
        );
    }

    #[test]
    fn test_virtual_absent_database() {
        let mut db = VirtualDatabase::from_snapshot(&DatabaseSnapshot::Absent);
        assert!(!db.exists());
        assert!(!db.can_apply(&create_table("User")));
        db.apply(&Change::CreateDatabase {
            database: "app".into(),
        })
        .unwrap();
        db.apply(&Change::CreateSchema {
            schema: "App".into(),
        })
        .unwrap();
        db.apply(&create_table("User")).unwrap();
        assert!(db.table_exists("APP", "user"));
        assert!(!db.column_exists("app", "User", "PrimaryKey"));
    }

    #[test]
    fn test_virtual_schema_must_be_empty_to_drop() {
        let snapshot = make_snapshot(vec![make_table("User", vec![pk_column()])]);
        let db = VirtualDatabase::from_snapshot(&snapshot);
        let err = db
            .validate(&[Change::DropSchema {
                schema: "app".into(),
            }])
            .unwrap_err();
        assert!(matches!(err, SortError::SchemaNotEmpty { .. }));
    }
}
