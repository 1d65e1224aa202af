//! Model provider: the derived relational model, computed once.

use crate::config::Config;
use crate::snapshot::{ColumnNode, DatabaseNode, IndexNode, TableNode, ViewNode, fold};
use relmap_schema::{
    ColumnInfo, ModelError, MtmTableInfo, NoViewQueries, ObjectModelInfo, RegisteredCatalog,
    SchemaInfo, Schemas, TableInfo, TypeCatalog, TypeKey, TypeRef, ViewQuerySource, build_model,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

/// The relational model of a set of entity types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    schemas: Schemas,
}

impl Model {
    pub fn build(
        catalog: &dyn TypeCatalog,
        views: &dyn ViewQuerySource,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            schemas: build_model(catalog, views)?,
        })
    }

    /// Schemas by lowercased name.
    pub fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaInfo> {
        self.schemas.get(&fold(name))
    }

    /// Case-insensitive lookup by schema and object name.
    pub fn object(&self, schema: &str, name: &str) -> Option<&ObjectModelInfo> {
        self.schema(schema)?.get(name)
    }

    fn object_by_key(&self, key: &TypeKey) -> Option<&ObjectModelInfo> {
        self.object(key.schema_name(), &key.name)
    }

    /// The table or view derived from `ty`.
    pub fn object_for_type(&self, ty: TypeRef) -> Option<&ObjectModelInfo> {
        let desc = ty.get();
        self.object(desc.schema_name(), desc.table_name())
    }

    pub fn table_for(&self, ty: TypeRef) -> Option<&TableInfo> {
        self.object_for_type(ty).map(ObjectModelInfo::table)
    }

    /// The join table between `a` and `b`, in either order.
    pub fn mtm_table_for(&self, a: TypeRef, b: TypeRef) -> Option<&MtmTableInfo> {
        let (a, b) = (a.key(), b.key());
        self.schemas
            .values()
            .flat_map(|s| s.objects.values())
            .find_map(|o| match o {
                ObjectModelInfo::Mtm(mtm) if mtm.joins(&a, &b) => Some(mtm),
                _ => None,
            })
    }

    pub fn columns_for(&self, ty: TypeRef) -> Option<&BTreeMap<String, ColumnInfo>> {
        self.object_for_type(ty).map(ObjectModelInfo::columns)
    }

    pub fn columns_of(&self, schema: &str, table: &str) -> Option<&BTreeMap<String, ColumnInfo>> {
        self.object(schema, table).map(ObjectModelInfo::columns)
    }

    /// Objects reachable from `types`: their own tables, the tables they
    /// reference (transitively) and join tables between reached entities.
    pub fn tables_for(&self, types: impl IntoIterator<Item = TypeRef>) -> Vec<&ObjectModelInfo> {
        let mut reached: BTreeSet<TypeKey> = BTreeSet::new();
        let mut pending: Vec<TypeKey> = types.into_iter().map(|t| t.key()).collect();

        while let Some(key) = pending.pop() {
            if !reached.insert(key.clone()) {
                continue;
            }
            if let Some(object) = self.object_by_key(&key) {
                pending.extend(object.referenced_types().into_iter().cloned());
            }
        }

        let mut found: Vec<&ObjectModelInfo> = reached
            .iter()
            .filter_map(|key| self.object_by_key(key))
            .collect();
        for schema in self.schemas.values() {
            for object in schema.objects.values() {
                if let ObjectModelInfo::Mtm(mtm) = object
                    && reached.contains(&mtm.left)
                    && reached.contains(&mtm.right)
                {
                    found.push(object);
                }
            }
        }
        found
    }

    /// Render the model as the expected side of a diff.
    ///
    /// Multiple-relation columns are realized by join tables and do not
    /// appear on their owner.
    pub fn snapshot(&self, database: &str) -> DatabaseNode {
        let mut db = DatabaseNode::new(database);
        for schema in self.schemas.values() {
            let node = db.schema_mut(&schema.name);
            for object in schema.objects.values() {
                match object {
                    ObjectModelInfo::View(view) => {
                        node.add_view(ViewNode::new(&view.table.name, &view.query));
                    }
                    ObjectModelInfo::Table(table) | ObjectModelInfo::Mtm(MtmTableInfo { table, .. }) => {
                        node.add_table(table_node(table));
                    }
                }
            }
        }
        db
    }
}

fn table_node(table: &TableInfo) -> TableNode {
    let mut node = TableNode::new(&table.schema, &table.name);
    for column in table.columns.values().filter(|c| !c.is_multiple_relation()) {
        node = node.with_column(ColumnNode::new(
            column.name(),
            column.data_type(),
            column.constraints(),
        ));
    }
    for index in table.indexes.values() {
        let mut idx = IndexNode::new(index.name(), index.columns().to_vec(), index.is_unique())
            .with_include(index.include().to_vec());
        if let Some(predicate) = index.predicate() {
            idx = idx.with_predicate(predicate);
        }
        node = node.with_index(idx);
    }
    node
}

/// Builds the model on first access and serves it read-only afterwards.
///
/// Concurrent first callers block until the single build completes. A failed
/// build is remembered and returned to every caller.
pub struct ModelProvider {
    catalog: Box<dyn TypeCatalog + Send + Sync>,
    views: Box<dyn ViewQuerySource + Send + Sync>,
    model: OnceLock<Result<Model, ModelError>>,
}

impl ModelProvider {
    pub fn new(
        catalog: impl TypeCatalog + Send + Sync + 'static,
        views: impl ViewQuerySource + Send + Sync + 'static,
    ) -> Self {
        Self {
            catalog: Box::new(catalog),
            views: Box::new(views),
            model: OnceLock::new(),
        }
    }

    /// Provider over the types registered with `inventory`, without views.
    pub fn registered() -> Self {
        Self::new(RegisteredCatalog, NoViewQueries)
    }

    pub fn model(&self) -> Result<&Model, ModelError> {
        self.model
            .get_or_init(|| {
                let model = Model::build(self.catalog.as_ref(), self.views.as_ref());
                if let Err(err) = &model {
                    tracing::warn!(%err, "model build failed");
                }
                model
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Snapshot of the model for the configured database, named `fallback`
    /// when the config names none.
    pub fn expected(&self, config: &Config, fallback: &str) -> Result<DatabaseNode, ModelError> {
        Ok(self.model()?.snapshot(config.database_or(fallback)))
    }
}

impl std::fmt::Debug for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelProvider")
            .field("built", &self.model.get().is_some())
            .finish_non_exhaustive()
    }
}
