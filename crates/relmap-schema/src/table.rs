//! Tables, views, join tables and schemas.

use crate::{ColumnInfo, ColumnProperty, IndexInfo, ModelError, TypeKey, TypeRef};
use std::collections::{BTreeMap, BTreeSet};

/// A table derived from an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableInfo {
    pub key: TypeKey,
    pub schema: String,
    pub name: String,
    /// Columns by name.
    pub columns: BTreeMap<String, ColumnInfo>,
    /// Indexes by derived name.
    pub indexes: BTreeMap<String, IndexInfo>,
}

impl TableInfo {
    pub fn new(key: TypeKey, schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key,
            schema: schema.into(),
            name: name.into(),
            columns: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Add a column, rejecting a second column with the same
    /// (case-insensitive) name.
    pub fn add_column(&mut self, column: ColumnInfo) -> Result<(), ModelError> {
        if self
            .columns
            .keys()
            .any(|c| c.eq_ignore_ascii_case(column.name()))
        {
            return Err(ModelError::DuplicateColumn {
                table: self.key.to_string(),
                column: column.name().to_string(),
            });
        }
        self.columns.insert(column.name().to_string(), column);
        Ok(())
    }

    /// Add an index. Declaring the same index twice is fine; two different
    /// definitions under one name are not.
    pub fn add_index(&mut self, index: IndexInfo) -> Result<(), ModelError> {
        match self.indexes.get(index.name()) {
            Some(existing) if *existing == index => Ok(()),
            Some(_) => Err(ModelError::ConflictingIndex {
                table: self.key.to_string(),
                index: index.name().to_string(),
            }),
            None => {
                self.indexes.insert(index.name().to_string(), index);
                Ok(())
            }
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .get(name)
            .or_else(|| self.columns.values().find(|c| c.name().eq_ignore_ascii_case(name)))
    }
}

/// A view derived from a view type: columns like a table, plus its query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewInfo {
    pub table: TableInfo,
    pub query: String,
}

/// A synthesized join table realizing a many-to-many relation.
///
/// Holds exactly two columns, `Left` and `Right`, each a non-null foreign key
/// to one participant, and a unique index over both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MtmTableInfo {
    pub table: TableInfo,
    pub left: TypeKey,
    pub right: TypeKey,
}

pub const LEFT_COLUMN: &str = "Left";
pub const RIGHT_COLUMN: &str = "Right";

impl MtmTableInfo {
    pub fn new(left: TypeRef, right: TypeRef) -> Result<Self, ModelError> {
        let (left_desc, right_desc) = (left.get(), right.get());
        let schema = mtm_schema_name([left_desc.schema_name(), right_desc.schema_name()]);
        let name = format!("{}_{}", left_desc.name, right_desc.name);
        let key = TypeKey::new(schema.clone(), name.clone());

        let mut table = TableInfo::new(key.clone(), schema, name);
        for (column, participant) in [(LEFT_COLUMN, left), (RIGHT_COLUMN, right)] {
            let prop = ColumnProperty::synthesized(&key, column, participant);
            table.add_column(ColumnInfo::new(key.clone(), vec![prop])?)?;
        }
        table.add_index(IndexInfo::new(key, [LEFT_COLUMN, RIGHT_COLUMN], true))?;

        Ok(Self {
            table,
            left: left.key(),
            right: right.key(),
        })
    }

    /// Whether this table joins `a` and `b`, in either order.
    pub fn joins(&self, a: &TypeKey, b: &TypeKey) -> bool {
        (self.left == *a && self.right == *b) || (self.left == *b && self.right == *a)
    }
}

/// Schema name of a join table: the participants' schemas, deduplicated
/// case-insensitively, sorted and concatenated.
///
/// ```
/// assert_eq!(relmap_schema::mtm_schema_name(["blogging", "blogging"]), "blogging");
/// assert_eq!(relmap_schema::mtm_schema_name(["identity", "blogging"]), "bloggingidentity");
/// ```
pub fn mtm_schema_name<'a>(schemas: impl IntoIterator<Item = &'a str>) -> String {
    let mut names: Vec<&str> = schemas.into_iter().collect();
    names.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));
    names.concat()
}

/// Anything the model can hold under a schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectModelInfo {
    Table(TableInfo),
    View(ViewInfo),
    Mtm(MtmTableInfo),
}

impl ObjectModelInfo {
    /// The table-shaped part shared by all variants.
    pub fn table(&self) -> &TableInfo {
        match self {
            ObjectModelInfo::Table(table) => table,
            ObjectModelInfo::View(view) => &view.table,
            ObjectModelInfo::Mtm(mtm) => &mtm.table,
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.table().key
    }

    pub fn schema(&self) -> &str {
        &self.table().schema
    }

    pub fn name(&self) -> &str {
        &self.table().name
    }

    pub fn columns(&self) -> &BTreeMap<String, ColumnInfo> {
        &self.table().columns
    }

    pub fn indexes(&self) -> &BTreeMap<String, IndexInfo> {
        &self.table().indexes
    }

    pub fn is_view(&self) -> bool {
        matches!(self, ObjectModelInfo::View(_))
    }

    /// Entities this object holds foreign keys to.
    pub fn referenced_types(&self) -> BTreeSet<&TypeKey> {
        self.columns()
            .values()
            .filter(|c| !c.is_multiple_relation())
            .filter_map(|c| c.relation())
            .map(|r| &r.target)
            .collect()
    }
}

/// A named group of tables and views.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaInfo {
    pub name: String,
    /// Objects by lowercased name.
    pub objects: BTreeMap<String, ObjectModelInfo>,
}

impl SchemaInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: BTreeMap::new(),
        }
    }

    /// Add an object, rejecting a second one with the same
    /// (case-insensitive) name.
    pub fn add(&mut self, object: ObjectModelInfo) -> Result<(), ModelError> {
        let fold = object.name().to_lowercase();
        if let Some(existing) = self.objects.get(&fold) {
            return Err(ModelError::DuplicateObject {
                schema: self.name.clone(),
                name: object.name().to_string(),
                first: existing.key().to_string(),
                second: object.key().to_string(),
            });
        }
        self.objects.insert(fold, object);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ObjectModelInfo> {
        self.objects.get(&name.to_lowercase())
    }

    pub fn tables(&self) -> impl Iterator<Item = &ObjectModelInfo> {
        self.objects.values().filter(|o| !o.is_view())
    }

    pub fn views(&self) -> impl Iterator<Item = &ViewInfo> {
        self.objects.values().filter_map(|o| match o {
            ObjectModelInfo::View(view) => Some(view),
            _ => None,
        })
    }
}
