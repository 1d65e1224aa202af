use crate::{ColumnInfo, IndexAttr, ModelError, TypeKey};
use std::collections::BTreeMap;

/// A resolved index.
///
/// Columns are kept sorted by name, so the same column set declared in any
/// order yields an equal index with the same derived name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexInfo {
    table: TypeKey,
    name: String,
    columns: Vec<String>,
    unique: bool,
    predicate: Option<String>,
    include: Vec<String>,
}

impl IndexInfo {
    pub fn new(
        table: TypeKey,
        columns: impl IntoIterator<Item = impl Into<String>>,
        unique: bool,
    ) -> Self {
        let mut columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        columns.sort();
        columns.dedup();
        let name = relmap_sql::index_name(&table.name, columns.as_slice());
        Self {
            table,
            name,
            columns,
            unique,
            predicate: None,
            include: Vec::new(),
        }
    }

    /// Resolve a declared index against the owning table's columns.
    ///
    /// Column names match case-insensitively and are stored in the table's
    /// spelling. Multiple-relation columns live in join tables and cannot be
    /// indexed here.
    pub fn resolve(
        table: &TypeKey,
        attr: &IndexAttr,
        columns: &BTreeMap<String, ColumnInfo>,
    ) -> Result<Self, ModelError> {
        let lookup = |name: &str| -> Result<String, ModelError> {
            columns
                .iter()
                .find(|(c, info)| c.eq_ignore_ascii_case(name) && !info.is_multiple_relation())
                .map(|(c, _)| c.clone())
                .ok_or_else(|| ModelError::IndexColumnNotFound {
                    table: table.to_string(),
                    column: name.to_string(),
                })
        };

        let key_columns = attr
            .columns
            .iter()
            .map(|c| lookup(c))
            .collect::<Result<Vec<_>, _>>()?;
        let mut include = attr
            .include
            .iter()
            .map(|c| lookup(c))
            .collect::<Result<Vec<_>, _>>()?;
        include.sort();
        include.dedup();

        let mut index = Self::new(table.clone(), key_columns, attr.unique);
        index.predicate = attr.predicate.map(|p| p.trim().to_string());
        index.include = include;
        Ok(index)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &TypeKey {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn predicate(&self) -> Option<&str> {
        self.predicate.as_deref()
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }
}
