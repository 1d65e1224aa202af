use thiserror::Error;

/// A defect in the entity declarations that prevents building the model.
///
/// Every variant aborts the whole build: there is no partial model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("column of table '{table}' has an empty property chain")]
    EmptyColumnChain { table: String },

    #[error("unsupported column type '{type_name}' for property '{property}' of '{owner}'")]
    UnsupportedColumnType {
        owner: String,
        property: String,
        type_name: String,
    },

    #[error("property '{property}' of '{owner}': arrays are not supported")]
    UnsupportedArray { owner: String, property: String },

    #[error("index on '{table}' references column '{column}' which does not exist")]
    IndexColumnNotFound { table: String, column: String },

    #[error("conflicting definitions for index '{index}' on '{table}'")]
    ConflictingIndex { table: String, index: String },

    #[error("'{type_name}' is used as an entity but declares no PrimaryKey property")]
    MissingPrimaryKey { type_name: String },

    #[error("'{type_name}' is catalogued but is neither a table nor a view")]
    NotAnEntity { type_name: String },

    #[error("no query registered for view '{view}'")]
    ViewQueryNotFound { view: String },

    #[error("property '{property}' of '{owner}' relates to view '{view}'; relations must target tables")]
    RelationToView {
        owner: String,
        property: String,
        view: String,
    },

    #[error("view '{view}' declares multi-valued relation '{property}'")]
    ManyToManyInView { view: String, property: String },

    #[error("inlined object '{type_name}' contains itself (via '{owner}')")]
    RecursiveInlinedObject { owner: String, type_name: String },

    #[error("base type chain of '{type_name}' is cyclic")]
    CyclicBaseType { type_name: String },

    #[error("table '{table}' has more than one column named '{column}'")]
    DuplicateColumn { table: String, column: String },

    #[error("'{first}' and '{second}' both map to {schema}.{name}")]
    DuplicateObject {
        schema: String,
        name: String,
        first: String,
        second: String,
    },
}
