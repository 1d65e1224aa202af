use crate::config::ConfigError;
use crate::solver::SortError;
use relmap_schema::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid model: {0}")]
    Model(#[from] ModelError),

    #[error("cannot plan migration: {0}")]
    Sort(#[from] SortError),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("column {schema}.{table}.{column} has unsupported type '{type_name}'")]
    UnsupportedCatalogType {
        schema: String,
        table: String,
        column: String,
        type_name: String,
    },

    #[error("expected a connection to database '{expected}', connected to '{connected}'")]
    WrongDatabase { expected: String, connected: String },
}
