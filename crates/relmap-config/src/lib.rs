//! Configuration schema for relmap, read from `.config/relmap.styx`.
//!
//! ```styx
//! database myapp
//! ignored_schemas (public pg_catalog)
//! ```

use facet::Facet;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Facet)]
pub struct Config {
    /// Name of the database the code model describes.
    #[facet(default)]
    pub database: Option<String>,

    /// Schemas the comparator never drops. When empty, `public` is ignored.
    #[facet(default)]
    pub ignored_schemas: Vec<String>,
}

impl Config {
    /// The configured database name, or `fallback`.
    pub fn database_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.database.as_deref().unwrap_or(fallback)
    }
}
