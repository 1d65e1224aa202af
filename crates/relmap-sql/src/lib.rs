//! SQL text helpers shared by the relmap crates.
//!
//! Quoting, qualified names, the index naming convention and query text
//! normalization. Nothing in here knows about entities or snapshots.

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use relmap_sql::Ident;
/// assert_eq!(format!("{}", Ident("Blog")), "\"Blog\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes: entity and property names are PascalCase and must keep
/// their case on the server.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Quote a schema-qualified object name.
///
/// ```
/// assert_eq!(relmap_sql::qualified_name("blogging", "Blog"), "\"blogging\".\"Blog\"");
/// ```
pub fn qualified_name(schema: &str, name: &str) -> String {
    format!("{}.{}", Ident(schema), Ident(name))
}

/// Generate the index name for a table and its columns.
///
/// The convention is `{table}__{col1}_{col2}...` with the columns sorted by
/// name, so the same column set always yields the same name regardless of the
/// order it was declared in.
///
/// # Examples
///
/// ```
/// assert_eq!(relmap_sql::index_name("Blog", &["Title"]), "Blog__Title");
/// assert_eq!(relmap_sql::index_name("Blog_Post", &["Right", "Left"]), "Blog_Post__Left_Right");
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    let mut cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    cols.sort_unstable();
    format!("{}__{}", table, cols.join("_"))
}

/// Normalize SQL text for comparison.
///
/// Collapses runs of whitespace into a single space, lowercases everything
/// outside of quoted literals and identifiers, and strips trailing semicolons.
/// Two queries that differ only in layout or keyword case normalize to the
/// same string.
///
/// ```
/// assert_eq!(
///     relmap_sql::normalize_sql("SELECT  \"Title\"\n  FROM x;"),
///     relmap_sql::normalize_sql("select \"Title\" from X"),
/// );
/// ```
pub fn normalize_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;

    let mut in_single_quote = false;
    let mut in_double_quote = false;

    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_single_quote {
            out.push(ch);
            if ch == '\'' {
                // SQL escapes single quotes by doubling them: ''
                if let Some(next) = chars.next_if_eq(&'\'') {
                    out.push(next);
                } else {
                    in_single_quote = false;
                }
            }
            continue;
        }

        if in_double_quote {
            out.push(ch);
            if ch == '"' {
                // SQL escapes double quotes in identifiers by doubling them: ""
                if let Some(next) = chars.next_if_eq(&'"') {
                    out.push(next);
                } else {
                    in_double_quote = false;
                }
            }
            continue;
        }

        match ch {
            '\'' | '"' => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push(ch);
                if ch == '\'' {
                    in_single_quote = true;
                } else {
                    in_double_quote = true;
                }
            }
            c if c.is_whitespace() => {
                pending_space = true;
            }
            c => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.extend(c.to_lowercase());
            }
        }
    }

    let trimmed = out.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("PrimaryKey"), "\"PrimaryKey\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_index_name_is_order_independent() {
        assert_eq!(
            index_name("Setting", &["Value_Type", "Key", "Value_Assembly"]),
            index_name("Setting", &["Value_Assembly", "Value_Type", "Key"])
        );
        assert_eq!(
            index_name("Setting", &["Value_Type", "Key"]),
            "Setting__Key_Value_Type"
        );
    }

    #[test]
    fn test_normalize_keeps_quoted_text() {
        assert_eq!(
            normalize_sql("SELECT 'Hello  World' AS \"Greeting\";"),
            "select 'Hello  World' as \"Greeting\""
        );
    }

    #[test]
    fn test_normalize_handles_doubled_quotes() {
        assert_eq!(normalize_sql("SELECT 'it''s'  ;; "), "select 'it''s'");
        assert_eq!(normalize_sql("\"a\"\"B\"  X"), "\"a\"\"B\" x");
    }
}
