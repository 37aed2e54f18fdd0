//! Shared helper functions for SQL dialect implementations.
//!
//! Reusable building blocks that dialects compose to implement the
//! `SqlDialect` trait with minimal duplication.

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, SQLite
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

// =============================================================================
// Placeholder Numbering
// =============================================================================

/// Rewrite `?` placeholders into numbered `$1..$n` form.
///
/// Filter snippets and statement builders always emit `?`; dialects that
/// bind positionally by number (Postgres) renumber in one pass at
/// statement-finalization time. Descriptor SQL expressions are validated
/// not to contain a literal `?`, so a bare scan is sufficient.
pub fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0u32;
    for ch in sql.chars() {
        if ch == '?' {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(ch);
        }
    }
    out
}
