//! SQL text helpers shared by backends and callers
//!
//! Provides:
//! - Statement normalisation (trailing terminators and whitespace)
//! - Count wrapping for row estimation
//! - Cursor statements (`DECLARE` / `FETCH` / `CLOSE`)
//! - Identifier validation for names interpolated into SQL

use crate::error::{Error, Result};

/// Strip surrounding whitespace and trailing `;` terminators so the statement
/// can be embedded as a subquery or cursor body.
pub fn normalize_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Wrap a query beneath a counting aggregate.
///
/// ```
/// use sluice_rdbc::sql::count_query;
///
/// assert_eq!(
///     count_query("SELECT id FROM users;"),
///     "SELECT COUNT(*) FROM (SELECT id FROM users) AS subquery"
/// );
/// ```
pub fn count_query(sql: &str) -> String {
    format!(
        "SELECT COUNT(*) FROM ({}) AS subquery",
        normalize_statement(sql)
    )
}

/// `DECLARE <name> NO SCROLL CURSOR FOR <query>`
pub fn declare_cursor(name: &str, sql: &str) -> Result<String> {
    validate_sql_identifier(name)?;
    let body = normalize_statement(sql);
    if body.is_empty() {
        return Err(Error::query("cannot declare a cursor for an empty statement"));
    }
    Ok(format!("DECLARE {} NO SCROLL CURSOR FOR {}", name, body))
}

/// `FETCH FORWARD <n> FROM <name>`
pub fn fetch_forward(name: &str, fetch_size: usize) -> Result<String> {
    validate_sql_identifier(name)?;
    if fetch_size == 0 {
        return Err(Error::config("fetch size must be at least 1"));
    }
    Ok(format!("FETCH FORWARD {} FROM {}", fetch_size, name))
}

/// `CLOSE <name>`
pub fn close_cursor(name: &str) -> Result<String> {
    validate_sql_identifier(name)?;
    Ok(format!("CLOSE {}", name))
}

/// Validate a SQL identifier (cursor, savepoint, table names).
///
/// - Must not be empty
/// - Maximum 255 characters
/// - Must start with ASCII letter or underscore
/// - May only contain ASCII alphanumeric characters and underscores
///
/// ```
/// use sluice_rdbc::sql::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("sluice_cursor").is_ok());
/// assert!(validate_sql_identifier("x; DROP TABLE users--").is_err());
/// assert!(validate_sql_identifier("").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::config("SQL identifier cannot be empty"));
    }

    if name.len() > 255 {
        return Err(Error::config(format!(
            "SQL identifier too long: {} chars (max 255)",
            name.len()
        )));
    }

    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => {
            return Err(Error::config(format!(
                "Invalid SQL identifier '{}': must start with a letter or underscore",
                name
            )));
        }
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(Error::config(format!(
                "Invalid SQL identifier '{}': contains invalid character '{}'",
                name, c
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_statement() {
        assert_eq!(normalize_statement("  SELECT 1 ;; \n"), "SELECT 1");
        assert_eq!(normalize_statement("SELECT ';'"), "SELECT ';'");
        assert_eq!(normalize_statement(" ; "), "");
    }

    #[test]
    fn test_count_query_wraps_subquery() {
        assert_eq!(
            count_query("SELECT * FROM orders WHERE total > 10"),
            "SELECT COUNT(*) FROM (SELECT * FROM orders WHERE total > 10) AS subquery"
        );
    }

    #[test]
    fn test_cursor_statements() {
        assert_eq!(
            declare_cursor("c1", "SELECT 1;").unwrap(),
            "DECLARE c1 NO SCROLL CURSOR FOR SELECT 1"
        );
        assert_eq!(fetch_forward("c1", 500).unwrap(), "FETCH FORWARD 500 FROM c1");
        assert_eq!(close_cursor("c1").unwrap(), "CLOSE c1");
    }

    #[test]
    fn test_cursor_statements_reject_bad_input() {
        assert!(declare_cursor("c1; DROP", "SELECT 1").is_err());
        assert!(declare_cursor("c1", "  ;").is_err());
        assert!(fetch_forward("c1", 0).is_err());
    }

    #[test]
    fn test_identifier_length_limit() {
        let long = "a".repeat(256);
        assert!(validate_sql_identifier(&long).is_err());
        assert!(validate_sql_identifier(&"a".repeat(255)).is_ok());
        assert!(validate_sql_identifier("123abc").is_err());
    }
}
