//! SQL for the listing screens and for paged row fetches.
//!
//! Navigation identifiers (schema, table) are quoted before interpolation.
//! WHERE and ORDER BY fragments are raw SQL typed by the user and go in as
//! written; the read-only transaction bounds what they can do. Limits and
//! offsets are always bound parameters.

use crate::error::{BurrowError, Result};
use crate::models::{ListEntry, RowSet, SqlParam, Statement, TableInfo};
use crate::navigation::{AdHocQuery, RowsQuerySpec};

/// Non-template databases, by name.
pub fn list_databases() -> Statement {
    Statement::new(
        r#"
        SELECT datname AS name
        FROM pg_catalog.pg_database
        WHERE datistemplate = false
        ORDER BY datname
        "#,
    )
}

/// All schemas visible to the user, by name.
pub fn list_schemas() -> Statement {
    Statement::new(
        r#"
        SELECT schema_name::text AS name
        FROM information_schema.schemata
        ORDER BY schema_name
        "#,
    )
}

/// Ordinary tables of a schema with their estimated row counts.
pub fn list_tables(schema: &str) -> Statement {
    Statement::new(
        r#"
        SELECT
            c.relname AS name,
            GREATEST(c.reltuples, 0)::bigint AS estimated_rows
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
          AND c.relkind = 'r'
        ORDER BY c.relname
        "#,
    )
    .bind(SqlParam::Text(schema.to_string()))
}

/// One row if the relation exists, none otherwise.
pub fn relation_exists(schema: &str, table: &str) -> Statement {
    Statement::new(
        r#"
        SELECT c.relname AS name
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1
          AND c.relname = $2
          AND c.relkind IN ('r', 'v', 'm', 'p', 'f')
        "#,
    )
    .bind(SqlParam::Text(schema.to_string()))
    .bind(SqlParam::Text(table.to_string()))
}

/// One page of a table, fetching a single look-ahead row past the page.
pub fn rows_page(spec: &RowsQuerySpec) -> Result<Statement> {
    let mut sql = format!(
        "SELECT * FROM {}.{}",
        quote_identifier(&spec.schema)?,
        quote_identifier(&spec.table)?
    );
    if let Some(clause) = spec.where_clause.as_deref() {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    if let Some(clause) = spec.order_by.as_deref() {
        sql.push_str(" ORDER BY ");
        sql.push_str(clause);
    }
    sql.push_str(" LIMIT $1 OFFSET $2");

    Ok(Statement::new(sql)
        .bind(SqlParam::Int(lookahead_limit(spec.page_size)?))
        .bind(SqlParam::Int(spec.offset()?)))
}

/// One page of an ad-hoc query, fetching a single look-ahead row.
pub fn adhoc_page(query: &AdHocQuery) -> Result<Statement> {
    let body = normalize_query_text(&query.sql);
    if body.is_empty() {
        return Err(BurrowError::invalid_argument("Query text is empty"));
    }
    let sql = format!("SELECT * FROM ({body}\n) AS query_result LIMIT $1 OFFSET $2");
    Ok(Statement::new(sql)
        .bind(SqlParam::Int(lookahead_limit(query.page_size)?))
        .bind(SqlParam::Int(query.offset()?)))
}

/// LIMIT for a page plus its look-ahead row.
fn lookahead_limit(page_size: usize) -> Result<i64> {
    i64::try_from(page_size)
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| BurrowError::invalid_argument(format!("Page size {page_size} is too large")))
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_identifier(identifier: &str) -> Result<String> {
    if identifier.is_empty() {
        return Err(BurrowError::invalid_argument("Identifier must not be empty"));
    }
    if identifier.contains('\0') {
        return Err(BurrowError::invalid_argument("Identifier must not contain NUL"));
    }
    Ok(format!("\"{}\"", identifier.replace('"', "\"\"")))
}

/// Strip surrounding comments and trailing semicolons so the text can be
/// wrapped as a subquery.
pub fn normalize_query_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let body = strip_trailing_comments(strip_leading_comments(trimmed)).trim_end();

    // Semicolons followed only by line comments end the statement too.
    let mut body: String = body
        .char_indices()
        .filter(|(i, c)| !(*c == ';' && only_line_comments(&body[i + 1..])))
        .map(|(_, c)| c)
        .collect();
    while body.ends_with(';') {
        body.pop();
        body.truncate(body.trim_end().len());
    }
    body.truncate(body.trim_end().len());
    body
}

fn only_line_comments(mut text: &str) -> bool {
    loop {
        text = text.trim_start();
        if text.is_empty() {
            return true;
        }
        match text.strip_prefix("--") {
            Some(rest) => match rest.find('\n') {
                Some(newline) => text = &rest[newline + 1..],
                None => return true,
            },
            None => return false,
        }
    }
}

fn strip_leading_comments(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        if let Some(rest) = text.strip_prefix("--") {
            match rest.find('\n') {
                Some(newline) => text = &rest[newline + 1..],
                None => return "",
            }
        } else if let Some(rest) = text.strip_prefix("/*") {
            match rest.find("*/") {
                Some(end) => text = &rest[end + 2..],
                None => return "",
            }
        } else {
            return text;
        }
    }
}

fn strip_trailing_comments(mut text: &str) -> &str {
    loop {
        text = text.trim_end();
        if text.ends_with("*/") {
            match text.rfind("/*") {
                Some(start) => {
                    text = &text[..start];
                    continue;
                }
                None => return text,
            }
        }
        let line_start = text.rfind('\n').map(|i| i + 1).unwrap_or(0);
        if !text[line_start..].trim_start().starts_with("--") {
            return text;
        }
        text = &text[..line_start.saturating_sub(1)];
    }
}

/// Names from a listing result.
pub fn entries_from_names(set: &RowSet) -> Vec<ListEntry> {
    set.rows
        .iter()
        .filter_map(|row| row.first().cloned().flatten())
        .map(ListEntry::new)
        .collect()
}

/// Tables from a `list_tables` result.
pub fn tables_from(set: &RowSet, schema: &str) -> Vec<TableInfo> {
    (0..set.row_count())
        .filter_map(|i| {
            let name = set.value(i, "name")?.to_string();
            let estimated_rows =
                set.value(i, "estimated_rows").and_then(|v| v.parse().ok()).unwrap_or(0);
            Some(TableInfo { schema: schema.to_string(), name, estimated_rows })
        })
        .collect()
}
