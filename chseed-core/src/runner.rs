//! No-versioning schema runner.
//!
//! Applies every `*.sql` file directly inside a directory, in lexical
//! filename order, on every invocation. No version table is read or written:
//! re-running is safe only because the statements themselves are idempotent
//! (`CREATE TABLE IF NOT EXISTS ...`).
//!
//! Files may use goose-style annotations:
//!
//! ```sql
//! -- +goose Up
//! -- +goose StatementBegin
//! CREATE FUNCTION IF NOT EXISTS ... ;
//! -- +goose StatementEnd
//! -- +goose Down
//! DROP FUNCTION ...;
//! ```
//!
//! Only the Up section is applied. A file without annotations is treated as
//! one Up section.

use crate::client::ClickHouseClient;
use crate::error::SeedError;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, info};

/// Applies a materialized schema directory.
#[async_trait]
pub trait SchemaRunner: Send + Sync {
    /// Applies every schema file under `dir` once.
    ///
    /// # Errors
    /// Returns an error naming the file that could not be applied.
    async fn apply(&self, dir: &Path) -> crate::Result<()>;
}

/// Lists top-level regular `.sql` files in `dir`, sorted by name.
///
/// # Errors
/// Returns an I/O error if the directory cannot be read.
pub fn list_sql_files(dir: &Path) -> crate::Result<Vec<String>> {
    let entries = std::fs::read_dir(dir).map_err(|e| SeedError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SeedError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| SeedError::io(entry.path(), e))?;
        if file_type.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str()
            && name.ends_with(".sql")
        {
            files.push(name.to_string());
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Up,
    Down,
}

/// Splits one schema file into the statements of its Up section.
///
/// Outside `StatementBegin`/`StatementEnd` blocks a statement ends on a line
/// whose code ends with `;`, ignoring a trailing `--` comment. Statements consisting only of comments
/// and whitespace are dropped.
///
/// # Errors
/// Returns a description of the problem for unbalanced statement blocks.
pub fn parse_statements(content: &str) -> Result<Vec<String>, String> {
    let annotated = content.lines().any(|line| annotation(line).is_some());
    let mut section = if annotated { None } else { Some(Section::Up) };
    let mut in_block = false;
    let mut buffer = String::new();
    let mut statements = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index.saturating_add(1);
        if let Some(command) = annotation(line) {
            match command {
                "Up" => {
                    flush(&mut buffer, section, &mut statements);
                    section = Some(Section::Up);
                }
                "Down" => {
                    flush(&mut buffer, section, &mut statements);
                    section = Some(Section::Down);
                }
                "StatementBegin" => {
                    if in_block {
                        return Err(format!("line {line_no}: nested StatementBegin"));
                    }
                    flush(&mut buffer, section, &mut statements);
                    in_block = true;
                }
                "StatementEnd" => {
                    if !in_block {
                        return Err(format!("line {line_no}: StatementEnd without StatementBegin"));
                    }
                    in_block = false;
                    flush(&mut buffer, section, &mut statements);
                }
                // Other directives (e.g. NO TRANSACTION) do not affect splitting
                _ => {}
            }
            continue;
        }

        buffer.push_str(line);
        buffer.push('\n');

        if !in_block && ends_statement(line) {
            flush(&mut buffer, section, &mut statements);
        }
    }

    if in_block {
        return Err("StatementBegin without StatementEnd".to_string());
    }
    flush(&mut buffer, section, &mut statements);
    Ok(statements)
}

/// Whether `line` closes a statement: its code, with any trailing `--`
/// comment removed, ends with `;`.
fn ends_statement(line: &str) -> bool {
    strip_line_comment(line).trim_end().ends_with(';')
}

/// Text before the first `--` that is not inside a quoted literal.
fn strip_line_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0usize;
    while let Some(&byte) = bytes.get(i) {
        match quote {
            // Skip the escaped byte
            Some(_) if byte == b'\\' => i = i.saturating_add(1),
            Some(q) if byte == q => quote = None,
            Some(_) => {}
            None if matches!(byte, b'\'' | b'"' | b'`') => quote = Some(byte),
            None if byte == b'-' && bytes.get(i.saturating_add(1)) == Some(&b'-') => {
                return &line[..i];
            }
            None => {}
        }
        i = i.saturating_add(1);
    }
    line
}

/// `-- +goose <command>` lines.
fn annotation(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("--")?.trim_start();
    let command = rest.strip_prefix("+goose")?;
    Some(command.trim())
}

fn flush(buffer: &mut String, section: Option<Section>, statements: &mut Vec<String>) {
    let statement = std::mem::take(buffer);
    if section != Some(Section::Up) || is_blank(&statement) {
        return;
    }
    statements.push(statement.trim().to_string());
}

fn is_blank(sql: &str) -> bool {
    sql.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with("--")
    })
}

/// Runs schema files through a [`ClickHouseClient`], one statement at a time.
pub struct SqlDirRunner<C> {
    client: C,
}

impl<C: ClickHouseClient> SqlDirRunner<C> {
    /// Creates a runner that executes statements through `client`.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    async fn apply_file(&self, dir: &Path, name: &str) -> crate::Result<usize> {
        let path = dir.join(name);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| SeedError::apply_failed(name, "cannot read file", e))?;

        let statements =
            parse_statements(&content).map_err(|reason| SeedError::apply(name, reason))?;

        for (index, statement) in statements.iter().enumerate() {
            self.client.execute(statement).await.map_err(|e| {
                SeedError::apply_failed(
                    name,
                    format!("statement {} of {}", index.saturating_add(1), statements.len()),
                    e,
                )
            })?;
        }
        Ok(statements.len())
    }
}

#[async_trait]
impl<C: ClickHouseClient> SchemaRunner for SqlDirRunner<C> {
    async fn apply(&self, dir: &Path) -> crate::Result<()> {
        let files = list_sql_files(dir)
            .map_err(|e| SeedError::apply_failed(dir.display().to_string(), "cannot list schema files", e))?;

        let mut total = 0usize;
        for name in &files {
            let applied = self.apply_file(dir, name).await?;
            debug!("Applied {} ({} statements)", name, applied);
            total = total.saturating_add(applied);
        }

        info!("Applied {} statements from {} files", total, files.len());
        Ok(())
    }
}
