//! Macro substitution over a tree of schema files.
//!
//! The schema directory is copied into a process-private temporary directory
//! with `${DATABASE}` and `${TABLES_TTL}` replaced in every regular file.
//! Directory structure is preserved and files without macros are copied byte
//! for byte. The copy is owned by a [`MaterializedSchema`] and removed when it
//! is dropped, whichever way the run ends.

use crate::error::SeedError;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

/// Placeholder replaced with the target database name.
pub const DATABASE_MACRO: &str = "${DATABASE}";

/// Placeholder replaced with the retention interval literal.
pub const TABLES_TTL_MACRO: &str = "${TABLES_TTL}";

/// Values substituted into the schema files.
#[derive(Debug, Clone, Copy)]
pub struct Macros<'a> {
    pub database: &'a str,
    pub tables_ttl: &'a str,
}

impl Macros<'_> {
    /// Replaces every macro occurrence in `content`.
    ///
    /// Works on raw bytes so non-UTF-8 content passes through untouched. The
    /// input is scanned once, so substituted values are never expanded again.
    pub fn apply(&self, content: &[u8]) -> Vec<u8> {
        let table = [
            (DATABASE_MACRO.as_bytes(), self.database.as_bytes()),
            (TABLES_TTL_MACRO.as_bytes(), self.tables_ttl.as_bytes()),
        ];

        let mut out = Vec::with_capacity(content.len());
        let mut rest = content;
        while let Some(pos) = rest.iter().position(|&byte| byte == b'$') {
            let (literal, candidate) = rest.split_at(pos);
            out.extend_from_slice(literal);

            match table
                .iter()
                .find(|(name, _)| candidate.starts_with(name))
            {
                Some((name, value)) => {
                    out.extend_from_slice(value);
                    rest = candidate.get(name.len()..).unwrap_or_default();
                }
                None => {
                    out.push(b'$');
                    rest = candidate.get(1..).unwrap_or_default();
                }
            }
        }
        out.extend_from_slice(rest);
        out
    }
}

/// A macro-substituted copy of the schema directory.
#[derive(Debug)]
pub struct MaterializedSchema {
    dir: TempDir,
    files: usize,
}

impl MaterializedSchema {
    /// Root of the materialized tree.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Number of files written.
    pub fn file_count(&self) -> usize {
        self.files
    }

    /// Removes the tree now, reporting any failure.
    ///
    /// Dropping the value also removes it, silently.
    pub fn close(self) -> crate::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| SeedError::io(path, e))
    }
}

/// Copies `schema_dir` into a fresh temporary directory, applying `macros`
/// to every file.
///
/// # Errors
/// Returns a template error if the source tree cannot be walked or any file
/// cannot be read or written. The partial copy is removed before returning.
pub fn materialize(schema_dir: &Path, macros: &Macros<'_>) -> crate::Result<MaterializedSchema> {
    let dir = tempfile::Builder::new()
        .prefix("schema-")
        .tempdir()
        .map_err(|e| SeedError::template("failed to create temp directory", e))?;

    let mut files = 0usize;
    for entry in WalkDir::new(schema_dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| schema_dir.to_path_buf());
            SeedError::template(
                format!("failed to walk {}", path.display()),
                io::Error::from(e),
            )
        })?;

        let relative = entry
            .path()
            .strip_prefix(schema_dir)
            .map_err(|e| SeedError::template("failed to resolve relative path", io::Error::other(e)))?;
        let dest: PathBuf = dir.path().join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| {
                SeedError::template(format!("failed to create directory {}", dest.display()), e)
            })?;
            continue;
        }
        if !entry.file_type().is_file() {
            debug!("Skipping non-regular file {}", entry.path().display());
            continue;
        }

        let content = std::fs::read(entry.path()).map_err(|e| {
            SeedError::template(format!("failed to read file {}", entry.path().display()), e)
        })?;
        std::fs::write(&dest, macros.apply(&content)).map_err(|e| {
            SeedError::template(format!("failed to write file {}", dest.display()), e)
        })?;
        files = files.saturating_add(1);
    }

    debug!("Materialized {} schema files into {}", files, dir.path().display());
    Ok(MaterializedSchema { dir, files })
}
