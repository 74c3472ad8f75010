//! `notxread`: a source check for SQLite write transactions.
//!
//! SQLite serialises writers, so a read issued through the pool while a
//! write transaction is open either sees stale data or waits on the very
//! transaction that issued it. Inside a `writer.begin()` scope every read
//! must go through the transaction, either directly (`.fetch_one(&mut *tx)`)
//! or through a repository bound to it (`repo.tx(&mut tx).get_workspace(..)`).
//!
//! The check is syntactic. A transaction opens at
//! `let tx = <..>.writer.begin()` and closes at `tx.commit()`,
//! `tx.rollback()` or the end of the enclosing block. While it is open:
//!
//! - an awaited read whose receiver never mentions the transaction is an
//!   [`FindingKind::UnboundRead`]. Reads are `get_*`/`list_*`/`find_*`/
//!   `load_*`/`count_*`/`read_*`/`*_exists`/`*_rows` calls plus the exact
//!   names in [`LintConfig::read_methods`];
//! - a sqlx `fetch*`/`execute` whose executor never mentions the
//!   transaction is a [`FindingKind::PoolQuery`].

mod analyzer;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::analyzer::TxReadVisitor;

#[derive(Debug, thiserror::Error)]
pub enum LintError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: parse error: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },
}

/// Names the check treats as transaction plumbing.
#[derive(Debug, Clone)]
pub struct LintConfig {
    /// Receivers whose `.begin()` opens a write transaction
    /// (`self.pool.writer.begin()`).
    pub writer_names: Vec<String>,
    /// Read methods whose names carry no read prefix.
    pub read_methods: Vec<String>,
}

/// Reads in the storage layer's query handles that the prefix rules miss.
pub const DEFAULT_READ_METHODS: [&str; 22] = [
    "get",
    "list",
    "entry",
    "workspace",
    "workspace_of",
    "endpoint",
    "flow",
    "base",
    "effective",
    "member_role",
    "active_environment",
    "state_row",
    "delta_fields",
    "ordered_ids",
    "parent_of",
    "item_for",
    "is_within",
    "existing_id",
    "seeded",
    "missing_origins",
    "assert_order",
    "env_of_variable",
];

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            writer_names: vec!["writer".to_string()],
            read_methods: DEFAULT_READ_METHODS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingKind {
    /// A repository read that is not bound to the open transaction.
    UnboundRead { method: String },
    /// A query executed on a pool while a transaction is open.
    PoolQuery { method: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub function: String,
    /// Binding name of the open transaction.
    pub transaction: String,
    /// Line of the `begin()` that opened it.
    pub opened_at: usize,
    #[serde(flatten)]
    pub kind: FindingKind,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: notxread: ", self.file, self.line, self.column)?;
        match &self.kind {
            FindingKind::UnboundRead { method } => write!(
                f,
                "`{method}` in `{}` reads outside transaction `{}` (opened at line {}); bind the repository with `.tx(&mut {})`",
                self.function, self.transaction, self.opened_at, self.transaction
            ),
            FindingKind::PoolQuery { method } => write!(
                f,
                "`{method}` in `{}` runs on a pool while transaction `{}` is open (opened at line {}); pass `&mut *{}`",
                self.function, self.transaction, self.opened_at, self.transaction
            ),
        }
    }
}

/// Check one source file. `path` only labels the findings.
pub fn check_source(path: &str, source: &str, config: &LintConfig) -> Result<Vec<Finding>, LintError> {
    let file = syn::parse_file(source).map_err(|e| LintError::Parse {
        path: path.to_string(),
        line: e.span().start().line,
        message: e.to_string(),
    })?;
    let mut visitor = TxReadVisitor::new(path, config);
    syn::visit::Visit::visit_file(&mut visitor, &file);
    Ok(visitor.into_findings())
}

/// Check every `.rs` file under `paths`, skipping `target` and hidden
/// directories. Findings come back ordered by file then line.
pub fn check_paths(paths: &[PathBuf], config: &LintConfig) -> Result<Vec<Finding>, LintError> {
    let mut files = Vec::new();
    for path in paths {
        collect_sources(path, &mut files)?;
    }
    files.sort();
    files.dedup();

    let mut findings = Vec::new();
    for file in files {
        let source = std::fs::read_to_string(&file).map_err(|source| LintError::Io {
            path: file.clone(),
            source,
        })?;
        findings.extend(check_source(&file.display().to_string(), &source, config)?);
    }
    Ok(findings)
}

fn collect_sources(path: &Path, out: &mut Vec<PathBuf>) -> Result<(), LintError> {
    let io_err = |source| LintError::Io {
        path: path.to_path_buf(),
        source,
    };
    let meta = std::fs::metadata(path).map_err(io_err)?;
    if meta.is_file() {
        if path.extension().is_some_and(|ext| ext == "rs") {
            out.push(path.to_path_buf());
        }
        return Ok(());
    }

    for entry in std::fs::read_dir(path).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let child = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if child.is_dir() && (name == "target" || name.starts_with('.')) {
            continue;
        }
        collect_sources(&child, out)?;
    }
    Ok(())
}
