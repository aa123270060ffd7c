//! Error taxonomy for the migra core.

use thiserror::Error;

/// Result type alias for migra operations.
pub type MigraResult<T> = Result<T, MigraError>;

/// Errors returned by the migration graph, coordinator, and providers.
///
/// Each variant carries enough context (revision id, filename, or cycle/edge list) for a
/// caller to remediate without re-reading the source.
#[derive(Debug, Error)]
pub enum MigraError {
    /// Malformed or missing configuration options.
    #[error("config error: {0}")]
    Config(String),

    /// Unable to reach the database at startup.
    #[error("connect error: {0}")]
    Connect(String),

    /// A file in the migration directory cannot be parsed, is not `.sql`, or is a directory.
    #[error("invalid migration file {path}: {reason}")]
    InvalidMigrationFile { path: String, reason: String },

    /// The loaded graph contains a cycle.
    #[error("cycle detected: {}", format_cycle(.0))]
    CycleDetected(Vec<(String, String)>),

    /// The loaded graph has a node with multiple successors.
    #[error("divergent branch detected from {node} to ({})", .successors.join(", "))]
    DivergentBranch { node: String, successors: Vec<String> },

    /// More than one revision in the loaded set has no predecessor (§3 invariant 2).
    #[error("multiple roots found: ({})", .0.join(", "))]
    MultipleRoots(Vec<String>),

    /// A filtered upgrade sequence is not a contiguous chain from head, or a downgrade
    /// references a revision not present on disk.
    #[error("plan error: {0}")]
    Plan(String),

    /// The database rejected user-provided SQL.
    #[error("sql error on revision {revision_id}: {source}")]
    Sql {
        revision_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Filesystem read/write failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_cycle(cycle: &[(String, String)]) -> String {
    cycle
        .iter()
        .map(|(from, to)| format!("{from} -> {to}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl MigraError {
    pub fn invalid_file(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMigrationFile {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn plan(message: impl Into<String>) -> Self {
        Self::Plan(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect(message.into())
    }

    pub fn sql(revision_id: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Sql {
            revision_id: revision_id.into(),
            source: Box::new(source),
        }
    }

    /// True for divergence/cycle errors — the graph requires a linear chain to proceed.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Self::CycleDetected(_) | Self::DivergentBranch { .. } | Self::MultipleRoots(_)
        )
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for MigraError {
    fn from(err: tokio_postgres::Error) -> Self {
        Self::Connect(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<deadpool_postgres::PoolError> for MigraError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Connect(err.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for MigraError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Connect(err.to_string())
    }
}
