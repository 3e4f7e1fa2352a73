use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure inside the search library: open, write, commit, rollback,
    /// close or search.
    #[error("index I/O error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("query syntax error: {message}")]
    QuerySyntax { message: String },

    #[error("invalid entity value: {0}")]
    InvalidEntityValue(String),

    #[error("text index is closed")]
    Closed,

    #[error("text index is open read-only")]
    ReadOnly,

    #[error("invalid entity definition: {0}")]
    Definition(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::QuerySyntax {
            message: message.into(),
        }
    }
}
