use thiserror::Error;

/// Failures that abort an ingestion run before any row is processed.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unreadable source document: {0}")]
    UnreadableSource(String),
    #[error(
        "sheet '{requested}' not found (tried {}; available: {})",
        .tried.join(", "),
        .available.join(", ")
    )]
    SheetNotFound {
        requested: String,
        tried: Vec<String>,
        available: Vec<String>,
    },
    #[error(
        "no valid identifier column (candidates: {}; headers: {})",
        .candidates.join(", "),
        .headers.join(", ")
    )]
    NoIdColumn {
        candidates: Vec<String>,
        headers: Vec<String>,
    },
}

impl IngestError {
    /// Short machine-readable category for callers that branch on the cause.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::UnreadableSource(_) => "unreadable_source",
            IngestError::SheetNotFound { .. } => "sheet_not_found",
            IngestError::NoIdColumn { .. } => "no_id_column",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record '{0}' already exists")]
    Duplicate(String),
    #[error("record '{0}' does not exist")]
    Missing(String),
    #[error("column '{column}' holds an unexpected value: {detail}")]
    Decode { column: String, detail: String },
    #[error("{0}")]
    Rejected(String),
}
