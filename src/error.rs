use thiserror::Error;

/// Rejections produced by intake validation, before any extraction call
/// is made. Each variant maps to one input contract violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("row must be between 1 and 10")]
    OutOfRange,
    #[error("column must be one or two letters")]
    BadFormat,
    #[error("side must be 'front' or 'back'")]
    BadEnum,
    #[error("image data could not be decoded")]
    UndecodableImage,
}

/// Error type for the extraction, storage, and batch-scan paths.
///
/// Per-line parse failures never surface here: the parser records them
/// as sentinel rows so a single bad line cannot abort its batch.
/// Authorization failures on update/delete deliberately collapse into
/// `NotFound` so record existence is not leaked across owners.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("record not found")]
    NotFound,
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("csv output error: {0}")]
    Csv(#[from] csv::Error),
}
