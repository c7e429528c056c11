use thiserror::Error;

#[derive(Error, Debug)]
pub enum VntlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("path escapes workspace: {0}")]
    PathEscape(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("file is not UTF-8 text: {0}")]
    NotUtf8Decodable(String),

    #[error("{path} is {size} bytes, limit is {limit}")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("nothing to process: {0}")]
    EmptySource(String),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("job is busy: {0}")]
    JobBusy(String),

    #[error("transformation failed: {0}")]
    TransformationFailed(String),
}

impl VntlError {
    /// Stable machine-readable code, used by the HTTP surface.
    pub fn code(&self) -> &'static str {
        match self {
            VntlError::Io(_) => "io",
            VntlError::Zip(_) => "zip",
            VntlError::JobNotFound(_) => "job_not_found",
            VntlError::PathEscape(_) => "path_escape",
            VntlError::NotAFile(_) => "not_a_file",
            VntlError::NotUtf8Decodable(_) => "not_utf8_decodable",
            VntlError::TooLarge { .. } => "too_large",
            VntlError::CorruptArchive(_) => "corrupt_archive",
            VntlError::InvalidParams(_) => "invalid_params",
            VntlError::EmptySource(_) => "empty_source",
            VntlError::SourceNotFound(_) => "source_not_found",
            VntlError::AlreadyExists(_) => "already_exists",
            VntlError::JobBusy(_) => "job_busy",
            VntlError::TransformationFailed(_) => "transformation_failed",
        }
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        VntlError::CorruptArchive(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        VntlError::InvalidParams(msg.into())
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, VntlError>;
