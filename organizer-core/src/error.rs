use thiserror::Error;

/// Top-level error type for the ingestion pipeline.
///
/// Component-specific errors ([`AnalyserError`], [`CatalogueError`],
/// [`LinkError`]) convert into this via `#[from]`; the status manager
/// flattens whichever variant it receives into an [`ErrorKind`] plus a
/// short message before persisting it on the `MediaFile` row.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("analyser error: {0}")]
    Analyser(#[from] AnalyserError),

    #[error("catalogue error: {0}")]
    Catalogue(#[from] CatalogueError),

    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("invalid media file: {0}")]
    InvalidMedia(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, MediaError>;

/// Errors raised by the filename analyser client (§4.3).
#[derive(Error, Debug, Clone)]
pub enum AnalyserError {
    #[error("analyser request timed out")]
    Timeout,

    #[error("analyser network error: {0}")]
    Network(String),

    #[error("analyser returned server error: status {0}")]
    ServerError(u16),

    #[error("analyser response failed schema validation: {0}")]
    SchemaViolation(String),
}

impl AnalyserError {
    /// Transient errors are eligible for the retry helper; schema
    /// violations are permanent analyser failures (spec §4.3).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalyserError::Timeout | AnalyserError::Network(_) | AnalyserError::ServerError(_)
        )
    }
}

/// Errors raised by the catalogue client (§4.4).
#[derive(Error, Debug, Clone)]
pub enum CatalogueError {
    #[error("catalogue request timed out")]
    Timeout,

    #[error("catalogue network error: {0}")]
    Network(String),

    #[error("catalogue rate limited")]
    RateLimited,

    #[error("catalogue returned server error: status {0}")]
    ServerError(u16),

    #[error("catalogue returned client error: status {0}")]
    ClientError(u16),
}

impl CatalogueError {
    /// HTTP 4xx other than 429 are permanent; everything else (network,
    /// timeout, 5xx, 429) is retried (spec §4.4, §7).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CatalogueError::ClientError(_))
    }
}

/// Errors raised by the linker (§4.6), one variant per outcome.
#[derive(Error, Debug, Clone)]
pub enum LinkError {
    #[error("source file does not exist or is not a regular file")]
    NoSource,

    #[error("destination already exists")]
    Conflict,

    #[error("source and destination are on different filesystems")]
    CrossDevice,

    #[error("filesystem error: {0}")]
    Unknown(String),
}

/// The taxonomy tag persisted alongside `error_message` (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    AnalyserTransient,
    AnalyserPermanent,
    CatalogueTransient,
    CataloguePermanent,
    NoMatch,
    PathInsufficient,
    LinkConflict,
    LinkCrossDevice,
    LinkMissingSource,
    LinkUnknown,
    Cancelled,
}

impl ErrorKind {
    /// Whether a user-initiated retry is meaningful for this kind
    /// (spec §7's Retry eligible column).
    pub fn retry_eligible(&self) -> bool {
        !matches!(self, ErrorKind::LinkCrossDevice | ErrorKind::LinkMissingSource)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::AnalyserTransient => "analyser_transient",
            ErrorKind::AnalyserPermanent => "analyser_permanent",
            ErrorKind::CatalogueTransient => "catalogue_transient",
            ErrorKind::CataloguePermanent => "catalogue_permanent",
            ErrorKind::NoMatch => "no_match",
            ErrorKind::PathInsufficient => "path_insufficient",
            ErrorKind::LinkConflict => "link_conflict",
            ErrorKind::LinkCrossDevice => "link_cross_device",
            ErrorKind::LinkMissingSource => "link_missing_source",
            ErrorKind::LinkUnknown => "link_unknown",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}
