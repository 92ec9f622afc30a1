use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parse { message: String },

    #[error("Scraping error: {0}")]
    Scraping(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Already exists: {resource}")]
    AlreadyExists { resource: String },

    #[error("Listing is closed: {link}")]
    ListingClosed { link: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    pub fn already_exists(resource: impl Into<String>) -> Self {
        Self::AlreadyExists { resource: resource.into() }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

impl From<lettre::error::Error> for AppError {
    fn from(err: lettre::error::Error) -> Self {
        AppError::Email(err.to_string())
    }
}

impl From<lettre::address::AddressError> for AppError {
    fn from(err: lettre::address::AddressError) -> Self {
        AppError::Email(format!("invalid address: {}", err))
    }
}

impl From<lettre::transport::smtp::Error> for AppError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        AppError::Email(err.to_string())
    }
}

/// Failures of a monitoring run, one variant per containment level.
///
/// Only [`MonitorError::AlreadyRunning`] and [`MonitorError::ListAdsFailed`]
/// are ever returned from `Monitor::try_run`. The rest are scoped to a single
/// ad or recipient and are only logged and counted in the run report.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("monitoring run already in progress")]
    AlreadyRunning,

    #[error("failed to list ads for monitoring: {0}")]
    ListAdsFailed(#[source] AppError),

    #[error("fetch failed for ad {ad_id}: {source}")]
    FetchFailed {
        ad_id: String,
        #[source]
        source: AppError,
    },

    #[error("persistence failed for ad {ad_id}: {source}")]
    PersistenceFailed {
        ad_id: String,
        #[source]
        source: AppError,
    },

    #[error("notification to {receiver} failed: {source}")]
    NotificationFailed {
        receiver: String,
        #[source]
        source: AppError,
    },

    #[error("batched last-checked update failed: {0}")]
    BatchUpdateFailed(#[source] AppError),
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
