use serde::Serialize;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("backend is not configured")]
    NotConfigured,

    #[error("table \"{0}\" does not exist")]
    MissingTable(String),

    #[error("backend error ({status}): {message}")]
    Backend {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    General(String),
}

impl AppError {
    /// Absent configuration and absent schema both fall back to an empty
    /// dataset instead of a user-facing failure.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::NotConfigured | Self::MissingTable(_))
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
