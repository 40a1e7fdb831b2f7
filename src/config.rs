use std::path::PathBuf;
use std::sync::Arc;

use crate::data::gateway::{RemoteGateway, UnconfiguredGateway};
use crate::data::local::LocalGateway;
use crate::data::rest::RestGateway;
use crate::error::Result;

pub const ENV_URL: &str = "SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_BUCKET: &str = "SCARLET_DRIVE_BUCKET";
pub const ENV_LOCAL_DB: &str = "SCARLET_DRIVE_DB";

pub const DEFAULT_BUCKET: &str = "scarlet-drives";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestConfig {
    pub url: String,
    pub anon_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Remote(RestConfig),
    Local { db_path: PathBuf },
    /// No backend at all; listings come back empty.
    Unconfigured,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration from any key/value source. Blank values count
    /// as absent. A remote backend wins over a local database path.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let (Some(url), Some(anon_key)) = (get(ENV_URL), get(ENV_ANON_KEY)) {
            return Self::Remote(RestConfig {
                url: url.trim_end_matches('/').to_string(),
                anon_key,
                bucket: get(ENV_BUCKET).unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            });
        }

        match get(ENV_LOCAL_DB) {
            Some(path) => Self::Local {
                db_path: PathBuf::from(path),
            },
            None => Self::Unconfigured,
        }
    }

    /// Local database under the platform data directory, for offline use.
    pub fn local_default() -> Option<Self> {
        default_local_db_path().map(|db_path| Self::Local { db_path })
    }

    pub fn connect(&self) -> Result<Arc<dyn RemoteGateway>> {
        let gateway: Arc<dyn RemoteGateway> = match self {
            Self::Remote(config) => {
                tracing::info!(url = %config.url, bucket = %config.bucket, "using remote backend");
                Arc::new(RestGateway::new(config.clone())?)
            }
            Self::Local { db_path } => {
                tracing::info!(path = %db_path.display(), "using local backend");
                if let Some(parent) = db_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Arc::new(LocalGateway::open(db_path)?)
            }
            Self::Unconfigured => {
                tracing::warn!("no backend configured; listings will be empty");
                Arc::new(UnconfiguredGateway)
            }
        };
        Ok(gateway)
    }
}

pub fn default_local_db_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "scarlet-drive")
        .map(|dirs| dirs.data_dir().join("scarlet-drive.db"))
}
