pub mod config;
pub mod data;
pub mod error;
pub mod format;
pub mod models;
pub mod services;
pub mod state;

pub use config::BackendConfig;
pub use data::gateway::{ListQuery, PutOptions, RemoteGateway};
pub use error::{AppError, Result};
pub use models::item::{Item, ItemField, ItemKind, Table};
pub use models::session::Session;
pub use models::view::ListingView;
pub use services::listing_service::{ListingController, RefreshSignal};
pub use services::mutation_service::{MutationOutcome, PendingMutation, RetentionPolicy};

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "scarlet_drive=info";

/// Installs the fmt subscriber, filtered by `RUST_LOG` when set. Safe to
/// call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
