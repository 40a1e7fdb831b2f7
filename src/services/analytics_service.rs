use chrono::{DateTime, Duration, Utc};

use crate::data::gateway::{ListQuery, RemoteGateway};
use crate::models::analytics::{DashboardStats, LargestFile};
use crate::models::item::{Item, ItemKind};
use crate::models::session::Session;
use crate::services::mapper::fetch_items;

pub const RECENT_WINDOW_DAYS: i64 = 7;
pub const LARGEST_FILES: usize = 5;

pub fn compute_stats(items: &[Item], now: DateTime<Utc>) -> DashboardStats {
    let since = now - Duration::days(RECENT_WINDOW_DAYS);
    let (live, trashed): (Vec<&Item>, Vec<&Item>) = items.iter().partition(|item| !item.deleted);

    let mut files: Vec<&Item> = live.iter().copied().filter(|item| !item.is_folder()).collect();
    let recent_uploads = files.iter().filter(|file| file.created_at > since).count();

    files.sort_by_key(|file| std::cmp::Reverse(file.size_bytes().unwrap_or(0)));
    let largest_files = files
        .iter()
        .take(LARGEST_FILES)
        .filter_map(|file| match &file.kind {
            ItemKind::File {
                size_bytes,
                mime_type,
                ..
            } => Some(LargestFile {
                name: file.name.clone(),
                size_bytes: *size_bytes,
                mime_type: mime_type.clone().unwrap_or_else(|| "unknown".to_string()),
            }),
            ItemKind::Folder { .. } => None,
        })
        .collect();

    DashboardStats {
        total_files: files.len(),
        total_folders: live.len() - files.len(),
        total_storage_bytes: files.iter().filter_map(|file| file.size_bytes()).sum(),
        recent_uploads,
        starred_items: live.iter().filter(|item| item.starred).count(),
        shared_items: live.iter().filter(|item| item.shared).count(),
        deleted_items: trashed.len(),
        storage_growth: (recent_uploads as u32).saturating_mul(5).min(100),
        largest_files,
    }
}

/// Loads every row the owner has, live or trashed, and summarizes it. An
/// unreachable backend yields all-zero statistics.
pub async fn dashboard_stats(gateway: &dyn RemoteGateway, session: &Session) -> DashboardStats {
    let report = fetch_items(gateway, session, &ListQuery::default()).await;
    if !report.notices.is_empty() {
        tracing::debug!(notices = ?report.notices, "statistics computed from partial data");
    }
    compute_stats(&report.items, Utc::now())
}
