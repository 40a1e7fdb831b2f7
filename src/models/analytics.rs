use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LargestFile {
    pub name: String,
    pub size_bytes: i64,
    pub mime_type: String,
}

/// Dashboard statistics for one owner. Counts cover live items unless the
/// field says otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_files: usize,
    pub total_folders: usize,
    pub total_storage_bytes: i64,
    /// Live files created in the last seven days.
    pub recent_uploads: usize,
    pub starred_items: usize,
    pub shared_items: usize,
    /// Files and folders currently in the trash.
    pub deleted_items: usize,
    /// Rough growth percentage, capped at 100.
    pub storage_growth: u32,
    pub largest_files: Vec<LargestFile>,
}
