use chrono::{DateTime, Utc};

const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Human-readable size using 1024 steps and at most two decimals.
pub fn format_file_size(bytes: i64) -> String {
    if bytes <= 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}

/// Bucket key for an upload: `{owner}/{folder}/{millis}_{name}`, with the
/// folder segment left out at the root.
pub fn storage_path(owner_id: &str, folder_path: &str, name: &str, at: DateTime<Utc>) -> String {
    let stamp = at.timestamp_millis();
    let folder = folder_path.trim_matches('/');
    if folder.is_empty() {
        format!("{owner_id}/{stamp}_{name}")
    } else {
        format!("{owner_id}/{folder}/{stamp}_{name}")
    }
}

/// Joins a folder path and a child name the way folder rows store them.
pub fn child_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_matches('/');
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_file_size(1_234_567_890), "1.15 GB");
        assert_eq!(format_file_size(3 * 1024 * 1024 * 1024 * 1024), "3072 GB");
    }

    #[test]
    fn storage_path_skips_empty_folder() {
        let at: DateTime<Utc> = "2025-01-01T00:00:00Z".parse().unwrap();
        assert_eq!(
            storage_path("u1", "", "a.txt", at),
            "u1/1735689600000_a.txt"
        );
        assert_eq!(
            storage_path("u1", "Docs/Sub", "a.txt", at),
            "u1/Docs/Sub/1735689600000_a.txt"
        );
    }

    #[test]
    fn child_paths() {
        assert_eq!(child_path("", "Docs"), "Docs");
        assert_eq!(child_path("Docs/", "Sub"), "Docs/Sub");
    }
}
