use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::AppError;

/// Relative storage path for an uploaded file:
/// `tenant{id}/{kind}/{yyyymmdd}/{uuid}{ext}`.
/// The returned string is the opaque reference stored on ledger rows.
pub fn build_relative_path(
    tenant_id: i64,
    kind: &str,
    date: NaiveDate,
    original_name: &str,
) -> String {
    let kind = sanitize_component(kind, "misc");
    let date_str = date.format("%Y%m%d").to_string();
    let ext = Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    format!(
        "tenant{tenant_id}/{kind}/{date_str}/{}{ext}",
        uuid::Uuid::new_v4()
    )
}

/// Write bytes under the uploads root, creating parent directories.
/// Returns the relative reference passed in, for storage.
pub async fn store_file(
    uploads_dir: &str,
    relative_path: &str,
    bytes: &[u8],
) -> Result<String, AppError> {
    let full_path: PathBuf = Path::new(uploads_dir).join(relative_path);
    if let Some(parent) = full_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|error| AppError::Internal(format!("Could not create upload dir: {error}")))?;
    }
    tokio::fs::write(&full_path, bytes)
        .await
        .map_err(|error| AppError::Internal(format!("Could not store upload: {error}")))?;
    Ok(relative_path.to_string())
}

fn sanitize_component(raw: &str, fallback: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-')
        .collect();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
    }

    #[test]
    fn path_layout_matches_tenant_kind_date() {
        let path = build_relative_path(7, "rent", date(2026, 8, 6), "receipt.PNG");
        assert!(path.starts_with("tenant7/rent/20260806/"));
        assert!(path.ends_with(".png"));
    }

    #[test]
    fn extension_is_optional() {
        let path = build_relative_path(7, "rent", date(2026, 8, 6), "receipt");
        assert!(!path.contains('.'));
    }

    #[test]
    fn kind_is_sanitized() {
        let path = build_relative_path(3, "../evil type!", date(2026, 1, 2), "a.jpg");
        assert!(path.starts_with("tenant3/eviltype/20260102/"));
    }

    #[test]
    fn empty_kind_falls_back() {
        let path = build_relative_path(3, "  ", date(2026, 1, 2), "a.jpg");
        assert!(path.starts_with("tenant3/misc/"));
    }
}
