use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const EXPORT_CONTENT_TYPE: &str = "application/json";

static TIMESTAMP_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[:.]").expect("valid regex"));

/// A document ready to be saved or downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedDocument {
    pub file_name: String,
    pub content: String,
    pub content_type: &'static str,
}

impl ExportedDocument {
    pub fn write_into(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.content)?;
        Ok(path)
    }
}

/// `calm-architecture-<timestamp>.json`, with the ISO 8601 timestamp's `:`
/// and `.` removed so the name is valid on every filesystem.
pub fn export_file_name(at: DateTime<Utc>) -> String {
    let iso = at.to_rfc3339_opts(SecondsFormat::Millis, true);
    format!(
        "calm-architecture-{}.json",
        TIMESTAMP_SEPARATORS.replace_all(&iso, "")
    )
}

pub fn export_document(document: &Value, at: DateTime<Utc>) -> ExportedDocument {
    let content = serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string());
    ExportedDocument {
        file_name: export_file_name(at),
        content,
        content_type: EXPORT_CONTENT_TYPE,
    }
}
