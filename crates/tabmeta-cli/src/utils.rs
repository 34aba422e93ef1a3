//! Shared utilities

use tabmeta_agent::DatasetMetadata;

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// Plain-text listing of generated metadata
pub fn render_text(metadata: &DatasetMetadata) -> String {
    let mut out = format!("Dataset: {}\n{}\n", metadata.name, metadata.description);
    for column in &metadata.columns {
        let tags: Vec<&str> = column.tags.iter().map(|t| t.as_str()).collect();
        out.push_str(&format!(
            "\n{} ({})\n  Description: {}\n  Sensitivity: {}\n  Tags: {}\n  Analysis: {}\n",
            column.name,
            column.data_type,
            column.description,
            column.sensitivity,
            if tags.is_empty() {
                "-".to_string()
            } else {
                tags.join(", ")
            },
            column.analysis
        ));
    }
    out
}
