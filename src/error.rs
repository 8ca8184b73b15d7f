use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for loading and analysis operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Load mode recorded on [`crate::load::TableMeta`] and in load errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Entire sheet loaded verbatim as all-text columns.
    Raw,
    /// Override-driven transformation chain applied.
    Assisted,
}

impl std::fmt::Display for LoadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadMode::Raw => write!(f, "RAW"),
            LoadMode::Assisted => write!(f, "ASSISTED"),
        }
    }
}

/// Error type shared across grid reading, structure analysis, and loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Workbook parsing error from the spreadsheet reader.
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),

    /// Delimited-text parsing error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The requested sheet does not exist in the workbook.
    #[error("sheet '{sheet}' not found in {}", .file.display())]
    SheetNotFound { file: PathBuf, sheet: String },

    /// A cell range spec could not be parsed as A1 notation.
    #[error("invalid range spec '{spec}' (expected A1 notation, e.g. 'A1:F100')")]
    InvalidRange { spec: String },

    /// File extension maps to no known reader.
    #[error("unsupported format '{extension}' for {}", .file.display())]
    UnsupportedFormat { file: PathBuf, extension: String },

    /// An include/exclude glob in a load configuration failed to compile.
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// A single (file, sheet[, region]) load exhausted all fallbacks.
    ///
    /// One of these per failed load call; carries a remediation suggestion
    /// pattern-matched from the underlying error text.
    #[error("failed to load {}:{sheet}{} in {mode} mode: {message}{suggestion}", .file.display(), .region.map(|r| format!(" (region {r})")).unwrap_or_default())]
    Load {
        file: PathBuf,
        sheet: String,
        region: Option<usize>,
        mode: LoadMode,
        message: String,
        suggestion: String,
    },
}

impl LoadError {
    /// Wrap an underlying error as a fatal-per-call load failure, attaching
    /// a remediation suggestion derived from the error text.
    pub(crate) fn load_failure(
        file: impl Into<PathBuf>,
        sheet: &str,
        region: Option<usize>,
        mode: LoadMode,
        source: &LoadError,
    ) -> Self {
        let message = source.to_string();
        LoadError::Load {
            file: file.into(),
            sheet: sheet.to_string(),
            region,
            mode,
            suggestion: suggestion_for(&message, mode),
            message,
        }
    }
}

/// Build a remediation suggestion from an error message.
///
/// The goal is to point at the override field most likely to fix the
/// problem, not to diagnose it precisely.
pub(crate) fn suggestion_for(message: &str, mode: LoadMode) -> String {
    let lower = message.to_lowercase();
    let mut suggestions: Vec<&str> = Vec::new();

    if lower.contains("column") && lower.contains("mismatch") {
        suggestions.push("Try adding 'skip_rows' to skip header rows");
        suggestions.push("Or use 'drop_regex' to filter problematic rows");
    }
    if lower.contains("header") || lower.contains("column name") {
        suggestions.push("Consider 'header_rows: 0' or 'header_rows: 2' to adjust header handling");
        suggestions.push("Use 'column_renames' to fix column names");
    }
    if lower.contains("row") && (lower.contains("empty") || lower.contains("null")) {
        suggestions.push("Use 'skip_footer' to remove trailing empty rows");
        suggestions.push("Or 'drop_regex' to filter specific rows");
    }
    if lower.contains("type") || lower.contains("convert") || lower.contains("cast") {
        suggestions.push("Use 'type_hints' to specify column types explicitly");
        suggestions.push("Consider loading in RAW mode first to inspect the data");
    }
    if lower.contains("range") {
        suggestions.push("Check that 'range' uses valid A1 notation (e.g. 'A1:F100')");
    }
    if mode == LoadMode::Raw && suggestions.is_empty() {
        suggestions.push("Try ASSISTED mode with overrides to handle messy data");
        suggestions.push("Use 'skip_rows' and 'skip_footer' to exclude problematic rows");
    }

    if suggestions.is_empty() {
        String::new()
    } else {
        format!("\n\nSuggestions:\n- {}", suggestions.join("\n- "))
    }
}

#[cfg(test)]
mod tests {
    use super::{suggestion_for, LoadMode};

    #[test]
    fn cast_errors_suggest_type_hints() {
        let s = suggestion_for("could not cast 'abc' to DOUBLE", LoadMode::Assisted);
        assert!(s.contains("type_hints"));
    }

    #[test]
    fn column_mismatch_suggests_skip_rows() {
        let s = suggestion_for("column count mismatch: expected 4, got 6", LoadMode::Assisted);
        assert!(s.contains("skip_rows"));
    }

    #[test]
    fn raw_mode_always_gets_a_suggestion() {
        let s = suggestion_for("something opaque happened", LoadMode::Raw);
        assert!(s.contains("ASSISTED mode"));
    }
}
