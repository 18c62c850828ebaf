#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::core::aggregator::{DEFAULT_CHUNK_EXTENSION, DEFAULT_WORKERS};
use crate::core::csv_io::{parent_dir, same_path};
use crate::core::ConfigProvider;
use crate::domain::model::Rule;
use crate::utils::error::{CleanError, Result};
use crate::utils::validation::{
    validate_column_list, validate_delimiter, validate_non_empty_string, validate_path, validate_positive_number,
    validate_range, validate_required_field, Validate,
};
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_ROWS_PER_CHUNK: usize = 1_000_000;
pub const MAX_WORKERS: usize = 256;

/// Everything a run needs, already resolved to concrete values.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanSettings {
    /// Raw file to dedupe and split. `None` means the chunks already exist.
    pub source_file: Option<PathBuf>,
    pub source_delimiter: u8,
    /// Delimiter of chunk files and every file this crate writes.
    pub delimiter: u8,
    /// Whole-file dedupe keys, applied before splitting. Empty disables the stage.
    pub dedupe_key_columns: Vec<String>,
    pub dedupe_valid_output: Option<PathBuf>,
    pub dedupe_duplicates_output: Option<PathBuf>,
    pub chunk_directory: PathBuf,
    pub max_rows_per_chunk: usize,
    pub chunk_extension: String,
    pub email_column: Option<String>,
    pub date_columns: Vec<String>,
    pub unparseable_date: String,
    /// In-chunk dedupe keys, applied after the per-record rules.
    pub chunk_dedupe_key_columns: Vec<String>,
    pub valid_output: PathBuf,
    pub error_output: PathBuf,
    pub valid_directory: Option<PathBuf>,
    pub error_directory: Option<PathBuf>,
    pub workers: usize,
}

impl Default for CleanSettings {
    fn default() -> Self {
        Self {
            source_file: None,
            source_delimiter: b',',
            delimiter: b',',
            dedupe_key_columns: Vec::new(),
            dedupe_valid_output: None,
            dedupe_duplicates_output: None,
            chunk_directory: PathBuf::from("./chunks"),
            max_rows_per_chunk: DEFAULT_MAX_ROWS_PER_CHUNK,
            chunk_extension: DEFAULT_CHUNK_EXTENSION.to_string(),
            email_column: Some("mail_address".to_string()),
            date_columns: vec!["created_at".to_string()],
            unparseable_date: String::new(),
            chunk_dedupe_key_columns: Vec::new(),
            valid_output: PathBuf::from("clean.csv"),
            error_output: PathBuf::from("errors.csv"),
            valid_directory: None,
            error_directory: None,
            workers: DEFAULT_WORKERS,
        }
    }
}

impl CleanSettings {
    /// 規則順序：email 驗證 → 日期截斷 → chunk 內去重
    pub fn build_rules(&self) -> Vec<Rule> {
        let mut rules = Vec::new();
        if let Some(column) = &self.email_column {
            rules.push(Rule::ValidateEmail {
                column: column.clone(),
            });
        }
        if !self.date_columns.is_empty() {
            rules.push(Rule::TruncateDates {
                columns: self.date_columns.clone(),
                unparseable: self.unparseable_date.clone(),
            });
        }
        if !self.chunk_dedupe_key_columns.is_empty() {
            rules.push(Rule::Deduplicate {
                key_columns: self.chunk_dedupe_key_columns.clone(),
            });
        }
        rules
    }

    pub fn dedupe_enabled(&self) -> bool {
        !self.dedupe_key_columns.is_empty()
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Validate for CleanSettings {
    fn validate(&self) -> Result<()> {
        if let Some(source) = &self.source_file {
            validate_path("source.path", &path_str(source))?;
        }
        validate_path("split.chunk_directory", &path_str(&self.chunk_directory))?;
        validate_path("output.valid_path", &path_str(&self.valid_output))?;
        validate_path("output.error_path", &path_str(&self.error_output))?;
        validate_positive_number("split.max_rows_per_chunk", self.max_rows_per_chunk, 1)?;
        validate_range("performance.workers", self.workers, 1, MAX_WORKERS)?;
        validate_non_empty_string("split.extension", &self.chunk_extension)?;

        for (field, delimiter) in [
            ("source.delimiter", self.source_delimiter),
            ("split.delimiter", self.delimiter),
        ] {
            validate_delimiter(field, delimiter as char)?;
        }

        if let Some(column) = &self.email_column {
            validate_non_empty_string("validation.email_column", column)?;
        }
        validate_column_list("validation.date_columns", &self.date_columns)?;
        validate_column_list("validation.dedupe_key_columns", &self.chunk_dedupe_key_columns)?;
        validate_column_list("dedupe.key_columns", &self.dedupe_key_columns)?;

        if self.dedupe_enabled() {
            validate_required_field("source.path", &self.source_file)?;
            let valid = validate_required_field("dedupe.valid_output", &self.dedupe_valid_output)?;
            validate_required_field("dedupe.duplicates_output", &self.dedupe_duplicates_output)?;
            // 去重結果若放在 chunk 資料夾裡會被當成 chunk 讀進來
            if same_path(parent_dir(valid), &self.chunk_directory) {
                return Err(CleanError::ConfigValidationError {
                    field: "dedupe.valid_output".to_string(),
                    message: "must not be written inside the chunk directory".to_string(),
                });
            }
        }

        // 合併輸出若放在 chunk 資料夾裡，下次執行會被當成 chunk
        for (field, output) in [
            ("output.valid_path", &self.valid_output),
            ("output.error_path", &self.error_output),
        ] {
            if same_path(parent_dir(output), &self.chunk_directory) {
                return Err(CleanError::ConfigValidationError {
                    field: field.to_string(),
                    message: "must not be written inside the chunk directory".to_string(),
                });
            }
        }

        if self.valid_directory.is_some() != self.error_directory.is_some() {
            return Err(CleanError::ConfigValidationError {
                field: "output".to_string(),
                message: "valid_directory and error_directory must be set together".to_string(),
            });
        }

        Ok(())
    }
}

impl ConfigProvider for CleanSettings {
    fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    fn source_delimiter(&self) -> u8 {
        self.source_delimiter
    }

    fn delimiter(&self) -> u8 {
        self.delimiter
    }

    fn dedupe_key_columns(&self) -> &[String] {
        &self.dedupe_key_columns
    }

    fn dedupe_valid_output(&self) -> Option<&Path> {
        self.dedupe_valid_output.as_deref()
    }

    fn dedupe_duplicates_output(&self) -> Option<&Path> {
        self.dedupe_duplicates_output.as_deref()
    }

    fn chunk_directory(&self) -> &Path {
        &self.chunk_directory
    }

    fn max_rows_per_chunk(&self) -> usize {
        self.max_rows_per_chunk
    }

    fn chunk_extension(&self) -> &str {
        &self.chunk_extension
    }

    fn valid_output(&self) -> &Path {
        &self.valid_output
    }

    fn error_output(&self) -> &Path {
        &self.error_output
    }

    fn valid_directory(&self) -> Option<&Path> {
        self.valid_directory.as_deref()
    }

    fn error_directory(&self) -> Option<&Path> {
        self.error_directory.as_deref()
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn rules(&self) -> Vec<Rule> {
        self.build_rules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let rules = CleanSettings::default().build_rules();
        assert_eq!(
            rules,
            vec![
                Rule::ValidateEmail {
                    column: "mail_address".to_string()
                },
                Rule::TruncateDates {
                    columns: vec!["created_at".to_string()],
                    unparseable: String::new(),
                },
            ]
        );
    }

    #[test]
    fn test_in_chunk_dedupe_runs_last() {
        let settings = CleanSettings {
            chunk_dedupe_key_columns: vec!["login_id".to_string()],
            ..CleanSettings::default()
        };
        let rules = settings.build_rules();
        assert_eq!(rules.last().map(Rule::name), Some("deduplicate"));
    }

    #[test]
    fn test_validate_defaults() {
        assert!(CleanSettings::default().validate().is_ok());
    }

    #[test]
    fn test_dedupe_requires_outputs() {
        let settings = CleanSettings {
            source_file: Some(PathBuf::from("raw.csv")),
            dedupe_key_columns: vec!["login_id".to_string()],
            ..CleanSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CleanError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_rejects_merged_output_inside_chunk_directory() {
        let settings = CleanSettings {
            chunk_directory: PathBuf::from("chunks"),
            valid_output: PathBuf::from("./chunks/clean.csv"),
            ..CleanSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CleanError::ConfigValidationError { ref field, .. }) if field == "output.valid_path"
        ));

        let settings = CleanSettings {
            chunk_directory: PathBuf::from("."),
            error_output: PathBuf::from("errors.csv"),
            valid_output: PathBuf::from("out/clean.csv"),
            ..CleanSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CleanError::ConfigValidationError { ref field, .. }) if field == "output.error_path"
        ));
    }

    #[test]
    fn test_rejects_zero_workers_and_bad_delimiter() {
        let zero = CleanSettings {
            workers: 0,
            ..CleanSettings::default()
        };
        assert!(zero.validate().is_err());

        let quote = CleanSettings {
            delimiter: b'"',
            ..CleanSettings::default()
        };
        assert!(quote.validate().is_err());
    }
}
