use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

pub const INVALID_EMAIL: &str = "invalid_email";
pub const DUPLICATE_KEY: &str = "duplicate_key";
pub const REASON_COLUMN: &str = "reason";

/// Column names declared by a file's header row, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.index_of(column).is_some()
    }
}

/// One row of a file: an ordered column-name → value mapping.
///
/// The schema is shared by every record read from the same file, so the
/// column set is fixed per file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    schema: Arc<Schema>,
    values: Vec<String>,
}

impl Record {
    /// `values` must line up with `schema`; short rows are padded with empty values.
    pub fn new(schema: Arc<Schema>, mut values: Vec<String>) -> Self {
        values.resize(schema.len(), String::new());
        Self { schema, values }
    }

    /// 測試與小工具用：直接由 (欄位, 值) 建立
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let (columns, values): (Vec<String>, Vec<String>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(Arc::new(Schema::new(columns)), values)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.schema
            .index_of(column)
            .map(|i| self.values[i].as_str())
    }

    /// Replaces the value of an existing column. Returns `false` when the column is absent.
    pub fn set(&mut self, column: &str, value: impl Into<String>) -> bool {
        match self.schema.index_of(column) {
            Some(i) => {
                self.values[i] = value.into();
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub record: Record,
    pub reason: String,
}

impl Rejection {
    pub fn new(record: Record, reason: impl Into<String>) -> Self {
        Self {
            record,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted(Record),
    Rejected(Rejection),
}

impl ValidationOutcome {
    pub fn rejected(record: Record, reason: impl Into<String>) -> Self {
        ValidationOutcome::Rejected(Rejection::new(record, reason))
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationOutcome::Accepted(_) => None,
            ValidationOutcome::Rejected(r) => Some(&r.reason),
        }
    }
}

/// One step of chunk processing. Steps run in list order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    ValidateEmail { column: String },
    TruncateDates { columns: Vec<String>, unparseable: String },
    Deduplicate { key_columns: Vec<String> },
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Rule::ValidateEmail { .. } => "validate_email",
            Rule::TruncateDates { .. } => "truncate_dates",
            Rule::Deduplicate { .. } => "deduplicate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkStatus {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub path: PathBuf,
    pub schema: Option<Arc<Schema>>,
    pub valid: Vec<Record>,
    pub errors: Vec<Rejection>,
    /// Data rows in the chunk; for a failed chunk these are the records it loses.
    pub records_read: usize,
    pub status: ChunkStatus,
}

impl ChunkResult {
    pub fn failed(path: PathBuf, records_read: usize, detail: impl Into<String>) -> Self {
        Self {
            path,
            schema: None,
            valid: Vec::new(),
            errors: Vec::new(),
            records_read,
            status: ChunkStatus::Failed(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ChunkStatus::Succeeded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunEvent {
    pub severity: Severity,
    pub path: Option<PathBuf>,
    pub message: String,
}

impl RunEvent {
    pub fn new(severity: Severity, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            severity,
            path,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub detail: String,
    pub records_lost: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub files_processed: usize,
    pub files_failed: usize,
    pub failed_files: Vec<FailedFile>,
    pub total_valid: usize,
    pub total_errors: usize,
    pub records_lost: usize,
    pub valid_output: Option<PathBuf>,
    pub error_output: Option<PathBuf>,
    pub log: Vec<RunEvent>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_failures(&self) -> bool {
        self.files_failed > 0
    }

    /// valid + errors + lost：所有讀到的輸入筆數
    pub fn total_records(&self) -> usize {
        self.total_valid + self.total_errors + self.records_lost
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} files processed, {} failed, {} valid records, {} error records",
            self.files_processed, self.files_failed, self.total_valid, self.total_errors
        );
        if self.records_lost > 0 {
            line.push_str(&format!(", {} records lost", self.records_lost));
        }
        if !self.failed_files.is_empty() {
            let names: Vec<String> = self
                .failed_files
                .iter()
                .map(|f| f.path.display().to_string())
                .collect();
            line.push_str(&format!(" (failed: {})", names.join(", ")));
        }
        if let (Some(valid), Some(errors)) = (&self.valid_output, &self.error_output) {
            line.push_str(&format!(
                "; outputs: {}, {}",
                valid.display(),
                errors.display()
            ));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_get_and_set() {
        let mut record = Record::from_pairs([("id", "1"), ("created_at", "2023-05-01 14:32:00")]);
        assert_eq!(record.get("id"), Some("1"));
        assert_eq!(record.get("missing"), None);

        assert!(record.set("created_at", "2023-05-01"));
        assert!(!record.set("missing", "x"));
        assert_eq!(record.values(), &["1".to_string(), "2023-05-01".to_string()]);
    }

    #[test]
    fn test_record_pads_short_rows() {
        let schema = Arc::new(Schema::new(vec!["a".into(), "b".into(), "c".into()]));
        let record = Record::new(schema, vec!["1".into()]);
        assert_eq!(record.get("c"), Some(""));
    }

    #[test]
    fn test_report_summary_names_failed_files() {
        let mut report = RunReport::new();
        report.files_processed = 3;
        report.files_failed = 1;
        report.total_valid = 10;
        report.total_errors = 2;
        report.records_lost = 4;
        report.failed_files.push(FailedFile {
            path: PathBuf::from("chunks/chunk_2.csv"),
            detail: "bad row".to_string(),
            records_lost: 4,
        });

        let summary = report.summary();
        assert!(summary.contains("3 files processed, 1 failed"));
        assert!(summary.contains("chunks/chunk_2.csv"));
        assert_eq!(report.total_records(), 16);
    }
}
