use crate::core::csv_io::read_table;
use crate::core::duplicates::split_by_key;
use crate::core::validator::{truncate_date_columns, validate_email};
use crate::domain::model::{
    ChunkResult, ChunkStatus, Record, Rejection, Rule, Schema, ValidationOutcome, DUPLICATE_KEY,
};
use crate::utils::error::{CleanError, Result};
use std::path::Path;

/// Applies an ordered rule list to one chunk file at a time.
///
/// A record rejected by one rule is not seen by later rules and keeps the
/// first reason it was given. Valid and error rows both keep chunk order.
#[derive(Debug, Clone)]
pub struct ChunkProcessor {
    rules: Vec<Rule>,
    delimiter: u8,
}

impl ChunkProcessor {
    pub fn new(rules: Vec<Rule>, delimiter: u8) -> Self {
        Self { rules, delimiter }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Never fails: read and rule errors come back as a `Failed` result with
    /// no valid or error rows.
    pub fn process(&self, chunk_file: &Path) -> ChunkResult {
        let table = match read_table(chunk_file, self.delimiter) {
            Ok(table) => table,
            Err(failure) => {
                tracing::debug!(
                    "Chunk '{}' unreadable ({} rows lost): {}",
                    chunk_file.display(),
                    failure.rows_read,
                    failure.error
                );
                return ChunkResult::failed(
                    chunk_file.to_path_buf(),
                    failure.rows_read,
                    failure.error.to_string(),
                );
            }
        };

        let records_read = table.records.len();
        let outcome = self
            .check_schema(&table.schema)
            .and_then(|()| self.apply(table.records));

        match outcome {
            Ok((valid, errors)) => ChunkResult {
                path: chunk_file.to_path_buf(),
                schema: Some(table.schema),
                valid,
                errors,
                records_read,
                status: ChunkStatus::Succeeded,
            },
            Err(e) => ChunkResult::failed(chunk_file.to_path_buf(), records_read, e.to_string()),
        }
    }

    /// Dedup keys must exist in the header even when the chunk has no rows.
    fn check_schema(&self, schema: &Schema) -> Result<()> {
        for rule in &self.rules {
            if let Rule::Deduplicate { key_columns } = rule {
                if let Some(missing) = key_columns.iter().find(|c| !schema.contains(c)) {
                    return Err(CleanError::Schema {
                        column: missing.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Runs every rule over an in-memory record set.
    pub fn apply(&self, records: Vec<Record>) -> Result<(Vec<Record>, Vec<Rejection>)> {
        let mut survivors: Vec<(usize, Record)> = records.into_iter().enumerate().collect();
        let mut rejected: Vec<(usize, Rejection)> = Vec::new();

        for rule in &self.rules {
            survivors = match rule {
                Rule::ValidateEmail { column } => {
                    // 先分類，再分流；不在迭代中刪除
                    let outcomes: Vec<(usize, ValidationOutcome)> = survivors
                        .into_iter()
                        .map(|(i, record)| (i, validate_email(record, column)))
                        .collect();
                    let mut kept = Vec::with_capacity(outcomes.len());
                    for (i, outcome) in outcomes {
                        match outcome {
                            ValidationOutcome::Accepted(record) => kept.push((i, record)),
                            ValidationOutcome::Rejected(rejection) => rejected.push((i, rejection)),
                        }
                    }
                    kept
                }
                Rule::TruncateDates {
                    columns,
                    unparseable,
                } => survivors
                    .into_iter()
                    .map(|(i, record)| (i, truncate_date_columns(record, columns, unparseable)))
                    .collect(),
                Rule::Deduplicate { key_columns } => {
                    let (unique, duplicates) =
                        split_by_key(survivors, key_columns, |(_, record)| record)?;
                    rejected.extend(
                        duplicates
                            .into_iter()
                            .map(|(i, record)| (i, Rejection::new(record, DUPLICATE_KEY))),
                    );
                    unique
                }
            };
        }

        rejected.sort_by_key(|(i, _)| *i);
        Ok((
            survivors.into_iter().map(|(_, record)| record).collect(),
            rejected.into_iter().map(|(_, rejection)| rejection).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::INVALID_EMAIL;
    use std::fs;
    use tempfile::TempDir;

    fn email_then_dates() -> Vec<Rule> {
        vec![
            Rule::ValidateEmail {
                column: "mail_address".to_string(),
            },
            Rule::TruncateDates {
                columns: vec!["created_at".to_string()],
                unparseable: String::new(),
            },
        ]
    }

    fn write_chunk(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_process_splits_valid_and_errors() {
        let dir = TempDir::new().unwrap();
        let path = write_chunk(
            &dir,
            "chunk_1.csv",
            "login_id,mail_address,created_at\n\
             a,a@example.com,2023-05-01 14:32:00\n\
             b,broken,2023-05-02 10:00:00\n\
             c,c@example.org,not a date\n",
        );

        let result = ChunkProcessor::new(email_then_dates(), b',').process(&path);
        assert!(result.is_success());
        assert_eq!(result.records_read, 3);
        assert_eq!(result.valid.len(), 2);
        assert_eq!(result.valid[0].get("created_at"), Some("2023-05-01"));
        assert_eq!(result.valid[1].get("created_at"), Some(""));

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].reason, INVALID_EMAIL);
        // 被拒絕的資料不會再經過日期規則
        assert_eq!(result.errors[0].record.get("created_at"), Some("2023-05-02 10:00:00"));
    }

    #[test]
    fn test_first_rejection_reason_wins_and_order_is_kept() {
        let mut rules = email_then_dates();
        rules.push(Rule::Deduplicate {
            key_columns: vec!["login_id".to_string()],
        });
        let processor = ChunkProcessor::new(rules, b',');

        let records = vec![
            Record::from_pairs([("login_id", "a"), ("mail_address", "a@example.com"), ("created_at", "")]),
            Record::from_pairs([("login_id", "a"), ("mail_address", "bad"), ("created_at", "")]),
            Record::from_pairs([("login_id", "b"), ("mail_address", "b@example.com"), ("created_at", "")]),
            Record::from_pairs([("login_id", "a"), ("mail_address", "a2@example.com"), ("created_at", "")]),
            Record::from_pairs([("login_id", "c"), ("mail_address", "nope"), ("created_at", "")]),
        ];

        let (valid, errors) = processor.apply(records).unwrap();
        let valid_ids: Vec<&str> = valid.iter().filter_map(|r| r.get("login_id")).collect();
        assert_eq!(valid_ids, vec!["a", "b"]);

        let reasons: Vec<(&str, &str)> = errors
            .iter()
            .map(|e| (e.record.get("mail_address").unwrap(), e.reason.as_str()))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("bad", INVALID_EMAIL),
                ("a2@example.com", DUPLICATE_KEY),
                ("nope", INVALID_EMAIL),
            ]
        );
    }

    #[test]
    fn test_corrupted_chunk_fails_without_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_chunk(
            &dir,
            "chunk_2.csv",
            "login_id,mail_address,created_at\na,a@example.com,2023-05-01\nb,b@example.com\nc,c@example.com,2023-05-03\n",
        );

        let result = ChunkProcessor::new(email_then_dates(), b',').process(&path);
        assert!(matches!(result.status, ChunkStatus::Failed(_)));
        assert!(result.valid.is_empty());
        assert!(result.errors.is_empty());
        assert_eq!(result.records_read, 3);
    }

    #[test]
    fn test_invalid_utf8_chunk_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunk_3.csv");
        fs::write(&path, b"login_id,mail_address\nx,\xff\xfe@example.com\n").unwrap();

        let result = ChunkProcessor::new(email_then_dates(), b',').process(&path);
        assert!(!result.is_success());
    }

    #[test]
    fn test_missing_dedup_column_fails_chunk() {
        let dir = TempDir::new().unwrap();
        let path = write_chunk(&dir, "chunk_1.csv", "mail_address\na@example.com\n");
        let processor = ChunkProcessor::new(
            vec![Rule::Deduplicate {
                key_columns: vec!["login_id".to_string()],
            }],
            b',',
        );

        let result = processor.process(&path);
        match result.status {
            ChunkStatus::Failed(detail) => assert!(detail.contains("login_id")),
            ChunkStatus::Succeeded => panic!("expected failure"),
        }
        assert_eq!(result.records_read, 1);
    }
}
