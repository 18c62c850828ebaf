use crate::core::csv_io::{read_table, write_records, write_rejections};
use crate::core::duplicates::partition_duplicates;
use crate::utils::error::{CleanError, Result};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupeSummary {
    pub total: usize,
    pub unique: usize,
    pub duplicates: usize,
}

/// Whole-file duplicate removal, run before splitting so that duplicates
/// spread across future chunks are still caught.
///
/// Unique rows go to `valid_output`; later duplicates go to
/// `duplicates_output` with a `reason` column.
pub fn dedupe_file(
    input: &Path,
    valid_output: &Path,
    duplicates_output: &Path,
    source_delimiter: u8,
    output_delimiter: u8,
    key_columns: &[String],
) -> Result<DedupeSummary> {
    let table = read_table(input, source_delimiter)?;
    if let Some(missing) = key_columns.iter().find(|c| !table.schema.contains(c)) {
        return Err(CleanError::Schema {
            column: missing.clone(),
        });
    }

    let total = table.records.len();
    let (unique, duplicates) = partition_duplicates(table.records, key_columns)?;

    write_records(valid_output, output_delimiter, Some(&*table.schema), &unique).map_err(
        |source| CleanError::OutputWrite {
            path: valid_output.to_path_buf(),
            source,
        },
    )?;
    write_rejections(
        duplicates_output,
        output_delimiter,
        Some(&*table.schema),
        &duplicates,
    )
    .map_err(|source| CleanError::OutputWrite {
        path: duplicates_output.to_path_buf(),
        source,
    })?;

    let summary = DedupeSummary {
        total,
        unique: unique.len(),
        duplicates: duplicates.len(),
    };
    tracing::info!(
        "🧹 Duplicate removal complete for '{}': {} rows, {} unique, {} duplicates",
        input.display(),
        summary.total,
        summary.unique,
        summary.duplicates
    );
    Ok(summary)
}
