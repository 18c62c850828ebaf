use crate::core::csv_io::{list_chunk_files, reader_builder, same_path, writer_builder};
use crate::utils::error::{CleanError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CombineSummary {
    pub files_combined: usize,
    pub files_skipped: Vec<PathBuf>,
    pub rows: usize,
}

type ChunkRows = (csv::ByteRecord, Vec<csv::ByteRecord>);

fn read_chunk(path: &Path, delimiter: u8) -> std::result::Result<ChunkRows, String> {
    let mut reader = reader_builder(delimiter)
        .from_path(path)
        .map_err(|e| e.to_string())?;
    let header = reader.byte_headers().map_err(|e| e.to_string())?.clone();
    if header.is_empty() {
        return Err("missing header row".to_string());
    }
    let rows = reader
        .byte_records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    Ok((header, rows))
}

/// Concatenates every chunk in `input_dir` into `output_file` under one header.
///
/// Unreadable chunks and chunks whose header differs from the first one are
/// skipped with a warning.
pub fn combine_chunks(
    input_dir: &Path,
    output_file: &Path,
    delimiter: u8,
    extension: &str,
) -> Result<CombineSummary> {
    let files = list_chunk_files(input_dir, extension)?;
    let write_error = |e: csv::Error| CleanError::OutputWrite {
        path: output_file.to_path_buf(),
        source: e.into(),
    };

    if let Some(parent) = output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| CleanError::OutputWrite {
            path: output_file.to_path_buf(),
            source,
        })?;
    }
    let mut writer = writer_builder(delimiter)
        .from_path(output_file)
        .map_err(write_error)?;

    let mut summary = CombineSummary::default();
    let mut expected_header: Option<csv::ByteRecord> = None;

    for path in files {
        // 若輸出檔也在同一個資料夾，不要把自己讀進來
        if same_path(&path, output_file) {
            continue;
        }

        let (header, rows) = match read_chunk(&path, delimiter) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!("Error reading file {}: {}", path.display(), e);
                summary.files_skipped.push(path);
                continue;
            }
        };

        match expected_header.as_ref().map(|expected| *expected == header) {
            None => {
                writer.write_byte_record(&header).map_err(write_error)?;
                expected_header = Some(header);
            }
            Some(true) => {}
            Some(false) => {
                tracing::warn!("Skipping {}: header differs from first chunk", path.display());
                summary.files_skipped.push(path);
                continue;
            }
        }

        for row in &rows {
            writer.write_byte_record(row).map_err(write_error)?;
        }
        summary.files_combined += 1;
        summary.rows += rows.len();
    }

    writer.flush().map_err(|source| CleanError::OutputWrite {
        path: output_file.to_path_buf(),
        source,
    })?;
    tracing::info!(
        "🔗 Combined {} chunks ({} rows) into '{}'",
        summary.files_combined,
        summary.rows,
        output_file.display()
    );
    Ok(summary)
}
