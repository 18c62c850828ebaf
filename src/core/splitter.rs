use crate::core::csv_io::{ensure_exists, reader_builder, writer_builder};
use crate::utils::error::{CleanError, Result};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

pub const CHUNK_PREFIX: &str = "chunk_";
const PARTIAL_SUFFIX: &str = "part";

/// Final path of the chunk with 1-based `index`.
pub fn chunk_path(output_directory: &Path, index: usize) -> PathBuf {
    output_directory.join(format!("{}{}.csv", CHUNK_PREFIX, index))
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

struct OpenChunk {
    path: PathBuf,
    writer: csv::Writer<File>,
    rows: usize,
}

/// Splits `input_file` into `chunk_1.csv`, `chunk_2.csv`, ... under `output_directory`.
///
/// Every chunk repeats the header and holds up to `max_rows_per_chunk` rows in
/// input order. Chunks are written as `.part` files and only renamed once the
/// whole input has been copied, so a failed split leaves nothing that looks
/// like a chunk.
pub fn split(
    input_file: &Path,
    max_rows_per_chunk: usize,
    output_directory: &Path,
    delimiter: u8,
) -> Result<Vec<PathBuf>> {
    split_reformatted(
        input_file,
        max_rows_per_chunk,
        output_directory,
        delimiter,
        delimiter,
    )
}

/// Like [`split`], but chunks are written with `chunk_delimiter`.
pub fn split_reformatted(
    input_file: &Path,
    max_rows_per_chunk: usize,
    output_directory: &Path,
    input_delimiter: u8,
    chunk_delimiter: u8,
) -> Result<Vec<PathBuf>> {
    if max_rows_per_chunk == 0 {
        return Err(CleanError::InvalidConfigValueError {
            field: "max_rows_per_chunk".to_string(),
            value: "0".to_string(),
            reason: "Value must be at least 1".to_string(),
        });
    }
    ensure_exists(input_file)?;

    fs::create_dir_all(output_directory).map_err(|source| CleanError::ChunkWrite {
        path: output_directory.to_path_buf(),
        source,
    })?;

    let mut written: Vec<PathBuf> = Vec::new();
    match copy_into_chunks(
        input_file,
        max_rows_per_chunk,
        output_directory,
        (input_delimiter, chunk_delimiter),
        &mut written,
    ) {
        Ok(rows) => {
            let chunks = publish(&written)?;
            remove_stale_chunks(output_directory, chunks.len())?;
            tracing::info!(
                "✂️ Split '{}' into {} chunks ({} rows) in '{}'",
                input_file.display(),
                chunks.len(),
                rows,
                output_directory.display()
            );
            Ok(chunks)
        }
        Err(e) => {
            discard(&written);
            Err(e)
        }
    }
}

/// Streams rows into `.part` files, pushing each final chunk path into `written`.
fn copy_into_chunks(
    input_file: &Path,
    max_rows_per_chunk: usize,
    output_directory: &Path,
    (input_delimiter, chunk_delimiter): (u8, u8),
    written: &mut Vec<PathBuf>,
) -> Result<usize> {
    let read_error = |e: csv::Error| CleanError::ChunkRead {
        path: input_file.to_path_buf(),
        detail: e.to_string(),
    };

    let mut reader = reader_builder(input_delimiter)
        .from_path(input_file)
        .map_err(read_error)?;
    let header = reader.byte_headers().map_err(read_error)?.clone();
    if header.is_empty() {
        return Err(CleanError::ChunkRead {
            path: input_file.to_path_buf(),
            detail: "missing header row".to_string(),
        });
    }

    let mut rows_read = 0usize;
    let mut rows_written = 0usize;
    let mut current: Option<OpenChunk> = None;

    for row in reader.byte_records() {
        let row = row.map_err(read_error)?;
        rows_read += 1;

        let needs_new = current
            .as_ref()
            .is_none_or(|chunk| chunk.rows >= max_rows_per_chunk);
        if needs_new {
            if let Some(full) = current.take() {
                rows_written += finish(full)?;
            }
            let path = chunk_path(output_directory, written.len() + 1);
            written.push(path.clone());
            current = Some(open_chunk(path, chunk_delimiter, &header)?);
        }

        if let Some(chunk) = current.as_mut() {
            chunk
                .writer
                .write_byte_record(&row)
                .map_err(|e| chunk_write_error(&chunk.path, e))?;
            chunk.rows += 1;
        }
    }

    if let Some(last) = current.take() {
        rows_written += finish(last)?;
    }

    if rows_read != rows_written {
        return Err(CleanError::ProcessingError {
            message: format!(
                "split of '{}' read {} rows but wrote {}",
                input_file.display(),
                rows_read,
                rows_written
            ),
        });
    }
    if rows_read == 0 {
        tracing::warn!("'{}' has a header but no data rows", input_file.display());
    }
    Ok(rows_read)
}

fn chunk_write_error(path: &Path, e: csv::Error) -> CleanError {
    CleanError::ChunkWrite {
        path: path.to_path_buf(),
        source: e.into(),
    }
}

fn open_chunk(path: PathBuf, delimiter: u8, header: &csv::ByteRecord) -> Result<OpenChunk> {
    let partial = partial_path(&path);
    let mut writer = writer_builder(delimiter)
        .from_path(&partial)
        .map_err(|e| chunk_write_error(&path, e))?;
    writer
        .write_byte_record(header)
        .map_err(|e| chunk_write_error(&path, e))?;
    Ok(OpenChunk {
        path,
        writer,
        rows: 0,
    })
}

fn finish(mut chunk: OpenChunk) -> Result<usize> {
    chunk
        .writer
        .flush()
        .map_err(|source| CleanError::ChunkWrite {
            path: chunk.path.clone(),
            source,
        })?;
    Ok(chunk.rows)
}

fn publish(written: &[PathBuf]) -> Result<Vec<PathBuf>> {
    for (i, path) in written.iter().enumerate() {
        if let Err(source) = fs::rename(partial_path(path), path) {
            // 已改名的也要撤回，避免留下不完整的 chunk 組
            for done in &written[..i] {
                let _ = fs::remove_file(done);
            }
            discard(&written[i..]);
            return Err(CleanError::ChunkWrite {
                path: path.clone(),
                source,
            });
        }
    }
    Ok(written.to_vec())
}

/// Index of a file named `chunk_<n>.csv`.
fn chunk_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(CHUNK_PREFIX)?.strip_suffix(".csv")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Deletes chunks numbered above `kept` that an earlier, longer split left behind.
fn remove_stale_chunks(output_directory: &Path, kept: usize) -> Result<()> {
    let write_error = |path: &Path, source| CleanError::ChunkWrite {
        path: path.to_path_buf(),
        source,
    };
    let entries = fs::read_dir(output_directory).map_err(|e| write_error(output_directory, e))?;

    for entry in entries {
        let path = entry.map_err(|e| write_error(output_directory, e))?.path();
        let stale = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(chunk_index)
            .is_some_and(|index| index > kept);
        if stale && path.is_file() {
            tracing::warn!("🗑️ Removing stale chunk '{}' from an earlier split", path.display());
            fs::remove_file(&path).map_err(|e| write_error(&path, e))?;
        }
    }
    Ok(())
}

fn discard(written: &[PathBuf]) {
    for path in written {
        let partial = partial_path(path);
        if let Err(e) = fs::remove_file(&partial) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Could not remove '{}': {}", partial.display(), e);
            }
        }
    }
}
