use crate::domain::model::{Record, Rejection, Schema, REASON_COLUMN};
use crate::utils::error::{CleanError, Result};
use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// A whole delimited file held in memory.
#[derive(Debug, Clone)]
pub struct Table {
    pub schema: Arc<Schema>,
    pub records: Vec<Record>,
}

/// A read that failed. `rows_read` counts every data row the file holds,
/// the bad ones included, as far as the file could be read.
#[derive(Debug)]
pub struct ReadFailure {
    pub rows_read: usize,
    pub error: CleanError,
}

impl From<ReadFailure> for CleanError {
    fn from(failure: ReadFailure) -> Self {
        failure.error
    }
}

pub fn reader_builder(delimiter: u8) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.delimiter(delimiter).has_headers(true).flexible(false);
    builder
}

pub fn writer_builder(delimiter: u8) -> csv::WriterBuilder {
    let mut builder = csv::WriterBuilder::new();
    builder.delimiter(delimiter).has_headers(false);
    builder
}

pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(CleanError::SourceNotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Reads the header row. An empty file has no header and is an error.
pub fn read_schema<R: io::Read>(reader: &mut csv::Reader<R>, path: &Path) -> Result<Arc<Schema>> {
    let headers = reader.headers().map_err(|e| CleanError::ChunkRead {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    if headers.is_empty() {
        return Err(CleanError::ChunkRead {
            path: path.to_path_buf(),
            detail: "missing header row".to_string(),
        });
    }
    Ok(Arc::new(Schema::new(
        headers.iter().map(str::to_string).collect(),
    )))
}

/// Loads a file fully. Missing files are `SourceNotFound`; anything malformed is `ChunkRead`.
pub fn read_table(path: &Path, delimiter: u8) -> std::result::Result<Table, ReadFailure> {
    let fail = |rows_read: usize, error: CleanError| ReadFailure { rows_read, error };

    ensure_exists(path).map_err(|e| fail(0, e))?;
    let mut reader = reader_builder(delimiter).from_path(path).map_err(|e| {
        fail(
            0,
            CleanError::ChunkRead {
                path: path.to_path_buf(),
                detail: e.to_string(),
            },
        )
    })?;
    let schema = read_schema(&mut reader, path).map_err(|e| fail(0, e))?;

    let mut records = Vec::new();
    let mut rows_read = 0usize;
    let mut first_error: Option<csv::Error> = None;
    // 出錯後繼續往下數，失敗的 chunk 要回報整個檔案的筆數
    for row in reader.records() {
        rows_read += 1;
        match row {
            Ok(row) if first_error.is_none() => records.push(Record::new(
                Arc::clone(&schema),
                row.iter().map(str::to_string).collect(),
            )),
            Ok(_) => {}
            Err(e) => {
                let stop = e.is_io_error();
                first_error.get_or_insert(e);
                if stop {
                    break;
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(fail(
            rows_read,
            CleanError::ChunkRead {
                path: path.to_path_buf(),
                detail: e.to_string(),
            },
        ));
    }
    Ok(Table { schema, records })
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Writes `records` under `schema`'s header. Without a schema the file is left empty.
pub fn write_records(
    path: &Path,
    delimiter: u8,
    schema: Option<&Schema>,
    records: &[Record],
) -> io::Result<()> {
    create_parent(path)?;
    let mut writer = writer_builder(delimiter).from_path(path)?;
    if let Some(schema) = schema {
        writer.write_record(schema.columns())?;
        for record in records {
            writer.write_record(record.values())?;
        }
    }
    writer.flush()
}

/// Like [`write_records`] with a trailing `reason` column.
pub fn write_rejections(
    path: &Path,
    delimiter: u8,
    schema: Option<&Schema>,
    rejections: &[Rejection],
) -> io::Result<()> {
    create_parent(path)?;
    let mut writer = writer_builder(delimiter).from_path(path)?;
    if let Some(schema) = schema {
        let header = schema
            .columns()
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(REASON_COLUMN));
        writer.write_record(header)?;
        for rejection in rejections {
            let row = rejection
                .record
                .values()
                .iter()
                .map(String::as_str)
                .chain(std::iter::once(rejection.reason.as_str()));
            writer.write_record(row)?;
        }
    }
    writer.flush()
}

/// Compares two paths after resolving `.`, `..` and symlinks. When either side
/// does not exist yet the paths are compared with `.` components dropped.
pub fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => {
            let plain = |p: &Path| {
                p.components()
                    .filter(|c| !matches!(c, Component::CurDir))
                    .map(|c| c.as_os_str().to_os_string())
                    .collect::<Vec<_>>()
            };
            plain(a) == plain(b)
        }
    }
}

/// Directory holding `path`; a bare file name lives in `.`.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum NameSegment {
    Number(u64),
    Text(String),
}

fn natural_key(name: &str) -> Vec<NameSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_digits = false;

    let mut push = |current: &mut String, digits: bool| {
        if current.is_empty() {
            return;
        }
        let segment = match (digits, current.parse::<u64>()) {
            (true, Ok(n)) => NameSegment::Number(n),
            _ => NameSegment::Text(current.clone()),
        };
        segments.push(segment);
        current.clear();
    };

    for c in name.chars() {
        let is_digit = c.is_ascii_digit();
        if is_digit != in_digits {
            push(&mut current, in_digits);
            in_digits = is_digit;
        }
        current.push(c);
    }
    push(&mut current, in_digits);
    segments
}

/// `chunk_2.csv` sorts before `chunk_10.csv`; ties fall back to plain name order.
pub fn compare_file_names(a: &str, b: &str) -> Ordering {
    natural_key(a).cmp(&natural_key(b)).then_with(|| a.cmp(b))
}

/// Lists the files in `dir` with the given extension, in natural name order.
pub fn list_chunk_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(CleanError::SourceNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            files.push(path);
        }
    }

    files.sort_by(|a, b| {
        let name = |p: &PathBuf| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        compare_file_names(&name(a), &name(b))
    });
    Ok(files)
}
