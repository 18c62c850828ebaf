use crate::core::csv_io::{list_chunk_files, parent_dir, same_path, write_records, write_rejections};
use crate::core::processor::ChunkProcessor;
use crate::domain::model::{
    ChunkResult, ChunkStatus, FailedFile, Record, Rejection, Rule, RunEvent, RunReport, Schema,
    Severity,
};
use crate::domain::ports::{EventSink, TracingSink};
use crate::utils::error::{CleanError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_CHUNK_EXTENSION: &str = "csv";

/// Drives [`ChunkProcessor`] over every chunk in a directory and owns the run's
/// accumulated rows and [`RunReport`].
///
/// Chunks are processed by up to `workers` blocking tasks at once. Results are
/// merged in chunk order, not completion order, so output is deterministic.
pub struct ResultAggregator {
    processor: Arc<ChunkProcessor>,
    delimiter: u8,
    workers: usize,
    extension: String,
    sink: Arc<dyn EventSink>,
}

/// Rows merged from all chunks that share the run schema.
struct Accumulated {
    schema: Option<Arc<Schema>>,
    valid: Vec<Record>,
    errors: Vec<Rejection>,
}

impl ResultAggregator {
    pub fn new(rules: Vec<Rule>, delimiter: u8) -> Self {
        Self {
            processor: Arc::new(ChunkProcessor::new(rules, delimiter)),
            delimiter,
            workers: DEFAULT_WORKERS,
            extension: DEFAULT_CHUNK_EXTENSION.to_string(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    fn log(
        &self,
        report: &mut RunReport,
        severity: Severity,
        path: Option<&Path>,
        message: impl Into<String>,
    ) {
        let event = RunEvent::new(severity, path.map(Path::to_path_buf), message);
        self.sink.emit(&event);
        report.log.push(event);
    }

    /// Processes every chunk in `input_directory` and writes the merged valid and
    /// error files.
    ///
    /// Chunk failures are logged and counted; only enumeration or output write
    /// failures are returned as errors. Outputs may not live in `input_directory`,
    /// where the next run would read them back as chunks.
    pub async fn run(
        &self,
        input_directory: &Path,
        valid_output: &Path,
        error_output: &Path,
    ) -> Result<RunReport> {
        ensure_outside(input_directory, "valid_output", parent_dir(valid_output))?;
        ensure_outside(input_directory, "error_output", parent_dir(error_output))?;

        let mut report = RunReport::new();
        let files = self.list_chunks(input_directory, &mut report)?;
        self.merge_files(files, report, valid_output, error_output)
            .await
    }

    /// Like [`run`](Self::run) over an explicit chunk list, e.g. the paths a split returned.
    pub async fn run_files(
        &self,
        files: &[PathBuf],
        valid_output: &Path,
        error_output: &Path,
    ) -> Result<RunReport> {
        for dir in chunk_directories(files) {
            ensure_outside(dir, "valid_output", parent_dir(valid_output))?;
            ensure_outside(dir, "error_output", parent_dir(error_output))?;
        }

        let mut report = RunReport::new();
        self.log(
            &mut report,
            Severity::Info,
            None,
            format!(
                "Processing {} chunk files with {} workers",
                files.len(),
                self.workers
            ),
        );
        self.merge_files(files.to_vec(), report, valid_output, error_output)
            .await
    }

    async fn merge_files(
        &self,
        files: Vec<PathBuf>,
        mut report: RunReport,
        valid_output: &Path,
        error_output: &Path,
    ) -> Result<RunReport> {
        let results = self.process_files(files, &mut report).await;

        let mut acc = Accumulated {
            schema: None,
            valid: Vec::new(),
            errors: Vec::new(),
        };
        for result in results {
            self.merge(result, &mut acc, &mut report);
        }

        if acc.schema.is_none() {
            self.log(
                &mut report,
                Severity::Warn,
                None,
                "No chunk was read successfully; writing empty outputs",
            );
        }

        write_records(valid_output, self.delimiter, acc.schema.as_deref(), &acc.valid).map_err(
            |source| CleanError::OutputWrite {
                path: valid_output.to_path_buf(),
                source,
            },
        )?;
        self.log(
            &mut report,
            Severity::Info,
            Some(valid_output),
            format!("Final valid data saved ({} records)", acc.valid.len()),
        );

        write_rejections(error_output, self.delimiter, acc.schema.as_deref(), &acc.errors)
            .map_err(|source| CleanError::OutputWrite {
                path: error_output.to_path_buf(),
                source,
            })?;
        self.log(
            &mut report,
            Severity::Info,
            Some(error_output),
            format!("Final error data saved ({} records)", acc.errors.len()),
        );

        report.valid_output = Some(valid_output.to_path_buf());
        report.error_output = Some(error_output.to_path_buf());
        let summary = report.summary();
        let severity = if report.has_failures() {
            Severity::Warn
        } else {
            Severity::Info
        };
        self.log(&mut report, severity, None, summary);
        Ok(report)
    }

    /// Writes each chunk's valid and error rows to `valid_dir/<chunk name>` and
    /// `error_dir/<chunk name>` instead of merging them.
    pub async fn run_to_folders(
        &self,
        input_directory: &Path,
        valid_dir: &Path,
        error_dir: &Path,
    ) -> Result<RunReport> {
        ensure_outside(input_directory, "valid_directory", valid_dir)?;
        ensure_outside(input_directory, "error_directory", error_dir)?;

        let mut report = RunReport::new();
        let files = self.list_chunks(input_directory, &mut report)?;
        self.write_folders(files, report, valid_dir, error_dir)
            .await
    }

    /// Like [`run_to_folders`](Self::run_to_folders) over an explicit chunk list.
    pub async fn run_files_to_folders(
        &self,
        files: &[PathBuf],
        valid_dir: &Path,
        error_dir: &Path,
    ) -> Result<RunReport> {
        for dir in chunk_directories(files) {
            ensure_outside(dir, "valid_directory", valid_dir)?;
            ensure_outside(dir, "error_directory", error_dir)?;
        }

        let mut report = RunReport::new();
        self.log(
            &mut report,
            Severity::Info,
            None,
            format!(
                "Processing {} chunk files with {} workers",
                files.len(),
                self.workers
            ),
        );
        self.write_folders(files.to_vec(), report, valid_dir, error_dir)
            .await
    }

    async fn write_folders(
        &self,
        files: Vec<PathBuf>,
        mut report: RunReport,
        valid_dir: &Path,
        error_dir: &Path,
    ) -> Result<RunReport> {
        let results = self.process_files(files, &mut report).await;
        for result in results {
            report.files_processed += 1;
            let name = result
                .path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("chunk.csv"));

            match (&result.status, &result.schema) {
                (ChunkStatus::Succeeded, Some(schema)) => {
                    let valid_path = valid_dir.join(&name);
                    let error_path = error_dir.join(&name);
                    write_records(&valid_path, self.delimiter, Some(&**schema), &result.valid)
                        .map_err(|source| CleanError::OutputWrite {
                            path: valid_path.clone(),
                            source,
                        })?;
                    write_rejections(&error_path, self.delimiter, Some(&**schema), &result.errors)
                        .map_err(|source| CleanError::OutputWrite {
                            path: error_path.clone(),
                            source,
                        })?;

                    report.total_valid += result.valid.len();
                    report.total_errors += result.errors.len();
                    self.log(
                        &mut report,
                        Severity::Info,
                        Some(result.path.as_path()),
                        format!(
                            "File processed successfully ({} valid, {} errors)",
                            result.valid.len(),
                            result.errors.len()
                        ),
                    );
                }
                (ChunkStatus::Failed(detail), _) => {
                    let detail = detail.clone();
                    self.record_failure(&mut report, &result.path, detail, result.records_read);
                }
                (ChunkStatus::Succeeded, None) => {
                    self.record_failure(
                        &mut report,
                        &result.path,
                        "chunk has no schema".to_string(),
                        result.records_read,
                    );
                }
            }
        }

        report.valid_output = Some(valid_dir.to_path_buf());
        report.error_output = Some(error_dir.to_path_buf());
        let summary = report.summary();
        self.log(&mut report, Severity::Info, None, summary);
        Ok(report)
    }

    fn list_chunks(&self, input_directory: &Path, report: &mut RunReport) -> Result<Vec<PathBuf>> {
        let files = list_chunk_files(input_directory, &self.extension)?;
        let level = if files.is_empty() {
            Severity::Warn
        } else {
            Severity::Info
        };
        self.log(
            report,
            level,
            Some(input_directory),
            format!(
                "Found {} .{} chunk files, processing with {} workers",
                files.len(),
                self.extension,
                self.workers
            ),
        );
        Ok(files)
    }

    /// Processes chunks on the worker pool. Results come back in `files` order.
    async fn process_files(&self, files: Vec<PathBuf>, report: &mut RunReport) -> Vec<ChunkResult> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks: JoinSet<(usize, ChunkResult)> = JoinSet::new();

        for (index, path) in files.iter().enumerate() {
            self.log(report, Severity::Info, Some(path.as_path()), "Processing file");

            let processor = Arc::clone(&self.processor);
            let semaphore = Arc::clone(&semaphore);
            let path = path.clone();
            tasks.spawn(async move {
                // semaphore 不會被關閉，取得失敗時仍照常處理
                let _permit = semaphore.acquire_owned().await.ok();
                let task_path = path.clone();
                let result = tokio::task::spawn_blocking(move || processor.process(&task_path))
                    .await
                    .unwrap_or_else(|e| {
                        ChunkResult::failed(path, 0, format!("worker task failed: {}", e))
                    });
                (index, result)
            });
        }

        let mut slots: Vec<Option<ChunkResult>> = files.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    tracing::debug!("Chunk '{}' finished", result.path.display());
                    slots[index] = Some(result);
                }
                Err(e) => tracing::error!("Chunk task aborted: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(files)
            .map(|(slot, path)| {
                slot.unwrap_or_else(|| ChunkResult::failed(path, 0, "chunk task aborted"))
            })
            .collect()
    }

    fn merge(&self, result: ChunkResult, acc: &mut Accumulated, report: &mut RunReport) {
        report.files_processed += 1;

        let schema = match (&result.status, &result.schema) {
            (ChunkStatus::Failed(detail), _) => {
                let detail = detail.clone();
                self.record_failure(report, &result.path, detail, result.records_read);
                return;
            }
            (ChunkStatus::Succeeded, None) => {
                self.record_failure(
                    report,
                    &result.path,
                    "chunk has no schema".to_string(),
                    result.records_read,
                );
                return;
            }
            (ChunkStatus::Succeeded, Some(schema)) => Arc::clone(schema),
        };

        // 第一個成功的 chunk 決定整個 run 的欄位
        let expected = acc
            .schema
            .as_ref()
            .filter(|run_schema| run_schema.columns() != schema.columns())
            .map(|run_schema| run_schema.columns().join(", "));
        if let Some(expected) = expected {
            let detail = format!(
                "schema mismatch: expected [{}], found [{}]",
                expected,
                schema.columns().join(", ")
            );
            self.record_failure(report, &result.path, detail, result.records_read);
            return;
        }
        if acc.schema.is_none() {
            acc.schema = Some(schema);
        }

        report.total_valid += result.valid.len();
        report.total_errors += result.errors.len();
        self.log(
            report,
            Severity::Info,
            Some(result.path.as_path()),
            format!(
                "File processed successfully ({} valid, {} errors)",
                result.valid.len(),
                result.errors.len()
            ),
        );
        acc.valid.extend(result.valid);
        acc.errors.extend(result.errors);
    }

    fn record_failure(
        &self,
        report: &mut RunReport,
        path: &Path,
        detail: String,
        records_lost: usize,
    ) {
        report.files_failed += 1;
        report.records_lost += records_lost;
        self.log(
            report,
            Severity::Error,
            Some(path),
            format!(
                "Error processing file: {} ({} records lost)",
                detail, records_lost
            ),
        );
        report.failed_files.push(FailedFile {
            path: path.to_path_buf(),
            detail,
            records_lost,
        });
    }
}

fn chunk_directories(files: &[PathBuf]) -> Vec<&Path> {
    let mut dirs: Vec<&Path> = files.iter().map(|f| parent_dir(f)).collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

fn ensure_outside(chunk_directory: &Path, field: &str, output_dir: &Path) -> Result<()> {
    if same_path(output_dir, chunk_directory) {
        return Err(CleanError::InvalidConfigValueError {
            field: field.to_string(),
            value: output_dir.display().to_string(),
            reason: "Output must not be written to the chunk directory".to_string(),
        });
    }
    Ok(())
}
