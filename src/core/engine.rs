use crate::core::aggregator::ResultAggregator;
use crate::core::dedupe::{dedupe_file, DedupeSummary};
use crate::core::splitter::split_reformatted;
use crate::core::ConfigProvider;
use crate::domain::model::RunReport;
use crate::domain::ports::{EventSink, TracingSink};
use crate::utils::error::{CleanError, Result};
use crate::utils::monitor::StageMonitor;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct EngineSummary {
    pub dedupe: Option<DedupeSummary>,
    pub chunks: Vec<PathBuf>,
    pub report: RunReport,
}

/// Runs the stages in order: optional whole-file dedupe, split, clean.
pub struct CleaningEngine<C: ConfigProvider> {
    config: C,
    sink: Arc<dyn EventSink>,
    monitor: StageMonitor,
}

async fn blocking<T, F>(stage: &str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CleanError::ProcessingError {
            message: format!("{} stage task failed: {}", stage, e),
        })?
}

impl<C: ConfigProvider> CleaningEngine<C> {
    pub fn new(config: C) -> Self {
        Self::new_with_monitoring(config, false)
    }

    pub fn new_with_monitoring(config: C, monitor_enabled: bool) -> Self {
        Self {
            config,
            sink: Arc::new(TracingSink),
            monitor: StageMonitor::new(monitor_enabled),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    fn aggregator(&self) -> ResultAggregator {
        ResultAggregator::new(self.config.rules(), self.config.delimiter())
            .with_workers(self.config.workers())
            .with_extension(self.config.chunk_extension())
            .with_sink(Arc::clone(&self.sink))
    }

    fn finish_stage(&self, stage: &str, started: Instant) {
        tracing::info!("✅ {} stage finished in {:?}", stage, started.elapsed());
        self.monitor.log_stage(stage);
    }

    /// Whole-file dedupe of the source file. `None` when no dedupe keys are configured.
    pub async fn dedupe(&self) -> Result<Option<DedupeSummary>> {
        let keys = self.config.dedupe_key_columns().to_vec();
        if keys.is_empty() {
            return Ok(None);
        }

        let missing = |field: &str| CleanError::MissingConfigError {
            field: field.to_string(),
        };
        let input = self
            .config
            .source_file()
            .ok_or_else(|| missing("source.path"))?
            .to_path_buf();
        let valid = self
            .config
            .dedupe_valid_output()
            .ok_or_else(|| missing("dedupe.valid_output"))?
            .to_path_buf();
        let duplicates = self
            .config
            .dedupe_duplicates_output()
            .ok_or_else(|| missing("dedupe.duplicates_output"))?
            .to_path_buf();
        let source_delimiter = self.config.source_delimiter();
        let delimiter = self.config.delimiter();

        tracing::info!("🧹 Removing duplicates from '{}' by {:?}", input.display(), keys);
        let started = Instant::now();
        let summary = blocking("dedupe", move || {
            dedupe_file(&input, &valid, &duplicates, source_delimiter, delimiter, &keys)
        })
        .await?;
        self.finish_stage("dedupe", started);
        Ok(Some(summary))
    }

    /// Splits `input` into the configured chunk directory.
    pub async fn split(&self, input: PathBuf, input_delimiter: u8) -> Result<Vec<PathBuf>> {
        let max_rows = self.config.max_rows_per_chunk();
        let out_dir = self.config.chunk_directory().to_path_buf();
        let chunk_delimiter = self.config.delimiter();

        tracing::info!(
            "✂️ Splitting '{}' into chunks of {} rows",
            input.display(),
            max_rows
        );
        let started = Instant::now();
        let chunks = blocking("split", move || {
            split_reformatted(&input, max_rows, &out_dir, input_delimiter, chunk_delimiter)
        })
        .await?;
        self.finish_stage("split", started);
        Ok(chunks)
    }

    /// Cleans the chunk directory, merging into two files or writing per-chunk
    /// folders when both output directories are configured.
    pub async fn clean(&self) -> Result<RunReport> {
        self.clean_chunks(None).await
    }

    /// `Some(files)` cleans exactly those chunks; `None` lists the chunk directory.
    async fn clean_chunks(&self, files: Option<&[PathBuf]>) -> Result<RunReport> {
        let started = Instant::now();
        let chunk_dir = self.config.chunk_directory();
        let aggregator = self.aggregator();

        let report = match (self.config.valid_directory(), self.config.error_directory()) {
            (Some(valid_dir), Some(error_dir)) => match files {
                Some(files) => {
                    aggregator
                        .run_files_to_folders(files, valid_dir, error_dir)
                        .await?
                }
                None => {
                    aggregator
                        .run_to_folders(chunk_dir, valid_dir, error_dir)
                        .await?
                }
            },
            _ => {
                let (valid, error) = (self.config.valid_output(), self.config.error_output());
                match files {
                    Some(files) => aggregator.run_files(files, valid, error).await?,
                    None => aggregator.run(chunk_dir, valid, error).await?,
                }
            }
        };

        self.finish_stage("clean", started);
        Ok(report)
    }

    /// Runs every configured stage. Without a source file only the clean stage runs.
    pub async fn run(&self) -> Result<EngineSummary> {
        tracing::info!("🚀 Starting chunked cleaning run");

        let dedupe = self.dedupe().await?;

        let split_input = match (&dedupe, self.config.dedupe_valid_output()) {
            (Some(_), Some(deduplicated)) => {
                Some((deduplicated.to_path_buf(), self.config.delimiter()))
            }
            _ => self
                .config
                .source_file()
                .map(|source| (source.to_path_buf(), self.config.source_delimiter())),
        };

        // 只清洗這次切出來的 chunk，目錄裡的舊檔不算
        let (chunks, report) = match split_input {
            Some((input, delimiter)) => {
                let chunks = self.split(input, delimiter).await?;
                let report = self.clean_chunks(Some(chunks.as_slice())).await?;
                (chunks, report)
            }
            None => {
                tracing::info!(
                    "No source file configured, using existing chunks in '{}'",
                    self.config.chunk_directory().display()
                );
                (Vec::new(), self.clean().await?)
            }
        };

        tracing::info!("📊 {}", report.summary());
        self.monitor.log_final();

        Ok(EngineSummary {
            dedupe,
            chunks,
            report,
        })
    }
}
