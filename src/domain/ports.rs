use crate::domain::model::{Rule, RunEvent, Severity};
use std::path::Path;
use std::sync::Mutex;

/// Append-only destination for run events (chunk start/success/failure, summaries).
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RunEvent);
}

/// Forwards events to `tracing`; the subscriber is configured by the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &RunEvent) {
        let path = event
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match event.severity {
            Severity::Debug => tracing::debug!(path = %path, "{}", event.message),
            Severity::Info => tracing::info!(path = %path, "{}", event.message),
            Severity::Warn => tracing::warn!(path = %path, "{}", event.message),
            Severity::Error => tracing::error!(path = %path, "{}", event.message),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RunEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn source_file(&self) -> Option<&Path>;
    fn source_delimiter(&self) -> u8;
    fn delimiter(&self) -> u8;
    fn dedupe_key_columns(&self) -> &[String];
    fn dedupe_valid_output(&self) -> Option<&Path>;
    fn dedupe_duplicates_output(&self) -> Option<&Path>;
    fn chunk_directory(&self) -> &Path;
    fn max_rows_per_chunk(&self) -> usize;
    fn chunk_extension(&self) -> &str;
    fn valid_output(&self) -> &Path;
    fn error_output(&self) -> &Path;
    fn valid_directory(&self) -> Option<&Path>;
    fn error_directory(&self) -> Option<&Path>;
    fn workers(&self) -> usize;
    fn rules(&self) -> Vec<Rule>;
}
