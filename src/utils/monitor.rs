#[cfg(feature = "cli")]
use std::sync::Mutex;
use std::time::{Duration, Instant};
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// 某個階段結束時的資源快照
#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub stage: String,
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed: Duration,
}

#[cfg(feature = "cli")]
struct ProcessSampler {
    system: System,
    pid: Pid,
    peak_memory_mb: u64,
}

/// Logs CPU and memory usage of this process after each pipeline stage.
///
/// Without the `cli` feature only elapsed time is tracked.
pub struct StageMonitor {
    #[cfg(feature = "cli")]
    sampler: Option<Mutex<ProcessSampler>>,
    started: Instant,
    enabled: bool,
}

impl StageMonitor {
    pub fn new(enabled: bool) -> Self {
        #[cfg(feature = "cli")]
        let sampler = if enabled {
            match sysinfo::get_current_pid() {
                Ok(pid) => Some(Mutex::new(ProcessSampler {
                    system: System::new(),
                    pid,
                    peak_memory_mb: 0,
                })),
                Err(e) => {
                    tracing::warn!("Process monitoring unavailable: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            #[cfg(feature = "cli")]
            sampler,
            started: Instant::now(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn snapshot(&self, stage: &str) -> Option<StageSnapshot> {
        if !self.enabled {
            return None;
        }

        #[cfg(feature = "cli")]
        {
            let mut sampler = self.sampler.as_ref()?.lock().ok()?;
            let pid = sampler.pid;
            sampler.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::everything(),
            );
            let (cpu_usage, memory_mb) = {
                let process = sampler.system.process(pid)?;
                (process.cpu_usage(), process.memory() / 1024 / 1024)
            };
            sampler.peak_memory_mb = sampler.peak_memory_mb.max(memory_mb);

            Some(StageSnapshot {
                stage: stage.to_string(),
                cpu_usage,
                memory_mb,
                peak_memory_mb: sampler.peak_memory_mb,
                elapsed: self.started.elapsed(),
            })
        }

        #[cfg(not(feature = "cli"))]
        {
            Some(StageSnapshot {
                stage: stage.to_string(),
                cpu_usage: 0.0,
                memory_mb: 0,
                peak_memory_mb: 0,
                elapsed: self.started.elapsed(),
            })
        }
    }

    pub fn log_stage(&self, stage: &str) {
        if let Some(s) = self.snapshot(stage) {
            tracing::info!(
                "📊 {} - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Time: {:?}",
                s.stage,
                s.cpu_usage,
                s.memory_mb,
                s.peak_memory_mb,
                s.elapsed
            );
        }
    }

    pub fn log_final(&self) {
        if let Some(s) = self.snapshot("final") {
            tracing::info!(
                "📊 Final Stats - Total Time: {:?}, Peak Memory: {}MB",
                s.elapsed,
                s.peak_memory_mb
            );
        }
    }
}

impl Default for StageMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_monitor_has_no_snapshot() {
        let monitor = StageMonitor::default();
        assert!(!monitor.is_enabled());
        assert!(monitor.snapshot("split").is_none());
    }

    #[test]
    fn test_enabled_monitor_reports_stage_name() {
        let monitor = StageMonitor::new(true);
        if let Some(snapshot) = monitor.snapshot("clean") {
            assert_eq!(snapshot.stage, "clean");
            assert!(snapshot.peak_memory_mb >= snapshot.memory_mb);
        }
    }
}
