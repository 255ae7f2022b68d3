// perf.rs - Timing instrumentation for the context engine
//
// Controlled via the UI5_CONTEXT_PERF environment variable:
//   UI5_CONTEXT_PERF=1        log durations of expensive scopes
//   UI5_CONTEXT_PERF=verbose  additionally warn when a scope exceeds its threshold

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

const PERF_ENV: &str = "UI5_CONTEXT_PERF";

static PERF_ENABLED: OnceLock<bool> = OnceLock::new();
static PERF_VERBOSE: OnceLock<bool> = OnceLock::new();

static DESCRIPTOR_FETCHES: AtomicUsize = AtomicUsize::new(0);
static SERVICE_COMPILATIONS: AtomicUsize = AtomicUsize::new(0);
static PROJECT_RESOLUTIONS: AtomicUsize = AtomicUsize::new(0);

pub fn is_enabled() -> bool {
    *PERF_ENABLED.get_or_init(|| {
        std::env::var(PERF_ENV)
            .map(|v| !v.is_empty() && v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false)
    })
}

pub fn is_verbose() -> bool {
    *PERF_VERBOSE.get_or_init(|| {
        std::env::var(PERF_ENV)
            .map(|v| v.to_lowercase() == "verbose")
            .unwrap_or(false)
    })
}

/// RAII timing guard that logs its scope's duration on drop
pub struct TimingGuard {
    start: Instant,
    name: &'static str,
    detail: Option<String>,
    threshold_warn_ms: Option<u64>,
    enabled: bool,
}

impl TimingGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
            detail: None,
            threshold_warn_ms: None,
            enabled: is_enabled(),
        }
    }

    /// Warn (in verbose mode) when the scope takes longer than `threshold_ms`.
    pub fn with_threshold(name: &'static str, threshold_ms: u64) -> Self {
        let mut guard = Self::new(name);
        guard.threshold_warn_ms = Some(threshold_ms);
        guard
    }

    /// Attach a label (path, version, ...) to the log line.
    pub fn detail(mut self, detail: impl std::fmt::Display) -> Self {
        if self.enabled {
            self.detail = Some(detail.to_string());
        }
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        if !self.enabled {
            return;
        }

        let elapsed = self.start.elapsed();
        match &self.detail {
            Some(detail) => log::info!("[PERF] {} ({}) completed in {:?}", self.name, detail, elapsed),
            None => log::info!("[PERF] {} completed in {:?}", self.name, elapsed),
        }

        if let Some(threshold) = self.threshold_warn_ms {
            if elapsed.as_millis() > threshold as u128 && is_verbose() {
                log::warn!(
                    "[PERF] {} exceeded threshold ({}ms > {}ms)",
                    self.name,
                    elapsed.as_millis(),
                    threshold
                );
            }
        }
    }
}

pub fn increment_descriptor_fetches() {
    DESCRIPTOR_FETCHES.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_service_compilations() {
    SERVICE_COMPILATIONS.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_project_resolutions() {
    PROJECT_RESOLUTIONS.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of the process-wide counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PerfCounters {
    pub descriptor_fetches: usize,
    pub service_compilations: usize,
    pub project_resolutions: usize,
}

pub fn counters() -> PerfCounters {
    PerfCounters {
        descriptor_fetches: DESCRIPTOR_FETCHES.load(Ordering::Relaxed),
        service_compilations: SERVICE_COMPILATIONS.load(Ordering::Relaxed),
        project_resolutions: PROJECT_RESOLUTIONS.load(Ordering::Relaxed),
    }
}

pub fn log_summary() {
    if !is_enabled() {
        return;
    }
    let c = counters();
    log::info!(
        "[PERF] descriptor fetches: {}, service compilations: {}, project resolutions: {}",
        c.descriptor_fetches,
        c.service_compilations,
        c.project_resolutions
    );
}
