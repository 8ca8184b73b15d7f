//! Advisory load/analysis events.
//!
//! Every heuristic decision point emits a [`LoadEvent`]; observers can log,
//! count, or alert on them. Events are advisory only; nothing here affects
//! control flow.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// An advisory event emitted during structure analysis or loading.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    /// Structure analysis served from the cache.
    AnalysisCacheHit { file: PathBuf, sheet: String, cache_len: usize },
    /// Structure analysis started for a (file, sheet).
    AnalysisStarted { file: PathBuf, sheet: String },
    /// Structure analysis finished; key findings attached.
    StructureDetected {
        file: PathBuf,
        sheet: String,
        header_row: Option<usize>,
        header_confidence: f64,
        num_tables: usize,
        detected_locale: String,
    },
    /// Structure analysis failed; a conservative default was substituted.
    AnalysisFailed { file: PathBuf, sheet: String, error: String },
    /// Detected header confidence fell below the advisory threshold.
    LowHeaderConfidence { confidence: f64 },
    /// Mutually-tensioned override fields were both set.
    ConflictingOptions { message: String },
    /// An out-of-range `extract_table` index was clamped.
    RegionIndexClamped { requested: usize, available: usize },
    /// One detected sub-region failed to load and was skipped.
    RegionLoadFailed { index: usize, error: String },
    /// Every detected sub-region failed; the sheet was loaded RAW instead.
    FallbackToRaw { file: PathBuf, sheet: String },
    /// A drop condition referenced a column the table does not have.
    DropColumnMissing { column: String },
    /// A drop rule removed rows.
    RowsDropped { column: String, rule: String, rows: usize },
}

/// Observer interface for advisory events.
///
/// The default implementation ignores everything.
pub trait LoadObserver: Send + Sync {
    /// Called once per advisory event.
    fn on_event(&self, _event: &LoadEvent) {}
}

/// An observer that ignores all events.
#[derive(Debug, Default)]
pub struct NullObserver;

impl LoadObserver for NullObserver {}

/// Logs advisory events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl LoadObserver for StdErrObserver {
    fn on_event(&self, event: &LoadEvent) {
        eprintln!("[sheetsense] {event:?}");
    }
}

/// Fans events out to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl CompositeObserver {
    /// Create a composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn LoadObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn on_event(&self, event: &LoadEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl LoadObserver for Counter {
        fn on_event(&self, _event: &LoadEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn composite_fans_out() {
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let b = Arc::new(Counter(AtomicUsize::new(0)));
        let composite = CompositeObserver::new(vec![a.clone(), b.clone()]);
        composite.on_event(&LoadEvent::LowHeaderConfidence { confidence: 0.1 });
        assert_eq!(a.0.load(Ordering::SeqCst), 1);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }
}
