use std::fmt;
use std::time::Duration;

/// Informational progress view emitted at checkpoints. Never persisted by
/// the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub pages_processed: usize,
    pub pages_planned: usize,
    pub records_so_far: usize,
    pub failed_so_far: usize,
    pub elapsed: Duration,
    pub estimated_remaining: Option<Duration>,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} pages, {} records, {} failed, {:.1} min elapsed",
            self.pages_processed,
            self.pages_planned,
            self.records_so_far,
            self.failed_so_far,
            self.elapsed.as_secs_f64() / 60.0
        )?;
        if let Some(remaining) = self.estimated_remaining {
            write!(f, ", ~{:.1} min remaining", remaining.as_secs_f64() / 60.0)?;
        }
        Ok(())
    }
}
