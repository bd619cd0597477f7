use std::sync::{Arc, Mutex};

/// Shared progress of a running sweep. Cloning shares the same underlying state.
#[derive(Clone, Default)]
pub struct OptimizerStatus {
    inner: Arc<Mutex<OptimizerStatusData>>,
}

#[derive(Default)]
struct OptimizerStatusData {
    phase: String,
    total_combinations: usize,
    completed_combinations: usize,
    failed_combinations: usize,
    best_score: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerStatusSnapshot {
    pub phase: String,
    pub total_combinations: usize,
    pub completed_combinations: usize,
    pub failed_combinations: usize,
    pub best_score: Option<f64>,
}

impl OptimizerStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(OptimizerStatusData {
                phase: "Initializing".to_string(),
                ..Default::default()
            })),
        }
    }

    pub fn set_phase<S: Into<String>>(&self, phase: S) {
        if let Ok(mut data) = self.inner.lock() {
            data.phase = phase.into();
        }
    }

    /// Starts a new batch, clearing counters from any previous one.
    pub fn begin(&self, total_combinations: usize) {
        if let Ok(mut data) = self.inner.lock() {
            data.total_combinations = total_combinations;
            data.completed_combinations = 0;
            data.failed_combinations = 0;
            data.best_score = None;
        }
    }

    /// Records one finished combination; `None` marks a failed run.
    pub fn record(&self, score: Option<f64>) {
        if let Ok(mut data) = self.inner.lock() {
            data.completed_combinations += 1;
            match score {
                Some(score) if score.is_finite() => {
                    data.best_score = Some(data.best_score.map_or(score, |best| best.max(score)));
                }
                Some(_) => {}
                None => data.failed_combinations += 1,
            }
        }
    }

    pub fn snapshot(&self) -> OptimizerStatusSnapshot {
        if let Ok(data) = self.inner.lock() {
            OptimizerStatusSnapshot {
                phase: data.phase.clone(),
                total_combinations: data.total_combinations,
                completed_combinations: data.completed_combinations,
                failed_combinations: data.failed_combinations,
                best_score: data.best_score,
            }
        } else {
            OptimizerStatusSnapshot {
                phase: "Status unavailable".to_string(),
                total_combinations: 0,
                completed_combinations: 0,
                failed_combinations: 0,
                best_score: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tracks_best_and_failures() {
        let status = OptimizerStatus::new();
        assert_eq!(status.snapshot().phase, "Initializing");

        status.begin(4);
        status.record(Some(1.5));
        status.record(None);
        status.record(Some(f64::NAN));
        status.clone().record(Some(2.5));

        let snapshot = status.snapshot();
        assert_eq!(snapshot.total_combinations, 4);
        assert_eq!(snapshot.completed_combinations, 4);
        assert_eq!(snapshot.failed_combinations, 1);
        assert_eq!(snapshot.best_score, Some(2.5));

        status.begin(2);
        assert_eq!(status.snapshot().best_score, None);
    }
}
