use crate::dates::Timestamp;
use serde::{Deserialize, Serialize};

/// Planned-time figures closer together than this many minutes are treated
/// as equal when looking for top-down vs bottom-up mismatches.
pub const PLAN_TIME_TOLERANCE: f64 = 0.5;

/// Tuning knobs consumed by the recalculation engine and the forecast
/// strategies. Percentages are clamped into `[0, 1]` by [`EvSettings::sanitized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvSettings {
    /// Noise threshold (minutes) for plan-time mismatch errors.
    pub plan_time_tolerance: f64,
    /// Assumed completion fraction for badly overspent in-progress tasks.
    pub almost_done_pct: f64,
    /// Cap on the CPI-driven adjustment applied to underspent tasks.
    pub max_cpi_correction: f64,
    /// When false, tasks completed after the schedule start keep their
    /// original ordering instead of floating to the front of the leaf list.
    pub reorder_completed: bool,
    /// Credit the in-progress schedule period proportionally when
    /// computing direct-time performance.
    pub use_partial_dtpi: bool,
    /// Number of randomized trials behind optimized-date intervals.
    pub optimization_trials: usize,
    /// Fixed effective date, for deterministic replay. `None` means "now".
    pub effective_date: Option<Timestamp>,
}

impl Default for EvSettings {
    fn default() -> Self {
        Self {
            plan_time_tolerance: PLAN_TIME_TOLERANCE,
            almost_done_pct: 0.9,
            max_cpi_correction: 0.2,
            reorder_completed: true,
            use_partial_dtpi: true,
            optimization_trials: 200,
            effective_date: None,
        }
    }
}

impl EvSettings {
    /// Clamp out-of-range percentage settings rather than rejecting them.
    pub fn sanitized(mut self) -> Self {
        self.almost_done_pct = self.almost_done_pct.clamp(0.0, 1.0);
        self.max_cpi_correction = self.max_cpi_correction.clamp(0.0, 1.0);
        if !self.plan_time_tolerance.is_finite() || self.plan_time_tolerance < 0.0 {
            self.plan_time_tolerance = PLAN_TIME_TOLERANCE;
        }
        self
    }

    pub fn effective_date_or_now(&self) -> Timestamp {
        self.effective_date.unwrap_or_else(Timestamp::now)
    }
}
