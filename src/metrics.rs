use crate::confidence::{self, ConfidenceInterval};
use crate::dates::{self, Timestamp, MINUTE_MILLIS};
use std::collections::BTreeMap;

/// Aggregate earned-value statistics for one schedule.
///
/// Field conventions follow classic EVM vocabulary: `plan()` is BCWS,
/// `earned_value()` is BCWP, `actual()` is ACWP, `total_plan()` is BAC.
/// All times are minutes.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub total_plan_time: f64,
    pub earned_value_time: f64,
    pub actual_time: f64,
    pub plan_time: f64,
    /// Planned direct time in completed (and partially elapsed) periods.
    pub total_schedule_plan_time: f64,
    /// Actual direct time in completed (and partially elapsed) periods.
    pub total_schedule_actual_time: f64,
    pub indirect_time: f64,
    pub total_baseline_time: f64,

    pub start_date: Option<Timestamp>,
    pub current_date: Option<Timestamp>,
    pub plan_date: Option<Timestamp>,
    pub baseline_date: Option<Timestamp>,
    pub replan_date: Option<Timestamp>,
    pub forecast_date: Option<Timestamp>,

    /// How far into the current schedule period the effective date sits.
    pub(crate) period_percent: f64,
    pub(crate) period_end: Option<Timestamp>,

    /// message -> full name of the offending task
    pub errors: Option<BTreeMap<String, String>>,
    pub error_qualifier: Option<String>,

    pub cost_interval: Option<Box<dyn ConfidenceInterval>>,
    pub time_err_interval: Option<Box<dyn ConfidenceInterval>>,
    pub completion_date_interval: Option<Box<dyn ConfidenceInterval>>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            total_baseline_time: f64::NAN,
            ..Default::default()
        }
    }

    pub fn reset(
        &mut self,
        start: Option<Timestamp>,
        current: Timestamp,
        period_start: Option<Timestamp>,
        period_end: Option<Timestamp>,
    ) {
        self.total_plan_time = 0.0;
        self.earned_value_time = 0.0;
        self.actual_time = 0.0;
        self.plan_time = 0.0;
        self.indirect_time = 0.0;
        self.total_schedule_plan_time = 0.0;
        self.total_schedule_actual_time = 0.0;
        self.total_baseline_time = f64::NAN;
        self.start_date = start;
        self.current_date = Some(current);
        self.plan_date = None;
        self.baseline_date = None;
        self.replan_date = None;
        self.forecast_date = None;
        self.errors = None;
        match (period_start, period_end) {
            (Some(ps), Some(pe)) if pe > ps => {
                let elapsed = current.millis() - ps.millis();
                let length = pe.millis() - ps.millis();
                self.period_percent = (elapsed as f64 / length as f64).clamp(0.0, 1.0);
                self.period_end = Some(pe);
            }
            _ => {
                self.period_end = Some(current);
                self.period_percent = 0.0;
            }
        }
    }

    /// Fold one task into the totals. Completed tasks earn their planned
    /// value; tasks planned for the current period earn partial plan
    /// credit proportional to the elapsed fraction of the period.
    pub fn add_task(
        &mut self,
        plan_time: f64,
        actual_time: f64,
        plan_date: Option<Timestamp>,
        actual_date: Option<Timestamp>,
    ) {
        self.total_plan_time += plan_time;

        if actual_date.is_some() {
            self.earned_value_time += plan_time;
            self.actual_time += actual_time;
        }

        if let (Some(pd), Some(current)) = (plan_date, self.current_date) {
            if pd < current {
                self.plan_time += plan_time;
            } else if let Some(pe) = self.period_end {
                if pe >= pd {
                    self.plan_time += plan_time * self.period_percent;
                }
            }
        }

        self.plan_date = dates::max_plan_date(self.plan_date, plan_date);
    }

    pub fn add_indirect_time(&mut self, indirect_time: f64) {
        self.indirect_time += indirect_time;
    }

    pub fn add_error(&mut self, message: impl Into<String>, task_full_name: impl Into<String>) {
        self.errors
            .get_or_insert_with(BTreeMap::new)
            .insert(message.into(), task_full_name.into());
    }

    pub fn set_error_qualifier(&mut self, qualifier: impl Into<String>) {
        self.error_qualifier = Some(qualifier.into());
    }

    /// Messages ending in a space are warnings rather than hard errors.
    pub fn is_warning_only(errors: &BTreeMap<String, String>) -> bool {
        errors.keys().all(|m| m.ends_with(' '))
    }

    pub fn set_baseline_data(&mut self, baseline_date: Option<Timestamp>, baseline_cost: f64) {
        self.baseline_date = baseline_date;
        self.total_baseline_time = baseline_cost;
    }

    pub fn set_replan_date(&mut self, date: Option<Timestamp>) {
        self.replan_date = date.filter(|d| !d.is_never());
    }

    pub fn set_forecast_date(&mut self, date: Option<Timestamp>) {
        self.forecast_date = date.filter(|d| !d.is_never());
    }

    // ---- derived quantities -------------------------------------------

    pub fn earned_value(&self) -> f64 {
        self.earned_value_time
    }

    pub fn actual(&self) -> f64 {
        self.actual_time
    }

    pub fn plan(&self) -> f64 {
        self.plan_time
    }

    pub fn total_plan(&self) -> f64 {
        self.total_plan_time
    }

    pub fn cost_variance(&self) -> f64 {
        self.earned_value() - self.actual()
    }

    pub fn schedule_variance(&self) -> f64 {
        self.earned_value() - self.plan()
    }

    pub fn cost_variance_percentage(&self) -> f64 {
        self.cost_variance() / self.earned_value()
    }

    pub fn schedule_variance_percentage(&self) -> f64 {
        self.schedule_variance() / self.plan()
    }

    pub fn baseline_growth(&self) -> f64 {
        self.total_plan() - self.total_baseline_time
    }

    pub fn cost_performance_index(&self) -> f64 {
        self.earned_value() / self.actual()
    }

    pub fn schedule_performance_index(&self) -> f64 {
        self.earned_value() / self.plan()
    }

    pub fn direct_time_performance_index(&self) -> f64 {
        self.total_schedule_plan_time / self.total_schedule_actual_time
    }

    /// CPI of the current plan, or the ratio implied by the historical
    /// cost interval when the plan has no usable CPI yet.
    pub fn cost_performance_index_eff(&self) -> f64 {
        effective_index(self.cost_performance_index(), self.cost_interval.as_deref())
    }

    pub fn direct_time_performance_index_eff(&self) -> f64 {
        effective_index(
            self.direct_time_performance_index(),
            self.time_err_interval.as_deref(),
        )
    }

    pub fn percent_complete(&self) -> f64 {
        self.earned_value() / self.total_plan()
    }

    pub fn percent_spent(&self) -> f64 {
        self.actual() / self.total_plan()
    }

    pub fn incomplete_task_plan_time(&self) -> f64 {
        self.total_plan() - self.earned_value()
    }

    pub fn to_complete_performance_index(&self) -> f64 {
        (self.total_plan() - self.earned_value()) / (self.total_plan() - self.actual())
    }

    pub fn improvement_ratio(&self) -> f64 {
        (self.to_complete_performance_index() / self.cost_performance_index()) - 1.0
    }

    pub fn replan_cost(&self) -> f64 {
        self.total_plan() - self.cost_variance()
    }

    pub fn independent_forecast_cost(&self) -> f64 {
        self.total_plan() / self.cost_performance_index()
    }

    /// Forecast cost of the current plan, falling back to the cost
    /// interval's prediction when the plan's own CPI is unusable.
    pub fn independent_forecast_cost_eff(&self) -> f64 {
        let result = self.independent_forecast_cost();
        if dates::bad_double(result) {
            if let Some(ci) = &self.cost_interval {
                return self.actual_time + ci.prediction();
            }
        }
        result
    }

    pub fn independent_forecast_cost_lpi(&self) -> f64 {
        match &self.cost_interval {
            Some(ci) => self.actual_time + ci.lpi(0.70),
            None => f64::NAN,
        }
    }

    pub fn independent_forecast_cost_upi(&self) -> f64 {
        match &self.cost_interval {
            Some(ci) => self.actual_time + ci.upi(0.70),
            None => f64::NAN,
        }
    }

    /// Minutes elapsed since the start of the schedule.
    pub fn elapsed(&self) -> f64 {
        match (self.start_date, self.current_date) {
            (Some(s), Some(c)) => (c.millis() - s.millis()) as f64 / MINUTE_MILLIS as f64,
            _ => f64::NAN,
        }
    }

    pub fn independent_forecast_date(&self) -> Option<Timestamp> {
        self.forecast_date
    }

    pub fn independent_forecast_duration(&self) -> f64 {
        calc_duration(self.start_date, self.forecast_date)
    }

    pub fn independent_forecast_date_lpi(&self) -> Option<Timestamp> {
        self.completion_date_interval
            .as_ref()
            .and_then(|ci| convert_to_date(ci.lpi(0.70)))
    }

    pub fn independent_forecast_date_upi(&self) -> Option<Timestamp> {
        self.completion_date_interval
            .as_ref()
            .and_then(|ci| convert_to_date(ci.upi(0.70)))
    }

    // ---- viability ----------------------------------------------------

    /// Retarget and prune the attached intervals. Losing the cost interval
    /// cascades: without a usable cost basis, neither the time-error nor
    /// the completion-date interval can stand.
    pub fn recalc_viability(&mut self) {
        let target_cost = self.independent_forecast_cost() - self.actual();
        if let Some(ci) = self.cost_interval.as_mut() {
            // a historical interval can be viable even when this plan has no
            // forecast cost of its own; leave its viability alone in that case
            if !dates::bad_double(target_cost) {
                ci.retarget(target_cost, 0.7);
            }
        }
        if unviable(self.cost_interval.as_deref()) {
            self.cost_interval = None;
            self.time_err_interval = None;
            self.completion_date_interval = None;
        }

        if let Some(ci) = self.completion_date_interval.as_mut() {
            let target = self.forecast_date.map(|d| d.millis() as f64).unwrap_or(-1.0);
            ci.retarget(target, 0.7);
        }
        if unviable(self.completion_date_interval.as_deref()) {
            self.completion_date_interval = None;
        }
    }
}

fn effective_index(index: f64, interval: Option<&dyn ConfidenceInterval>) -> f64 {
    if dates::bad_double(index) {
        if let Some(ratio) = interval.and_then(|ci| ci.actual_vs_plan_ratio()) {
            return 1.0 / ratio;
        }
    }
    index
}

pub(crate) fn unviable(interval: Option<&dyn ConfidenceInterval>) -> bool {
    match interval {
        None => false,
        Some(ci) => ci.viability() <= confidence::ACCEPTABLE,
    }
}

pub(crate) fn convert_to_date(millis: f64) -> Option<Timestamp> {
    if dates::bad_double(millis) || millis == i64::MAX as f64 {
        None
    } else {
        Some(Timestamp::from_millis(millis as i64))
    }
}

pub(crate) fn calc_duration(start: Option<Timestamp>, end: Option<Timestamp>) -> f64 {
    match (start, end) {
        (Some(s), Some(e)) => (e.millis() - s.millis()) as f64 / MINUTE_MILLIS as f64,
        _ => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::WEEK_MILLIS;

    fn t(weeks: i64) -> Timestamp {
        Timestamp::from_millis(weeks * WEEK_MILLIS)
    }

    #[test]
    fn completed_tasks_earn_their_planned_value() {
        let mut m = PerformanceMetrics::new();
        m.reset(Some(t(1)), t(3), Some(t(2)), Some(t(4)));

        m.add_task(600.0, 700.0, Some(t(2)), Some(t(2)));
        m.add_task(400.0, 0.0, Some(t(10)), None);

        assert_eq!(m.total_plan(), 1000.0);
        assert_eq!(m.earned_value(), 600.0);
        assert_eq!(m.actual(), 700.0);
        // only the completed task's plan date has passed
        assert_eq!(m.plan(), 600.0);
        assert_eq!(m.plan_date, Some(t(10)));
        assert!((m.percent_complete() - 0.6).abs() < 1e-9);
        assert!((m.cost_performance_index() - 600.0 / 700.0).abs() < 1e-9);
    }

    #[test]
    fn tasks_due_this_period_get_partial_plan_credit() {
        let mut m = PerformanceMetrics::new();
        // halfway through the period from week 2 to week 4
        m.reset(Some(t(0)), t(3), Some(t(2)), Some(t(4)));

        m.add_task(100.0, 0.0, Some(t(4)), None);
        assert!((m.plan() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn never_forecast_collapses_to_none() {
        let mut m = PerformanceMetrics::new();
        m.set_forecast_date(Some(Timestamp::NEVER));
        assert_eq!(m.forecast_date, None);
        m.set_forecast_date(Some(t(5)));
        assert_eq!(m.forecast_date, Some(t(5)));
    }

    #[test]
    fn warning_only_requires_trailing_space() {
        let mut m = PerformanceMetrics::new();
        m.add_error("soft warning ", "project/a");
        assert!(PerformanceMetrics::is_warning_only(m.errors.as_ref().unwrap()));
        m.add_error("hard error", "project/b");
        assert!(!PerformanceMetrics::is_warning_only(m.errors.as_ref().unwrap()));
    }
}
