//! Combining several schedules into one.
//!
//! A rollup ledger's period boundaries are the set union of its
//! children's boundaries; each child period's data is distributed over
//! the overlapping combined periods in proportion to overlap length, so
//! totals are conserved exactly. The metrics carry extra "optimized"
//! dates answering "when would we finish if the whole team could work on
//! whatever remains" alongside the plain latest-child dates.

use crate::confidence::ConfidenceInterval;
use crate::dates::{self, Timestamp};
use crate::forecast::{self, replan_extrapolated_date_with};
use crate::metrics::{self, PerformanceMetrics, unviable};
use crate::schedule::{Period, TimePhasedSchedule};
use crate::settings::EvSettings;
use std::collections::BTreeSet;
use tracing::{debug, trace};

/// One schedule feeding a rollup, already recalculated. `rollup` is set
/// when the child is itself a rollup, making this a rollup of rollups.
pub struct RollupChild<'a> {
    pub schedule: &'a TimePhasedSchedule,
    pub root_name: &'a str,
    pub rollup: Option<&'a RollupMetrics>,
}

impl<'a> RollupChild<'a> {
    pub fn new(schedule: &'a TimePhasedSchedule, root_name: &'a str) -> Self {
        Self { schedule, root_name, rollup: None }
    }

    pub fn of_rollup(
        schedule: &'a TimePhasedSchedule,
        root_name: &'a str,
        rollup: &'a RollupMetrics,
    ) -> Self {
        Self { schedule, root_name, rollup: Some(rollup) }
    }
}

/// The rollup-only metrics riding alongside the combined schedule's
/// [`PerformanceMetrics`].
#[derive(Debug, Clone, Default)]
pub struct RollupMetrics {
    /// Sum of the children's effective forecast costs.
    pub independent_forecast_cost: f64,
    pub optimized_plan_date: Option<Timestamp>,
    pub optimized_replan_date: Option<Timestamp>,
    pub optimized_forecast_date: Option<Timestamp>,
    pub optimized_date_interval: Option<Box<dyn ConfidenceInterval>>,
    pub is_rollup_of_rollups: bool,

    pub earliest_plan_date: Option<Timestamp>,
    pub earliest_replan_date: Option<Timestamp>,
    pub earliest_forecast_date: Option<Timestamp>,

    rollup_of_optimized_plan_dates: Option<Timestamp>,
    rollup_of_optimized_replan_dates: Option<Timestamp>,
    rollup_of_optimized_forecast_dates: Option<Timestamp>,
}

impl RollupMetrics {
    pub fn optimized_forecast_duration(&self, base: &PerformanceMetrics) -> f64 {
        metrics::calc_duration(base.start_date, self.optimized_forecast_date)
    }

    pub fn optimized_forecast_date_lpi(&self) -> Option<Timestamp> {
        self.optimized_date_interval
            .as_ref()
            .and_then(|ci| metrics::convert_to_date(ci.lpi(0.70)))
    }

    pub fn optimized_forecast_date_upi(&self) -> Option<Timestamp> {
        self.optimized_date_interval
            .as_ref()
            .and_then(|ci| metrics::convert_to_date(ci.upi(0.70)))
    }
}

/// A schedule rolled up from several child schedules. The children can be
/// plain schedules or other rollups; they must be recalculated before
/// [`recalc`](Self::recalc) runs.
#[derive(Debug)]
pub struct ScheduleRollup {
    pub schedule: TimePhasedSchedule,
    pub rollup: RollupMetrics,
}

impl Default for ScheduleRollup {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleRollup {
    pub fn new() -> Self {
        Self {
            schedule: TimePhasedSchedule::with_default_week(Timestamp::now()),
            rollup: RollupMetrics::default(),
        }
    }

    pub fn recalc(&mut self, children: &[RollupChild<'_>], settings: &EvSettings) {
        debug!(children = children.len(), "recalculating rollup schedule");
        self.recreate_periods(children);
        self.reset_metrics();

        for child in children {
            self.add_schedule_data(child);
        }
        self.calculate_cum_values();

        self.recalc_forecast_date(children, settings);
        self.recalc_viability();
    }

    /// Rebuild the period list from scratch: one boundary for every
    /// distinct period boundary of any child, all data zeroed.
    fn recreate_periods(&mut self, children: &[RollupChild<'_>]) {
        let mut boundaries: BTreeSet<Timestamp> = BTreeSet::new();
        for child in children {
            for p in child.schedule.periods() {
                boundaries.insert(p.end_date);
            }
        }

        if boundaries.is_empty() {
            let now = Timestamp::now();
            self.schedule = TimePhasedSchedule::with_default_week(now);
            self.schedule.set_effective_date(now);
        } else {
            let periods: Vec<Period> =
                boundaries.into_iter().map(|end| Period::new(end, 0.0)).collect();
            self.schedule = TimePhasedSchedule::from_periods(periods);
            // the latest child effective date; children are assumed to have
            // posted everything they know
            let mut effective: Option<Timestamp> = None;
            for child in children {
                effective = dates::max_plan_date(effective, child.schedule.effective_date());
            }
            self.schedule
                .set_effective_date(effective.unwrap_or_else(Timestamp::now));
        }
        // a merged ledger never grows on its own
        self.schedule.default_plan_total_time = 0.0;
        self.schedule.default_plan_direct_time = 0.0;
    }

    fn reset_metrics(&mut self) {
        let effective = self.schedule.effective_date();
        let m = &mut self.schedule.metrics;
        m.total_plan_time = 0.0;
        m.earned_value_time = 0.0;
        m.actual_time = 0.0;
        m.plan_time = 0.0;
        m.total_schedule_plan_time = 0.0;
        m.total_schedule_actual_time = 0.0;
        m.indirect_time = 0.0;
        m.current_date = effective;
        m.start_date = None;
        m.plan_date = None;
        // accumulators: the sentinel means "no child considered yet",
        // a missing child date poisons them to None
        m.replan_date = Some(Timestamp::LONG_AGO);
        m.forecast_date = Some(Timestamp::LONG_AGO);
        m.errors = None;

        self.rollup.independent_forecast_cost = 0.0;
        self.rollup.is_rollup_of_rollups = false;
        self.rollup.rollup_of_optimized_plan_dates = None;
        self.rollup.rollup_of_optimized_replan_dates = Some(Timestamp::LONG_AGO);
        self.rollup.rollup_of_optimized_forecast_dates = Some(Timestamp::LONG_AGO);
        self.rollup.earliest_plan_date = Some(Timestamp::NEVER);
        self.rollup.earliest_replan_date = Some(Timestamp::NEVER);
        self.rollup.earliest_forecast_date = Some(Timestamp::NEVER);
    }

    fn add_schedule_data(&mut self, child: &RollupChild<'_>) {
        let mut src = child.schedule.clone();
        src.calc_individual_values();
        for i in 0..src.len() {
            self.add_period_data(src.begin_date(i), src.get(i));
        }
        self.add_metrics(child);
    }

    /// Distribute one child period over the combined periods it overlaps,
    /// pro rata by overlap length.
    fn add_period_data(&mut self, src_begin: Timestamp, src: &Period) {
        let src_start = src_begin.millis();
        let src_end = src.end_date.millis();
        let src_length = src_end - src_start;
        if src_length <= 0 {
            return;
        }

        let mut dest_end = Timestamp::LONG_AGO.millis();
        for dest in self.schedule.periods_mut().iter_mut() {
            let dest_start = dest_end;
            dest_end = dest.end_date.millis();
            if dest_end < src_start {
                continue;
            }

            let overlap_start = src_start.max(dest_start);
            let overlap_end = src_end.min(dest_end);
            let overlap = overlap_end - overlap_start;
            if overlap > 0 {
                let percent = overlap as f64 / src_length as f64;
                dest.plan_total_time += percent * src.plan_total_time;
                dest.plan_direct_time += percent * src.plan_direct_time;
                dest.plan_value += percent * src.plan_value;
                dest.actual_direct_time += percent * src.actual_direct_time;
                dest.actual_indirect_time += percent * src.actual_indirect_time;
                dest.earned_value += percent * src.earned_value;
                dest.actual_cost += percent * src.actual_cost;
            }
            if dest_end > src_end {
                break;
            }
        }
    }

    fn add_metrics(&mut self, child: &RollupChild<'_>) {
        let that = &child.schedule.metrics;
        let m = &mut self.schedule.metrics;
        m.total_plan_time += that.total_plan_time;
        m.earned_value_time += that.earned_value_time;
        m.actual_time += that.actual_time;
        m.plan_time += that.plan_time;
        m.total_schedule_plan_time += that.total_schedule_plan_time;
        m.total_schedule_actual_time += that.total_schedule_actual_time;
        m.indirect_time += that.indirect_time;
        self.rollup.independent_forecast_cost += that.independent_forecast_cost_eff();

        m.start_date = dates::min_start_date(m.start_date, that.start_date);
        m.plan_date = dates::max_plan_date(m.plan_date, that.plan_date);
        m.replan_date = dates::max_forecast_date(m.replan_date, that.replan_date);
        m.forecast_date =
            dates::max_forecast_date(m.forecast_date, that.independent_forecast_date());

        match child.rollup {
            Some(that_rollup) => {
                self.rollup.is_rollup_of_rollups = true;
                self.rollup.rollup_of_optimized_plan_dates = dates::max_plan_date(
                    self.rollup.rollup_of_optimized_plan_dates,
                    that_rollup.optimized_plan_date.or(that.plan_date),
                );
                self.rollup.rollup_of_optimized_replan_dates = dates::max_forecast_date(
                    self.rollup.rollup_of_optimized_replan_dates,
                    that_rollup.optimized_replan_date.or(that.replan_date),
                );
                self.rollup.rollup_of_optimized_forecast_dates = dates::max_forecast_date(
                    self.rollup.rollup_of_optimized_forecast_dates,
                    that_rollup
                        .optimized_forecast_date
                        .or_else(|| that.independent_forecast_date()),
                );
                self.rollup.earliest_plan_date =
                    min_date(self.rollup.earliest_plan_date, that_rollup.earliest_plan_date);
                self.rollup.earliest_replan_date =
                    min_date(self.rollup.earliest_replan_date, that_rollup.earliest_replan_date);
                self.rollup.earliest_forecast_date = min_date(
                    self.rollup.earliest_forecast_date,
                    that_rollup.earliest_forecast_date,
                );
            }
            None => {
                self.rollup.rollup_of_optimized_plan_dates = dates::max_plan_date(
                    self.rollup.rollup_of_optimized_plan_dates,
                    that.plan_date,
                );
                self.rollup.rollup_of_optimized_replan_dates = dates::max_forecast_date(
                    self.rollup.rollup_of_optimized_replan_dates,
                    that.replan_date,
                );
                self.rollup.rollup_of_optimized_forecast_dates = dates::max_forecast_date(
                    self.rollup.rollup_of_optimized_forecast_dates,
                    that.independent_forecast_date(),
                );
                self.rollup.earliest_plan_date =
                    min_date(self.rollup.earliest_plan_date, that.plan_date);
                self.rollup.earliest_replan_date =
                    min_date(self.rollup.earliest_replan_date, that.replan_date);
                self.rollup.earliest_forecast_date =
                    min_date(self.rollup.earliest_forecast_date, that.forecast_date);
            }
        }

        if let Some(errors) = &that.errors {
            let qualifier = format!("[{}] ", child.root_name);
            for (message, task) in errors {
                self.schedule
                    .metrics
                    .add_error(format!("{qualifier}{message}"), task.clone());
            }
        }
    }

    /// Rebuild every cumulative column from the per-period figures.
    fn calculate_cum_values(&mut self) {
        let mut cum_plan_time = 0.0;
        let mut cum_plan_value = 0.0;
        let mut cum_actual_time = 0.0;
        let mut cum_earned_value = 0.0;
        let mut cum_actual_cost = 0.0;
        for p in self.schedule.periods_mut().iter_mut() {
            cum_plan_time += p.plan_direct_time;
            cum_plan_value += p.plan_value;
            cum_actual_time += p.actual_direct_time;
            cum_earned_value += p.earned_value;
            cum_actual_cost += p.actual_cost;
            p.cum_plan_direct_time = cum_plan_time;
            p.cum_plan_value = cum_plan_value;
            p.cum_actual_direct_time = cum_actual_time;
            p.cum_earned_value = cum_earned_value;
            p.cum_actual_cost = cum_actual_cost;
        }
    }

    /// "When would we finish if the whole team could work the remaining
    /// plan": grow a copy of every child far enough to absorb `cum_plan_time`,
    /// merge the grown copies, and interpolate the date within the merge.
    pub fn hypothetical_date(
        &self,
        children: &[RollupChild<'_>],
        cum_plan_time: f64,
        use_dtpi: bool,
    ) -> Timestamp {
        let mut grown = Vec::with_capacity(children.len());
        for child in children {
            let mut s = child.schedule.clone();
            s.clean_up();
            if use_dtpi {
                s.multiply(1.0 / s.metrics.direct_time_performance_index_eff());
            }
            s.get_planned_completion_date(cum_plan_time, cum_plan_time);
            grown.push(s);
        }

        let mut scratch = ScheduleRollup::new();
        let scratch_children: Vec<RollupChild<'_>> =
            grown.iter().map(|s| RollupChild::new(s, "")).collect();
        scratch.recreate_periods(&scratch_children);
        for child in &scratch_children {
            let mut src = child.schedule.clone();
            src.calc_individual_values();
            for i in 0..src.len() {
                scratch.add_period_data(src.begin_date(i), src.get(i));
            }
        }
        scratch.calculate_cum_values();

        let result = scratch.schedule.extrapolate_within_schedule(cum_plan_time);
        trace!(cum_plan_time, use_dtpi, %result, "rollup hypothetical date");
        result
    }

    fn recalc_forecast_date(&mut self, children: &[RollupChild<'_>], settings: &EvSettings) {
        // collapse untouched or poisoned accumulators
        let m = &mut self.schedule.metrics;
        if m.replan_date.is_some_and(|d| d.is_sentinel()) {
            m.replan_date = None;
        }
        if m.forecast_date.is_some_and(|d| d.is_sentinel()) {
            m.forecast_date = None;
        }

        if self.rollup.is_rollup_of_rollups {
            let m = &self.schedule.metrics;
            self.rollup.optimized_plan_date =
                filter_non_unique_date(self.rollup.rollup_of_optimized_plan_dates, m.plan_date);
            self.rollup.optimized_replan_date =
                filter_non_unique_date(self.rollup.rollup_of_optimized_replan_dates, m.replan_date)
                    .filter(|d| !d.is_long_ago());
            self.rollup.optimized_forecast_date = filter_non_unique_date(
                self.rollup.rollup_of_optimized_forecast_dates,
                m.forecast_date,
            )
            .filter(|d| !d.is_long_ago());
        } else {
            let plan_total = self.schedule.metrics.total_plan();
            let date = self.hypothetical_date(children, plan_total, false);
            self.rollup.optimized_plan_date = if date.is_never() { None } else { Some(date) };

            self.rollup.optimized_replan_date =
                replan_extrapolated_date_with(&self.schedule.metrics, settings, |artificial| {
                    self.hypothetical_date(children, artificial, false)
                });

            // balanced schedule extrapolation of the optimized forecast
            let forecast_cost = self.schedule.metrics.independent_forecast_cost_eff();
            let date = self.hypothetical_date(children, forecast_cost, true);
            let candidate = if date.is_never() { None } else { Some(date) };
            self.rollup.optimized_forecast_date =
                if forecast::is_forecast_invalid(candidate, &self.schedule.metrics) {
                    None
                } else {
                    candidate
                };
        }
    }

    pub(crate) fn recalc_viability(&mut self) {
        self.schedule.metrics.recalc_viability();
        if self.schedule.metrics.cost_interval.is_none() {
            self.rollup.optimized_date_interval = None;
            return;
        }
        if let Some(ci) = self.rollup.optimized_date_interval.as_mut() {
            let target = self
                .rollup
                .optimized_forecast_date
                .map(|d| d.millis() as f64)
                .unwrap_or(-1.0);
            ci.retarget(target, 0.7);
        }
        if unviable(self.rollup.optimized_date_interval.as_deref()) {
            self.rollup.optimized_date_interval = None;
        }
    }
}

fn min_date(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// A rollup-of-rollups only reports an optimized date when it actually
/// differs from the plain one; matching dates carry no extra information.
fn filter_non_unique_date(a: Option<Timestamp>, b: Option<Timestamp>) -> Option<Timestamp> {
    match a {
        Some(d) if Some(d) != b => Some(d),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::WEEK_MILLIS;

    fn ts(weeks: i64) -> Timestamp {
        Timestamp::from_millis(1_500_000_000_000 + weeks * WEEK_MILLIS)
    }

    fn child_schedule(start: Timestamp, minutes_per_week: f64, weeks: usize) -> TimePhasedSchedule {
        let mut s = TimePhasedSchedule::new(start, minutes_per_week);
        for _ in 1..weeks {
            s.add_row();
        }
        s.recalc_cum_plan_times();
        s.set_effective_date(start.plus_millis(WEEK_MILLIS));
        s.metrics.reset(
            Some(start),
            start.plus_millis(WEEK_MILLIS),
            Some(start),
            Some(start.plus_millis(WEEK_MILLIS)),
        );
        s
    }

    #[test]
    fn union_periods_preserve_every_boundary() {
        let a = child_schedule(ts(0), 600.0, 2);
        // offset by half a week so the boundaries interleave
        let b = child_schedule(ts(0).plus_millis(WEEK_MILLIS / 2), 300.0, 2);

        let mut rollup = ScheduleRollup::new();
        rollup.recalc(
            &[RollupChild::new(&a, "a"), RollupChild::new(&b, "b")],
            &EvSettings::default(),
        );

        let mut boundaries: Vec<Timestamp> =
            rollup.schedule.periods().iter().map(|p| p.end_date).collect();
        let mut expected: Vec<Timestamp> = a
            .periods()
            .iter()
            .chain(b.periods())
            .map(|p| p.end_date)
            .collect();
        expected.sort();
        expected.dedup();
        boundaries.sort();
        assert_eq!(boundaries, expected);
    }

    #[test]
    fn plan_time_is_conserved_across_the_merge() {
        let a = child_schedule(ts(0), 600.0, 3);
        let b = child_schedule(ts(0).plus_millis(WEEK_MILLIS / 3), 450.0, 2);
        let total: f64 = a
            .periods()
            .iter()
            .chain(b.periods())
            .map(|p| p.plan_direct_time)
            .sum();

        let mut rollup = ScheduleRollup::new();
        rollup.recalc(
            &[RollupChild::new(&a, "a"), RollupChild::new(&b, "b")],
            &EvSettings::default(),
        );

        let merged = rollup.schedule.last().cum_plan_direct_time;
        assert!((merged - total).abs() < 1e-6, "merged {merged}, expected {total}");
    }

    #[test]
    fn metrics_totals_sum_the_children() {
        let mut a = child_schedule(ts(0), 600.0, 2);
        a.metrics.total_plan_time = 1200.0;
        a.metrics.earned_value_time = 300.0;
        a.metrics.actual_time = 350.0;
        let mut b = child_schedule(ts(0), 300.0, 2);
        b.metrics.total_plan_time = 600.0;
        b.metrics.earned_value_time = 200.0;
        b.metrics.actual_time = 150.0;

        let mut rollup = ScheduleRollup::new();
        rollup.recalc(
            &[RollupChild::new(&a, "a"), RollupChild::new(&b, "b")],
            &EvSettings::default(),
        );

        let m = &rollup.schedule.metrics;
        assert_eq!(m.total_plan(), 1800.0);
        assert_eq!(m.earned_value(), 500.0);
        assert_eq!(m.actual(), 500.0);
    }

    #[test]
    fn effective_date_is_the_latest_child() {
        let a = child_schedule(ts(0), 600.0, 2);
        let mut b = child_schedule(ts(0), 300.0, 4);
        b.set_effective_date(ts(3));

        let mut rollup = ScheduleRollup::new();
        rollup.recalc(
            &[RollupChild::new(&a, "a"), RollupChild::new(&b, "b")],
            &EvSettings::default(),
        );
        assert_eq!(rollup.schedule.effective_date(), Some(ts(3)));
    }

    #[test]
    fn child_errors_are_qualified_with_the_root_name() {
        let mut a = child_schedule(ts(0), 600.0, 2);
        a.metrics.add_error("The task X has no planned time ", "x/X");

        let mut rollup = ScheduleRollup::new();
        rollup.recalc(&[RollupChild::new(&a, "Team A")], &EvSettings::default());

        let errors = rollup.schedule.metrics.errors.as_ref().expect("errors");
        assert!(errors.keys().any(|m| m.starts_with("[Team A] ")));
    }

    #[test]
    fn forecast_accumulator_poisons_on_a_missing_child_date() {
        let mut a = child_schedule(ts(0), 600.0, 2);
        a.metrics.forecast_date = Some(ts(5));
        let b = child_schedule(ts(0), 300.0, 2); // no forecast

        let mut rollup = ScheduleRollup::new();
        rollup.recalc(
            &[RollupChild::new(&a, "a"), RollupChild::new(&b, "b")],
            &EvSettings::default(),
        );
        assert_eq!(rollup.schedule.metrics.forecast_date, None);
    }

    #[test]
    fn rollup_of_rollups_drops_duplicate_optimized_dates() {
        assert_eq!(filter_non_unique_date(Some(ts(2)), Some(ts(2))), None);
        assert_eq!(filter_non_unique_date(Some(ts(2)), Some(ts(3))), Some(ts(2)));
        assert_eq!(filter_non_unique_date(None, Some(ts(3))), None);
    }

    #[test]
    fn optimized_plan_date_lands_where_merged_capacity_absorbs_the_plan() {
        // two identical 600 min/week schedules; total plan 1200 fits in
        // one combined week
        let mut a = child_schedule(ts(0), 600.0, 4);
        a.metrics.total_plan_time = 1200.0;
        let mut b = child_schedule(ts(0), 600.0, 4);
        b.metrics.total_plan_time = 1200.0;

        let mut rollup = ScheduleRollup::new();
        rollup.recalc(
            &[RollupChild::new(&a, "a"), RollupChild::new(&b, "b")],
            &EvSettings::default(),
        );

        let optimized = rollup.rollup.optimized_plan_date.expect("optimized date");
        assert!(optimized <= ts(2), "got {optimized}");
        // a lone schedule would need four weeks for 2400 minutes; the
        // merged team absorbs each child's share twice as fast
    }
}
