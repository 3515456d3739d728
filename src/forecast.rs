//! Completion-date forecasting strategies.
//!
//! Each strategy looks at the same inputs (the task tree, the schedule
//! ledger, and its metrics) and produces an independent opinion of when
//! the work will finish. The recalculation engines choose which ones to
//! run and in what order.

use crate::dates::{self, Timestamp, MINUTE_MILLIS};
use crate::metrics::PerformanceMetrics;
use crate::schedule::{SplitSchedule, TimePhasedSchedule};
use crate::settings::EvSettings;
use crate::task::{TaskArena, TaskId};
use tracing::debug;

/// A strategy for projecting completion dates onto the schedule metrics
/// and, for the task-level strategies, onto each task in the leaf list.
pub trait ForecastDateCalculator {
    fn calculate_forecast_dates(
        &self,
        arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        ev_leaves: &[TaskId],
        settings: &EvSettings,
    );
}

/// Straight-line extrapolation of the actual earned-value curve: assumes
/// constant staffing, so it is rarely the first choice, but it is a
/// robust fallback when the schedule-aware methods fail.
pub struct SimpleExtrapolation;

impl ForecastDateCalculator for SimpleExtrapolation {
    fn calculate_forecast_dates(
        &self,
        _arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        _ev_leaves: &[TaskId],
        _settings: &EvSettings,
    ) {
        let forecast = simple_extrapolated_forecast(&schedule.metrics);
        debug!(forecast = ?forecast, "simple extrapolation");
        schedule.metrics.set_forecast_date(forecast);
    }
}

fn simple_extrapolated_forecast(metrics: &PerformanceMetrics) -> Option<Timestamp> {
    let start = metrics.start_date?;
    let duration = metrics.elapsed() / metrics.percent_complete();
    if dates::bad_double(duration) {
        return None;
    }
    Some(start.plus_millis((duration * MINUTE_MILLIS as f64) as i64))
}

/// True when a tentative forecast date is unusable: missing, a sentinel,
/// or earlier than today while work remains.
pub(crate) fn is_forecast_invalid(forecast: Option<Timestamp>, metrics: &PerformanceMetrics) -> bool {
    let date = match forecast {
        None => return true,
        Some(d) => d,
    };
    if date.is_long_ago() {
        return true;
    }
    if metrics.earned_value() < metrics.total_plan() {
        if let Some(current) = metrics.current_date {
            if date < current {
                return true;
            }
        }
    }
    false
}

/// Forecast the overall completion date by assuming the current CPI will
/// apply to future tasks and the current DTPI to future time periods.
/// Produces a date for the schedule as a whole, not for individual tasks.
pub struct ScheduleExtrapolation {
    /// Fall back to [`SimpleExtrapolation`] when the result is invalid.
    pub fallback_to_simple: bool,
}

impl ForecastDateCalculator for ScheduleExtrapolation {
    fn calculate_forecast_dates(
        &self,
        _arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        _ev_leaves: &[TaskId],
        _settings: &EvSettings,
    ) {
        let forecast_cost = schedule.metrics.independent_forecast_cost_eff();
        let date = schedule.get_hypothetical_date(forecast_cost, true);
        let mut forecast = if date.is_never() { None } else { Some(date) };
        debug!(forecast_cost, forecast = ?forecast, "schedule extrapolation");

        if is_forecast_invalid(forecast, &schedule.metrics) {
            forecast = if self.fallback_to_simple {
                simple_extrapolated_forecast(&schedule.metrics)
            } else {
                None
            };
        }
        schedule.metrics.set_forecast_date(forecast);
    }
}

/// Ignoring performance indexes, compute the date the schedule would reach
/// if it were replanned today: planned time already elapsed, plus the
/// original planned time of the remaining work net of time already sunk
/// into it.
pub struct ReplanDateExtrapolation;

impl ForecastDateCalculator for ReplanDateExtrapolation {
    fn calculate_forecast_dates(
        &self,
        _arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        _ev_leaves: &[TaskId],
        settings: &EvSettings,
    ) {
        let result = replan_extrapolated_date(schedule, settings);
        schedule.metrics.set_replan_date(result);
    }
}

/// The replan-date computation itself, shared with the rollup engine
/// (which stores the result in its optimized-date slot instead).
pub(crate) fn replan_extrapolated_date(
    schedule: &TimePhasedSchedule,
    settings: &EvSettings,
) -> Option<Timestamp> {
    replan_extrapolated_date_with(&schedule.metrics, settings, |artificial_plan_total| {
        schedule.get_hypothetical_date(artificial_plan_total, false)
    })
}

/// The replan-date formula, parameterized over how a plan total maps to a
/// date so the rollup engine can substitute its merged-ledger projection.
pub(crate) fn replan_extrapolated_date_with(
    m: &PerformanceMetrics,
    settings: &EvSettings,
    hypothetical: impl FnOnce(f64) -> Timestamp,
) -> Option<Timestamp> {
    // original planned time of the tasks not yet completed
    let total_planned_remaining = m.total_plan() - m.earned_value();
    // time already sunk into those same tasks
    let time_spent_on_remaining = m.total_schedule_actual_time - m.actual();

    let mut planned_time_remaining = total_planned_remaining - time_spent_on_remaining;
    // a badly overspent schedule can drive this negative; assume the
    // remaining tasks are almost done instead
    if planned_time_remaining < 0.0 {
        planned_time_remaining = time_spent_on_remaining / settings.almost_done_pct;
    }

    let artificial_plan_total = m.total_schedule_plan_time + planned_time_remaining;
    let date = hypothetical(artificial_plan_total);
    let result = if date.is_never() { None } else { Some(date) };
    if is_forecast_invalid(result, m) {
        None
    } else {
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProjectionTarget {
    Forecast,
    Replan,
}

/// Per-task completion forecasting. Assumes the current CPI applies to
/// future tasks and the current DTPI to future periods, that tasks will
/// complete in leaf-list order, and asks the schedule when each one lands.
///
/// In-progress tasks need care: plan/CPI can come out below the time
/// already spent, so badly overspent tasks are assumed "almost done" and
/// the excess is clawed back from underspent tasks (up to a configured
/// cap) to preserve the aggregate CPI.
pub struct ScheduleTaskExtrapolation;

impl ForecastDateCalculator for ScheduleTaskExtrapolation {
    fn calculate_forecast_dates(
        &self,
        arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        ev_leaves: &[TaskId],
        settings: &EvSettings,
    ) {
        let final_date = schedule_task_final_date(
            arena,
            schedule,
            ev_leaves,
            settings,
            true,
            ProjectionTarget::Forecast,
        );
        debug!(final_date = ?final_date, "schedule task extrapolation");
        schedule.metrics.set_forecast_date(final_date);
    }
}

/// Same task-by-task walk as [`ScheduleTaskExtrapolation`], but with no
/// performance indexes applied, storing results in the replan fields.
pub struct ScheduleTaskReplanner;

impl ForecastDateCalculator for ScheduleTaskReplanner {
    fn calculate_forecast_dates(
        &self,
        arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        ev_leaves: &[TaskId],
        settings: &EvSettings,
    ) {
        let final_date = schedule_task_final_date(
            arena,
            schedule,
            ev_leaves,
            settings,
            false,
            ProjectionTarget::Replan,
        );
        schedule.metrics.set_replan_date(final_date);
    }
}

struct TaskData {
    id: TaskId,
    cpi_cost: f64,
    almost_done_cost: f64,
    delta: f64,
    actual_node_time: f64,
}

impl TaskData {
    fn time_remaining(&self, adjustment_ratio: f64) -> f64 {
        if self.delta < 0.0 {
            self.almost_done_cost - self.actual_node_time
        } else {
            self.cpi_cost - self.delta * adjustment_ratio - self.actual_node_time
        }
    }
}

fn bad_ratio(ratio: f64) -> bool {
    !ratio.is_finite() || ratio <= 0.0
}

fn set_projected_date(arena: &mut TaskArena, id: TaskId, date: Option<Timestamp>, target: ProjectionTarget) {
    let node = arena.node_mut(id);
    match target {
        ProjectionTarget::Forecast => node.forecast_date = date,
        ProjectionTarget::Replan => node.replan_date = date,
    }
}

fn schedule_task_final_date(
    arena: &mut TaskArena,
    schedule: &TimePhasedSchedule,
    ev_leaves: &[TaskId],
    settings: &EvSettings,
    use_performance_indexes: bool,
    target: ProjectionTarget,
) -> Option<Timestamp> {
    if ev_leaves.is_empty() {
        return None;
    }

    let (cpi, dtpi) = if use_performance_indexes {
        (
            schedule.metrics.cost_performance_index_eff(),
            schedule.metrics.direct_time_performance_index_eff(),
        )
    } else {
        (1.0, 1.0)
    };
    if bad_ratio(cpi) || bad_ratio(dtpi) {
        return None;
    }

    let mut underspent = 0.0;
    let mut overspent = 0.0;
    let mut final_date = Some(Timestamp::LONG_AGO);
    let mut pending = Vec::with_capacity(ev_leaves.len());

    for &id in ev_leaves {
        let node = arena.node(id);
        match node.date_completed {
            Some(actual) => {
                set_projected_date(arena, id, Some(actual), target);
                final_date = dates::max_plan_date(final_date, Some(actual));
            }
            None => {
                let cpi_cost = node.plan_value / cpi;
                let almost_done_cost = node.actual_node_time / settings.almost_done_pct;
                let delta = cpi_cost - almost_done_cost;
                if delta > 0.0 {
                    underspent += delta;
                } else {
                    overspent += delta;
                }
                pending.push(TaskData {
                    id,
                    cpi_cost,
                    almost_done_cost,
                    delta,
                    actual_node_time: node.actual_node_time,
                });
            }
        }
    }

    let adjustment_ratio = (-overspent / underspent).min(settings.max_cpi_correction);
    debug!(overspent, underspent, adjustment_ratio, "cpi correction");

    let split = SplitSchedule::new(schedule);
    let future_multiplier = if use_performance_indexes {
        Some(1.0 / dtpi)
    } else {
        None
    };

    let mut cum_forecast_time = schedule.last().cum_actual_direct_time;
    for td in &pending {
        cum_forecast_time += td.time_remaining(adjustment_ratio);
        let projected = split.hypothetical_date(cum_forecast_time, future_multiplier);
        set_projected_date(arena, td.id, Some(projected), target);
        final_date = dates::max_forecast_date(final_date, Some(projected));
    }

    set_start_dates(arena, schedule, ev_leaves, target);

    match final_date {
        Some(d) if d.is_long_ago() || d.is_never() => None,
        other => other,
    }
}

/// Project a start date for each leaf: the actual start when one exists
/// (and is sane), otherwise the finish date of the previous task.
fn set_start_dates(
    arena: &mut TaskArena,
    schedule: &TimePhasedSchedule,
    ev_leaves: &[TaskId],
    target: ProjectionTarget,
) {
    let mut next_start = Some(schedule.start_date());
    for &id in ev_leaves {
        let node = arena.node(id);
        let actual_start = node.actual_start_date;
        let end_date = match target {
            ProjectionTarget::Forecast => node.forecast_date,
            ProjectionTarget::Replan => node.replan_date,
        };
        // an actual start recorded after the task finished is a data-entry
        // artifact; ignore it and infer the start instead
        let eff_start = match (actual_start, end_date) {
            (Some(a), Some(e)) if a < e => Some(a),
            _ => dates::min_start_date(
                dates::min_start_date(end_date, next_start),
                actual_start,
            ),
        };
        let node = arena.node_mut(id);
        match target {
            ProjectionTarget::Forecast => node.forecast_start_date = eff_start,
            ProjectionTarget::Replan => node.replan_start_date = eff_start,
        }
        if end_date.is_some() {
            next_start = end_date;
        }
    }
}

/// Per-task forecasting from the historical value-per-hour rate: rewrites
/// history in earned-value units, scales the future plan by the observed
/// rate, and reads off when each task's cumulative plan value arrives.
/// Safe but pessimistic, since in-progress work earns no partial credit.
pub struct HourlyEvRateExtrapolation;

impl ForecastDateCalculator for HourlyEvRateExtrapolation {
    fn calculate_forecast_dates(
        &self,
        arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        ev_leaves: &[TaskId],
        _settings: &EvSettings,
    ) {
        let mut final_date = None;

        if !ev_leaves.is_empty() {
            let mut total_actual_ev = 0.0;
            let mut total_planned_hist_time = 0.0;
            let mut split = SplitSchedule::with_rewriter(schedule, |p| {
                p.plan_direct_time = p.cum_earned_value - total_actual_ev;
                p.plan_total_time = p.plan_direct_time;
                total_actual_ev = p.cum_earned_value;
                total_planned_hist_time = p.cum_plan_direct_time;
            });

            if total_actual_ev > 0.0 && total_planned_hist_time > 0.0 {
                let ev_rate = total_actual_ev / total_planned_hist_time;
                split.scale_future(ev_rate);

                for &id in ev_leaves {
                    let (actual, cum_plan_value) = {
                        let node = arena.node(id);
                        (node.date_completed, node.cum_plan_value)
                    };
                    let forecast = match actual {
                        Some(d) => Some(d),
                        None => {
                            let d = split.hypothetical_date(cum_plan_value, None);
                            final_date = Some(d);
                            Some(d)
                        }
                    };
                    arena.node_mut(id).forecast_date = forecast;
                }
            }

            set_start_dates(arena, schedule, ev_leaves, ProjectionTarget::Forecast);
        }

        let final_date = final_date.filter(|d: &Timestamp| !d.is_never());
        debug!(final_date = ?final_date, "hourly ev rate extrapolation");
        schedule.metrics.set_forecast_date(final_date);
    }
}

/// For imported schedules the dates were already computed on the side
/// that owns the data; lift them out of the task tree instead of
/// recomputing, deferring to [`ScheduleExtrapolation`] only when the
/// import carried no forecast.
pub struct SavedForecastDate;

impl ForecastDateCalculator for SavedForecastDate {
    fn calculate_forecast_dates(
        &self,
        arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        ev_leaves: &[TaskId],
        settings: &EvSettings,
    ) {
        let root = arena.root();
        let replan = arena.node(root).replan_date;
        schedule.metrics.set_replan_date(replan);

        set_start_dates(arena, schedule, ev_leaves, ProjectionTarget::Forecast);
        set_start_dates(arena, schedule, ev_leaves, ProjectionTarget::Replan);
        rollup_start_dates(arena, root);

        let forecast = arena.node(root).forecast_date;
        if forecast.is_some() {
            schedule.metrics.set_forecast_date(forecast);
        } else {
            ScheduleExtrapolation { fallback_to_simple: true }
                .calculate_forecast_dates(arena, schedule, ev_leaves, settings);
        }
    }
}

fn rollup_start_dates(arena: &mut TaskArena, id: TaskId) {
    for child in arena.children(id) {
        rollup_start_dates(arena, child);
        let (child_replan, child_forecast) = {
            let c = arena.node(child);
            (c.replan_start_date, c.forecast_start_date)
        };
        let node = arena.node_mut(id);
        node.replan_start_date = dates::min_start_date(node.replan_start_date, child_replan);
        node.forecast_start_date = dates::min_start_date(node.forecast_start_date, child_forecast);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::WEEK_MILLIS;
    use crate::task::TaskNode;

    fn ts(weeks: i64) -> Timestamp {
        Timestamp::from_millis(1_500_000_000_000 + weeks * WEEK_MILLIS)
    }

    fn arena_with_leaves(n: usize) -> (TaskArena, Vec<TaskId>) {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let leaves = (0..n)
            .map(|i| arena.add_child(arena.root(), TaskNode::new(format!("t{i}"))))
            .collect();
        (arena, leaves)
    }

    #[test]
    fn simple_extrapolation_doubles_duration_at_half_complete() {
        let mut m = PerformanceMetrics::new();
        m.start_date = Some(ts(0));
        m.current_date = Some(ts(2));
        m.total_plan_time = 1000.0;
        m.earned_value_time = 500.0;

        let forecast = simple_extrapolated_forecast(&m);
        assert_eq!(forecast, Some(ts(4)));
    }

    #[test]
    fn simple_extrapolation_with_no_progress_gives_nothing() {
        let mut m = PerformanceMetrics::new();
        m.start_date = Some(ts(0));
        m.current_date = Some(ts(2));
        m.total_plan_time = 1000.0;

        assert_eq!(simple_extrapolated_forecast(&m), None);
    }

    #[test]
    fn past_forecast_is_invalid_while_work_remains() {
        let mut m = PerformanceMetrics::new();
        m.current_date = Some(ts(3));
        m.total_plan_time = 100.0;
        m.earned_value_time = 50.0;

        assert!(is_forecast_invalid(Some(ts(1)), &m));
        assert!(is_forecast_invalid(None, &m));
        assert!(is_forecast_invalid(Some(Timestamp::LONG_AGO), &m));
        assert!(!is_forecast_invalid(Some(ts(5)), &m));

        // once complete, a past completion date is perfectly sensible
        m.earned_value_time = 100.0;
        assert!(!is_forecast_invalid(Some(ts(1)), &m));
    }

    #[test]
    fn completed_tasks_keep_their_actual_dates() {
        let (mut arena, leaves) = arena_with_leaves(2);
        arena.node_mut(leaves[0]).plan_value = 600.0;
        arena.node_mut(leaves[0]).date_completed = Some(ts(1));
        arena.node_mut(leaves[1]).plan_value = 600.0;

        let mut schedule = TimePhasedSchedule::new(ts(0), 600.0);
        schedule.add_row();
        schedule.save_completed_task(ts(1), 600.0);
        schedule.save_actual_time(ts(1), 600.0);
        schedule.set_effective_date(ts(1));
        schedule.metrics.reset(Some(ts(0)), ts(1), Some(ts(0)), Some(ts(1)));
        schedule.metrics.add_task(600.0, 600.0, Some(ts(1)), Some(ts(1)));
        schedule.metrics.add_task(600.0, 0.0, Some(ts(2)), None);
        schedule.recalc_metrics_schedule_time(true);

        ScheduleTaskExtrapolation.calculate_forecast_dates(
            &mut arena,
            &mut schedule,
            &leaves,
            &EvSettings::default(),
        );

        assert_eq!(arena.node(leaves[0]).forecast_date, Some(ts(1)));
        let second = arena.node(leaves[1]).forecast_date;
        assert!(second.is_some());
        assert!(second > Some(ts(1)));
        assert_eq!(schedule.metrics.forecast_date, second);
    }

    #[test]
    fn overspent_tasks_are_assumed_almost_done() {
        let settings = EvSettings::default();
        let cpi_cost = 100.0;
        let almost_done_cost = 500.0 / settings.almost_done_pct;
        let td = TaskData {
            id: TaskId(0),
            cpi_cost,
            almost_done_cost,
            delta: cpi_cost - almost_done_cost,
            actual_node_time: 500.0,
        };
        let remaining = td.time_remaining(0.0);
        assert!((remaining - (almost_done_cost - 500.0)).abs() < 1e-9);
        assert!(remaining > 0.0);
    }

    #[test]
    fn start_dates_chain_from_the_previous_finish() {
        let (mut arena, leaves) = arena_with_leaves(3);
        arena.node_mut(leaves[0]).forecast_date = Some(ts(1));
        arena.node_mut(leaves[1]).forecast_date = Some(ts(2));
        arena.node_mut(leaves[2]).forecast_date = Some(ts(3));
        // a recorded actual start wins when it precedes the finish
        arena.node_mut(leaves[1]).actual_start_date = Some(ts(0));

        let schedule = TimePhasedSchedule::new(ts(0), 600.0);
        set_start_dates(&mut arena, &schedule, &leaves, ProjectionTarget::Forecast);

        assert_eq!(arena.node(leaves[0]).forecast_start_date, Some(ts(0)));
        assert_eq!(arena.node(leaves[1]).forecast_start_date, Some(ts(0)));
        assert_eq!(arena.node(leaves[2]).forecast_start_date, Some(ts(2)));
    }

    #[test]
    fn replanner_writes_replan_fields_without_indexes() {
        let (mut arena, leaves) = arena_with_leaves(1);
        arena.node_mut(leaves[0]).plan_value = 600.0;

        let mut schedule = TimePhasedSchedule::new(ts(0), 600.0);
        schedule.set_effective_date(ts(0));
        schedule.metrics.reset(Some(ts(0)), ts(0), None, None);
        schedule.metrics.add_task(600.0, 0.0, Some(ts(1)), None);

        ScheduleTaskReplanner.calculate_forecast_dates(
            &mut arena,
            &mut schedule,
            &leaves,
            &EvSettings::default(),
        );

        assert!(arena.node(leaves[0]).replan_date.is_some());
        assert!(arena.node(leaves[0]).forecast_date.is_none());
    }
}
