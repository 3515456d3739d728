//! Full recalculation from raw task and time-log data.

use crate::calculator::{
    Baseline, ForecastMethod, assign_task_ordinals, calculate_level_of_effort,
    check_for_node_errors, collect_ev_leaves, contains_task_ordinals, prune_nodes,
    recalc_baseline_data, recalc_date_completed, recalc_plan_times, reset_root_data, reset_tree,
    sort_ev_leaves, sum_up_node_data,
};
use crate::confidence::{self, ConfidenceInterval, DataPoint, LinearRatioInterval, TimeErrInterval};
use crate::dates::{Timestamp, DAY_MILLIS};
use crate::forecast::{ForecastDateCalculator, ScheduleTaskReplanner};
use crate::metrics::PerformanceMetrics;
use crate::schedule::TimePhasedSchedule;
use crate::settings::EvSettings;
use crate::simulate;
use crate::task::{TaskArena, TaskId};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// One record from the time log: minutes worked against a task on a
/// particular date. Entries whose path matches no task are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLogEntry {
    pub path: String,
    pub when: Option<Timestamp>,
    /// Minutes.
    pub elapsed: f64,
}

impl TimeLogEntry {
    pub fn new(path: impl Into<String>, when: Timestamp, elapsed: f64) -> Self {
        Self { path: path.into(), when: Some(when), elapsed }
    }
}

/// The standard recalculation engine: derives every plan and actual
/// figure, all the performance metrics, the confidence intervals, and the
/// forecast dates from the task tree, the schedule, and the time log.
pub struct DataRecalculation {
    pub settings: EvSettings,
    pub forecast_method: ForecastMethod,
    /// Treat time logged before the schedule start as pre-schedule work
    /// that no longer earns value.
    pub rezero_at_start_date: bool,
    pub baseline: Option<Baseline>,
    /// Seed for the randomized completion-date interval, fixed so repeated
    /// recalculations of unchanged data agree.
    pub simulation_seed: u64,

    ev_leaves: Vec<TaskId>,
    completion_date: Option<Timestamp>,
}

impl DataRecalculation {
    pub fn new(settings: EvSettings) -> Self {
        Self {
            settings: settings.sanitized(),
            forecast_method: ForecastMethod::default(),
            rezero_at_start_date: true,
            baseline: None,
            simulation_seed: 42,
            ev_leaves: Vec::new(),
            completion_date: None,
        }
    }

    /// Value-earning units, in the order they are planned to complete.
    /// Valid after [`recalculate`](Self::recalculate).
    pub fn ev_leaves(&self) -> &[TaskId] {
        &self.ev_leaves
    }

    /// Completion date of the entire plan, when every task is done.
    pub fn completion_date(&self) -> Option<Timestamp> {
        self.completion_date
    }

    pub fn recalculate(
        &mut self,
        arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        time_log: &[TimeLogEntry],
    ) {
        let root = arena.root();
        debug!(tasks = arena.len(), entries = time_log.len(), "recalculating");

        reset_root_data(arena.node_mut(root));
        reset_tree(arena, root);
        recalc_baseline_data(arena, root, self.baseline.as_ref());
        prune_nodes(arena, root, false);

        let level_of_effort = calculate_level_of_effort(arena, root);
        recalc_plan_times(arena, root, self.settings.plan_time_tolerance);
        recalc_date_completed(arena, root);
        self.completion_date = arena.node(root).date_completed;
        let effective_date = self
            .completion_date
            .or(self.settings.effective_date)
            .unwrap_or_else(Timestamp::now);
        // only an in-flight plan needs a warning about future time logs
        let check_future_time_logs = self.completion_date.is_none();

        self.ev_leaves.clear();
        collect_ev_leaves(arena, root, &mut self.ev_leaves);
        if contains_task_ordinals(arena, root) {
            assign_task_ordinals(arena, root, 1, &self.ev_leaves);
        }
        let schedule_start = schedule.start_date();
        sort_ev_leaves(
            arena,
            &mut self.ev_leaves,
            schedule_start,
            self.settings.reorder_completed,
            self.rezero_at_start_date,
        );

        schedule.set_level_of_effort(level_of_effort);
        schedule.clean_up();
        schedule.recalc_cum_plan_times();

        let zero_date = if self.rezero_at_start_date { schedule_start } else { Timestamp::LONG_AGO };
        self.save_actual_pre_time(arena, time_log, zero_date);
        self.calc_task_values(arena, schedule, schedule_start);
        self.save_completed_task_values(arena, schedule);

        schedule.set_effective_date(effective_date);
        let period = schedule.period_containing(effective_date);
        schedule.metrics.reset(
            Some(schedule_start),
            effective_date,
            period.map(|i| schedule.begin_date(i)),
            period.map(|i| schedule.get(i).end_date),
        );
        let baseline_root = arena.node(root);
        schedule
            .metrics
            .set_baseline_data(baseline_root.baseline_date, baseline_root.baseline_time);

        self.save_actual_schedule_time(
            arena,
            schedule,
            time_log,
            zero_date,
            effective_date,
            check_future_time_logs,
        );
        schedule.recalc_cum_actual_times();
        check_for_node_errors(arena, &mut schedule.metrics, &self.settings, effective_date);

        recalc_metrics(arena, root, &mut schedule.metrics);
        schedule.recalc_metrics_schedule_time(self.settings.use_partial_dtpi);

        self.create_cost_confidence_interval(arena, schedule);
        schedule.metrics.time_err_interval = Some(Box::new(TimeErrInterval::from_periods(
            &schedule.completed_period_times(),
            false,
        )));

        ScheduleTaskReplanner.calculate_forecast_dates(arena, schedule, &self.ev_leaves, &self.settings);
        self.forecast_method.calculator().calculate_forecast_dates(
            arena,
            schedule,
            &self.ev_leaves,
            &self.settings,
        );

        recalculate_task_hierarchy(arena, root);
        self.save_completed_task_costs(arena, schedule);
        self.create_schedule_confidence_interval(schedule);
        schedule.metrics.recalc_viability();
        debug!(
            percent_complete = schedule.metrics.percent_complete(),
            forecast = ?schedule.metrics.forecast_date,
            "recalculation complete"
        );
    }

    /// Time logged before the zero date becomes pre-schedule time: it is
    /// remembered against the task but earns no value.
    fn save_actual_pre_time(
        &self,
        arena: &mut TaskArena,
        time_log: &[TimeLogEntry],
        zero_date: Timestamp,
    ) {
        for entry in time_log {
            let when = match entry.when {
                Some(w) if w < zero_date => w,
                _ => continue,
            };
            trace!(path = %entry.path, %when, "pre-schedule time");
            if let Some(id) = arena.find_by_full_name(&entry.path) {
                if !arena.node(id).is_level_of_effort_task() {
                    arena.node_mut(id).actual_pre_time += entry.elapsed;
                }
            }
        }
    }

    /// Walk the ordered leaf list accumulating planned value, and chain
    /// planned start dates so each task starts where its predecessor's
    /// period began.
    fn calc_task_values(
        &self,
        arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        schedule_start: Timestamp,
    ) {
        let mut cum_plan_value = 0.0;
        let mut start_date_a = schedule_start;
        let mut start_date_b = schedule_start;

        for &id in &self.ev_leaves {
            let pre_time = if arena.is_leaf(id) {
                arena.node(id).actual_pre_time
            } else {
                total_pre_time(arena, id)
            };

            let node = arena.node(id);
            let counts = match node.date_completed {
                Some(d) => !self.rezero_at_start_date || d >= schedule_start,
                None => true,
            };
            let plan_value = if counts { (node.plan_time - pre_time).max(0.0) } else { 0.0 };

            cum_plan_value += plan_value;
            let plan_date = schedule.get_planned_completion_date(cum_plan_value, cum_plan_value);
            if start_date_b < plan_date {
                start_date_a = start_date_b;
            }

            let node = arena.node_mut(id);
            node.plan_value = plan_value;
            node.cum_plan_value = cum_plan_value;
            node.plan_date = Some(plan_date);
            node.plan_start_date = Some(start_date_a);
            start_date_b = plan_date;
            if node.date_completed.is_some() {
                node.value_earned = plan_value;
            }
        }
    }

    fn save_completed_task_values(&self, arena: &TaskArena, schedule: &mut TimePhasedSchedule) {
        for &id in &self.ev_leaves {
            let node = arena.node(id);
            if node.value_earned > 0.0 {
                if let Some(d) = node.date_completed {
                    schedule.save_completed_task(d, node.value_earned);
                }
            }
        }
    }

    /// Post the time log into the tree and the ledger. Level-of-effort
    /// time only counts while the schedule is live, and flows into the
    /// indirect column instead of earning value.
    fn save_actual_schedule_time(
        &self,
        arena: &mut TaskArena,
        schedule: &mut TimePhasedSchedule,
        time_log: &[TimeLogEntry],
        zero_date: Timestamp,
        effective_date: Timestamp,
        check_future_time_logs: bool,
    ) {
        let schedule_start = schedule.start_date();
        let mut future_warned = false;
        for entry in time_log {
            let when = match entry.when {
                Some(w) if w >= zero_date => w,
                _ => continue,
            };
            let id = match arena.find_by_full_name(&entry.path) {
                Some(id) => id,
                None => continue,
            };

            if arena.node(id).is_level_of_effort_task() {
                if when > schedule_start && when < effective_date {
                    arena.node_mut(id).actual_node_time += entry.elapsed;
                    schedule.metrics.add_indirect_time(entry.elapsed);
                    schedule.save_actual_indirect_time(when, entry.elapsed);
                }
                continue;
            }

            {
                let node = arena.node_mut(id);
                node.actual_node_time += entry.elapsed;
                node.actual_start_date = match node.actual_start_date {
                    Some(s) if s <= when => Some(s),
                    _ => Some(when),
                };
            }
            if arena.node(id).is_user_pruned() {
                continue;
            }
            schedule.save_actual_time(when, entry.elapsed);

            if check_future_time_logs
                && !future_warned
                && when.millis() - effective_date.millis() > DAY_MILLIS
            {
                future_warned = true;
                schedule.metrics.add_error(
                    "The time log contains entries dated in the future ".to_string(),
                    entry.path.clone(),
                );
            }
        }
    }

    /// The historical cost data behind the "how much will the remaining
    /// work really cost" question: completed units at their planned vs
    /// actual cost, plus unplanned parent-node time as pure liability.
    fn create_cost_confidence_interval(
        &self,
        arena: &TaskArena,
        schedule: &mut TimePhasedSchedule,
    ) {
        if self.completion_date.is_some() {
            schedule.metrics.cost_interval = None;
            return;
        }

        let mut points = Vec::new();
        for &id in &self.ev_leaves {
            let node = arena.node(id);
            if node.date_completed.is_some() {
                points.push(DataPoint::new(node.plan_value, node.actual_current_time));
            }
        }
        for id in arena.ids_in_document_order() {
            if arena.is_leaf(id) || self.ev_leaves.contains(&id) {
                continue;
            }
            let node = arena.node(id);
            if node.actual_node_time > 0.0
                && !node.is_level_of_effort_task()
                && !node.is_user_pruned()
            {
                points.push(DataPoint::new(0.0, node.actual_node_time));
            }
        }

        let input = schedule.metrics.incomplete_task_plan_time();
        let interval = LinearRatioInterval::from_points(&points, input);
        trace!(points = points.len(), viability = interval.viability(), "cost interval");
        schedule.metrics.cost_interval = Some(Box::new(interval));
    }

    fn save_completed_task_costs(&self, arena: &TaskArena, schedule: &mut TimePhasedSchedule) {
        for &id in &self.ev_leaves {
            let node = arena.node(id);
            if let Some(d) = node.date_completed {
                schedule.save_completed_task_cost(d, node.actual_current_time);
            }
        }
    }

    /// Randomized completion-date interval, built only when both of its
    /// ingredient intervals could be computed.
    fn create_schedule_confidence_interval(&self, schedule: &mut TimePhasedSchedule) {
        let viable = |i: &Option<Box<dyn confidence::ConfidenceInterval>>| {
            i.as_ref().is_some_and(|i| i.viability() > confidence::ACCEPTABLE)
        };
        if !viable(&schedule.metrics.cost_interval) || !viable(&schedule.metrics.time_err_interval)
        {
            schedule.metrics.completion_date_interval = None;
            return;
        }
        schedule.metrics.completion_date_interval = simulate::forecast_date_interval(
            schedule,
            self.settings.optimization_trials,
            self.simulation_seed,
        )
        .map(|i| Box::new(i) as Box<dyn confidence::ConfidenceInterval>);
    }
}

/// Combined pre-schedule time of a subtree, used for parents that act as
/// a single EV leaf: their own pre time plus their children's, without
/// disturbing the per-node figures.
pub(crate) fn total_pre_time(arena: &TaskArena, id: TaskId) -> f64 {
    let mut total = arena.node(id).actual_pre_time;
    for child in arena.children(id) {
        total += total_pre_time(arena, child);
    }
    total
}

/// Fold the tree into the metrics totals. Nodes carrying a plan date are
/// units of value; anything above them only contributes unplanned time as
/// a cost liability.
pub(crate) fn recalc_metrics(arena: &TaskArena, id: TaskId, metrics: &mut PerformanceMetrics) {
    let node = arena.node(id);
    if node.plan_date.is_some() {
        metrics.add_task(node.plan_value, node.actual_node_time, node.plan_date, node.date_completed);
    } else {
        for child in arena.children(id).into_iter().rev() {
            recalc_metrics(arena, child, metrics);
        }
        if node.actual_node_time > 0.0
            && !node.is_level_of_effort_task()
            && !node.is_user_pruned()
        {
            metrics.add_task(0.0, node.actual_node_time, None, node.actual_start_date);
        }
    }
}

/// Bottom-up aggregation of every derived figure, then a top-down push of
/// dates into the subtrees of parents that earn value as a single unit.
pub(crate) fn recalculate_task_hierarchy(arena: &mut TaskArena, id: TaskId) {
    for child in arena.children(id) {
        recalculate_task_hierarchy(arena, child);
    }
    sum_up_node_data(arena, id);
    if !arena.is_leaf(id) && arena.is_ev_leaf(id) {
        update_children_of_ev_leaf(arena, id);
    }
}

fn update_children_of_ev_leaf(arena: &mut TaskArena, id: TaskId) {
    let (plan_date, plan_start, replan_date, replan_start, forecast_date, forecast_start, cum) = {
        let n = arena.node(id);
        (
            n.plan_date,
            n.plan_start_date,
            n.replan_date,
            n.replan_start_date,
            n.forecast_date,
            n.forecast_start_date,
            n.cum_plan_value,
        )
    };
    for child in arena.children(id) {
        {
            let c = arena.node_mut(child);
            c.plan_date = plan_date;
            c.plan_start_date = plan_start;
            c.replan_date = replan_date;
            c.replan_start_date = replan_start;
            c.forecast_date = forecast_date;
            c.forecast_start_date = forecast_start;
            c.cum_plan_value = cum;
        }
        update_children_of_ev_leaf(arena, child);
    }
}
