//! Recalculation of a rollup: aggregate already-recalculated children.

use crate::calculator::{reset_node_data, reset_root_data};
use crate::confidence::{self, ConfidenceInterval, IntervalSum, TimeErrInterval};
use crate::dates::{self, Timestamp};
use crate::rollup::{RollupChild, RollupMetrics, ScheduleRollup};
use crate::schedule::TimePhasedSchedule;
use crate::settings::EvSettings;
use crate::simulate;
use crate::task::{TaskArena, TaskId};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

/// Mutable view of one child task list during a rollup recalculation.
/// The child must already be recalculated.
pub struct RollupChildState<'a> {
    pub arena: &'a mut TaskArena,
    pub schedule: &'a mut TimePhasedSchedule,
    /// Set when this child is itself a rollup.
    pub rollup: Option<&'a RollupMetrics>,
    pub root_name: &'a str,
}

/// Aggregates child task lists into a rollup root node, a merged
/// schedule, and combined confidence intervals.
pub struct RollupRecalculation {
    pub settings: EvSettings,
    pub simulation_seed: u64,
}

/// Tolerable aggregate cost error (minutes) when summing child cost
/// intervals instead of resampling them jointly.
const SUMMED_COST_ACCEPTABLE_ERROR: f64 = 5.0 * 60.0;

impl RollupRecalculation {
    pub fn new(settings: EvSettings) -> Self {
        Self { settings: settings.sanitized(), simulation_seed: 42 }
    }

    pub fn recalculate(
        &self,
        root: &mut crate::task::TaskNode,
        children: &mut [RollupChildState<'_>],
        schedule: &mut ScheduleRollup,
    ) {
        debug!(children = children.len(), "recalculating rollup");
        recalc_rollup_node(root, children);
        let level_of_effort = blend_level_of_effort(children);

        {
            let merged: Vec<RollupChild<'_>> = children
                .iter()
                .map(|c| match c.rollup {
                    Some(r) => RollupChild::of_rollup(c.schedule, c.root_name, r),
                    None => RollupChild::new(c.schedule, c.root_name),
                })
                .collect();
            schedule.recalc(&merged, &self.settings);
        }
        schedule.schedule.set_level_of_effort(level_of_effort);

        self.create_confidence_intervals(children, schedule);
        check_for_duplicate_tasks(children, schedule);
        schedule.recalc_viability();
    }

    /// Three outcomes, in decreasing order of information: joint
    /// resampling when every child brought both intervals, a summed cost
    /// interval when only the cost side is complete, nothing otherwise.
    /// Children that are themselves rollups always fall in the last
    /// bucket; their samples are not independent.
    fn create_confidence_intervals(
        &self,
        children: &mut [RollupChildState<'_>],
        schedule: &mut ScheduleRollup,
    ) {
        let any_rollups = children.iter().any(|c| c.rollup.is_some());
        let all_cost_viable = !children.is_empty()
            && children.iter().all(|c| viable(&c.schedule.metrics.cost_interval));
        if any_rollups || !all_cost_viable {
            set_null_intervals(schedule);
            return;
        }

        // replace each child's time-error interval with a recentered one:
        // wide intervals matter little to a rollup, bias matters a lot
        let mut all_time_err_viable = true;
        for child in children.iter_mut() {
            let interval =
                TimeErrInterval::from_periods(&child.schedule.completed_period_times(), true);
            all_time_err_viable &= interval.viability() > confidence::ACCEPTABLE;
            child.schedule.metrics.time_err_interval = Some(Box::new(interval));
        }

        if !all_time_err_viable {
            let mut sum = IntervalSum::new(SUMMED_COST_ACCEPTABLE_ERROR);
            for child in children.iter() {
                if let Some(ci) = &child.schedule.metrics.cost_interval {
                    sum.add_interval(ci.as_ref());
                }
            }
            sum.intervals_complete();
            debug!("summed child cost intervals");
            schedule.schedule.metrics.cost_interval = Some(Box::new(sum));
            schedule.schedule.metrics.time_err_interval = None;
            schedule.schedule.metrics.completion_date_interval = None;
            schedule.rollup.optimized_date_interval = None;
            return;
        }

        let child_schedules: Vec<&TimePhasedSchedule> =
            children.iter().map(|c| &*c.schedule).collect();
        match simulate::rollup_intervals(
            &child_schedules,
            &schedule.schedule,
            self.settings.optimization_trials,
            self.simulation_seed,
        ) {
            Some(samples) => {
                debug!("resampled joint rollup intervals");
                schedule.schedule.metrics.cost_interval = Some(Box::new(samples.cost_interval));
                schedule.schedule.metrics.time_err_interval = None;
                schedule.schedule.metrics.completion_date_interval =
                    Some(Box::new(samples.forecast_date_interval));
                schedule.rollup.optimized_date_interval =
                    Some(Box::new(samples.optimized_date_interval));
            }
            None => set_null_intervals(schedule),
        }
    }
}

fn viable(interval: &Option<Box<dyn ConfidenceInterval>>) -> bool {
    interval
        .as_ref()
        .is_some_and(|ci| ci.viability() > confidence::ACCEPTABLE)
}

fn set_null_intervals(schedule: &mut ScheduleRollup) {
    schedule.schedule.metrics.cost_interval = None;
    schedule.schedule.metrics.time_err_interval = None;
    schedule.schedule.metrics.completion_date_interval = None;
    schedule.rollup.optimized_date_interval = None;
}

/// Rebuild the rollup root from the child roots: numeric data sums, the
/// root is complete when every child is, start dates take the earliest
/// and plan/forecast dates the latest (poisoning on a missing child).
pub(crate) fn recalc_rollup_node(
    root: &mut crate::task::TaskNode,
    children: &[RollupChildState<'_>],
) {
    reset_root_data(root);
    reset_node_data(root);

    let mut top_down = 0.0;
    let mut replan_acc = Some(Timestamp::LONG_AGO);
    let mut forecast_acc = Some(Timestamp::LONG_AGO);
    let mut counted = 0;
    let mut all_complete = true;
    let mut completed: Option<Timestamp> = None;

    for c in children {
        let child = c.arena.node(c.arena.root());

        root.plan_value += child.plan_value;
        root.value_earned += child.value_earned;
        root.actual_time += child.actual_time;
        root.actual_direct_time += child.actual_direct_time;
        root.actual_current_time += child.actual_current_time;
        root.plan_time += child.plan_time;
        top_down += child.top_down_plan_time.unwrap_or(0.0);
        root.bottom_up_plan_time += child.bottom_up_plan_time;

        root.plan_start_date = dates::min_start_date(root.plan_start_date, child.plan_start_date);
        root.replan_start_date =
            dates::min_start_date(root.replan_start_date, child.replan_start_date);
        root.forecast_start_date =
            dates::min_start_date(root.forecast_start_date, child.forecast_start_date);
        root.actual_start_date =
            dates::min_start_date(root.actual_start_date, child.actual_start_date);
        root.plan_date = dates::max_plan_date(root.plan_date, child.plan_date);

        let value_pruned = child.is_user_pruned() || child.is_level_of_effort_task();
        if !value_pruned {
            if child.replan_date.is_some() || child.plan_value > 0.0 {
                replan_acc = dates::max_forecast_date(replan_acc, child.replan_date);
            }
            if child.forecast_date.is_some() || child.plan_value > 0.0 {
                forecast_acc = dates::max_forecast_date(forecast_acc, child.forecast_date);
            }
        }

        if !child.is_user_pruned() {
            counted += 1;
            match child.date_completed {
                None => all_complete = false,
                Some(d) => completed = Some(completed.map_or(d, |r| r.max(d))),
            }
        }
    }

    root.cum_plan_value = root.plan_value;
    root.top_down_plan_time = Some(top_down);
    root.date_completed = if counted > 0 && all_complete { completed } else { None };
    if replan_acc != Some(Timestamp::LONG_AGO) {
        root.replan_date = replan_acc;
    }
    if forecast_acc != Some(Timestamp::LONG_AGO) {
        root.forecast_date = forecast_acc;
    }
}

/// Blend the children's level-of-effort percentages into one figure for
/// the merged schedule (weighted by each child's total time), and scale
/// each child's LOE tasks by its share so rollup views add up.
pub(crate) fn blend_level_of_effort(children: &mut [RollupChildState<'_>]) -> f64 {
    let mut total_time = 0.0;
    let mut indirect_time = 0.0;
    for c in children.iter() {
        let direct = c.schedule.metrics.total_plan();
        let loe = c.schedule.level_of_effort();
        let total = direct / (1.0 - loe);
        if total.is_finite() {
            total_time += total;
            indirect_time += total * loe;
        }
    }

    let blended = if total_time == 0.0 || indirect_time == 0.0 {
        0.0
    } else {
        indirect_time / total_time
    };

    for c in children.iter_mut() {
        let direct = c.schedule.metrics.total_plan();
        let loe = c.schedule.level_of_effort();
        let fraction = (direct / (1.0 - loe)) / total_time;
        if fraction.is_finite() {
            let root = c.arena.root();
            scale_level_of_effort(c.arena, root, fraction);
        }
    }
    blended
}

fn scale_level_of_effort(arena: &mut TaskArena, id: TaskId, ratio: f64) {
    {
        let node = arena.node_mut(id);
        node.rollup_level_of_effort = if node.is_level_of_effort_task() {
            node.plan_level_of_effort * ratio
        } else {
            crate::task::NOT_LEVEL_OF_EFFORT
        };
    }
    for child in arena.children(id) {
        scale_level_of_effort(arena, child, ratio);
    }
}

/// A task pulled into the rollup through two different children is being
/// double-counted; flag it on the merged metrics.
fn check_for_duplicate_tasks(children: &[RollupChildState<'_>], schedule: &mut ScheduleRollup) {
    let mut seen: HashMap<&str, &str> = HashMap::new();
    for c in children {
        for id in c.arena.ids_in_document_order() {
            let node = c.arena.node(id);
            for tid in &node.task_ids {
                if let Some(first) = seen.get(tid.as_str()) {
                    if *first != c.root_name {
                        schedule.schedule.metrics.add_error(
                            format!(
                                "The task {} appears in more than one schedule",
                                node.full_name
                            ),
                            node.full_name.clone(),
                        );
                    }
                } else {
                    seen.insert(tid.as_str(), c.root_name);
                }
            }
        }
    }
}

/// Every child's EV leaves, merged: completed tasks first in completion
/// order, then by planned completion date, dateless tasks last.
pub fn merged_ev_leaves(
    children: &[(usize, &TaskArena, &[TaskId])],
) -> Vec<(usize, TaskId)> {
    let mut leaves: Vec<(usize, TaskId)> = Vec::new();
    for (index, _, ids) in children {
        leaves.extend(ids.iter().map(|&id| (*index, id)));
    }
    let node = |&(index, id): &(usize, TaskId)| {
        children
            .iter()
            .find(|(i, _, _)| *i == index)
            .map(|(_, arena, _)| arena.node(id))
    };
    leaves.sort_by(|a, b| {
        let (na, nb) = match (node(a), node(b)) {
            (Some(x), Some(y)) => (x, y),
            _ => return Ordering::Equal,
        };
        cmp_dates_none_last(na.date_completed, nb.date_completed)
            .then_with(|| cmp_dates_none_last(na.plan_date, nb.plan_date))
    });
    leaves
}

fn cmp_dates_none_last(a: Option<Timestamp>, b: Option<Timestamp>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::data::{DataRecalculation, TimeLogEntry};
    use crate::dates::WEEK_MILLIS;
    use crate::task::TaskNode;

    fn ts(weeks: i64) -> Timestamp {
        Timestamp::from_millis(1_500_000_000_000 + weeks * WEEK_MILLIS)
    }

    fn settings_at(effective: Timestamp) -> EvSettings {
        EvSettings { effective_date: Some(effective), ..EvSettings::default() }
    }

    fn recalculated_child(
        name: &str,
        plan_minutes: &[f64],
        completed: &[Option<Timestamp>],
        log: &[TimeLogEntry],
    ) -> (TaskArena, TimePhasedSchedule) {
        let mut arena = TaskArena::new(TaskNode::new(name));
        for (i, &minutes) in plan_minutes.iter().enumerate() {
            let id = arena.add_child(
                arena.root(),
                TaskNode::new(format!("t{i}")).with_plan_time(minutes),
            );
            arena.node_mut(id).date_completed = completed.get(i).copied().flatten();
        }
        let mut schedule = TimePhasedSchedule::new(ts(0), 300.0);
        let mut calc = DataRecalculation::new(settings_at(ts(1)));
        calc.recalculate(&mut arena, &mut schedule, log);
        (arena, schedule)
    }

    #[test]
    fn rollup_root_sums_child_totals() {
        let (mut a_arena, mut a_sched) =
            recalculated_child("alpha", &[200.0, 200.0], &[Some(ts(0).plus_millis(1))], &[]);
        let (mut b_arena, mut b_sched) = recalculated_child("beta", &[300.0], &[], &[]);

        let mut root = TaskNode::new("team");
        let mut children = [
            RollupChildState {
                arena: &mut a_arena,
                schedule: &mut a_sched,
                rollup: None,
                root_name: "alpha",
            },
            RollupChildState {
                arena: &mut b_arena,
                schedule: &mut b_sched,
                rollup: None,
                root_name: "beta",
            },
        ];
        let mut schedule = ScheduleRollup::new();
        RollupRecalculation::new(settings_at(ts(1))).recalculate(
            &mut root,
            &mut children,
            &mut schedule,
        );

        assert_eq!(root.plan_value, 700.0);
        assert_eq!(root.value_earned, 200.0);
        assert_eq!(root.date_completed, None);
        assert_eq!(schedule.schedule.metrics.total_plan(), 700.0);
        assert_eq!(schedule.schedule.metrics.earned_value(), 200.0);
    }

    #[test]
    fn rollup_is_complete_only_when_every_child_is() {
        let (mut a_arena, mut a_sched) =
            recalculated_child("alpha", &[100.0], &[Some(ts(0).plus_millis(1))], &[]);
        let (mut b_arena, mut b_sched) =
            recalculated_child("beta", &[100.0], &[Some(ts(0).plus_millis(2))], &[]);

        let mut root = TaskNode::new("team");
        let mut children = [
            RollupChildState {
                arena: &mut a_arena,
                schedule: &mut a_sched,
                rollup: None,
                root_name: "alpha",
            },
            RollupChildState {
                arena: &mut b_arena,
                schedule: &mut b_sched,
                rollup: None,
                root_name: "beta",
            },
        ];
        recalc_rollup_node(&mut root, &children);
        assert_eq!(root.date_completed, Some(ts(0).plus_millis(2)));
    }

    #[test]
    fn duplicate_tasks_across_children_are_flagged() {
        let (mut a_arena, mut a_sched) = recalculated_child("alpha", &[100.0], &[], &[]);
        let (mut b_arena, mut b_sched) = recalculated_child("beta", &[100.0], &[], &[]);
        let a_task = a_arena.find_by_full_name("alpha/t0").expect("task");
        let b_task = b_arena.find_by_full_name("beta/t0").expect("task");
        a_arena.node_mut(a_task).task_ids = vec!["SHARED".into()];
        b_arena.node_mut(b_task).task_ids = vec!["SHARED".into()];

        let mut root = TaskNode::new("team");
        let mut children = [
            RollupChildState {
                arena: &mut a_arena,
                schedule: &mut a_sched,
                rollup: None,
                root_name: "alpha",
            },
            RollupChildState {
                arena: &mut b_arena,
                schedule: &mut b_sched,
                rollup: None,
                root_name: "beta",
            },
        ];
        let mut schedule = ScheduleRollup::new();
        RollupRecalculation::new(settings_at(ts(1))).recalculate(
            &mut root,
            &mut children,
            &mut schedule,
        );

        let errors = schedule.schedule.metrics.errors.as_ref().expect("errors");
        assert!(errors.keys().any(|m| m.contains("more than one schedule")));
    }

    #[test]
    fn level_of_effort_blends_by_child_size() {
        let (mut a_arena, mut a_sched) = recalculated_child("alpha", &[900.0], &[], &[]);
        let (mut b_arena, mut b_sched) = recalculated_child("beta", &[900.0], &[], &[]);
        a_sched.set_level_of_effort(0.5);
        b_sched.set_level_of_effort(0.0);

        let mut children = [
            RollupChildState {
                arena: &mut a_arena,
                schedule: &mut a_sched,
                rollup: None,
                root_name: "alpha",
            },
            RollupChildState {
                arena: &mut b_arena,
                schedule: &mut b_sched,
                rollup: None,
                root_name: "beta",
            },
        ];
        // alpha: 900 direct at 50% LOE means 1800 total, 900 indirect;
        // beta: 900 total, none indirect; blended 900/2700
        let blended = blend_level_of_effort(&mut children);
        assert!((blended - 900.0 / 2700.0).abs() < 1e-9);
    }

    #[test]
    fn children_that_are_rollups_get_no_joint_intervals() {
        let (mut a_arena, mut a_sched) = recalculated_child("alpha", &[100.0], &[], &[]);
        let nested = RollupMetrics::default();

        let mut root = TaskNode::new("team");
        let mut children = [RollupChildState {
            arena: &mut a_arena,
            schedule: &mut a_sched,
            rollup: Some(&nested),
            root_name: "alpha",
        }];
        let mut schedule = ScheduleRollup::new();
        RollupRecalculation::new(settings_at(ts(1))).recalculate(
            &mut root,
            &mut children,
            &mut schedule,
        );

        assert!(schedule.schedule.metrics.cost_interval.is_none());
        assert!(schedule.rollup.optimized_date_interval.is_none());
        assert!(schedule.rollup.is_rollup_of_rollups);
    }
}
