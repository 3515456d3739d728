//! Recalculation of an imported (snapshot-sourced) task list.
//!
//! Imported plans were computed by the tool that exported them; their
//! leaf figures and the period ledger are read-only inputs here. A
//! recalculation only re-sorts the leaves, re-sums the hierarchy for
//! display, and re-derives the aggregate metrics, trusting any embedded
//! forecast dates over recomputation.

use crate::calculator::data::recalculate_task_hierarchy;
use crate::calculator::{
    recalc_date_completed, recalc_plan_times, reset_node_data,
};
use crate::dates::Timestamp;
use crate::forecast::{ForecastDateCalculator, SavedForecastDate};
use crate::schedule::TimePhasedSchedule;
use crate::settings::EvSettings;
use crate::task::{TaskArena, TaskId};
use std::cmp::Ordering;
use tracing::debug;

/// Recalculation for an externally-computed plan. Leaf data and the
/// ledger are trusted; only orderings, sums, and metrics are derived.
pub struct ImportedRecalculation {
    pub settings: EvSettings,
    ev_leaves: Vec<TaskId>,
}

impl ImportedRecalculation {
    pub fn new(settings: EvSettings) -> Self {
        Self { settings: settings.sanitized(), ev_leaves: Vec::new() }
    }

    /// Valid after [`recalculate`](Self::recalculate).
    pub fn ev_leaves(&self) -> &[TaskId] {
        &self.ev_leaves
    }

    pub fn recalculate(&mut self, arena: &mut TaskArena, schedule: &mut TimePhasedSchedule) {
        let root = arena.root();
        debug!(tasks = arena.len(), "recalculating imported list");

        reset_parent_nodes(arena, root);
        recalc_plan_times(arena, root, self.settings.plan_time_tolerance);
        recalc_date_completed(arena, root);

        self.ev_leaves.clear();
        collect_imported_leaves(arena, root, &mut self.ev_leaves);
        sort_imported_leaves(arena, &mut self.ev_leaves);
        self.calc_task_values(arena);

        let effective = schedule
            .effective_date()
            .or(self.settings.effective_date)
            .unwrap_or_else(Timestamp::now);
        schedule.set_effective_date(effective);
        let period = schedule.period_containing(effective);
        schedule.metrics.reset(
            Some(schedule.start_date()),
            effective,
            period.map(|i| schedule.begin_date(i)),
            period.map(|i| schedule.get(i).end_date),
        );
        for &id in &self.ev_leaves {
            let node = arena.node(id);
            schedule.metrics.add_task(
                node.plan_value,
                node.actual_node_time,
                node.plan_date,
                node.date_completed,
            );
        }
        schedule.recalc_metrics_schedule_time(self.settings.use_partial_dtpi);

        recalculate_task_hierarchy(arena, root);
        SavedForecastDate.calculate_forecast_dates(arena, schedule, &self.ev_leaves, &self.settings);
    }

    /// Imported exports carry plan time per task; value equals plan time,
    /// earned in full on completion, accumulated in sorted-leaf order.
    fn calc_task_values(&self, arena: &mut TaskArena) {
        let mut cum_plan_value = 0.0;
        for &id in &self.ev_leaves {
            let node = arena.node_mut(id);
            node.plan_value = node.plan_time;
            cum_plan_value += node.plan_value;
            node.cum_plan_value = cum_plan_value;
            if node.date_completed.is_some() {
                node.value_earned = node.plan_value;
            }
        }
    }
}

/// Clear the derived fields of the interior nodes, preserving every leaf
/// figure the import supplied.
fn reset_parent_nodes(arena: &mut TaskArena, id: TaskId) {
    if arena.is_leaf(id) {
        let node = arena.node_mut(id);
        node.plan_value = 0.0;
        node.cum_plan_value = 0.0;
        node.value_earned = 0.0;
        return;
    }
    let node = arena.node_mut(id);
    reset_node_data(node);
    node.date_completed = None;
    for child in arena.children(id) {
        reset_parent_nodes(arena, child);
    }
}

fn collect_imported_leaves(arena: &TaskArena, id: TaskId, out: &mut Vec<TaskId>) {
    let node = arena.node(id);
    if node.is_level_of_effort_task() || node.is_user_pruned() {
        return;
    }
    if arena.is_ev_leaf(id) {
        out.push(id);
    } else {
        for child in arena.children(id) {
            collect_imported_leaves(arena, child, out);
        }
    }
}

/// Completed tasks first in completion order, then by planned date;
/// stable, so document order breaks the remaining ties.
fn sort_imported_leaves(arena: &TaskArena, leaves: &mut [TaskId]) {
    let cmp_none_last = |a: Option<Timestamp>, b: Option<Timestamp>| match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    };
    leaves.sort_by(|&a, &b| {
        let (na, nb) = (arena.node(a), arena.node(b));
        cmp_none_last(na.date_completed, nb.date_completed)
            .then_with(|| cmp_none_last(na.plan_date, nb.plan_date))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::WEEK_MILLIS;
    use crate::task::TaskNode;

    fn ts(weeks: i64) -> Timestamp {
        Timestamp::from_millis(1_500_000_000_000 + weeks * WEEK_MILLIS)
    }

    fn imported_project() -> (TaskArena, TimePhasedSchedule, Vec<TaskId>) {
        let mut arena = TaskArena::new(TaskNode::new("import"));
        let ids = vec![
            arena.add_child(arena.root(), TaskNode::new("a").with_plan_time(300.0)),
            arena.add_child(arena.root(), TaskNode::new("b").with_plan_time(300.0)),
        ];
        arena.node_mut(ids[0]).plan_date = Some(ts(1));
        arena.node_mut(ids[1]).plan_date = Some(ts(2));
        let mut schedule = TimePhasedSchedule::new(ts(0), 300.0);
        schedule.add_row();
        schedule.set_effective_date(ts(1));
        (arena, schedule, ids)
    }

    #[test]
    fn imported_values_derive_from_plan_time() {
        let (mut arena, mut schedule, ids) = imported_project();
        arena.node_mut(ids[0]).date_completed = Some(ts(1));
        arena.node_mut(ids[0]).actual_node_time = 350.0;

        let mut calc = ImportedRecalculation::new(EvSettings::default());
        calc.recalculate(&mut arena, &mut schedule);

        assert_eq!(arena.node(ids[0]).plan_value, 300.0);
        assert_eq!(arena.node(ids[0]).value_earned, 300.0);
        assert_eq!(arena.node(ids[1]).cum_plan_value, 600.0);
        assert_eq!(schedule.metrics.total_plan(), 600.0);
        assert_eq!(schedule.metrics.earned_value(), 300.0);
        assert_eq!(schedule.metrics.actual(), 350.0);
    }

    #[test]
    fn embedded_forecast_dates_are_trusted() {
        let (mut arena, mut schedule, ids) = imported_project();
        arena.node_mut(ids[0]).forecast_date = Some(ts(3));
        arena.node_mut(ids[1]).forecast_date = Some(ts(4));
        // per-leaf forecasts carry value, so the summed root forecast does too
        arena.node_mut(ids[0]).date_completed = Some(ts(1));

        let mut calc = ImportedRecalculation::new(EvSettings::default());
        calc.recalculate(&mut arena, &mut schedule);

        assert_eq!(schedule.metrics.forecast_date, Some(ts(4)));
    }

    #[test]
    fn completed_leaves_sort_ahead_of_planned_ones() {
        let (mut arena, mut schedule, ids) = imported_project();
        arena.node_mut(ids[1]).date_completed = Some(ts(1));

        let mut calc = ImportedRecalculation::new(EvSettings::default());
        calc.recalculate(&mut arena, &mut schedule);

        assert_eq!(calc.ev_leaves(), &[ids[1], ids[0]]);
        assert_eq!(arena.node(ids[1]).cum_plan_value, 300.0);
        assert_eq!(arena.node(ids[0]).cum_plan_value, 600.0);
    }
}
