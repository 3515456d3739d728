//! Recalculation engines.
//!
//! Four flavors share the machinery in this module: [`data`] recomputes
//! everything from raw task and time-log data, [`rollup`] aggregates
//! already-recalculated child schedules, [`leaves`] produces only the
//! ordered EV-leaf list, and [`imported`] re-derives display values from
//! a snapshot whose numbers were computed elsewhere.

pub mod data;
pub mod imported;
pub mod leaves;
pub mod rollup;

use crate::dates::{self, Timestamp, DAY_MILLIS};
use crate::forecast::{
    ForecastDateCalculator, HourlyEvRateExtrapolation, ScheduleExtrapolation,
    ScheduleTaskExtrapolation, SimpleExtrapolation,
};
use crate::metrics::PerformanceMetrics;
use crate::settings::EvSettings;
use crate::task::{TaskArena, TaskId, TaskNode, Pruning, NOT_LEVEL_OF_EFFORT, INFER_ORDINAL};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Which forecast strategy a task list runs at the end of recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForecastMethod {
    Simple,
    Schedule,
    HourlyEvRate,
    /// Per-task extrapolation; the default.
    #[default]
    Task,
}

impl ForecastMethod {
    pub fn calculator(self) -> Box<dyn ForecastDateCalculator> {
        match self {
            ForecastMethod::Simple => Box::new(SimpleExtrapolation),
            ForecastMethod::Schedule => Box::new(ScheduleExtrapolation { fallback_to_simple: true }),
            ForecastMethod::HourlyEvRate => Box::new(HourlyEvRateExtrapolation),
            ForecastMethod::Task => Box::new(ScheduleTaskExtrapolation),
        }
    }
}

// ---- derived-field reset ----------------------------------------------

/// Clear everything a recalculation pass re-derives. Leaf completion
/// dates, top-down plan figures, and imported forecast dates are inputs
/// and survive.
pub(crate) fn reset_node_data(node: &mut TaskNode) {
    node.plan_time = 0.0;
    node.bottom_up_plan_time = 0.0;
    node.plan_value = 0.0;
    node.cum_plan_value = 0.0;
    node.value_earned = 0.0;
    node.actual_node_time = 0.0;
    node.actual_time = 0.0;
    node.actual_direct_time = 0.0;
    node.actual_pre_time = 0.0;
    node.actual_current_time = 0.0;
    node.plan_date = None;
    node.plan_start_date = None;
    node.actual_start_date = None;
    node.replan_start_date = None;
    node.forecast_start_date = None;
    node.replan_date = None;
    node.forecast_date = None;
}

pub(crate) fn reset_root_data(node: &mut TaskNode) {
    node.top_down_plan_time = None;
    node.bottom_up_plan_time = 0.0;
    node.date_completed = None;
}

/// Reset the whole tree; completion dates of non-leaf nodes are derived
/// and cleared, leaf completion dates are preserved.
pub(crate) fn reset_tree(arena: &mut TaskArena, id: TaskId) {
    let is_leaf = arena.is_leaf(id);
    let node = arena.node_mut(id);
    reset_node_data(node);
    if !is_leaf {
        node.date_completed = None;
        for child in arena.children(id) {
            reset_tree(arena, child);
        }
    }
}

// ---- pruning -----------------------------------------------------------

/// Top-down pruning propagation: explicit user flags win; everything else
/// inherits from the parent, recorded as ancestor-pruned so views can
/// distinguish inherited state from a direct user choice.
pub(crate) fn prune_nodes(arena: &mut TaskArena, id: TaskId, parent_is_pruned: bool) {
    let node = arena.node_mut(id);
    let pruned = match node.pruning {
        Pruning::UserPruned => true,
        Pruning::UserUnpruned => false,
        _ => {
            node.pruning = if parent_is_pruned {
                Pruning::AncestorPruned
            } else {
                Pruning::InferFromContext
            };
            parent_is_pruned
        }
    };
    for child in arena.children(id) {
        prune_nodes(arena, child, pruned);
    }
}

// ---- plan time resolution ----------------------------------------------

/// Bottom-up plan-time resolution. A leaf's plan time is its top-down
/// figure. A parent's bottom-up time is the sum of its children; when a
/// defined top-down figure disagrees with that sum beyond the tolerance,
/// the top-down figure wins (and the disagreement is reported later as a
/// node error). A parent whose children sum to zero keeps its top-down
/// figure, making it an EV leaf.
pub(crate) fn recalc_plan_times(arena: &mut TaskArena, id: TaskId, tolerance: f64) -> f64 {
    if arena.is_leaf(id) {
        let node = arena.node_mut(id);
        node.plan_time = node.top_down_plan_time.unwrap_or(0.0);
        node.bottom_up_plan_time = node.plan_time;
        return node.plan_time;
    }

    let mut bottom_up = 0.0;
    for child in arena.children(id) {
        bottom_up += recalc_plan_times(arena, child, tolerance);
    }
    let node = arena.node_mut(id);
    node.bottom_up_plan_time = bottom_up;
    node.plan_time = match node.top_down_plan_time {
        Some(td) if bottom_up == 0.0 => td,
        Some(td) if (td - bottom_up).abs() > tolerance => td,
        _ => bottom_up,
    };
    node.plan_time
}

/// Does a defined top-down figure disagree with the children's sum?
pub(crate) fn has_plan_time_mismatch(node: &TaskNode, is_leaf: bool, tolerance: f64) -> bool {
    if is_leaf || node.bottom_up_plan_time == 0.0 {
        return false;
    }
    match node.top_down_plan_time {
        Some(td) => (td - node.bottom_up_plan_time).abs() > tolerance,
        None => false,
    }
}

// ---- completion dates ---------------------------------------------------

/// A parent is complete when every countable child is; its completion
/// date is the latest of theirs. User-pruned children do not count.
pub(crate) fn recalc_date_completed(arena: &mut TaskArena, id: TaskId) {
    if arena.is_leaf(id) {
        return;
    }
    for child in arena.children(id) {
        recalc_date_completed(arena, child);
    }
    recalc_parent_date_completed(arena, id);
}

pub(crate) fn recalc_parent_date_completed(arena: &mut TaskArena, id: TaskId) {
    let mut result: Option<Timestamp> = None;
    let mut all_complete = true;
    let mut counted = 0;
    for child in arena.children(id) {
        let c = arena.node(child);
        if c.is_user_pruned() {
            continue;
        }
        counted += 1;
        match c.date_completed {
            None => all_complete = false,
            Some(d) => result = Some(result.map_or(d, |r| r.max(d))),
        }
    }
    arena.node_mut(id).date_completed = if counted > 0 && all_complete { result } else { None };
}

// ---- level of effort ----------------------------------------------------

/// A node with an explicit LOE percentage contributes it (zero when user
/// pruned) and marks every descendant as inheriting; otherwise a node's
/// LOE is the sum of its children's.
pub(crate) fn calculate_level_of_effort(arena: &mut TaskArena, id: TaskId) -> f64 {
    if arena.node(id).plan_level_of_effort > 0.0 {
        for child in arena.children(id) {
            set_inherits_level_of_effort(arena, child);
        }
        let node = arena.node(id);
        if node.is_user_pruned() {
            0.0
        } else {
            node.plan_level_of_effort
        }
    } else {
        // clear a stale inherited flag from a parent that no longer has one
        arena.node_mut(id).plan_level_of_effort = NOT_LEVEL_OF_EFFORT;
        let mut total = 0.0;
        for child in arena.children(id) {
            total += calculate_level_of_effort(arena, child);
        }
        total
    }
}

fn set_inherits_level_of_effort(arena: &mut TaskArena, id: TaskId) {
    arena.node_mut(id).plan_level_of_effort = 0.0;
    for child in arena.children(id) {
        set_inherits_level_of_effort(arena, child);
    }
}

// ---- EV leaves -----------------------------------------------------------

/// Ordered list of value-earning units: EV leaves, minus pruned and
/// level-of-effort subtrees, in document order.
pub(crate) fn collect_ev_leaves(arena: &TaskArena, id: TaskId, out: &mut Vec<TaskId>) {
    let node = arena.node(id);
    if node.is_level_of_effort_task() || node.is_user_pruned() {
        return;
    }
    if arena.is_ev_leaf(id) {
        out.push(id);
    } else {
        for child in arena.children(id) {
            collect_ev_leaves(arena, child, out);
        }
    }
}

pub(crate) fn contains_task_ordinals(arena: &TaskArena, id: TaskId) -> bool {
    if arena.node(id).task_ordinal > 0 {
        return true;
    }
    arena.children(id).into_iter().any(|c| contains_task_ordinals(arena, c))
}

/// Walk the tree in document order carrying a running default ordinal:
/// explicit ordinals replace the default, EV leaves without one adopt it.
pub(crate) fn assign_task_ordinals(
    arena: &mut TaskArena,
    id: TaskId,
    mut default_ordinal: i32,
    ev_leaves: &[TaskId],
) -> i32 {
    if arena.node(id).is_level_of_effort_task() {
        return default_ordinal;
    }
    if arena.node(id).task_ordinal != INFER_ORDINAL {
        default_ordinal = arena.node(id).task_ordinal;
    } else if ev_leaves.contains(&id) {
        arena.node_mut(id).task_ordinal = default_ordinal;
    }
    for child in arena.children(id) {
        default_ordinal = assign_task_ordinals(arena, child, default_ordinal, ev_leaves);
    }
    default_ordinal
}

fn cmp_dates_none_last(a: Option<Timestamp>, b: Option<Timestamp>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

/// Sort EV leaves: completed tasks first in completion order, then by
/// ordinal; stable, so document order breaks remaining ties. When
/// `reorder_completed` is off, only tasks completed before the schedule
/// start float to the front.
pub(crate) fn sort_ev_leaves(
    arena: &TaskArena,
    ev_leaves: &mut [TaskId],
    schedule_start: Timestamp,
    reorder_completed: bool,
    rezero_at_start_date: bool,
) {
    let effective_completion = |id: TaskId| -> Option<Timestamp> {
        arena
            .node(id)
            .date_completed
            .filter(|d| reorder_completed || (rezero_at_start_date && *d < schedule_start))
    };
    ev_leaves.sort_by(|&a, &b| {
        cmp_dates_none_last(effective_completion(a), effective_completion(b))
            .then_with(|| arena.node(a).task_ordinal.cmp(&arena.node(b).task_ordinal))
    });
}

// ---- bottom-up aggregation ----------------------------------------------

/// Roll one node's own figures together with its (already summed)
/// children: values and times add, plan dates take the latest, start
/// dates the earliest. Replan and forecast dates poison on a child that
/// should have one but doesn't, and never overwrite a date the node
/// already carries (a parent acting as a single EV leaf keeps its own).
pub(crate) fn sum_up_node_data(arena: &mut TaskArena, id: TaskId) {
    let children = arena.children(id);
    {
        let node = arena.node_mut(id);
        if !node.is_user_pruned() && !node.is_level_of_effort_task() {
            node.actual_direct_time = node.actual_node_time;
        }
        node.actual_time = node.actual_node_time + node.actual_pre_time;
        node.actual_current_time = node.actual_node_time;
    }

    let mut replan_acc = Some(Timestamp::LONG_AGO);
    let mut forecast_acc = Some(Timestamp::LONG_AGO);

    for child in children {
        let c = arena.node(child).clone();
        let value_pruned = c.is_user_pruned() || c.is_level_of_effort_task();
        let node = arena.node_mut(id);
        node.plan_value += c.plan_value;
        node.cum_plan_value = node.cum_plan_value.max(c.cum_plan_value);
        node.value_earned += c.value_earned;
        node.actual_time += c.actual_time;
        node.actual_direct_time += c.actual_direct_time;
        node.actual_current_time += c.actual_current_time;
        node.plan_start_date = dates::min_start_date(node.plan_start_date, c.plan_start_date);
        node.actual_start_date = dates::min_start_date(node.actual_start_date, c.actual_start_date);
        node.replan_start_date = dates::min_start_date(node.replan_start_date, c.replan_start_date);
        node.forecast_start_date =
            dates::min_start_date(node.forecast_start_date, c.forecast_start_date);
        node.plan_date = dates::max_plan_date(node.plan_date, c.plan_date);

        if !value_pruned {
            if c.replan_date.is_some() || c.plan_value > 0.0 {
                replan_acc = dates::max_forecast_date(replan_acc, c.replan_date);
            }
            if c.forecast_date.is_some() || c.plan_value > 0.0 {
                forecast_acc = dates::max_forecast_date(forecast_acc, c.forecast_date);
            }
        }
    }

    let node = arena.node_mut(id);
    if node.replan_date.is_none() && replan_acc != Some(Timestamp::LONG_AGO) {
        node.replan_date = replan_acc;
    }
    if node.forecast_date.is_none() && forecast_acc != Some(Timestamp::LONG_AGO) {
        node.forecast_date = forecast_acc;
    }
}

// ---- node errors ---------------------------------------------------------

/// Scan the tree for recoverable data anomalies and record them in the
/// metrics error map. Messages ending in a space are warnings.
pub(crate) fn check_for_node_errors(
    arena: &TaskArena,
    metrics: &mut PerformanceMetrics,
    settings: &EvSettings,
    effective_date: Timestamp,
) {
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut flagged: HashSet<TaskId> = HashSet::new();

    for id in arena.ids_in_document_order() {
        let node = arena.node(id);
        if id == arena.root() {
            continue;
        }

        for tid in &node.task_ids {
            if !seen_ids.insert(tid.clone()) && flagged.insert(id) {
                metrics.add_error(
                    format!("The task {} appears in the plan more than once", node.full_name),
                    node.full_name.clone(),
                );
            }
        }

        let is_leaf = arena.is_leaf(id);
        if has_plan_time_mismatch(node, is_leaf, settings.plan_time_tolerance) {
            metrics.add_error(
                format!(
                    "The top-down planned time for {} ({:.0} min) does not match the sum of its subtasks ({:.0} min) ",
                    node.full_name,
                    node.top_down_plan_time.unwrap_or(0.0),
                    node.bottom_up_plan_time
                ),
                node.full_name.clone(),
            );
        }

        if is_leaf
            && node.top_down_plan_time.is_none()
            && !node.is_level_of_effort_task()
            && !node.is_user_pruned()
        {
            metrics.add_error(
                format!("The task {} has no planned time ", node.full_name),
                node.full_name.clone(),
            );
        }

        if is_leaf {
            if let Some(d) = node.date_completed {
                if d.millis() > effective_date.millis() + DAY_MILLIS {
                    metrics.add_error(
                        format!("The task {} has a completion date in the future", node.full_name),
                        node.full_name.clone(),
                    );
                }
            }
        }
    }
}

// ---- baselines -----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BaselineEntry {
    pub date: Option<Timestamp>,
    pub time: f64,
}

/// A saved snapshot of planned dates and times, keyed by task id (and by
/// `id~person` for tasks split across assignees).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Baseline {
    entries: HashMap<String, BaselineEntry>,
}

impl Baseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, entry: BaselineEntry) {
        self.entries.insert(key.into(), entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capture the current plan of a task tree as a baseline.
    pub fn from_arena(arena: &TaskArena) -> Self {
        let mut baseline = Self::new();
        for id in arena.ids_in_document_order() {
            let node = arena.node(id);
            let entry = BaselineEntry { date: node.plan_date, time: node.plan_time };
            for tid in &node.task_ids {
                baseline.insert(tid.clone(), entry.clone());
                for who in &node.assigned_to {
                    baseline.insert(format!("{tid}~{who}"), entry.clone());
                }
            }
            if node.task_ids.is_empty() {
                baseline.insert(node.full_name.clone(), entry);
            }
        }
        baseline
    }

    fn lookup(&self, node: &TaskNode) -> Option<&BaselineEntry> {
        for tid in &node.task_ids {
            if let Some(e) = self.entries.get(tid) {
                return Some(e);
            }
            for who in &node.assigned_to {
                if let Some(e) = self.entries.get(&format!("{tid}~{who}")) {
                    return Some(e);
                }
            }
        }
        self.entries.get(&node.full_name)
    }
}

/// Attach baseline date/cost to every node: direct matches win, parents
/// without a match sum their children. Nodes with no counterpart degrade
/// to "no baseline".
pub(crate) fn recalc_baseline_data(arena: &mut TaskArena, id: TaskId, baseline: Option<&Baseline>) {
    for child in arena.children(id) {
        recalc_baseline_data(arena, child, baseline);
    }

    let matched = baseline.and_then(|b| b.lookup(arena.node(id))).cloned();
    match matched {
        Some(entry) => {
            let node = arena.node_mut(id);
            node.baseline_date = entry.date;
            node.baseline_time = entry.time;
        }
        None => {
            let mut time = 0.0;
            let mut date: Option<Timestamp> = None;
            let mut any = false;
            for child in arena.children(id) {
                let c = arena.node(child);
                if c.baseline_date.is_some() || c.baseline_time > 0.0 {
                    any = true;
                    time += c.baseline_time;
                    date = dates::max_plan_date(date, c.baseline_date);
                }
            }
            let node = arena.node_mut(id);
            if any {
                node.baseline_date = date;
                node.baseline_time = time;
            } else {
                node.baseline_date = None;
                node.baseline_time = f64::NAN;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::WEEK_MILLIS;

    fn ts(weeks: i64) -> Timestamp {
        Timestamp::from_millis(1_500_000_000_000 + weeks * WEEK_MILLIS)
    }

    fn three_leaf_arena() -> (TaskArena, Vec<TaskId>) {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let ids = vec![
            arena.add_child(arena.root(), TaskNode::new("a").with_plan_time(100.0)),
            arena.add_child(arena.root(), TaskNode::new("b").with_plan_time(200.0)),
            arena.add_child(arena.root(), TaskNode::new("c").with_plan_time(300.0)),
        ];
        (arena, ids)
    }

    #[test]
    fn pruning_inherits_unless_explicitly_unpruned() {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let parent = arena.add_child(arena.root(), TaskNode::new("parent"));
        let child = arena.add_child(parent, TaskNode::new("child"));
        let kept = arena.add_child(parent, TaskNode::new("kept"));
        arena.node_mut(parent).pruning = Pruning::UserPruned;
        arena.node_mut(kept).pruning = Pruning::UserUnpruned;

        let root = arena.root();
        prune_nodes(&mut arena, root, false);

        assert_eq!(arena.node(child).pruning, Pruning::AncestorPruned);
        assert!(arena.node(child).is_user_pruned());
        assert!(!arena.node(kept).is_user_pruned());
    }

    #[test]
    fn top_down_wins_on_disagreement() {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let parent = arena.add_child(arena.root(), TaskNode::new("parent").with_plan_time(480.0));
        arena.add_child(parent, TaskNode::new("x").with_plan_time(250.0));
        arena.add_child(parent, TaskNode::new("y").with_plan_time(250.0));

        let root = arena.root();
        recalc_plan_times(&mut arena, root, 0.5);

        let node = arena.node(parent);
        assert_eq!(node.bottom_up_plan_time, 500.0);
        assert_eq!(node.plan_time, 480.0);
        assert!(has_plan_time_mismatch(node, false, 0.5));
    }

    #[test]
    fn mismatch_within_tolerance_is_ignored() {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let parent = arena.add_child(arena.root(), TaskNode::new("parent").with_plan_time(500.3));
        arena.add_child(parent, TaskNode::new("x").with_plan_time(500.0));

        let root = arena.root();
        recalc_plan_times(&mut arena, root, 0.5);
        assert!(!has_plan_time_mismatch(arena.node(parent), false, 0.5));
        assert_eq!(arena.node(parent).plan_time, 500.0);
    }

    #[test]
    fn level_of_effort_marks_descendants_and_sums() {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let overhead = arena.add_child(arena.root(), TaskNode::new("overhead"));
        let meeting = arena.add_child(overhead, TaskNode::new("meetings"));
        arena.node_mut(overhead).plan_level_of_effort = 0.15;

        let root = arena.root();
        let total = calculate_level_of_effort(&mut arena, root);

        assert!((total - 0.15).abs() < 1e-9);
        assert!(arena.node(meeting).inherits_level_of_effort());
        assert!(arena.node(meeting).is_level_of_effort_task());
    }

    #[test]
    fn ev_leaf_collection_skips_loe_and_pruned() {
        let (mut arena, ids) = three_leaf_arena();
        arena.node_mut(ids[0]).plan_level_of_effort = 0.1;
        arena.node_mut(ids[1]).pruning = Pruning::UserPruned;

        let mut leaves = Vec::new();
        collect_ev_leaves(&arena, arena.root(), &mut leaves);
        assert_eq!(leaves, vec![ids[2]]);
    }

    #[test]
    fn completed_tasks_sort_to_the_front() {
        let (mut arena, mut ids) = three_leaf_arena();
        arena.node_mut(ids[2]).date_completed = Some(ts(1));
        arena.node_mut(ids[1]).date_completed = Some(ts(2));

        sort_ev_leaves(&arena, &mut ids, ts(0), true, true);
        let names: Vec<&str> = ids.iter().map(|&i| arena.node(i).name.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "a"]);
    }

    #[test]
    fn reorder_off_keeps_tasks_completed_after_start_in_place() {
        let (mut arena, mut ids) = three_leaf_arena();
        arena.node_mut(ids[2]).date_completed = Some(ts(1));

        sort_ev_leaves(&arena, &mut ids, ts(0), false, true);
        let names: Vec<&str> = ids.iter().map(|&i| arena.node(i).name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn parent_completion_requires_every_child() {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let parent = arena.add_child(arena.root(), TaskNode::new("parent"));
        let a = arena.add_child(parent, TaskNode::new("a"));
        let b = arena.add_child(parent, TaskNode::new("b"));

        arena.node_mut(a).date_completed = Some(ts(1));
        let root = arena.root();
        recalc_date_completed(&mut arena, root);
        assert_eq!(arena.node(parent).date_completed, None);

        arena.node_mut(b).date_completed = Some(ts(3));
        let root = arena.root();
        recalc_date_completed(&mut arena, root);
        assert_eq!(arena.node(parent).date_completed, Some(ts(3)));
    }

    #[test]
    fn duplicate_task_ids_are_reported() {
        let (mut arena, ids) = three_leaf_arena();
        arena.node_mut(ids[0]).task_ids = vec!["T1".into()];
        arena.node_mut(ids[1]).task_ids = vec!["T1".into()];

        let mut metrics = PerformanceMetrics::new();
        check_for_node_errors(&arena, &mut metrics, &EvSettings::default(), ts(1));

        let errors = metrics.errors.expect("errors recorded");
        assert!(errors.keys().any(|m| m.contains("more than once")));
    }

    #[test]
    fn baseline_lookup_falls_back_to_assignee_suffix() {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let a = arena.add_child(arena.root(), TaskNode::new("a"));
        arena.node_mut(a).task_ids = vec!["T9".into()];
        arena.node_mut(a).assigned_to = vec!["pat".into()];

        let mut baseline = Baseline::new();
        baseline.insert("T9~pat", BaselineEntry { date: Some(ts(4)), time: 240.0 });

        let root = arena.root();
        recalc_baseline_data(&mut arena, root, Some(&baseline));
        assert_eq!(arena.node(a).baseline_date, Some(ts(4)));
        assert_eq!(arena.node(a).baseline_time, 240.0);
        // parent summed from its only child
        assert_eq!(arena.node(arena.root()).baseline_time, 240.0);
    }
}
