//! Leaf-list-only recalculation.
//!
//! Some callers only need to know which tasks count as value-earning
//! units and in what order they are planned to complete: task selection
//! dialogs, dependency resolution, and the rollup's duplicate check. This
//! variant runs the tree passes that determine that list and nothing
//! else, leaving the schedule ledger and the metrics untouched.

use crate::calculator::{
    assign_task_ordinals, calculate_level_of_effort, collect_ev_leaves, contains_task_ordinals,
    prune_nodes, recalc_date_completed, recalc_plan_times, reset_root_data, reset_tree,
    sort_ev_leaves,
};
use crate::dates::Timestamp;
use crate::settings::EvSettings;
use crate::task::{TaskArena, TaskId};
use tracing::debug;

/// Recalculation that stops after producing the ordered EV-leaf list.
pub struct LeavesOnlyRecalculation {
    pub settings: EvSettings,
    pub rezero_at_start_date: bool,
    ev_leaves: Vec<TaskId>,
}

impl LeavesOnlyRecalculation {
    pub fn new(settings: EvSettings) -> Self {
        Self {
            settings: settings.sanitized(),
            rezero_at_start_date: true,
            ev_leaves: Vec::new(),
        }
    }

    /// Valid after [`recalculate`](Self::recalculate).
    pub fn ev_leaves(&self) -> &[TaskId] {
        &self.ev_leaves
    }

    /// Prune, resolve plan times, compute level of effort, and produce
    /// the sorted EV-leaf list. No value or actual figures are derived.
    pub fn recalculate(&mut self, arena: &mut TaskArena, schedule_start: Timestamp) {
        let root = arena.root();
        reset_root_data(arena.node_mut(root));
        reset_tree(arena, root);
        prune_nodes(arena, root, false);
        calculate_level_of_effort(arena, root);
        recalc_plan_times(arena, root, self.settings.plan_time_tolerance);
        recalc_date_completed(arena, root);

        self.ev_leaves.clear();
        collect_ev_leaves(arena, root, &mut self.ev_leaves);
        if contains_task_ordinals(arena, root) {
            assign_task_ordinals(arena, root, 1, &self.ev_leaves);
        }
        sort_ev_leaves(
            arena,
            &mut self.ev_leaves,
            schedule_start,
            self.settings.reorder_completed,
            self.rezero_at_start_date,
        );
        debug!(leaves = self.ev_leaves.len(), "leaf list recalculated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::WEEK_MILLIS;
    use crate::task::{Pruning, TaskNode};

    fn ts(weeks: i64) -> Timestamp {
        Timestamp::from_millis(1_500_000_000_000 + weeks * WEEK_MILLIS)
    }

    #[test]
    fn produces_the_sorted_leaf_list_without_touching_values() {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let a = arena.add_child(arena.root(), TaskNode::new("a").with_plan_time(100.0));
        let b = arena.add_child(arena.root(), TaskNode::new("b").with_plan_time(200.0));
        let c = arena.add_child(arena.root(), TaskNode::new("c").with_plan_time(300.0));
        arena.node_mut(c).date_completed = Some(ts(1));
        arena.node_mut(b).pruning = Pruning::UserPruned;

        let mut calc = LeavesOnlyRecalculation::new(EvSettings::default());
        calc.recalculate(&mut arena, ts(0));

        assert_eq!(calc.ev_leaves(), &[c, a]);
        // plan times resolve, but no value is assigned
        assert_eq!(arena.node(a).plan_time, 100.0);
        assert_eq!(arena.node(a).plan_value, 0.0);
        assert_eq!(arena.node(a).plan_date, None);
    }

    #[test]
    fn phantom_parent_appears_as_a_single_leaf() {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let unit = arena.add_child(arena.root(), TaskNode::new("unit").with_plan_time(240.0));
        arena.add_child(unit, TaskNode::new("part"));

        let mut calc = LeavesOnlyRecalculation::new(EvSettings::default());
        calc.recalculate(&mut arena, ts(0));
        assert_eq!(calc.ev_leaves(), &[unit]);
    }
}
