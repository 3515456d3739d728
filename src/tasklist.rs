//! Task lists: a named tree of tasks bound to its schedule and the
//! recalculation engine that matches where the data comes from.
//!
//! Edits set a dirty flag; nothing recomputes until a caller invokes
//! [`maybe_recalculate`](EvTaskList::maybe_recalculate). Batching of
//! rapid-fire edits is the caller's job, helped by [`RecalcDebouncer`].

use crate::calculator::data::{DataRecalculation, TimeLogEntry};
use crate::calculator::imported::ImportedRecalculation;
use crate::calculator::rollup::{RollupChildState, RollupRecalculation};
use crate::dates::Timestamp;
use crate::dependency::DependencyRegistry;
use crate::rollup::ScheduleRollup;
use crate::schedule::{SharedSchedule, TimePhasedSchedule, shared};
use crate::settings::EvSettings;
use crate::task::{TaskArena, TaskId, TaskNode};
use std::time::{Duration, Instant};
use tracing::debug;

/// A plan whose figures come from live task data and a time log.
pub struct DataTaskList {
    pub name: String,
    pub arena: TaskArena,
    pub schedule: SharedSchedule,
    pub time_log: Vec<TimeLogEntry>,
    pub calc: DataRecalculation,
    dirty: bool,
}

impl DataTaskList {
    pub fn new(
        name: impl Into<String>,
        arena: TaskArena,
        schedule: TimePhasedSchedule,
        settings: EvSettings,
    ) -> Self {
        Self {
            name: name.into(),
            arena,
            schedule: shared(schedule),
            time_log: Vec::new(),
            calc: DataRecalculation::new(settings),
            dirty: true,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn recalculate(&mut self) {
        let mut schedule = self.schedule.lock();
        self.calc.recalculate(&mut self.arena, &mut schedule, &self.time_log);
        self.dirty = false;
    }
}

/// A plan imported from another tool's export; leaf figures are trusted.
pub struct ImportedTaskList {
    pub name: String,
    pub arena: TaskArena,
    pub schedule: SharedSchedule,
    pub calc: ImportedRecalculation,
    dirty: bool,
}

impl ImportedTaskList {
    pub fn new(
        name: impl Into<String>,
        arena: TaskArena,
        schedule: TimePhasedSchedule,
        settings: EvSettings,
    ) -> Self {
        Self {
            name: name.into(),
            arena,
            schedule: shared(schedule),
            calc: ImportedRecalculation::new(settings),
            dirty: true,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn recalculate(&mut self) {
        let mut schedule = self.schedule.lock();
        self.calc.recalculate(&mut self.arena, &mut schedule);
        self.dirty = false;
    }
}

/// An aggregate plan combining several child task lists. Children are
/// owned and recalculated before every rollup pass.
pub struct RollupTaskList {
    pub name: String,
    /// Single-node arena holding the aggregate root.
    pub arena: TaskArena,
    pub children: Vec<EvTaskList>,
    pub rollup: ScheduleRollup,
    pub calc: RollupRecalculation,
    dirty: bool,
}

impl RollupTaskList {
    pub fn new(name: impl Into<String>, settings: EvSettings) -> Self {
        let name = name.into();
        Self {
            arena: TaskArena::new(TaskNode::new(name.clone())),
            name,
            children: Vec::new(),
            rollup: ScheduleRollup::new(),
            calc: RollupRecalculation::new(settings),
            dirty: true,
        }
    }

    /// Add a child list, refusing any that would make a rollup contain
    /// itself through the membership graph.
    pub fn add_child(&mut self, registry: &mut DependencyRegistry, child: EvTaskList) -> bool {
        if !registry.add_membership(&self.name, child.name()) {
            debug!(rollup = %self.name, child = %child.name(), "rejected circular membership");
            return false;
        }
        self.children.push(child);
        self.dirty = true;
        true
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn recalculate(&mut self) {
        for child in &mut self.children {
            child.maybe_recalculate();
        }

        // lock every shared child ledger for the duration of the merge
        let arcs: Vec<Option<SharedSchedule>> =
            self.children.iter().map(EvTaskList::shared_schedule).collect();
        let mut guards: Vec<_> = arcs.iter().map(|a| a.as_ref().map(|a| a.lock())).collect();

        let mut states: Vec<RollupChildState<'_>> = Vec::with_capacity(self.children.len());
        for (child, guard) in self.children.iter_mut().zip(guards.iter_mut()) {
            match child {
                EvTaskList::Data(list) => {
                    if let Some(g) = guard.as_mut() {
                        states.push(RollupChildState {
                            arena: &mut list.arena,
                            schedule: &mut **g,
                            rollup: None,
                            root_name: &list.name,
                        });
                    }
                }
                EvTaskList::Imported(list) => {
                    if let Some(g) = guard.as_mut() {
                        states.push(RollupChildState {
                            arena: &mut list.arena,
                            schedule: &mut **g,
                            rollup: None,
                            root_name: &list.name,
                        });
                    }
                }
                EvTaskList::Rollup(list) => {
                    let ScheduleRollup { schedule, rollup } = &mut list.rollup;
                    states.push(RollupChildState {
                        arena: &mut list.arena,
                        schedule,
                        rollup: Some(&*rollup),
                        root_name: &list.name,
                    });
                }
            }
        }

        let root = self.arena.root();
        self.calc
            .recalculate(self.arena.node_mut(root), &mut states, &mut self.rollup);
        self.dirty = false;
    }

    /// Date range displayed for a member whose own schedule can never
    /// finish the assigned work: from the earliest member's finish to the
    /// team's optimized finish, on the assumption that the team can
    /// rebalance. Suppressed for rollups of rollups, where cross-team
    /// rebalancing cannot be assumed.
    pub fn balanced_forecast_range(&self) -> Option<(Timestamp, Timestamp)> {
        if self.rollup.rollup.is_rollup_of_rollups {
            return None;
        }
        let earliest = self
            .rollup
            .rollup
            .earliest_forecast_date
            .filter(|d| !d.is_sentinel())?;
        let optimized = self.rollup.rollup.optimized_forecast_date?;
        Some((earliest.min(optimized), earliest.max(optimized)))
    }

    /// Fallback forecast range for one child task: only offered when the
    /// task is incomplete and its own schedule produced no forecast.
    pub fn task_forecast_range(&self, child: usize, id: TaskId) -> Option<(Timestamp, Timestamp)> {
        let node = self.children.get(child)?.arena().node(id);
        if node.is_completed() || node.forecast_date.is_some() {
            return None;
        }
        self.balanced_forecast_range()
    }
}

/// One task list of any flavor.
pub enum EvTaskList {
    Data(DataTaskList),
    Imported(ImportedTaskList),
    Rollup(RollupTaskList),
}

impl EvTaskList {
    pub fn name(&self) -> &str {
        match self {
            EvTaskList::Data(l) => &l.name,
            EvTaskList::Imported(l) => &l.name,
            EvTaskList::Rollup(l) => &l.name,
        }
    }

    pub fn arena(&self) -> &TaskArena {
        match self {
            EvTaskList::Data(l) => &l.arena,
            EvTaskList::Imported(l) => &l.arena,
            EvTaskList::Rollup(l) => &l.arena,
        }
    }

    /// The shared ledger, for flavors whose schedule is aliased; a
    /// rollup's merged ledger is owned outright and returns `None`.
    pub fn shared_schedule(&self) -> Option<SharedSchedule> {
        match self {
            EvTaskList::Data(l) => Some(l.schedule.clone()),
            EvTaskList::Imported(l) => Some(l.schedule.clone()),
            EvTaskList::Rollup(_) => None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        match self {
            EvTaskList::Data(l) => l.dirty,
            EvTaskList::Imported(l) => l.dirty,
            EvTaskList::Rollup(l) => l.dirty,
        }
    }

    pub fn mark_dirty(&mut self) {
        match self {
            EvTaskList::Data(l) => l.mark_dirty(),
            EvTaskList::Imported(l) => l.mark_dirty(),
            EvTaskList::Rollup(l) => l.mark_dirty(),
        }
    }

    pub fn recalculate(&mut self) {
        match self {
            EvTaskList::Data(l) => l.recalculate(),
            EvTaskList::Imported(l) => l.recalculate(),
            EvTaskList::Rollup(l) => l.recalculate(),
        }
    }

    /// Recalculate only when an edit has happened since the last pass.
    pub fn maybe_recalculate(&mut self) {
        if self.is_dirty() {
            self.recalculate();
        }
    }

    /// Make this list's tasks resolvable from other schedules.
    pub fn register_dependencies(&self, registry: &mut DependencyRegistry) {
        registry.register(self.name(), self.arena());
    }

    pub fn resolve_dependencies(&mut self, registry: &DependencyRegistry) {
        let arena = match self {
            EvTaskList::Data(l) => &mut l.arena,
            EvTaskList::Imported(l) => &mut l.arena,
            EvTaskList::Rollup(l) => &mut l.arena,
        };
        registry.resolve_all(arena);
    }
}

/// Restartable delay for coalescing bursts of edits into one
/// recalculation: every touch pushes the deadline out, and the timer
/// fires once when queried past it.
#[derive(Debug, Clone)]
pub struct RecalcDebouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl RecalcDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    pub fn touch(&mut self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// True exactly once after the delay has elapsed with no new touches.
    pub fn fire_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
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

    fn settings_at(effective: Timestamp) -> EvSettings {
        EvSettings { effective_date: Some(effective), ..EvSettings::default() }
    }

    fn data_list(name: &str, plan_minutes: &[f64]) -> DataTaskList {
        let mut arena = TaskArena::new(TaskNode::new(name));
        for (i, &minutes) in plan_minutes.iter().enumerate() {
            arena.add_child(arena.root(), TaskNode::new(format!("t{i}")).with_plan_time(minutes));
        }
        let schedule = TimePhasedSchedule::new(ts(0), 300.0);
        DataTaskList::new(name, arena, schedule, settings_at(ts(1)))
    }

    #[test]
    fn maybe_recalculate_runs_once_until_the_next_edit() {
        let mut list = EvTaskList::Data(data_list("alpha", &[200.0, 400.0]));
        assert!(list.is_dirty());
        list.maybe_recalculate();
        assert!(!list.is_dirty());
        assert_eq!(list.shared_schedule().expect("shared").lock().metrics.total_plan(), 600.0);

        list.mark_dirty();
        assert!(list.is_dirty());
    }

    #[test]
    fn rollup_list_recalculates_children_and_merges() {
        let mut registry = DependencyRegistry::new();
        let mut team = RollupTaskList::new("team", settings_at(ts(1)));
        assert!(team.add_child(&mut registry, EvTaskList::Data(data_list("alpha", &[600.0]))));
        assert!(team.add_child(&mut registry, EvTaskList::Data(data_list("beta", &[300.0]))));

        team.recalculate();

        let root = team.arena.root();
        assert_eq!(team.arena.node(root).plan_value, 900.0);
        assert_eq!(team.rollup.schedule.metrics.total_plan(), 900.0);
    }

    #[test]
    fn circular_membership_is_rejected() {
        let mut registry = DependencyRegistry::new();
        registry.add_membership("all", "team");
        let mut team = RollupTaskList::new("team", settings_at(ts(1)));
        let nested = RollupTaskList::new("all", settings_at(ts(1)));
        assert!(!team.add_child(&mut registry, EvTaskList::Rollup(nested)));
        assert!(team.children.is_empty());
    }

    #[test]
    fn balanced_range_needs_both_endpoint_dates() {
        let mut team = RollupTaskList::new("team", settings_at(ts(1)));
        assert_eq!(team.balanced_forecast_range(), None);

        team.rollup.rollup.earliest_forecast_date = Some(ts(2));
        team.rollup.rollup.optimized_forecast_date = Some(ts(4));
        assert_eq!(team.balanced_forecast_range(), Some((ts(2), ts(4))));

        team.rollup.rollup.is_rollup_of_rollups = true;
        assert_eq!(team.balanced_forecast_range(), None);
    }

    #[test]
    fn debouncer_restarts_on_every_touch() {
        let mut debounce = RecalcDebouncer::new(Duration::from_millis(100));
        let t0 = Instant::now();
        debounce.touch_at(t0);
        assert!(!debounce.fire_due(t0 + Duration::from_millis(50)));
        // a new edit pushes the deadline out
        debounce.touch_at(t0 + Duration::from_millis(60));
        assert!(!debounce.fire_due(t0 + Duration::from_millis(120)));
        assert!(debounce.fire_due(t0 + Duration::from_millis(200)));
        // fires only once
        assert!(!debounce.fire_due(t0 + Duration::from_millis(300)));
    }
}
