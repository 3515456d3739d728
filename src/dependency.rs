//! Cross-schedule task dependencies.
//!
//! A task may reference tasks living in other named schedules. References
//! are resolved through an explicit [`DependencyRegistry`] that callers
//! populate from the schedules they have open; there is no global lookup.
//! The registry also tracks rollup membership so that adding a schedule
//! to a rollup cannot create a membership cycle.

use crate::task::{TaskArena, TaskDependency};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone)]
struct TaskEntry {
    display_name: String,
    assigned_to: Vec<String>,
    percent_complete: f64,
}

#[derive(Debug)]
struct RegisteredList {
    tasks: HashMap<String, TaskEntry>,
    registered_at: Instant,
}

/// Lookup table over every opened schedule, keyed by task-list name and
/// logical task id. Entries are snapshots taken at registration time;
/// callers re-register after a recalculation to refresh them.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    lists: HashMap<String, RegisteredList>,
    membership: DiGraph<String, ()>,
    member_index: HashMap<String, NodeIndex>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the resolvable tasks of `arena` under `list_name`,
    /// replacing any previous registration.
    pub fn register(&mut self, list_name: impl Into<String>, arena: &TaskArena) {
        let mut tasks = HashMap::new();
        for id in arena.ids_in_document_order() {
            let node = arena.node(id);
            let percent = if node.plan_value > 0.0 {
                node.value_earned / node.plan_value
            } else if node.is_completed() {
                1.0
            } else {
                0.0
            };
            for tid in &node.task_ids {
                tasks.insert(
                    tid.clone(),
                    TaskEntry {
                        display_name: node.full_name.clone(),
                        assigned_to: node.assigned_to.clone(),
                        percent_complete: percent,
                    },
                );
            }
        }
        self.lists.insert(
            list_name.into(),
            RegisteredList { tasks, registered_at: Instant::now() },
        );
    }

    pub fn unregister(&mut self, list_name: &str) {
        self.lists.remove(list_name);
    }

    /// Drop registrations older than `ttl`; the next resolution against a
    /// dropped list reports the dependency unresolvable until the caller
    /// re-registers.
    pub fn purge_older_than(&mut self, ttl: Duration) {
        let now = Instant::now();
        self.lists
            .retain(|_, list| now.duration_since(list.registered_at) <= ttl);
    }

    /// Fill in the resolved fields of one dependency reference. Scans the
    /// named list first, then every registered list, so a task moved to
    /// another schedule still resolves.
    pub fn resolve(&self, dep: &mut TaskDependency) {
        let entry = self
            .lists
            .get(&dep.task_list_name)
            .and_then(|l| l.tasks.get(&dep.task_id))
            .or_else(|| {
                self.lists
                    .values()
                    .find_map(|l| l.tasks.get(&dep.task_id))
            });
        match entry {
            Some(e) => {
                dep.unresolvable = false;
                dep.display_name = e.display_name.clone();
                dep.assigned_to = e.assigned_to.clone();
                dep.percent_complete = e.percent_complete;
            }
            None => {
                trace!(task_id = %dep.task_id, "unresolvable dependency");
                dep.unresolvable = true;
                dep.assigned_to.clear();
                dep.percent_complete = 0.0;
            }
        }
    }

    /// Resolve every dependency reference in the tree.
    pub fn resolve_all(&self, arena: &mut TaskArena) {
        for id in arena.ids_in_document_order() {
            for dep in &mut arena.node_mut(id).dependencies {
                self.resolve(dep);
            }
        }
    }

    // ---- rollup membership ---------------------------------------------

    fn member_node(&mut self, name: &str) -> NodeIndex {
        match self.member_index.get(name) {
            Some(&ix) => ix,
            None => {
                let ix = self.membership.add_node(name.to_string());
                self.member_index.insert(name.to_string(), ix);
                ix
            }
        }
    }

    /// Would adding `child` to `rollup` make some rollup (transitively)
    /// contain itself?
    pub fn would_create_cycle(&mut self, rollup: &str, child: &str) -> bool {
        if rollup == child {
            return true;
        }
        let r = self.member_node(rollup);
        let c = self.member_node(child);
        has_path_connecting(&self.membership, c, r, None)
    }

    /// Record that `rollup` includes `child`. Refused (returning false)
    /// when it would create a membership cycle.
    pub fn add_membership(&mut self, rollup: &str, child: &str) -> bool {
        if self.would_create_cycle(rollup, child) {
            return false;
        }
        let r = self.member_node(rollup);
        let c = self.member_node(child);
        self.membership.update_edge(r, c, ());
        true
    }
}
