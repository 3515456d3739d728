use crate::dates::Timestamp;
use serde::{Deserialize, Serialize};

/// Level-of-effort marker for a task that earns value normally.
pub const NOT_LEVEL_OF_EFFORT: f64 = -1.0;
/// Level-of-effort marker for a task living under an explicit LOE ancestor.
pub const ANCESTOR_LEVEL_OF_EFFORT: f64 = 0.0;

/// Ordinal marker meaning "derive the position from document order".
pub const INFER_ORDINAL: i32 = 0;

/// Pruning state of one node in the work-breakdown tree.
///
/// Explicit user choices always win; `AncestorPruned` is only ever derived
/// during pruning propagation and never persisted as a user setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pruning {
    InferFromContext,
    UserPruned,
    AncestorPruned,
    UserUnpruned,
}

impl Pruning {
    pub fn as_flag(self) -> i32 {
        match self {
            Pruning::InferFromContext => 0,
            Pruning::UserPruned => -1,
            Pruning::AncestorPruned => -2,
            Pruning::UserUnpruned => 1,
        }
    }

    pub fn from_flag(flag: i32) -> Self {
        match flag {
            -1 => Pruning::UserPruned,
            -2 => Pruning::AncestorPruned,
            1 => Pruning::UserUnpruned,
            _ => Pruning::InferFromContext,
        }
    }
}

/// A reference to a task living in another named schedule, resolved lazily
/// through a [`crate::dependency::DependencyRegistry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: String,
    pub display_name: String,
    pub task_list_name: String,
    #[serde(default)]
    pub assigned_to: Vec<String>,
    #[serde(default)]
    pub percent_complete: f64,
    #[serde(default)]
    pub unresolvable: bool,
}

impl TaskDependency {
    pub fn new(
        task_id: impl Into<String>,
        display_name: impl Into<String>,
        task_list_name: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            display_name: display_name.into(),
            task_list_name: task_list_name.into(),
            assigned_to: Vec::new(),
            percent_complete: 0.0,
            unresolvable: false,
        }
    }
}

/// Stable handle into a [`TaskArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One node of the work-breakdown tree. Fields are mutated in place on
/// every recalculation pass; the node itself is never rebuilt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskNode {
    pub name: String,
    pub full_name: String,
    pub task_ids: Vec<String>,
    pub assigned_to: Vec<String>,
    pub flag: Option<String>,

    /// `None` when the user never entered a figure; distinct from zero.
    pub top_down_plan_time: Option<f64>,
    pub bottom_up_plan_time: f64,
    /// Resolved planned time: top-down when defined, else the bottom-up sum.
    pub plan_time: f64,
    pub plan_value: f64,
    pub cum_plan_value: f64,
    pub value_earned: f64,

    /// Time logged directly against this node.
    pub actual_node_time: f64,
    /// Node time plus descendants, rolled up.
    pub actual_time: f64,
    pub actual_direct_time: f64,
    /// Time logged before the schedule started.
    pub actual_pre_time: f64,
    /// Time logged against an already-completed task, within the schedule.
    pub actual_current_time: f64,

    pub plan_start_date: Option<Timestamp>,
    pub plan_date: Option<Timestamp>,
    pub actual_start_date: Option<Timestamp>,
    pub date_completed: Option<Timestamp>,
    pub forecast_start_date: Option<Timestamp>,
    pub forecast_date: Option<Timestamp>,
    pub replan_start_date: Option<Timestamp>,
    pub replan_date: Option<Timestamp>,

    pub baseline_date: Option<Timestamp>,
    pub baseline_time: f64,

    pub plan_level_of_effort: f64,
    pub rollup_level_of_effort: f64,
    pub task_ordinal: i32,
    pub pruning: Pruning,

    pub dependencies: Vec<TaskDependency>,

    pub(crate) parent: Option<TaskId>,
    pub(crate) children: Vec<TaskId>,
}

impl TaskNode {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: name.clone(),
            name,
            task_ids: Vec::new(),
            assigned_to: Vec::new(),
            flag: None,
            top_down_plan_time: None,
            bottom_up_plan_time: 0.0,
            plan_time: 0.0,
            plan_value: 0.0,
            cum_plan_value: 0.0,
            value_earned: 0.0,
            actual_node_time: 0.0,
            actual_time: 0.0,
            actual_direct_time: 0.0,
            actual_pre_time: 0.0,
            actual_current_time: 0.0,
            plan_start_date: None,
            plan_date: None,
            actual_start_date: None,
            date_completed: None,
            forecast_start_date: None,
            forecast_date: None,
            replan_start_date: None,
            replan_date: None,
            baseline_date: None,
            baseline_time: 0.0,
            plan_level_of_effort: NOT_LEVEL_OF_EFFORT,
            rollup_level_of_effort: NOT_LEVEL_OF_EFFORT,
            task_ordinal: INFER_ORDINAL,
            pruning: Pruning::InferFromContext,
            dependencies: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_plan_time(mut self, minutes: f64) -> Self {
        self.top_down_plan_time = Some(minutes);
        self
    }

    pub fn with_actual_time(mut self, minutes: f64) -> Self {
        self.actual_node_time = minutes;
        self
    }

    pub fn is_level_of_effort_task(&self) -> bool {
        self.plan_level_of_effort >= 0.0
    }

    pub fn inherits_level_of_effort(&self) -> bool {
        self.plan_level_of_effort == ANCESTOR_LEVEL_OF_EFFORT
    }

    pub fn is_user_pruned(&self) -> bool {
        matches!(self.pruning, Pruning::UserPruned | Pruning::AncestorPruned)
    }

    pub fn is_completed(&self) -> bool {
        self.date_completed.is_some()
    }
}

/// The work-breakdown tree, stored as an arena of nodes addressed by
/// stable indices. Parent links are indices, so navigation in either
/// direction is O(1) and the structure has no ownership cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskArena {
    nodes: Vec<TaskNode>,
    root: TaskId,
}

impl TaskArena {
    pub fn new(root: TaskNode) -> Self {
        Self {
            nodes: vec![root],
            root: TaskId(0),
        }
    }

    pub fn root(&self) -> TaskId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: TaskId) -> &TaskNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: TaskId) -> &mut TaskNode {
        &mut self.nodes[id.0]
    }

    pub fn parent(&self, id: TaskId) -> Option<TaskId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: TaskId) -> Vec<TaskId> {
        self.nodes[id.0].children.clone()
    }

    pub fn is_leaf(&self, id: TaskId) -> bool {
        self.nodes[id.0].children.is_empty()
    }

    /// Append `node` as the last child of `parent`, deriving its full path
    /// from the parent's.
    pub fn add_child(&mut self, parent: TaskId, mut node: TaskNode) -> TaskId {
        let id = TaskId(self.nodes.len());
        node.parent = Some(parent);
        if node.full_name == node.name {
            let parent_path = &self.nodes[parent.0].full_name;
            node.full_name = format!("{}/{}", parent_path, node.name);
        }
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Ids of every node, root first, in depth-first document order.
    pub fn ids_in_document_order(&self) -> Vec<TaskId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        self.push_subtree(self.root, &mut out);
        out
    }

    fn push_subtree(&self, id: TaskId, out: &mut Vec<TaskId>) {
        out.push(id);
        for &child in &self.nodes[id.0].children {
            self.push_subtree(child, out);
        }
    }

    /// An EV leaf is an indivisible unit of earned-value work: a true leaf,
    /// or a parent whose children's plan times collapsed to zero while the
    /// node itself carries a top-down figure.
    pub fn is_ev_leaf(&self, id: TaskId) -> bool {
        let node = &self.nodes[id.0];
        if node.children.is_empty() {
            return true;
        }
        node.bottom_up_plan_time == 0.0 && node.top_down_plan_time.unwrap_or(0.0) > 0.0
    }

    /// Find a node by one of its logical task ids.
    pub fn find_by_task_id(&self, task_id: &str) -> Option<TaskId> {
        self.ids_in_document_order()
            .into_iter()
            .find(|&id| self.nodes[id.0].task_ids.iter().any(|t| t == task_id))
    }

    pub fn find_by_full_name(&self, full_name: &str) -> Option<TaskId> {
        self.ids_in_document_order()
            .into_iter()
            .find(|&id| self.nodes[id.0].full_name == full_name)
    }
}
