use super::{PersistenceError, PersistenceResult};
use crate::dates::{self, Timestamp};
use crate::schedule::{Period, TimePhasedSchedule};
use crate::settings::EvSettings;
use crate::task::{NOT_LEVEL_OF_EFFORT, Pruning, TaskArena, TaskDependency, TaskId, TaskNode};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Saved state of one task list: the task tree as the user entered it
/// plus the period ledger. Everything derived (values, metrics,
/// confidence intervals) is recomputed on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub name: String,
    #[serde(default)]
    pub settings: EvSettings,
    pub root: TaskSnapshot,
    pub periods: Vec<PeriodRecord>,
    #[serde(default)]
    pub effective_date: String,
    #[serde(default)]
    pub level_of_effort: f64,
}

/// One task, keyed with the short vocabulary the export format uses:
/// `pt` planned time, `at` actual time, `pd`/`cd` planned and completed
/// dates, `fd`/`rd` saved forecast and replan dates, `loe` level of
/// effort, `ord` ordinal, `prune` pruning flag, `tid` task ids, `who`
/// assignees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pt: Option<f64>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub at: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rd: String,
    #[serde(default = "not_loe", skip_serializing_if = "is_not_loe")]
    pub loe: f64,
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub ord: i32,
    #[serde(default, skip_serializing_if = "is_zero_i32")]
    pub prune: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub who: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<DependencySnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencySnapshot {
    pub tid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub list: String,
}

/// One period row of the ledger. Cumulative plan and actual direct time
/// are carried for readability but rebuilt from the per-period columns
/// on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub end: String,
    pub pt: f64,
    pub dt: f64,
    pub cpt: f64,
    pub cpv: f64,
    pub at: f64,
    pub ait: f64,
    pub cat: f64,
    pub cev: f64,
    pub cac: f64,
    pub auto: bool,
}

impl ScheduleSnapshot {
    pub fn capture(
        name: impl Into<String>,
        arena: &TaskArena,
        schedule: &TimePhasedSchedule,
        settings: &EvSettings,
    ) -> Self {
        Self {
            name: name.into(),
            settings: settings.clone(),
            root: snapshot_subtree(arena, arena.root()),
            periods: schedule.periods().iter().map(PeriodRecord::from).collect(),
            effective_date: dates::format_date(schedule.effective_date()),
            level_of_effort: schedule.level_of_effort(),
        }
    }

    pub fn restore(&self) -> PersistenceResult<(TaskArena, TimePhasedSchedule, EvSettings)> {
        let mut arena = TaskArena::new(self.root.to_node()?);
        let root = arena.root();
        for child in &self.root.children {
            restore_subtree(&mut arena, root, child)?;
        }

        let mut periods = Vec::with_capacity(self.periods.len());
        for record in &self.periods {
            periods.push(record.to_period()?);
        }
        let mut schedule = TimePhasedSchedule::from_periods(periods);
        super::validate_periods(&schedule)?;
        schedule.set_level_of_effort(self.level_of_effort);
        if let Some(effective) = parse_date_field(&self.effective_date)? {
            schedule.set_effective_date(effective);
        }
        Ok((arena, schedule, self.settings.clone().sanitized()))
    }
}

impl TaskSnapshot {
    fn from_node(node: &TaskNode) -> Self {
        Self {
            name: node.name.clone(),
            pt: node.top_down_plan_time,
            at: node.actual_node_time,
            pd: dates::format_date(node.plan_date),
            cd: dates::format_date(node.date_completed),
            fd: dates::format_date(node.forecast_date),
            rd: dates::format_date(node.replan_date),
            loe: node.plan_level_of_effort,
            ord: node.task_ordinal,
            prune: node.pruning.as_flag(),
            tid: node.task_ids.join(","),
            who: node.assigned_to.join(","),
            flag: node.flag.clone(),
            dependencies: node
                .dependencies
                .iter()
                .map(|d| DependencySnapshot {
                    tid: d.task_id.clone(),
                    name: d.display_name.clone(),
                    list: d.task_list_name.clone(),
                })
                .collect(),
            children: Vec::new(),
        }
    }

    fn to_node(&self) -> PersistenceResult<TaskNode> {
        let mut node = TaskNode::new(self.name.clone());
        node.top_down_plan_time = self.pt;
        node.actual_node_time = self.at;
        node.plan_date = parse_date_field(&self.pd)?;
        node.date_completed = parse_date_field(&self.cd)?;
        node.forecast_date = parse_date_field(&self.fd)?;
        node.replan_date = parse_date_field(&self.rd)?;
        node.plan_level_of_effort = self.loe;
        node.task_ordinal = self.ord;
        node.pruning = Pruning::from_flag(self.prune);
        node.task_ids = split_list(&self.tid);
        node.assigned_to = split_list(&self.who);
        node.flag = self.flag.clone();
        node.dependencies = self
            .dependencies
            .iter()
            .map(|d| TaskDependency::new(d.tid.clone(), d.name.clone(), d.list.clone()))
            .collect();
        Ok(node)
    }
}

fn snapshot_subtree(arena: &TaskArena, id: TaskId) -> TaskSnapshot {
    let mut snapshot = TaskSnapshot::from_node(arena.node(id));
    snapshot.children = arena
        .children(id)
        .into_iter()
        .map(|child| snapshot_subtree(arena, child))
        .collect();
    snapshot
}

fn restore_subtree(
    arena: &mut TaskArena,
    parent: TaskId,
    snapshot: &TaskSnapshot,
) -> PersistenceResult<()> {
    let id = arena.add_child(parent, snapshot.to_node()?);
    for child in &snapshot.children {
        restore_subtree(arena, id, child)?;
    }
    Ok(())
}

impl From<&Period> for PeriodRecord {
    fn from(p: &Period) -> Self {
        Self {
            end: dates::format_date(Some(p.end_date)),
            pt: p.plan_total_time,
            dt: p.plan_direct_time,
            cpt: p.cum_plan_direct_time,
            cpv: p.cum_plan_value,
            at: p.actual_direct_time,
            ait: p.actual_indirect_time,
            cat: p.cum_actual_direct_time,
            cev: p.cum_earned_value,
            cac: p.cum_actual_cost,
            auto: p.automatic,
        }
    }
}

impl PeriodRecord {
    fn to_period(&self) -> PersistenceResult<Period> {
        let end = parse_date_field(&self.end)?.ok_or_else(|| {
            PersistenceError::InvalidData("period row without an end date".into())
        })?;
        let mut period = Period::new(end, 0.0);
        period.plan_total_time = self.pt;
        period.plan_direct_time = self.dt;
        period.cum_plan_direct_time = self.cpt;
        period.cum_plan_value = self.cpv;
        period.actual_direct_time = self.at;
        period.actual_indirect_time = self.ait;
        period.cum_actual_direct_time = self.cat;
        period.cum_earned_value = self.cev;
        period.cum_actual_cost = self.cac;
        period.automatic = self.auto;
        Ok(period)
    }
}

/// JSON-file-backed snapshot storage, one file per task list.
pub struct FileSnapshotStore {
    path: std::path::PathBuf,
}

impl FileSnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl super::SnapshotStore for FileSnapshotStore {
    fn save_snapshot(&self, snapshot: &ScheduleSnapshot) -> PersistenceResult<()> {
        save_snapshot_to_json(snapshot, &self.path)
    }

    fn load_snapshot(&self) -> PersistenceResult<Option<ScheduleSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        load_snapshot_from_json(&self.path).map(Some)
    }
}

pub fn save_snapshot_to_json<P: AsRef<Path>>(
    snapshot: &ScheduleSnapshot,
    path: P,
) -> PersistenceResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, snapshot)?;
    Ok(())
}

pub fn load_snapshot_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<ScheduleSnapshot> {
    let file = File::open(path)?;
    let snapshot: ScheduleSnapshot = serde_json::from_reader(file)?;
    Ok(snapshot)
}

pub fn save_periods_to_csv<P: AsRef<Path>>(
    schedule: &TimePhasedSchedule,
    path: P,
) -> PersistenceResult<()> {
    super::validate_periods(schedule)?;
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for period in schedule.periods() {
        writer.serialize(PeriodRecord::from(period))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_periods_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<TimePhasedSchedule> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut periods = Vec::new();
    for record in reader.deserialize::<PeriodRecord>() {
        periods.push(record?.to_period()?);
    }
    if periods.is_empty() {
        return Err(PersistenceError::InvalidData(
            "CSV file contained no periods".into(),
        ));
    }
    let schedule = TimePhasedSchedule::from_periods(periods);
    super::validate_periods(&schedule)?;
    Ok(schedule)
}

fn parse_date_field(input: &str) -> PersistenceResult<Option<Timestamp>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    dates::parse_date(input.trim())
        .map(Some)
        .ok_or_else(|| PersistenceError::InvalidData(format!("invalid date '{input}'")))
}

fn split_list(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    input.split(',').map(|s| s.trim().to_string()).collect()
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

fn is_zero_i32(value: &i32) -> bool {
    *value == 0
}

fn not_loe() -> f64 {
    NOT_LEVEL_OF_EFFORT
}

fn is_not_loe(value: &f64) -> bool {
    *value == NOT_LEVEL_OF_EFFORT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::WEEK_MILLIS;

    fn ts(weeks: i64) -> Timestamp {
        Timestamp::from_millis(1_500_000_000_000 + weeks * WEEK_MILLIS)
    }

    fn sample_snapshot() -> ScheduleSnapshot {
        let mut arena = TaskArena::new(TaskNode::new("project"));
        let phase = arena.add_child(arena.root(), TaskNode::new("phase"));
        let a = arena.add_child(phase, TaskNode::new("a").with_plan_time(300.0));
        arena.node_mut(a).date_completed = Some(ts(1));
        arena.node_mut(a).task_ids = vec!["T1".into(), "T2".into()];
        arena.node_mut(a).assigned_to = vec!["pat".into()];
        arena.node_mut(a).pruning = Pruning::UserUnpruned;
        let b = arena.add_child(phase, TaskNode::new("b").with_plan_time(300.0));
        arena.node_mut(b).dependencies =
            vec![TaskDependency::new("X9", "other/task", "Team B")];

        let mut schedule = TimePhasedSchedule::new(ts(0), 600.0);
        schedule.add_row();
        schedule.set_effective_date(ts(1));
        ScheduleSnapshot::capture("project", &arena, &schedule, &EvSettings::default())
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("project.json");
        let snapshot = sample_snapshot();
        save_snapshot_to_json(&snapshot, &path).expect("save");
        let loaded = load_snapshot_from_json(&path).expect("load");

        let (arena, schedule, _) = loaded.restore().expect("restore");
        let a = arena.find_by_full_name("project/phase/a").expect("task a");
        assert_eq!(arena.node(a).top_down_plan_time, Some(300.0));
        assert_eq!(arena.node(a).date_completed, Some(ts(1)));
        assert_eq!(arena.node(a).task_ids, vec!["T1".to_string(), "T2".to_string()]);
        assert_eq!(arena.node(a).pruning, Pruning::UserUnpruned);

        let b = arena.find_by_full_name("project/phase/b").expect("task b");
        assert_eq!(arena.node(b).dependencies[0].task_id, "X9");
        assert_eq!(arena.node(b).dependencies[0].task_list_name, "Team B");

        assert_eq!(schedule.start_date(), ts(0));
        assert_eq!(schedule.effective_date(), Some(ts(1)));
        assert_eq!(schedule.len(), 3);
    }

    #[test]
    fn period_ledger_round_trips_through_csv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("periods.csv");
        let mut schedule = TimePhasedSchedule::new(ts(0), 600.0);
        schedule.add_row();
        schedule.save_actual_time(ts(0).plus_millis(1), 150.0);

        save_periods_to_csv(&schedule, &path).expect("save");
        let loaded = load_periods_from_csv(&path).expect("load");

        assert_eq!(loaded.len(), schedule.len());
        assert_eq!(loaded.start_date(), ts(0));
        assert_eq!(loaded.last().cum_plan_direct_time, 1200.0);
        assert_eq!(loaded.get(1).actual_direct_time, 150.0);
    }

    #[test]
    fn out_of_order_periods_are_rejected() {
        let records = vec![
            Period::new(ts(1), 600.0),
            Period::new(ts(0), 0.0),
            Period::new(ts(2), 600.0),
        ];
        let schedule = TimePhasedSchedule::from_periods(records);
        assert!(matches!(
            super::super::validate_periods(&schedule),
            Err(PersistenceError::InvalidData(_))
        ));
    }

    #[test]
    fn malformed_dates_surface_as_invalid_data() {
        let mut snapshot = sample_snapshot();
        snapshot.root.cd = "not-a-date".into();
        assert!(matches!(
            snapshot.restore(),
            Err(PersistenceError::InvalidData(_))
        ));
    }

    #[test]
    fn sparse_task_fields_default_on_deserialize() {
        let json = r#"{
            "name": "tiny",
            "root": { "name": "tiny", "children": [ { "name": "t", "pt": 60.0 } ] },
            "periods": [
                { "end": "@1500000000000", "pt": 0.0, "dt": 0.0, "cpt": 0.0, "cpv": 0.0,
                  "at": 0.0, "ait": 0.0, "cat": 0.0, "cev": 0.0, "cac": 0.0, "auto": false },
                { "end": "@1500604800000", "pt": 600.0, "dt": 600.0, "cpt": 600.0, "cpv": 0.0,
                  "at": 0.0, "ait": 0.0, "cat": 0.0, "cev": 0.0, "cac": 0.0, "auto": false }
            ]
        }"#;
        let snapshot: ScheduleSnapshot = serde_json::from_str(json).expect("parse");
        let (arena, schedule, settings) = snapshot.restore().expect("restore");
        let t = arena.find_by_full_name("tiny/t").expect("task");
        assert_eq!(arena.node(t).plan_level_of_effort, NOT_LEVEL_OF_EFFORT);
        assert_eq!(arena.node(t).pruning, Pruning::InferFromContext);
        assert_eq!(schedule.effective_date(), None);
        assert_eq!(settings, EvSettings::default());
    }
}
