pub mod calculator;
pub mod confidence;
pub mod dates;
pub mod dependency;
pub mod forecast;
pub mod metrics;
pub mod persistence;
pub mod rollup;
pub mod schedule;
pub mod settings;
pub mod simulate;
pub mod task;
pub mod tasklist;

pub use calculator::data::{DataRecalculation, TimeLogEntry};
pub use calculator::imported::ImportedRecalculation;
pub use calculator::leaves::LeavesOnlyRecalculation;
pub use calculator::rollup::RollupRecalculation;
pub use calculator::{Baseline, BaselineEntry, ForecastMethod};
pub use confidence::ConfidenceInterval;
pub use dates::Timestamp;
pub use dependency::DependencyRegistry;
pub use metrics::PerformanceMetrics;
#[cfg(feature = "sqlite")]
pub use persistence::sqlite::SqliteSnapshotStore;
pub use persistence::{
    FileSnapshotStore, PersistenceError, ScheduleSnapshot, SnapshotStore, load_periods_from_csv,
    load_snapshot_from_json, save_periods_to_csv, save_snapshot_to_json, validate_periods,
};
pub use rollup::{RollupChild, RollupMetrics, ScheduleRollup};
pub use schedule::{Period, SharedSchedule, SplitSchedule, TimePhasedSchedule};
pub use settings::EvSettings;
pub use task::{Pruning, TaskArena, TaskDependency, TaskId, TaskNode};
pub use tasklist::{
    DataTaskList, EvTaskList, ImportedTaskList, RecalcDebouncer, RollupTaskList,
};
