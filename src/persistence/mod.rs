use crate::dates;
use crate::schedule::TimePhasedSchedule;
use serde_json::Error as SerdeJsonError;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum PersistenceError {
    Serialization(SerdeJsonError),
    Io(io::Error),
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Error),
    Csv(csv::Error),
    InvalidData(String),
    NotFound,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Serialization(err) => write!(f, "serialization error: {err}"),
            PersistenceError::Io(err) => write!(f, "io error: {err}"),
            #[cfg(feature = "sqlite")]
            PersistenceError::Sqlite(err) => write!(f, "sqlite error: {err}"),
            PersistenceError::Csv(err) => write!(f, "csv error: {err}"),
            PersistenceError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            PersistenceError::NotFound => write!(f, "no snapshot stored"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<SerdeJsonError> for PersistenceError {
    fn from(value: SerdeJsonError) -> Self {
        Self::Serialization(value)
    }
}

impl From<io::Error> for PersistenceError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<csv::Error> for PersistenceError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

pub trait SnapshotStore {
    fn save_snapshot(&self, snapshot: &file::ScheduleSnapshot) -> PersistenceResult<()>;
    fn load_snapshot(&self) -> PersistenceResult<Option<file::ScheduleSnapshot>>;
}

/// Period boundaries must be strictly increasing and every figure finite;
/// anything else corrupts the interpolation math downstream.
pub fn validate_periods(schedule: &TimePhasedSchedule) -> PersistenceResult<()> {
    let mut previous = None;
    for p in schedule.periods() {
        if let Some(prev) = previous {
            if p.end_date <= prev {
                return Err(PersistenceError::InvalidData(format!(
                    "period boundaries out of order at {}",
                    dates::format_date(Some(p.end_date))
                )));
            }
        }
        previous = Some(p.end_date);
        for value in [
            p.plan_total_time,
            p.plan_direct_time,
            p.cum_plan_direct_time,
            p.cum_plan_value,
            p.actual_direct_time,
            p.actual_indirect_time,
            p.cum_actual_direct_time,
            p.cum_earned_value,
            p.cum_actual_cost,
        ] {
            if dates::bad_double(value) {
                return Err(PersistenceError::InvalidData(format!(
                    "non-finite period figure at {}",
                    dates::format_date(Some(p.end_date))
                )));
            }
        }
    }
    Ok(())
}

pub mod file;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{
    FileSnapshotStore, ScheduleSnapshot, load_periods_from_csv, load_snapshot_from_json,
    save_periods_to_csv, save_snapshot_to_json,
};
