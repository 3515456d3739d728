use super::file::ScheduleSnapshot;
use super::{PersistenceResult, SnapshotStore};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

/// Snapshot storage keyed by task-list name, one row per list. Rows hold
/// the snapshot as JSON; only the name is queryable.
pub struct SqliteSnapshotStore {
    connection: Mutex<Connection>,
    list_name: String,
}

impl SqliteSnapshotStore {
    pub fn new<P: AsRef<std::path::Path>>(
        path: P,
        list_name: impl Into<String>,
    ) -> PersistenceResult<Self> {
        let connection = Connection::open(path)?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            list_name: list_name.into(),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            CREATE TABLE IF NOT EXISTS snapshots (
                name TEXT PRIMARY KEY,
                snapshot_json TEXT NOT NULL
            );
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    /// Names of every stored task list, for pickers.
    pub fn list_names(&self) -> PersistenceResult<Vec<String>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare("SELECT name FROM snapshots ORDER BY name ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for name in rows {
            names.push(name?);
        }
        Ok(names)
    }

    pub fn delete(&self) -> PersistenceResult<()> {
        let conn = self.connection.lock();
        conn.execute("DELETE FROM snapshots WHERE name = ?1", params![self.list_name])?;
        Ok(())
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn save_snapshot(&self, snapshot: &ScheduleSnapshot) -> PersistenceResult<()> {
        let json = serde_json::to_string(snapshot)?;
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO snapshots (name, snapshot_json) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET snapshot_json = excluded.snapshot_json",
            params![self.list_name, json],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn load_snapshot(&self) -> PersistenceResult<Option<ScheduleSnapshot>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare("SELECT snapshot_json FROM snapshots WHERE name = ?1")?;
        let json: Option<String> = stmt
            .query_row(params![self.list_name], |row| row.get(0))
            .optional()?;
        let Some(json) = json else {
            return Ok(None);
        };
        let snapshot: ScheduleSnapshot = serde_json::from_str(&json)?;
        Ok(Some(snapshot))
    }
}
