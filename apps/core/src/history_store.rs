use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::save::{SaveError, Saver};

pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub query: String,
    pub recorded_at: i64,
}

pub fn open(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(db: &Connection) -> Result<(), rusqlite::Error> {
    db.execute(
        "CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query TEXT NOT NULL,
            recorded_at INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

pub fn append(db: &Connection, entry: &HistoryEntry) -> Result<(), StoreError> {
    db.execute(
        "INSERT INTO history (query, recorded_at) VALUES (?1, ?2)",
        params![entry.query, entry.recorded_at],
    )?;
    Ok(())
}

pub fn replace_all(db: &Connection, entries: &[HistoryEntry]) -> Result<(), StoreError> {
    let tx = db.unchecked_transaction()?;
    tx.execute("DELETE FROM history", [])?;
    for entry in entries {
        tx.execute(
            "INSERT INTO history (query, recorded_at) VALUES (?1, ?2)",
            params![entry.query, entry.recorded_at],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn list_recent(db: &Connection, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
    let mut stmt = db.prepare(
        "SELECT query, recorded_at FROM history ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(HistoryEntry {
            query: row.get(0)?,
            recorded_at: row.get(1)?,
        })
    })?;
    let mut entries = rows.collect::<Result<Vec<_>, _>>()?;
    entries.reverse();
    Ok(entries)
}

#[derive(Debug, Clone)]
pub struct QueryHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for QueryHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl QueryHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    pub fn from_entries(entries: Vec<HistoryEntry>, capacity: usize) -> Self {
        let mut history = Self::with_capacity(capacity);
        for entry in entries {
            history.push_entry(entry);
        }
        history
    }

    pub fn record(&mut self, query: &str) {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return;
        }
        if self.entries.back().is_some_and(|last| last.query == trimmed) {
            return;
        }
        self.push_entry(HistoryEntry {
            query: trimmed.to_string(),
            recorded_at: now_secs(),
        });
    }

    fn push_entry(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub type SharedHistory = Arc<Mutex<QueryHistory>>;

pub fn load_shared(path: &Path, capacity: usize) -> Result<SharedHistory, StoreError> {
    let db = open(path)?;
    let entries = list_recent(&db, capacity)?;
    Ok(Arc::new(Mutex::new(QueryHistory::from_entries(entries, capacity))))
}

pub struct HistorySaver {
    history: SharedHistory,
    db_path: PathBuf,
}

impl HistorySaver {
    pub fn new(history: SharedHistory, db_path: PathBuf) -> Self {
        Self { history, db_path }
    }
}

impl Saver for HistorySaver {
    fn save(&self) -> Result<(), SaveError> {
        let entries = self.history.lock().entries();
        let db = open(&self.db_path)?;
        replace_all(&db, &entries)?;
        Ok(())
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::QueryHistory;

    #[test]
    fn record_skips_consecutive_duplicates_and_blank_text() {
        let mut history = QueryHistory::with_capacity(10);
        history.record("calc 1+1");
        history.record("calc 1+1");
        history.record("   ");
        history.record("gh rust");
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().map(|e| e.query.as_str()), Some("gh rust"));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut history = QueryHistory::with_capacity(2);
        history.record("a");
        history.record("b");
        history.record("c");
        let queries: Vec<String> = history.entries().into_iter().map(|e| e.query).collect();
        assert_eq!(queries, ["b", "c"]);
    }
}
