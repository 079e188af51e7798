use crate::{HistoryStore, LifecycleEvent};
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use whowas_core::records::{Category, Change, Departure};

/// SQLite-backed history store. One connection guarded by a mutex; every
/// bulk write runs in its own transaction so a batch lands entirely or not
/// at all.
pub struct SqliteHistoryStore {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {parent:?}"))?;
        }

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database: {db_path:?}"))?;
        Self::init_db(&conn)?;

        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_db(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "cache_size", -4000)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS names (
                ref INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL,
                name TEXT NOT NULL,
                first_seen TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_names_uid ON names(uid, first_seen);
            CREATE TABLE IF NOT EXISTS tags (
                ref INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL,
                tag TEXT NOT NULL,
                first_seen TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tags_uid ON tags(uid, first_seen);
            CREATE TABLE IF NOT EXISTS nicks (
                ref INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL,
                sid INTEGER NOT NULL,
                nick TEXT,
                first_seen TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_nicks_uid_sid ON nicks(uid, sid, first_seen);
            CREATE TABLE IF NOT EXISTS statuses (
                ref INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL,
                status TEXT NOT NULL,
                first_seen TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_statuses_uid ON statuses(uid, first_seen);
            CREATE TABLE IF NOT EXISTS departures (
                ref INTEGER PRIMARY KEY,
                uid INTEGER NOT NULL,
                at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS lifecycle_log (
                ref INTEGER PRIMARY KEY,
                event TEXT NOT NULL,
                at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn count_rows(&self, category: Category) -> Result<u64> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", category.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn departure_count(&self) -> Result<u64> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM departures", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Value/timestamp history for one member, oldest first. For `nicks` the
    /// rows of every space are interleaved; tests and the status command only
    /// need the flat view.
    pub fn fetch_values(
        &self,
        category: Category,
        uid: i64,
    ) -> Result<Vec<(Option<String>, DateTime<Utc>)>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, first_seen FROM {} WHERE uid = ?1 ORDER BY first_seen ASC, ref ASC",
            category.value_column(),
            category.table()
        ))?;
        let mut rows = stmt.query([uid])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let value: Option<String> = row.get(0)?;
            let seen: String = row.get(1)?;
            let seen = DateTime::parse_from_rfc3339(&seen)
                .map(|dt| dt.with_timezone(&Utc))
                .context("Invalid first_seen in DB")?;
            out.push((value, seen));
        }
        Ok(out)
    }

    pub fn lifecycle_events(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn.prepare("SELECT event, at FROM lifecycle_log ORDER BY ref ASC")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let event: String = row.get(0)?;
            let at: String = row.get(1)?;
            let at = DateTime::parse_from_rfc3339(&at)
                .map(|dt| dt.with_timezone(&Utc))
                .context("Invalid timestamp in lifecycle_log")?;
            out.push((event, at));
        }
        Ok(out)
    }
}

impl HistoryStore for SqliteHistoryStore {
    fn insert_changes(&self, category: Category, rows: &[Change]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let tx = conn.transaction()?;
        {
            match category {
                Category::Names => {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO names (uid, name, first_seen) VALUES (?1, ?2, ?3)",
                    )?;
                    for row in rows {
                        let Change::Name {
                            uid,
                            name,
                            first_seen,
                        } = row
                        else {
                            bail!("{} row handed to the names batch", row.category());
                        };
                        stmt.execute(params![uid, name, first_seen.to_rfc3339()])?;
                    }
                }
                Category::Tags => {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO tags (uid, tag, first_seen) VALUES (?1, ?2, ?3)",
                    )?;
                    for row in rows {
                        let Change::Tag {
                            uid,
                            tag,
                            first_seen,
                        } = row
                        else {
                            bail!("{} row handed to the tags batch", row.category());
                        };
                        stmt.execute(params![uid, tag, first_seen.to_rfc3339()])?;
                    }
                }
                Category::Nicks => {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO nicks (uid, sid, nick, first_seen) VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for row in rows {
                        let Change::Nick {
                            uid,
                            sid,
                            nick,
                            first_seen,
                        } = row
                        else {
                            bail!("{} row handed to the nicks batch", row.category());
                        };
                        stmt.execute(params![uid, sid, nick, first_seen.to_rfc3339()])?;
                    }
                }
                Category::Statuses => {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO statuses (uid, status, first_seen) VALUES (?1, ?2, ?3)",
                    )?;
                    for row in rows {
                        let Change::Status {
                            uid,
                            status,
                            first_seen,
                        } = row
                        else {
                            bail!("{} row handed to the statuses batch", row.category());
                        };
                        stmt.execute(params![uid, status.as_str(), first_seen.to_rfc3339()])?;
                    }
                }
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to commit {category} batch"))?;
        Ok(rows.len())
    }

    fn insert_departures(&self, rows: &[Departure]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT INTO departures (uid, at) VALUES (?1, ?2)")?;
            for row in rows {
                stmt.execute(params![row.uid, row.at.to_rfc3339()])?;
            }
        }
        tx.commit().context("Failed to commit departures batch")?;
        Ok(rows.len())
    }

    fn compact(&self, category: Category) -> Result<usize> {
        let table = category.table();
        let value = category.value_column();
        let keys = category.key_columns().join(", ");

        // Walk each dedup key oldest-to-newest and drop every row whose value
        // is repeated by the chronologically next row. `ref` breaks timestamp
        // ties, `IS` treats a cleared value as equal to a cleared value, and
        // the newest row of a key has no next row so it always survives.
        let sql = format!(
            "DELETE FROM {table}
             WHERE ref IN (
                 SELECT ref FROM (
                     SELECT ref,
                            {value} AS value,
                            LEAD({value}) OVER w AS next_value,
                            LEAD(ref) OVER w AS next_ref
                     FROM {table}
                     WINDOW w AS (PARTITION BY {keys} ORDER BY first_seen ASC, ref ASC)
                 )
                 WHERE next_ref IS NOT NULL AND value IS next_value
             )"
        );

        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let pruned = conn
            .execute(&sql, [])
            .with_context(|| format!("Failed to compact {table}"))?;
        Ok(pruned)
    }

    fn record_lifecycle(&self, event: LifecycleEvent, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute(
            "INSERT INTO lifecycle_log (event, at) VALUES (?1, ?2)",
            params![event.as_str(), at.to_rfc3339()],
        )
        .context("Failed to record lifecycle event")?;
        Ok(())
    }
}
