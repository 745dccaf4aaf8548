//! SQLite-backed torrent session.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, params_from_iter, Connection, ErrorCode};
use tracing::debug;

use super::{StorageError, Torrent, TorrentQuery, TorrentSession, TorrentWriter};

/// Upper bound on bind parameters in a single `IN (...)` statement.
const MAX_BIND_PARAMS: usize = 900;

const SELECT_TORRENT: &str = r#"
    SELECT id, name, url, homepage, rss_id, bangumi_id, qb_hash, downloaded
    FROM torrent
"#;

/// SQLite-backed torrent session.
pub struct SqliteSession {
    conn: Mutex<Connection>,
}

impl SqliteSession {
    /// Open a session on the given file, creating the database and table if needed.
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(storage_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a session on an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(storage_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS torrent (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                homepage TEXT,
                rss_id INTEGER,
                bangumi_id INTEGER,
                qb_hash TEXT UNIQUE,
                downloaded INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_torrent_rss_id ON torrent(rss_id);
            CREATE INDEX IF NOT EXISTS idx_torrent_bangumi_id ON torrent(bangumi_id);
            "#,
        )
        .map_err(storage_error)?;

        debug!("Torrent schema ready");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection lock poisoned".to_string()))
    }

    fn row_to_torrent(row: &rusqlite::Row) -> rusqlite::Result<Torrent> {
        Ok(Torrent {
            id: row.get(0)?,
            name: row.get(1)?,
            url: row.get(2)?,
            homepage: row.get(3)?,
            rss_id: row.get(4)?,
            bangumi_id: row.get(5)?,
            qb_hash: row.get(6)?,
            downloaded: row.get(7)?,
        })
    }

    fn query_torrents<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<Torrent>, StorageError> {
        let mut stmt = conn.prepare(sql).map_err(storage_error)?;
        let rows = stmt
            .query_map(params, Self::row_to_torrent)
            .map_err(storage_error)?;

        let mut torrents = Vec::new();
        for row in rows {
            torrents.push(row.map_err(storage_error)?);
        }
        Ok(torrents)
    }
}

impl TorrentSession for SqliteSession {
    fn select(&self, query: &TorrentQuery) -> Result<Vec<Torrent>, StorageError> {
        let conn = self.lock()?;

        match query {
            TorrentQuery::All => Self::query_torrents(
                &conn,
                &format!("{} ORDER BY id", SELECT_TORRENT),
                params![],
            ),
            TorrentQuery::ById(id) => Self::query_torrents(
                &conn,
                &format!("{} WHERE id = ?1", SELECT_TORRENT),
                params![id],
            ),
            TorrentQuery::ByRssId(rss_id) => Self::query_torrents(
                &conn,
                &format!("{} WHERE rss_id = ?1 ORDER BY id", SELECT_TORRENT),
                params![rss_id],
            ),
            TorrentQuery::ByBangumiId(bangumi_id) => Self::query_torrents(
                &conn,
                &format!("{} WHERE bangumi_id = ?1 ORDER BY id", SELECT_TORRENT),
                params![bangumi_id],
            ),
            TorrentQuery::ByUrl(url) => Self::query_torrents(
                &conn,
                &format!("{} WHERE url = ?1", SELECT_TORRENT),
                params![url],
            ),
            TorrentQuery::ByQbHash(hash) => Self::query_torrents(
                &conn,
                &format!("{} WHERE qb_hash = ?1", SELECT_TORRENT),
                params![hash],
            ),
            TorrentQuery::ByQbHashes(hashes) => {
                let mut torrents = Vec::new();
                for chunk in hashes.chunks(MAX_BIND_PARAMS) {
                    let sql = format!(
                        "{} WHERE qb_hash IN ({})",
                        SELECT_TORRENT,
                        placeholders(chunk.len())
                    );
                    torrents.extend(Self::query_torrents(
                        &conn,
                        &sql,
                        params_from_iter(chunk.iter()),
                    )?);
                }
                // Chunks are queried separately, and a repeated input hash can match twice.
                torrents.sort_by_key(|t| t.id);
                torrents.dedup_by_key(|t| t.id);
                Ok(torrents)
            }
        }
    }

    fn existing_urls(&self, urls: &[String]) -> Result<HashSet<String>, StorageError> {
        let conn = self.lock()?;
        let mut existing = HashSet::new();

        for chunk in urls.chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "SELECT url FROM torrent WHERE url IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql).map_err(storage_error)?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))
                .map_err(storage_error)?;

            for row in rows {
                existing.insert(row.map_err(storage_error)?);
            }
        }

        Ok(existing)
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn TorrentWriter) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage_error)?;

        // Returning early drops `tx`, which rolls it back.
        work(&mut SqliteWriter { conn: &*tx })?;

        tx.commit().map_err(storage_error)
    }
}

/// Writer bound to an open transaction.
struct SqliteWriter<'a> {
    conn: &'a Connection,
}

impl TorrentWriter for SqliteWriter<'_> {
    fn insert(&mut self, torrent: &Torrent) -> Result<i64, StorageError> {
        self.conn
            .execute(
                "INSERT INTO torrent (id, name, url, homepage, rss_id, bangumi_id, qb_hash, downloaded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    torrent.id,
                    torrent.name,
                    torrent.url,
                    torrent.homepage,
                    torrent.rss_id,
                    torrent.bangumi_id,
                    torrent.qb_hash,
                    torrent.downloaded,
                ],
            )
            .map_err(storage_error)?;

        Ok(self.conn.last_insert_rowid())
    }

    fn upsert(&mut self, torrent: &Torrent) -> Result<i64, StorageError> {
        let Some(id) = torrent.id else {
            return self.insert(torrent);
        };

        self.conn
            .execute(
                "INSERT INTO torrent (id, name, url, homepage, rss_id, bangumi_id, qb_hash, downloaded)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    url = excluded.url,
                    homepage = excluded.homepage,
                    rss_id = excluded.rss_id,
                    bangumi_id = excluded.bangumi_id,
                    qb_hash = excluded.qb_hash,
                    downloaded = excluded.downloaded",
                params![
                    id,
                    torrent.name,
                    torrent.url,
                    torrent.homepage,
                    torrent.rss_id,
                    torrent.bangumi_id,
                    torrent.qb_hash,
                    torrent.downloaded,
                ],
            )
            .map_err(storage_error)?;

        Ok(id)
    }

    fn delete(&mut self, id: i64) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM torrent WHERE id = ?1", params![id])
            .map_err(storage_error)?;
        Ok(())
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn storage_error(e: rusqlite::Error) -> StorageError {
    match e.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StorageError::ConstraintViolation(e.to_string()),
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase,
        ) => StorageError::Unavailable(e.to_string()),
        _ => StorageError::Database(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_session() -> SqliteSession {
        SqliteSession::in_memory().unwrap()
    }

    fn insert_all(session: &SqliteSession, torrents: &[Torrent]) -> Result<(), StorageError> {
        session.transaction(&mut |writer| {
            for torrent in torrents {
                writer.insert(torrent)?;
            }
            Ok(())
        })
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let session = create_test_session();
        insert_all(
            &session,
            &[Torrent::new("ep1", "u1"), Torrent::new("ep2", "u2")],
        )
        .unwrap();

        let all = session.select(&TorrentQuery::All).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, Some(1));
        assert_eq!(all[0].name, "ep1");
        assert_eq!(all[1].id, Some(2));
    }

    #[test]
    fn test_duplicate_url_is_constraint_violation() {
        let session = create_test_session();
        insert_all(&session, &[Torrent::new("ep1", "u1")]).unwrap();

        let err = insert_all(&session, &[Torrent::new("ep1 again", "u1")]).unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
    }

    #[test]
    fn test_failed_work_rolls_back() {
        let session = create_test_session();

        let result = session.transaction(&mut |writer| {
            writer.insert(&Torrent::new("ep1", "u1"))?;
            Err(StorageError::Database("abort".to_string()))
        });

        assert!(result.is_err());
        assert!(session.select(&TorrentQuery::All).unwrap().is_empty());
    }

    #[test]
    fn test_qb_hash_unique_but_nullable() {
        let session = create_test_session();
        insert_all(
            &session,
            &[Torrent::new("ep1", "u1"), Torrent::new("ep2", "u2")],
        )
        .unwrap();

        let err = insert_all(
            &session,
            &[
                Torrent::new("ep3", "u3").with_qb_hash("h"),
                Torrent::new("ep4", "u4").with_qb_hash("h"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));
    }

    #[test]
    fn test_upsert_overwrites_existing_row() {
        let session = create_test_session();
        insert_all(&session, &[Torrent::new("ep1", "u1").with_rss_id(3)]).unwrap();

        let mut stored = session.select(&TorrentQuery::ById(1)).unwrap().remove(0);
        stored.downloaded = true;
        stored.qb_hash = Some("abc".to_string());
        session
            .transaction(&mut |writer| writer.upsert(&stored).map(|_| ()))
            .unwrap();

        let reloaded = session.select(&TorrentQuery::ById(1)).unwrap();
        assert_eq!(reloaded, vec![stored.clone()]);
        assert_eq!(session.select(&TorrentQuery::All).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_with_unknown_id_inserts_under_that_id() {
        let session = create_test_session();
        let mut torrent = Torrent::new("ep7", "u7");
        torrent.id = Some(42);

        session
            .transaction(&mut |writer| writer.upsert(&torrent).map(|_| ()))
            .unwrap();

        let found = session.select(&TorrentQuery::ById(42)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "u7");
    }

    #[test]
    fn test_hash_lookup_spans_chunks() {
        let session = create_test_session();
        let torrents: Vec<Torrent> = (0..1000)
            .map(|i| Torrent::new(format!("ep{}", i), format!("u{}", i)).with_qb_hash(format!("h{}", i)))
            .collect();
        insert_all(&session, &torrents).unwrap();

        let mut hashes: Vec<String> = (0..1000).map(|i| format!("h{}", i)).collect();
        hashes.push("h0".to_string());
        let found = session.select(&TorrentQuery::ByQbHashes(hashes)).unwrap();

        assert_eq!(found.len(), 1000);
        assert_eq!(found[0].qb_hash.as_deref(), Some("h0"));
    }

    #[test]
    fn test_existing_urls() {
        let session = create_test_session();
        insert_all(&session, &[Torrent::new("ep1", "u1")]).unwrap();

        let existing = session
            .existing_urls(&["u1".to_string(), "u2".to_string()])
            .unwrap();
        assert_eq!(existing.len(), 1);
        assert!(existing.contains("u1"));
    }

    #[test]
    fn test_existing_urls_span_chunks() {
        let session = create_test_session();
        let torrents: Vec<Torrent> = (0..1000)
            .filter(|i| i % 2 == 0)
            .map(|i| Torrent::new(format!("ep{}", i), format!("u{}", i)))
            .collect();
        insert_all(&session, &torrents).unwrap();

        let urls: Vec<String> = (0..1000).map(|i| format!("u{}", i)).collect();
        let existing = session.existing_urls(&urls).unwrap();

        assert_eq!(existing.len(), 500);
        assert!(existing.contains("u0"));
        assert!(existing.contains("u998"));
        assert!(!existing.contains("u999"));
    }

    #[test]
    fn test_poisoned_lock_is_unavailable() {
        let session = create_test_session();

        let joined = std::thread::scope(|s| {
            s.spawn(|| {
                let _conn = session.conn.lock().unwrap();
                panic!("panic while holding the connection");
            })
            .join()
        });
        assert!(joined.is_err());
        assert!(session.conn.is_poisoned());

        assert!(matches!(
            session.select(&TorrentQuery::All),
            Err(StorageError::Unavailable(_))
        ));
        assert!(matches!(
            session.transaction(&mut |_| Ok(())),
            Err(StorageError::Unavailable(_))
        ));
    }

    #[test]
    fn test_file_database_persists_across_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("torrents.db");

        {
            let session = SqliteSession::new(&path).unwrap();
            insert_all(&session, &[Torrent::new("ep1", "u1").with_bangumi_id(9)]).unwrap();
        }

        let session = SqliteSession::new(&path).unwrap();
        let found = session.select(&TorrentQuery::ByBangumiId(9)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "u1");
    }

    #[test]
    fn test_unopenable_path_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing-dir").join("torrents.db");

        let result = SqliteSession::new(&path);
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }
}
