//! In-memory torrent session.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::torrent::{StorageError, Torrent, TorrentQuery, TorrentSession, TorrentWriter};

/// Rows plus the highest id ever assigned, mirroring SQLite `AUTOINCREMENT`.
#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<Torrent>,
    last_id: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    table: Table,
    queries: usize,
    commits: usize,
    rollbacks: usize,
    unavailable: bool,
}

impl MemoryState {
    fn ensure_available(&self) -> Result<(), StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable(
                "memory session marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory implementation of [`TorrentSession`].
///
/// Enforces the same uniqueness rules as the SQLite table (`id`, `url`, non-null
/// `qb_hash`) and records how it was used:
/// - every `select` / `existing_urls` call counts as one query
/// - every successful transaction counts as one commit
/// - every failed transaction counts as one rollback and leaves the rows untouched
///
/// # Example
///
/// ```rust,ignore
/// let session = MemorySession::new();
/// session.set_unavailable(true);
///
/// let db = TorrentDatabase::new(&session);
/// assert!(matches!(db.search_all(), Err(StorageError::Unavailable(_))));
/// ```
#[derive(Debug, Default)]
pub struct MemorySession {
    state: Mutex<MemoryState>,
}

impl MemorySession {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session pre-populated with `torrents`.
    ///
    /// Seeding bypasses the transaction counters. Torrents without an id get the next free one.
    pub fn with_torrents(torrents: Vec<Torrent>) -> Result<Self, StorageError> {
        let mut table = Table::default();
        for torrent in &torrents {
            table.insert(torrent)?;
        }

        Ok(Self {
            state: Mutex::new(MemoryState {
                table,
                ..Default::default()
            }),
        })
    }

    /// Number of read queries issued so far.
    pub fn query_count(&self) -> usize {
        self.state().queries
    }

    /// Number of committed transactions.
    pub fn commit_count(&self) -> usize {
        self.state().commits
    }

    /// Number of transactions rolled back.
    pub fn rollback_count(&self) -> usize {
        self.state().rollbacks
    }

    /// Make every subsequent call fail with [`StorageError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TorrentSession for MemorySession {
    fn select(&self, query: &TorrentQuery) -> Result<Vec<Torrent>, StorageError> {
        let mut state = self.state();
        state.ensure_available()?;
        state.queries += 1;

        let mut torrents: Vec<Torrent> = state
            .table
            .rows
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        torrents.sort_by_key(|t| t.id);
        Ok(torrents)
    }

    fn existing_urls(&self, urls: &[String]) -> Result<HashSet<String>, StorageError> {
        let mut state = self.state();
        state.ensure_available()?;
        state.queries += 1;

        Ok(state
            .table
            .rows
            .iter()
            .filter(|t| urls.contains(&t.url))
            .map(|t| t.url.clone())
            .collect())
    }

    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn TorrentWriter) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        let mut state = self.state();
        state.ensure_available()?;

        let mut staged = state.table.clone();
        match work(&mut staged) {
            Ok(()) => {
                state.table = staged;
                state.commits += 1;
                Ok(())
            }
            Err(e) => {
                state.rollbacks += 1;
                Err(e)
            }
        }
    }
}

impl Table {
    fn check_unique(&self, torrent: &Torrent, own_id: Option<i64>) -> Result<(), StorageError> {
        for row in self.rows.iter().filter(|r| r.id != own_id) {
            if row.url == torrent.url {
                return Err(StorageError::ConstraintViolation(format!(
                    "UNIQUE constraint failed: torrent.url ({})",
                    torrent.url
                )));
            }
            if torrent.qb_hash.is_some() && row.qb_hash == torrent.qb_hash {
                return Err(StorageError::ConstraintViolation(format!(
                    "UNIQUE constraint failed: torrent.qb_hash ({})",
                    torrent.qb_hash.as_deref().unwrap_or_default()
                )));
            }
        }
        Ok(())
    }
}

impl TorrentWriter for Table {
    fn insert(&mut self, torrent: &Torrent) -> Result<i64, StorageError> {
        let id = match torrent.id {
            Some(id) if self.rows.iter().any(|r| r.id == Some(id)) => {
                return Err(StorageError::ConstraintViolation(format!(
                    "UNIQUE constraint failed: torrent.id ({})",
                    id
                )));
            }
            Some(id) => id,
            None => self.last_id.checked_add(1).ok_or_else(|| {
                StorageError::Database("database or disk is full".to_string())
            })?,
        };
        self.check_unique(torrent, None)?;

        self.last_id = self.last_id.max(id);
        self.rows.push(Torrent {
            id: Some(id),
            ..torrent.clone()
        });
        Ok(id)
    }

    fn upsert(&mut self, torrent: &Torrent) -> Result<i64, StorageError> {
        let Some(id) = torrent.id else {
            return self.insert(torrent);
        };

        match self.rows.iter().position(|r| r.id == Some(id)) {
            Some(index) => {
                self.check_unique(torrent, Some(id))?;
                self.rows[index] = torrent.clone();
                Ok(id)
            }
            None => self.insert(torrent),
        }
    }

    fn delete(&mut self, id: i64) -> Result<(), StorageError> {
        self.rows.retain(|r| r.id != Some(id));
        Ok(())
    }
}
