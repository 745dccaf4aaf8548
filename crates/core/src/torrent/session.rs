//! Storage port consumed by [`TorrentDatabase`](super::TorrentDatabase).

use std::collections::HashSet;

use thiserror::Error;

use super::Torrent;

/// Errors surfaced by a storage session.
///
/// A missing record is never an error; lookups return `Option` or an empty `Vec`.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write broke a uniqueness or other constraint.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The store could not be reached.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Row filter for [`TorrentSession::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentQuery {
    All,
    ById(i64),
    ByRssId(i64),
    ByBangumiId(i64),
    ByUrl(String),
    ByQbHash(String),
    ByQbHashes(Vec<String>),
}

impl TorrentQuery {
    /// Whether `torrent` satisfies this filter.
    pub fn matches(&self, torrent: &Torrent) -> bool {
        match self {
            TorrentQuery::All => true,
            TorrentQuery::ById(id) => torrent.id == Some(*id),
            TorrentQuery::ByRssId(rss_id) => torrent.rss_id == Some(*rss_id),
            TorrentQuery::ByBangumiId(bangumi_id) => torrent.bangumi_id == Some(*bangumi_id),
            TorrentQuery::ByUrl(url) => &torrent.url == url,
            TorrentQuery::ByQbHash(hash) => torrent.qb_hash.as_ref() == Some(hash),
            TorrentQuery::ByQbHashes(hashes) => torrent
                .qb_hash
                .as_ref()
                .is_some_and(|hash| hashes.contains(hash)),
        }
    }
}

/// Write half of a session, only reachable inside [`TorrentSession::transaction`].
pub trait TorrentWriter {
    /// Insert a new row and return its id. An explicit `id` on the record is kept.
    fn insert(&mut self, torrent: &Torrent) -> Result<i64, StorageError>;

    /// Insert a record without an id, or overwrite the row carrying its id.
    /// Returns the id of the written row.
    fn upsert(&mut self, torrent: &Torrent) -> Result<i64, StorageError>;

    /// Delete a row by id. Deleting a missing id is a no-op.
    fn delete(&mut self, id: i64) -> Result<(), StorageError>;
}

/// Trait for torrent storage sessions.
///
/// Reads go straight to storage. Writes happen inside [`transaction`](Self::transaction),
/// which commits once when `work` returns `Ok` and rolls back otherwise.
pub trait TorrentSession: Send + Sync {
    /// Return every row matching `query`, ordered by id.
    fn select(&self, query: &TorrentQuery) -> Result<Vec<Torrent>, StorageError>;

    /// Return the subset of `urls` already stored.
    fn existing_urls(&self, urls: &[String]) -> Result<HashSet<String>, StorageError>;

    /// Run `work` exactly once in a single transaction.
    fn transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn TorrentWriter) -> Result<(), StorageError>,
    ) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_matches_by_hashes() {
        let hashed = Torrent::new("a", "u1").with_qb_hash("h1");
        let unhashed = Torrent::new("b", "u2");
        let query = TorrentQuery::ByQbHashes(vec!["h1".to_string(), "h2".to_string()]);

        assert!(query.matches(&hashed));
        assert!(!query.matches(&unhashed));
    }

    #[test]
    fn test_query_by_id_skips_unsaved() {
        let torrent = Torrent::new("a", "u1");
        assert!(!TorrentQuery::ById(1).matches(&torrent));
        assert!(TorrentQuery::All.matches(&torrent));
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::ConstraintViolation("UNIQUE constraint failed: torrent.url".into());
        assert_eq!(
            err.to_string(),
            "Constraint violation: UNIQUE constraint failed: torrent.url"
        );
    }
}
