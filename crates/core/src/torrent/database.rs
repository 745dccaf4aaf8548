//! Repository over the torrent table.

use tracing::debug;

use super::{StorageError, Torrent, TorrentQuery, TorrentSession, TorrentWriter};

/// CRUD access to torrent records through a borrowed session.
///
/// Every mutating call runs in exactly one transaction. Lookups report absence
/// as `None`, an empty `Vec` or `false`, never as an error. Storage errors are
/// passed through unchanged and never retried.
pub struct TorrentDatabase<'s> {
    session: &'s dyn TorrentSession,
}

impl<'s> TorrentDatabase<'s> {
    pub fn new(session: &'s dyn TorrentSession) -> Self {
        Self { session }
    }

    /// Insert one torrent and return it with its assigned id.
    pub fn add(&self, torrent: Torrent) -> Result<Torrent, StorageError> {
        let id = self.write(|writer| writer.insert(&torrent))?;
        debug!("Insert {} in database.", torrent.name);
        Ok(Torrent {
            id: Some(id),
            ..torrent
        })
    }

    /// Insert a batch in one transaction. Either every torrent is stored or none is.
    pub fn add_all(&self, torrents: Vec<Torrent>) -> Result<Vec<Torrent>, StorageError> {
        let ids = self.write(|writer| {
            torrents
                .iter()
                .map(|torrent| writer.insert(torrent))
                .collect::<Result<Vec<_>, _>>()
        })?;
        debug!("Insert {} torrents in database.", torrents.len());

        Ok(torrents
            .into_iter()
            .zip(ids)
            .map(|(torrent, id)| Torrent {
                id: Some(id),
                ..torrent
            })
            .collect())
    }

    /// Store a torrent, inserting it if it has no id yet.
    pub fn update(&self, torrent: Torrent) -> Result<Torrent, StorageError> {
        self.upsert_one(torrent)
    }

    /// Same write as [`update`](Self::update), kept as the entry point for
    /// user-initiated edits.
    pub fn update_one_user(&self, torrent: Torrent) -> Result<Torrent, StorageError> {
        self.upsert_one(torrent)
    }

    /// Upsert a batch in one transaction.
    pub fn update_all(&self, torrents: Vec<Torrent>) -> Result<(), StorageError> {
        self.write(|writer| {
            for torrent in &torrents {
                writer.upsert(torrent)?;
            }
            Ok(())
        })
    }

    pub fn search(&self, id: i64) -> Result<Option<Torrent>, StorageError> {
        self.session.select(&TorrentQuery::ById(id)).map(first)
    }

    /// Every torrent, in storage order.
    pub fn search_all(&self) -> Result<Vec<Torrent>, StorageError> {
        self.session.select(&TorrentQuery::All)
    }

    /// Every torrent discovered in the given feed.
    pub fn search_rss(&self, rss_id: i64) -> Result<Vec<Torrent>, StorageError> {
        self.session.select(&TorrentQuery::ByRssId(rss_id))
    }

    /// Keep only the candidates whose url is not stored yet, in input order.
    pub fn check_new(&self, candidates: Vec<Torrent>) -> Result<Vec<Torrent>, StorageError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let urls: Vec<String> = candidates.iter().map(|t| t.url.clone()).collect();
        let existing = self.session.existing_urls(&urls)?;

        Ok(candidates
            .into_iter()
            .filter(|t| !existing.contains(&t.url))
            .collect())
    }

    /// Find the torrent qBittorrent knows under `qb_hash`.
    pub fn search_by_qb_hash(&self, qb_hash: &str) -> Result<Option<Torrent>, StorageError> {
        self.session
            .select(&TorrentQuery::ByQbHash(qb_hash.to_string()))
            .map(first)
    }

    /// Batch form of [`search_by_qb_hash`](Self::search_by_qb_hash).
    pub fn search_by_qb_hashes(&self, qb_hashes: &[String]) -> Result<Vec<Torrent>, StorageError> {
        if qb_hashes.is_empty() {
            return Ok(Vec::new());
        }
        self.session
            .select(&TorrentQuery::ByQbHashes(qb_hashes.to_vec()))
    }

    /// Delete every torrent of a show and return how many were removed.
    ///
    /// Nothing is written when no torrent matches.
    pub fn delete_by_bangumi_id(&self, bangumi_id: i64) -> Result<usize, StorageError> {
        let torrents = self
            .session
            .select(&TorrentQuery::ByBangumiId(bangumi_id))?;
        if torrents.is_empty() {
            return Ok(0);
        }

        self.write(|writer| {
            for id in torrents.iter().filter_map(|t| t.id) {
                writer.delete(id)?;
            }
            Ok(())
        })?;

        let count = torrents.len();
        debug!(
            "Deleted {} torrent records for bangumi_id {}.",
            count, bangumi_id
        );
        Ok(count)
    }

    pub fn search_by_url(&self, url: &str) -> Result<Option<Torrent>, StorageError> {
        self.session
            .select(&TorrentQuery::ByUrl(url.to_string()))
            .map(first)
    }

    /// Record the qBittorrent hash of a stored torrent.
    ///
    /// Returns `false` without writing when no torrent has `torrent_id`.
    pub fn update_qb_hash(&self, torrent_id: i64, qb_hash: &str) -> Result<bool, StorageError> {
        let Some(mut torrent) = self.search(torrent_id)? else {
            return Ok(false);
        };

        torrent.qb_hash = Some(qb_hash.to_string());
        self.write(|writer| writer.upsert(&torrent))?;
        debug!("Updated qb_hash for torrent {}: {}", torrent_id, qb_hash);
        Ok(true)
    }

    fn upsert_one(&self, torrent: Torrent) -> Result<Torrent, StorageError> {
        let id = self.write(|writer| writer.upsert(&torrent))?;
        debug!("Update {} in database.", torrent.name);
        Ok(Torrent {
            id: Some(id),
            ..torrent
        })
    }

    /// Run `work` in one session transaction and return its output.
    fn write<T>(
        &self,
        work: impl FnOnce(&mut dyn TorrentWriter) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut work = Some(work);
        let mut output = None;

        self.session.transaction(&mut |writer| {
            if let Some(work) = work.take() {
                output = Some(work(writer)?);
            }
            Ok(())
        })?;

        // A session runs the work exactly once per transaction.
        output.ok_or_else(|| {
            StorageError::Database("transaction committed without running its work".to_string())
        })
    }
}

fn first(torrents: Vec<Torrent>) -> Option<Torrent> {
    torrents.into_iter().next()
}
