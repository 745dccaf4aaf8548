//! Testing utilities: an in-memory session and torrent fixtures.
//!
//! # Example
//!
//! ```rust,ignore
//! use bangumi_torrent_core::testing::{fixtures, MemorySession};
//! use bangumi_torrent_core::TorrentDatabase;
//!
//! let session = MemorySession::new();
//! let db = TorrentDatabase::new(&session);
//! db.add_all(fixtures::season(1, 10, 12))?;
//!
//! assert_eq!(session.commit_count(), 1);
//! ```

mod memory_session;

pub use memory_session::MemorySession;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::torrent::Torrent;

    /// An unsaved torrent for one episode of a show, as an RSS feed would list it.
    ///
    /// The url is derived from `bangumi_id` and `episode`, so it is unique per pair.
    pub fn episode(bangumi_id: i64, rss_id: i64, episode: u32) -> Torrent {
        Torrent::new(
            format!(
                "[Sub] Show {} - {:02} [WEB-DL][1080p]",
                bangumi_id, episode
            ),
            format!(
                "https://feeds.example.org/download/{}/{:02}.torrent",
                bangumi_id, episode
            ),
        )
        .with_homepage(format!(
            "https://feeds.example.org/episode/{}/{:02}",
            bangumi_id, episode
        ))
        .with_rss_id(rss_id)
        .with_bangumi_id(bangumi_id)
    }

    /// Episodes `1..=episodes` of a show.
    pub fn season(bangumi_id: i64, rss_id: i64, episodes: u32) -> Vec<Torrent> {
        (1..=episodes)
            .map(|n| episode(bangumi_id, rss_id, n))
            .collect()
    }
}
