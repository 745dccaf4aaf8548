//! Torrent entity.

use serde::{Deserialize, Serialize};

/// A torrent found in an RSS feed, tracked until it is handed to the download client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Torrent {
    /// Primary key. `None` until the record is first stored.
    #[serde(default)]
    pub id: Option<i64>,
    /// Display name (usually the feed item title).
    pub name: String,
    /// Torrent or magnet URL. Unique across the store.
    pub url: String,
    /// Feed item page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    /// Feed this torrent was discovered in.
    #[serde(default)]
    pub rss_id: Option<i64>,
    /// Show this torrent belongs to.
    #[serde(default)]
    pub bangumi_id: Option<i64>,
    /// Hash assigned by qBittorrent once the torrent has been added there.
    #[serde(default)]
    pub qb_hash: Option<String>,
    #[serde(default)]
    pub downloaded: bool,
}

impl Torrent {
    /// Create an unsaved torrent with only the required fields set.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            url: url.into(),
            homepage: None,
            rss_id: None,
            bangumi_id: None,
            qb_hash: None,
            downloaded: false,
        }
    }

    /// Set the originating feed.
    pub fn with_rss_id(mut self, rss_id: i64) -> Self {
        self.rss_id = Some(rss_id);
        self
    }

    /// Set the owning show.
    pub fn with_bangumi_id(mut self, bangumi_id: i64) -> Self {
        self.bangumi_id = Some(bangumi_id);
        self
    }

    /// Set the feed item page.
    pub fn with_homepage(mut self, homepage: impl Into<String>) -> Self {
        self.homepage = Some(homepage.into());
        self
    }

    /// Set the download client hash.
    pub fn with_qb_hash(mut self, qb_hash: impl Into<String>) -> Self {
        self.qb_hash = Some(qb_hash.into());
        self
    }
}
