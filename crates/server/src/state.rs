use std::sync::Arc;
use bangumi_torrent_core::{Config, TorrentDatabase, TorrentSession};

/// Shared application state
pub struct AppState {
    config: Config,
    session: Arc<dyn TorrentSession>,
}

impl AppState {
    pub fn new(config: Config, session: Arc<dyn TorrentSession>) -> Self {
        Self { config, session }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Repository borrowing the shared session for the duration of a request.
    pub fn torrents(&self) -> TorrentDatabase<'_> {
        TorrentDatabase::new(self.session.as_ref())
    }
}
