//! Torrent records discovered from RSS feeds.
//!
//! [`TorrentDatabase`] is the repository callers use. It borrows a
//! [`TorrentSession`], the storage port, which is either the SQLite-backed
//! [`SqliteSession`] or an in-memory fake from [`crate::testing`].

mod database;
mod session;
mod sqlite_session;
mod types;

pub use database::TorrentDatabase;
pub use session::{StorageError, TorrentQuery, TorrentSession, TorrentWriter};
pub use sqlite_session::SqliteSession;
pub use types::Torrent;
