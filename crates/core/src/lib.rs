pub mod config;
pub mod testing;
pub mod torrent;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DatabaseConfig,
    LogFormat, LoggingConfig, ServerConfig,
};
pub use torrent::{
    SqliteSession, StorageError, Torrent, TorrentDatabase, TorrentQuery, TorrentSession,
    TorrentWriter,
};
