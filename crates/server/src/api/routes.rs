use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, torrents};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Torrents
        .route(
            "/torrents",
            get(torrents::list_torrents).post(torrents::add_torrent),
        )
        .route(
            "/torrents/batch",
            post(torrents::add_torrents).put(torrents::update_torrents),
        )
        .route("/torrents/check", post(torrents::check_new))
        .route("/torrents/lookup", get(torrents::lookup_torrent))
        .route("/torrents/lookup/hashes", post(torrents::lookup_by_hashes))
        .route(
            "/torrents/{id}",
            get(torrents::get_torrent).put(torrents::update_torrent),
        )
        .route("/torrents/{id}/qb_hash", put(torrents::set_qb_hash))
        // Bulk removal when a show is deleted
        .route(
            "/bangumi/{bangumi_id}/torrents",
            delete(torrents::delete_bangumi_torrents),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
}
