//! Metal albums backend.
//!
//! Scrapes daily album releases from an archive site, verifies playable
//! embed URLs on two platforms, manages a bounded on-disk audio cache, and
//! serves the catalog plus cached media over HTTP.

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, Result};

use models::{category, CacheSettings};
use services::auth::AuthService;
use services::catalog::CatalogStore;
use services::download_manager::DownloadManager;
use services::media_cache::MediaCache;
use services::orchestrator::PipelineOrchestrator;

/// Process-wide singletons, initialized at service start and shared by
/// every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: CatalogStore,
    pub cache: Arc<MediaCache>,
    pub downloads: Arc<DownloadManager>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub auth: Arc<AuthService>,
}

/// Wire up the database, cache, download manager, auth and orchestrator.
pub async fn build_state(config: AppConfig) -> anyhow::Result<AppState> {
    database::ensure_data_dir(&config.storage.database_path())?;
    let pool = database::create_pool(&config.storage.database_url()).await?;
    database::run_migrations(&pool).await?;

    let store = CatalogStore::new(pool.clone());
    let cache_settings: CacheSettings = store.read_settings(category::CACHE).await?;

    let cache = Arc::new(MediaCache::new(
        config.storage.audio_cache_dir.clone(),
        cache_settings.youtube_cache_max_size_gb,
    )?);
    let downloads = Arc::new(DownloadManager::new(
        Arc::clone(&cache),
        cache_settings.youtube_parallel_downloads,
        cache_settings.youtube_download_timeout,
    ));
    let auth = Arc::new(AuthService::new(pool, &config.storage.data_dir)?);
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        store.clone(),
        Arc::clone(&downloads),
        config.storage.clone(),
        config.archive.clone(),
    ));

    Ok(AppState {
        config,
        store,
        cache,
        downloads,
        orchestrator,
        auth,
    })
}

/// Build the full application router.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(handlers::catalog::health))
        .route("/api/dates", get(handlers::catalog::get_dates))
        .route("/api/dates/grouped", get(handlers::catalog::get_dates_grouped))
        .route("/api/albums/:date", get(handlers::catalog::get_albums_by_date))
        .route(
            "/api/albums/period/:period_type/:period_key",
            get(handlers::catalog::get_albums_by_period),
        )
        .route(
            "/api/albums/by-genre/:genre_name",
            get(handlers::catalog::albums_by_genre),
        )
        .route("/api/search", get(handlers::catalog::search_albums))
        .route("/api/stats", get(handlers::catalog::get_stats))
        .route("/api/genres", get(handlers::catalog::get_genres))
        .route("/api/genres/search", get(handlers::catalog::search_genres))
        .route("/api/genres/stats", get(handlers::catalog::genre_stats));

    let auth_routes = Router::new()
        .route("/api/auth/status", get(handlers::auth::auth_status))
        .route("/api/auth/setup", post(handlers::auth::setup))
        .route("/api/auth/login", post(handlers::auth::login));

    let admin_routes = Router::new()
        .route("/api/admin/scrape", post(handlers::admin::start_scrape))
        .route("/api/admin/scrape/stop", post(handlers::admin::stop_scrape))
        .route("/api/admin/scrape/status", get(handlers::admin::scrape_status))
        .route("/api/admin/delete-date", post(handlers::admin::delete_date))
        .route("/api/admin/delete-range", post(handlers::admin::delete_range))
        .route("/api/admin/summary", get(handlers::admin::data_summary))
        .route("/api/admin/verify-albums", post(handlers::admin::verify_albums))
        .route(
            "/api/admin/settings/platform-links",
            get(handlers::admin::get_platform_link_settings)
                .post(handlers::admin::set_platform_link_settings),
        )
        .route(
            "/api/admin/settings/cache",
            get(handlers::admin::get_cache_settings).post(handlers::admin::set_cache_settings),
        )
        .route(
            "/api/admin/settings/player",
            get(handlers::admin::get_player_settings).post(handlers::admin::set_player_settings),
        )
        .layer(from_fn_with_state(
            state.auth.clone(),
            middleware::admin_auth_middleware,
        ));

    let media_routes = Router::new()
        .route("/api/youtube/audio/:video_id", get(handlers::media::get_audio))
        .route("/api/youtube/audio/:video_id/info", get(handlers::media::audio_info))
        .route("/api/youtube/queue", post(handlers::media::queue_downloads))
        .route(
            "/api/youtube/download/status/:video_id",
            get(handlers::media::download_status),
        )
        .route("/api/youtube/download/stats", get(handlers::media::download_stats));

    let playlist_routes = Router::new()
        .route(
            "/api/playlists",
            get(handlers::playlists::list_playlists).post(handlers::playlists::create_playlist),
        )
        .route(
            "/api/playlists/:id",
            get(handlers::playlists::get_playlist)
                .put(handlers::playlists::update_playlist)
                .delete(handlers::playlists::delete_playlist),
        )
        .route("/api/playlists/:id/items", post(handlers::playlists::add_item))
        .route(
            "/api/playlists/:id/items/:item_id",
            delete(handlers::playlists::delete_item),
        )
        .route("/api/playlists/:id/reorder", post(handlers::playlists::reorder))
        .route("/api/playlist/dynamic", get(handlers::playlists::dynamic_playlist));

    Router::new()
        .merge(public_routes)
        .merge(auth_routes)
        .merge(admin_routes)
        .merge(media_routes)
        .merge(playlist_routes)
        .layer(middleware::create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
