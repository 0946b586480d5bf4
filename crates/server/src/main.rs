mod api;
mod config;
mod external;
mod range;
mod scan;
mod search;
mod state;
mod streaming;
mod user_data;
mod utils;
mod watch;

use std::sync::Arc;

use api::api_router;
use axum::Router;
use config::{config_path_from_env, load_or_create_config, resolve_music_root, resolve_path};
use library::Library;
use parking_lot::RwLock;
use reqwest::Client;
use scan::{set_library_missing, start_index};
use state::{AppState, LibraryState, LibraryStatus};
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use user_data::{open_or_create_db as open_user_db, UserDataStore};
use watch::stop_watcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    let config_store = Arc::new(RwLock::new(config.clone()));

    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);

    let index_path = resolve_path(&config_path, &config.index_path);
    let db = Library::open_db(&index_path)?;

    let user_db_path = resolve_path(&config_path, &config.user_data_path);
    let user_db = Arc::new(open_user_db(&user_db_path)?);
    let user_data = UserDataStore::new(Arc::clone(&user_db));
    if let Err(err) = user_data.init_tables() {
        warn!("Failed to create user data tables: {}", err);
    }

    let external_client = Client::builder().user_agent("harmonia/0.1").build()?;

    let state = AppState {
        library_state: Arc::new(RwLock::new(LibraryState {
            library: None,
            status: LibraryStatus::Unconfigured,
        })),
        config_path,
        config: config_store,
        db,
        user_data,
        watcher: Arc::new(RwLock::new(None)),
        external_client,
    };

    match resolve_music_root(&state.config_path, &config.music_root) {
        Some(music_root) if music_root.exists() => start_index(state.clone(), music_root),
        Some(music_root) => set_library_missing(&state, music_root),
        None => info!("Music directory not configured yet; set it via the settings endpoint."),
    }

    let app = Router::new()
        .nest("/api/v1", api_router(state.clone()))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Quiesce the watcher before exiting so no handler fires into a
    // torn-down process.
    stop_watcher(&state).await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
