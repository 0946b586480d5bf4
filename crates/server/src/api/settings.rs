use axum::{extract::State, http::StatusCode, Json};
use tracing::info;

use crate::config::save_config;
use crate::scan::apply_music_root_update;
use crate::state::{AppState, JsonResult, SettingsResponse, UpdateSettingsRequest};
use crate::utils::json_error;
use crate::watch::{configure_watcher, stop_watcher};

pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    let config = state.config.read().clone();
    Json(SettingsResponse {
        music_root: config.music_root,
        port: config.port,
        watch_music: config.watch_music,
    })
}

/// Update the music root and/or the watcher toggle. A root change
/// persists the config, then tears the watcher down and kicks off a
/// fresh index of the new tree.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<UpdateSettingsRequest>,
) -> JsonResult<SettingsResponse> {
    let mut config = state.config.read().clone();

    let mut root_changed = false;
    if let Some(music_root) = &payload.music_root {
        let trimmed = music_root.trim();
        if trimmed != config.music_root {
            config.music_root = trimmed.to_string();
            root_changed = true;
        }
    }
    let mut watch_changed = false;
    if let Some(watch_music) = payload.watch_music {
        if watch_music != config.watch_music {
            config.watch_music = watch_music;
            watch_changed = true;
        }
    }

    if root_changed || watch_changed {
        save_config(&state.config_path, &config).map_err(|err| {
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to save config: {}", err),
            )
        })?;
        *state.config.write() = config.clone();
    }

    if root_changed {
        stop_watcher(&state).await;
        let message = apply_music_root_update(state.clone(), &config.music_root);
        info!("Music root updated: {}", message);
    } else if watch_changed {
        stop_watcher(&state).await;
        if config.watch_music {
            let library = state.library_state.read().library.clone();
            if let Some(library) = library {
                let root = library.root().to_path_buf();
                configure_watcher(&state, &library, root);
            }
        }
    }

    Ok(Json(SettingsResponse {
        music_root: config.music_root,
        port: config.port,
        watch_music: config.watch_music,
    }))
}
