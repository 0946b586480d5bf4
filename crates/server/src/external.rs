use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::state::LyricsQuery;

const LRCLIB_GET_URL: &str = "https://lrclib.net/api/get";
const LRCLIB_SEARCH_URL: &str = "https://lrclib.net/api/search";
const LYRICS_TIMEOUT: Duration = Duration::from_secs(10);

/// Look up lyrics on lrclib.net: an exact get first, then the search
/// endpoint when the exact lookup misses for any reason other than a
/// clean 404. The search drops the duration since it matches too
/// strictly there. Payloads pass through untouched.
pub async fn fetch_lyrics(client: &Client, query: &LyricsQuery) -> Result<Option<Value>, String> {
    let mut params: Vec<(&str, String)> = vec![
        ("artist_name", query.artist_name.clone()),
        ("track_name", query.track_name.clone()),
    ];
    if let Some(album_name) = &query.album_name {
        params.push(("album_name", album_name.clone()));
    }

    let mut get_params = params.clone();
    if let Some(duration) = query.duration {
        get_params.push(("duration", duration.to_string()));
    }

    let response = client
        .get(LRCLIB_GET_URL)
        .query(&get_params)
        .timeout(LYRICS_TIMEOUT)
        .send()
        .await
        .map_err(|err| err.to_string())?;
    match response.status() {
        status if status.is_success() => {
            let payload = response.json::<Value>().await.map_err(|err| err.to_string())?;
            return Ok(Some(payload));
        }
        StatusCode::NOT_FOUND => return Ok(None),
        _ => {}
    }

    let response = client
        .get(LRCLIB_SEARCH_URL)
        .query(&params)
        .timeout(LYRICS_TIMEOUT)
        .send()
        .await
        .map_err(|err| err.to_string())?;
    if !response.status().is_success() {
        return Ok(None);
    }
    let payload = response.json::<Value>().await.map_err(|err| err.to_string())?;
    Ok(payload.as_array().and_then(|items| items.first()).cloned())
}
