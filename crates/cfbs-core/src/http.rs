use std::path::Path;

use anyhow::Result;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::CfbsError;

/// Fetches and decodes a JSON document over HTTP(S).
pub fn get_json<T: DeserializeOwned>(url: &str) -> Result<T> {
    debug!("fetching {url}");
    let response = ureq::get(url)
        .call()
        .map_err(|e| CfbsError::Network(format!("Failed to fetch '{url}': {e}")))?;
    let value = response
        .into_json::<T>()
        .map_err(|e| CfbsError::Network(format!("Invalid JSON from '{url}': {e}")))?;
    Ok(value)
}

/// Reads JSON from a URL, or from a local path for anything else.
pub fn get_or_read_json<T: DeserializeOwned>(location: &str) -> Result<T> {
    if location.starts_with("https://") || location.starts_with("http://") {
        return get_json(location);
    }
    let path = location.strip_prefix("file://").unwrap_or(location);
    let text = std::fs::read_to_string(Path::new(path))
        .map_err(|e| CfbsError::user(format!("Could not read '{path}': {e}")))?;
    let value = serde_json::from_str(&text)
        .map_err(|e| CfbsError::user(format!("Error reading json file '{path}': {e}")))?;
    Ok(value)
}
