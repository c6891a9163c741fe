#[cfg(test)]
#[path = "utils_test.rs"]
mod tests;

use eyre::{Context, Result, eyre};
use reqwest::Url;

/// Joins `segments` onto the endpoint's path, percent-encoding each one.
pub(crate) fn endpoint_url(endpoint: &str, segments: &[&str]) -> Result<Url> {
    let mut url = Url::parse(endpoint).wrap_err(format!("parsing endpoint {}", endpoint))?;
    url.path_segments_mut()
        .map_err(|_| eyre!("endpoint {} cannot be a base URL", endpoint))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Pulls a human readable reason out of an error body. FastAPI answers with
/// `{"error": ...}` or `{"detail": ...}`; anything else is returned as is.
pub(crate) fn error_message(body: &str) -> String {
    let trimmed = body.trim();
    let value = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => value,
        Err(_) => return trimmed.to_string(),
    };

    ["error", "detail", "message"]
        .iter()
        .find_map(|key| match value.get(*key) {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) if !other.is_null() => Some(other.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| trimmed.to_string())
}
