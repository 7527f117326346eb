//! Query-string splitting and decoding.

use std::collections::HashMap;

/// Split a request target into its path and optional raw query.
pub fn split_target(uri: &str) -> (&str, Option<&str>) {
    match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri, None),
    }
}

/// Decode a raw query string into a map.
///
/// Percent-encoding and `+` are decoded as UTF-8, a key without `=` maps to
/// the empty string, and a repeated key keeps its last value.
pub fn parse_query(raw: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}
