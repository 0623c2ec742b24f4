use std::collections::HashMap;

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use hearth::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/dm?user=bob&limit=2");
/// assert_eq!(params.get("user"), Some(&"bob".to_string()));
/// assert_eq!(params.get("limit"), Some(&"2".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query_start) = uri.find('?') {
        let query = &uri[query_start + 1..];
        for param in query.split('&').filter(|p| !p.is_empty()) {
            if let Some((key, encoded_value)) = param.split_once('=') {
                let decoded = urlencoding::decode(encoded_value)
                    .unwrap_or(std::borrow::Cow::Borrowed(encoded_value))
                    .to_string();
                params.insert(key.to_string(), decoded);
            } else {
                // Flag parameter without value
                params.insert(param.to_string(), String::new());
            }
        }
    }

    params
}

/// Get a string parameter, trimmed, treating empty as absent
pub fn get_string(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Get an integer parameter with validation and default
pub fn get_int(params: &HashMap<String, String>, key: &str, default: usize) -> usize {
    params.get(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_values_and_flags() {
        let params = parse_query_params("/search-users?query=J%C3%BCrgen%20K&exact");
        assert_eq!(get_string(&params, "query").as_deref(), Some("Jürgen K"));
        assert_eq!(params.get("exact"), Some(&String::new()));
    }

    #[test]
    fn missing_query_yields_nothing() {
        let params = parse_query_params("/dm");
        assert!(params.is_empty());
        assert_eq!(get_string(&params, "user"), None);
    }

    #[test]
    fn int_params_have_floor_and_default() {
        let params = parse_query_params("/conversations?limit=0&page=x");
        assert_eq!(get_int(&params, "limit", 10), 1);
        assert_eq!(get_int(&params, "page", 3), 3);
    }
}
