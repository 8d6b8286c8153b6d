use validator::Validate;

/// Tool servers are only reachable over plain HTTP(S).
pub fn validate_http_url(url: &str) -> Result<(), validator::ValidationError> {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(validator::ValidationError::new("unsupported_scheme"))
    }
}

/// Explicit server ids are kept as given. Only control characters are
/// refused, since ids end up in log lines.
pub fn validate_server_id(id: &str) -> Result<(), validator::ValidationError> {
    if id.is_empty() || id.chars().any(char::is_control) {
        Err(validator::ValidationError::new("invalid_characters"))
    } else {
        Ok(())
    }
}

/// Validation helper function
pub fn validate_request<T: Validate>(req: &T) -> Result<(), String> {
    req.validate().map_err(|e| format!("{e}"))
}
