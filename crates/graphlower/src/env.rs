use std::env;

pub fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    if matches!(normalized.as_str(), "1" | "true" | "yes" | "on") {
        return true;
    }
    normalized.parse::<i64>().map(|n| n != 0).unwrap_or(false)
}

/// Reads a boolean flag from the environment; unset or blank means `false`.
pub fn flag_enabled(key: &str) -> bool {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    }
}

/// Reads a non-blank, trimmed string from the environment.
pub fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
