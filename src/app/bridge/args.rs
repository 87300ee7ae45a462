use std::sync::OnceLock;

use regex::Regex;

fn package_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)*$").expect("package name regex")
    })
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.:\-]+$").expect("token regex"))
}

/// Segments separated by dots; each starts with a letter and holds only alnum or `_`.
pub fn validate_package_name(value: &str) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("package_name is required".to_string());
    }
    if !package_name_pattern().is_match(trimmed) {
        return Err(format!("package_name is not a valid Android package: {trimmed}"));
    }
    Ok(())
}

/// Service names, log tags, property keys and similar single shell words.
pub fn validate_token(value: &str, field: &str) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{field} is required"));
    }
    if !token_pattern().is_match(trimmed) {
        return Err(format!("{field} contains characters not allowed in a shell word"));
    }
    Ok(())
}

/// Single-quotes `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    if token_pattern().is_match(value) {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
