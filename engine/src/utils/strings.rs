//! String utility functions

use serde_json::Value;

/// Normalize a free-form subscriptions value into a lowercased, deduplicated
/// list.
///
/// Handles:
/// - JSON arrays of strings: `["News", "alerts"]`
/// - Comma-separated strings: `news, alerts`
/// - Mixed arrays: non-string elements are skipped
pub fn normalize_string_list(value: &Value) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |raw: &str| {
        let item = raw.trim().to_ascii_lowercase();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    };
    match value {
        Value::Array(items) => {
            for item in items {
                if let Value::String(s) = item {
                    push(s);
                }
            }
        }
        Value::String(s) => {
            for part in s.split(',') {
                push(part);
            }
        }
        _ => {}
    }
    out
}

/// Trim a string and return `None` when the result is empty.
pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_array() {
        let value = json!(["News", "alerts", "news"]);
        assert_eq!(normalize_string_list(&value), vec!["news", "alerts"]);
    }

    #[test]
    fn test_normalize_comma_separated() {
        let value = json!("News, alerts , ");
        assert_eq!(normalize_string_list(&value), vec!["news", "alerts"]);
    }

    #[test]
    fn test_normalize_mixed_array_skips_non_strings() {
        let value = json!(["news", 42, null, "Alerts"]);
        assert_eq!(normalize_string_list(&value), vec!["news", "alerts"]);
    }

    #[test]
    fn test_normalize_other_types() {
        assert!(normalize_string_list(&json!(42)).is_empty());
        assert!(normalize_string_list(&json!({})).is_empty());
        assert!(normalize_string_list(&json!(null)).is_empty());
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty("  hello "), Some("hello"));
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(""), None);
    }
}
