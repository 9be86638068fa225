//! Recovering a JSON object from model output.

use serde::de::DeserializeOwned;

/// Parses `content` as JSON, or failing that, the first balanced
/// `{...}` object inside it (models like to wrap JSON in prose or fences).
pub fn parse_json_lenient<T: DeserializeOwned>(content: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<T>(content.trim()) {
        return Some(value);
    }
    let object = first_json_object(content)?;
    serde_json::from_str::<T>(object).ok()
}

/// Finds the first brace-delimited object, skipping braces inside strings.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
