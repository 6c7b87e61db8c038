//! Helpers shared by the tool definitions.

use serde_json::Value;

/// String at a JSON pointer, if present and a string.
pub fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Value at a JSON pointer, or `null`.
pub fn value_at(value: &Value, pointer: &str) -> Value {
    value.pointer(pointer).cloned().unwrap_or(Value::Null)
}

/// Items of the array stored under `field`, or nothing.
pub fn items<'a>(value: &'a Value, field: &str) -> &'a [Value] {
    value
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Join lines, or fall back to `empty` when there are none.
pub fn lines_or(lines: Vec<String>, empty: &str) -> String {
    if lines.is_empty() {
        empty.to_string()
    } else {
        lines.join("\n")
    }
}

/// Percent-encode one URL path segment.
pub fn segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b':' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// A one-paragraph Atlassian Document Format body.
pub fn adf_paragraph(text: &str) -> Value {
    serde_json::json!({
        "type": "doc",
        "version": 1,
        "content": [{
            "type": "paragraph",
            "content": [{"type": "text", "text": text}]
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segment_encoding() {
        assert_eq!(segment("PROJ-123"), "PROJ-123");
        assert_eq!(segment("1:2"), "1:2");
        assert_eq!(segment("a/b c"), "a%2Fb%20c");
        assert_eq!(segment("../x?y"), "..%2Fx%3Fy");
    }

    #[test]
    fn test_json_helpers() {
        let doc = json!({"fields": {"status": {"name": "Done"}}, "values": [1, 2]});
        assert_eq!(str_at(&doc, "/fields/status/name"), Some("Done"));
        assert_eq!(value_at(&doc, "/missing"), Value::Null);
        assert_eq!(items(&doc, "values").len(), 2);
        assert!(items(&doc, "nothing").is_empty());
        assert_eq!(lines_or(vec![], "None."), "None.");
    }
}
