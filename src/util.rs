//! Shared helpers for parsing generation command output.

/// Extract the first complete JSON object from text that may contain other content.
///
/// Braces inside JSON strings (including escaped quotes) do not affect nesting.
pub fn extract_json_object(text: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = matching_brace(&text[start..]) {
            return Some(text[start..start + end].to_string());
        }
        search_from = start + 1;
    }
    None
}

/// Byte length of the balanced object starting at `text[0]`, if it closes.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
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
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
