//! Text helpers shared across the workspace

/// Truncate to at most `max` bytes, backing up to the nearest char
/// boundary. Used to bound upstream error bodies before they reach logs
/// and error messages.
pub fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
