//! Logging utilities for radio and GPS text, so each log record stays on one line.

/// Default number of characters of radio/GPS text kept in one log record.
pub const LOG_PREVIEW_CHARS: usize = 300;

/// [`escape_log_within`] with [`LOG_PREVIEW_CHARS`].
pub fn escape_log(s: &str) -> String {
    escape_log_within(s, LOG_PREVIEW_CHARS)
}

/// Make `s` safe for a single log line, keeping at most `max_chars` input characters.
///
/// Whitespace controls and backslash get their usual escapes; other control
/// characters become `\xNN`. A cut string ends in an ellipsis.
pub fn escape_log_within(s: &str, max_chars: usize) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(s.len().min(max_chars) + 4);
    let mut chars = s.chars();
    for ch in chars.by_ref().take(max_chars) {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    if chars.next().is_some() {
        out.push('…');
    }
    out
}

/// Cut `s` to at most `max` bytes on a char boundary, marking the cut with an ellipsis.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

/// Lowercase hex of at most `max` bytes, with `..` when there is more.
pub fn hex_snippet(data: &[u8], max: usize) -> String {
    let mut out: String = data.iter().take(max).map(|b| format!("{:02x}", b)).collect();
    if data.len() > max {
        out.push_str("..");
    }
    out
}
