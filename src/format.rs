//! Display formatting helpers

use chrono::{DateTime, Local, NaiveDateTime};

/// Human-readable file size, e.g. `1.5 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    // Two decimals, trailing zeros dropped
    let rounded = format!("{:.2}", value);
    let rounded = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rounded, UNITS[unit])
}

/// `850ms` below one second, `2.35s` otherwise. Empty for missing or zero.
pub fn format_processing_time(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) if s > 0.0 => {
            if s < 1.0 {
                format!("{}ms", (s * 1000.0).round() as u64)
            } else {
                format!("{:.2}s", s)
            }
        }
        _ => String::new(),
    }
}

/// Truncate to `max_chars` characters, appending `...` when cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

/// Clock time shown next to each turn
pub fn format_clock(at: &DateTime<Local>) -> String {
    at.format("%H:%M").to_string()
}

/// Best-effort rendering of the server's `created_at` strings.
///
/// Accepts RFC 3339 and naive ISO timestamps; anything else is shown verbatim.
pub fn format_created_at(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Local).format("%d %b %Y %H:%M").to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return dt.format("%d %b %Y %H:%M").to_string();
        }
    }
    raw.to_string()
}

/// Short form of a file hash for list rows
pub fn short_hash(hash: &str) -> &str {
    let end = hash
        .char_indices()
        .nth(12)
        .map(|(i, _)| i)
        .unwrap_or(hash.len());
    &hash[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_size() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(5 * 1024 * 1024), "5 MB");
    }

    #[test]
    fn test_processing_time() {
        assert_eq!(format_processing_time(None), "");
        assert_eq!(format_processing_time(Some(0.0)), "");
        assert_eq!(format_processing_time(Some(0.42)), "420ms");
        assert_eq!(format_processing_time(Some(3.14159)), "3.14s");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("éééééé", 3), "ééé...");
    }

    #[test]
    fn test_created_at() {
        assert_eq!(format_created_at("2024-03-01T09:30:00.123456"), "01 Mar 2024 09:30");
        assert_eq!(format_created_at("yesterday"), "yesterday");
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("abcdef0123456789"), "abcdef012345");
        assert_eq!(short_hash("abc"), "abc");
    }
}
