use once_cell::sync::Lazy;
use regex::Regex;

/// Characters that do not belong to a word. Everything matching this is
/// turned into a space before whitespace-splitting, so "foo--bar" and
/// "foo|bar" still count the way the archive sites count them.
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w|\-]").unwrap());

/// Count the words in a chunk of text.
///
/// This is the single word-count function of the whole build; story word
/// totals are sums of per-chapter counts produced here and are never
/// recomputed from rendered output.
pub fn count_words(text: &str) -> u32 {
    NON_WORD.replace_all(text, " ").split_whitespace().count() as u32
}

/// Format a count in a compact human-readable form (1234 -> "1.23K").
pub fn format_number(n: u64) -> String {
    if n < 1000 {
        return n.to_string();
    }
    let mut value = n as f64;
    for suffix in ["", "K", "M", "B", "T"] {
        if value < 1000.0 {
            return format!("{:.2}{}", value, suffix);
        }
        value /= 1000.0;
    }
    format!("{:.2}Qa", value)
}

/// Format a number with thousands separators (1234567 -> "1,234,567").
pub fn format_grouped(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format a byte count into a human readable size.
pub fn format_size(nbytes: u64) -> String {
    let mut value = nbytes as f64;
    for suffix in ["B", "KiB", "MiB", "GiB", "TiB", "PiB"] {
        if value < 1024.0 {
            return format!("{:.2} {}", value, suffix);
        }
        value /= 1024.0;
    }
    format!("{:.2} EiB", value)
}

/// Format elapsed seconds as H:MM:SS.
pub fn format_timedelta(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{}:{:02}:{:02}", hours, minutes, secs)
}
