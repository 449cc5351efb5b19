//! Small HTML helpers for rendering story content.
//!
//! Archive dumps contain chapter bodies that were cut off mid-tag or carry
//! markup the offline bundle must not ship (scripts, frames). The repair
//! pass here is deliberately crude: it balances a fixed set of block tags
//! and drops disallowed elements wholesale.

use once_cell::sync::Lazy;
use regex::Regex;

/// Tags that [`repair_html`] knows how to close.
const REPAIRED_TAGS: [&str; 7] = ["p", "i", "b", "a", "div", "pre", "li"];

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

/// Elements removed with their whole content before a chapter is shipped.
static DISALLOWED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|iframe|object|embed)\b.*?</\1\s*>").unwrap()
});

/// HTML-escape a display string.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Remove all markup, leaving the text content.
pub fn striptags(s: &str) -> String {
    TAG.replace_all(s, "").into_owned()
}

/// Attempt to repair cut-off HTML snippets.
///
/// For each tag in [`REPAIRED_TAGS`], counts openers (`<p>`, `<p ...>`)
/// against closers and appends closers for the deficit, closing the
/// rightmost unclosed tag first so nesting stays plausible.
pub fn repair_html(html: &str) -> String {
    let lower = html.to_lowercase();
    let mut deficits: Vec<(String, String, usize)> = Vec::new();
    for tag in REPAIRED_TAGS {
        let closer = format!("</{}>", tag);
        let n_closer = lower.matches(&closer).count();
        let mut n_opener = 0;
        for opener in [format!("<{}>", tag), format!("<{} ", tag)] {
            n_opener += lower.matches(opener.as_str()).count();
        }
        if n_opener > n_closer {
            deficits.push((tag.to_string(), closer, n_opener - n_closer));
        }
    }
    if deficits.is_empty() {
        return html.to_string();
    }

    // Close the rightmost unclosed tag until all deficits are gone. Each
    // search for a tag is capped at the position of its previous match.
    let mut repaired = html.to_string();
    let mut last_positions: Vec<usize> = deficits.iter().map(|_| lower.len()).collect();
    while !deficits.is_empty() {
        let mut best: Option<(usize, usize)> = None; // (deficit idx, opener pos)
        for (i, (tag, _closer, _count)) in deficits.iter().enumerate() {
            let limit = last_positions[i];
            let hay = &lower[..limit];
            let pos = [format!("<{}>", tag), format!("<{} ", tag)]
                .iter()
                .filter_map(|o| hay.rfind(o.as_str()))
                .max();
            if let Some(pos) = pos {
                if best.map(|(_, p)| pos > p).unwrap_or(true) {
                    best = Some((i, pos));
                }
            }
        }
        let Some((i, pos)) = best else { break };
        repaired.push_str(&deficits[i].1);
        last_positions[i] = pos;
        if deficits[i].2 <= 1 {
            deficits.remove(i);
            last_positions.remove(i);
        } else {
            deficits[i].2 -= 1;
        }
    }
    repaired
}

/// Prepare a chapter body for shipping: drop disallowed elements, balance
/// tags and wrap the result in the anchor the chapter template links to.
pub fn render_storytext(html: &str) -> String {
    let cleaned = DISALLOWED.replace_all(html, "");
    let repaired = repair_html(&cleaned);
    format!("<div class=\"storytext\" id=\"storytext\">{}</div>", repaired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_all_entities() {
        assert_eq!(
            escape("<a href=\"x\">&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn striptags_removes_markup() {
        assert_eq!(striptags("<p>Hello <b>world</b></p>"), "Hello world");
    }

    #[test]
    fn striptags_multiline_tag() {
        assert_eq!(striptags("a<img\nsrc='x'>b"), "ab");
    }

    #[test]
    fn repair_balanced_input_unchanged() {
        let html = "<p>fine</p><div><b>ok</b></div>";
        assert_eq!(repair_html(html), html);
    }

    #[test]
    fn repair_closes_single_unclosed_tag() {
        assert_eq!(repair_html("<p>cut off"), "<p>cut off</p>");
    }

    #[test]
    fn repair_closes_rightmost_first() {
        assert_eq!(repair_html("<div><p>text"), "<div><p>text</p></div>");
    }

    #[test]
    fn repair_handles_attributes() {
        assert_eq!(
            repair_html("<a href=\"x\">link"),
            "<a href=\"x\">link</a>"
        );
    }

    #[test]
    fn repair_ignores_void_lookalikes() {
        // <br> must not be counted as an unclosed <b>.
        let html = "text<br>more";
        assert_eq!(repair_html(html), html);
    }

    #[test]
    fn repair_multiple_deficits_of_same_tag() {
        assert_eq!(repair_html("<i>a<i>b"), "<i>a<i>b</i></i>");
    }

    #[test]
    fn storytext_strips_scripts() {
        let out = render_storytext("<p>hi</p><script>alert(1)</script>");
        assert!(!out.contains("script"));
        assert!(out.contains("<p>hi</p>"));
    }

    #[test]
    fn storytext_wraps_with_anchor() {
        let out = render_storytext("<p>hi");
        assert!(out.starts_with("<div class=\"storytext\" id=\"storytext\">"));
        assert!(out.ends_with("</div>"));
        assert!(out.contains("<p>hi</p>"));
    }
}
