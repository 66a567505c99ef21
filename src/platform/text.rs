// src/platform/text.rs
use once_cell::sync::OnceCell;
use regex::Regex;

const MAX_TITLE_CHARS: usize = 300;
const MAX_DESCRIPTION_CHARS: usize = 1500;

/// Normalize upstream text: decode entities, drop highlight markup, collapse
/// whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip tags (search results wrap matches in <em class="keyword">)
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 4) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}

pub fn normalize_title(s: &str) -> String {
    normalize_text(s, MAX_TITLE_CHARS)
}

/// Empty descriptions become `None`.
pub fn normalize_description(s: Option<&str>) -> Option<String> {
    let out = normalize_text(s?, MAX_DESCRIPTION_CHARS);
    (!out.is_empty()).then_some(out)
}

/// Accepts `"SS"`, `"MM:SS"` or `"HH:MM:SS"`.
pub fn parse_clock_duration(s: &str) -> Option<u32> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut total: u32 = 0;
    for p in parts {
        let n: u32 = p.trim().parse().ok()?;
        total = total.checked_mul(60)?.checked_add(n)?;
    }
    Some(total)
}
