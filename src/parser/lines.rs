use std::sync::LazyLock;

use regex::Regex;

use super::sections::SectionKind;

// "1. text" / "2) text"; text must not start with a digit so "1.5 hours" stays prose.
static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s*(\D.*)$").unwrap());
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-•*]\s+(.+)$").unwrap());
static LETTERED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\(?[A-Za-z]\)\s*(.+)$").unwrap());
static BARE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:\d+[.)]|[-•*]|\(?[A-Za-z]\))$").unwrap());
static HEADER_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#{0,6}\s*\**\s*([A-Za-z][A-Za-z ]+?)\s*\**\s*:?\s*\**\s*$").unwrap()
});

/// One classified line of a section body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Header(SectionKind),
    Main(String),
    Sub(String),
    Text(String),
    Empty,
}

pub fn classify_lines(body: &str) -> Vec<Line> {
    body.lines().map(classify).collect()
}

pub fn classify(raw: &str) -> Line {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Empty;
    }

    // ── Stray section header keyword ──
    if let Some(kind) = HEADER_LINE_RE
        .captures(line)
        .and_then(|caps| SectionKind::from_label(&caps[1]))
    {
        return Line::Header(kind);
    }

    let indented = raw.len() != raw.trim_start().len();
    // "**1. Hunger**" is matched as "1. Hunger**".
    let marked = line.strip_prefix("**").map(str::trim_start).unwrap_or(line);

    if BARE_MARKER_RE.is_match(marked) {
        return Line::Empty;
    }

    // ── Lettered sub-point: a) text ──
    if let Some(caps) = LETTERED_RE.captures(marked) {
        return match clean(&caps[1]) {
            text if text.is_empty() => Line::Empty,
            text => Line::Sub(text),
        };
    }

    // ── Numbered: 1. text ──
    if let Some(caps) = NUMBERED_RE.captures(marked) {
        return point(&caps[1], indented);
    }

    // ── Bullet: - text / • text / * text ──
    if let Some(caps) = BULLET_RE.captures(marked) {
        return point(&caps[1], indented);
    }

    Line::Text(clean(line))
}

/// Marker text with nothing left after cleaning is a blank line.
fn point(text: &str, indented: bool) -> Line {
    match clean(text) {
        text if text.is_empty() => Line::Empty,
        text if indented => Line::Sub(text),
        text => Line::Main(text),
    }
}

/// Drop markdown bold markers and surrounding whitespace.
fn clean(text: &str) -> String {
    text.replace("**", "").trim().to_string()
}
