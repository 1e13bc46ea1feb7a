//! Inline markup for assistant answers.
//!
//! Answers are plain text with a little markdown: `*`/`-` bullets, `[label](url)`
//! links, `**bold**` and `*italic*`. Rendering never touches the stored text;
//! it is recomputed on every frame.
//!
//! Inline rules run in a fixed order: links, then bold, then italic. A rule
//! that matches keeps the text around its matches literal and hands only the
//! tail after its last match to the next rule. A rule that finds nothing hands
//! over the whole text. Bold and italic never nest.

use std::sync::LazyLock;

use regex::Regex;

static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\r?\n)+").expect("line break pattern is valid"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[*-]\s+(.*)$").expect("bullet pattern is valid"));
static TRAILING_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*:\s*$").expect("colon pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    /// Opens `url` outside the chat view.
    Link { text: String, url: String },
    Bold(String),
    Italic(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Bullet,
    Paragraph,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub kind: LineKind,
    pub segments: Vec<Segment>,
}

/// Render a whole message, one entry per non-empty run between line breaks.
pub fn render(text: &str) -> Vec<RenderedLine> {
    LINE_BREAKS.split(text).map(render_line).collect()
}

/// Render a single line, detecting a leading bullet marker.
pub fn render_line(line: &str) -> RenderedLine {
    match BULLET.captures(line) {
        Some(caps) => {
            let item = caps.get(1).map_or("", |m| m.as_str()).trim();
            let item = TRAILING_COLON.replace(item, ",");
            RenderedLine {
                kind: LineKind::Bullet,
                segments: format_inline(&item),
            }
        }
        None => RenderedLine {
            kind: LineKind::Paragraph,
            segments: format_inline(line),
        },
    }
}

/// Split one line of text into styled segments.
pub fn format_inline(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    apply_rule(text, Some(Rule::Link), &mut segments);
    segments
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    Link,
    Bold,
    Italic,
}

impl Rule {
    fn next(self) -> Option<Rule> {
        match self {
            Rule::Link => Some(Rule::Bold),
            Rule::Bold => Some(Rule::Italic),
            Rule::Italic => None,
        }
    }

    fn find(self, text: &str, from: usize) -> Option<Found> {
        match self {
            Rule::Link => find_link(text, from),
            Rule::Bold => find_delimited(text, from, "**").map(|(start, end, inner)| Found {
                start,
                end,
                segment: Segment::Bold(inner.to_string()),
            }),
            Rule::Italic => find_delimited(text, from, "*").map(|(start, end, inner)| Found {
                start,
                end,
                segment: Segment::Italic(inner.to_string()),
            }),
        }
    }
}

struct Found {
    start: usize,
    end: usize,
    segment: Segment,
}

fn apply_rule(text: &str, rule: Option<Rule>, out: &mut Vec<Segment>) {
    let Some(rule) = rule else {
        push_text(out, text);
        return;
    };

    let mut cursor = 0;
    while let Some(found) = rule.find(text, cursor) {
        push_text(out, &text[cursor..found.start]);
        out.push(found.segment);
        cursor = found.end;
    }

    // No match leaves cursor at 0, so the next rule sees the whole text.
    apply_rule(&text[cursor..], rule.next(), out);
}

fn push_text(out: &mut Vec<Segment>, text: &str) {
    if !text.is_empty() {
        out.push(Segment::Text(text.to_string()));
    }
}

/// `[label](url)` with a non-empty label free of `]` and a non-empty url free of `)`.
fn find_link(text: &str, from: usize) -> Option<Found> {
    let mut search = from;
    while let Some(open) = text[search..].find('[').map(|i| i + search) {
        let label_start = open + 1;
        if let Some(close) = text[label_start..].find(']').map(|i| i + label_start) {
            let url_start = close + 2;
            if close > label_start && text[close + 1..].starts_with('(') {
                if let Some(url_end) = text[url_start..].find(')').map(|i| i + url_start) {
                    if url_end > url_start {
                        return Some(Found {
                            start: open,
                            end: url_end + 1,
                            segment: Segment::Link {
                                text: text[label_start..close].to_string(),
                                url: text[url_start..url_end].to_string(),
                            },
                        });
                    }
                }
            }
        }
        search = label_start;
    }
    None
}

/// Leftmost `delim`..`delim` pair with non-empty content.
fn find_delimited<'a>(text: &'a str, from: usize, delim: &str) -> Option<(usize, usize, &'a str)> {
    let mut search = from;
    while let Some(open) = text[search..].find(delim).map(|i| i + search) {
        let inner = open + delim.len();
        let close = text[inner..].find(delim).map(|i| i + inner)?;
        if close > inner {
            return Some((open, close + delim.len(), &text[inner..close]));
        }
        search = open + 1;
    }
    None
}
