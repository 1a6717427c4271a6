//! Message body formatting.
//!
//! Converts the HTML bodies sources hand out into the markdown dialect chat
//! services render, and trims long bodies to a destination's length limit.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};
use unicode_segmentation::UnicodeSegmentation;

static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Turns a raw item body into message text.
pub trait Formatter: Send + Sync {
    fn format(&self, html: &str) -> String;
}

/// HTML to chat markdown.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format(&self, html: &str) -> String {
        html_to_markdown(html)
    }
}

/// Convert an HTML fragment to chat markdown.
pub fn html_to_markdown(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    render_children(fragment.root_element(), &mut out);
    tidy(&out)
}

fn render_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&WHITESPACE.replace_all(text, " ")),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    render_element(el, out);
                }
            }
            _ => {}
        }
    }
}

fn render_inner(element: ElementRef<'_>) -> String {
    let mut inner = String::new();
    render_children(element, &mut inner);
    inner
}

fn wrap(element: ElementRef<'_>, marker: &str, out: &mut String) {
    let inner = render_inner(element);
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        out.push_str(&inner);
        return;
    }
    out.push_str(marker);
    out.push_str(trimmed);
    out.push_str(marker);
}

fn render_element(element: ElementRef<'_>, out: &mut String) {
    let el = element.value();
    match el.name() {
        "br" => out.push('\n'),
        "hr" => out.push_str("\n---\n"),
        "script" | "style" => {}
        "b" | "strong" => wrap(element, "**", out),
        "i" | "em" => wrap(element, "*", out),
        "u" => wrap(element, "__", out),
        "s" | "strike" | "del" => wrap(element, "~~", out),
        "code" | "tt" => wrap(element, "`", out),
        "span" if el.classes().any(|c| c == "bb_spoiler") => wrap(element, "||", out),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            out.push('\n');
            wrap(element, "**", out);
            out.push('\n');
        }
        "pre" => {
            let text: String = element.text().collect();
            out.push_str("\n```\n");
            out.push_str(text.trim_matches('\n'));
            out.push_str("\n```\n");
        }
        "blockquote" => {
            let quoted = tidy(&render_inner(element));
            out.push('\n');
            for line in quoted.lines() {
                out.push_str("> ");
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }
        "ul" | "ol" => {
            let ordered = el.name() == "ol";
            out.push('\n');
            let items = element
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|child| child.value().name() == "li");
            for (index, item) in items.enumerate() {
                if ordered {
                    out.push_str(&format!("{}. ", index + 1));
                } else {
                    out.push_str("- ");
                }
                out.push_str(render_inner(item).trim());
                out.push('\n');
            }
        }
        "li" => {
            out.push_str("\n- ");
            render_children(element, out);
        }
        "p" | "div" => {
            out.push('\n');
            render_children(element, out);
            out.push('\n');
        }
        "a" => {
            let text = render_inner(element);
            let text = text.trim();
            match el.attr("href").map(unwrap_link_filter) {
                Some(href) if text.is_empty() || text == href => out.push_str(&href),
                Some(href) => out.push_str(&format!("[{text}]({href})")),
                None => out.push_str(text),
            }
        }
        "img" => {
            if let Some(alt) = el.attr("alt").filter(|a| !a.trim().is_empty()) {
                out.push_str(alt.trim());
            }
        }
        _ => render_children(element, out),
    }
}

/// Strip the community site's outbound link redirect.
pub fn unwrap_link_filter(href: &str) -> String {
    if let Ok(parsed) = url::Url::parse(href) {
        if parsed.host_str() == Some("steamcommunity.com")
            && parsed.path().starts_with("/linkfilter")
        {
            if let Some((_, target)) = parsed
                .query_pairs()
                .find(|(key, _)| key == "url" || key == "u")
            {
                return target.into_owned();
            }
        }
    }
    href.to_string()
}

fn tidy(text: &str) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    BLANK_RUNS.replace_all(&joined, "\n\n").trim().to_string()
}

/// Limit `text` to `max_len` characters.
///
/// Longer text is cut at the last line break that fits and gets a footer
/// linking to `read_more_url`. Without a line break the cut falls on the last
/// grapheme boundary that fits. The result never exceeds `max_len`.
pub fn truncate(text: &str, max_len: usize, read_more_url: &str) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }

    let footer = format!("\n\n[Read more]({read_more_url})");
    let footer_len = footer.chars().count();
    if footer_len >= max_len {
        return text[..fitting_prefix(text, max_len)].to_string();
    }

    let cut = fitting_prefix(text, max_len - footer_len);
    let head = &text[..cut];
    let head = match head.rfind('\n') {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };

    let mut result = head.trim_end().to_string();
    result.push_str(&footer);
    result
}

/// Byte length of the longest grapheme-aligned prefix of at most `budget` chars.
fn fitting_prefix(text: &str, budget: usize) -> usize {
    let mut chars = 0;
    let mut end = 0;
    for (offset, grapheme) in text.grapheme_indices(true) {
        let n = grapheme.chars().count();
        if chars + n > budget {
            break;
        }
        chars += n;
        end = offset + grapheme.len();
    }
    end
}
