use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::models::ProviderId;

/// Bullet markers the models actually emit: hyphen, en/em dash, bullet dot,
/// asterisk.
const BULLET_CHARS: [char; 5] = ['-', '–', '—', '•', '*'];

/// Spelled-out numbers replaced with digits in display text. Capped at
/// twenty; larger words pass through unchanged.
const NUMBER_WORDS: &[(&str, &str)] = &[
    ("zero", "0"),
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("ten", "10"),
    ("eleven", "11"),
    ("twelve", "12"),
    ("thirteen", "13"),
    ("fourteen", "14"),
    ("fifteen", "15"),
    ("sixteen", "16"),
    ("seventeen", "17"),
    ("eighteen", "18"),
    ("nineteen", "19"),
    ("twenty", "20"),
];

fn number_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let words: Vec<&str> = NUMBER_WORDS.iter().map(|(w, _)| *w).collect();
        Regex::new(&format!(r"(?i)\b({})\b", words.join("|"))).unwrap()
    })
}

fn bold_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap())
}

fn stray_bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<p>[-–—•*]\s*(.*?)</p>").unwrap())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Inline cleanup for one line of plain text: HTML escaping, number words to
/// digits, `**bold**` spans.
fn format_inline(text: &str) -> String {
    let escaped = escape_html(text);
    let numbered = number_word_re().replace_all(&escaped, |caps: &Captures| {
        let word = caps[1].to_lowercase();
        NUMBER_WORDS
            .iter()
            .find(|(w, _)| *w == word)
            .map(|(_, d)| d.to_string())
            .unwrap_or_else(|| caps[1].to_string())
    });
    bold_re()
        .replace_all(&numbered, "<strong>$1</strong>")
        .into_owned()
}

fn is_bullet(line: &str) -> bool {
    let trimmed = line.trim_start();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(c) if BULLET_CHARS.contains(&c) => matches!(chars.next(), Some(' ') | Some('\t')),
        _ => false,
    }
}

fn bullet_text(line: &str) -> &str {
    let trimmed = line.trim_start();
    trimmed[trimmed
        .char_indices()
        .nth(1)
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len())..]
        .trim_start()
}

/// Provider-specific cleanup applied to the raw reply before the shared
/// pipeline. Keyed so new backends slot in without touching the pipeline.
type QuirkFn = fn(&str) -> String;

const QUIRKS: &[(ProviderId, QuirkFn)] = &[(ProviderId::Gemini, strip_enclosing_fence)];

/// Gemini wraps whole replies in a markdown code fence often enough to
/// matter; unwrap it so the fence does not render literally.
fn strip_enclosing_fence(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(inner) = rest.strip_suffix("```") {
            // Drop an optional language tag on the opening fence line.
            let inner = inner
                .split_once('\n')
                .map(|(first, body)| {
                    if first.trim().chars().all(|c| c.is_ascii_alphanumeric()) {
                        body
                    } else {
                        inner
                    }
                })
                .unwrap_or(inner);
            return inner.trim().to_string();
        }
    }
    text.to_string()
}

/// Turns model-flavored markdown into the HTML fragment the results panel
/// shows. Line-based: any line already starting with `<` passes through
/// untouched, which also makes the whole transform idempotent.
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, provider: ProviderId, markdown: &str) -> String {
        let cleaned = QUIRKS
            .iter()
            .find(|(id, _)| *id == provider)
            .map(|(_, quirk)| quirk(markdown))
            .unwrap_or_else(|| markdown.to_string());

        let mut out: Vec<String> = Vec::new();
        let mut in_list = false;

        for line in cleaned.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                if in_list {
                    out.push("</ul>".to_string());
                    in_list = false;
                }
                continue;
            }

            // Already-rendered HTML passes through verbatim.
            if trimmed.starts_with('<') {
                if in_list {
                    out.push("</ul>".to_string());
                    in_list = false;
                }
                out.push(trimmed.to_string());
                continue;
            }

            if let Some(text) = trimmed.strip_prefix("### ") {
                if in_list {
                    out.push("</ul>".to_string());
                    in_list = false;
                }
                out.push(format!("<h3>{}</h3>", format_inline(text)));
                continue;
            }
            if let Some(text) = trimmed.strip_prefix("## ") {
                if in_list {
                    out.push("</ul>".to_string());
                    in_list = false;
                }
                out.push(format!("<h2>{}</h2>", format_inline(text)));
                continue;
            }

            if is_bullet(trimmed) {
                if !in_list {
                    out.push("<ul>".to_string());
                    in_list = true;
                }
                out.push(format!("<li>{}</li>", format_inline(bullet_text(trimmed))));
                continue;
            }

            // Inside a list, a plain line is a wrapped continuation of the
            // previous item.
            if in_list {
                if let Some(last) = out.last_mut() {
                    if let Some(body) = last.strip_suffix("</li>") {
                        *last = format!("{} {}</li>", body, format_inline(trimmed));
                        continue;
                    }
                }
            }

            out.push(format!("<p>{}</p>", format_inline(trimmed)));
        }

        if in_list {
            out.push("</ul>".to_string());
        }

        let html = out.join("\n");
        // A bullet that survived inside a paragraph becomes its own list.
        stray_bullet_re()
            .replace_all(&html, "<ul><li>$1</li></ul>")
            .into_owned()
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}
