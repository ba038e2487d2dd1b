//! Deterministic markdown cleanup and stripping shared by converters.
//!
//! [`clean_markdown`] fixes artefacts that model- and tool-generated markdown
//! commonly carries (outer fences, CRLF, runaway blank lines, invisible
//! characters, placeholder image links). [`strip_markdown`] derives a plain
//! text rendering for `text` output.
//!
//! Rule order matters: line endings are normalised before outer fences are
//! stripped, and images are handled before links so `![a](b)` is not
//! mistaken for `[a](b)`.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\n(.*)\n```\s*$").unwrap());
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());
static RE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());
static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s+").unwrap());
static RE_BOLD_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static RE_ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*]+)\*").unwrap());
static RE_BOLD_UNDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"__([^_]+)__").unwrap());
static RE_ITALIC_UNDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b_([^_]+)_\b").unwrap());

const PLACEHOLDER_HOSTS: &[&str] = &[
    "example.com",
    "placeholder.com",
    "dummyimage.com",
    "placehold.it",
    "picsum.photos",
];

/// Normalise generated markdown. Output always ends in exactly one newline.
pub fn clean_markdown(input: &str) -> String {
    let s = input.replace("\r\n", "\n").replace('\r', "\n");
    let unfenced = RE_OUTER_FENCES.captures(s.trim()).map(|caps| caps[1].to_string());
    let s = unfenced.unwrap_or(s);
    let s = s.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
    let s = RE_BLANK_LINES.replace_all(&s, "\n\n\n").into_owned();
    let s = drop_placeholder_images(&s);
    let s = s.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'], "");

    let trimmed = s.trim_end();
    if trimmed.is_empty() {
        "\n".to_string()
    } else {
        format!("{trimmed}\n")
    }
}

/// Replace images whose URL is local or a known placeholder with an italic caption.
fn drop_placeholder_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            let url = caps[2].trim();
            let real = (url.starts_with("http://") || url.starts_with("https://"))
                && !PLACEHOLDER_HOSTS.iter().any(|h| url.contains(h));
            if real {
                caps[0].to_string()
            } else if alt.is_empty() {
                String::new()
            } else {
                format!("*{alt}*")
            }
        })
        .into_owned()
}

/// Plain-text rendering: headings, emphasis, images and links are unwrapped.
pub fn strip_markdown(markdown: &str) -> String {
    let s = RE_HEADING.replace_all(markdown, "");
    let s = RE_BOLD_STAR.replace_all(&s, "$1");
    let s = RE_ITALIC_STAR.replace_all(&s, "$1");
    let s = RE_BOLD_UNDER.replace_all(&s, "$1");
    let s = RE_ITALIC_UNDER.replace_all(&s, "$1");
    let s = RE_IMAGE.replace_all(&s, "$1");
    RE_LINK.replace_all(&s, "$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_outer_fence_and_crlf() {
        let out = clean_markdown("```markdown\r\n# Title\r\n\r\nBody\r\n```");
        assert_eq!(out, "# Title\n\nBody\n");
    }

    #[test]
    fn strips_crlf_fence_with_trailing_space_after_language() {
        let out = clean_markdown("  ```md \r\n## Page 2\r\n\r\n| a | b |\r\n```\r\n");
        assert_eq!(out, "## Page 2\n\n| a | b |\n");
        assert_eq!(clean_markdown("```\r\nplain\r\n```"), "plain\n");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean_markdown("a\n\n\n\n\n\nb"), "a\n\n\nb\n");
    }

    #[test]
    fn placeholder_images_become_captions() {
        let out = clean_markdown("![Chart of sales](chart.png) and ![x](https://cdn.org/a.png)");
        assert!(out.starts_with("*Chart of sales*"));
        assert!(out.contains("![x](https://cdn.org/a.png)"));
    }

    #[test]
    fn empty_input_is_single_newline() {
        assert_eq!(clean_markdown("   \n\n"), "\n");
    }

    #[test]
    fn invisible_characters_removed() {
        assert_eq!(clean_markdown("a\u{200B}b\u{FEFF}"), "ab\n");
    }

    #[test]
    fn strip_unwraps_formatting() {
        let md = "## Intro\nSome **bold**, *it*, __strong__ and [link](http://x.y).\n![fig](a.png)";
        assert_eq!(strip_markdown(md), "Intro\nSome bold, it, strong and link.\nfig");
    }

    #[test]
    fn strip_keeps_snake_case_identifiers() {
        assert_eq!(strip_markdown("call my_func_name now"), "call my_func_name now");
    }
}
