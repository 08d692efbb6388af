//! Deterministic markdown cleanup.
//!
//! Two entry points share one set of line-level passes:
//!
//! * [`tidy_text`] normalises text pulled from pdfium's text layer: line
//!   endings, trailing whitespace, invisible characters, runs of blank lines
//!   and the final newline. Used by the layout and plain-text backends.
//! * [`clean_vision_output`] additionally repairs the habits of vision models:
//!   wrapping the answer in a ```` ```markdown ```` fence, cramming headings
//!   against the previous paragraph, malformed GFM tables, and invented image
//!   links.
//!
//! The passes are order-sensitive. Fences are stripped before anything
//! inspects lines, and blank runs are collapsed last because heading spacing
//! and image removal can leave extra empty lines behind.

use once_cell::sync::Lazy;
use regex::Regex;

/// Cleanup for text-layer output.
pub fn tidy_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_invisible(&s);
    let s = trim_line_ends(&s);
    let s = collapse_blank_runs(&s);
    with_final_newline(&s)
}

/// Cleanup for one page of vision-model output.
pub fn clean_vision_output(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = strip_invisible(&s);
    let s = trim_line_ends(&s);
    let s = space_headings(&s);
    let s = repair_tables(&s);
    let s = drop_placeholder_images(&s);
    let s = collapse_blank_runs(&s);
    with_final_newline(&s)
}

// ── Text normalisation ───────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}',
];

fn strip_invisible(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

fn trim_line_ends(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, line) in input.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.trim_end());
    }
    out
}

/// At most one empty line between blocks.
static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_runs(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

fn with_final_newline(input: &str) -> String {
    let body = input.trim_matches('\n').trim_end();
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

// ── Vision model repairs ─────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\A```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```\s*\z").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6} \S").unwrap());

/// Insert a blank line before any heading that directly follows text.
fn space_headings(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_code = false;
    for line in input.split('\n') {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        }
        if !in_code && RE_HEADING.is_match(line) {
            if let Some(prev) = out.last() {
                if !prev.is_empty() {
                    out.push("");
                }
            }
        }
        out.push(line);
    }
    out.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_delimiter_row(line: &str) -> bool {
    let t = line.trim();
    is_table_row(t) && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn column_count(row: &str) -> usize {
    row.trim().trim_matches('|').split('|').count()
}

/// Each table gets exactly one delimiter row, directly under its header.
fn repair_tables(input: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut row_in_table = 0usize;
    for line in input.split('\n') {
        if !is_table_row(line) {
            row_in_table = 0;
            out.push(line.to_string());
            continue;
        }
        row_in_table += 1;
        match (row_in_table, is_delimiter_row(line)) {
            (1, true) => {
                // A delimiter with no header above it is noise.
                row_in_table = 0;
            }
            (1, false) | (2, true) => out.push(line.to_string()),
            (2, false) => {
                let header = out.last().map(|h| column_count(h)).unwrap_or(1);
                out.push(format!("|{}", " --- |".repeat(header)));
                out.push(line.to_string());
                row_in_table = 3;
            }
            (_, true) => {}
            (_, false) => out.push(line.to_string()),
        }
    }
    out.join("\n")
}

static RE_IMAGE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

const PLACEHOLDER_HOSTS: [&str; 6] = [
    "example.com",
    "placeholder.com",
    "placehold.it",
    "dummyimage.com",
    "lorempixel.com",
    "picsum.photos",
];

fn is_placeholder_target(url: &str) -> bool {
    let url = url.trim();
    let absolute = url.starts_with("http://") || url.starts_with("https://");
    !absolute || PLACEHOLDER_HOSTS.iter().any(|host| url.contains(host))
}

/// The model cannot link to page images it never received, so relative or
/// placeholder targets are replaced by their alt text.
fn drop_placeholder_images(input: &str) -> String {
    RE_IMAGE_LINK
        .replace_all(input, |caps: &regex::Captures<'_>| {
            if !is_placeholder_target(&caps[2]) {
                return caps[0].to_string();
            }
            match caps[1].trim() {
                "" => String::new(),
                alt => format!("*{alt}*"),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tidy_normalises_text_layer() {
        let raw = "Intro\u{200B}  \r\n\r\n\r\n\r\nBody\u{00AD}text\r\n\r\n";
        assert_eq!(tidy_text(raw), "Intro\n\nBodytext\n");
    }

    #[test]
    fn tidy_of_blank_input_is_empty() {
        assert_eq!(tidy_text(" \n\n \r\n"), "");
    }

    #[test]
    fn outer_fence_is_removed() {
        assert_eq!(strip_outer_fence("```markdown\n# A\nb\n```"), "# A\nb");
        assert_eq!(strip_outer_fence("```\n# A\n```\n"), "# A");
    }

    #[test]
    fn inner_code_blocks_survive() {
        let md = "Text\n\n```rust\nfn main() {}\n```\n\nMore";
        assert_eq!(strip_outer_fence(md), md);
    }

    #[test]
    fn heading_gets_breathing_room() {
        assert_eq!(space_headings("para\n## Title\nbody"), "para\n\n## Title\nbody");
        assert_eq!(space_headings("# First\nbody"), "# First\nbody");
    }

    #[test]
    fn hash_inside_code_is_not_a_heading() {
        let md = "```sh\necho hi\n# comment\n```";
        assert_eq!(space_headings(md), md);
    }

    #[test]
    fn missing_delimiter_is_inserted() {
        let fixed = repair_tables("| A | B |\n| 1 | 2 |\n| 3 | 4 |");
        assert_eq!(fixed, "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |");
    }

    #[test]
    fn body_delimiters_are_dropped() {
        let fixed = repair_tables("| A | B |\n| --- | --- |\n| 1 | 2 |\n|---|---|\n| 3 | 4 |");
        assert_eq!(fixed, "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |");
    }

    #[test]
    fn well_formed_table_is_untouched() {
        let table = "| H | I |\n|:--|--:|\n| a | b |\n\nafter";
        assert_eq!(repair_tables(table), table);
    }

    #[test]
    fn placeholder_images_become_captions() {
        assert_eq!(drop_placeholder_images("![Chart](chart.png)"), "*Chart*");
        assert_eq!(
            drop_placeholder_images("![](https://example.com/x.png)"),
            ""
        );
        let real = "![Fig 1](https://arxiv.org/fig1.png)";
        assert_eq!(drop_placeholder_images(real), real);
    }

    #[test]
    fn vision_cleanup_end_to_end() {
        let raw = "```markdown\n# Title\r\nIntro   \n## Section\n\n\n\n| A | B |\n| 1 | 2 |\n![logo](logo.png)\n```";
        let out = clean_vision_output(raw);
        assert_eq!(
            out,
            "# Title\nIntro\n\n## Section\n\n| A | B |\n| --- | --- |\n| 1 | 2 |\n*logo*\n"
        );
    }
}
