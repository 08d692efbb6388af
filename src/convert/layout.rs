//! Layout backend for `/convert-mupdf`.
//!
//! pdfium returns each page's text layer as hard-wrapped lines. This module
//! rebuilds markdown structure from those lines:
//!
//! - wrapped lines are re-flowed into paragraphs (de-hyphenating split words)
//! - bullet glyphs (`•`, `◦`, `▪`, `–`, …) become `- ` list items
//! - `1.` / `1)` lines become ordered list items
//! - short, standalone ALL-CAPS lines become `##` headings
//! - bare page numbers (`12`, `Page 3`, `4 / 10`) are dropped when they open
//!   or close the page; numbers in the body are content
//!
//! Pages are separated by a horizontal rule.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::debug;

use super::pdfium::{page_texts, PdfiumLibrary};
use super::postprocess::tidy_text;
use super::MarkdownConverter;
use crate::error::ConvertError;

/// Separator placed between non-empty pages.
pub const PAGE_BREAK: &str = "\n\n---\n\n";

const MAX_HEADING_CHARS: usize = 80;

static RE_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[•◦▪▫‣●○■□·\-\*–]\s+(\S.*)$").unwrap());
static RE_ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,3})[.)]\s+(\S.*)$").unwrap());
static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:page\s+)?\d{1,4}(?:\s*(?:/|of)\s*\d{1,4})?$").unwrap()
});

/// pdfium text layer → structured markdown.
#[derive(Debug, Clone)]
pub struct LayoutConverter {
    library: PdfiumLibrary,
}

impl LayoutConverter {
    pub fn new(library: PdfiumLibrary) -> Self {
        Self { library }
    }
}

#[async_trait]
impl MarkdownConverter for LayoutConverter {
    fn name(&self) -> &'static str {
        "layout"
    }

    async fn convert(&self, pdf_path: &Path) -> Result<String, ConvertError> {
        let pages = self
            .library
            .with_document(pdf_path, |document| page_texts(document))
            .await?;
        debug!("Layout: {} pages of text from {}", pages.len(), pdf_path.display());
        Ok(render_document(&pages))
    }
}

/// Convert every page and join the non-empty ones.
pub fn render_document(pages: &[String]) -> String {
    let rendered: Vec<String> = pages
        .iter()
        .map(|text| page_text_to_markdown(text))
        .filter(|md| !md.is_empty())
        .collect();
    tidy_text(&rendered.join(PAGE_BREAK))
}

// ── Single page ──────────────────────────────────────────────────────────

#[derive(Debug)]
enum BlockKind {
    Paragraph,
    Item(String),
}

#[derive(Debug)]
struct Block {
    kind: BlockKind,
    text: String,
    lines: usize,
}

impl Block {
    fn new(kind: BlockKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
            lines: 1,
        }
    }

    /// Append a wrapped continuation line.
    fn extend(&mut self, line: &str) {
        let rejoin_hyphen = self.text.ends_with('-')
            && self
                .text
                .chars()
                .rev()
                .nth(1)
                .is_some_and(char::is_alphabetic)
            && line.chars().next().is_some_and(char::is_lowercase);
        if rejoin_hyphen {
            self.text.pop();
        } else {
            self.text.push(' ');
        }
        self.text.push_str(line);
        self.lines += 1;
    }

    fn is_item(&self) -> bool {
        matches!(self.kind, BlockKind::Item(_))
    }

    fn render(&self) -> String {
        match &self.kind {
            BlockKind::Item(marker) => format!("{marker}{}", self.text),
            BlockKind::Paragraph if self.lines == 1 && looks_like_heading(&self.text) => {
                format!("## {}", self.text)
            }
            BlockKind::Paragraph => self.text.clone(),
        }
    }
}

fn looks_like_heading(line: &str) -> bool {
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    line.chars().count() <= MAX_HEADING_CHARS
        && letters.len() >= 2
        && letters.iter().all(|c| !c.is_lowercase())
        && !line.ends_with(['.', ',', ';', ':', '!', '?'])
}

/// Rebuild markdown structure for one page of text.
pub fn page_text_to_markdown(text: &str) -> String {
    let mut blocks: Vec<Block> = Vec::new();
    let mut current: Option<Block> = None;

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let first = lines.iter().position(|l| !l.is_empty());
    let last = lines.iter().rposition(|l| !l.is_empty());

    for (i, &line) in lines.iter().enumerate() {
        if line.is_empty() {
            blocks.extend(current.take());
            continue;
        }
        let at_edge = Some(i) == first || Some(i) == last;
        if at_edge && RE_PAGE_NUMBER.is_match(line) {
            continue;
        }
        if let Some(caps) = RE_BULLET.captures(line) {
            blocks.extend(current.take());
            current = Some(Block::new(BlockKind::Item("- ".into()), &caps[1]));
        } else if let Some(caps) = RE_ORDERED.captures(line) {
            blocks.extend(current.take());
            let marker = format!("{}. ", &caps[1]);
            current = Some(Block::new(BlockKind::Item(marker), &caps[2]));
        } else {
            match current.as_mut() {
                Some(block) => block.extend(line),
                None => current = Some(Block::new(BlockKind::Paragraph, line)),
            }
        }
    }
    blocks.extend(current);

    let mut out = String::new();
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            let tight = block.is_item() && blocks[i - 1].is_item();
            out.push_str(if tight { "\n" } else { "\n\n" });
        }
        out.push_str(&block.render());
    }
    out
}
