//! Prompt used by the vision backend.
//!
//! Kept apart from [`crate::convert::vision`] so prompt wording can change
//! without touching retry or assembly logic. Deployments may replace it
//! entirely through [`crate::config::VisionOptions::system_prompt`].

/// Instructions sent as the system message with every page image.
pub const PAGE_TO_MARKDOWN_PROMPT: &str = r#"You convert one rendered PDF page into clean GitHub-flavoured Markdown.

Content
- Transcribe every piece of text on the page, in natural reading order.
- Multi-column layouts are read column by column, left to right.
- Do not summarise, translate, or invent text.

Structure
- One # heading at most, for the page title; ## and ### for sections below it.
- Lists use - for bullets and 1. 2. 3. for numbered items, nested by indentation.
- Keep bold and italic emphasis where it is visible.
- Tables become pipe tables with a header row; fall back to HTML only when cells span rows or columns.
- Code goes in fenced blocks with a language tag when it is recognisable.
- Mathematics uses LaTeX: $...$ inline and $$...$$ for display equations.

Leave out
- Page numbers, running headers and footers.
- Purely decorative rules, borders and background art.

Output
- Markdown only. No surrounding ``` fence, no commentary, no page markers.
- Figures you cannot transcribe become an italic one-line caption."#;

/// The effective system prompt for a request.
pub fn system_prompt(custom: Option<&str>) -> &str {
    match custom {
        Some(p) if !p.trim().is_empty() => p,
        _ => PAGE_TO_MARKDOWN_PROMPT,
    }
}
