//! Vision backend for the marker service.
//!
//! ## Pipeline
//!
//! ```text
//! PDF ──▶ render (pdfium, blocking) ──▶ PNG/base64 ──▶ vision LLM ──▶ cleanup ──▶ markdown
//! ```
//!
//! Every page is rasterised and encoded on the blocking pool, then sent to
//! the model with bounded concurrency (`VisionOptions::concurrency`). Pages
//! come back in any order and are sorted before assembly.
//!
//! ## Provider lifetime
//!
//! Building a provider reads API keys and sets up an HTTP client, so it is
//! done once per process, on first use, behind a `tokio::sync::OnceCell`.
//! Concurrent first requests race to initialise it; exactly one wins and the
//! rest reuse its result. A failed initialisation is not cached, so fixing the
//! environment and retrying works without a restart.
//!
//! ## Retry strategy
//!
//! Rate-limit and overload errors are routine under concurrent load. Each
//! page is retried with exponential backoff (`retry_backoff_ms * 2^(n-1)`):
//! with the defaults that is 500 ms, 1 s, 2 s. A page that still fails fails
//! the whole document; no partial markdown is returned.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use super::pdfium::PdfiumLibrary;
use super::postprocess::clean_vision_output;
use super::MarkdownConverter;
use crate::config::VisionOptions;
use crate::error::ConvertError;
use crate::prompts::system_prompt;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

pub struct VisionConverter {
    library: PdfiumLibrary,
    options: VisionOptions,
    provider: OnceCell<Arc<dyn LLMProvider>>,
}

impl std::fmt::Debug for VisionConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionConverter")
            .field("options", &self.options)
            .field("provider_ready", &self.provider.initialized())
            .finish()
    }
}

impl VisionConverter {
    pub fn new(library: PdfiumLibrary, options: VisionOptions) -> Self {
        Self {
            library,
            options,
            provider: OnceCell::new(),
        }
    }

    /// Get-or-create the process-wide provider.
    async fn provider(&self) -> Result<Arc<dyn LLMProvider>, ConvertError> {
        let provider = self
            .provider
            .get_or_try_init(|| async { resolve_provider(&self.options) })
            .await?;
        Ok(Arc::clone(provider))
    }

    /// Render and encode every page on the blocking pool.
    async fn rasterise(&self, pdf_path: &Path) -> Result<Vec<(usize, ImageData)>, ConvertError> {
        let dpi = self.options.dpi;
        let max_px = self.options.max_rendered_pixels;
        self.library
            .with_document(pdf_path, move |document| {
                let mut encoded = Vec::with_capacity(document.pages().len() as usize);
                for (idx, page) in document.pages().iter().enumerate() {
                    let raster_err = |detail: String| ConvertError::RasterisationFailed {
                        page: idx + 1,
                        detail,
                    };
                    let config = PdfRenderConfig::new()
                        .set_target_width(render_width(page.width().value, dpi, max_px))
                        .set_maximum_height(max_px as i32);
                    let image = page
                        .render_with_config(&config)
                        .map_err(|e| raster_err(format!("{e:?}")))?
                        .as_image();
                    debug!(
                        "Rendered page {} → {}x{} px",
                        idx + 1,
                        image.width(),
                        image.height()
                    );
                    let data = encode_page(&image)
                        .map_err(|e| raster_err(format!("PNG encoding failed: {e}")))?;
                    encoded.push((idx, data));
                }
                Ok(encoded)
            })
            .await
    }
}

#[async_trait]
impl MarkdownConverter for VisionConverter {
    fn name(&self) -> &'static str {
        "vision"
    }

    async fn convert(&self, pdf_path: &Path) -> Result<String, ConvertError> {
        let started = Instant::now();
        let provider = self.provider().await?;

        let pages = self.rasterise(pdf_path).await?;
        let total = pages.len();
        info!(
            "Vision: {} pages rendered from {} in {}ms",
            total,
            pdf_path.display(),
            started.elapsed().as_millis()
        );
        if total == 0 {
            return Ok(String::new());
        }

        let options = Arc::new(self.options.clone());
        let mut results: Vec<(usize, Result<String, String>)> = stream::iter(pages)
            .map(|(idx, image)| {
                let provider = Arc::clone(&provider);
                let options = Arc::clone(&options);
                async move { (idx, process_page(&provider, &options, idx + 1, image).await) }
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;
        results.sort_by_key(|(idx, _)| *idx);

        let markdown = assemble_pages(collect_pages(results, self.options.max_retries)?);
        info!(
            "Vision: converted {} pages of {} in {}ms",
            total,
            pdf_path.display(),
            started.elapsed().as_millis()
        );
        Ok(markdown)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// One page through the model, with retry. Errors come back as text so the
/// caller can report every failed page at once.
async fn process_page(
    provider: &Arc<dyn LLMProvider>,
    options: &VisionOptions,
    page_num: usize,
    image: ImageData,
) -> Result<String, String> {
    let messages = vec![
        ChatMessage::system(system_prompt(options.system_prompt.as_deref())),
        ChatMessage::user_with_images("", vec![image]),
    ];
    let completion = completion_options(options);
    let mut last_err = String::from("Unknown error");

    for attempt in 0..=options.max_retries {
        if attempt > 0 {
            let delay = backoff_delay(options.retry_backoff_ms, attempt);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num,
                attempt,
                options.max_retries,
                delay.as_millis()
            );
            sleep(delay).await;
        }

        match provider.chat(&messages, Some(&completion)).await {
            Ok(response) => {
                debug!(
                    "Page {}: {} input tokens, {} output tokens",
                    page_num, response.prompt_tokens, response.completion_tokens
                );
                return Ok(response.content);
            }
            Err(e) => {
                warn!("Page {}: attempt {} failed: {}", page_num, attempt + 1, e);
                last_err = e.to_string();
            }
        }
    }
    Err(last_err)
}

/// Unwrap per-page results, already sorted by page index. Any failed page
/// fails the whole document.
fn collect_pages(
    results: Vec<(usize, Result<String, String>)>,
    retries: u32,
) -> Result<Vec<String>, ConvertError> {
    let total = results.len();
    let mut pages = Vec::with_capacity(total);
    let mut failed = 0;
    let mut first_error = None;
    for (idx, result) in results {
        match result {
            Ok(md) => pages.push(md),
            Err(e) => {
                failed += 1;
                first_error.get_or_insert_with(|| format!("page {}: {}", idx + 1, e));
            }
        }
    }
    match first_error {
        Some(first_error) => Err(ConvertError::PagesFailed {
            failed,
            total,
            retries,
            first_error,
        }),
        None => Ok(pages),
    }
}

/// Pixel width for a page `width_pt` points wide at `dpi`, capped at `max_px`.
fn render_width(width_pt: f32, dpi: u32, max_px: u32) -> i32 {
    let px = (width_pt / 72.0 * dpi as f32).round() as i64;
    px.clamp(1, max_px.max(1) as i64) as i32
}

fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(base_ms.saturating_mul(factor))
}

fn completion_options(options: &VisionOptions) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(options.temperature),
        max_tokens: Some(options.max_tokens),
        ..Default::default()
    }
}

/// Lossless PNG, base64, with `detail: high` so small print survives tiling.
fn encode_page(image: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(ImageData::new(STANDARD.encode(&buf), "image/png").with_detail("high"))
}

/// Clean each page and join them with a blank line.
fn assemble_pages(pages: impl IntoIterator<Item = String>) -> String {
    let cleaned: Vec<String> = pages
        .into_iter()
        .map(|raw| clean_vision_output(&raw))
        .filter(|md| !md.is_empty())
        .collect();
    let joined = cleaned
        .iter()
        .map(|md| md.trim_end())
        .collect::<Vec<_>>()
        .join("\n\n");
    if joined.is_empty() {
        joined
    } else {
        joined + "\n"
    }
}

fn provider_error(provider: &str, hint: impl std::fmt::Display) -> ConvertError {
    ConvertError::ProviderNotConfigured {
        provider: provider.to_string(),
        hint: hint.to_string(),
    }
}

/// Pick a provider, most specific configuration first:
///
/// 1. `provider_name` (+ `model`, default [`DEFAULT_MODEL`])
/// 2. `EDGEQUAKE_LLM_PROVIDER` and `EDGEQUAKE_MODEL`, both set
/// 3. `OPENAI_API_KEY` present → OpenAI
/// 4. whatever `ProviderFactory::from_env` detects
fn resolve_provider(options: &VisionOptions) -> Result<Arc<dyn LLMProvider>, ConvertError> {
    let create = |name: &str, model: &str| {
        info!("Vision provider: {} / {}", name, model);
        ProviderFactory::create_llm_provider(name, model).map_err(|e| provider_error(name, e))
    };

    if let Some(ref name) = options.provider_name {
        return create(name, options.model.as_deref().unwrap_or(DEFAULT_MODEL));
    }

    if let (Ok(name), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !name.is_empty() && !model.is_empty() {
            return create(&name, &model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create("openai", options.model.as_deref().unwrap_or(DEFAULT_MODEL));
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| {
        provider_error(
            "auto",
            format!(
                "no provider detected from the environment. \
Set OPENAI_API_KEY or ANTHROPIC_API_KEY, or pass --provider. ({e})"
            ),
        )
    })?;
    Ok(llm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::{LLMResponse, LlmError};
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then answers with a fixed page.
    struct FlakyProvider {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyProvider {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LLMProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        fn model(&self) -> &str {
            "flaky-model"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(LlmError::RateLimited(format!("call {}", n + 1)))
            } else {
                Ok(LLMResponse::new("# Page", "flaky-model"))
            }
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete("").await
        }
    }

    fn fast_retries(max_retries: u32) -> VisionOptions {
        VisionOptions {
            max_retries,
            retry_backoff_ms: 0,
            ..Default::default()
        }
    }

    fn blank_image() -> ImageData {
        ImageData::new("", "image/png")
    }

    #[tokio::test]
    async fn page_succeeds_on_last_retry() {
        let flaky = FlakyProvider::new(3);
        let provider: Arc<dyn LLMProvider> = flaky.clone();
        let md = process_page(&provider, &fast_retries(3), 1, blank_image())
            .await
            .unwrap();
        assert_eq!(md, "# Page");
        assert_eq!(flaky.calls(), 4);
    }

    #[tokio::test]
    async fn page_gives_up_after_max_retries() {
        let flaky = FlakyProvider::new(usize::MAX);
        let provider: Arc<dyn LLMProvider> = flaky.clone();
        let err = process_page(&provider, &fast_retries(2), 1, blank_image())
            .await
            .unwrap_err();
        assert_eq!(flaky.calls(), 3, "one attempt plus two retries");
        assert!(err.contains("call 3"), "last error is reported, got: {err}");
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let flaky = FlakyProvider::new(1);
        let provider: Arc<dyn LLMProvider> = flaky.clone();
        assert!(process_page(&provider, &fast_retries(0), 1, blank_image())
            .await
            .is_err());
        assert_eq!(flaky.calls(), 1);
    }

    #[test]
    fn one_failed_page_fails_the_document() {
        let results = vec![
            (0, Ok("# One".to_string())),
            (1, Err("rate limited".to_string())),
            (2, Ok("# Three".to_string())),
        ];
        match collect_pages(results, 3) {
            Err(ConvertError::PagesFailed {
                failed,
                total,
                retries,
                first_error,
            }) => {
                assert_eq!((failed, total, retries), (1, 3, 3));
                assert_eq!(first_error, "page 2: rate limited");
            }
            other => panic!("expected PagesFailed, got {other:?}"),
        }
    }

    #[test]
    fn first_error_names_lowest_page() {
        let results = vec![
            (0, Ok("ok".to_string())),
            (3, Err("timeout".to_string())),
            (5, Err("overloaded".to_string())),
        ];
        let err = collect_pages(results, 1).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("2 of 3 pages"), "got: {msg}");
        assert!(msg.contains("page 4: timeout"), "got: {msg}");
    }

    #[test]
    fn all_pages_ok_keeps_order() {
        let results = vec![(0, Ok("a".to_string())), (1, Ok("b".to_string()))];
        assert_eq!(collect_pages(results, 3).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(500, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(500, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(500, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(u64::MAX, 40), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn width_follows_dpi_until_cap() {
        // US Letter is 612 pt wide.
        assert_eq!(render_width(612.0, 72, 2000), 612);
        assert_eq!(render_width(612.0, 150, 2000), 1275);
        assert_eq!(render_width(612.0, 400, 2000), 2000);
        assert_eq!(render_width(0.0, 150, 2000), 1);
    }

    #[test]
    fn options_carry_tuning() {
        let opts = completion_options(&VisionOptions::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }

    #[test]
    fn encode_produces_png_base64() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255])));
        let data = encode_page(&img).unwrap();
        assert_eq!(data.mime_type, "image/png");
        let bytes = STANDARD.decode(&data.data).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn pages_are_cleaned_and_joined() {
        let md = assemble_pages(vec![
            "```markdown\n# One\n```".to_string(),
            "   ".to_string(),
            "Two\r\n".to_string(),
        ]);
        assert_eq!(md, "# One\n\nTwo\n");
    }

    #[test]
    fn no_pages_is_empty_markdown() {
        assert_eq!(assemble_pages(Vec::new()), "");
    }
}
