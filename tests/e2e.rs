//! End-to-end tests for pdf2md-server against real PDF files and a real
//! pdfium library.
//!
//! The PDFs live in `./test_cases/`. Tests are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested; the vision test additionally needs an LLM API key.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_metadata -- --nocapture

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pdf2md_server::convert::{
    LayoutConverter, PdfiumLibrary, PdfiumMetadataExtractor, PlainTextConverter, VisionConverter,
};
use pdf2md_server::{
    create_router, AppState, ConvertError, MarkdownConverter, MetadataExtractor, ServiceConfig,
    ServiceKind, VisionOptions,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tower::ServiceExt;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn library() -> PdfiumLibrary {
    PdfiumLibrary::new(std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from))
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Basic shape checks shared by every markdown backend.
fn assert_markdown_shape(md: &str, context: &str) {
    assert!(!md.trim().is_empty(), "[{context}] Markdown is empty");
    assert!(md.ends_with('\n'), "[{context}] Markdown must end with a newline");
    assert!(
        !md.contains("\n\n\n"),
        "[{context}] Output has more than one consecutive blank line"
    );
    assert!(
        !md.contains('\r'),
        "[{context}] Output still has carriage returns"
    );
    println!("[{context}] ✓  {} bytes", md.len());
}

fn multipart_upload(path: &Path) -> (String, Vec<u8>) {
    let boundary = "pdf2md-e2e";
    let name = path.file_name().unwrap().to_string_lossy();
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
Content-Type: application/pdf\r\n\r\n"
    )
    .into_bytes();
    body.extend(std::fs::read(path).unwrap());
    body.extend(format!("\r\n--{boundary}--\r\n").into_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

// ── Metadata (no LLM) ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_metadata_arxiv_paper() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));

    let meta = PdfiumMetadataExtractor::new(library())
        .extract(&path)
        .await
        .expect("metadata extraction should succeed");

    assert_eq!(meta.page_count, 15, "Attention paper should have 15 pages");
    assert!(meta.format.starts_with("PDF"), "format: {}", meta.format);
    println!("Metadata: {:?}", meta);
}

#[tokio::test]
async fn test_metadata_irs_form() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));

    let meta = PdfiumMetadataExtractor::new(library())
        .extract(&path)
        .await
        .expect("metadata extraction should succeed");

    assert_eq!(meta.page_count, 2, "IRS form should have 2 pages");
    assert!(meta.title.contains("1040"), "Title should mention 1040");
}

#[tokio::test]
async fn test_metadata_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let err = PdfiumMetadataExtractor::new(library())
        .extract(Path::new("/definitely/not/a/real/file.pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::FileNotFound { .. }), "got: {err:?}");
}

#[tokio::test]
async fn test_corrupt_pdf_is_an_error() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.pdf");
    std::fs::write(&path, b"this is not a pdf").unwrap();

    let err = LayoutConverter::new(library()).convert(&path).await.unwrap_err();
    assert!(matches!(err, ConvertError::CorruptPdf { .. }), "got: {err:?}");
}

// ── Text backends (no LLM) ───────────────────────────────────────────────────

#[tokio::test]
async fn test_layout_arxiv_paper() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("attention_is_all_you_need.pdf"));

    let md = LayoutConverter::new(library())
        .convert(&path)
        .await
        .expect("layout conversion should succeed");

    assert_markdown_shape(&md, "layout/arxiv");
    assert!(md.contains("Attention"), "Title text should survive");
    assert!(md.contains("\n---\n"), "Pages should be separated by a rule");
}

#[tokio::test]
async fn test_plain_text_irs_form() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));

    let md = PlainTextConverter::new(library())
        .convert(&path)
        .await
        .expect("text conversion should succeed");

    assert_markdown_shape(&md, "text/irs");
    assert!(md.contains("1040"));
}

// ── Full HTTP round trip (no LLM) ────────────────────────────────────────────

#[tokio::test]
async fn test_http_extract_metadata() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));
    let temp = tempfile::tempdir().unwrap();

    let mut builder = ServiceConfig::builder(ServiceKind::DocumentConverter)
        .api_key("e2e-key")
        .temp_dir(temp.path());
    if let Some(dir) = std::env::var_os("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_lib_path(dir);
    }
    let app = create_router(AppState::from_config(&builder.build().unwrap()));

    let (content_type, body) = multipart_upload(&path);
    let request = Request::builder()
        .method("POST")
        .uri("/extract-metadata")
        .header("x-api-key", "e2e-key")
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["filename"], "irs_form_1040.pdf");
    assert_eq!(json["metadata"]["pageCount"], 2);
    assert!(
        std::fs::read_dir(temp.path()).unwrap().next().is_none(),
        "temp upload must be removed"
    );
}

// ── Vision backend (needs LLM API) ───────────────────────────────────────────

#[tokio::test]
async fn test_vision_irs_form() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("irs_form_1040.pdf"));
    if std::env::var("OPENAI_API_KEY").is_err() && std::env::var("ANTHROPIC_API_KEY").is_err() {
        println!("SKIP: no LLM API key in the environment");
        return;
    }

    let options = VisionOptions {
        max_retries: 2,
        ..Default::default()
    };
    let md = VisionConverter::new(library(), options)
        .convert(&path)
        .await
        .expect("vision conversion should succeed");

    assert_markdown_shape(&md, "vision/irs");
    assert!(
        !md.lines().next().unwrap_or("").starts_with("```"),
        "Output must not start with a code fence"
    );
    assert!(md.contains("1040"));
}
