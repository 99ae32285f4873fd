//! Streaming conversion API: emit pages as they are ready.
//!
//! Unlike the eager [`crate::convert::convert`] which returns only after
//! all pages finish, [`convert_stream`] yields one item per selected page.
//! Up to `config.concurrency` pages are processed in parallel, but items
//! are always yielded in page order: a slow page holds back the pages
//! after it rather than letting them overtake it.

use crate::config::ConversionConfig;
use crate::convert::{process_page_blocking, select_pages};
use crate::error::{HocrError, PageError};
use crate::output::PageResult;
use crate::pipeline::markup::{parse_document, ParseOptions};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageResult, PageError>> + Send>>;

/// Convert hOCR markup, streaming page results in page order.
///
/// # Returns
/// - `Ok(PageStream)` — a stream of `Result<PageResult, PageError>`
/// - `Err(HocrError)` — fatal error (the page selection matches no page)
///
/// # Example
/// ```rust,no_run
/// use hocr_djvused::{convert_stream, ConversionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let markup = std::fs::read_to_string("book.hocr")?;
/// let config = ConversionConfig::default();
/// let mut stream = convert_stream(markup, &config).await?;
/// while let Some(page) = stream.next().await {
///     match page {
///         Ok(p) => println!("{}", p.form),
///         Err(e) => eprintln!("Error: {e}"),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert_stream(
    markup: impl Into<String>,
    config: &ConversionConfig,
) -> Result<PageStream, HocrError> {
    let markup = markup.into();
    info!("Starting streaming conversion: {} bytes of markup", markup.len());

    // ── Parse markup into pages ──────────────────────────────────────────
    let options = ParseOptions::from_config(config);
    let parsed = tokio::task::spawn_blocking(move || parse_document(&markup, &options))
        .await
        .map_err(|e| HocrError::Internal(format!("Markup parser task failed: {e}")))?;

    // ── Select pages ─────────────────────────────────────────────────────
    let selected = select_pages(parsed, &config.pages)?;
    let total_pages = selected.len();

    // ── Build the stream ─────────────────────────────────────────────────
    let concurrency = config.concurrency.max(1);
    let config_clone = config.clone();
    let s = stream::iter(selected.into_iter().map(move |nodes| {
        let cfg = config_clone.clone();
        async move {
            let mut result = process_page_blocking(nodes, cfg, total_pages).await;
            match result.error.take() {
                None => Ok(result),
                Some(err) => Err(err),
            }
        }
    }))
    .buffered(concurrency);

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(n: usize) -> String {
        let mut markup = String::from("<html><body>");
        for i in 0..n {
            markup.push_str(&format!(
                r#"<div class="ocr_page" title="bbox 0 0 100 20"><span class="ocr_line" title="bbox 0 0 100 20"><span class="ocrx_word" title="bbox 0 0 40 20">p{i}</span></span></div>"#
            ));
        }
        markup.push_str("</body></html>");
        markup
    }

    #[tokio::test]
    async fn stream_yields_pages_in_order() {
        let config = ConversionConfig::builder().concurrency(8).build().unwrap();
        let results: Vec<_> = convert_stream(pages(20), &config)
            .await
            .unwrap()
            .collect()
            .await;
        let nums: Vec<usize> = results
            .iter()
            .map(|r| r.as_ref().unwrap().page_num)
            .collect();
        assert_eq!(nums, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn stream_reports_failed_page() {
        let markup = r#"<div class="ocr_page" title="bbox 0 0 1 1"></div>
            <div class="ocr_page" title="bbox x 0 1 1"></div>"#;
        let results: Vec<_> = convert_stream(markup, &ConversionConfig::default())
            .await
            .unwrap()
            .collect()
            .await;
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(PageError::Parse { page: 2, .. })));
    }
}
