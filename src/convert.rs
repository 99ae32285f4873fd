//! Eager (full-document) conversion entry points.
//!
//! This module provides the simpler API: wait for all pages, then return.
//! It collects every [`PageResult`] into memory and assembles the final
//! djvused script before returning. Use [`crate::stream::convert_stream`]
//! instead to receive pages progressively, or [`convert_to_writer`] to
//! stream the script into a sink one page at a time.

use crate::config::{ConversionConfig, PageSelection};
use crate::error::{HocrError, PageError};
use crate::output::{ConversionOutput, ConversionStats, PageResult};
use crate::pipeline::input::{self, InputSource};
use crate::pipeline::markup::{parse_document, PageNodes, ParseOptions};
use crate::pipeline::sexpr::{write_page, SerializeOptions};
use crate::pipeline::transform::transform_tree;
use crate::pipeline::tree::build_page;
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert hOCR markup to a djvused script.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `markup` — the complete hOCR document
/// * `config` — Conversion configuration
///
/// # Returns
/// `Ok(ConversionOutput)` on success, even if some pages failed
/// (check `output.stats.failed_pages`).
///
/// # Errors
/// Returns `Err(HocrError)` only for fatal errors:
/// - The page selection matches no page
/// - All selected pages failed and no output was produced
pub async fn convert(
    markup: impl Into<String>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, HocrError> {
    let total_start = Instant::now();
    let markup = markup.into();
    info!("Starting conversion: {} bytes of markup", markup.len());

    // ── Step 1: Parse markup into pages ──────────────────────────────────
    let options = ParseOptions::from_config(config);
    let parsed = tokio::task::spawn_blocking(move || parse_document(&markup, &options))
        .await
        .map_err(|e| HocrError::Internal(format!("Markup parser task failed: {e}")))?;
    let total_pages = parsed.len();
    info!("hOCR document has {} pages", total_pages);

    // ── Step 2: Select pages ─────────────────────────────────────────────
    let selected = select_pages(parsed, &config.pages)?;
    let selected_count = selected.len();
    debug!("Selected {} pages for conversion", selected_count);

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(selected_count);
    }

    // ── Step 3: Build, transform and serialise pages ─────────────────────
    let pages = process_concurrent(selected, config).await;

    // ── Step 4: Assemble the script ──────────────────────────────────────
    let script = assemble_script(&pages, config);

    // ── Step 5: Compute stats ────────────────────────────────────────────
    let mut stats = compute_stats(&pages, total_pages);
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    if stats.processed_pages == 0 {
        return Err(all_failed(&pages));
    }

    info!(
        "Conversion complete: {}/{} pages, {} zones, {}ms total",
        stats.processed_pages, selected_count, stats.total_zones, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(selected_count, stats.processed_pages);
    }

    Ok(ConversionOutput {
        script,
        pages,
        stats,
    })
}

/// Read markup from a file (`-` for standard input) and convert it.
pub async fn convert_file(
    input: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, HocrError> {
    let source = InputSource::from_arg(input.as_ref());
    let markup = input::read_markup(&source).await?;
    convert(markup, config).await
}

/// Convert a file and write the script directly to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    input: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, HocrError> {
    let output = convert_file(input, config).await?;
    let path = output_path.as_ref().to_path_buf();
    let script = output.script;

    let target = path.clone();
    tokio::task::spawn_blocking(move || write_atomic(&target, script.as_bytes()))
        .await
        .map_err(|e| HocrError::Internal(format!("Output writer task failed: {e}")))?
        .map_err(|e| HocrError::OutputWriteFailed { path, source: e })?;

    Ok(output.stats)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    markup: impl Into<String>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, HocrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| HocrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(markup, config))
}

/// Convert sequentially on the calling thread, writing each page's block
/// of the script to `sink` as soon as it is ready.
///
/// One scratch buffer is reused across pages. A page that fails writes
/// nothing; later pages are unaffected. `config.concurrency` is ignored.
pub fn convert_to_writer<W: Write + ?Sized>(
    markup: &str,
    config: &ConversionConfig,
    sink: &mut W,
) -> Result<ConversionStats, HocrError> {
    let total_start = Instant::now();
    let parsed = parse_document(markup, &ParseOptions::from_config(config));
    let total_pages = parsed.len();
    let selected = select_pages(parsed, &config.pages)?;
    let selected_count = selected.len();
    let sink_err = |e: std::io::Error| HocrError::OutputWriteFailed {
        path: PathBuf::from("<writer>"),
        source: e,
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(selected_count);
    }

    let mut scratch = Vec::new();
    let mut results = Vec::with_capacity(selected_count);
    let mut emitted = 0;
    for nodes in selected {
        let page_num = nodes.page_num;
        let result = run_page(nodes, config, selected_count, &mut scratch);
        if result.is_ok() {
            let form = String::from_utf8_lossy(&scratch);
            let block = config.script_style.render(page_num, &form, emitted == 0);
            sink.write_all(block.as_bytes()).map_err(sink_err)?;
            emitted += 1;
        }
        results.push(result);
    }
    sink.flush().map_err(sink_err)?;

    let mut stats = compute_stats(&results, total_pages);
    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    if stats.processed_pages == 0 {
        return Err(all_failed(&results));
    }
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(selected_count, stats.processed_pages);
    }
    Ok(stats)
}

/// Convert one page: build its tree, map coordinates, serialise.
pub fn process_page(nodes: PageNodes, config: &ConversionConfig) -> PageResult {
    let mut buf = Vec::new();
    let mut result = run_page(nodes, config, 1, &mut buf);
    result.form = String::from_utf8_lossy(&buf).into_owned();
    result
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Run one page into `buf` (cleared first). The returned result leaves
/// `form` empty; on success the form is in `buf`.
fn run_page(
    nodes: PageNodes,
    config: &ConversionConfig,
    total_pages: usize,
    buf: &mut Vec<u8>,
) -> PageResult {
    let start = Instant::now();
    let page_num = nodes.page_num;
    buf.clear();

    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page_num, total_pages);
    }

    let outcome = build_page(nodes, config).and_then(|mut tree| {
        transform_tree(&mut tree, config.target_size)?;
        write_page(&tree, &SerializeOptions::from_config(config), buf).map_err(|e| {
            PageError::Internal {
                page: page_num,
                detail: format!("serialisation failed: {e}"),
            }
        })?;
        Ok(tree)
    });
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(tree) => {
            debug!(
                "Page {}: {} zones ({} clamped) in {}ms",
                page_num,
                tree.len(),
                tree.clamped,
                duration_ms
            );
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_complete(page_num, total_pages, tree.len());
            }
            PageResult {
                page_num,
                form: String::new(),
                zone_count: tree.len(),
                clamped_zones: tree.clamped,
                duration_ms,
                error: None,
            }
        }
        Err(e) => {
            warn!("{}", e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_error(page_num, total_pages, &e.to_string());
            }
            PageResult::failed(page_num, e, duration_ms)
        }
    }
}

/// Run one page on the blocking pool.
pub(crate) async fn process_page_blocking(
    nodes: PageNodes,
    config: ConversionConfig,
    total_pages: usize,
) -> PageResult {
    let page_num = nodes.page_num;
    tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        let mut result = run_page(nodes, &config, total_pages, &mut buf);
        result.form = String::from_utf8_lossy(&buf).into_owned();
        result
    })
    .await
    .unwrap_or_else(|e| {
        let err = PageError::Internal {
            page: page_num,
            detail: format!("worker task failed: {e}"),
        };
        warn!("{}", err);
        PageResult::failed(page_num, err, 0)
    })
}

/// Keep the selected pages, in document order.
pub(crate) fn select_pages(
    pages: Vec<PageNodes>,
    selection: &PageSelection,
) -> Result<Vec<PageNodes>, HocrError> {
    let total = pages.len();
    let indices = selection.to_indices(total);
    if indices.is_empty() {
        let page = match selection {
            PageSelection::All => 0,
            PageSelection::Single(p) | PageSelection::Range(p, _) => *p,
            PageSelection::Set(v) => v.iter().copied().max().unwrap_or(0),
        };
        return Err(HocrError::PageOutOfRange { page, total });
    }
    Ok(pages
        .into_iter()
        .enumerate()
        .filter(|(i, _)| indices.binary_search(i).is_ok())
        .map(|(_, p)| p)
        .collect())
}

/// Process pages in parallel; results come back in page order.
async fn process_concurrent(pages: Vec<PageNodes>, config: &ConversionConfig) -> Vec<PageResult> {
    let total_pages = pages.len();
    stream::iter(pages.into_iter().map(|nodes| {
        let config = config.clone();
        process_page_blocking(nodes, config, total_pages)
    }))
    .buffered(config.concurrency.max(1))
    .collect()
    .await
}

/// Assemble the final script from page results.
fn assemble_script(pages: &[PageResult], config: &ConversionConfig) -> String {
    let mut script = String::new();
    for (i, page) in pages.iter().filter(|p| p.is_ok()).enumerate() {
        script.push_str(&config.script_style.render(page.page_num, &page.form, i == 0));
    }
    script
}

fn compute_stats(pages: &[PageResult], total_pages: usize) -> ConversionStats {
    let processed = pages.iter().filter(|p| p.is_ok()).count();
    ConversionStats {
        total_pages,
        processed_pages: processed,
        failed_pages: pages.len() - processed,
        skipped_pages: total_pages.saturating_sub(pages.len()),
        total_zones: pages.iter().map(|p| p.zone_count).sum(),
        clamped_zones: pages.iter().map(|p| p.clamped_zones).sum(),
        total_duration_ms: 0,
    }
}

fn all_failed(pages: &[PageResult]) -> HocrError {
    let first_error = pages
        .iter()
        .find_map(|p| p.error.as_ref())
        .map(|e| format!("{}", e))
        .unwrap_or_else(|| "Unknown error".to_string());
    HocrError::AllPagesFailed {
        total: pages.len(),
        first_error,
    }
}
