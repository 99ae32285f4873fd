//! CLI binary for hocr-djvused.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use hocr_djvused::{
    convert_file, convert_to_file, ConversionConfig, ConversionProgressCallback, GeometryPolicy,
    Leniency, PageSelection, PageSize, ProgressCallback, ScriptStyle, TextEncoding,
    WordSegmentation, ZoneKind,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per
/// failed page. Pages may complete out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    zones: AtomicUsize,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// The bar length is set by `on_conversion_start`.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Parsing");
        bar.set_message("Reading hOCR…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            zones: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>4}/{len} pages  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.set_message("");
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
    }

    fn on_page_complete(&self, _page_num: usize, _total: usize, zone_count: usize) {
        let zones = self.zones.fetch_add(zone_count, Ordering::SeqCst) + zone_count;
        self.bar.set_message(dim(&format!("{zones} zones")));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(100) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages converted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages converted  ({} failed)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Word-level text layer for a single-page hOCR file
  hocr2djvused page.hocr > page.dsed
  djvused -f page.dsed -s page.djvu

  # Line-level only, from stdin
  tesseract scan.tif - hocr | hocr2djvused --details lines

  # Re-derive words with Unicode rules, tagging the breaker with Polish
  hocr2djvused --word-segmentation uax29 --locale pl --resegment book.hocr -o book.dsed

  # Characters, for a producer that omits the page size
  hocr2djvused --details chars --page-size 2480x3508 cuneiform.html

  # Bare expressions (no select/set-txt commands), pages 3-5
  hocr2djvused --bare --pages 3-5 book.hocr

  # JSON output with per-page results and stats
  hocr2djvused --json book.hocr > result.json

DETAIL LEVELS:
  page, column, para, line, word (default), char
  (plural forms such as lines, words, chars are accepted)

ENVIRONMENT VARIABLES:
  RUST_LOG                Overrides --verbose/--quiet log filtering
"#;

/// Convert hOCR into djvused hidden-text scripts.
#[derive(Parser, Debug)]
#[command(
    name = "hocr2djvused",
    version,
    about = "Convert hOCR markup into djvused hidden-text scripts",
    long_about = "Convert hOCR output of OCR engines (Tesseract, Cuneiform, Ocropus, \
gocr, ...) into a djvused script that embeds a hidden, searchable text layer into \
DjVu documents.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// hOCR file to read, or `-` for standard input.
    #[arg(default_value = "-")]
    input: String,

    /// Write the script to this file instead of stdout.
    #[arg(short, long, env = "HOCR2DJVUSED_OUTPUT")]
    output: Option<PathBuf>,

    /// Finest zone kind in the output: page, column, para, line, word, char.
    #[arg(long, env = "HOCR2DJVUSED_DETAILS", default_value = "word")]
    details: ZoneKind,

    /// Word boundaries when words must be derived: none, simple, uax29.
    #[arg(
        long,
        env = "HOCR2DJVUSED_WORD_SEGMENTATION",
        default_value = "simple",
        long_help = "How to derive words from lines that carry character geometry but no \
          word markup.\n  none   — keep such lines as lines\n  simple — break at whitespace only\n  \
          uax29  — Unicode word boundaries (punctuation becomes separate words)"
    )]
    word_segmentation: WordSegmentation,

    /// Locale for uax29 segmentation; overrides the hOCR `lang` attributes.
    #[arg(long, env = "HOCR2DJVUSED_LOCALE")]
    locale: Option<String>,

    /// Re-derive words even where the producer supplied word boxes.
    #[arg(long)]
    resegment: bool,

    /// Page size WxH in pixels, for producers that omit it.
    #[arg(long, env = "HOCR2DJVUSED_PAGE_SIZE")]
    page_size: Option<PageSize>,

    /// Target page size WxH; defaults to the pixel size.
    #[arg(long, env = "HOCR2DJVUSED_TARGET_SIZE")]
    target_size: Option<PageSize>,

    /// Require well-formed XHTML instead of accepting HTML tag soup.
    #[arg(long)]
    strict: bool,

    /// Fail a page whose child boxes leave their parent, instead of clamping.
    #[arg(long)]
    reject_overflow: bool,

    /// Escape every non-ASCII character in text strings.
    #[arg(long)]
    ascii: bool,

    /// Default language for zones without a `lang` attribute.
    #[arg(long, env = "HOCR2DJVUSED_LANGUAGE")]
    language: Option<String>,

    /// Emit bare page expressions separated by `.` lines.
    #[arg(long)]
    bare: bool,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "HOCR2DJVUSED_PAGES", default_value = "all")]
    pages: PageSelection,

    /// Number of pages converted in parallel.
    #[arg(short, long, env = "HOCR2DJVUSED_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Output structured JSON (ConversionOutput) instead of the script.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "HOCR2DJVUSED_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HOCR2DJVUSED_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "HOCR2DJVUSED_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Failed pages are reported by the progress bar when it is active.
    let show_progress = cli.output.is_some() && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    if let Some(output_path) = cli.output.as_ref().filter(|_| !cli.json) {
        let stats = convert_to_file(&cli.input, output_path, &config)
            .await
            .context("Conversion failed")?;

        if !cli.quiet {
            eprintln!(
                "{}  {}/{} pages  {} zones ({} clamped)  {}ms  →  {}",
                if stats.failed_pages == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                stats.processed_pages,
                stats.processed_pages + stats.failed_pages,
                stats.total_zones,
                stats.clamped_zones,
                stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let output = convert_file(&cli.input, &config)
            .await
            .context("Conversion failed")?;

        let text = if cli.json {
            let mut json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            json.push('\n');
            json
        } else {
            output.script.clone()
        };
        match cli.output {
            Some(ref path) => std::fs::write(path, text.as_bytes())
                .with_context(|| format!("Failed to write {}", path.display()))?,
            None => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(text.as_bytes())
                    .context("Failed to write to stdout")?;
                handle.flush().context("Failed to write to stdout")?;
            }
        }

        if !cli.quiet && output.stats.failed_pages > 0 {
            eprintln!(
                "{} {}/{} pages failed",
                cyan("⚠"),
                output.stats.failed_pages,
                output.stats.processed_pages + output.stats.failed_pages
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let word_segmentation = match (&cli.word_segmentation, &cli.locale) {
        (WordSegmentation::Unicode { .. }, Some(locale)) => WordSegmentation::Unicode {
            locale: Some(locale.clone()),
        },
        (policy, _) => policy.clone(),
    };

    let mut builder = ConversionConfig::builder()
        .details(cli.details)
        .word_segmentation(word_segmentation)
        .resegment(cli.resegment)
        .leniency(if cli.strict {
            Leniency::Strict
        } else {
            Leniency::Permissive
        })
        .geometry(if cli.reject_overflow {
            GeometryPolicy::Reject
        } else {
            GeometryPolicy::Clamp
        })
        .encoding(if cli.ascii {
            TextEncoding::Ascii
        } else {
            TextEncoding::Utf8
        })
        .script_style(if cli.bare {
            ScriptStyle::Bare
        } else {
            ScriptStyle::Djvused
        })
        .pages(cli.pages.clone())
        .concurrency(cli.concurrency);

    if let Some(size) = cli.page_size {
        builder = builder.page_size(size);
    }
    if let Some(size) = cli.target_size {
        builder = builder.target_size(size);
    }
    if let Some(ref language) = cli.language {
        builder = builder.language(language.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
