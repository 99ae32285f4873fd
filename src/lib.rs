//! # hocr-djvused
//!
//! Convert hOCR OCR output into djvused scripts that embed a hidden,
//! searchable text layer into DjVu documents.
//!
//! OCR engines describe what they recognised as hOCR: HTML whose elements
//! carry `ocr_page`, `ocr_line`, `ocrx_word`, ... classes and a
//! `title="bbox x0 y0 x1 y1"` attribute. `djvused` wants a nested
//! expression per page in a y-up coordinate space with a fixed grammar.
//! This crate reconciles the two: it tolerates the tag soup and bbox
//! quirks of different producers, enforces the containment rules the
//! text layer requires, optionally re-derives words, and writes output
//! that is byte-for-byte deterministic.
//!
//! ## Pipeline Overview
//!
//! ```text
//! hOCR
//!  │
//!  ├─ 1. Input      read a file or stdin
//!  ├─ 2. Markup     tolerant parse into per-page zone events
//!  ├─ 3. Tree       one zone arena per page at the requested detail
//!  │                (words re-derived via UAX #29 or whitespace rules)
//!  ├─ 4. Transform  pixel space (y down) → page space (y up)
//!  ├─ 5. Serialise  (page … (line … (word x0 y0 x1 y1 "text")))
//!  └─ 6. Output     djvused script, pages in original order + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hocr_djvused::{convert, ConversionConfig, ZoneKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let markup = std::fs::read_to_string("page.hocr")?;
//!     let config = ConversionConfig::builder()
//!         .details(ZoneKind::Word)
//!         .build()?;
//!     let output = convert(markup, &config).await?;
//!     print!("{}", output.script);
//!     eprintln!("{} zones, {} clamped", output.stats.total_zones, output.stats.clamped_zones);
//!     Ok(())
//! }
//! ```
//!
//! Feed the script to `djvused -f script.dsed -s book.djvu`.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `hocr2djvused` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! hocr-djvused = { version = "0.1", default-features = false }
//! ```
//!
//! ## Detail Levels
//!
//! | `details` | Emitted forms | Finer markup |
//! |-----------|---------------|--------------|
//! | `Page`      | `page` with the full text | merged |
//! | `Column` / `Paragraph` / `Line` | down to that kind | merged |
//! | `Word` (default) | down to `word` | characters merged into words |
//! | `Character` | `word`, with `char` forms when embedding is on | — |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod zone;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionConfig, ConversionConfigBuilder, GeometryPolicy, Leniency, PageSelection,
    ScriptStyle, TextEncoding, WordSegmentation,
};
pub use convert::{
    convert, convert_file, convert_sync, convert_to_file, convert_to_writer, process_page,
};
pub use error::{HocrError, PageError, PageErrorKind};
pub use output::{ConversionOutput, ConversionStats, PageResult};
pub use pipeline::markup::{parse_document, PageNodes, ParseOptions};
pub use pipeline::segment::{
    segment_line, CharCell, SimpleWordBreaker, UnicodeWordBreaker, WordBreaker, WordSpan,
};
pub use pipeline::sexpr::{parse_forms, write_page, Form, SerializeOptions};
pub use pipeline::transform::{transform_tree, CoordinateTransform};
pub use pipeline::tree::{build_page, build_trees};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, PageStream};
pub use zone::{BBox, PageSize, PageTree, Zone, ZoneId, ZoneKind};
