//! Error types for the hocr-djvused library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`HocrError`] — **Fatal**: the conversion cannot proceed at all
//!   (unreadable input, invalid configuration, every page failed).
//!   Returned as `Err(HocrError)` from the top-level `convert*` functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page carries a structural
//!   defect (undecodable bbox, inconsistent nesting, unusable geometry) but
//!   every other page is fine. Stored inside [`crate::output::PageResult`];
//!   a failed page contributes nothing to the emitted script.
//!
//! Page errors are data defects, never transient faults, so nothing in the
//! pipeline retries.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the hocr-djvused library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum HocrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("hOCR file not found: '{path}'")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure while reading the markup.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Selected page numbers exceed the page count of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Conversion outcome ────────────────────────────────────────────────
    /// Every selected page failed; the script would be empty.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    /// Some pages succeeded but at least one failed.
    ///
    /// Returned by [`crate::output::ConversionOutput::into_result`] when
    /// the caller wants to treat any page failure as an error.
    #[error("{failed}/{total} pages failed during conversion")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output script.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which branch of the page-error taxonomy a [`PageError`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PageErrorKind {
    Parse,
    Geometry,
    SegmentationMismatch,
    Internal,
}

/// A non-fatal error for a single page.
///
/// `page` is the 1-based page number; `node` describes the offending node
/// by hOCR class and zone kind, e.g. `ocr_line (line)`.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Markup has no recognisable structure, a bbox cannot be decoded, or
    /// the zone nesting is self-inconsistent.
    #[error("Page {page}: malformed hOCR at {node}: {detail}")]
    Parse {
        page: usize,
        node: String,
        detail: String,
    },

    /// Page dimensions are unusable or geometry cannot be reconciled.
    #[error("Page {page}: bad geometry at {node}: {detail}")]
    Geometry {
        page: usize,
        node: String,
        detail: String,
    },

    /// Word-break spans cannot be aligned with the character geometry.
    #[error("Page {page}: word segmentation mismatch at {node}: {detail}")]
    SegmentationMismatch {
        page: usize,
        node: String,
        detail: String,
    },

    /// The worker processing the page did not complete.
    #[error("Page {page}: internal error: {detail}")]
    Internal { page: usize, detail: String },
}

impl PageError {
    pub fn parse(page: usize, node: impl Into<String>, detail: impl Into<String>) -> Self {
        PageError::Parse {
            page,
            node: node.into(),
            detail: detail.into(),
        }
    }

    pub fn geometry(page: usize, node: impl Into<String>, detail: impl Into<String>) -> Self {
        PageError::Geometry {
            page,
            node: node.into(),
            detail: detail.into(),
        }
    }

    pub fn segmentation(page: usize, node: impl Into<String>, detail: impl Into<String>) -> Self {
        PageError::SegmentationMismatch {
            page,
            node: node.into(),
            detail: detail.into(),
        }
    }

    /// 1-based page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::Parse { page, .. }
            | PageError::Geometry { page, .. }
            | PageError::SegmentationMismatch { page, .. }
            | PageError::Internal { page, .. } => *page,
        }
    }

    pub fn kind(&self) -> PageErrorKind {
        match self {
            PageError::Parse { .. } => PageErrorKind::Parse,
            PageError::Geometry { .. } => PageErrorKind::Geometry,
            PageError::SegmentationMismatch { .. } => PageErrorKind::SegmentationMismatch,
            PageError::Internal { .. } => PageErrorKind::Internal,
        }
    }
}
