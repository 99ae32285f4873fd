//! Conversion results: per-page outcomes, stats, and the assembled script.

use crate::error::{HocrError, PageError};
use serde::{Deserialize, Serialize};

/// Outcome of converting one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-based page number within the hOCR document.
    pub page_num: usize,
    /// The page's serialised expression (empty when the page failed).
    pub form: String,
    /// Zones in the finished tree.
    pub zone_count: usize,
    /// Zones whose bbox was clamped into their parent.
    pub clamped_zones: usize,
    pub duration_ms: u64,
    /// Set when the page failed; such a page contributes nothing to the script.
    pub error: Option<PageError>,
}

impl PageResult {
    pub fn failed(page_num: usize, error: PageError, duration_ms: u64) -> Self {
        Self {
            page_num,
            form: String::new(),
            zone_count: 0,
            clamped_zones: 0,
            duration_ms,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate numbers for a whole conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages found in the hOCR document.
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    /// Pages left out by the page selection.
    pub skipped_pages: usize,
    pub total_zones: usize,
    pub clamped_zones: usize,
    pub total_duration_ms: u64,
}

/// Everything a conversion produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The assembled script, pages in original order.
    pub script: String,
    /// Per-page results, sorted by page number.
    pub pages: Vec<PageResult>,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// Treat any page failure as an error.
    pub fn into_result(self) -> Result<Self, HocrError> {
        if self.stats.failed_pages > 0 {
            return Err(HocrError::PartialFailure {
                success: self.stats.processed_pages,
                failed: self.stats.failed_pages,
                total: self.stats.processed_pages + self.stats.failed_pages,
            });
        }
        Ok(self)
    }

    /// Errors of the failed pages, in page order.
    pub fn errors(&self) -> impl Iterator<Item = &PageError> {
        self.pages.iter().filter_map(|p| p.error.as_ref())
    }
}
