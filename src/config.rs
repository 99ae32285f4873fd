//! Configuration types for hOCR-to-djvused conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The configuration is supplied by the
//! caller; nothing here reads files or the environment.

use crate::error::HocrError;
use crate::pipeline::segment::{SimpleWordBreaker, UnicodeWordBreaker, WordBreaker};
use crate::progress::ProgressCallback;
use crate::zone::{PageSize, ZoneKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for an hOCR-to-djvused conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use hocr_djvused::{ConversionConfig, WordSegmentation, ZoneKind};
///
/// let config = ConversionConfig::builder()
///     .details(ZoneKind::Character)
///     .word_segmentation(WordSegmentation::Unicode { locale: None })
///     .concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Finest zone kind materialised in the output. Default: `Word`.
    ///
    /// Finer markup is merged upward into this level; coarser markup is
    /// segmented into words when character geometry allows, otherwise it is
    /// left at the coarsest level available.
    pub details: ZoneKind,

    /// Finest kind the producing engine declares it can emit. Default: `Character`.
    ///
    /// Zone markers finer than this are treated as plain markup.
    pub engine_detail: ZoneKind,

    /// Built-in word-boundary policy. Default: [`WordSegmentation::Simple`].
    pub word_segmentation: WordSegmentation,

    /// Injected word-boundary capability. Takes precedence over `word_segmentation`.
    pub word_breaker: Option<Arc<dyn WordBreaker>>,

    /// Re-derive words even where the producer supplied word boxes. Default: false.
    pub resegment: bool,

    /// Source pixel size used when a page node carries no bbox.
    pub page_size: Option<PageSize>,

    /// Physical target page size. `None` keeps the pixel size (unit scale).
    pub target_size: Option<PageSize>,

    /// Tag-balancing strictness of the markup parser. Default: `Permissive`.
    pub leniency: Leniency,

    /// What to do with child boxes that leave their parent. Default: `Clamp`.
    pub geometry: GeometryPolicy,

    /// Encoding the emitted text strings must be clean in. Default: `Utf8`.
    pub encoding: TextEncoding,

    /// Document default language, inherited by every zone without `lang`.
    pub language: Option<String>,

    /// Emit `char` forms beneath `word`. `None` means "when details = Character".
    pub embed_chars: Option<bool>,

    /// Shape of the emitted script. Default: [`ScriptStyle::Djvused`].
    pub script_style: ScriptStyle,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Number of pages processed in parallel. Default: 4.
    ///
    /// Output order never depends on this value.
    pub concurrency: usize,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            details: ZoneKind::Word,
            engine_detail: ZoneKind::Character,
            word_segmentation: WordSegmentation::default(),
            word_breaker: None,
            resegment: false,
            page_size: None,
            target_size: None,
            leniency: Leniency::default(),
            geometry: GeometryPolicy::default(),
            encoding: TextEncoding::default(),
            language: None,
            embed_chars: None,
            script_style: ScriptStyle::default(),
            pages: PageSelection::default(),
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("details", &self.details)
            .field("engine_detail", &self.engine_detail)
            .field("word_segmentation", &self.word_segmentation)
            .field("word_breaker", &self.word_breaker.as_ref().map(|_| "<dyn WordBreaker>"))
            .field("resegment", &self.resegment)
            .field("page_size", &self.page_size)
            .field("target_size", &self.target_size)
            .field("leniency", &self.leniency)
            .field("geometry", &self.geometry)
            .field("encoding", &self.encoding)
            .field("language", &self.language)
            .field("embed_chars", &self.embed_chars)
            .field("script_style", &self.script_style)
            .field("pages", &self.pages)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The word breaker in effect, or `None` when segmentation is disabled.
    ///
    /// An injected breaker wins over the built-in policy.
    pub fn breaker(&self) -> Option<Arc<dyn WordBreaker>> {
        if let Some(ref b) = self.word_breaker {
            return Some(Arc::clone(b));
        }
        match self.word_segmentation {
            WordSegmentation::None => None,
            WordSegmentation::Simple => Some(Arc::new(SimpleWordBreaker)),
            WordSegmentation::Unicode { .. } => Some(Arc::new(UnicodeWordBreaker)),
        }
    }

    /// Locale forced by the policy, overriding zone languages.
    pub fn segmentation_locale(&self) -> Option<&str> {
        match self.word_segmentation {
            WordSegmentation::Unicode { ref locale } => locale.as_deref(),
            _ => None,
        }
    }

    /// Whether `char` forms are embedded beneath `word` forms.
    pub fn embeds_chars(&self) -> bool {
        self.embed_chars
            .unwrap_or(self.details == ZoneKind::Character)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn details(mut self, details: ZoneKind) -> Self {
        self.config.details = details;
        self
    }

    pub fn engine_detail(mut self, detail: ZoneKind) -> Self {
        self.config.engine_detail = detail;
        self
    }

    pub fn word_segmentation(mut self, policy: WordSegmentation) -> Self {
        self.config.word_segmentation = policy;
        self
    }

    pub fn word_breaker(mut self, breaker: Arc<dyn WordBreaker>) -> Self {
        self.config.word_breaker = Some(breaker);
        self
    }

    pub fn resegment(mut self, v: bool) -> Self {
        self.config.resegment = v;
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page_size = Some(size);
        self
    }

    pub fn target_size(mut self, size: PageSize) -> Self {
        self.config.target_size = Some(size);
        self
    }

    pub fn leniency(mut self, leniency: Leniency) -> Self {
        self.config.leniency = leniency;
        self
    }

    pub fn geometry(mut self, policy: GeometryPolicy) -> Self {
        self.config.geometry = policy;
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = Some(language.into());
        self
    }

    pub fn embed_chars(mut self, v: bool) -> Self {
        self.config.embed_chars = Some(v);
        self
    }

    pub fn script_style(mut self, style: ScriptStyle) -> Self {
        self.config.script_style = style;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, HocrError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(HocrError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if let Some(size) = c.page_size {
            if size.is_empty() {
                return Err(HocrError::InvalidConfig(format!(
                    "Page size must be non-zero, got {size}"
                )));
            }
        }
        if let Some(size) = c.target_size {
            if size.is_empty() {
                return Err(HocrError::InvalidConfig(format!(
                    "Target size must be non-zero, got {size}"
                )));
            }
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(HocrError::InvalidConfig(format!(
                    "Invalid page range {start}-{end}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Built-in word-boundary policy used when words must be derived.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WordSegmentation {
    /// Never derive words; lines without word markup stay lines.
    None,
    /// Break only at whitespace/non-whitespace transitions. (default)
    #[default]
    Simple,
    /// Unicode (UAX #29) word boundaries. `locale` overrides zone languages
    /// when handed to the breaker; the built-in breaker does not tailor by it.
    Unicode { locale: Option<String> },
}

impl FromStr for WordSegmentation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(WordSegmentation::None),
            "simple" | "whitespace" => Ok(WordSegmentation::Simple),
            "uax29" | "unicode" => Ok(WordSegmentation::Unicode { locale: None }),
            other => Err(format!(
                "unknown word segmentation '{other}' (expected none, simple or uax29)"
            )),
        }
    }
}

/// How forgiving the markup parser is about tag balancing and quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Leniency {
    /// Markup must be well-formed XML(XHTML).
    Strict,
    /// HTML tag soup: unclosed and stray tags, unquoted attributes. (default)
    #[default]
    Permissive,
}

/// Policy for a child bbox that extends outside its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GeometryPolicy {
    /// Clamp the child to the parent's bounds and carry on. (default)
    #[default]
    Clamp,
    /// Fail the page with a geometry error.
    Reject,
}

/// Encoding the serialised strings must be clean in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextEncoding {
    /// UTF-8: only control characters are escaped. (default)
    #[default]
    Utf8,
    /// 7-bit ASCII: every non-ASCII byte is escaped as `\ooo`.
    Ascii,
}

impl FromStr for TextEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "utf8" => Ok(TextEncoding::Utf8),
            "ascii" | "usascii" => Ok(TextEncoding::Ascii),
            other => Err(format!("unsupported encoding '{other}' (expected utf-8 or ascii)")),
        }
    }
}

/// Shape of the emitted script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScriptStyle {
    /// Page forms only, separated by a line holding a lone `.`.
    Bare,
    /// Complete djvused commands: `select N`, `set-txt`, form, `.`. (default)
    #[default]
    Djvused,
}

impl ScriptStyle {
    /// Render one page's block of the script from its serialised form.
    ///
    /// `first` tells a bare script whether a separator line is needed.
    pub fn render(&self, page_num: usize, form: &str, first: bool) -> String {
        match self {
            ScriptStyle::Bare if first => format!("{form}\n"),
            ScriptStyle::Bare => format!(".\n{form}\n"),
            ScriptStyle::Djvused => format!("select {page_num}\nset-txt\n{form}\n.\n"),
        }
    }
}

/// Specifies which pages of the hOCR document to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl FromStr for PageSelection {
    type Err = String;

    /// Parse `all`, `5`, `3-15` or `1,3,5,7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "all" {
            return Ok(PageSelection::All);
        }
        let page = |p: &str| -> Result<usize, String> {
            match p.trim().parse::<usize>() {
                Ok(0) => Err("Pages are 1-indexed, minimum is 1 (got 0)".to_string()),
                Ok(n) => Ok(n),
                Err(_) => Err(format!("Invalid page number: '{}'", p.trim())),
            }
        };
        if let Some((start, end)) = s.split_once('-') {
            let (start, end) = (page(start)?, page(end)?);
            if start > end {
                return Err(format!(
                    "Invalid page range '{start}-{end}': start must be <= end"
                ));
            }
            return Ok(PageSelection::Range(start, end));
        }
        if s.contains(',') {
            return s
                .split(',')
                .map(page)
                .collect::<Result<Vec<_>, _>>()
                .map(PageSelection::Set);
        }
        page(&s).map(PageSelection::Single)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ConversionConfig::default();
        assert_eq!(c.details, ZoneKind::Word);
        assert_eq!(c.leniency, Leniency::Permissive);
        assert_eq!(c.geometry, GeometryPolicy::Clamp);
        assert!(!c.embeds_chars());
        assert!(c.breaker().is_some());
    }

    #[test]
    fn embed_chars_follows_details() {
        let c = ConversionConfig::builder()
            .details(ZoneKind::Character)
            .build()
            .unwrap();
        assert!(c.embeds_chars());
        let c = ConversionConfig::builder()
            .details(ZoneKind::Character)
            .embed_chars(false)
            .build()
            .unwrap();
        assert!(!c.embeds_chars());
    }

    #[test]
    fn zero_page_size_rejected() {
        let err = ConversionConfig::builder()
            .page_size(PageSize::new(0, 100))
            .build()
            .unwrap_err();
        assert!(matches!(err, HocrError::InvalidConfig(_)));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let err = ConversionConfig::builder()
            .concurrency(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, HocrError::InvalidConfig(_)));
        let c = ConversionConfig::builder().concurrency(3).build().unwrap();
        assert_eq!(c.concurrency, 3);
    }

    #[test]
    fn segmentation_none_disables_breaker() {
        let c = ConversionConfig::builder()
            .word_segmentation(WordSegmentation::None)
            .build()
            .unwrap();
        assert!(c.breaker().is_none());
    }

    #[test]
    fn segmentation_parses() {
        assert_eq!(
            "uax29".parse::<WordSegmentation>().unwrap(),
            WordSegmentation::Unicode { locale: None }
        );
        assert_eq!("simple".parse::<WordSegmentation>().unwrap(), WordSegmentation::Simple);
        assert!("icu".parse::<WordSegmentation>().is_err());
    }

    #[test]
    fn page_selection_parses() {
        assert_eq!("all".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!("3-5".parse::<PageSelection>().unwrap(), PageSelection::Range(3, 5));
        assert_eq!(
            "1,3".parse::<PageSelection>().unwrap(),
            PageSelection::Set(vec![1, 3])
        );
        assert!("0".parse::<PageSelection>().is_err());
        assert!("5-3".parse::<PageSelection>().is_err());
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Range(2, 9).to_indices(3), vec![1, 2]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3]).to_indices(5), vec![0, 2]);
        assert_eq!(PageSelection::Single(7).to_indices(3), Vec::<usize>::new());
    }

    #[test]
    fn script_style_render() {
        assert_eq!(ScriptStyle::Bare.render(1, "(page 0 0 1 1 \"\")", true), "(page 0 0 1 1 \"\")\n");
        assert_eq!(ScriptStyle::Bare.render(2, "(p)", false), ".\n(p)\n");
        assert_eq!(ScriptStyle::Djvused.render(2, "(p)", false), "select 2\nset-txt\n(p)\n.\n");
    }
}
