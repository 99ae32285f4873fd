//! Markup parser: hOCR text → ordered node events, one batch per page.
//!
//! The parser walks the markup with `quick-xml` and reports every element
//! whose `class` names an hOCR zone as an [`NodeEvent::Open`] /
//! [`NodeEvent::Close`] pair, with text content in between. Everything
//! else is transparent: a `<b>` inside a word contributes its text and
//! nothing more.
//!
//! ## Leniency
//!
//! In [`Leniency::Permissive`] mode end-tag names are not checked against
//! the reader's own stack. Instead the parser keeps its own element stack:
//! an end tag closes every element opened after its match (implicitly
//! closing unbalanced tags), end tags without a match are ignored, void
//! HTML elements never open, attributes may be unquoted, and HTML named
//! entities are resolved. [`Leniency::Strict`] requires well-formed XML.
//!
//! ## Failure scope
//!
//! A bbox that cannot be decoded fails only the page it appears on: the
//! parser keeps consuming markup until that page closes and records the
//! page as `Err`. A syntax error the reader cannot get past fails the open
//! page and ends parsing; pages completed before it are kept.

use crate::config::{ConversionConfig, Leniency};
use crate::error::PageError;
use crate::zone::{BBox, ZoneKind};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::borrow::Cow;
use tracing::{debug, warn};

/// Parser settings derived from the conversion configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub leniency: Leniency,
    /// Zone markers finer than this are treated as plain markup.
    pub max_detail: ZoneKind,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            leniency: Leniency::Permissive,
            max_detail: ZoneKind::Character,
        }
    }
}

impl ParseOptions {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            leniency: config.leniency,
            max_detail: config.engine_detail,
        }
    }
}

/// Baseline of a line: `y = slope * x + intercept`, relative to the bbox.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub slope: f64,
    pub intercept: f64,
}

/// One recognised zone marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: ZoneKind,
    /// hOCR class that introduced the node, e.g. `ocrx_word`.
    pub class: String,
    pub bbox: Option<BBox>,
    pub baseline: Option<Baseline>,
    pub confidence: Option<f64>,
    /// Per-codepoint boxes from `x_bboxes`, in text order.
    pub char_boxes: Vec<BBox>,
    /// `lang` / `xml:lang` on this element, if any.
    pub language: Option<String>,
}

impl Node {
    pub(crate) fn new(kind: ZoneKind, class: impl Into<String>) -> Self {
        Self {
            kind,
            class: class.into(),
            bbox: None,
            baseline: None,
            confidence: None,
            char_boxes: Vec::new(),
            language: None,
        }
    }

    /// Human-readable node description used in error messages.
    pub fn describe(&self) -> String {
        format!("{} ({})", self.class, self.kind)
    }
}

/// Zone open/close markers with text in between, in document order.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    Open(Node),
    Text(String),
    Close(ZoneKind),
}

/// The node events of one page, or the error that aborted it.
#[derive(Debug, Clone, PartialEq)]
pub struct PageNodes {
    /// 1-based page number in document order.
    pub page_num: usize,
    pub events: Result<Vec<NodeEvent>, PageError>,
}

// ── Title properties ─────────────────────────────────────────────────────

/// Decoded `title` attribute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleProps {
    pub bbox: Option<BBox>,
    pub baseline: Option<Baseline>,
    pub confidence: Option<f64>,
    pub char_boxes: Vec<BBox>,
}

static RE_BBOX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(-?\d+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)$").unwrap());

/// Decode an hOCR `title` attribute such as
/// `bbox 0 0 100 20; baseline 0.01 -3; x_wconf 93`.
///
/// `bbox` and `x_bboxes` must decode exactly; malformed optional
/// properties (`baseline`, `x_wconf`) are treated as absent.
pub fn parse_title(title: &str) -> Result<TitleProps, String> {
    let mut props = TitleProps::default();
    for property in split_properties(title) {
        let property = property.trim();
        if property.is_empty() {
            continue;
        }
        let (name, args) = property
            .split_once(char::is_whitespace)
            .map(|(n, a)| (n, a.trim()))
            .unwrap_or((property, ""));
        match name {
            "bbox" => props.bbox = Some(parse_bbox(args)?),
            "x_bboxes" => props.char_boxes = parse_char_boxes(args)?,
            "baseline" => {
                let nums: Vec<f64> = args
                    .split_whitespace()
                    .filter_map(|t| t.parse().ok())
                    .collect();
                if let [slope, intercept] = nums[..] {
                    props.baseline = Some(Baseline { slope, intercept });
                } else {
                    debug!("ignoring malformed baseline '{}'", args);
                }
            }
            "x_wconf" => match args.parse::<f64>() {
                Ok(c) => props.confidence = Some(c),
                Err(_) => debug!("ignoring malformed x_wconf '{}'", args),
            },
            _ => {}
        }
    }
    Ok(props)
}

/// Split title properties on `;`, ignoring semicolons inside double quotes.
fn split_properties(title: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in title.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                out.push(&title[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&title[start..]);
    out
}

fn parse_bbox(args: &str) -> Result<BBox, String> {
    let caps = RE_BBOX
        .captures(args)
        .ok_or_else(|| format!("cannot decode bbox '{args}'"))?;
    let mut v = [0i32; 4];
    for (slot, i) in v.iter_mut().zip(1..=4) {
        *slot = caps[i]
            .parse()
            .map_err(|_| format!("bbox coordinate out of range in '{args}'"))?;
    }
    BBox::new(v[0], v[1], v[2], v[3]).ok_or_else(|| format!("inverted bbox '{args}'"))
}

fn parse_char_boxes(args: &str) -> Result<Vec<BBox>, String> {
    let nums = args
        .split_whitespace()
        .map(|t| t.parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("cannot decode x_bboxes '{args}'"))?;
    if nums.len() % 4 != 0 {
        return Err(format!(
            "x_bboxes holds {} numbers, not a multiple of 4",
            nums.len()
        ));
    }
    nums.chunks_exact(4)
        .map(|c| {
            BBox::new(c[0], c[1], c[2], c[3])
                .ok_or_else(|| format!("inverted box '{} {} {} {}' in x_bboxes", c[0], c[1], c[2], c[3]))
        })
        .collect()
}

// ── Entities ─────────────────────────────────────────────────────────────

/// Named HTML entities commonly found in OCR output.
fn html_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{a0}",
        "shy" => "\u{ad}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "sbquo" => "\u{201a}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "bdquo" => "\u{201e}",
        "hellip" => "\u{2026}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "deg" => "\u{b0}",
        "sect" => "\u{a7}",
        "para" => "\u{b6}",
        "middot" => "\u{b7}",
        _ => return None,
    })
}

static RE_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(#?\w+);").unwrap());

/// Resolve the body of `&...;`: a named HTML entity or a decimal/hex
/// character reference.
fn resolve_entity(name: &str) -> Option<String> {
    let Some(number) = name.strip_prefix('#') else {
        return html_entity(name).map(str::to_owned);
    };
    let code = match number.strip_prefix('x').or_else(|| number.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => number.parse().ok()?,
    };
    char::from_u32(code).map(String::from)
}

// ── Parser ───────────────────────────────────────────────────────────────

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

struct Element {
    name: String,
    zone: Option<ZoneKind>,
}

struct OpenPage {
    page_num: usize,
    events: Vec<NodeEvent>,
    error: Option<PageError>,
    implicit: bool,
    /// Explicit `ocr_page` elements opened inside this page.
    nested: usize,
}

#[derive(Default)]
struct Attrs {
    class: Option<String>,
    title: Option<String>,
    language: Option<String>,
}

struct DocumentParser {
    options: ParseOptions,
    elements: Vec<Element>,
    page: Option<OpenPage>,
    pages: Vec<PageNodes>,
}

/// Parse a whole hOCR document into per-page node events.
///
/// Always returns at least one entry: a document without any recognisable
/// zone marker yields a single failed page.
pub fn parse_document(markup: &str, options: &ParseOptions) -> Vec<PageNodes> {
    let mut reader = Reader::from_str(markup);
    reader.trim_text(false);
    reader.check_end_names(options.leniency == Leniency::Strict);

    let mut parser = DocumentParser {
        options: *options,
        elements: Vec::new(),
        page: None,
        pages: Vec::new(),
    };

    loop {
        let step = match reader.read_event() {
            Ok(Event::Start(e)) => parser.start(&e, false),
            Ok(Event::Empty(e)) => parser.start(&e, true),
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
                parser.end(&name);
                Ok(())
            }
            Ok(Event::Text(e)) => parser.text(&e),
            Ok(Event::CData(e)) => {
                parser.push_text(String::from_utf8_lossy(&e).into_owned());
                Ok(())
            }
            Ok(Event::Eof) => break,
            Ok(_) => Ok(()),
            Err(e) => Err(format!(
                "unreadable markup at byte {}: {e}",
                reader.buffer_position()
            )),
        };
        if let Err(detail) = step {
            parser.abort(detail);
            return parser.pages;
        }
    }

    parser.finish()
}

impl DocumentParser {
    fn start(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<(), String> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase();
        let attrs = self.read_attributes(e)?;
        let void = self.options.leniency == Leniency::Permissive
            && VOID_ELEMENTS.contains(&name.as_str());
        let self_closing = empty || void;

        let zone = attrs.class.as_deref().and_then(|classes| {
            classes.split_whitespace().find_map(|c| {
                ZoneKind::from_hocr_class(c)
                    .filter(|k| *k <= self.options.max_detail)
                    .map(|k| (k, c.to_string()))
            })
        });

        match zone {
            Some((kind, class)) => {
                self.open_zone(kind, class, &attrs);
                if self_closing {
                    self.close_zone(kind);
                } else {
                    self.elements.push(Element {
                        name,
                        zone: Some(kind),
                    });
                }
            }
            None if !self_closing => self.elements.push(Element { name, zone: None }),
            None => {}
        }
        Ok(())
    }

    fn read_attributes(&self, e: &BytesStart<'_>) -> Result<Attrs, String> {
        let strict = self.options.leniency == Leniency::Strict;
        let iter = if strict {
            e.attributes()
        } else {
            e.html_attributes()
        };

        let mut attrs = Attrs::default();
        for attr in iter {
            let attr = match attr {
                Ok(a) => a,
                Err(err) if strict => return Err(format!("malformed attribute: {err}")),
                Err(err) => {
                    debug!("skipping malformed attribute: {}", err);
                    continue;
                }
            };
            let key = attr.key.as_ref();
            let slot = match key {
                b"class" => &mut attrs.class,
                b"title" => &mut attrs.title,
                b"lang" | b"xml:lang" => &mut attrs.language,
                _ => continue,
            };
            let raw = String::from_utf8_lossy(&attr.value);
            *slot = Some(self.unescape(&raw)?.into_owned());
        }
        Ok(attrs)
    }

    fn unescape<'a>(&self, raw: &'a str) -> Result<Cow<'a, str>, String> {
        match self.options.leniency {
            Leniency::Strict => {
                quick_xml::escape::unescape(raw).map_err(|e| format!("bad entity: {e}"))
            }
            // Each reference resolves on its own; unknown ones stay as written.
            Leniency::Permissive => Ok(RE_ENTITY.replace_all(raw, |caps: &regex::Captures<'_>| {
                resolve_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            })),
        }
    }

    fn open_zone(&mut self, kind: ZoneKind, class: String, attrs: &Attrs) {
        if kind == ZoneKind::Page {
            match self.page.as_mut() {
                Some(page) if page.implicit => self.finish_page(),
                Some(page) => {
                    page.nested += 1;
                    let err = PageError::parse(
                        page.page_num,
                        format!("{class} ({kind})"),
                        "page nested inside another page",
                    );
                    self.fail(err);
                    return;
                }
                None => {}
            }
            self.page = Some(OpenPage {
                page_num: self.pages.len() + 1,
                events: Vec::new(),
                error: None,
                implicit: false,
                nested: 0,
            });
        } else if self.page.is_none() {
            debug!("zone outside any ocr_page; opening an implicit page");
            let page_num = self.pages.len() + 1;
            self.page = Some(OpenPage {
                page_num,
                events: vec![NodeEvent::Open(Node::new(ZoneKind::Page, "implicit page"))],
                error: None,
                implicit: true,
                nested: 0,
            });
        }

        let mut node = Node::new(kind, class);
        node.language = attrs.language.clone();
        if let Some(ref title) = attrs.title {
            match parse_title(title) {
                Ok(props) => {
                    node.bbox = props.bbox;
                    node.baseline = props.baseline;
                    node.confidence = props.confidence;
                    node.char_boxes = props.char_boxes;
                }
                Err(detail) => {
                    let page_num = self.page.as_ref().map_or(1, |p| p.page_num);
                    self.fail(PageError::parse(page_num, node.describe(), detail));
                    return;
                }
            }
        }
        self.push_event(NodeEvent::Open(node));
    }

    fn close_zone(&mut self, kind: ZoneKind) {
        let Some(page) = self.page.as_mut() else {
            return;
        };
        if kind == ZoneKind::Page {
            if page.nested > 0 {
                page.nested -= 1;
            } else if !page.implicit {
                self.finish_page();
            }
            return;
        }
        self.push_event(NodeEvent::Close(kind));
    }

    fn end(&mut self, name: &str) {
        match self.elements.iter().rposition(|e| e.name == name) {
            Some(idx) => {
                while self.elements.len() > idx {
                    if let Some(el) = self.elements.pop() {
                        if let Some(kind) = el.zone {
                            self.close_zone(kind);
                        }
                    }
                }
            }
            None => debug!("ignoring stray end tag </{}>", name),
        }
    }

    fn text(&mut self, e: &quick_xml::events::BytesText<'_>) -> Result<(), String> {
        if self.page.is_none() {
            return Ok(());
        }
        if matches!(
            self.elements.last().map(|e| e.name.as_str()),
            Some("script") | Some("style")
        ) {
            return Ok(());
        }
        let raw = String::from_utf8_lossy(e);
        let text = self.unescape(&raw)?.into_owned();
        self.push_text(text);
        Ok(())
    }

    fn push_text(&mut self, text: String) {
        if !text.is_empty() {
            self.push_event(NodeEvent::Text(text));
        }
    }

    fn push_event(&mut self, event: NodeEvent) {
        if let Some(page) = self.page.as_mut() {
            if page.error.is_none() {
                page.events.push(event);
            }
        }
    }

    /// Record the first error of the open page; later events are dropped.
    fn fail(&mut self, err: PageError) {
        if let Some(page) = self.page.as_mut() {
            if page.error.is_none() {
                warn!("{}", err);
                page.error = Some(err);
                page.events = Vec::new();
            }
        }
    }

    fn finish_page(&mut self) {
        if let Some(mut page) = self.page.take() {
            if page.implicit && page.error.is_none() {
                page.events.push(NodeEvent::Close(ZoneKind::Page));
            }
            let events = match page.error {
                Some(err) => Err(err),
                None => Ok(page.events),
            };
            self.pages.push(PageNodes {
                page_num: page.page_num,
                events,
            });
        }
    }

    /// Unrecoverable markup error: fail the open page and stop.
    fn abort(&mut self, detail: String) {
        let page_num = self
            .page
            .as_ref()
            .map_or(self.pages.len() + 1, |p| p.page_num);
        let err = PageError::parse(page_num, "document", detail);
        if self.page.is_some() {
            self.fail(err);
            self.finish_page();
        } else {
            warn!("{}", err);
            self.pages.push(PageNodes {
                page_num,
                events: Err(err),
            });
        }
    }

    fn finish(mut self) -> Vec<PageNodes> {
        if self.options.leniency == Leniency::Strict {
            if let Some(el) = self.elements.last() {
                let detail = format!("unexpected end of document inside <{}>", el.name);
                self.abort(detail);
                return self.pages;
            }
        }
        while let Some(el) = self.elements.pop() {
            if let Some(kind) = el.zone {
                self.close_zone(kind);
            }
        }
        self.finish_page();

        if self.pages.is_empty() {
            let err = PageError::parse(1, "document", "no hOCR zone markers found");
            warn!("{}", err);
            self.pages.push(PageNodes {
                page_num: 1,
                events: Err(err),
            });
        }
        self.pages
    }
}
