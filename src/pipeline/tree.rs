//! Zone tree builder: node events → one validated [`PageTree`] per page.
//!
//! The builder keeps an explicit stack of open frames, one per zone marker
//! seen. A frame whose kind is coarser than or equal to the requested
//! detail becomes a zone when it closes; finer frames are merged into their
//! parent: their text (and per-character geometry) is appended to the
//! parent's buffer with the separator of their kind.
//!
//! Where words must be derived (a line without word markup, or
//! `resegment`), the line's buffer is handed to the word segmenter. At
//! character detail, words with per-character geometry get `char` zones.
//!
//! Once the page is complete the arena is compacted and two checks run:
//! the zone nesting must be consistent across the page, and every child
//! bbox must lie inside its parent (clamped or rejected by policy).

use crate::config::{ConversionConfig, GeometryPolicy};
use crate::error::PageError;
use crate::pipeline::markup::{Node, NodeEvent, PageNodes};
use crate::pipeline::segment::{segment_line, CharCell, WordBreaker};
use crate::zone::{BBox, PageSize, PageTree, Zone, ZoneId, ZoneKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct Frame {
    node: Node,
    materialized: bool,
    language: Option<String>,
    /// Own and merged text, one cell per codepoint.
    cells: Vec<CharCell>,
    /// Set when `x_bboxes` could not be aligned with the text.
    mismatch: bool,
    children: Vec<ZoneId>,
}

impl Frame {
    fn text(&self) -> String {
        self.cells.iter().map(|c| c.ch).collect()
    }

    fn has_text(&self) -> bool {
        self.cells.iter().any(|c| !c.ch.is_whitespace())
    }

    fn has_geometry(&self) -> bool {
        self.cells.iter().any(|c| c.bbox.is_some())
    }

    /// Apply this node's own geometry to its buffer and trim it.
    fn seal(&mut self) {
        if self.node.kind == ZoneKind::Character {
            if let Some(bbox) = self.node.bbox {
                for cell in &mut self.cells {
                    cell.bbox = Some(bbox);
                }
            }
        }
        trim_cells(&mut self.cells);

        let boxes = std::mem::take(&mut self.node.char_boxes);
        if boxes.is_empty() {
            return;
        }
        let solid = self.cells.iter().filter(|c| !c.ch.is_whitespace()).count();
        if boxes.len() == self.cells.len() {
            for (cell, bbox) in self.cells.iter_mut().zip(boxes) {
                cell.bbox = Some(bbox);
            }
        } else if boxes.len() == solid {
            let targets = self.cells.iter_mut().filter(|c| !c.ch.is_whitespace());
            for (cell, bbox) in targets.zip(boxes) {
                cell.bbox = Some(bbox);
            }
        } else {
            debug!(
                "{}: {} x_bboxes for {} characters",
                self.node.describe(),
                boxes.len(),
                self.cells.len()
            );
            self.mismatch = true;
        }
    }

    /// Merge a finer frame's content into this one.
    fn absorb(&mut self, kind: ZoneKind, cells: Vec<CharCell>, mismatch: bool) {
        self.mismatch |= mismatch;
        if cells.is_empty() {
            return;
        }
        let mut gap = false;
        while self.cells.last().is_some_and(|c| c.ch.is_whitespace()) {
            self.cells.pop();
            gap = true;
        }
        if !self.cells.is_empty() {
            // Characters outside a word keep one space where the markup had whitespace.
            let separator = match kind.text_separator() {
                "" if gap && self.node.kind < ZoneKind::Word => " ",
                sep => sep,
            };
            self.cells
                .extend(separator.chars().map(|ch| CharCell::new(ch, None)));
        }
        self.cells.extend(cells);
    }
}

fn trim_cells(cells: &mut Vec<CharCell>) {
    while cells.last().is_some_and(|c| c.ch.is_whitespace()) {
        cells.pop();
    }
    let lead = cells.iter().take_while(|c| c.ch.is_whitespace()).count();
    cells.drain(..lead);
}

struct TreeBuilder<'c> {
    page_num: usize,
    config: &'c ConversionConfig,
    breaker: Option<Arc<dyn WordBreaker>>,
    zones: Vec<Zone>,
    /// Codepoints and boxes behind every word zone, for re-segmentation.
    word_cells: HashMap<ZoneId, Vec<CharCell>>,
    stack: Vec<Frame>,
    root: Option<ZoneId>,
    pixel_size: Option<PageSize>,
}

/// Build the zone tree of one page.
pub fn build_page(nodes: PageNodes, config: &ConversionConfig) -> Result<PageTree, PageError> {
    let events = nodes.events?;
    let mut builder = TreeBuilder::new(nodes.page_num, config);
    for event in events {
        builder.feed(event)?;
    }
    builder.finish()
}

/// Lazy, finite sequence of page trees; each page is built on demand.
pub struct PageTrees<'c, I> {
    pages: I,
    config: &'c ConversionConfig,
}

impl<I: Iterator<Item = PageNodes>> Iterator for PageTrees<'_, I> {
    type Item = Result<PageTree, PageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pages.next().map(|p| build_page(p, self.config))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.pages.size_hint()
    }
}

pub fn build_trees<I>(pages: I, config: &ConversionConfig) -> PageTrees<'_, I::IntoIter>
where
    I: IntoIterator<Item = PageNodes>,
{
    PageTrees {
        pages: pages.into_iter(),
        config,
    }
}

impl<'c> TreeBuilder<'c> {
    fn new(page_num: usize, config: &'c ConversionConfig) -> Self {
        Self {
            page_num,
            config,
            breaker: config.breaker(),
            zones: Vec::new(),
            word_cells: HashMap::new(),
            stack: Vec::new(),
            root: None,
            pixel_size: None,
        }
    }

    /// Words are derived only at word detail or finer, with a breaker.
    fn segmenting(&self) -> bool {
        self.breaker.is_some() && self.config.details >= ZoneKind::Word
    }

    fn feed(&mut self, event: NodeEvent) -> Result<(), PageError> {
        match event {
            NodeEvent::Open(node) => self.open(node),
            NodeEvent::Text(text) => {
                if let Some(top) = self.stack.last_mut() {
                    top.cells
                        .extend(text.chars().map(|ch| CharCell::new(ch, None)));
                }
                Ok(())
            }
            NodeEvent::Close(kind) => {
                while let Some(top) = self.stack.last() {
                    let top_kind = top.node.kind;
                    self.close_top()?;
                    if top_kind == kind {
                        break;
                    }
                }
                Ok(())
            }
        }
    }

    fn open(&mut self, node: Node) -> Result<(), PageError> {
        if self.stack.is_empty() && node.kind != ZoneKind::Page {
            self.open(Node::new(ZoneKind::Page, "implicit page"))?;
        }
        let (inherited, parent_kind) = match self.stack.last() {
            Some(top) if node.kind <= top.node.kind => {
                return Err(PageError::parse(
                    self.page_num,
                    node.describe(),
                    format!("{} nested inside {}", node.kind, top.node.kind),
                ));
            }
            Some(top) => (top.language.clone(), Some(top.node.kind)),
            None => (None, None),
        };
        // A character zone only lives inside a word; elsewhere its text and
        // box merge into the parent, which derives words from them.
        let materialized = node.kind <= self.config.details
            && (node.kind != ZoneKind::Character || parent_kind == Some(ZoneKind::Word));
        let language = node
            .language
            .clone()
            .or(inherited)
            .or_else(|| self.config.language.clone());
        self.stack.push(Frame {
            materialized,
            node,
            language,
            cells: Vec::new(),
            mismatch: false,
            children: Vec::new(),
        });
        Ok(())
    }

    fn close_top(&mut self) -> Result<(), PageError> {
        let Some(mut frame) = self.stack.pop() else {
            return Ok(());
        };
        frame.seal();

        if !frame.materialized {
            match self.stack.last_mut() {
                Some(parent) => parent.absorb(frame.node.kind, frame.cells, frame.mismatch),
                None => {
                    return Err(PageError::Internal {
                        page: self.page_num,
                        detail: format!("{} closed without a page", frame.node.describe()),
                    })
                }
            }
            return Ok(());
        }

        let id = self.materialize(frame)?;
        match (id, self.stack.last_mut()) {
            (Some(id), Some(parent)) => parent.children.push(id),
            (Some(id), None) => self.root = Some(id),
            (None, _) => {}
        }
        Ok(())
    }

    fn materialize(&mut self, frame: Frame) -> Result<Option<ZoneId>, PageError> {
        let kind = frame.node.kind;
        let describe = frame.node.describe();
        let mut children = frame.children.clone();
        let mut text = None;
        let mut cells = Vec::new();

        if !children.is_empty() {
            if frame.has_text() {
                warn!(
                    page = self.page_num,
                    "{}: dropping text outside child zones: {:?}",
                    describe,
                    frame.text().trim()
                );
            }
            if kind == ZoneKind::Line && self.segmenting() {
                let has_words = children
                    .iter()
                    .any(|c| self.zones[c.0].kind == ZoneKind::Word);
                if !has_words || self.config.resegment {
                    let line = self.cells_of(&children);
                    if line.iter().any(|c| c.bbox.is_some()) {
                        debug!(page = self.page_num, "{}: re-deriving words", describe);
                        children = self.derive_words(&line, frame.language.clone(), &describe)?;
                    }
                }
            }
            if kind == ZoneKind::Word {
                cells = self.cells_of(&children);
            }
        } else if frame.has_text() {
            let aligned = frame.has_geometry() || frame.mismatch;
            if kind == ZoneKind::Line && self.segmenting() && aligned {
                if frame.mismatch {
                    return Err(PageError::segmentation(
                        self.page_num,
                        describe,
                        "character boxes do not match the line text",
                    ));
                }
                children =
                    self.derive_words(&frame.cells, frame.language.clone(), &describe)?;
            } else if kind == ZoneKind::Word
                && self.config.details == ZoneKind::Character
                && aligned
            {
                if frame.mismatch {
                    return Err(PageError::segmentation(
                        self.page_num,
                        describe,
                        "character boxes do not match the word text",
                    ));
                }
                children = self.derive_chars(&frame.cells, &describe)?;
            } else {
                if kind == ZoneKind::Line && self.segmenting() {
                    debug!(
                        page = self.page_num,
                        "{}: no character geometry, keeping line as a leaf", describe
                    );
                }
                text = Some(frame.text());
            }
            if kind == ZoneKind::Word {
                cells = frame.cells.clone();
            }
        } else if kind != ZoneKind::Page {
            debug!(page = self.page_num, "dropping empty {}", describe);
            return Ok(None);
        }

        let bbox = self.resolve_bbox(&frame, &children, &describe)?;
        let mut zone = Zone::new(kind, bbox);
        zone.text = if children.is_empty() {
            text.or_else(|| Some(String::new()))
        } else {
            None
        };
        zone.children = children;
        zone.language = frame.language;
        zone.confidence = frame.node.confidence;
        zone.class = Some(frame.node.class);

        let id = self.push(zone);
        if kind == ZoneKind::Word {
            self.word_cells.insert(id, cells);
        }
        Ok(Some(id))
    }

    fn resolve_bbox(
        &mut self,
        frame: &Frame,
        children: &[ZoneId],
        describe: &str,
    ) -> Result<BBox, PageError> {
        if frame.node.kind == ZoneKind::Page {
            if let Some(bbox) = frame.node.bbox {
                self.pixel_size = match (u32::try_from(bbox.x1), u32::try_from(bbox.y1)) {
                    (Ok(w), Ok(h)) => Some(PageSize::new(w, h)),
                    _ => None,
                };
                return Ok(bbox);
            }
            let size = self.config.page_size.ok_or_else(|| {
                PageError::geometry(
                    self.page_num,
                    describe,
                    "page has no bbox and no page size was given",
                )
            })?;
            let (w, h) = match (i32::try_from(size.width), i32::try_from(size.height)) {
                (Ok(w), Ok(h)) => (w, h),
                _ => {
                    return Err(PageError::geometry(
                        self.page_num,
                        describe,
                        format!("page size {size} is too large"),
                    ))
                }
            };
            self.pixel_size = Some(size);
            return Ok(BBox { x0: 0, y0: 0, x1: w, y1: h });
        }

        if let Some(bbox) = frame.node.bbox {
            return Ok(bbox);
        }
        BBox::union_all(children.iter().map(|c| &self.zones[c.0].bbox))
            .or_else(|| BBox::union_all(frame.cells.iter().filter_map(|c| c.bbox.as_ref())))
            .ok_or_else(|| PageError::parse(self.page_num, describe, "zone has no bbox"))
    }

    fn push(&mut self, zone: Zone) -> ZoneId {
        let id = ZoneId(self.zones.len());
        self.zones.push(zone);
        id
    }

    /// Codepoints and boxes of existing child zones, words joined by a space.
    fn cells_of(&self, children: &[ZoneId]) -> Vec<CharCell> {
        let mut out = Vec::new();
        for (i, child) in children.iter().enumerate() {
            let zone = &self.zones[child.0];
            match zone.kind {
                ZoneKind::Word => {
                    if i > 0 {
                        out.push(CharCell::new(' ', None));
                    }
                    if let Some(cells) = self.word_cells.get(child) {
                        out.extend(cells.iter().cloned());
                    }
                }
                _ => {
                    let text = zone.text.as_deref().unwrap_or_default();
                    out.extend(text.chars().map(|ch| CharCell::new(ch, Some(zone.bbox))));
                }
            }
        }
        out
    }

    fn derive_words(
        &mut self,
        cells: &[CharCell],
        language: Option<String>,
        describe: &str,
    ) -> Result<Vec<ZoneId>, PageError> {
        let Some(breaker) = self.breaker.clone() else {
            return Ok(Vec::new());
        };
        let text: String = cells.iter().map(|c| c.ch).collect();
        let locale = self
            .config
            .segmentation_locale()
            .map(str::to_owned)
            .or_else(|| language.clone());
        let spans = segment_line(&text, cells, breaker.as_ref(), locale.as_deref())
            .map_err(|e| PageError::segmentation(self.page_num, describe, e.detail))?;
        debug!(
            page = self.page_num,
            "{}: {} words from {:?}",
            describe,
            spans.len(),
            text
        );

        let mut ids = Vec::with_capacity(spans.len());
        for span in spans {
            let mut zone = Zone::new(ZoneKind::Word, span.bbox);
            zone.language = language.clone();
            if self.config.details == ZoneKind::Character {
                zone.children = self.derive_chars(&span.cells, describe)?;
            } else {
                zone.text = Some(span.text);
            }
            let id = self.push(zone);
            self.word_cells.insert(id, span.cells);
            ids.push(id);
        }
        Ok(ids)
    }

    fn derive_chars(&mut self, cells: &[CharCell], describe: &str) -> Result<Vec<ZoneId>, PageError> {
        let mut ids = Vec::new();
        for cell in cells.iter().filter(|c| !c.ch.is_whitespace()) {
            let bbox = cell.bbox.ok_or_else(|| {
                PageError::segmentation(
                    self.page_num,
                    describe,
                    format!("no box for character {:?}", cell.ch),
                )
            })?;
            let mut zone = Zone::new(ZoneKind::Character, bbox);
            zone.text = Some(cell.ch.to_string());
            ids.push(self.push(zone));
        }
        Ok(ids)
    }

    fn finish(mut self) -> Result<PageTree, PageError> {
        while !self.stack.is_empty() {
            self.close_top()?;
        }
        let root = self.root.ok_or_else(|| {
            PageError::parse(self.page_num, "document", "page holds no zones")
        })?;
        let pixel_size = self.pixel_size.or(self.config.page_size);
        let mut tree = PageTree::compact(self.page_num, self.zones, root, pixel_size);
        check_nesting(&tree)?;
        enforce_containment(&mut tree, self.config.geometry)?;
        debug!(
            page = tree.page,
            zones = tree.len(),
            clamped = tree.clamped,
            "page tree built"
        );
        Ok(tree)
    }
}

/// Every intermediate kind used anywhere on the page must enclose each
/// finer zone.
fn check_nesting(tree: &PageTree) -> Result<(), PageError> {
    let present: Vec<ZoneKind> = ZoneKind::ALL
        .into_iter()
        .filter(|k| tree.zones.iter().any(|z| z.kind == *k))
        .collect();

    for id in tree.preorder() {
        let zone = tree.zone(id);
        let ancestors: Vec<ZoneKind> = tree
            .ancestors(id)
            .into_iter()
            .map(|a| tree.zone(a).kind)
            .collect();
        let missing = present
            .iter()
            .filter(|k| **k > ZoneKind::Page && **k < zone.kind)
            .find(|k| !ancestors.contains(k));
        if let Some(missing) = missing {
            return Err(PageError::parse(
                tree.page,
                zone.describe(),
                format!("inconsistent zone nesting: {} outside any {missing}", zone.kind),
            ));
        }
    }
    Ok(())
}

/// Top-down containment pass; clamped parents constrain their children.
fn enforce_containment(tree: &mut PageTree, policy: GeometryPolicy) -> Result<(), PageError> {
    for id in tree.preorder() {
        let Some(parent) = tree.zone(id).parent else {
            continue;
        };
        let outer = tree.zone(parent).bbox;
        let inner = tree.zone(id).bbox;
        if outer.contains(&inner) {
            continue;
        }
        match policy {
            GeometryPolicy::Reject => {
                return Err(PageError::geometry(
                    tree.page,
                    tree.zone(id).describe(),
                    format!("bbox {inner} extends outside parent {outer}"),
                ));
            }
            GeometryPolicy::Clamp => {
                let clamped = inner.clamp_to(&outer);
                warn!(
                    page = tree.page,
                    "{}: clamping bbox {} into {}",
                    tree.zone(id).describe(),
                    inner,
                    outer
                );
                tree.zone_mut(id).bbox = clamped;
                tree.clamped += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::markup::{parse_document, ParseOptions};

    const HELLO: &str = r#"<html><body>
        <div class="ocr_page" title="bbox 0 0 100 20">
          <span class="ocr_line" title="bbox 0 0 100 20">
            <span class="ocrx_word" title="bbox 0 0 40 20; x_wconf 90">Hello</span>
            <span class="ocrx_word" title="bbox 50 0 100 20; x_wconf 85">world</span>
          </span>
        </div></body></html>"#;

    fn build(markup: &str, config: &ConversionConfig) -> Result<PageTree, PageError> {
        let options = ParseOptions::from_config(config);
        let mut pages = parse_document(markup, &options);
        build_page(pages.remove(0), config)
    }

    fn kinds(tree: &PageTree) -> Vec<ZoneKind> {
        tree.preorder().into_iter().map(|id| tree.zone(id).kind).collect()
    }

    #[test]
    fn words_from_markup() {
        let tree = build(HELLO, &ConversionConfig::default()).unwrap();
        assert_eq!(
            kinds(&tree),
            vec![ZoneKind::Page, ZoneKind::Line, ZoneKind::Word, ZoneKind::Word]
        );
        assert_eq!(tree.text_of(tree.root), "Hello world");
        assert_eq!(tree.pixel_size, Some(PageSize::new(100, 20)));
        assert_eq!(tree.zone(ZoneId(2)).confidence, Some(90.0));
        assert_eq!(tree.zone(ZoneId(2)).class.as_deref(), Some("ocrx_word"));
    }

    #[test]
    fn finer_input_merges_upward() {
        let config = ConversionConfig::builder()
            .details(ZoneKind::Line)
            .build()
            .unwrap();
        let tree = build(HELLO, &config).unwrap();
        assert_eq!(kinds(&tree), vec![ZoneKind::Page, ZoneKind::Line]);
        assert_eq!(tree.zone(ZoneId(1)).text.as_deref(), Some("Hello world"));
    }

    #[test]
    fn page_detail_merges_everything() {
        let config = ConversionConfig::builder()
            .details(ZoneKind::Page)
            .build()
            .unwrap();
        let markup = r#"<div class="ocr_page" title="bbox 0 0 100 40">
            <span class="ocr_line" title="bbox 0 0 100 20"><span class="ocrx_word" title="bbox 0 0 10 10">a</span> <span class="ocrx_word" title="bbox 20 0 30 10">b</span></span>
            <span class="ocr_line" title="bbox 0 20 100 40">c</span>
        </div>"#;
        let tree = build(markup, &config).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root_zone().text.as_deref(), Some("a b\nc"));
    }

    #[test]
    fn line_without_words_is_segmented_from_x_bboxes() {
        let markup = r#"<div class="ocr_page" title="bbox 0 0 50 10">
            <span class="ocr_line" title="bbox 0 0 50 10; x_bboxes 0 0 10 10 10 0 20 10 30 0 40 10 40 0 50 10">ab cd</span>
        </div>"#;
        let tree = build(markup, &ConversionConfig::default()).unwrap();
        assert_eq!(
            kinds(&tree),
            vec![ZoneKind::Page, ZoneKind::Line, ZoneKind::Word, ZoneKind::Word]
        );
        assert_eq!(tree.zone(ZoneId(2)).bbox, BBox::new(0, 0, 20, 10).unwrap());
        assert_eq!(tree.zone(ZoneId(3)).text.as_deref(), Some("cd"));
    }

    #[test]
    fn line_without_geometry_stays_a_leaf() {
        let markup = r#"<div class="ocr_page" title="bbox 0 0 50 10">
            <span class="ocr_line" title="bbox 0 0 50 10">ab cd</span>
        </div>"#;
        let tree = build(markup, &ConversionConfig::default()).unwrap();
        assert_eq!(kinds(&tree), vec![ZoneKind::Page, ZoneKind::Line]);
        assert_eq!(tree.zone(ZoneId(1)).text.as_deref(), Some("ab cd"));
    }

    #[test]
    fn x_bboxes_count_mismatch_fails_segmentation() {
        let markup = r#"<div class="ocr_page" title="bbox 0 0 50 10">
            <span class="ocr_line" title="bbox 0 0 50 10; x_bboxes 0 0 10 10 10 0 20 10">ab cd</span>
        </div>"#;
        let err = build(markup, &ConversionConfig::default()).unwrap_err();
        assert!(matches!(err, PageError::SegmentationMismatch { page: 1, .. }), "{err}");
    }

    #[test]
    fn characters_from_char_markup() {
        let config = ConversionConfig::builder()
            .details(ZoneKind::Character)
            .build()
            .unwrap();
        let markup = r#"<div class="ocr_page" title="bbox 0 0 20 10">
            <span class="ocr_line" title="bbox 0 0 20 10">
              <span class="ocrx_word" title="bbox 0 0 20 10"><span class="ocrx_cinfo" title="bbox 0 0 10 10">o</span><span class="ocrx_cinfo" title="bbox 10 0 20 10">k</span></span>
            </span>
        </div>"#;
        let tree = build(markup, &config).unwrap();
        assert_eq!(tree.deepest_kind(), ZoneKind::Character);
        assert_eq!(tree.text_of(tree.root), "ok");
    }

    const CHARS_ONLY_LINE: &str = r#"<div class="ocr_page" title="bbox 0 0 50 10">
        <span class="ocr_line" title="bbox 0 0 50 10"><span class="ocrx_cinfo" title="bbox 0 0 10 10">a</span><span class="ocrx_cinfo" title="bbox 10 0 20 10">b</span> <span class="ocrx_cinfo" title="bbox 30 0 40 10">c</span><span class="ocrx_cinfo" title="bbox 40 0 50 10">d</span></span>
    </div>"#;

    #[test]
    fn spaced_characters_in_line_split_into_words() {
        let tree = build(CHARS_ONLY_LINE, &ConversionConfig::default()).unwrap();
        assert_eq!(
            kinds(&tree),
            vec![ZoneKind::Page, ZoneKind::Line, ZoneKind::Word, ZoneKind::Word]
        );
        assert_eq!(tree.zone(ZoneId(2)).text.as_deref(), Some("ab"));
        assert_eq!(tree.zone(ZoneId(2)).bbox, BBox::new(0, 0, 20, 10).unwrap());
        assert_eq!(tree.zone(ZoneId(3)).text.as_deref(), Some("cd"));
        assert_eq!(tree.zone(ZoneId(3)).bbox, BBox::new(30, 0, 50, 10).unwrap());
        assert_eq!(tree.text_of(tree.root), "ab cd");
    }

    #[test]
    fn spaced_characters_in_line_at_character_detail() {
        let config = ConversionConfig::builder()
            .details(ZoneKind::Character)
            .build()
            .unwrap();
        let tree = build(CHARS_ONLY_LINE, &config).unwrap();
        assert_eq!(
            kinds(&tree),
            vec![
                ZoneKind::Page,
                ZoneKind::Line,
                ZoneKind::Word,
                ZoneKind::Character,
                ZoneKind::Character,
                ZoneKind::Word,
                ZoneKind::Character,
                ZoneKind::Character,
            ]
        );
        assert_eq!(tree.text_of(ZoneId(2)), "ab");
        assert_eq!(tree.zone(ZoneId(5)).bbox, BBox::new(30, 0, 50, 10).unwrap());
        assert_eq!(tree.zone(ZoneId(7)).text.as_deref(), Some("d"));
    }

    #[test]
    fn characters_inside_word_ignore_markup_whitespace() {
        let markup = r#"<div class="ocr_page" title="bbox 0 0 20 10">
            <span class="ocr_line" title="bbox 0 0 20 10">
              <span class="ocrx_word" title="bbox 0 0 20 10">
                <span class="ocrx_cinfo" title="bbox 0 0 10 10">o</span>
                <span class="ocrx_cinfo" title="bbox 10 0 20 10">k</span>
              </span>
            </span>
        </div>"#;
        let tree = build(markup, &ConversionConfig::default()).unwrap();
        assert_eq!(tree.zone(ZoneId(2)).text.as_deref(), Some("ok"));
    }

    #[test]
    fn characters_materialised_from_word_geometry() {
        let config = ConversionConfig::builder()
            .details(ZoneKind::Character)
            .build()
            .unwrap();
        let markup = r#"<div class="ocr_page" title="bbox 0 0 20 10">
            <span class="ocr_line" title="bbox 0 0 20 10">
              <span class="ocrx_word" title="bbox 0 0 20 10; x_bboxes 0 0 10 10 10 0 20 10">ok</span>
            </span>
        </div>"#;
        let tree = build(markup, &config).unwrap();
        assert_eq!(
            kinds(&tree),
            vec![
                ZoneKind::Page,
                ZoneKind::Line,
                ZoneKind::Word,
                ZoneKind::Character,
                ZoneKind::Character
            ]
        );
    }

    #[test]
    fn resegment_replaces_producer_words() {
        let config = ConversionConfig::builder()
            .resegment(true)
            .word_segmentation(crate::config::WordSegmentation::Unicode { locale: None })
            .build()
            .unwrap();
        let markup = r#"<div class="ocr_page" title="bbox 0 0 60 10">
            <span class="ocr_line" title="bbox 0 0 60 10">
              <span class="ocrx_word" title="bbox 0 0 30 10; x_bboxes 0 0 10 10 10 0 20 10 20 0 30 10">ab,</span>
            </span>
        </div>"#;
        let tree = build(markup, &config).unwrap();
        let words: Vec<String> = tree
            .preorder()
            .into_iter()
            .filter(|id| tree.zone(*id).kind == ZoneKind::Word)
            .map(|id| tree.text_of(id))
            .collect();
        assert_eq!(words, vec!["ab", ","]);
    }

    #[test]
    fn overflowing_child_is_clamped() {
        let markup = r#"<div class="ocr_page" title="bbox 0 0 100 20">
            <span class="ocr_line" title="bbox 0 0 100 20">
              <span class="ocrx_word" title="bbox 90 5 130 25">edge</span>
            </span>
        </div>"#;
        let tree = build(markup, &ConversionConfig::default()).unwrap();
        assert_eq!(tree.clamped, 1);
        assert_eq!(tree.zone(ZoneId(2)).bbox, BBox::new(90, 5, 100, 20).unwrap());
    }

    #[test]
    fn overflowing_child_rejected_by_policy() {
        let config = ConversionConfig::builder()
            .geometry(GeometryPolicy::Reject)
            .build()
            .unwrap();
        let markup = r#"<div class="ocr_page" title="bbox 0 0 100 20">
            <span class="ocr_line" title="bbox 0 0 120 20">x</span>
        </div>"#;
        let err = build(markup, &config).unwrap_err();
        assert!(matches!(err, PageError::Geometry { .. }), "{err}");
    }

    #[test]
    fn inconsistent_nesting_is_a_parse_error() {
        let markup = r#"<div class="ocr_page" title="bbox 0 0 100 40">
            <p class="ocr_par" title="bbox 0 0 100 20"><span class="ocr_line" title="bbox 0 0 100 20">a</span></p>
            <span class="ocr_line" title="bbox 0 20 100 40">b</span>
        </div>"#;
        let err = build(markup, &ConversionConfig::default()).unwrap_err();
        match err {
            PageError::Parse { detail, node, .. } => {
                assert!(detail.contains("inconsistent"), "{detail}");
                assert!(node.contains("ocr_line"), "{node}");
            }
            other => panic!("expected parse error, got {other}"),
        }
    }

    #[test]
    fn coarser_kind_inside_finer_is_rejected() {
        let markup = r#"<div class="ocr_page" title="bbox 0 0 10 10">
            <span class="ocrx_word" title="bbox 0 0 10 10"><span class="ocr_line" title="bbox 0 0 10 10">x</span></span>
        </div>"#;
        assert!(matches!(
            build(markup, &ConversionConfig::default()),
            Err(PageError::Parse { .. })
        ));
    }

    #[test]
    fn empty_zones_are_dropped() {
        let markup = r#"<div class="ocr_page" title="bbox 0 0 10 10">
            <span class="ocr_line" title="bbox 0 0 10 10"><span class="ocrx_word" title="bbox 0 0 5 5"> </span></span>
        </div>"#;
        let tree = build(markup, &ConversionConfig::default()).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root_zone().text.as_deref(), Some(""));
    }

    #[test]
    fn implicit_page_needs_page_size() {
        let markup = r#"<body><span class="ocr_line" title="bbox 0 0 10 10">x</span></body>"#;
        let err = build(markup, &ConversionConfig::default()).unwrap_err();
        assert!(matches!(err, PageError::Geometry { .. }), "{err}");

        let config = ConversionConfig::builder()
            .page_size(PageSize::new(10, 10))
            .build()
            .unwrap();
        let tree = build(markup, &config).unwrap();
        assert_eq!(tree.root_zone().bbox, BBox::new(0, 0, 10, 10).unwrap());
        assert_eq!(tree.pixel_size, Some(PageSize::new(10, 10)));
    }

    #[test]
    fn language_is_inherited() {
        let config = ConversionConfig::builder().language("eng").build().unwrap();
        let markup = r#"<div class="ocr_page" title="bbox 0 0 20 10">
            <span class="ocr_line" title="bbox 0 0 20 10" lang="pol">
              <span class="ocrx_word" title="bbox 0 0 10 10">jeż</span>
            </span>
        </div>"#;
        let tree = build(markup, &config).unwrap();
        assert_eq!(tree.root_zone().language.as_deref(), Some("eng"));
        assert_eq!(tree.zone(ZoneId(2)).language.as_deref(), Some("pol"));
    }

    #[test]
    fn trees_are_built_lazily_in_order() {
        let markup = r#"<div class="ocr_page" title="bbox 0 0 1 1"></div>
            <div class="ocr_page" title="bbox 0 0 a 1"></div>
            <div class="ocr_page" title="bbox 0 0 2 2"></div>"#;
        let config = ConversionConfig::default();
        let pages = parse_document(markup, &ParseOptions::default());
        let results: Vec<_> = build_trees(pages, &config).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(PageError::Parse { page: 2, .. })));
        assert_eq!(results[2].as_ref().unwrap().page, 3);
    }
}
