//! Zone data model: the recognised-text hierarchy of one page.
//!
//! A page is stored as an arena ([`PageTree`]) of [`Zone`] records addressed
//! by [`ZoneId`]. Parent links are indices, never references, so the arena is
//! the sole owner of every zone on the page and the tree can be moved to a
//! worker thread as a single value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Zone kinds ───────────────────────────────────────────────────────────

/// Hierarchy level of a zone, ordered by nesting depth (`Page` is coarsest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Page,
    Column,
    Paragraph,
    Line,
    Word,
    Character,
}

impl ZoneKind {
    /// All kinds from coarsest to finest.
    pub const ALL: [ZoneKind; 6] = [
        ZoneKind::Page,
        ZoneKind::Column,
        ZoneKind::Paragraph,
        ZoneKind::Line,
        ZoneKind::Word,
        ZoneKind::Character,
    ];

    /// Keyword used for this kind in the djvused expression grammar.
    pub fn keyword(self) -> &'static str {
        match self {
            ZoneKind::Page => "page",
            ZoneKind::Column => "column",
            ZoneKind::Paragraph => "para",
            ZoneKind::Line => "line",
            ZoneKind::Word => "word",
            ZoneKind::Character => "char",
        }
    }

    /// Inverse of [`ZoneKind::keyword`].
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.keyword() == keyword)
    }

    /// Map an hOCR class name onto a zone kind.
    pub fn from_hocr_class(class: &str) -> Option<Self> {
        match class {
            "ocr_page" => Some(ZoneKind::Page),
            "ocr_column" | "ocr_carea" | "ocrx_block" => Some(ZoneKind::Column),
            "ocr_par" => Some(ZoneKind::Paragraph),
            "ocr_line" | "ocrx_line" | "ocr_header" | "ocr_caption" | "ocr_textfloat" => {
                Some(ZoneKind::Line)
            }
            "ocrx_word" | "ocr_word" => Some(ZoneKind::Word),
            "ocrx_cinfo" | "ocr_cinfo" => Some(ZoneKind::Character),
            _ => None,
        }
    }

    /// Separator inserted between the texts of two sibling zones of this
    /// kind when they are merged into a coarser zone.
    pub fn text_separator(self) -> &'static str {
        match self {
            ZoneKind::Character => "",
            ZoneKind::Word => " ",
            ZoneKind::Line | ZoneKind::Paragraph | ZoneKind::Column | ZoneKind::Page => "\n",
        }
    }
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for ZoneKind {
    type Err = String;

    /// Accepts the grammar keywords plus the long and plural spellings used
    /// on command lines (`lines`, `words`, `chars`, `paragraph`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "page" | "pages" => Ok(ZoneKind::Page),
            "column" | "columns" => Ok(ZoneKind::Column),
            "para" | "paras" | "paragraph" | "paragraphs" => Ok(ZoneKind::Paragraph),
            "line" | "lines" => Ok(ZoneKind::Line),
            "word" | "words" => Ok(ZoneKind::Word),
            "char" | "chars" | "character" | "characters" => Ok(ZoneKind::Character),
            other => Err(format!(
                "unknown detail level '{other}' (expected page, column, para, line, word or char)"
            )),
        }
    }
}

// ── Geometry ─────────────────────────────────────────────────────────────

/// Axis-aligned bounding box `(x0, y0, x1, y1)` with `x0 <= x1`, `y0 <= y1`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl BBox {
    /// Build a box, returning `None` if the corners are inverted.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Option<Self> {
        (x0 <= x1 && y0 <= y1).then_some(Self { x0, y0, x1, y1 })
    }

    /// Whether `other` lies entirely inside `self` (edges may touch).
    pub fn contains(&self, other: &BBox) -> bool {
        other.x0 >= self.x0 && other.y0 >= self.y0 && other.x1 <= self.x1 && other.y1 <= self.y1
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Union of a sequence of boxes; `None` when the sequence is empty.
    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a BBox>) -> Option<BBox> {
        boxes.into_iter().fold(None, |acc, b| {
            Some(match acc {
                None => *b,
                Some(a) => a.union(b),
            })
        })
    }

    /// Clamp `self` into `outer`.
    ///
    /// Each coordinate is pinned to `outer`'s range, so the result is the
    /// intersection when the boxes overlap and a degenerate box on `outer`'s
    /// nearest edge when they do not.
    pub fn clamp_to(&self, outer: &BBox) -> BBox {
        let cx = |v: i32| v.clamp(outer.x0, outer.x1);
        let cy = |v: i32| v.clamp(outer.y0, outer.y1);
        BBox {
            x0: cx(self.x0),
            y0: cy(self.y0),
            x1: cx(self.x1),
            y1: cy(self.y1),
        }
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.x0, self.y0, self.x1, self.y1)
    }
}

/// Page dimensions, either in source pixels or in target physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: u32,
    pub height: u32,
}

impl PageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for PageSize {
    type Err = String;

    /// Parse `WIDTHxHEIGHT`, e.g. `2480x3508`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("invalid page size '{s}': expected WIDTHxHEIGHT"))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| format!("invalid page width '{w}'"))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| format!("invalid page height '{h}'"))?;
        Ok(Self { width, height })
    }
}

// ── Arena ────────────────────────────────────────────────────────────────

/// Index of a zone inside its [`PageTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub usize);

/// One node of the recognised-text hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub kind: ZoneKind,
    pub bbox: BBox,
    /// Recognised text; present only on leaves.
    pub text: Option<String>,
    /// Children in reading order as produced upstream.
    pub children: Vec<ZoneId>,
    pub parent: Option<ZoneId>,
    /// Resolved language (inherited unless overridden on this node).
    pub language: Option<String>,
    pub confidence: Option<f64>,
    /// hOCR class the zone came from; `None` for derived zones.
    pub class: Option<String>,
}

impl Zone {
    pub fn new(kind: ZoneKind, bbox: BBox) -> Self {
        Self {
            kind,
            bbox,
            text: None,
            children: Vec::new(),
            parent: None,
            language: None,
            confidence: None,
            class: None,
        }
    }

    /// Node description for error messages, e.g. `ocr_line (line)`.
    pub fn describe(&self) -> String {
        match self.class {
            Some(ref class) => format!("{class} ({})", self.kind),
            None => format!("derived {} at {}", self.kind, self.bbox),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The completed zone tree for one page.
///
/// After [`PageTree::compact`] the arena holds exactly the zones reachable
/// from the root, stored in pre-order with the root at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTree {
    /// 1-based page number within the source document.
    pub page: usize,
    pub zones: Vec<Zone>,
    pub root: ZoneId,
    /// Source pixel dimensions, when known from markup or configuration.
    pub pixel_size: Option<PageSize>,
    /// Number of zones whose bbox was clamped into their parent.
    pub clamped: usize,
}

impl PageTree {
    pub fn zone(&self, id: ZoneId) -> &Zone {
        &self.zones[id.0]
    }

    pub fn zone_mut(&mut self, id: ZoneId) -> &mut Zone {
        &mut self.zones[id.0]
    }

    pub fn root_zone(&self) -> &Zone {
        self.zone(self.root)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Zone ids in pre-order (parents before children, siblings in order).
    pub fn preorder(&self) -> Vec<ZoneId> {
        let mut out = Vec::with_capacity(self.zones.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.zone(id).children.iter().rev().copied());
        }
        out
    }

    /// Ancestor chain of `id`, nearest first (excluding `id` itself).
    pub fn ancestors(&self, id: ZoneId) -> Vec<ZoneId> {
        let mut out = Vec::new();
        let mut cur = self.zone(id).parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.zone(p).parent;
        }
        out
    }

    /// Depth of the finest kind present in the tree.
    pub fn deepest_kind(&self) -> ZoneKind {
        self.zones
            .iter()
            .map(|z| z.kind)
            .max()
            .unwrap_or(ZoneKind::Page)
    }

    /// Text of a zone: its own text for leaves, otherwise the children's
    /// texts joined by the children's kind separator.
    pub fn text_of(&self, id: ZoneId) -> String {
        let zone = self.zone(id);
        if zone.is_leaf() {
            return zone.text.clone().unwrap_or_default();
        }
        let mut out = String::new();
        for (i, child) in zone.children.iter().enumerate() {
            if i > 0 {
                out.push_str(self.zone(*child).kind.text_separator());
            }
            out.push_str(&self.text_of(*child));
        }
        out
    }

    /// Rebuild the arena from `root`, dropping unreachable zones and
    /// renumbering the rest in pre-order.
    pub fn compact(
        page: usize,
        mut zones: Vec<Zone>,
        root: ZoneId,
        pixel_size: Option<PageSize>,
    ) -> PageTree {
        let mut out: Vec<Zone> = Vec::with_capacity(zones.len());
        // (old id, new parent id)
        let mut stack: Vec<(ZoneId, Option<ZoneId>)> = vec![(root, None)];
        while let Some((old, parent)) = stack.pop() {
            let new_id = ZoneId(out.len());
            let mut zone =
                std::mem::replace(&mut zones[old.0], Zone::new(ZoneKind::Page, BBox::default()));
            let old_children = std::mem::take(&mut zone.children);
            zone.parent = parent;
            out.push(zone);
            if let Some(p) = parent {
                out[p.0].children.push(new_id);
            }
            stack.extend(old_children.iter().rev().map(|c| (*c, Some(new_id))));
        }
        PageTree {
            page,
            zones: out,
            root: ZoneId(0),
            pixel_size,
            clamped: 0,
        }
    }
}
