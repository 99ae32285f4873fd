//! Property-Based Tests
//!
//! Invariants that must hold for arbitrary inputs:
//! - Child zones always end up inside their parents
//! - Output is a pure function of markup and configuration
//! - Serialised forms read back to the same tree
//! - Word segmentation never loses or reorders text
//! - The coordinate mapping is exact and invertible

use hocr_djvused::pipeline::segment::spans;
use hocr_djvused::{
    build_page, convert_sync, parse_document, parse_forms, process_page, segment_line, BBox,
    CharCell, ConversionConfig, CoordinateTransform, Form, GeometryPolicy, PageError, PageSize,
    PageTree, ParseOptions, SimpleWordBreaker, UnicodeWordBreaker, WordBreaker, ZoneId,
};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// A box anywhere in `lo..hi` on both axes.
fn any_box(lo: i32, hi: i32) -> impl Strategy<Value = BBox> {
    (lo..hi, lo..hi, lo..hi, lo..hi).prop_map(|(a, b, c, d)| BBox {
        x0: a.min(c),
        y0: b.min(d),
        x1: a.max(c),
        y1: b.max(d),
    })
}

fn title(b: &BBox) -> String {
    format!("bbox {} {} {} {}", b.x0, b.y0, b.x1, b.y1)
}

fn one_line_page(page: &BBox, line: &BBox, words: &[(BBox, String)]) -> String {
    let mut markup = format!(r#"<div class="ocr_page" title="{}">"#, title(page));
    markup.push_str(&format!(r#"<span class="ocr_line" title="{}">"#, title(line)));
    for (bbox, text) in words {
        markup.push_str(&format!(
            r#"<span class="ocrx_word" title="{}">{}</span> "#,
            title(bbox),
            text
        ));
    }
    markup.push_str("</span></div>");
    markup
}

fn build(markup: &str, config: &ConversionConfig) -> Result<PageTree, PageError> {
    let mut pages = parse_document(markup, &ParseOptions::from_config(config));
    build_page(pages.remove(0), config)
}

// ============================================================================
// Containment
// ============================================================================

/// Property: with the clamp policy every zone lies inside its parent.
#[test]
fn proptest_clamped_children_inside_parents() {
    proptest!(|(
        line in any_box(-40, 140),
        words in prop::collection::vec((any_box(-60, 160), "[a-z]{1,6}"), 1..8)
    )| {
        let page = BBox { x0: 0, y0: 0, x1: 100, y1: 50 };
        let markup = one_line_page(&page, &line, &words);
        let tree = build(&markup, &ConversionConfig::default()).unwrap();

        for id in tree.preorder() {
            if let Some(parent) = tree.zone(id).parent {
                let outer = tree.zone(parent).bbox;
                let inner = tree.zone(id).bbox;
                prop_assert!(outer.contains(&inner), "{inner} escapes {outer}");
            }
        }
        prop_assert_eq!(tree.root_zone().bbox, page);
    });
}

/// Property: the reject policy either fails with a geometry error or
/// accepts a tree that needed no clamping.
#[test]
fn proptest_reject_policy_never_clamps() {
    let config = ConversionConfig::builder()
        .geometry(GeometryPolicy::Reject)
        .build()
        .unwrap();
    proptest!(|(
        line in any_box(-20, 120),
        words in prop::collection::vec((any_box(-20, 120), "[a-z]{1,6}"), 1..5)
    )| {
        let page = BBox { x0: 0, y0: 0, x1: 100, y1: 100 };
        let markup = one_line_page(&page, &line, &words);
        match build(&markup, &config) {
            Ok(tree) => prop_assert_eq!(tree.clamped, 0),
            Err(e) => prop_assert!(matches!(e, PageError::Geometry { .. }), "{e}"),
        }
    });
}

// ============================================================================
// Determinism
// ============================================================================

/// Property: the script does not depend on concurrency or repetition.
#[test]
fn proptest_output_is_deterministic() {
    proptest!(ProptestConfig::with_cases(24), |(
        pages in prop::collection::vec(
            prop::collection::vec((any_box(0, 100), "[a-z]{1,6}"), 1..5),
            1..10,
        )
    )| {
        let page = BBox { x0: 0, y0: 0, x1: 100, y1: 100 };
        let mut markup = String::from("<html><body>");
        for words in &pages {
            markup.push_str(&one_line_page(&page, &page, words));
        }
        markup.push_str("</body></html>");

        let one = ConversionConfig::builder().concurrency(1).build().unwrap();
        let many = ConversionConfig::builder().concurrency(7).build().unwrap();
        let a = convert_sync(markup.clone(), &one).unwrap();
        let b = convert_sync(markup.clone(), &many).unwrap();
        let c = convert_sync(markup, &many).unwrap();
        prop_assert_eq!(&a.script, &b.script);
        prop_assert_eq!(&b.script, &c.script);
        prop_assert_eq!(a.stats.total_zones, b.stats.total_zones);
    });
}

// ============================================================================
// Round-trip
// ============================================================================

fn assert_same_tree(tree: &PageTree, id: ZoneId, form: &Form) -> Result<(), TestCaseError> {
    let zone = tree.zone(id);
    prop_assert_eq!(form.kind, zone.kind);
    let b = zone.bbox;
    prop_assert_eq!(form.bbox, [b.x0, b.y0, b.x1, b.y1]);
    if form.children.is_empty() {
        prop_assert_eq!(form.text.clone(), Some(tree.text_of(id)));
    } else {
        prop_assert_eq!(form.children.len(), zone.children.len());
        for (child, sub) in zone.children.iter().zip(&form.children) {
            assert_same_tree(tree, *child, sub)?;
        }
    }
    Ok(())
}

/// Property: reading a serialised page back reproduces its tree.
#[test]
fn proptest_forms_read_back_to_same_tree() {
    proptest!(|(
        words in prop::collection::vec((any_box(0, 200), r#"[a-zA-Z0-9"\\żé]{1,8}"#), 1..8),
        height in 1u32..400
    )| {
        let page = BBox { x0: 0, y0: 0, x1: 200, y1: 200 };
        let markup = one_line_page(&page, &page, &words);
        let config = ConversionConfig::builder()
            .target_size(PageSize::new(200, height))
            .build()
            .unwrap();

        let mut tree = build(&markup, &config).unwrap();
        hocr_djvused::transform_tree(&mut tree, config.target_size).unwrap();

        let mut pages = parse_document(&markup, &ParseOptions::from_config(&config));
        let result = process_page(pages.remove(0), &config);
        prop_assert!(result.is_ok());

        let forms = parse_forms(&result.form).unwrap();
        prop_assert_eq!(forms.len(), 1);
        assert_same_tree(&tree, tree.root, &forms[0])?;
    });
}

// ============================================================================
// Segmentation
// ============================================================================

fn check_reconstruction(text: &str, breaker: &dyn WordBreaker) -> Result<(), TestCaseError> {
    let chars: Vec<char> = text.chars().collect();
    let cells: Vec<CharCell> = chars
        .iter()
        .enumerate()
        .map(|(i, &ch)| {
            let x = i as i32 * 10;
            CharCell::new(ch, BBox::new(x, 0, x + 10, 10))
        })
        .collect();

    let joined: String = spans(text, breaker, None)
        .into_iter()
        .flat_map(|(s, e)| chars[s..e].iter())
        .collect();
    prop_assert_eq!(&joined, text);

    let words = segment_line(text, &cells, breaker, None).unwrap();
    let mut pos = 0;
    let mut rebuilt = String::new();
    for word in &words {
        prop_assert!(word.start >= pos);
        let gap: String = chars[pos..word.start].iter().collect();
        prop_assert!(gap.chars().all(char::is_whitespace), "lost text {gap:?}");
        rebuilt.push_str(&gap);
        let own: String = chars[word.start..word.end].iter().collect();
        prop_assert_eq!(&word.text, &own);
        prop_assert_eq!(word.bbox.x0, word.start as i32 * 10);
        prop_assert_eq!(word.bbox.x1, word.end as i32 * 10);
        rebuilt.push_str(&word.text);
        pos = word.end;
    }
    let tail: String = chars[pos..].iter().collect();
    prop_assert!(tail.chars().all(char::is_whitespace));
    rebuilt.push_str(&tail);
    prop_assert_eq!(rebuilt, text);
    Ok(())
}

/// Property: whitespace segmentation reproduces the line text.
#[test]
fn proptest_simple_segmentation_reconstructs_text() {
    proptest!(|(text in "[a-zA-Z0-9 \t,.!?'-]{0,40}")| {
        check_reconstruction(&text, &SimpleWordBreaker)?;
    });
}

/// Property: Unicode segmentation reproduces the line text.
#[test]
fn proptest_unicode_segmentation_reconstructs_text() {
    proptest!(|(text in "[a-zA-Zżółćéß0-9 ,.!?'-]{0,40}")| {
        check_reconstruction(&text, &UnicodeWordBreaker)?;
    });
}

// ============================================================================
// Coordinate transform
// ============================================================================

/// Property: a full-page box maps onto itself at unit scale.
#[test]
fn proptest_transform_identity() {
    proptest!(|(w in 1u32..20_000, h in 1u32..20_000)| {
        let size = PageSize::new(w, h);
        let t = CoordinateTransform::new(size, size).unwrap();
        let full = BBox { x0: 0, y0: 0, x1: w as i32, y1: h as i32 };
        prop_assert_eq!(t.map_bbox(&full), full);
    });
}

/// Property: mapping there and back returns the original coordinates.
#[test]
fn proptest_transform_inverse() {
    proptest!(|(
        pw in 1u32..10_000, ph in 1u32..10_000,
        tw in 1u32..10_000, th in 1u32..10_000,
        fx0 in 0.0f64..1.0, fy0 in 0.0f64..1.0,
        fx1 in 0.0f64..1.0, fy1 in 0.0f64..1.0
    )| {
        let pixel = PageSize::new(pw, ph);
        let target = PageSize::new(tw, th);
        let forward = CoordinateTransform::new(pixel, target).unwrap();
        let back = CoordinateTransform::new(target, pixel).unwrap();

        let (pw, ph) = (f64::from(pw), f64::from(ph));
        let rect = [
            fx0.min(fx1) * pw,
            fy0.min(fy1) * ph,
            fx0.max(fx1) * pw,
            fy0.max(fy1) * ph,
        ];
        let round_trip = back.map_rect(forward.map_rect(rect));
        for (a, b) in rect.iter().zip(round_trip) {
            prop_assert!((a - b).abs() < 1e-6, "{a} != {b}");
        }
    });
}

/// Property: mapped boxes keep their corners ordered.
#[test]
fn proptest_transform_keeps_boxes_valid() {
    proptest!(|(b in any_box(0, 1000), tw in 1u32..3000, th in 1u32..3000)| {
        let t = CoordinateTransform::new(PageSize::new(1000, 1000), PageSize::new(tw, th)).unwrap();
        let m = t.map_bbox(&b);
        prop_assert!(m.x0 <= m.x1 && m.y0 <= m.y1);
    });
}
