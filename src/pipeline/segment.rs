//! Word segmentation: derive word zones from line text plus per-character
//! geometry.
//!
//! Boundary detection is a pluggable capability ([`WordBreaker`]): given a
//! text and an optional locale it returns the codepoint offsets at which
//! spans end. Two policies are built in:
//!
//! | Breaker                | Boundaries                                          |
//! |------------------------|-----------------------------------------------------|
//! | [`SimpleWordBreaker`]  | whitespace / non-whitespace transitions only        |
//! | [`UnicodeWordBreaker`] | Unicode word boundaries (UAX #29)                   |
//!
//! [`segment_line`] turns the spans into words: whitespace spans are
//! skipped and every other span becomes a word whose bbox is the union of
//! the character boxes inside it.

use crate::zone::BBox;
use thiserror::Error;
use unicode_segmentation::UnicodeSegmentation;

/// Word-boundary capability: `text, locale → ordered boundary offsets`.
///
/// Offsets are codepoint indices into `text`, strictly increasing, and the
/// last one equals the codepoint count. Empty text has no boundaries.
pub trait WordBreaker: Send + Sync {
    fn boundaries(&self, text: &str, locale: Option<&str>) -> Vec<usize>;
}

/// Breaks only where whitespace meets non-whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleWordBreaker;

impl WordBreaker for SimpleWordBreaker {
    fn boundaries(&self, text: &str, _locale: Option<&str>) -> Vec<usize> {
        let mut out = Vec::new();
        let mut prev: Option<bool> = None;
        let mut len = 0;
        for (i, c) in text.chars().enumerate() {
            let ws = c.is_whitespace();
            if prev.is_some_and(|p| p != ws) {
                out.push(i);
            }
            prev = Some(ws);
            len = i + 1;
        }
        if len > 0 {
            out.push(len);
        }
        out
    }
}

/// Unicode default word boundaries (UAX #29).
///
/// The locale argument is ignored: boundaries follow the untailored
/// default rules for every language. For locale-aware segmentation, pass
/// your own breaker through
/// [`ConversionConfigBuilder::word_breaker`](crate::config::ConversionConfigBuilder::word_breaker),
/// which sets [`ConversionConfig::word_breaker`](crate::config::ConversionConfig::word_breaker).
#[derive(Debug, Clone, Copy, Default)]
pub struct UnicodeWordBreaker;

impl WordBreaker for UnicodeWordBreaker {
    fn boundaries(&self, text: &str, _locale: Option<&str>) -> Vec<usize> {
        let mut out = Vec::new();
        let mut offset = 0;
        for (_, piece) in text.split_word_bound_indices() {
            offset += piece.chars().count();
            out.push(offset);
        }
        out
    }
}

/// One codepoint of a line together with its pixel box, if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharCell {
    pub ch: char,
    pub bbox: Option<BBox>,
}

impl CharCell {
    pub fn new(ch: char, bbox: Option<BBox>) -> Self {
        Self { ch, bbox }
    }
}

/// A derived word: codepoint range `[start, end)` of the line text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
    pub bbox: BBox,
    pub cells: Vec<CharCell>,
}

/// Spans and character geometry cannot be aligned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct SpanMismatch {
    pub start: usize,
    pub end: usize,
    pub detail: String,
}

/// Split `text` into spans with `breaker`, normalising its offsets.
pub fn spans(text: &str, breaker: &dyn WordBreaker, locale: Option<&str>) -> Vec<(usize, usize)> {
    let len = text.chars().count();
    let mut bounds: Vec<usize> = breaker
        .boundaries(text, locale)
        .into_iter()
        .filter(|&b| b > 0 && b <= len)
        .collect();
    bounds.sort_unstable();
    bounds.dedup();
    if len > 0 && bounds.last() != Some(&len) {
        bounds.push(len);
    }

    let mut start = 0;
    bounds
        .into_iter()
        .map(|end| {
            let span = (start, end);
            start = end;
            span
        })
        .collect()
}

/// Segment one line into words.
///
/// `cells` must hold exactly one entry per codepoint of `text`. A
/// non-whitespace span none of whose cells carries a box is a mismatch.
pub fn segment_line(
    text: &str,
    cells: &[CharCell],
    breaker: &dyn WordBreaker,
    locale: Option<&str>,
) -> Result<Vec<WordSpan>, SpanMismatch> {
    let len = text.chars().count();
    if cells.len() != len {
        return Err(SpanMismatch {
            start: 0,
            end: len,
            detail: format!("{} character boxes for {} characters", cells.len(), len),
        });
    }

    let mut words = Vec::new();
    for (start, end) in spans(text, breaker, locale) {
        let slice = &cells[start..end];
        if slice.iter().all(|c| c.ch.is_whitespace()) {
            continue;
        }
        let word: String = slice.iter().map(|c| c.ch).collect();
        let bbox = BBox::union_all(slice.iter().filter_map(|c| c.bbox.as_ref())).ok_or_else(
            || SpanMismatch {
                start,
                end,
                detail: format!("no character geometry for '{word}' at {start}..{end}"),
            },
        )?;
        words.push(WordSpan {
            start,
            end,
            text: word,
            bbox,
            cells: slice.to_vec(),
        });
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(text: &str, width: i32) -> Vec<CharCell> {
        text.chars()
            .enumerate()
            .map(|(i, ch)| {
                let x = i as i32 * width;
                CharCell::new(ch, BBox::new(x, 0, x + width, 10))
            })
            .collect()
    }

    #[test]
    fn simple_breaks_at_whitespace_transitions() {
        let b = SimpleWordBreaker;
        assert_eq!(b.boundaries("ab  cd", None), vec![2, 4, 6]);
        assert_eq!(b.boundaries(" a", None), vec![1, 2]);
        assert!(b.boundaries("", None).is_empty());
    }

    #[test]
    fn unicode_splits_punctuation() {
        let b = UnicodeWordBreaker;
        let line = "Hello, world";
        let parts: Vec<String> = spans(line, &b, None)
            .into_iter()
            .map(|(s, e)| line.chars().skip(s).take(e - s).collect())
            .collect();
        assert_eq!(parts, vec!["Hello", ",", " ", "world"]);
    }

    #[test]
    fn unicode_offsets_are_codepoints() {
        let b = UnicodeWordBreaker;
        assert_eq!(b.boundaries("jeż ó", None), vec![3, 4, 5]);
    }

    #[test]
    fn segment_two_words() {
        let text = "ab cd";
        let words = segment_line(text, &cells(text, 10), &SimpleWordBreaker, None).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "ab");
        assert_eq!(words[0].bbox, BBox::new(0, 0, 20, 10).unwrap());
        assert_eq!(words[1].text, "cd");
        assert_eq!(words[1].bbox, BBox::new(30, 0, 50, 10).unwrap());
        assert_eq!((words[1].start, words[1].end), (3, 5));
    }

    #[test]
    fn whitespace_cells_may_lack_geometry() {
        let mut c = cells("a b", 10);
        c[1].bbox = None;
        let words = segment_line("a b", &c, &SimpleWordBreaker, None).unwrap();
        assert_eq!(words.len(), 2);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let text = "abc";
        let err = segment_line(text, &cells("ab", 10), &SimpleWordBreaker, None).unwrap_err();
        assert!(err.detail.contains("2 character boxes for 3"), "got: {}", err.detail);
    }

    #[test]
    fn span_without_geometry_is_an_error() {
        let mut c = cells("ab cd", 10);
        c[3].bbox = None;
        c[4].bbox = None;
        let err = segment_line("ab cd", &c, &SimpleWordBreaker, None).unwrap_err();
        assert_eq!((err.start, err.end), (3, 5));
    }

    struct FixedBreaker(Vec<usize>);

    impl WordBreaker for FixedBreaker {
        fn boundaries(&self, _text: &str, _locale: Option<&str>) -> Vec<usize> {
            self.0.clone()
        }
    }

    #[test]
    fn injected_breaker_offsets_are_normalised() {
        // Out-of-order, duplicated, and short of the end.
        let b = FixedBreaker(vec![2, 2, 0, 1]);
        assert_eq!(spans("abcd", &b, None), vec![(0, 1), (1, 2), (2, 4)]);
    }
}
