//! Serializer: zone tree → djvused text-layer expression.
//!
//! ```text
//! (page 0 0 2480 3508 (column ... (para ... (line ... (word x0 y0 x1 y1 "text"))))
//! ```
//!
//! Tokens are separated by exactly one space and a page is one line. Text
//! strings escape `\` and `"`; control characters (and, for ASCII output,
//! every non-ASCII character) are written as octal escapes of their UTF-8
//! bytes, e.g. `ż` → `\305\274`.
//!
//! [`parse_forms`] is the matching reader. It skips djvused commands at
//! the top level, so it accepts a whole script as well as bare forms.

use crate::config::{ConversionConfig, TextEncoding};
use crate::zone::{PageTree, ZoneId, ZoneKind};
use std::io::{self, Write};
use thiserror::Error;

/// Serializer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Zones of this kind are written as text leaves; finer zones are not
    /// written (except embedded characters).
    pub cutoff: ZoneKind,
    /// Write `char` forms inside `word` forms.
    pub embed_chars: bool,
    pub encoding: TextEncoding,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            cutoff: ZoneKind::Word,
            embed_chars: false,
            encoding: TextEncoding::Utf8,
        }
    }
}

impl SerializeOptions {
    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            cutoff: config.details,
            embed_chars: config.embeds_chars(),
            encoding: config.encoding,
        }
    }
}

/// Write the page form of `tree` (no trailing newline).
pub fn write_page<W: Write + ?Sized>(
    tree: &PageTree,
    options: &SerializeOptions,
    out: &mut W,
) -> io::Result<()> {
    write_zone(tree, tree.root, options, out)
}

/// Write the form of one zone and its subtree.
pub fn write_zone<W: Write + ?Sized>(
    tree: &PageTree,
    id: ZoneId,
    options: &SerializeOptions,
    out: &mut W,
) -> io::Result<()> {
    let zone = tree.zone(id);
    let b = zone.bbox;
    write!(out, "({} {} {} {} {}", zone.kind.keyword(), b.x0, b.y0, b.x1, b.y1)?;

    let nested: Vec<ZoneId> = zone
        .children
        .iter()
        .copied()
        .filter(|c| {
            let kind = tree.zone(*c).kind;
            kind <= options.cutoff && kind != ZoneKind::Character
        })
        .collect();

    let as_text = zone.kind >= options.cutoff || zone.kind == ZoneKind::Word || nested.is_empty();
    if as_text {
        out.write_all(b" \"")?;
        let mut buf = Vec::new();
        escape_into(&tree.text_of(id), options.encoding, &mut buf);
        out.write_all(&buf)?;
        out.write_all(b"\"")?;
    } else {
        for child in nested {
            out.write_all(b" ")?;
            write_zone(tree, child, options, out)?;
        }
    }

    if zone.kind == ZoneKind::Word && options.embed_chars {
        for child in &zone.children {
            if tree.zone(*child).kind == ZoneKind::Character {
                out.write_all(b" ")?;
                write_zone(tree, *child, options, out)?;
            }
        }
    }
    out.write_all(b")")
}

/// The page form as a string.
pub fn page_form(tree: &PageTree, options: &SerializeOptions) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_page(tree, options, &mut buf);
    String::from_utf8(buf).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Append `text` to `out` as the body of a quoted string.
pub fn escape_into(text: &str, encoding: TextEncoding, out: &mut Vec<u8>) {
    let mut utf8 = [0u8; 4];
    for ch in text.chars() {
        match ch {
            '\\' => out.extend_from_slice(b"\\\\"),
            '"' => out.extend_from_slice(b"\\\""),
            c if c.is_control() || (encoding == TextEncoding::Ascii && !c.is_ascii()) => {
                for byte in c.encode_utf8(&mut utf8).bytes() {
                    out.extend_from_slice(format!("\\{byte:03o}").as_bytes());
                }
            }
            c => out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes()),
        }
    }
}

// ── Reader ───────────────────────────────────────────────────────────────

/// One parsed zone form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub kind: ZoneKind,
    pub bbox: [i32; 4],
    pub text: Option<String>,
    pub children: Vec<Form>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected character {found:?} at byte {pos}")]
    Unexpected { found: char, pos: usize },
    #[error("unknown zone keyword '{0}'")]
    UnknownKind(String),
    #[error("invalid coordinate '{0}'")]
    BadCoordinate(String),
    #[error("invalid string escape at byte {0}")]
    BadEscape(usize),
    #[error("string is not valid UTF-8 at byte {0}")]
    BadUtf8(usize),
}

/// Read every top-level form of a script or a form sequence.
pub fn parse_forms(input: &str) -> Result<Vec<Form>, FormError> {
    let mut reader = FormReader {
        src: input.as_bytes(),
        pos: 0,
    };
    let mut forms = Vec::new();
    loop {
        reader.skip_ws();
        match reader.peek() {
            None => return Ok(forms),
            Some(b'(') => {
                reader.pos += 1;
                forms.push(reader.form()?);
            }
            Some(b'"') => {
                reader.string()?;
            }
            Some(_) => {
                // djvused commands and `.` separators.
                if reader.atom().is_empty() {
                    return Err(reader.unexpected());
                }
            }
        }
    }
}

struct FormReader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> FormReader<'a> {
    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn atom(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| !b.is_ascii_whitespace() && !matches!(b, b'(' | b')' | b'"'))
        {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default()
    }

    fn unexpected(&self) -> FormError {
        let rest = std::str::from_utf8(&self.src[self.pos..]).unwrap_or_default();
        match rest.chars().next() {
            Some(found) => FormError::Unexpected {
                found,
                pos: self.pos,
            },
            None => FormError::UnexpectedEof,
        }
    }

    /// Parse a form whose `(` was already consumed.
    fn form(&mut self) -> Result<Form, FormError> {
        self.skip_ws();
        let keyword = self.atom();
        let kind =
            ZoneKind::from_keyword(keyword).ok_or_else(|| FormError::UnknownKind(keyword.into()))?;
        let mut bbox = [0i32; 4];
        for slot in &mut bbox {
            self.skip_ws();
            let token = self.atom();
            if token.is_empty() {
                return Err(self.unexpected());
            }
            *slot = token
                .parse()
                .map_err(|_| FormError::BadCoordinate(token.into()))?;
        }

        let mut form = Form {
            kind,
            bbox,
            text: None,
            children: Vec::new(),
        };
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b')') => {
                    self.pos += 1;
                    return Ok(form);
                }
                Some(b'"') => form.text = Some(self.string()?),
                Some(b'(') => {
                    self.pos += 1;
                    form.children.push(self.form()?);
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn string(&mut self) -> Result<String, FormError> {
        let start = self.pos;
        self.pos += 1;
        let mut bytes = Vec::new();
        loop {
            let b = self.peek().ok_or(FormError::UnexpectedEof)?;
            self.pos += 1;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc_at = self.pos - 1;
                    let e = self.peek().ok_or(FormError::UnexpectedEof)?;
                    match e {
                        b'0'..=b'7' => {
                            let digits = self
                                .src
                                .get(self.pos..self.pos + 3)
                                .filter(|d| d.iter().all(|c| (b'0'..=b'7').contains(c)))
                                .ok_or(FormError::BadEscape(esc_at))?;
                            let value = digits
                                .iter()
                                .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                            bytes.push(u8::try_from(value).map_err(|_| FormError::BadEscape(esc_at))?);
                            self.pos += 3;
                        }
                        b'\\' | b'"' => {
                            bytes.push(e);
                            self.pos += 1;
                        }
                        b'n' => {
                            bytes.push(b'\n');
                            self.pos += 1;
                        }
                        b't' => {
                            bytes.push(b'\t');
                            self.pos += 1;
                        }
                        _ => return Err(FormError::BadEscape(esc_at)),
                    }
                }
                other => bytes.push(other),
            }
        }
        String::from_utf8(bytes).map_err(|_| FormError::BadUtf8(start))
    }
}
