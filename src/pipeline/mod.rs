//! Pipeline stages for hOCR-to-djvused conversion.
//!
//! Each submodule implements exactly one transformation step, and every
//! step after `input` is a pure function of its arguments.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ markup ──▶ tree ──(segment)──▶ transform ──▶ sexpr
//! (file)    (events)   (arena)  (words)     (flip y)     (djvused)
//! ```
//!
//! 1. [`input`]     — read the markup from a file or standard input
//! 2. [`markup`]    — tolerant hOCR parse into per-page node events
//! 3. [`tree`]      — build one zone tree per page at the requested detail,
//!    enforce nesting and containment
//! 4. [`segment`]   — derive words from line text and character boxes
//! 5. [`transform`] — map pixel coordinates into the target page space
//! 6. [`sexpr`]     — serialise each page as a djvused expression

pub mod input;
pub mod markup;
pub mod segment;
pub mod sexpr;
pub mod transform;
pub mod tree;
