//! Input resolution: read hOCR markup from a file or standard input.
//!
//! The core stages work on in-memory text only; this is the one place
//! that touches the file system on the way in. Markup is decoded as UTF-8;
//! invalid sequences are replaced (U+FFFD) with a warning rather than
//! failing the whole document.

use crate::error::HocrError;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Where the markup comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Standard input (`-` on the command line).
    Stdin,
    File(PathBuf),
}

impl InputSource {
    /// Interpret a command-line argument; `-` means standard input.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            InputSource::Stdin
        } else {
            InputSource::File(PathBuf::from(arg))
        }
    }

    /// Path used in error messages.
    pub fn display_path(&self) -> PathBuf {
        match self {
            InputSource::Stdin => PathBuf::from("<stdin>"),
            InputSource::File(p) => p.clone(),
        }
    }
}

impl From<&Path> for InputSource {
    fn from(path: &Path) -> Self {
        InputSource::File(path.to_path_buf())
    }
}

/// Read the whole markup of `source`.
pub async fn read_markup(source: &InputSource) -> Result<String, HocrError> {
    let bytes = match source {
        InputSource::File(path) => read_file(path).await?,
        InputSource::Stdin => {
            let mut buf = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut buf)
                .await
                .map_err(|e| HocrError::ReadFailed {
                    path: source.display_path(),
                    source: e,
                })?;
            buf
        }
    };
    debug!(
        "Read {} bytes of markup from {}",
        bytes.len(),
        source.display_path().display()
    );
    Ok(decode(bytes, &source.display_path()))
}

async fn read_file(path: &Path) -> Result<Vec<u8>, HocrError> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => HocrError::InputNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => HocrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => HocrError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        },
    })
}

/// Decode markup bytes, replacing invalid UTF-8.
pub fn decode(bytes: Vec<u8>, origin: &Path) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            warn!(
                "{} is not valid UTF-8 (at byte {}); invalid sequences replaced",
                origin.display(),
                e.utf8_error().valid_up_to()
            );
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}
