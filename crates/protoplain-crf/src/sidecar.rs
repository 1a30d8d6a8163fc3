//! Ledger sidecar file.
//!
//! A missing file reads as an empty ledger. Writes go through a temporary file
//! next to the target and a rename, so a reader never sees a half-written
//! sidecar.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::ledger::Crf;

#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("ledger sidecar {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ledger sidecar {}: invalid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn to_json_string(ledger: &Crf) -> Result<String, serde_json::Error> {
    serde_json::to_string(ledger)
}

/// `null` and `{}` both read as an empty ledger.
pub fn from_json_str(text: &str) -> Result<Crf, serde_json::Error> {
    let ledger: Option<Crf> = serde_json::from_str(text)?;
    Ok(ledger.unwrap_or_default())
}

pub fn load(path: &Path) -> Result<Crf, SidecarError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no ledger sidecar, starting empty");
            return Ok(Crf::new());
        }
        Err(source) => {
            return Err(SidecarError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let ledger = from_json_str(&text).map_err(|source| SidecarError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), entries = ledger.len(), "loaded ledger sidecar");
    Ok(ledger)
}

pub fn persist(path: &Path, ledger: &Crf) -> Result<(), SidecarError> {
    let io_err = |source: io::Error| SidecarError::Io {
        path: path.to_path_buf(),
        source,
    };
    let text = to_json_string(ledger).map_err(|source| SidecarError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, text).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    tracing::debug!(path = %path.display(), entries = ledger.len(), "persisted ledger sidecar");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
