//! On-disk markers that make export resumable and drive import.
//!
//! - `info.json` in a resource directory: the resource was fully exported
//!   and holds everything import needs to recreate it.
//! - `export-stamp.json` in a service directory: the whole service pass is done.
//!
//! Markers are create-only. They are written after the payload they describe,
//! flushed and synced before the write counts.

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File name of the per-resource marker.
pub const INFO_FILE: &str = "info.json";

/// File name of the per-service marker.
pub const STAMP_FILE: &str = "export-stamp.json";

/// Fields every `info.json` carries.
///
/// Service-specific records flatten this in, so any marker can be read back
/// as a plain `ResourceRecord` to find out which importer owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Service the resource came from, e.g. `paste.sr.ht`.
    pub service: String,
    /// Stable identifier: numeric id or slug.
    pub name: String,
}

impl ResourceRecord {
    #[must_use]
    pub fn new(service: &str, name: impl Into<String>) -> Self {
        Self {
            service: service.to_string(),
            name: name.into(),
        }
    }
}

/// Completion marker for one service directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportStamp {
    /// Origin URL of the instance the data came from.
    pub instance: String,
    pub service: String,
    pub date: DateTime<Utc>,
}

/// Whether a marker exists at `path`.
#[must_use]
pub fn exists(path: &Path) -> bool {
    path.is_file()
}

/// Write `record` to `path`, refusing to replace an existing marker.
///
/// The JSON goes to a temporary file in the same directory, is synced, and
/// is then linked into place, so `path` never holds a partial record.
///
/// # Errors
///
/// Returns [`Error::MarkerExists`] if `path` is already present, or an I/O
/// or serialization error.
pub fn write<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if exists(path) {
        return Err(Error::MarkerExists {
            path: path.to_path_buf(),
        });
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".marker-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    let mut writer = BufWriter::new(temp.as_file());
    serde_json::to_writer_pretty(&mut writer, record)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    drop(writer);
    temp.as_file().sync_all()?;

    temp.persist_noclobber(path).map_err(|e| match e.error.kind() {
        ErrorKind::AlreadyExists => Error::MarkerExists {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e.error),
    })?;

    Ok(())
}

/// Read a marker.
///
/// # Errors
///
/// Returns [`Error::InvalidMarker`] if the file is missing or does not parse.
pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| Error::InvalidMarker {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    serde_json::from_str(&content).map_err(|e| Error::InvalidMarker {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
