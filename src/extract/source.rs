use anyhow::{anyhow, Context, Result};
use flate2::read::MultiGzDecoder;
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};
use tracing::debug;
use zip::ZipArchive;

/// How the raw dump is packed on disk, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Plain,
    Gzip,
    Zip,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("gz") | Some("gzip") => Compression::Gzip,
            Some("zip") => Compression::Zip,
            _ => Compression::Plain,
        }
    }
}

fn is_table_entry(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".csv") || lower.ends_with(".tsv") || lower.ends_with(".txt")
}

/// Open `path`, decompress as needed, and hand the byte stream to `f`.
///
/// ZIP entries borrow their archive, so the reader is lent to a callback
/// rather than returned. For archives the first CSV/TSV entry is used.
pub fn with_source<T>(path: &Path, f: impl FnOnce(&mut dyn Read) -> Result<T>) -> Result<T> {
    let file =
        File::open(path).with_context(|| format!("opening source file {}", path.display()))?;
    let compression = Compression::from_path(path);
    debug!(path = %path.display(), ?compression, "opened source");

    match compression {
        Compression::Plain => f(&mut BufReader::new(file)),
        Compression::Gzip => f(&mut MultiGzDecoder::new(BufReader::new(file))),
        Compression::Zip => {
            let mut archive = ZipArchive::new(file)
                .with_context(|| format!("reading ZIP archive {}", path.display()))?;

            let mut found = None;
            for i in 0..archive.len() {
                let entry = archive
                    .by_index(i)
                    .with_context(|| format!("accessing entry #{} in {}", i, path.display()))?;
                if entry.is_file() && is_table_entry(entry.name()) {
                    found = Some(i);
                    break;
                }
            }
            let idx =
                found.ok_or_else(|| anyhow!("no CSV/TSV entry in archive {}", path.display()))?;

            let mut entry = archive.by_index(idx)?;
            debug!(entry = entry.name(), "reading archive entry");
            f(&mut entry)
        }
    }
}
