// src/extract/mod.rs

pub mod chunk;
pub mod filter;
pub mod source;

use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use std::{
    fs::{self, File, OpenOptions},
    io::Read,
    path::Path,
};
use tracing::{info, instrument};

use crate::config::ExtractConfig;
use chunk::{ChunkReader, COUNTRIES_TAGS, SOURCE_COLUMNS};
use filter::{keep_row, CountryFilter};

/// Counters for one extract run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub chunks: usize,
    pub rows_read: u64,
    pub rows_kept: u64,
    pub lines_skipped: u64,
}

/// Filter the raw dump at `cfg.source` into the CSV at `cfg.output`.
///
/// Rows are appended; an existing output is only removed when `cfg.fresh`
/// is set. The header is written once, before the first qualifying chunk.
#[instrument(level = "info", skip(cfg), fields(source = %cfg.source.display(), output = %cfg.output.display()))]
pub fn run_extract(cfg: &ExtractConfig) -> Result<ExtractStats> {
    let filter = CountryFilter::new(&cfg.countries)?;

    if cfg.fresh && cfg.output.exists() {
        fs::remove_file(&cfg.output)
            .with_context(|| format!("removing previous output {}", cfg.output.display()))?;
        info!("removed previous output");
    }

    info!(
        chunk_size = cfg.chunk_size,
        pattern = filter.as_str(),
        "extracting in chunks"
    );
    let stats = source::with_source(&cfg.source, |reader| {
        extract_from_reader(reader, &cfg.output, cfg.chunk_size, &filter)
    })?;

    info!(
        kept = stats.rows_kept,
        read = stats.rows_read,
        skipped = stats.lines_skipped,
        "extract done"
    );
    Ok(stats)
}

/// Core loop over an already-decompressed TSV stream.
pub fn extract_from_reader<R: Read>(
    reader: R,
    output: &Path,
    chunk_size: usize,
    filter: &CountryFilter,
) -> Result<ExtractStats> {
    let chunks = ChunkReader::new(reader, chunk_size)?;
    let mut writer: Option<Writer<File>> = None;
    let mut stats = ExtractStats::default();

    for chunk in chunks {
        let chunk = chunk?;
        stats.chunks += 1;
        stats.rows_read += chunk.rows.len() as u64;
        stats.lines_skipped += chunk.skipped;

        let kept: Vec<_> = chunk
            .rows
            .iter()
            .filter_map(|row| keep_row(filter, row))
            .collect();

        if kept.is_empty() {
            info!(
                chunk = chunk.index,
                total = stats.rows_kept,
                "chunk: 0 qualifying rows"
            );
            continue;
        }

        if writer.is_none() {
            writer = Some(open_output(output)?);
        }
        if let Some(w) = writer.as_mut() {
            for row in &kept {
                w.write_record(row)
                    .with_context(|| format!("writing to {}", output.display()))?;
            }
            w.flush()
                .with_context(|| format!("flushing {}", output.display()))?;
        }

        stats.rows_kept += kept.len() as u64;
        info!(
            chunk = chunk.index,
            kept = kept.len(),
            total = stats.rows_kept,
            "chunk appended"
        );
    }

    Ok(stats)
}

/// Open the output for appending and write the header row.
fn open_output(output: &Path) -> Result<Writer<File>> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(output)
        .with_context(|| format!("opening output {}", output.display()))?;

    let mut w = WriterBuilder::new().has_headers(false).from_writer(file);
    w.write_record(&SOURCE_COLUMNS[..COUNTRIES_TAGS])
        .with_context(|| format!("writing header to {}", output.display()))?;
    Ok(w)
}
