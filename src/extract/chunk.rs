use anyhow::{anyhow, Context, Result};
use csv::{ErrorKind, ReaderBuilder, StringRecord};
use std::io::Read;
use tracing::{debug, trace};

/// Columns consumed from the raw dump, in the order chunk rows carry them.
/// The filtered CSV is every column except the trailing `countries_tags`.
pub const SOURCE_COLUMNS: &[&str] = &[
    "code",
    "product_name",
    "brands",
    "categories",
    "quantity",
    "nutriscore_grade",
    "nutriscore_score",
    "nova_group",
    "energy-kcal_100g",
    "proteins_100g",
    "carbohydrates_100g",
    "sugars_100g",
    "fat_100g",
    "saturated-fat_100g",
    "fiber_100g",
    "salt_100g",
    "sodium_100g",
    "countries_tags",
];

pub const PRODUCT_NAME: usize = 1;
pub const ENERGY_KCAL: usize = 8;
pub const COUNTRIES_TAGS: usize = 17;

/// One bounded batch of source rows, projected onto [`SOURCE_COLUMNS`].
#[derive(Debug)]
pub struct Chunk {
    /// 1-based position in the stream.
    pub index: usize,
    pub rows: Vec<StringRecord>,
    /// Lines dropped as malformed while filling this chunk.
    pub skipped: u64,
}

/// One logical source line, rebuilt from raw tab-split records.
///
/// `\x` is a literal `x`: an escaped tab stays in its field and an escaped
/// line break joins the next raw record onto this line.
#[derive(Debug, Default)]
struct EscapedLine {
    fields: Vec<String>,
    field: String,
    open: bool,
}

impl EscapedLine {
    /// Feed one raw record. Returns `true` once the line is complete.
    fn push_record(&mut self, raw: &StringRecord) -> bool {
        let last = raw.len().saturating_sub(1);
        for (i, part) in raw.iter().enumerate() {
            let mut escaped = false;
            for c in part.chars() {
                if escaped || c != '\\' {
                    self.field.push(c);
                    escaped = false;
                } else {
                    escaped = true;
                }
            }

            if !escaped {
                self.fields.push(std::mem::take(&mut self.field));
            } else if i < last {
                self.field.push('\t');
            } else {
                self.field.push('\n');
                self.open = true;
                return false;
            }
        }
        self.open = false;
        true
    }

    /// Hand out the completed fields and reset for the next line.
    fn take(&mut self) -> Vec<String> {
        self.open = false;
        self.field.clear();
        std::mem::take(&mut self.fields)
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Reads a tab-separated dump as a finite sequence of [`Chunk`]s.
///
/// Quotes are literal text, so stray `"` in free-text fields cannot swallow
/// delimiters; a backslash escapes the next character instead. Lines with
/// more fields than the header, or that fail to decode, are skipped; short
/// lines are padded with empty (null) fields.
pub struct ChunkReader<R: Read> {
    reader: csv::Reader<R>,
    /// Source position of each entry of [`SOURCE_COLUMNS`].
    positions: Vec<usize>,
    width: usize,
    chunk_size: usize,
    next_index: usize,
    record: StringRecord,
    line: EscapedLine,
    done: bool,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(source: R, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(anyhow!("chunk size must be at least 1"));
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .has_headers(true)
            .from_reader(source);

        let headers = reader.headers().context("reading source header")?.clone();
        let positions = SOURCE_COLUMNS
            .iter()
            .map(|col| {
                headers
                    .iter()
                    .position(|h| h == *col)
                    .ok_or_else(|| anyhow!("source header is missing column {:?}", col))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(columns = headers.len(), "source header parsed");

        Ok(Self {
            reader,
            positions,
            width: headers.len(),
            chunk_size,
            next_index: 1,
            record: StringRecord::new(),
            line: EscapedLine::default(),
            done: false,
        })
    }

    fn project(&self, fields: &[String]) -> StringRecord {
        self.positions
            .iter()
            .map(|&p| fields.get(p).map_or("", String::as_str))
            .collect()
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut rows = Vec::with_capacity(self.chunk_size.min(16_384));
        let mut skipped = 0u64;

        while rows.len() < self.chunk_size {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => {
                    if !self.line.push_record(&self.record) {
                        continue;
                    }
                    let fields = self.line.take();
                    if fields.len() > self.width {
                        trace!(line = ?self.record.position().map(|p| p.line()), "too many fields");
                        skipped += 1;
                        continue;
                    }
                    rows.push(self.project(&fields));
                }
                Ok(false) => {
                    if self.line.is_open() {
                        trace!("input ends inside an escaped line break");
                        self.line.take();
                        skipped += 1;
                    }
                    self.done = true;
                    break;
                }
                Err(e) => match e.kind() {
                    ErrorKind::Io(_) => {
                        self.done = true;
                        return Some(Err(anyhow::Error::new(e).context("reading source")));
                    }
                    _ => {
                        trace!(error = %e, "skipping malformed line");
                        self.line.take();
                        skipped += 1;
                    }
                },
            }
        }

        if rows.is_empty() && self.done {
            if skipped > 0 {
                debug!(skipped, "trailing malformed lines skipped");
            }
            return None;
        }

        let index = self.next_index;
        self.next_index += 1;
        Some(Ok(Chunk {
            index,
            rows,
            skipped,
        }))
    }
}
