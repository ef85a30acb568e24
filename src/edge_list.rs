//! Edge-list input: per-host byte slicing and parsing.
//!
//! Text edge lists hold one `src dst [ignored...]` pair per line, separated by
//! tabs or spaces, with `#` comment lines. Binary edge lists are packed
//! little-endian `(u32 src, u32 dst)` records.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{bail, Context};
use byteorder::{ByteOrder, LittleEndian};

use crate::partition::block_range;

/// Directed edge between two global node IDs.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Edge {
    pub src: u32,
    pub dst: u32,
}

impl Edge {
    pub fn new(src: u32, dst: u32) -> Self {
        Edge { src, dst }
    }
}

impl From<(u32, u32)> for Edge {
    fn from((src, dst): (u32, u32)) -> Self {
        Edge { src, dst }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputFormat {
    #[default]
    Text,
    Binary,
}

/// Size of one binary edge record.
pub const BINARY_EDGE_BYTES: u64 = 8;

/// Byte slice `[start, end)` of a text edge list owned by `host`.
///
/// The file's bytes are block-divided among hosts; a boundary that does not
/// sit at the start of a line is moved forward past the next newline. Both
/// neighbours of a boundary move it identically, so slices stay contiguous.
pub fn determine_byte_range<R: Read + Seek>(
    file: &mut R,
    file_size: u64,
    host: usize,
    num_hosts: usize,
) -> io::Result<(u64, u64)> {
    let (start, end) = block_range(0, file_size, host as u64, num_hosts as u64);
    let start = align_to_line_start(file, start, file_size)?;
    let end = align_to_line_start(file, end, file_size)?;
    Ok((start, end))
}

fn align_to_line_start<R: Read + Seek>(file: &mut R, pos: u64, file_size: u64) -> io::Result<u64> {
    if pos == 0 || pos >= file_size {
        return Ok(pos);
    }

    file.seek(SeekFrom::Start(pos - 1))?;
    let mut reader = BufReader::new(&mut *file);
    let mut prev = [0u8; 1];
    reader.read_exact(&mut prev)?;
    if prev[0] == b'\n' {
        return Ok(pos);
    }

    let mut rest_of_line = Vec::new();
    let skipped = reader.read_until(b'\n', &mut rest_of_line)?;
    Ok(pos + skipped as u64)
}

/// Byte slice of a binary edge list owned by `host`, on record boundaries.
pub fn binary_byte_range(file_size: u64, host: usize, num_hosts: usize) -> (u64, u64) {
    let records = file_size / BINARY_EDGE_BYTES;
    let (first, last) = block_range(0, records, host as u64, num_hosts as u64);
    (first * BINARY_EDGE_BYTES, last * BINARY_EDGE_BYTES)
}

/// Parses a text edge list.
pub fn read_text_edges<R: Read>(reader: R) -> anyhow::Result<Vec<Edge>> {
    let mut reader = BufReader::new(reader);
    let delim = if reader.fill_buf()?.contains(&b'\t') {
        b'\t'
    } else {
        b' '
    };

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delim)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut edges = vec![];
    for record in rdr.byte_records() {
        let record = record?;
        // runs of spaces show up as empty fields
        let mut fields = record.iter().filter(|f| !f.is_empty());
        let (src, dst) = match (fields.next(), fields.next()) {
            (Some(src), Some(dst)) => (src, dst),
            (None, _) => continue,
            (Some(_), None) => {
                bail!("edge list line {:?} has a single field", record.position().map(|p| p.line()))
            }
        };
        edges.push(Edge::new(parse_node(src)?, parse_node(dst)?));
    }
    Ok(edges)
}

fn parse_node(field: &[u8]) -> anyhow::Result<u32> {
    let text = std::str::from_utf8(field).context("node id is not utf-8")?;
    text.parse::<u32>()
        .with_context(|| format!("invalid node id {text:?}"))
}

/// Parses packed little-endian `(u32, u32)` records; a trailing partial record
/// is ignored.
pub fn read_binary_edges<R: Read>(reader: R) -> io::Result<Vec<Edge>> {
    let mut reader = BufReader::new(reader);
    let mut edges = vec![];
    let mut record = [0u8; BINARY_EDGE_BYTES as usize];
    loop {
        match reader.read_exact(&mut record) {
            Ok(()) => edges.push(Edge::new(
                LittleEndian::read_u32(&record[..4]),
                LittleEndian::read_u32(&record[4..]),
            )),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        }
    }
    Ok(edges)
}

/// Reads the edges in `host`'s slice of `path`.
pub fn load_local_edges(
    path: &Path,
    format: InputFormat,
    host: usize,
    num_hosts: usize,
) -> anyhow::Result<Vec<Edge>> {
    let mut file =
        File::open(path).with_context(|| format!("cannot open edge list {}", path.display()))?;
    let file_size = file.metadata()?.len();

    let (start, end) = match format {
        InputFormat::Text => determine_byte_range(&mut file, file_size, host, num_hosts)?,
        InputFormat::Binary => binary_byte_range(file_size, host, num_hosts),
    };
    tracing::debug!(host, start, end, "edge list byte range");

    file.seek(SeekFrom::Start(start))?;
    let slice = file.take(end - start);
    let edges = match format {
        InputFormat::Text => read_text_edges(slice)?,
        InputFormat::Binary => read_binary_edges(slice)?,
    };
    Ok(edges)
}
