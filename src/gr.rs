//! Binary CSR ("gr") output.
//!
//! Layout, all little-endian:
//!
//! ```text
//! [0..8)                      version (1)
//! [8..16)                     bytes of edge data per edge (0)
//! [16..24)                    number of nodes
//! [24..32)                    number of edges
//! [32..32 + 8 * nodes)        u64 end offset of every node's edges
//! [.. + 4 * edges)            u32 destination of every edge, in node order
//! ```
//!
//! Every host writes the node-index slice and the destination slice of its
//! own node range at fixed offsets; nothing else is coordinated.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use byteorder::{ByteOrder, LittleEndian};
use rayon::prelude::*;

use crate::exchange::LocalAdjacency;
use crate::network::{HostContext, Network};
use crate::partition::{determine_unit_ranges, inclusive_prefix_sum};

pub const GR_VERSION: u64 = 1;
pub const HEADER_BYTES: u64 = 32;

// items per positioned write when encoding a section
const WRITE_BATCH: usize = 1 << 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrHeader {
    pub version: u64,
    pub edge_data_size: u64,
    pub num_nodes: u64,
    pub num_edges: u64,
}

impl GrHeader {
    pub fn new(num_nodes: u64, num_edges: u64) -> Self {
        GrHeader {
            version: GR_VERSION,
            edge_data_size: 0,
            num_nodes,
            num_edges,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_BYTES as usize] {
        let mut bytes = [0u8; HEADER_BYTES as usize];
        LittleEndian::write_u64_into(
            &[self.version, self.edge_data_size, self.num_nodes, self.num_edges],
            &mut bytes,
        );
        bytes
    }

    pub fn decode(bytes: &[u8; HEADER_BYTES as usize]) -> Self {
        let mut words = [0u64; 4];
        LittleEndian::read_u64_into(bytes, &mut words);
        GrHeader {
            version: words[0],
            edge_data_size: words[1],
            num_nodes: words[2],
            num_edges: words[3],
        }
    }

    /// Byte offset of node `node`'s entry in the node-index section.
    pub fn node_index_offset(&self, node: u64) -> u64 {
        HEADER_BYTES + 8 * node
    }

    /// Byte offset of global edge `edge` in the destination section.
    pub fn edge_dest_offset(&self, edge: u64) -> u64 {
        HEADER_BYTES + 8 * self.num_nodes + 4 * edge
    }

    pub fn file_len(&self) -> u64 {
        self.edge_dest_offset(self.num_edges)
    }

    /// [`GrHeader::file_len`], or `None` if the counts overflow a `u64`.
    pub fn checked_file_len(&self) -> Option<u64> {
        let index = self.num_nodes.checked_mul(8)?;
        let dests = self.num_edges.checked_mul(4)?;
        HEADER_BYTES.checked_add(index)?.checked_add(dests)
    }
}

/// Positioned write that may write fewer bytes than asked for.
pub trait WriteAt {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;
}

#[cfg(unix)]
impl WriteAt for File {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(self, buf, offset)
    }
}

#[cfg(windows)]
impl WriteAt for File {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::windows::fs::FileExt::seek_write(self, buf, offset)
    }
}

/// Writes all of `buf` at `offset`, retrying short writes from where the
/// previous one stopped.
pub fn write_all_at<W: WriteAt + ?Sized>(out: &W, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match out.write_at(buf, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    format!("wrote nothing at offset {offset}"),
                ))
            }
            Ok(written) => {
                if written < buf.len() {
                    tracing::trace!(offset, written, wanted = buf.len(), "partial write");
                }
                buf = &buf[written..];
                offset += written as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub fn write_header<W: WriteAt + ?Sized>(out: &W, header: &GrHeader) -> io::Result<()> {
    write_all_at(out, &header.encode(), 0)
}

/// Writes global end offsets `offsets` starting at byte `offset`.
pub fn write_node_index_data<W: WriteAt + ?Sized>(
    out: &W,
    offset: u64,
    offsets: &[u64],
) -> io::Result<()> {
    let mut bytes = Vec::new();
    let mut at = offset;
    for batch in offsets.chunks(WRITE_BATCH) {
        bytes.resize(batch.len() * 8, 0);
        LittleEndian::write_u64_into(batch, &mut bytes);
        write_all_at(out, &bytes, at)?;
        at += bytes.len() as u64;
    }
    Ok(())
}

/// Writes edge destinations `dests` starting at byte `offset`.
pub fn write_edge_dest_data<W: WriteAt + ?Sized>(
    out: &W,
    offset: u64,
    dests: &[u32],
) -> io::Result<()> {
    let mut bytes = Vec::new();
    let mut at = offset;
    for batch in dests.chunks(WRITE_BATCH) {
        bytes.resize(batch.len() * 4, 0);
        LittleEndian::write_u32_into(batch, &mut bytes);
        write_all_at(out, &bytes, at)?;
        at += bytes.len() as u64;
    }
    Ok(())
}

/// Local inclusive edge prefix sum and the concatenated destination lists.
///
/// Copying is split among `workers` threads by
/// [`determine_unit_ranges`] so each copies about the same number of edges.
pub fn flatten_adjacency(lists: &[Vec<u32>], workers: usize) -> (Vec<u64>, Vec<u32>) {
    let mut prefix: Vec<u64> = lists.iter().map(|l| l.len() as u64).collect();
    inclusive_prefix_sum(&mut prefix);
    let num_edges = prefix.last().copied().unwrap_or(0) as usize;
    let mut flat = vec![0u32; num_edges];

    let workers = workers.max(1);
    let bounds = determine_unit_ranges(workers, &prefix, lists.len() as u64, 1);
    let edges_before = |node: u64| {
        if node == 0 {
            0
        } else {
            prefix[node as usize - 1] as usize
        }
    };

    let mut pieces = Vec::with_capacity(workers);
    let mut rest = &mut flat[..];
    for unit in bounds.windows(2) {
        let len = edges_before(unit[1]) - edges_before(unit[0]);
        let (piece, tail) = std::mem::take(&mut rest).split_at_mut(len);
        pieces.push((unit[0] as usize..unit[1] as usize, piece));
        rest = tail;
    }
    debug_assert!(rest.is_empty());

    pieces.into_par_iter().for_each(|(nodes, piece)| {
        let mut at = 0;
        for list in &lists[nodes] {
            piece[at..at + list.len()].copy_from_slice(list);
            at += list.len();
        }
    });

    (prefix, flat)
}

/// Where one host's data landed in the output file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteSummary {
    pub first_node: u64,
    pub num_nodes: u64,
    pub edge_offset: u64,
    pub num_edges: u64,
    pub edges_per_host: Vec<u64>,
}

/// Writes this host's part of the gr file at `path`.
///
/// Host 0 creates the file and its header; everyone else opens it once
/// every host knows that succeeded. Each step ends with a round in which
/// hosts share whether they failed, so an error on one host is an error on
/// all of them and on success the whole file is written.
pub fn write_partition<N: Network>(
    ctx: &mut HostContext<N>,
    path: &Path,
    adjacency: LocalAdjacency,
    total_nodes: u64,
    total_edges: u64,
) -> anyhow::Result<WriteSummary> {
    let timer = Instant::now();
    let me = ctx.id();
    let first_node = adjacency.first_node();
    let lists = adjacency.into_inner();
    let (mut offsets, dests) = flatten_adjacency(&lists, rayon::current_num_threads());
    drop(lists);
    tracing::debug!(host = me, "adjacency flattened");

    let num_edges = dests.len() as u64;
    let edges_per_host = ctx.edges_per_host(num_edges);
    assert_eq!(
        edges_per_host.iter().sum::<u64>(),
        total_edges,
        "hosts own a different number of edges than were read"
    );
    let edge_offset: u64 = edges_per_host[..me].iter().sum();
    offsets.par_iter_mut().for_each(|o| *o += edge_offset);

    let header = GrHeader::new(total_nodes, total_edges);
    let created = if me == 0 {
        create_with_header(path, &header)
    } else {
        Ok(())
    };
    settle(ctx, created, "create the output")?;

    let written = write_sections(me, path, &header, first_node, &offsets, edge_offset, &dests);
    settle(ctx, written, "write its slice")?;

    tracing::info!(host = me, edges = num_edges, elapsed = ?timer.elapsed(), "partition written");
    Ok(WriteSummary {
        first_node,
        num_nodes: offsets.len() as u64,
        edge_offset,
        num_edges,
        edges_per_host,
    })
}

fn create_with_header(path: &Path, header: &GrHeader) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("cannot create output {}", path.display()))?;
    write_header(&file, header)
        .with_context(|| format!("cannot write header of {}", path.display()))?;
    Ok(())
}

fn write_sections(
    host: usize,
    path: &Path,
    header: &GrHeader,
    first_node: u64,
    offsets: &[u64],
    edge_offset: u64,
    dests: &[u32],
) -> anyhow::Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("cannot open output {}", path.display()))?;
    tracing::debug!(
        host,
        node_offset = header.node_index_offset(first_node),
        edge_offset = header.edge_dest_offset(edge_offset),
        "writing sections"
    );
    write_node_index_data(&file, header.node_index_offset(first_node), offsets)
        .context("cannot write node index data")?;
    write_edge_dest_data(&file, header.edge_dest_offset(edge_offset), dests)
        .context("cannot write edge destination data")?;
    file.sync_data()?;
    Ok(())
}

/// Ends a write step on every host together: each host learns whether any
/// host failed, so nobody waits on a round that a failed host never joins.
fn settle<N: Network>(
    ctx: &mut HostContext<N>,
    local: anyhow::Result<()>,
    step: &str,
) -> anyhow::Result<()> {
    let failed = ctx.reduce_max(u64::from(local.is_err()));
    local?;
    anyhow::ensure!(failed == 0, "another host could not {step}");
    Ok(())
}

/// A gr file read back into memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrGraph {
    pub header: GrHeader,
    pub offsets: Vec<u64>,
    pub dests: Vec<u32>,
}

impl GrGraph {
    pub fn num_nodes(&self) -> u64 {
        self.header.num_nodes
    }

    pub fn num_edges(&self) -> u64 {
        self.header.num_edges
    }

    pub fn neighbors(&self, node: u64) -> &[u32] {
        let node = node as usize;
        let start = if node == 0 { 0 } else { self.offsets[node - 1] as usize };
        &self.dests[start..self.offsets[node] as usize]
    }

    /// Structural checks beyond what [`read_gr`] enforces.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.header.version == GR_VERSION,
            "unexpected gr version {}",
            self.header.version
        );
        anyhow::ensure!(
            self.header.edge_data_size == 0,
            "unexpected edge data size {}",
            self.header.edge_data_size
        );
        if let Some(pair) = self.offsets.windows(2).position(|w| w[0] > w[1]) {
            anyhow::bail!("edge offsets decrease after node {pair}");
        }
        let last = self.offsets.last().copied().unwrap_or(0);
        anyhow::ensure!(
            last == self.header.num_edges,
            "last edge offset {last} does not match edge count {}",
            self.header.num_edges
        );
        if let Some(dst) = self.dests.iter().find(|&&d| u64::from(d) >= self.header.num_nodes) {
            anyhow::bail!("destination {dst} is not a node");
        }
        Ok(())
    }
}

/// Reads a gr file; the file length has to match its header exactly.
pub fn read_gr(path: &Path) -> io::Result<GrGraph> {
    let bytes = std::fs::read(path)?;
    let invalid = |msg: String| io::Error::new(io::ErrorKind::InvalidData, msg);

    let header_bytes: &[u8; HEADER_BYTES as usize] = bytes
        .get(..HEADER_BYTES as usize)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid(format!("{} bytes is too short for a header", bytes.len())))?;
    let header = GrHeader::decode(header_bytes);
    let file_len = header.checked_file_len().ok_or_else(|| {
        invalid(format!(
            "header counts {} nodes and {} edges overflow",
            header.num_nodes, header.num_edges
        ))
    })?;
    if file_len != bytes.len() as u64 {
        return Err(invalid(format!(
            "file is {} bytes but the header describes {file_len}",
            bytes.len()
        )));
    }

    let index_end = header.edge_dest_offset(0) as usize;
    let mut offsets = vec![0u64; header.num_nodes as usize];
    LittleEndian::read_u64_into(&bytes[HEADER_BYTES as usize..index_end], &mut offsets);
    let mut dests = vec![0u32; header.num_edges as usize];
    LittleEndian::read_u32_into(&bytes[index_end..], &mut dests);

    Ok(GrGraph {
        header,
        offsets,
        dests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::LocalNetwork;
    use parking_lot::Mutex;

    /// In-memory target that accepts at most `max_chunk` bytes per call.
    struct ShortWriter {
        bytes: Mutex<Vec<u8>>,
        max_chunk: usize,
        calls: Mutex<usize>,
    }

    impl ShortWriter {
        fn new(len: usize, max_chunk: usize) -> Self {
            ShortWriter {
                bytes: Mutex::new(vec![0; len]),
                max_chunk,
                calls: Mutex::new(0),
            }
        }
    }

    impl WriteAt for ShortWriter {
        fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
            *self.calls.lock() += 1;
            let n = buf.len().min(self.max_chunk);
            let offset = offset as usize;
            self.bytes.lock()[offset..offset + n].copy_from_slice(&buf[..n]);
            Ok(n)
        }
    }

    struct FullDisk;

    impl WriteAt for FullDisk {
        fn write_at(&self, _buf: &[u8], _offset: u64) -> io::Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn header_layout_is_four_le_words() {
        let header = GrHeader::new(5, 6);
        let bytes = header.encode();
        assert_eq!(&bytes[..8], &1u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &0u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &5u64.to_le_bytes());
        assert_eq!(&bytes[24..], &6u64.to_le_bytes());
        assert_eq!(GrHeader::decode(&bytes), header);
        assert_eq!(header.edge_dest_offset(0), 72);
        assert_eq!(header.file_len(), 96);
    }

    #[test]
    fn partial_writes_advance_data_and_offset() {
        let out = ShortWriter::new(64, 3);
        let offsets = [1u64, 3, 3, 5, 6];
        write_node_index_data(&out, 8, &offsets).unwrap();

        let bytes = out.bytes.lock();
        assert!(bytes[..8].iter().all(|b| *b == 0));
        let mut decoded = [0u64; 5];
        LittleEndian::read_u64_into(&bytes[8..48], &mut decoded);
        assert_eq!(decoded, offsets);
        assert_eq!(*out.calls.lock(), 14);
    }

    #[test]
    fn zero_byte_writes_are_errors() {
        let err = write_edge_dest_data(&FullDisk, 0, &[1, 2]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn flattening_keeps_node_order() {
        let lists = vec![vec![1], vec![0, 2], vec![], vec![4, 1], vec![3]];
        for workers in 1..=7 {
            let (prefix, flat) = flatten_adjacency(&lists, workers);
            assert_eq!(prefix, vec![1, 3, 3, 5, 6]);
            assert_eq!(flat, vec![1, 0, 2, 4, 1, 3]);
        }
        let (prefix, flat) = flatten_adjacency(&[], 4);
        assert!(prefix.is_empty() && flat.is_empty());
    }

    #[test]
    fn single_host_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.gr");
        let adjacency = LocalAdjacency::new((0, 5));
        for (src, dst) in [(0, 1), (1, 0), (1, 2), (3, 4), (3, 1), (4, 3)] {
            adjacency.push(src, dst);
        }

        let mut ctx = HostContext::new(LocalNetwork::single());
        let summary = write_partition(&mut ctx, &path, adjacency, 5, 6).unwrap();
        assert_eq!(summary.edge_offset, 0);
        assert_eq!(summary.edges_per_host, vec![6]);

        let graph = read_gr(&path).unwrap();
        graph.validate().unwrap();
        assert_eq!(graph.header, GrHeader::new(5, 6));
        assert_eq!(graph.offsets, vec![1, 3, 3, 5, 6]);
        assert_eq!(graph.dests, vec![1, 0, 2, 4, 1, 3]);
        assert_eq!(graph.neighbors(2), &[] as &[u32]);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 96);
    }

    #[test]
    fn hosts_write_disjoint_slices_of_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("split.gr");
        // host 0 owns nodes 0..2, host 1 owns nothing, host 2 owns 2..5
        let owned: [((u64, u64), Vec<(u64, u32)>); 3] = [
            ((0, 2), vec![(0, 1), (1, 0), (1, 2)]),
            ((2, 2), vec![]),
            ((2, 5), vec![(3, 4), (3, 1), (4, 3)]),
        ];

        let nets = LocalNetwork::cluster(3);
        let summaries: Vec<WriteSummary> = std::thread::scope(|s| {
            let handles: Vec<_> = nets
                .into_iter()
                .map(|net| {
                    let (path, owned) = (&path, &owned);
                    s.spawn(move || {
                        let mut ctx = HostContext::new(net);
                        let (range, edges) = &owned[ctx.id()];
                        let adjacency = LocalAdjacency::new(*range);
                        for (src, dst) in edges {
                            adjacency.push(*src, *dst);
                        }
                        write_partition(&mut ctx, path, adjacency, 5, 6).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(
            summaries.iter().map(|s| s.edge_offset).collect::<Vec<_>>(),
            vec![0, 3, 3]
        );
        let graph = read_gr(&path).unwrap();
        graph.validate().unwrap();
        assert_eq!(graph.offsets, vec![1, 3, 3, 5, 6]);
        assert_eq!(graph.dests, vec![1, 0, 2, 4, 1, 3]);
    }

    #[test]
    fn oversized_header_counts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.gr");
        std::fs::write(&path, GrHeader::new(u64::MAX / 4, 3).encode()).unwrap();
        assert_eq!(read_gr(&path).unwrap_err().kind(), io::ErrorKind::InvalidData);
        assert_eq!(GrHeader::new(1, u64::MAX / 2).checked_file_len(), None);
        assert_eq!(GrHeader::new(5, 6).checked_file_len(), Some(96));
    }

    #[test]
    fn failed_create_fails_every_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.gr");

        let nets = LocalNetwork::cluster(3);
        let results: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = nets
                .into_iter()
                .map(|net| {
                    let path = &path;
                    s.spawn(move || {
                        let mut ctx = HostContext::new(net);
                        let me = ctx.id() as u64;
                        let adjacency = LocalAdjacency::new((me, me + 1));
                        let err = write_partition(&mut ctx, path, adjacency, 3, 0).unwrap_err();
                        format!("{err:#}")
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results[0].contains("cannot create output"), "{}", results[0]);
        for err in &results[1..] {
            assert!(err.contains("another host could not create the output"), "{err}");
        }
    }

    #[test]
    fn truncated_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.gr");
        let mut bytes = GrHeader::new(2, 1).encode().to_vec();
        bytes.extend_from_slice(&1u64.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();
        assert_eq!(read_gr(&path).unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
