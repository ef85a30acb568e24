//! Host-to-node tables.
//!
//! A [`NodeMapping`] hands every part (a host, or a chunk while measuring
//! load) one contiguous half-open range of global node IDs. The flat strategy
//! block-divides the ID space; the chunked strategy measures edges per small
//! chunk across the cluster and moves host boundaries so each host owns about
//! the same number of edges.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;

use super::{block_range, divide_prefix_sum, inclusive_prefix_sum};
use crate::edge_list::Edge;
use crate::network::{HostContext, Network};

/// Upper bound on the number of chunks the chunked strategy measures with.
pub const DEFAULT_CHUNK_CAP: u64 = 10_000_000;

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MappingStrategy {
    /// Equal node counts per host.
    Flat,
    /// Equal edge counts per host, measured at chunk granularity.
    #[default]
    Chunked,
}

/// Contiguous `(first, end)` node ranges, one per part, tiling
/// `[0, total_nodes)` in part order. Ranges may be empty.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeMapping {
    ranges: Vec<(u64, u64)>,
}

impl NodeMapping {
    pub fn from_ranges(ranges: Vec<(u64, u64)>) -> Self {
        assert!(!ranges.is_empty(), "a mapping needs at least one part");
        assert_eq!(ranges[0].0, 0, "first range must start at node 0");
        for (part, (first, end)) in ranges.iter().enumerate() {
            assert!(first <= end, "part {part} has reversed range {first}..{end}");
        }
        for (part, pair) in ranges.windows(2).enumerate() {
            assert_eq!(
                pair[0].1,
                pair[1].0,
                "part {} does not start where part {part} ends",
                part + 1
            );
        }
        NodeMapping { ranges }
    }

    /// Near-equal node counts per part.
    pub fn flat(parts: usize, total_nodes: u64) -> Self {
        assert!(parts >= 1, "a mapping needs at least one part");
        let ranges = (0..parts as u64)
            .map(|p| block_range(0, total_nodes, p, parts as u64))
            .collect();
        NodeMapping { ranges }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[(u64, u64)] {
        &self.ranges
    }

    pub fn range(&self, part: usize) -> (u64, u64) {
        self.ranges[part]
    }

    pub fn num_nodes_of(&self, part: usize) -> u64 {
        let (first, end) = self.ranges[part];
        end - first
    }

    pub fn total_nodes(&self) -> u64 {
        self.ranges.last().map_or(0, |r| r.1)
    }

    /// Part whose range contains `node`, or `None` past the end of the
    /// mapping.
    pub fn owner(&self, node: u64) -> Option<usize> {
        let part = self.ranges.partition_point(|&(_, end)| end <= node);
        match self.ranges.get(part) {
            Some(&(first, _)) if first <= node => Some(part),
            _ => None,
        }
    }

    /// Offset of `node` inside its owner's range.
    pub fn local_index(&self, part: usize, node: u64) -> u64 {
        let (first, end) = self.ranges[part];
        assert!(
            node >= first && node < end,
            "node {node} is not owned by part {part}"
        );
        node - first
    }

    /// First node of every part plus a trailing `total_nodes`, so part `p`
    /// spans `starts[p]..starts[p + 1]`.
    fn starts_with_sentinel(&self) -> Vec<u64> {
        let mut starts: Vec<u64> = self.ranges.iter().map(|r| r.0).collect();
        starts.push(self.total_nodes());
        starts
    }
}

/// Number of chunks to measure load with: edges per host, halved until it
/// fits under `cap`, and at least one.
pub fn num_node_chunks(total_edges: u64, num_hosts: usize, cap: u64) -> u64 {
    assert!(num_hosts >= 1, "need at least one host");
    let mut chunks = total_edges / num_hosts as u64;
    while chunks > cap {
        chunks /= 2;
    }
    chunks.max(1)
}

/// Edges of `edges` whose source falls in each chunk of `chunks`.
///
/// Workers count per distinct source on their own slice; the per-worker
/// tables are merged in worker order and then in source order, so the
/// result does not depend on scheduling.
pub fn local_chunk_counts(edges: &[Edge], chunks: &NodeMapping) -> Vec<u64> {
    let workers = rayon::current_num_threads().max(1);
    let per_worker: Vec<BTreeMap<u32, u64>> = (0..workers)
        .into_par_iter()
        .map(|w| {
            let mut sources = BTreeMap::new();
            for edge in super::worker_slice(edges, w, workers) {
                *sources.entry(edge.src).or_insert(0u64) += 1;
            }
            sources
        })
        .collect();

    let mut sources: BTreeMap<u32, u64> = BTreeMap::new();
    for worker_sources in per_worker {
        for (src, count) in worker_sources {
            *sources.entry(src).or_insert(0) += count;
        }
    }

    let mut counts = vec![0u64; chunks.len()];
    let mut touched = 0usize;
    for (src, count) in sources.iter() {
        let chunk = chunks
            .owner(u64::from(*src))
            .unwrap_or_else(|| panic!("source {src} lies outside every chunk"));
        if counts[chunk] == 0 {
            touched += 1;
        }
        counts[chunk] += count;
    }
    tracing::debug!(
        unique_sources = sources.len(),
        unique_chunks = touched,
        "chunk counts accumulated"
    );
    counts
}

/// Host ranges from the global inclusive prefix sum of per-chunk edge counts.
///
/// Hosts get whole chunks; each host's edge count is within one chunk of
/// `total_edges / num_hosts`.
pub fn host_mapping_from_chunk_counts(
    chunk_prefix: &[u64],
    chunks: &NodeMapping,
    num_hosts: usize,
) -> NodeMapping {
    assert_eq!(
        chunk_prefix.len(),
        chunks.len(),
        "need one prefix entry per chunk"
    );
    let num_chunks = chunks.len() as u64;
    let total_edges = chunk_prefix.last().copied().unwrap_or(0);
    let chunk_starts = chunks.starts_with_sentinel();

    let ranges = (0..num_hosts)
        .map(|h| {
            let assigned = divide_prefix_sum(num_chunks, total_edges, h, num_hosts, chunk_prefix).nodes;
            (
                chunk_starts[assigned.start as usize],
                chunk_starts[assigned.end as usize],
            )
        })
        .collect();
    NodeMapping::from_ranges(ranges)
}

/// Load-aware mapping: measures edges per chunk on every host, sums the
/// counts across the cluster, and splits the chunks among hosts by edges.
/// Every host returns the same mapping.
pub fn chunked_host_mapping<N: Network>(
    ctx: &mut HostContext<N>,
    local_edges: &[Edge],
    total_nodes: u64,
    total_edges: u64,
    chunk_cap: u64,
) -> NodeMapping {
    let timer = Instant::now();
    let me = ctx.id();
    let num_chunks = num_node_chunks(total_edges, ctx.num(), chunk_cap);
    if me == 0 {
        tracing::info!(num_chunks, "measuring load per chunk");
    }
    let chunks = NodeMapping::flat(num_chunks as usize, total_nodes);

    let mut chunk_counts = local_chunk_counts(local_edges, &chunks);
    tracing::debug!(host = me, "sending edge chunk counts");
    let mine = chunk_counts.clone();
    ctx.exchange_with_all(&mine, |sender, theirs: Vec<u64>| {
        assert_eq!(
            theirs.len(),
            chunk_counts.len(),
            "host {sender} measured a different number of chunks"
        );
        for (total, count) in chunk_counts.iter_mut().zip(theirs) {
            *total += count;
        }
    });

    inclusive_prefix_sum(&mut chunk_counts);
    let mapping = host_mapping_from_chunk_counts(&chunk_counts, &chunks, ctx.num());
    if me == 0 {
        for (h, (first, end)) in mapping.ranges().iter().enumerate() {
            tracing::info!(host = h, first, end, "host gets nodes");
        }
    }
    tracing::debug!(host = me, elapsed = ?timer.elapsed(), "chunked mapping done");
    mapping
}
