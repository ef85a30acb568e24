//! Division of the global node ID space.
//!
//! Everything here works off an edge prefix sum: entry `i` is the number of
//! edges (or weighted cost) of nodes `0..=i`. The binary search in
//! [`prefix_sum`] finds the node reaching a target weight, [`divide`] turns
//! that into per-worker node/edge ranges, and [`mapping`] builds the
//! host-to-node tables the exchange protocol and the writer consume.

pub mod divide;
pub mod mapping;
pub mod prefix_sum;

pub use divide::{
    determine_unit_ranges, divide_nodes_binary_search, divide_prefix_sum, unit_range_sanity, GraphRange,
    ScaleFactor,
};
pub use mapping::{
    chunked_host_mapping, host_mapping_from_chunk_counts, local_chunk_counts, num_node_chunks,
    MappingStrategy, NodeMapping, DEFAULT_CHUNK_CAP,
};
pub use prefix_sum::{find_index_prefix_sum, DivisionWeights, EdgePrefixSum, SubRange};

/// Near-equal contiguous split of `[begin, end)` into `num` pieces; returns piece `id`.
///
/// The first `(end - begin) % num` pieces are one element longer than the rest.
pub fn block_range(begin: u64, end: u64, id: u64, num: u64) -> (u64, u64) {
    assert!(num >= 1, "block_range needs at least one piece");
    assert!(id < num, "piece {id} out of range for {num} pieces");
    assert!(begin <= end, "block_range over a reversed range");

    let len = end - begin;
    let per = len / num;
    let extra = len % num;
    let start = begin + id * per + id.min(extra);
    let stop = start + per + u64::from(id < extra);
    (start, stop)
}

/// Worker `worker`'s contiguous share of `items`.
pub(crate) fn worker_slice<T>(items: &[T], worker: usize, workers: usize) -> &[T] {
    let (start, end) = block_range(0, items.len() as u64, worker as u64, workers as u64);
    &items[start as usize..end as usize]
}

/// Inclusive running total, in place.
pub fn inclusive_prefix_sum(counts: &mut [u64]) {
    for i in 1..counts.len() {
        counts[i] += counts[i - 1];
    }
}
