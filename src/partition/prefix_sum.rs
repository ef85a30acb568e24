/// Random access to a monotonically non-decreasing edge prefix sum.
///
/// `edge_prefix_sum(n)` is the cumulative edge count through node `n`
/// inclusive.
pub trait EdgePrefixSum {
    fn edge_prefix_sum(&self, node: u64) -> u64;
}

impl EdgePrefixSum for [u64] {
    #[inline]
    fn edge_prefix_sum(&self, node: u64) -> u64 {
        self[node as usize]
    }
}

impl EdgePrefixSum for Vec<u64> {
    #[inline]
    fn edge_prefix_sum(&self, node: u64) -> u64 {
        self[node as usize]
    }
}

impl<T: EdgePrefixSum + ?Sized> EdgePrefixSum for &T {
    #[inline]
    fn edge_prefix_sum(&self, node: u64) -> u64 {
        (**self).edge_prefix_sum(node)
    }
}

/// Cost of a node and of an edge when weighing a division.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DivisionWeights {
    pub node: u64,
    pub edge: u64,
}

impl DivisionWeights {
    /// Balance on edges alone.
    pub const EDGES_ONLY: DivisionWeights = DivisionWeights { node: 0, edge: 1 };

    pub fn new(node: u64, edge: u64) -> Self {
        DivisionWeights { node, edge }
    }
}

/// Window into a larger global prefix sum.
///
/// Node `i` of the window is global node `i + node_offset`, and
/// `edge_offset` is subtracted from every prefix value read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubRange {
    pub edge_offset: u64,
    pub node_offset: u64,
}

/// Edges before node `node` of the window.
#[inline]
pub(crate) fn edges_before<P: EdgePrefixSum + ?Sized>(
    prefix: &P,
    node: u64,
    window: SubRange,
) -> u64 {
    if node + window.node_offset == 0 {
        0
    } else {
        prefix.edge_prefix_sum(node + window.node_offset - 1) - window.edge_offset
    }
}

/// Smallest node index `i` in `[lb, ub]` whose weight
/// `edges_before(i) * weights.edge + i * weights.node` reaches `target`.
///
/// Returns `ub` when no index in `[lb, ub)` reaches the target. The weight
/// has to be non-decreasing in `i`; this is not checked.
pub fn find_index_prefix_sum<P: EdgePrefixSum + ?Sized>(
    weights: DivisionWeights,
    target: u64,
    mut lb: u64,
    mut ub: u64,
    prefix: &P,
    window: SubRange,
) -> u64 {
    assert!(
        weights.node != 0 || weights.edge != 0,
        "node and edge weight cannot both be zero"
    );

    while lb < ub {
        let mid = lb + (ub - lb) / 2;
        let num_edges = edges_before(prefix, mid, window);
        let weight = num_edges * weights.edge + mid * weights.node;

        if weight < target {
            lb = mid + 1;
        } else {
            ub = mid;
        }
    }

    lb
}
